//! Identity types for the pipeline graph.
//!
//! Node ids are assigned monotonically by a [`Pipeline`](super::Pipeline) and
//! are never reused, even after a node is removed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node, unique within one pipeline.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The id following this one.
    #[inline]
    pub fn next(self) -> NodeId {
        NodeId(self.0 + 1)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        assert_eq!(NodeId(42).next(), NodeId(43));
        assert_eq!(format!("{}", NodeId(3)), "NodeId(3)");
    }

    #[test]
    fn test_ordering() {
        assert!(NodeId(1) < NodeId(2));
    }
}
