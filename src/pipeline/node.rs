//! Node abstraction for the pipeline graph.
//!
//! Two layers:
//! - **`NodeType` trait**: implemented by each property struct (`ColorCamera`,
//!   `XLinkOut`, ...) so the pipeline can hand out typed handles.
//! - **`NodeKind` enum**: closed set of built-in kinds. Port lookup and
//!   validation dispatch through a `match`, and the enum is what gets
//!   serialized into the graph description.

use crate::pipeline::id::NodeId;
use crate::pipeline::nodes::{
    ColorCamera, ImageManip, MonoCamera, NeuralNetwork, VideoEncoder, XLinkIn, XLinkOut,
};
use crate::pipeline::port::{InputQueueConfig, InputRef, OutputRef, PortDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

/// Implemented by every built-in node property struct.
pub trait NodeType: Clone + Into<NodeKind> {
    /// Kind name used in errors and the serialized graph.
    const NAME: &'static str;

    fn inputs(&self) -> Vec<PortDescriptor>;

    fn outputs(&self) -> Vec<PortDescriptor>;

    /// Check property values. The message names the offending property.
    fn validate(&self) -> Result<(), String>;

    fn from_kind(kind: &NodeKind) -> Option<&Self>;

    fn from_kind_mut(kind: &mut NodeKind) -> Option<&mut Self>;
}

/// Enum dispatch over built-in node kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "properties")]
pub enum NodeKind {
    ColorCamera(ColorCamera),
    MonoCamera(MonoCamera),
    ImageManip(ImageManip),
    NeuralNetwork(NeuralNetwork),
    VideoEncoder(VideoEncoder),
    XLinkIn(XLinkIn),
    XLinkOut(XLinkOut),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::ColorCamera(_) => ColorCamera::NAME,
            NodeKind::MonoCamera(_) => MonoCamera::NAME,
            NodeKind::ImageManip(_) => ImageManip::NAME,
            NodeKind::NeuralNetwork(_) => NeuralNetwork::NAME,
            NodeKind::VideoEncoder(_) => VideoEncoder::NAME,
            NodeKind::XLinkIn(_) => XLinkIn::NAME,
            NodeKind::XLinkOut(_) => XLinkOut::NAME,
        }
    }

    pub fn inputs(&self) -> Vec<PortDescriptor> {
        match self {
            NodeKind::ColorCamera(n) => n.inputs(),
            NodeKind::MonoCamera(n) => n.inputs(),
            NodeKind::ImageManip(n) => n.inputs(),
            NodeKind::NeuralNetwork(n) => n.inputs(),
            NodeKind::VideoEncoder(n) => n.inputs(),
            NodeKind::XLinkIn(n) => n.inputs(),
            NodeKind::XLinkOut(n) => n.inputs(),
        }
    }

    pub fn outputs(&self) -> Vec<PortDescriptor> {
        match self {
            NodeKind::ColorCamera(n) => n.outputs(),
            NodeKind::MonoCamera(n) => n.outputs(),
            NodeKind::ImageManip(n) => n.outputs(),
            NodeKind::NeuralNetwork(n) => n.outputs(),
            NodeKind::VideoEncoder(n) => n.outputs(),
            NodeKind::XLinkIn(n) => n.outputs(),
            NodeKind::XLinkOut(n) => n.outputs(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            NodeKind::ColorCamera(n) => n.validate(),
            NodeKind::MonoCamera(n) => n.validate(),
            NodeKind::ImageManip(n) => n.validate(),
            NodeKind::NeuralNetwork(n) => n.validate(),
            NodeKind::VideoEncoder(n) => n.validate(),
            NodeKind::XLinkIn(n) => n.validate(),
            NodeKind::XLinkOut(n) => n.validate(),
        }
    }

    /// Host stream bound to this node, if it is a bridge endpoint.
    pub fn stream_name(&self) -> Option<&str> {
        match self {
            NodeKind::XLinkIn(n) => Some(&n.stream_name),
            NodeKind::XLinkOut(n) => Some(&n.stream_name),
            _ => None,
        }
    }

    pub fn input(&self, name: &str) -> Option<PortDescriptor> {
        self.inputs().into_iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<PortDescriptor> {
        self.outputs().into_iter().find(|p| p.name == name)
    }
}

macro_rules! impl_into_kind {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for NodeKind {
                fn from(n: $ty) -> Self {
                    NodeKind::$ty(n)
                }
            }
        )*
    };
}

impl_into_kind!(
    ColorCamera,
    MonoCamera,
    ImageManip,
    NeuralNetwork,
    VideoEncoder,
    XLinkIn,
    XLinkOut,
);

/// A node stored in a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Per-input queue settings overriding the port defaults.
    pub(crate) input_queues: BTreeMap<String, InputQueueConfig>,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            input_queues: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Effective queueing for an input port.
    pub fn input_queue(&self, port: &PortDescriptor) -> InputQueueConfig {
        self.input_queues
            .get(port.name)
            .copied()
            .unwrap_or(port.queue)
    }
}

/// Typed reference to a node of kind `N` inside a pipeline.
pub struct NodeHandle<N> {
    id: NodeId,
    _kind: PhantomData<fn() -> N>,
}

impl<N> NodeHandle<N> {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            _kind: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn output_ref(&self, port: &'static str) -> OutputRef {
        OutputRef::new(self.id, port)
    }

    pub(crate) fn input_ref(&self, port: &'static str) -> InputRef {
        InputRef::new(self.id, port)
    }
}

// Manual impls: derives would require `N: Clone` etc.
impl<N> Clone for NodeHandle<N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for NodeHandle<N> {}

impl<N> PartialEq for NodeHandle<N> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<N> Eq for NodeHandle<N> {}

impl<N: NodeType> fmt::Debug for NodeHandle<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", N::NAME, self.id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_dispatch() {
        let kind = NodeKind::from(XLinkOut::new("video"));
        assert_eq!(kind.name(), "XLinkOut");
        assert_eq!(kind.stream_name(), Some("video"));
        assert!(kind.outputs().is_empty());
        assert!(kind.input("input").is_some());
        assert!(kind.output("input").is_none());
    }

    #[test]
    fn test_from_kind() {
        let mut kind = NodeKind::from(ColorCamera::default());
        assert!(ColorCamera::from_kind(&kind).is_some());
        assert!(XLinkIn::from_kind(&kind).is_none());
        if let Some(cam) = ColorCamera::from_kind_mut(&mut kind) {
            cam.fps = 15.0;
        }
        assert_eq!(ColorCamera::from_kind(&kind).map(|c| c.fps), Some(15.0));
    }

    #[test]
    fn test_input_queue_override() {
        let mut node = Node::new(NodeId(0), XLinkOut::new("x").into());
        let port = node.kind.input("input").unwrap();
        assert_eq!(node.input_queue(&port), port.queue);
        let custom = InputQueueConfig {
            blocking: false,
            queue_size: 2,
        };
        node.input_queues.insert("input".into(), custom);
        assert_eq!(node.input_queue(&port), custom);
    }

    #[test]
    fn test_handle_debug() {
        let h: NodeHandle<XLinkIn> = NodeHandle::new(NodeId(4));
        assert_eq!(format!("{:?}", h), "XLinkIn(4)");
    }
}
