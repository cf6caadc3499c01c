//! Port descriptors for the node system.
//!
//! Each node kind declares its ports (inputs/outputs) from its current
//! properties. The pipeline uses these to validate links, both when a link is
//! created and again when the graph is serialized.

use crate::datatype::DatatypeKind;
use crate::pipeline::id::NodeId;
use serde::{Deserialize, Serialize};

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// Link multiplicity of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortKind {
    /// Output feeding any number of inputs.
    MSender,
    /// Output feeding a single input.
    SSender,
    /// Input accepting any number of upstream links.
    MReceiver,
    /// Input accepting at most one upstream link.
    SReceiver,
}

impl PortKind {
    pub fn direction(self) -> PortDirection {
        match self {
            PortKind::MSender | PortKind::SSender => PortDirection::Output,
            PortKind::MReceiver | PortKind::SReceiver => PortDirection::Input,
        }
    }

    /// Maximum number of links this port may take part in.
    pub fn max_links(self) -> Option<usize> {
        match self {
            PortKind::SSender | PortKind::SReceiver => Some(1),
            PortKind::MSender | PortKind::MReceiver => None,
        }
    }
}

/// One accepted/produced datatype, optionally including everything derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatatypeHierarchy {
    pub datatype: DatatypeKind,
    pub descendants: bool,
}

impl DatatypeHierarchy {
    pub const fn exact(datatype: DatatypeKind) -> Self {
        Self {
            datatype,
            descendants: false,
        }
    }

    pub const fn with_descendants(datatype: DatatypeKind) -> Self {
        Self {
            datatype,
            descendants: true,
        }
    }
}

/// True if some datatype produced by `outputs` can be consumed by `inputs`.
pub fn datatypes_intersect(outputs: &[DatatypeHierarchy], inputs: &[DatatypeHierarchy]) -> bool {
    outputs.iter().any(|o| {
        inputs.iter().any(|i| {
            o.datatype == i.datatype
                || (i.descendants && o.datatype.is_derived_from(i.datatype))
                || (o.descendants && i.datatype.is_derived_from(o.datatype))
        })
    })
}

/// Device-side queueing applied to an input when its producer outpaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputQueueConfig {
    /// Block the producer (true) or drop the oldest message (false).
    pub blocking: bool,
    pub queue_size: u32,
}

impl Default for InputQueueConfig {
    fn default() -> Self {
        Self {
            blocking: true,
            queue_size: 8,
        }
    }
}

/// Descriptor for a node's port, derived from the node's properties.
#[derive(Debug, Clone, PartialEq)]
pub struct PortDescriptor {
    pub name: &'static str,
    pub kind: PortKind,
    pub types: Vec<DatatypeHierarchy>,
    /// Default queueing for inputs; ignored for outputs.
    pub queue: InputQueueConfig,
}

impl PortDescriptor {
    pub fn input(name: &'static str, kind: PortKind, types: Vec<DatatypeHierarchy>) -> Self {
        debug_assert_eq!(kind.direction(), PortDirection::Input);
        Self {
            name,
            kind,
            types,
            queue: InputQueueConfig::default(),
        }
    }

    pub fn output(name: &'static str, kind: PortKind, types: Vec<DatatypeHierarchy>) -> Self {
        debug_assert_eq!(kind.direction(), PortDirection::Output);
        Self {
            name,
            kind,
            types,
            queue: InputQueueConfig::default(),
        }
    }

    pub fn with_queue(mut self, blocking: bool, queue_size: u32) -> Self {
        self.queue = InputQueueConfig {
            blocking,
            queue_size,
        };
        self
    }

    pub fn direction(&self) -> PortDirection {
        self.kind.direction()
    }
}

/// Reference to a node output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputRef {
    pub node: NodeId,
    pub port: &'static str,
}

/// Reference to a node input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputRef {
    pub node: NodeId,
    pub port: &'static str,
}

impl OutputRef {
    pub fn new(node: NodeId, port: &'static str) -> Self {
        Self { node, port }
    }
}

impl InputRef {
    pub fn new(node: NodeId, port: &'static str) -> Self {
        Self { node, port }
    }
}

/// Serializable port schema sent to the device with each node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescription {
    pub name: String,
    pub kind: PortKind,
    pub types: Vec<DatatypeHierarchy>,
    pub blocking: bool,
    pub queue_size: u32,
}

impl PortDescription {
    pub fn from_descriptor(desc: &PortDescriptor, queue: InputQueueConfig) -> Self {
        Self {
            name: desc.name.to_string(),
            kind: desc.kind,
            types: desc.types.clone(),
            blocking: queue.blocking,
            queue_size: queue.queue_size,
        }
    }
}
