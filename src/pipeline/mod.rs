//! Pipeline graph model.
//!
//! A [`Pipeline`] is a DAG of typed nodes (cameras, image manipulation,
//! inference, encoding, host bridges) connected output→input. The host builds
//! it, then a [`Device`](crate::device::Device) serializes it into a
//! [`GraphDescription`] and installs it on the coprocessor.
//!
//! # Architecture
//!
//! ```text
//! [ColorCamera] ──preview──► [NeuralNetwork] ──out──► [XLinkOut "nn"]
//!               └─video────► [VideoEncoder] ──────► [XLinkOut "h264"]
//! [XLinkIn "cfg"] ─────────► [ImageManip].inputConfig
//! ```
//!
//! # Design
//!
//! - **Enum dispatch**: `NodeKind` for all built-in kinds; ports are derived
//!   from properties, so a property change can narrow a port.
//! - **Typed handles**: `NodeHandle<N>` exposes the kind's ports as methods.
//! - **Fail without side effects**: a rejected call leaves the graph as it was.
//! - **Frozen after submit**: mutations fail with `PipelineError::Frozen`.

pub mod description;
pub mod error;
pub mod graph;
pub mod id;
pub mod node;
pub mod nodes;
pub mod port;

pub use description::{GlobalProperties, GraphDescription, Link, NodeDescription, StreamNames};
pub use error::{PipelineError, PipelineResult};
pub use graph::Pipeline;
pub use id::NodeId;
pub use node::{Node, NodeHandle, NodeKind, NodeType};
pub use nodes::*;
pub use port::{
    DatatypeHierarchy, InputQueueConfig, InputRef, OutputRef, PortDescription, PortDescriptor,
    PortDirection, PortKind,
};
