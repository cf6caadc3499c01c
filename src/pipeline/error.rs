//! Pipeline-specific error types.

use crate::datatype::DatatypeKind;
use crate::pipeline::id::NodeId;
use thiserror::Error;

/// Errors raised while building or serializing a pipeline graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Incompatible types: {from} produces {produced:?}, {to} accepts {accepted:?}")]
    IncompatibleTypes {
        from: String,
        to: String,
        produced: Vec<DatatypeKind>,
        accepted: Vec<DatatypeKind>,
    },

    #[error("Port {port} already has its maximum number of links")]
    CapacityExceeded { port: String },

    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("Node {node:?} has no port named {port}")]
    UnknownPort { node: NodeId, port: String },

    #[error("Port {port} on node {node:?} has the wrong direction for this link")]
    WrongDirection { node: NodeId, port: String },

    #[error("Link {0} already exists")]
    DuplicateLink(String),

    #[error("Link {0} would create a cycle")]
    CycleDetected(String),

    #[error("Invalid property on {node}: {message}")]
    InvalidProperty { node: String, message: String },

    #[error("Invalid stream name {name:?}: {reason}")]
    InvalidStreamName { name: String, reason: &'static str },

    #[error("Stream name {0:?} is already used by another node")]
    DuplicateStreamName(String),

    #[error("Pipeline was submitted to a device and can no longer be modified")]
    Frozen,

    #[error("Link {0} does not exist")]
    UnknownLink(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
