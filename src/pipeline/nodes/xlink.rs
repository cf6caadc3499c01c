//! Host bridge endpoints.
//!
//! `XLinkIn` carries messages from a host input queue into the graph,
//! `XLinkOut` carries messages from the graph to a host output queue. Each is
//! bound to a named stream on the transport.

use crate::datatype::DatatypeKind;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::node::{NodeHandle, NodeKind, NodeType};
use crate::pipeline::port::{DatatypeHierarchy, InputRef, OutputRef, PortDescriptor, PortKind};
use serde::{Deserialize, Serialize};

/// Prefix reserved for streams the runtime opens itself.
pub const RESERVED_STREAM_PREFIX: &str = "__";

/// Longest stream name the link layer accepts.
pub const MAX_STREAM_NAME_LEN: usize = 52;

/// Check a caller-chosen stream name.
pub fn validate_stream_name(name: &str) -> PipelineResult<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.starts_with(RESERVED_STREAM_PREFIX) {
        "prefix \"__\" is reserved"
    } else if name.len() > MAX_STREAM_NAME_LEN {
        "name is too long"
    } else if name.chars().any(char::is_control) {
        "name contains control characters"
    } else {
        return Ok(());
    };
    Err(PipelineError::InvalidStreamName {
        name: name.to_string(),
        reason,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XLinkIn {
    pub stream_name: String,
    pub max_data_size: u32,
    pub num_frames: u32,
}

impl XLinkIn {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            max_data_size: 5 * 1024 * 1024,
            num_frames: 8,
        }
    }

    pub fn with_max_data_size(mut self, bytes: u32) -> Self {
        self.max_data_size = bytes;
        self
    }
}

impl NodeType for XLinkIn {
    const NAME: &'static str = "XLinkIn";

    fn inputs(&self) -> Vec<PortDescriptor> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::output(
            "out",
            PortKind::MSender,
            vec![DatatypeHierarchy::with_descendants(DatatypeKind::Buffer)],
        )]
    }

    fn validate(&self) -> Result<(), String> {
        if self.max_data_size == 0 {
            return Err("max data size must be non-zero".into());
        }
        if self.num_frames == 0 {
            return Err("must buffer at least one frame".into());
        }
        Ok(())
    }

    fn from_kind(kind: &NodeKind) -> Option<&Self> {
        match kind {
            NodeKind::XLinkIn(n) => Some(n),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut NodeKind) -> Option<&mut Self> {
        match kind {
            NodeKind::XLinkIn(n) => Some(n),
            _ => None,
        }
    }
}

impl NodeHandle<XLinkIn> {
    pub fn out(&self) -> OutputRef {
        self.output_ref("out")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XLinkOut {
    pub stream_name: String,
    /// `None` forwards every message.
    pub max_fps: Option<f32>,
    /// Restrict the accepted input to one datatype (and its descendants).
    pub datatype_filter: Option<DatatypeKind>,
}

impl XLinkOut {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            max_fps: None,
            datatype_filter: None,
        }
    }

    pub fn with_datatype_filter(mut self, kind: DatatypeKind) -> Self {
        self.datatype_filter = Some(kind);
        self
    }

    pub fn with_max_fps(mut self, fps: f32) -> Self {
        self.max_fps = Some(fps);
        self
    }
}

impl NodeType for XLinkOut {
    const NAME: &'static str = "XLinkOut";

    fn inputs(&self) -> Vec<PortDescriptor> {
        let accepted = self.datatype_filter.unwrap_or(DatatypeKind::Buffer);
        vec![PortDescriptor::input(
            "input",
            PortKind::SReceiver,
            vec![DatatypeHierarchy::with_descendants(accepted)],
        )]
    }

    fn outputs(&self) -> Vec<PortDescriptor> {
        Vec::new()
    }

    fn validate(&self) -> Result<(), String> {
        match self.max_fps {
            Some(fps) if !(fps > 0.0) => Err(format!("max fps {} must be positive", fps)),
            _ => Ok(()),
        }
    }

    fn from_kind(kind: &NodeKind) -> Option<&Self> {
        match kind {
            NodeKind::XLinkOut(n) => Some(n),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut NodeKind) -> Option<&mut Self> {
        match kind {
            NodeKind::XLinkOut(n) => Some(n),
            _ => None,
        }
    }
}

impl NodeHandle<XLinkOut> {
    pub fn input(&self) -> InputRef {
        self.input_ref("input")
    }
}
