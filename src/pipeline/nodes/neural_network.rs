//! NeuralNetwork: runs a compiled blob on incoming buffers.

use crate::datatype::DatatypeKind;
use crate::pipeline::node::{NodeHandle, NodeKind, NodeType};
use crate::pipeline::port::{DatatypeHierarchy, InputRef, OutputRef, PortDescriptor, PortKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const MAX_INFERENCE_THREADS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralNetwork {
    /// Compiled network blob, uploaded by the device bootstrap.
    pub blob_path: PathBuf,
    /// 0 lets the device choose.
    pub num_inference_threads: u32,
    pub num_frames_pool: u32,
}

impl Default for NeuralNetwork {
    fn default() -> Self {
        Self {
            blob_path: PathBuf::new(),
            num_inference_threads: 2,
            num_frames_pool: 8,
        }
    }
}

impl NeuralNetwork {
    pub fn new(blob_path: impl Into<PathBuf>) -> Self {
        Self {
            blob_path: blob_path.into(),
            ..Self::default()
        }
    }
}

impl NodeType for NeuralNetwork {
    const NAME: &'static str = "NeuralNetwork";

    fn inputs(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::input(
            "in",
            PortKind::SReceiver,
            vec![DatatypeHierarchy::with_descendants(DatatypeKind::Buffer)],
        )
        .with_queue(true, 5)]
    }

    fn outputs(&self) -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::output(
                "out",
                PortKind::MSender,
                vec![DatatypeHierarchy::exact(DatatypeKind::NNData)],
            ),
            PortDescriptor::output(
                "passthrough",
                PortKind::MSender,
                vec![DatatypeHierarchy::exact(DatatypeKind::ImgFrame)],
            ),
        ]
    }

    fn validate(&self) -> Result<(), String> {
        if self.blob_path.as_os_str().is_empty() {
            return Err("blob path is empty".into());
        }
        if self.num_inference_threads > MAX_INFERENCE_THREADS {
            return Err(format!(
                "{} inference threads requested, at most {} supported",
                self.num_inference_threads, MAX_INFERENCE_THREADS
            ));
        }
        if self.num_frames_pool == 0 {
            return Err("frame pool must hold at least one frame".into());
        }
        Ok(())
    }

    fn from_kind(kind: &NodeKind) -> Option<&Self> {
        match kind {
            NodeKind::NeuralNetwork(n) => Some(n),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut NodeKind) -> Option<&mut Self> {
        match kind {
            NodeKind::NeuralNetwork(n) => Some(n),
            _ => None,
        }
    }
}

impl NodeHandle<NeuralNetwork> {
    pub fn input(&self) -> InputRef {
        self.input_ref("in")
    }

    pub fn out(&self) -> OutputRef {
        self.output_ref("out")
    }

    pub fn passthrough(&self) -> OutputRef {
        self.output_ref("passthrough")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(NeuralNetwork::default().validate().is_err());
        assert!(NeuralNetwork::new("mobilenet.blob").validate().is_ok());
        let nn = NeuralNetwork {
            num_inference_threads: 3,
            ..NeuralNetwork::new("a.blob")
        };
        assert!(nn.validate().is_err());
    }
}
