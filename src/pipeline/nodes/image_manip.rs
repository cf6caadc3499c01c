//! ImageManip: crop, resize and color-convert frames on the device.
//!
//! The node starts from `initial_config` and replaces it whenever an
//! `ImageManipConfig` arrives on `inputConfig`.

use crate::datatype::{DatatypeKind, ImageManipConfig};
use crate::pipeline::node::{NodeHandle, NodeKind, NodeType};
use crate::pipeline::port::{DatatypeHierarchy, InputRef, OutputRef, PortDescriptor, PortKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageManip {
    pub initial_config: ImageManipConfig,
    pub wait_for_config_input: bool,
    pub max_output_frame_size: u32,
    pub num_frames_pool: u32,
}

impl Default for ImageManip {
    fn default() -> Self {
        Self {
            initial_config: ImageManipConfig::default(),
            wait_for_config_input: false,
            max_output_frame_size: 1024 * 1024,
            num_frames_pool: 4,
        }
    }
}

impl ImageManip {
    pub fn with_config(mut self, config: ImageManipConfig) -> Self {
        self.initial_config = config;
        self
    }

    pub fn with_max_output_frame_size(mut self, bytes: u32) -> Self {
        self.max_output_frame_size = bytes;
        self
    }
}

impl NodeType for ImageManip {
    const NAME: &'static str = "ImageManip";

    fn inputs(&self) -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input(
                "inputImage",
                PortKind::SReceiver,
                vec![DatatypeHierarchy::exact(DatatypeKind::ImgFrame)],
            ),
            PortDescriptor::input(
                "inputConfig",
                PortKind::SReceiver,
                vec![DatatypeHierarchy::exact(DatatypeKind::ImageManipConfig)],
            )
            .with_queue(self.wait_for_config_input, 8),
        ]
    }

    fn outputs(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::output(
            "out",
            PortKind::MSender,
            vec![DatatypeHierarchy::exact(DatatypeKind::ImgFrame)],
        )]
    }

    fn validate(&self) -> Result<(), String> {
        self.initial_config
            .validate()
            .map_err(|e| format!("initial config: {}", e))?;
        if self.max_output_frame_size == 0 {
            return Err("max output frame size must be non-zero".into());
        }
        if self.num_frames_pool == 0 {
            return Err("frame pool must hold at least one frame".into());
        }
        Ok(())
    }

    fn from_kind(kind: &NodeKind) -> Option<&Self> {
        match kind {
            NodeKind::ImageManip(n) => Some(n),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut NodeKind) -> Option<&mut Self> {
        match kind {
            NodeKind::ImageManip(n) => Some(n),
            _ => None,
        }
    }
}

impl NodeHandle<ImageManip> {
    pub fn out(&self) -> OutputRef {
        self.output_ref("out")
    }

    pub fn input_image(&self) -> InputRef {
        self.input_ref("inputImage")
    }

    pub fn input_config(&self) -> InputRef {
        self.input_ref("inputConfig")
    }
}
