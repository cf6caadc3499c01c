//! VideoEncoder: H.264/H.265/MJPEG encoder on the device.

use crate::datatype::DatatypeKind;
use crate::pipeline::node::{NodeHandle, NodeKind, NodeType};
use crate::pipeline::port::{DatatypeHierarchy, InputRef, OutputRef, PortDescriptor, PortKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncoderProfile {
    #[default]
    H264Baseline,
    H264Main,
    H264High,
    H265Main,
    Mjpeg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoEncoder {
    pub profile: EncoderProfile,
    pub bitrate_kbps: u32,
    pub frame_rate: f32,
    pub keyframe_frequency: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for VideoEncoder {
    fn default() -> Self {
        Self {
            profile: EncoderProfile::H264Baseline,
            bitrate_kbps: 8000,
            frame_rate: 30.0,
            keyframe_frequency: 30,
            width: 1920,
            height: 1080,
        }
    }
}

impl VideoEncoder {
    pub fn new(width: u32, height: u32, frame_rate: f32, profile: EncoderProfile) -> Self {
        Self {
            profile,
            frame_rate,
            width,
            height,
            ..Self::default()
        }
    }
}

impl NodeType for VideoEncoder {
    const NAME: &'static str = "VideoEncoder";

    fn inputs(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::input(
            "input",
            PortKind::SReceiver,
            vec![DatatypeHierarchy::exact(DatatypeKind::ImgFrame)],
        )
        .with_queue(true, 4)]
    }

    fn outputs(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::output(
            "bitstream",
            PortKind::MSender,
            vec![DatatypeHierarchy::exact(DatatypeKind::ImgFrame)],
        )]
    }

    fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("frame size {}x{} must be non-zero", self.width, self.height));
        }
        if self.profile != EncoderProfile::Mjpeg {
            // H.26x encoders work on 2x2 chroma blocks
            if self.width % 2 != 0 || self.height % 2 != 0 {
                return Err(format!("frame size {}x{} must be even", self.width, self.height));
            }
            if self.bitrate_kbps == 0 {
                return Err("bitrate must be non-zero".into());
            }
        }
        if !(self.frame_rate > 0.0) {
            return Err(format!("frame rate {} must be positive", self.frame_rate));
        }
        Ok(())
    }

    fn from_kind(kind: &NodeKind) -> Option<&Self> {
        match kind {
            NodeKind::VideoEncoder(n) => Some(n),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut NodeKind) -> Option<&mut Self> {
        match kind {
            NodeKind::VideoEncoder(n) => Some(n),
            _ => None,
        }
    }
}

impl NodeHandle<VideoEncoder> {
    pub fn input(&self) -> InputRef {
        self.input_ref("input")
    }

    pub fn bitstream(&self) -> OutputRef {
        self.output_ref("bitstream")
    }
}
