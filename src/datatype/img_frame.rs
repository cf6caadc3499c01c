//! Image frame payload.

use super::{DatatypeKind, Message, Payload};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pixel layout of an [`ImgFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    Yuv420p = 0,
    Nv12 = 1,
    #[default]
    Rgb888p = 2,
    Bgr888p = 3,
    Rgb888i = 4,
    Bgr888i = 5,
    Raw8 = 6,
    Gray8 = 7,
    /// Encoded bitstream (H.264/H.265/MJPEG); `data` is not raw pixels.
    Bitstream = 8,
}

impl FrameType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => FrameType::Yuv420p,
            1 => FrameType::Nv12,
            2 => FrameType::Rgb888p,
            3 => FrameType::Bgr888p,
            4 => FrameType::Rgb888i,
            5 => FrameType::Bgr888i,
            6 => FrameType::Raw8,
            7 => FrameType::Gray8,
            8 => FrameType::Bitstream,
            _ => return None,
        })
    }

    /// Bytes per pixel for packed/planar formats; `None` for subsampled or encoded ones.
    pub fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            FrameType::Rgb888p | FrameType::Bgr888p | FrameType::Rgb888i | FrameType::Bgr888i => {
                Some(3)
            }
            FrameType::Raw8 | FrameType::Gray8 => Some(1),
            FrameType::Yuv420p | FrameType::Nv12 | FrameType::Bitstream => None,
        }
    }
}

/// A single image (or encoded bitstream chunk) produced by a camera, manip or encoder node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImgFrame {
    /// Camera instance that produced the frame.
    pub instance_num: u32,
    pub category: u32,
    pub sequence_num: u64,
    /// Device-side capture time.
    pub timestamp: Duration,
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes (0 when not applicable).
    pub stride: u32,
    pub frame_type: FrameType,
    pub data: Vec<u8>,
}

impl ImgFrame {
    pub fn new(width: u32, height: u32, frame_type: FrameType) -> Self {
        Self {
            width,
            height,
            stride: frame_type.bytes_per_pixel().map(|b| b * width).unwrap_or(0),
            frame_type,
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn with_sequence_num(mut self, seq: u64) -> Self {
        self.sequence_num = seq;
        self
    }

    /// Expected payload length for unencoded fixed-depth formats.
    pub fn expected_len(&self) -> Option<usize> {
        self.frame_type
            .bytes_per_pixel()
            .map(|bpp| (self.width * self.height * bpp) as usize)
    }
}

impl Payload for ImgFrame {
    const KIND: DatatypeKind = DatatypeKind::ImgFrame;

    fn from_message(msg: Message) -> Option<Self> {
        match msg {
            Message::ImgFrame(f) => Some(f),
            _ => None,
        }
    }

    fn peek(msg: &Message) -> Option<&Self> {
        match msg {
            Message::ImgFrame(f) => Some(f),
            _ => None,
        }
    }
}
