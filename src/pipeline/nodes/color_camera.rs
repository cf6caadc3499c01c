//! ColorCamera: the color sensor node.
//!
//! Produces three ImgFrame streams from one sensor: `video` (full rate,
//! NV12), `preview` (small planar/interleaved RGB for inference) and `still`
//! (on request). Accepts runtime `CameraControl` and, when
//! `wait_for_config_input` is set, an `ImageManipConfig` before the first frame.

use crate::datatype::DatatypeKind;
use crate::pipeline::node::{NodeHandle, NodeKind, NodeType};
use crate::pipeline::port::{DatatypeHierarchy, InputRef, OutputRef, PortDescriptor, PortKind};
use serde::{Deserialize, Serialize};

/// Physical sensor socket on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CameraBoardSocket {
    #[default]
    Auto,
    Rgb,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorOrder {
    #[default]
    Bgr,
    Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorResolution {
    #[default]
    The1080P,
    The4K,
    The12MP,
}

impl ColorResolution {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            ColorResolution::The1080P => (1920, 1080),
            ColorResolution::The4K => (3840, 2160),
            ColorResolution::The12MP => (4056, 3040),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorCamera {
    pub board_socket: CameraBoardSocket,
    pub color_order: ColorOrder,
    pub interleaved: bool,
    pub fp16: bool,
    pub preview_width: u32,
    pub preview_height: u32,
    /// `None` follows the sensor resolution.
    pub video_size: Option<(u32, u32)>,
    pub still_size: Option<(u32, u32)>,
    pub resolution: ColorResolution,
    pub fps: f32,
    /// Top-left corner of the sensor crop, normalized.
    pub sensor_crop: Option<(f32, f32)>,
    pub wait_for_config_input: bool,
    pub keep_preview_aspect_ratio: bool,
}

impl Default for ColorCamera {
    fn default() -> Self {
        Self {
            board_socket: CameraBoardSocket::Auto,
            color_order: ColorOrder::Bgr,
            interleaved: true,
            fp16: false,
            preview_width: 300,
            preview_height: 300,
            video_size: None,
            still_size: None,
            resolution: ColorResolution::The1080P,
            fps: 30.0,
            sensor_crop: None,
            wait_for_config_input: false,
            keep_preview_aspect_ratio: true,
        }
    }
}

impl ColorCamera {
    pub fn with_preview_size(mut self, width: u32, height: u32) -> Self {
        self.preview_width = width;
        self.preview_height = height;
        self
    }

    pub fn with_resolution(mut self, resolution: ColorResolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_fps(mut self, fps: f32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_interleaved(mut self, interleaved: bool) -> Self {
        self.interleaved = interleaved;
        self
    }

    pub fn video_dimensions(&self) -> (u32, u32) {
        self.video_size.unwrap_or_else(|| self.resolution.dimensions())
    }

    pub fn still_dimensions(&self) -> (u32, u32) {
        self.still_size.unwrap_or_else(|| self.resolution.dimensions())
    }
}

impl NodeType for ColorCamera {
    const NAME: &'static str = "ColorCamera";

    fn inputs(&self) -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input(
                "inputConfig",
                PortKind::SReceiver,
                vec![DatatypeHierarchy::exact(DatatypeKind::ImageManipConfig)],
            )
            .with_queue(self.wait_for_config_input, 8),
            PortDescriptor::input(
                "inputControl",
                PortKind::SReceiver,
                vec![DatatypeHierarchy::exact(DatatypeKind::CameraControl)],
            ),
        ]
    }

    fn outputs(&self) -> Vec<PortDescriptor> {
        let frames = || vec![DatatypeHierarchy::exact(DatatypeKind::ImgFrame)];
        vec![
            PortDescriptor::output("video", PortKind::MSender, frames()),
            PortDescriptor::output("preview", PortKind::MSender, frames()),
            PortDescriptor::output("still", PortKind::MSender, frames()),
        ]
    }

    fn validate(&self) -> Result<(), String> {
        if self.preview_width == 0 || self.preview_height == 0 {
            return Err("preview size must be non-zero".into());
        }
        let (max_w, max_h) = self.resolution.dimensions();
        for (label, (w, h)) in [
            ("video", self.video_dimensions()),
            ("still", self.still_dimensions()),
        ] {
            if w == 0 || h == 0 || w > max_w || h > max_h {
                return Err(format!(
                    "{} size {}x{} outside sensor resolution {}x{}",
                    label, w, h, max_w, max_h
                ));
            }
        }
        if !(self.fps > 0.0 && self.fps <= 120.0) {
            return Err(format!("fps {} outside (0, 120]", self.fps));
        }
        if let Some((x, y)) = self.sensor_crop {
            if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
                return Err(format!("sensor crop ({}, {}) outside [0, 1]", x, y));
            }
        }
        Ok(())
    }

    fn from_kind(kind: &NodeKind) -> Option<&Self> {
        match kind {
            NodeKind::ColorCamera(n) => Some(n),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut NodeKind) -> Option<&mut Self> {
        match kind {
            NodeKind::ColorCamera(n) => Some(n),
            _ => None,
        }
    }
}

impl NodeHandle<ColorCamera> {
    pub fn video(&self) -> OutputRef {
        self.output_ref("video")
    }

    pub fn preview(&self) -> OutputRef {
        self.output_ref("preview")
    }

    pub fn still(&self) -> OutputRef {
        self.output_ref("still")
    }

    pub fn input_config(&self) -> InputRef {
        self.input_ref("inputConfig")
    }

    pub fn input_control(&self) -> InputRef {
        self.input_ref("inputControl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        assert!(ColorCamera::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_properties() {
        assert!(ColorCamera::default().with_preview_size(0, 300).validate().is_err());
        assert!(ColorCamera::default().with_fps(0.0).validate().is_err());
        assert!(ColorCamera::default().with_fps(f32::NAN).validate().is_err());

        let cam = ColorCamera {
            video_size: Some((3840, 2160)),
            ..ColorCamera::default()
        };
        assert!(cam.validate().is_err());
        assert!(cam.with_resolution(ColorResolution::The4K).validate().is_ok());
    }

    #[test]
    fn test_wait_for_config_makes_input_blocking() {
        let cam = ColorCamera {
            wait_for_config_input: true,
            ..ColorCamera::default()
        };
        let cfg = cam.inputs().into_iter().find(|p| p.name == "inputConfig").unwrap();
        assert!(cfg.queue.blocking);
    }
}
