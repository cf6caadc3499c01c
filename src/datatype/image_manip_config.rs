//! Runtime configuration for an image manipulation node.
//!
//! Plain data struct with field-level setters. The caller builds and mutates
//! it freely before sending; each setter only touches its own sub-structure
//! and flips the matching `enable_*` flag.
//!
//! The body is versioned: `version` is serialized first and must equal
//! [`ImageManipConfig::FORMAT_VERSION`] on decode.

use super::img_frame::FrameType;
use super::{DatatypeKind, Message, Payload};
use crate::error::{DevLinkError, Result};
use serde::{Deserialize, Serialize};

/// Normalized crop rectangle (0..1 in both axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl Default for CropRect {
    fn default() -> Self {
        Self {
            xmin: 0.0,
            ymin: 0.0,
            xmax: 1.0,
            ymax: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropConfig {
    pub crop_rect: CropRect,
    pub enable_center_crop_rectangle: bool,
    /// Fraction of the input kept by a center crop.
    pub crop_ratio: f32,
    /// Width/height ratio of the center crop.
    pub width_height_aspect_ratio: f32,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            crop_rect: CropRect::default(),
            enable_center_crop_rectangle: false,
            crop_ratio: 1.0,
            width_height_aspect_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeConfig {
    pub width: i32,
    pub height: i32,
    /// Keep aspect ratio and letterbox with the background color.
    pub lock_aspect_ratio_fill: bool,
    pub bg_red: u8,
    pub bg_green: u8,
    pub bg_blue: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatConfig {
    pub frame_type: FrameType,
    pub flip_horizontal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageManipConfig {
    pub version: u8,
    pub crop: CropConfig,
    pub resize: ResizeConfig,
    pub format: FormatConfig,
    pub enable_crop: bool,
    pub enable_resize: bool,
    pub enable_format: bool,
}

impl Default for ImageManipConfig {
    fn default() -> Self {
        Self {
            version: Self::FORMAT_VERSION,
            crop: CropConfig::default(),
            resize: ResizeConfig::default(),
            format: FormatConfig::default(),
            enable_crop: false,
            enable_resize: false,
            enable_format: false,
        }
    }
}

impl ImageManipConfig {
    pub const FORMAT_VERSION: u8 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_crop_rect(&mut self, xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> &mut Self {
        self.enable_crop = true;
        self.crop.enable_center_crop_rectangle = false;
        self.crop.crop_rect = CropRect {
            xmin,
            ymin,
            xmax,
            ymax,
        };
        self
    }

    pub fn set_center_crop(&mut self, ratio: f32, wh_ratio: f32) -> &mut Self {
        self.enable_crop = true;
        self.crop.enable_center_crop_rectangle = true;
        self.crop.crop_ratio = ratio;
        self.crop.width_height_aspect_ratio = wh_ratio;
        self
    }

    pub fn set_resize(&mut self, width: i32, height: i32) -> &mut Self {
        self.enable_resize = true;
        self.resize.width = width;
        self.resize.height = height;
        self.resize.lock_aspect_ratio_fill = false;
        self
    }

    pub fn set_resize_thumbnail(
        &mut self,
        width: i32,
        height: i32,
        bg_red: u8,
        bg_green: u8,
        bg_blue: u8,
    ) -> &mut Self {
        self.enable_resize = true;
        self.resize = ResizeConfig {
            width,
            height,
            lock_aspect_ratio_fill: true,
            bg_red,
            bg_green,
            bg_blue,
        };
        self
    }

    pub fn set_frame_type(&mut self, frame_type: FrameType) -> &mut Self {
        self.enable_format = true;
        self.format.frame_type = frame_type;
        self
    }

    pub fn set_horizontal_flip(&mut self, flip: bool) -> &mut Self {
        self.enable_format = true;
        self.format.flip_horizontal = flip;
        self
    }

    pub fn crop_x_min(&self) -> f32 {
        self.crop.crop_rect.xmin
    }

    pub fn crop_y_min(&self) -> f32 {
        self.crop.crop_rect.ymin
    }

    pub fn crop_x_max(&self) -> f32 {
        self.crop.crop_rect.xmax
    }

    pub fn crop_y_max(&self) -> f32 {
        self.crop.crop_rect.ymax
    }

    pub fn resize_width(&self) -> i32 {
        self.resize.width
    }

    pub fn resize_height(&self) -> i32 {
        self.resize.height
    }

    pub fn is_resize_thumbnail(&self) -> bool {
        self.resize.lock_aspect_ratio_fill
    }

    /// Check ranges the device would otherwise reject or clamp silently.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.enable_crop {
            if self.crop.enable_center_crop_rectangle {
                if !(self.crop.crop_ratio > 0.0 && self.crop.crop_ratio <= 1.0) {
                    return Err(format!("crop ratio {} not in (0, 1]", self.crop.crop_ratio));
                }
                if self.crop.width_height_aspect_ratio <= 0.0 {
                    return Err("aspect ratio must be positive".to_string());
                }
            } else {
                let r = self.crop.crop_rect;
                let in_range = |v: f32| (0.0..=1.0).contains(&v);
                if ![r.xmin, r.ymin, r.xmax, r.ymax].iter().all(|&v| in_range(v)) {
                    return Err("crop rectangle must be normalized to [0, 1]".to_string());
                }
                if r.xmin >= r.xmax || r.ymin >= r.ymax {
                    return Err("crop rectangle is empty".to_string());
                }
            }
        }
        if self.enable_resize && (self.resize.width <= 0 || self.resize.height <= 0) {
            return Err(format!(
                "resize target {}x{} must be positive",
                self.resize.width, self.resize.height
            ));
        }
        Ok(())
    }
}

impl Payload for ImageManipConfig {
    const KIND: DatatypeKind = DatatypeKind::ImageManipConfig;

    fn check_decoded(&self) -> Result<()> {
        if self.version != Self::FORMAT_VERSION {
            return Err(DevLinkError::MalformedPayload(format!(
                "unsupported ImageManipConfig version {}",
                self.version
            )));
        }
        Ok(())
    }

    fn from_message(msg: Message) -> Option<Self> {
        match msg {
            Message::ImageManipConfig(c) => Some(c),
            _ => None,
        }
    }

    fn peek(msg: &Message) -> Option<&Self> {
        match msg {
            Message::ImageManipConfig(c) => Some(c),
            _ => None,
        }
    }
}
