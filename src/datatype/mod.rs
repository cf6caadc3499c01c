//! Typed payloads exchanged over named streams.
//!
//! Every unit of data crossing a stream is a [`Message`]: a closed tagged
//! variant over the known payload kinds plus a raw [`Buffer`] fallback. The
//! tag ([`DatatypeKind`]) travels in the packet header, so a reader can check
//! the kind of a queued message without decoding its body.
//!
//! # Payload kinds
//!
//! - [`Buffer`] - Raw bytes
//! - [`ImgFrame`] - Image frame with geometry and pixel format
//! - [`NNData`] - Neural-network output tensors
//! - [`ImageManipConfig`] - Crop/resize/format update for an image manip node
//! - [`CameraControl`] - Camera commands (autofocus, still capture, ...)
//!
//! Typed reads go through the [`Payload`] trait, which pattern-matches the
//! message instead of downcasting. Bodies are the serde form of each payload
//! struct, encoded with bincode's standard configuration.

pub mod buffer;
pub mod camera_control;
pub mod image_manip_config;
pub mod img_frame;
pub mod nn_data;

pub use buffer::Buffer;
pub use camera_control::{AutofocusMode, CameraCommand, CameraControl};
pub use image_manip_config::{CropConfig, CropRect, FormatConfig, ImageManipConfig, ResizeConfig};
pub use img_frame::{FrameType, ImgFrame};
pub use nn_data::{NNData, TensorDataType, TensorInfo};

use crate::error::{DevLinkError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Datatype tag carried in every stream packet header and used to type ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DatatypeKind {
    Buffer = 0,
    ImgFrame = 1,
    NNData = 2,
    ImageManipConfig = 3,
    CameraControl = 4,
}

impl DatatypeKind {
    /// Every known kind, in tag order.
    pub fn all() -> &'static [DatatypeKind] {
        &[
            DatatypeKind::Buffer,
            DatatypeKind::ImgFrame,
            DatatypeKind::NNData,
            DatatypeKind::ImageManipConfig,
            DatatypeKind::CameraControl,
        ]
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.tag() == tag)
    }

    /// Parent kind in the datatype hierarchy. `Buffer` is the root.
    pub fn parent(self) -> Option<DatatypeKind> {
        match self {
            DatatypeKind::Buffer => None,
            _ => Some(DatatypeKind::Buffer),
        }
    }

    /// True if `self` is `ancestor` or derives from it.
    pub fn is_derived_from(self, ancestor: DatatypeKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == ancestor {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    pub fn name(self) -> &'static str {
        match self {
            DatatypeKind::Buffer => "Buffer",
            DatatypeKind::ImgFrame => "ImgFrame",
            DatatypeKind::NNData => "NNData",
            DatatypeKind::ImageManipConfig => "ImageManipConfig",
            DatatypeKind::CameraControl => "CameraControl",
        }
    }
}

impl std::fmt::Display for DatatypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete payload type carried as a packet body.
pub trait Payload: Sized + Serialize + DeserializeOwned + Into<Message> {
    /// Tag written into the packet header for this payload.
    const KIND: DatatypeKind;

    /// Take the payload out of a message if it holds this kind.
    fn from_message(msg: Message) -> Option<Self>;

    /// Borrow the payload if the message holds this kind.
    fn peek(msg: &Message) -> Option<&Self>;

    /// Checks on a decoded value that the derived format cannot express.
    fn check_decoded(&self) -> Result<()> {
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| DevLinkError::Serialization(format!("{} body: {}", Self::KIND, e)))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let (value, read): (Self, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| DevLinkError::MalformedPayload(format!("{} body: {}", Self::KIND, e)))?;
        if read != bytes.len() {
            return Err(DevLinkError::MalformedPayload(format!(
                "{} body: {} trailing bytes",
                Self::KIND,
                bytes.len() - read
            )));
        }
        value.check_decoded()?;
        Ok(value)
    }
}

/// A tagged payload travelling over a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Buffer(Buffer),
    ImgFrame(ImgFrame),
    NNData(NNData),
    ImageManipConfig(ImageManipConfig),
    CameraControl(CameraControl),
}

impl Message {
    pub fn kind(&self) -> DatatypeKind {
        match self {
            Message::Buffer(_) => DatatypeKind::Buffer,
            Message::ImgFrame(_) => DatatypeKind::ImgFrame,
            Message::NNData(_) => DatatypeKind::NNData,
            Message::ImageManipConfig(_) => DatatypeKind::ImageManipConfig,
            Message::CameraControl(_) => DatatypeKind::CameraControl,
        }
    }

    /// Encode the body (header is added by the stream packet layer).
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Message::Buffer(m) => m.encode(),
            Message::ImgFrame(m) => m.encode(),
            Message::NNData(m) => m.encode(),
            Message::ImageManipConfig(m) => m.encode(),
            Message::CameraControl(m) => m.encode(),
        }
    }

    /// Decode a body whose kind was read from the packet header.
    pub fn decode(kind: DatatypeKind, body: &[u8]) -> Result<Self> {
        let msg = match kind {
            DatatypeKind::Buffer => Message::Buffer(Buffer::decode(body)?),
            DatatypeKind::ImgFrame => Message::ImgFrame(ImgFrame::decode(body)?),
            DatatypeKind::NNData => Message::NNData(NNData::decode(body)?),
            DatatypeKind::ImageManipConfig => {
                Message::ImageManipConfig(ImageManipConfig::decode(body)?)
            }
            DatatypeKind::CameraControl => Message::CameraControl(CameraControl::decode(body)?),
        };
        Ok(msg)
    }

    /// Typed extraction; `None` if the message holds another kind.
    pub fn into_payload<T: Payload>(self) -> Option<T> {
        T::from_message(self)
    }

    /// Typed borrow; `None` if the message holds another kind.
    pub fn payload<T: Payload>(&self) -> Option<&T> {
        T::peek(self)
    }

    pub fn is<T: Payload>(&self) -> bool {
        self.kind() == T::KIND
    }

    /// Raw data section for kinds that carry one.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Message::Buffer(m) => Some(&m.data),
            Message::ImgFrame(m) => Some(&m.data),
            _ => None,
        }
    }
}

macro_rules! impl_message_variant {
    ($ty:ident) => {
        impl From<$ty> for Message {
            fn from(value: $ty) -> Self {
                Message::$ty(value)
            }
        }

        impl TryFrom<Message> for $ty {
            type Error = DevLinkError;

            fn try_from(msg: Message) -> Result<Self> {
                match msg {
                    Message::$ty(v) => Ok(v),
                    other => Err(DevLinkError::MalformedPayload(format!(
                        "expected {}, found {}",
                        DatatypeKind::$ty,
                        other.kind()
                    ))),
                }
            }
        }
    };
}

impl_message_variant!(Buffer);
impl_message_variant!(ImgFrame);
impl_message_variant!(NNData);
impl_message_variant!(ImageManipConfig);
impl_message_variant!(CameraControl);
