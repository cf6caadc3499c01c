//! Built-in node kinds.

pub mod color_camera;
pub mod image_manip;
pub mod mono_camera;
pub mod neural_network;
pub mod video_encoder;
pub mod xlink;

pub use color_camera::{CameraBoardSocket, ColorCamera, ColorOrder, ColorResolution};
pub use image_manip::ImageManip;
pub use mono_camera::{MonoCamera, MonoResolution};
pub use neural_network::NeuralNetwork;
pub use video_encoder::{EncoderProfile, VideoEncoder};
pub use xlink::{validate_stream_name, XLinkIn, XLinkOut, RESERVED_STREAM_PREFIX};
