//! MonoCamera: grayscale sensor node with a single `out` stream.

use crate::datatype::DatatypeKind;
use crate::pipeline::node::{NodeHandle, NodeKind, NodeType};
use crate::pipeline::nodes::CameraBoardSocket;
use crate::pipeline::port::{DatatypeHierarchy, InputRef, OutputRef, PortDescriptor, PortKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MonoResolution {
    #[default]
    The720P,
    The800P,
    The400P,
}

impl MonoResolution {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            MonoResolution::The720P => (1280, 720),
            MonoResolution::The800P => (1280, 800),
            MonoResolution::The400P => (640, 400),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonoCamera {
    pub board_socket: CameraBoardSocket,
    pub resolution: MonoResolution,
    pub fps: f32,
}

impl Default for MonoCamera {
    fn default() -> Self {
        Self {
            board_socket: CameraBoardSocket::Left,
            resolution: MonoResolution::The720P,
            fps: 30.0,
        }
    }
}

impl MonoCamera {
    pub fn new(board_socket: CameraBoardSocket) -> Self {
        Self {
            board_socket,
            ..Self::default()
        }
    }
}

impl NodeType for MonoCamera {
    const NAME: &'static str = "MonoCamera";

    fn inputs(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::input(
            "inputControl",
            PortKind::SReceiver,
            vec![DatatypeHierarchy::exact(DatatypeKind::CameraControl)],
        )]
    }

    fn outputs(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::output(
            "out",
            PortKind::MSender,
            vec![DatatypeHierarchy::exact(DatatypeKind::ImgFrame)],
        )]
    }

    fn validate(&self) -> Result<(), String> {
        if self.board_socket == CameraBoardSocket::Rgb {
            return Err("mono sensor cannot use the RGB socket".into());
        }
        if !(self.fps > 0.0 && self.fps <= 120.0) {
            return Err(format!("fps {} outside (0, 120]", self.fps));
        }
        Ok(())
    }

    fn from_kind(kind: &NodeKind) -> Option<&Self> {
        match kind {
            NodeKind::MonoCamera(n) => Some(n),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut NodeKind) -> Option<&mut Self> {
        match kind {
            NodeKind::MonoCamera(n) => Some(n),
            _ => None,
        }
    }
}

impl NodeHandle<MonoCamera> {
    pub fn out(&self) -> OutputRef {
        self.output_ref("out")
    }

    pub fn input_control(&self) -> InputRef {
        self.input_ref("inputControl")
    }
}
