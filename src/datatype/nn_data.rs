//! Neural-network inference output.

use super::{DatatypeKind, Message, Payload};
use half::f16;
use serde::{Deserialize, Serialize};

/// Element type of an output tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TensorDataType {
    Fp16 = 0,
    U8 = 1,
    Int = 2,
    Fp32 = 3,
    I8 = 4,
}

impl TensorDataType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => TensorDataType::Fp16,
            1 => TensorDataType::U8,
            2 => TensorDataType::Int,
            3 => TensorDataType::Fp32,
            4 => TensorDataType::I8,
            _ => return None,
        })
    }

    pub fn element_size(self) -> usize {
        match self {
            TensorDataType::U8 | TensorDataType::I8 => 1,
            TensorDataType::Fp16 => 2,
            TensorDataType::Int | TensorDataType::Fp32 => 4,
        }
    }
}

/// One named output layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorInfo {
    pub name: String,
    pub data_type: TensorDataType,
    pub dims: Vec<u32>,
    pub data: Vec<u8>,
}

impl TensorInfo {
    pub fn element_count(&self) -> usize {
        self.dims.iter().map(|&d| d as usize).product()
    }
}

/// Output of a neural-network node: a list of layers in device order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NNData {
    pub batch_size: u32,
    pub tensors: Vec<TensorInfo>,
}

impl NNData {
    pub fn new() -> Self {
        Self {
            batch_size: 1,
            tensors: Vec::new(),
        }
    }

    /// Add or replace a layer.
    pub fn add_layer(
        &mut self,
        name: impl Into<String>,
        data_type: TensorDataType,
        dims: Vec<u32>,
        data: Vec<u8>,
    ) {
        let tensor = TensorInfo {
            name: name.into(),
            data_type,
            dims,
            data,
        };
        match self.tensors.iter_mut().find(|t| t.name == tensor.name) {
            Some(existing) => *existing = tensor,
            None => self.tensors.push(tensor),
        }
    }

    pub fn layer(&self, name: &str) -> Option<&TensorInfo> {
        self.tensors.iter().find(|t| t.name == name)
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.tensors.iter().map(|t| t.name.as_str()).collect()
    }

    /// Decode an FP16 layer (the device default) into floats.
    pub fn layer_fp16(&self, name: &str) -> Option<Vec<f32>> {
        let layer = self.layer(name)?;
        if layer.data_type != TensorDataType::Fp16 {
            return None;
        }
        Some(
            layer
                .data
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
        )
    }

    /// Decode an FP32 layer into floats.
    pub fn layer_fp32(&self, name: &str) -> Option<Vec<f32>> {
        let layer = self.layer(name)?;
        if layer.data_type != TensorDataType::Fp32 {
            return None;
        }
        Some(
            layer
                .data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    /// Raw U8 layer contents.
    pub fn layer_u8(&self, name: &str) -> Option<&[u8]> {
        self.layer(name)
            .filter(|l| l.data_type == TensorDataType::U8)
            .map(|l| l.data.as_slice())
    }
}

impl Payload for NNData {
    const KIND: DatatypeKind = DatatypeKind::NNData;

    fn from_message(msg: Message) -> Option<Self> {
        match msg {
            Message::NNData(d) => Some(d),
            _ => None,
        }
    }

    fn peek(msg: &Message) -> Option<&Self> {
        match msg {
            Message::NNData(d) => Some(d),
            _ => None,
        }
    }
}
