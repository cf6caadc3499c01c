//! Control channel between host and device.
//!
//! Requests and responses travel on the reserved `__rpc_main` stream, each
//! packet one MessagePack-encoded [`RpcRequest`] / [`RpcResponse`]. Calls
//! are strictly sequential: the client holds a lock for the whole
//! write-then-read exchange, and responses are matched by id so a late reply
//! to a timed-out call is discarded.

use crate::datatype::AutofocusMode;
use crate::error::{DevLinkError, Result, ResultExt};
use crate::pipeline::GraphDescription;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Reserved stream carrying the control channel.
pub const RPC_STREAM: &str = "__rpc_main";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcCall {
    SetPipeline(GraphDescription),
    StartPipeline,
    GetAvailableStreams,
    Ping,
    RequestStillCapture,
    RequestAfTrigger,
    RequestAfMode(AutofocusMode),
    IsPipelineRunning,
}

impl RpcCall {
    pub fn name(&self) -> &'static str {
        match self {
            RpcCall::SetPipeline(_) => "set_pipeline",
            RpcCall::StartPipeline => "start_pipeline",
            RpcCall::GetAvailableStreams => "get_available_streams",
            RpcCall::Ping => "ping",
            RpcCall::RequestStillCapture => "request_still_capture",
            RpcCall::RequestAfTrigger => "request_af_trigger",
            RpcCall::RequestAfMode(_) => "request_af_mode",
            RpcCall::IsPipelineRunning => "is_pipeline_running",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcResult {
    Ack,
    Rejected(String),
    Streams(Vec<String>),
    Bool(bool),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub call: RpcCall,
}

impl RpcRequest {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    pub result: RpcResult,
}

impl RpcResponse {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Client side of the control channel.
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    next_id: AtomicU64,
    in_flight: Mutex<()>,
}

impl RpcClient {
    /// Open the control stream on `transport`.
    pub fn open(
        transport: Arc<dyn Transport>,
        max_write_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        transport
            .open_stream(RPC_STREAM, max_write_size)
            .context("opening control channel")?;
        Ok(Self {
            transport,
            timeout,
            next_id: AtomicU64::new(1),
            in_flight: Mutex::new(()),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue one call and wait for its response.
    pub fn call(&self, call: RpcCall) -> Result<RpcResult> {
        let _guard = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = call.name();
        let bytes = RpcRequest { id, call }.to_bytes()?;

        tracing::trace!(id, call = name, "rpc request");
        self.transport.write(RPC_STREAM, &bytes)?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DevLinkError::Rpc(format!(
                    "{} timed out after {:?}",
                    name, self.timeout
                )));
            }
            let Some(raw) = self.transport.read(RPC_STREAM, remaining)? else {
                continue;
            };
            match RpcResponse::from_bytes(&raw) {
                Ok(resp) if resp.id == id => {
                    tracing::trace!(id, call = name, result = ?resp.result, "rpc response");
                    return Ok(resp.result);
                }
                Ok(resp) => {
                    tracing::warn!(expected = id, got = resp.id, "discarding stale rpc response");
                }
                Err(e) => {
                    tracing::warn!("discarding undecodable rpc response: {}", e);
                }
            }
        }
    }

    /// Call expecting a plain acknowledgement.
    pub fn call_ack(&self, call: RpcCall) -> Result<()> {
        let name = call.name();
        match self.call(call)? {
            RpcResult::Ack => Ok(()),
            other => Err(unexpected(name, other)),
        }
    }

    pub fn call_bool(&self, call: RpcCall) -> Result<bool> {
        let name = call.name();
        match self.call(call)? {
            RpcResult::Bool(b) => Ok(b),
            other => Err(unexpected(name, other)),
        }
    }

    pub fn call_streams(&self, call: RpcCall) -> Result<Vec<String>> {
        let name = call.name();
        match self.call(call)? {
            RpcResult::Streams(s) => Ok(s),
            other => Err(unexpected(name, other)),
        }
    }

    pub fn close(&self) -> Result<()> {
        self.transport.close_stream(RPC_STREAM)
    }
}

fn unexpected(call: &str, result: RpcResult) -> DevLinkError {
    match result {
        RpcResult::Error(msg) => DevLinkError::Rpc(format!("{} failed: {}", call, msg)),
        RpcResult::Rejected(msg) => DevLinkError::Rpc(format!("{} rejected: {}", call, msg)),
        other => DevLinkError::Rpc(format!("{}: unexpected response {:?}", call, other)),
    }
}
