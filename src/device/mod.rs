//! Device session
//!
//! A [`Device`] owns one connection to a coprocessor: the control channel,
//! the installed graph, every open stream queue and the liveness watchdog.
//!
//! ```text
//! Created ──submit_pipeline──► PipelineInstalled ──start──► Running
//!    │                               │                        │
//!    └───────────── close / watchdog failure ─────────────────┴──► Closed
//! ```

pub mod registry;
pub mod rpc;
pub mod watchdog;

pub use registry::QueueRegistry;
pub use rpc::{RpcCall, RpcClient, RpcRequest, RpcResponse, RpcResult, RPC_STREAM};
pub use watchdog::{Watchdog, WatchdogCounters};

use crate::config::DeviceConfig;
use crate::datatype::AutofocusMode;
use crate::error::{DevLinkError, Result};
use crate::pipeline::{GraphDescription, NodeKind, Pipeline};
use crate::queue::{DataInputQueue, DataOutputQueue, QueueStats, BODY_OVERHEAD, HEADER_LEN};
use crate::transport::{Transport, TransportStats};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceState {
    Created,
    PipelineInstalled,
    Running,
    Closed,
}

impl DeviceState {
    pub fn name(self) -> &'static str {
        match self {
            DeviceState::Created => "Created",
            DeviceState::PipelineInstalled => "PipelineInstalled",
            DeviceState::Running => "Running",
            DeviceState::Closed => "Closed",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub state: DeviceState,
    pub opened_at: DateTime<Utc>,
    pub captured_at: DateTime<Utc>,
    pub uptime: Duration,
    pub pings_ok: u64,
    pub pings_failed: u64,
    /// Why the session ended, if the watchdog ended it
    pub close_reason: Option<String>,
    pub transport: TransportStats,
    pub output_queues: BTreeMap<String, QueueStats>,
    pub input_queues: BTreeMap<String, QueueStats>,
}

/// State the watchdog thread touches.
#[derive(Debug)]
struct SessionShared {
    state: Mutex<DeviceState>,
    close_reason: Mutex<Option<String>>,
}

impl SessionShared {
    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move from `from` to `to`, or fail if another thread moved the state first.
    fn transition(&self, from: DeviceState, to: DeviceState) -> Result<()> {
        let mut state = self.state();
        if *state != from {
            return Err(DevLinkError::InvalidState {
                expected: from.name(),
                found: state.name(),
            });
        }
        *state = to;
        Ok(())
    }

    fn mark_dead(&self, reason: String) {
        *self.state() = DeviceState::Closed;
        *self.close_reason.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason);
    }
}

pub struct Device {
    transport: Arc<dyn Transport>,
    config: DeviceConfig,
    rpc: Arc<RpcClient>,
    registry: Arc<QueueRegistry>,
    shared: Arc<SessionShared>,
    counters: Arc<WatchdogCounters>,
    watchdog: Mutex<Option<Watchdog>>,
    graph: Option<GraphDescription>,
    opened_at: DateTime<Utc>,
    started: Instant,
    closed: AtomicBool,
}

impl Device {
    /// Open a session on a connected transport.
    pub fn new(transport: Arc<dyn Transport>, config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        if !transport.is_connected() {
            return Err(DevLinkError::Transport(format!(
                "{} is not connected",
                transport.description()
            )));
        }

        let rpc = Arc::new(RpcClient::open(
            transport.clone(),
            config.stream.max_write_size,
            config.rpc_timeout(),
        )?);
        let registry = Arc::new(QueueRegistry::new());
        let shared = Arc::new(SessionShared {
            state: Mutex::new(DeviceState::Created),
            close_reason: Mutex::new(None),
        });
        let counters = Arc::new(WatchdogCounters::default());

        let watchdog = if config.watchdog.enabled {
            let ping_rpc = rpc.clone();
            let registry = registry.clone();
            let shared = shared.clone();
            Some(Watchdog::spawn(
                config.watchdog_interval(),
                config.watchdog.max_failures,
                counters.clone(),
                move || ping_rpc.call_ack(RpcCall::Ping),
                move |reason| {
                    shared.mark_dead(reason.clone());
                    registry.break_all(&reason);
                },
            )?)
        } else {
            None
        };

        tracing::info!(device = %transport.description(), "device session opened");

        Ok(Self {
            transport,
            config,
            rpc,
            registry,
            shared,
            counters,
            watchdog: Mutex::new(watchdog),
            graph: None,
            opened_at: Utc::now(),
            started: Instant::now(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn state(&self) -> DeviceState {
        *self.shared.state()
    }

    /// Graph accepted by the device, once submitted.
    pub fn graph(&self) -> Option<&GraphDescription> {
        self.graph.as_ref()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state() == DeviceState::Closed {
            return Err(DevLinkError::InvalidState {
                expected: "an open session",
                found: DeviceState::Closed.name(),
            });
        }
        Ok(())
    }

    /// Serialize, freeze and install `pipeline` on the device.
    ///
    /// The pipeline stays frozen even if the device rejects it.
    pub fn submit_pipeline(&mut self, pipeline: &mut Pipeline) -> Result<()> {
        let state = self.state();
        if state != DeviceState::Created {
            return Err(DevLinkError::InvalidState {
                expected: DeviceState::Created.name(),
                found: state.name(),
            });
        }

        let description = pipeline.serialize()?;
        pipeline.freeze();

        match self.rpc.call(RpcCall::SetPipeline(description.clone()))? {
            RpcResult::Ack => {}
            RpcResult::Rejected(reason) | RpcResult::Error(reason) => {
                tracing::warn!("pipeline rejected: {}", reason);
                return Err(DevLinkError::GraphRejected(reason));
            }
            other => {
                return Err(DevLinkError::Rpc(format!(
                    "set_pipeline: unexpected response {:?}",
                    other
                )))
            }
        }

        // the watchdog may have closed the session while the call was pending
        self.shared
            .transition(DeviceState::Created, DeviceState::PipelineInstalled)?;
        let streams = description.stream_names();
        tracing::info!(
            nodes = description.nodes.len(),
            links = description.links.len(),
            inputs = ?streams.inputs,
            outputs = ?streams.outputs,
            "pipeline installed"
        );
        self.graph = Some(description);
        Ok(())
    }

    pub fn start(&self) -> Result<()> {
        match self.state() {
            DeviceState::PipelineInstalled => {}
            DeviceState::Running => return Err(DevLinkError::AlreadyRunning),
            found => {
                return Err(DevLinkError::InvalidState {
                    expected: DeviceState::PipelineInstalled.name(),
                    found: found.name(),
                })
            }
        }
        self.rpc.call_ack(RpcCall::StartPipeline)?;
        self.shared
            .transition(DeviceState::PipelineInstalled, DeviceState::Running)?;
        tracing::info!("pipeline started");
        Ok(())
    }

    fn declared_output(&self, name: &str) -> Result<()> {
        match &self.graph {
            Some(g) if g.stream_names().outputs.contains(name) => Ok(()),
            _ => Err(DevLinkError::UnknownStream(name.to_string())),
        }
    }

    /// `XLinkIn.max_data_size` for `name`, if the graph declares it.
    fn declared_input(&self, name: &str) -> Result<usize> {
        self.graph
            .iter()
            .flat_map(|g| g.nodes.iter())
            .find_map(|n| match &n.properties {
                NodeKind::XLinkIn(x) if x.stream_name == name => Some(x.max_data_size as usize),
                _ => None,
            })
            .ok_or_else(|| DevLinkError::UnknownStream(name.to_string()))
    }

    /// Queue for a device-to-host stream. A second request for the same name
    /// returns the queue already open, ignoring the new parameters.
    ///
    /// Fails with `StreamBroken` once the watchdog has declared the device dead.
    pub fn get_output_queue(
        &self,
        name: &str,
        max_size: usize,
        overwrite: bool,
    ) -> Result<Arc<DataOutputQueue>> {
        self.ensure_open()?;
        self.declared_output(name)?;
        self.registry.output_or_insert_with(name, || {
            DataOutputQueue::new(
                self.transport.clone(),
                name,
                self.config.queue_options(max_size, overwrite),
            )
        })
    }

    pub fn get_output_queue_default(&self, name: &str) -> Result<Arc<DataOutputQueue>> {
        self.get_output_queue(
            name,
            self.config.queues.default_max_size,
            self.config.queues.default_overwrite,
        )
    }

    /// Queue for a host-to-device stream, sized for the `XLinkIn` node's
    /// largest message.
    pub fn get_input_queue(
        &self,
        name: &str,
        max_size: usize,
        overwrite: bool,
    ) -> Result<Arc<DataInputQueue>> {
        self.ensure_open()?;
        let max_data = self.declared_input(name)?;
        self.registry.input_or_insert_with(name, || {
            let mut options = self.config.queue_options(max_size, overwrite);
            options.max_write_size = max_data + HEADER_LEN + BODY_OVERHEAD;
            DataInputQueue::new(self.transport.clone(), name, options)
        })
    }

    pub fn get_input_queue_default(&self, name: &str) -> Result<Arc<DataInputQueue>> {
        self.get_input_queue(
            name,
            self.config.queues.default_max_size,
            self.config.queues.default_overwrite,
        )
    }

    /// Stream names the device currently exposes.
    pub fn get_available_streams(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.rpc.call_streams(RpcCall::GetAvailableStreams)
    }

    pub fn request_still_capture(&self) -> Result<()> {
        self.ensure_open()?;
        self.rpc.call_ack(RpcCall::RequestStillCapture)
    }

    pub fn request_af_trigger(&self) -> Result<()> {
        self.ensure_open()?;
        self.rpc.call_ack(RpcCall::RequestAfTrigger)
    }

    pub fn request_af_mode(&self, mode: AutofocusMode) -> Result<()> {
        self.ensure_open()?;
        self.rpc.call_ack(RpcCall::RequestAfMode(mode))
    }

    pub fn is_pipeline_running(&self) -> Result<bool> {
        self.ensure_open()?;
        self.rpc.call_bool(RpcCall::IsPipelineRunning)
    }

    /// Round-trip time of one `Ping`.
    pub fn ping(&self) -> Result<Duration> {
        self.ensure_open()?;
        let start = Instant::now();
        self.rpc.call_ack(RpcCall::Ping)?;
        Ok(start.elapsed())
    }

    pub fn stats(&self) -> SessionStats {
        let (pings_ok, pings_failed) = self.counters.snapshot();
        let mut output_queues = BTreeMap::new();
        let mut input_queues = BTreeMap::new();
        if let Some(graph) = &self.graph {
            let streams = graph.stream_names();
            for name in &streams.outputs {
                if let Some(q) = self.registry.output(name) {
                    output_queues.insert(name.clone(), q.stats());
                }
            }
            for name in &streams.inputs {
                if let Some(q) = self.registry.input(name) {
                    input_queues.insert(name.clone(), q.stats());
                }
            }
        }
        SessionStats {
            state: self.state(),
            opened_at: self.opened_at,
            captured_at: Utc::now(),
            uptime: self.started.elapsed(),
            pings_ok,
            pings_failed,
            close_reason: self
                .shared
                .close_reason
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            transport: self.transport.stats(),
            output_queues,
            input_queues,
        }
    }

    /// Stop the watchdog, close every queue, the control stream and the
    /// transport. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let watchdog = self
            .watchdog
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut watchdog) = watchdog {
            watchdog.stop();
        }
        *self.shared.state() = DeviceState::Closed;
        self.registry.close_all();
        if let Err(e) = self.rpc.close() {
            tracing::debug!("failed to close control stream: {}", e);
        }
        self.transport.close();
        tracing::info!(device = %self.transport.description(), "device session closed");
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::Buffer;
    use crate::pipeline::{XLinkIn, XLinkOut};
    use crate::transport::LoopbackTransport;

    fn quiet_config() -> DeviceConfig {
        let mut config = DeviceConfig::default();
        config.watchdog.enabled = false;
        config.rpc.timeout_ms = 200;
        config
    }

    fn passthrough() -> Pipeline {
        let mut p = Pipeline::new();
        let xin = p.create(XLinkIn::new("in")).unwrap();
        let xout = p.create(XLinkOut::new("out")).unwrap();
        p.link(xin.out(), xout.input()).unwrap();
        p
    }

    #[test]
    fn test_lifecycle() {
        let lb = Arc::new(LoopbackTransport::new());
        let mut device = Device::new(lb.clone(), quiet_config()).unwrap();
        assert_eq!(device.state(), DeviceState::Created);
        assert!(matches!(
            device.start(),
            Err(DevLinkError::InvalidState { found: "Created", .. })
        ));

        let mut p = passthrough();
        device.submit_pipeline(&mut p).unwrap();
        assert!(p.is_frozen());
        assert_eq!(device.state(), DeviceState::PipelineInstalled);
        assert!(lb.installed_graph().is_some());

        device.start().unwrap();
        assert!(matches!(device.start(), Err(DevLinkError::AlreadyRunning)));
        assert!(device.is_pipeline_running().unwrap());

        device.close();
        device.close();
        assert_eq!(device.state(), DeviceState::Closed);
        assert!(!lb.is_connected());
    }

    #[test]
    fn test_second_submit_is_invalid() {
        let lb = Arc::new(LoopbackTransport::new());
        let mut device = Device::new(lb, quiet_config()).unwrap();
        device.submit_pipeline(&mut passthrough()).unwrap();
        assert!(matches!(
            device.submit_pipeline(&mut passthrough()),
            Err(DevLinkError::InvalidState { expected: "Created", .. })
        ));
    }

    #[test]
    fn test_rejected_graph() {
        let lb = Arc::new(LoopbackTransport::new());
        lb.reject_pipelines(Some("out of memory"));
        let mut device = Device::new(lb, quiet_config()).unwrap();
        let err = device.submit_pipeline(&mut passthrough()).unwrap_err();
        assert!(matches!(err, DevLinkError::GraphRejected(ref r) if r == "out of memory"));
        assert_eq!(device.state(), DeviceState::Created);
    }

    #[test]
    fn test_queue_lookup() {
        let lb = Arc::new(LoopbackTransport::new());
        let mut device = Device::new(lb, quiet_config()).unwrap();
        assert!(matches!(
            device.get_output_queue_default("out"),
            Err(DevLinkError::UnknownStream(_))
        ));
        device.submit_pipeline(&mut passthrough()).unwrap();

        let a = device.get_output_queue("out", 4, true).unwrap();
        let b = device.get_output_queue_default("out").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        // direction matters
        assert!(matches!(
            device.get_output_queue_default("in"),
            Err(DevLinkError::UnknownStream(_))
        ));
        assert!(matches!(
            device.get_input_queue_default("out"),
            Err(DevLinkError::UnknownStream(_))
        ));
        device.get_input_queue_default("in").unwrap();
        let stats = device.stats();
        assert_eq!(stats.output_queues.len(), 1);
        assert_eq!(stats.input_queues.len(), 1);
    }

    #[test]
    fn test_close_breaks_outstanding_queues() {
        let lb = Arc::new(LoopbackTransport::new());
        let mut device = Device::new(lb, quiet_config()).unwrap();
        device.submit_pipeline(&mut passthrough()).unwrap();
        device.start().unwrap();
        let input = device.get_input_queue_default("in").unwrap();
        device.close();
        assert!(input.send(Buffer::new(vec![1])).is_err());
        assert!(matches!(
            device.ping(),
            Err(DevLinkError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_transition_is_compare_and_set() {
        let shared = SessionShared {
            state: Mutex::new(DeviceState::PipelineInstalled),
            close_reason: Mutex::new(None),
        };
        shared.mark_dead("gone".into());
        let err = shared
            .transition(DeviceState::PipelineInstalled, DeviceState::Running)
            .unwrap_err();
        assert!(matches!(
            err,
            DevLinkError::InvalidState { expected: "PipelineInstalled", found: "Closed" }
        ));
        assert_eq!(*shared.state(), DeviceState::Closed);
    }

    #[test]
    fn test_disconnected_transport() {
        let lb = Arc::new(LoopbackTransport::new());
        lb.close();
        assert!(matches!(
            Device::new(lb, quiet_config()),
            Err(DevLinkError::Transport(_))
        ));
    }
}
