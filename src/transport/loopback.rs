//! In-process transport with a simulated coprocessor
//!
//! `LoopbackTransport` stands in for a physical link in tests, benches and
//! demos. Its device side speaks the control protocol (pipeline install,
//! start, streams query, ping, camera commands) and, once a pipeline is
//! running, forwards every packet written to an `XLinkIn` stream to the
//! `XLinkOut` streams linked directly to it.
//!
//! Faults can be injected to exercise error paths: failing streams, an
//! unresponsive control channel, slow writes and pipeline rejection.

use crate::datatype::{AutofocusMode, Message};
use crate::device::rpc::{RpcCall, RpcRequest, RpcResponse, RpcResult, RPC_STREAM};
use crate::error::{DevLinkError, Result};
use crate::pipeline::GraphDescription;
use crate::queue::packet::StreamPacket;
use crate::transport::{Transport, TransportStats};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Lifecycle of the simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedDeviceState {
    Booted,
    PipelineSet,
    Running,
}

#[derive(Debug)]
struct SimulatedDevice {
    state: SimulatedDeviceState,
    graph: Option<GraphDescription>,
    still_captures: u32,
    af_triggers: u32,
    af_mode: Option<AutofocusMode>,
}

impl SimulatedDevice {
    fn new() -> Self {
        Self {
            state: SimulatedDeviceState::Booted,
            graph: None,
            still_captures: 0,
            af_triggers: 0,
            af_mode: None,
        }
    }

    fn handle(&mut self, call: RpcCall, reject: Option<&str>) -> RpcResult {
        match call {
            RpcCall::SetPipeline(graph) => {
                if let Some(reason) = reject {
                    return RpcResult::Rejected(reason.to_string());
                }
                if self.state != SimulatedDeviceState::Booted {
                    return RpcResult::Rejected("a pipeline is already installed".into());
                }
                if let Err(reason) = graph.check_structure() {
                    return RpcResult::Rejected(reason);
                }
                tracing::debug!(nodes = graph.nodes.len(), links = graph.links.len(), "simulated device: pipeline installed");
                self.graph = Some(graph);
                self.state = SimulatedDeviceState::PipelineSet;
                RpcResult::Ack
            }
            RpcCall::StartPipeline => match self.state {
                SimulatedDeviceState::Booted => RpcResult::Error("no pipeline installed".into()),
                SimulatedDeviceState::Running => RpcResult::Error("pipeline already running".into()),
                SimulatedDeviceState::PipelineSet => {
                    self.state = SimulatedDeviceState::Running;
                    RpcResult::Ack
                }
            },
            RpcCall::GetAvailableStreams => {
                let streams = self
                    .graph
                    .as_ref()
                    .map(|g| g.stream_names().all().map(str::to_string).collect())
                    .unwrap_or_default();
                RpcResult::Streams(streams)
            }
            RpcCall::Ping => RpcResult::Ack,
            RpcCall::RequestStillCapture => self.when_running(|d| d.still_captures += 1),
            RpcCall::RequestAfTrigger => self.when_running(|d| d.af_triggers += 1),
            RpcCall::RequestAfMode(mode) => self.when_running(|d| d.af_mode = Some(mode)),
            RpcCall::IsPipelineRunning => {
                RpcResult::Bool(self.state == SimulatedDeviceState::Running)
            }
        }
    }

    fn when_running(&mut self, f: impl FnOnce(&mut Self)) -> RpcResult {
        if self.state == SimulatedDeviceState::Running {
            f(self);
            RpcResult::Ack
        } else {
            RpcResult::Error("pipeline not running".into())
        }
    }

    /// Output streams a packet written to `stream` is forwarded to.
    fn routes(&self, stream: &str) -> Vec<String> {
        match (&self.graph, self.state) {
            (Some(graph), SimulatedDeviceState::Running) => graph.direct_routes(stream),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    failing_streams: HashSet<String>,
    unresponsive: bool,
    write_delay: Duration,
    reject_pipeline: Option<String>,
}

struct Channel {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl Channel {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Most recent data packets kept per stream for [`LoopbackTransport::written`].
pub const WRITTEN_HISTORY: usize = 256;

pub struct LoopbackTransport {
    connected: AtomicBool,
    /// Packets waiting to be read by the host, per stream.
    to_host: Mutex<HashMap<String, Channel>>,
    /// Open streams and their write size limit.
    open: Mutex<HashMap<String, usize>>,
    device: Mutex<SimulatedDevice>,
    faults: Mutex<Faults>,
    stats: Mutex<TransportStats>,
    written: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    epoch: Instant,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            to_host: Mutex::new(HashMap::new()),
            open: Mutex::new(HashMap::new()),
            device: Mutex::new(SimulatedDevice::new()),
            faults: Mutex::new(Faults::default()),
            stats: Mutex::new(TransportStats::default()),
            written: Mutex::new(HashMap::new()),
            epoch: Instant::now(),
        }
    }

    /// Slow every data write down by `delay`.
    pub fn with_write_delay(self, delay: Duration) -> Self {
        lock(&self.faults).write_delay = delay;
        self
    }

    // ─── Fault injection ─────────────────────────────────────────────────

    /// Make every operation on `stream` fail. Wakes a reader blocked on it.
    pub fn fail_stream(&self, stream: &str) {
        lock(&self.faults).failing_streams.insert(stream.to_string());
        // dropping the sender disconnects any blocked reader
        lock(&self.to_host).remove(stream);
        tracing::debug!(stream, "loopback: injected stream failure");
    }

    pub fn heal_stream(&self, stream: &str) {
        lock(&self.faults).failing_streams.remove(stream);
    }

    /// Drop control requests without answering.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        lock(&self.faults).unresponsive = unresponsive;
    }

    pub fn set_write_delay(&self, delay: Duration) {
        lock(&self.faults).write_delay = delay;
    }

    /// Refuse the next pipelines with `reason` (`None` to accept again).
    pub fn reject_pipelines(&self, reason: Option<&str>) {
        lock(&self.faults).reject_pipeline = reason.map(str::to_string);
    }

    // ─── Device side ─────────────────────────────────────────────────────

    /// Deliver a message to the host on `stream` as if the device produced it.
    pub fn inject(&self, stream: &str, message: &Message) {
        match StreamPacket::serialize(message, self.epoch.elapsed()) {
            Ok(bytes) => self.inject_raw(stream, bytes),
            Err(e) => tracing::error!(stream, "loopback: cannot encode injected message: {}", e),
        }
    }

    /// Deliver raw bytes to the host on `stream`.
    pub fn inject_raw(&self, stream: &str, bytes: Vec<u8>) {
        self.push_to_host(stream, bytes);
    }

    pub fn device_state(&self) -> SimulatedDeviceState {
        lock(&self.device).state
    }

    pub fn installed_graph(&self) -> Option<GraphDescription> {
        lock(&self.device).graph.clone()
    }

    pub fn still_captures(&self) -> u32 {
        lock(&self.device).still_captures
    }

    pub fn af_triggers(&self) -> u32 {
        lock(&self.device).af_triggers
    }

    pub fn af_mode(&self) -> Option<AutofocusMode> {
        lock(&self.device).af_mode
    }

    /// Packets the host wrote to a data stream, oldest first. Only the last
    /// [`WRITTEN_HISTORY`] are kept.
    pub fn written(&self, stream: &str) -> Vec<Vec<u8>> {
        lock(&self.written)
            .get(stream)
            .map(|packets| packets.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_stream_open(&self, stream: &str) -> bool {
        lock(&self.open).contains_key(stream)
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn push_to_host(&self, stream: &str, bytes: Vec<u8>) {
        let mut channels = lock(&self.to_host);
        let channel = channels
            .entry(stream.to_string())
            .or_insert_with(Channel::new);
        // the receiver lives in the same map entry, so send cannot fail
        let _ = channel.tx.send(bytes);
    }

    fn check_usable(&self, stream: &str) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(DevLinkError::Transport("link closed".into()));
        }
        if lock(&self.faults).failing_streams.contains(stream) {
            return Err(DevLinkError::Transport(format!(
                "injected failure on stream '{}'",
                stream
            )));
        }
        Ok(())
    }

    fn fail(&self, err: DevLinkError) -> DevLinkError {
        lock(&self.stats).record_failure();
        err
    }

    fn handle_rpc(&self, data: &[u8]) {
        if lock(&self.faults).unresponsive {
            tracing::trace!("loopback: dropping control request");
            return;
        }
        let request = match RpcRequest::from_bytes(data) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("loopback: undecodable control request: {}", e);
                return;
            }
        };
        let reject = lock(&self.faults).reject_pipeline.clone();
        let result = lock(&self.device).handle(request.call, reject.as_deref());
        let response = RpcResponse {
            id: request.id,
            result,
        };
        match response.to_bytes() {
            Ok(bytes) => self.push_to_host(RPC_STREAM, bytes),
            Err(e) => tracing::error!("loopback: failed to encode control response: {}", e),
        }
    }
}

impl Transport for LoopbackTransport {
    fn open_stream(&self, name: &str, max_write_size: usize) -> Result<()> {
        self.check_usable(name).map_err(|e| self.fail(e))?;
        lock(&self.open).insert(name.to_string(), max_write_size);
        tracing::trace!(stream = name, max_write_size, "loopback: stream opened");
        Ok(())
    }

    fn close_stream(&self, name: &str) -> Result<()> {
        lock(&self.open).remove(name);
        Ok(())
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        self.check_usable(name).map_err(|e| self.fail(e))?;
        let limit = lock(&self.open).get(name).copied();
        let Some(limit) = limit else {
            return Err(self.fail(DevLinkError::Transport(format!(
                "stream '{}' is not open",
                name
            ))));
        };
        if data.len() > limit {
            return Err(self.fail(DevLinkError::Transport(format!(
                "packet of {} bytes exceeds stream limit of {}",
                data.len(),
                limit
            ))));
        }
        lock(&self.stats).record_write(data.len());

        if name == RPC_STREAM {
            self.handle_rpc(data);
            return Ok(());
        }

        let delay = lock(&self.faults).write_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        {
            let mut written = lock(&self.written);
            let history = written.entry(name.to_string()).or_default();
            if history.len() == WRITTEN_HISTORY {
                history.pop_front();
            }
            history.push_back(data.to_vec());
        }

        let routes = lock(&self.device).routes(name);
        if routes.is_empty() {
            tracing::trace!(stream = name, "loopback: packet has no route");
        }
        for out in routes {
            self.push_to_host(&out, data.to_vec());
        }
        Ok(())
    }

    fn read(&self, name: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.check_usable(name).map_err(|e| self.fail(e))?;
        if !lock(&self.open).contains_key(name) {
            return Err(self.fail(DevLinkError::Transport(format!(
                "stream '{}' is not open",
                name
            ))));
        }
        let rx = lock(&self.to_host)
            .entry(name.to_string())
            .or_insert_with(Channel::new)
            .rx
            .clone();

        match rx.recv_timeout(timeout) {
            Ok(bytes) => {
                lock(&self.stats).record_read(bytes.len());
                Ok(Some(bytes))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                // channel dropped by close() or fail_stream()
                self.check_usable(name).map_err(|e| self.fail(e))?;
                Ok(None)
            }
        }
    }

    fn close(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            lock(&self.to_host).clear();
            lock(&self.open).clear();
            tracing::debug!("loopback: link closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn description(&self) -> String {
        "loopback".to_string()
    }

    fn stats(&self) -> TransportStats {
        lock(&self.stats).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::Buffer;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_read_times_out() {
        let lb = LoopbackTransport::new();
        lb.open_stream("out", 64).unwrap();
        assert_eq!(lb.read("out", Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn test_unopened_stream_rejected() {
        let lb = LoopbackTransport::new();
        assert!(lb.write("in", &[1]).is_err());
        assert!(lb.read("in", Duration::ZERO).is_err());
        assert_eq!(lb.stats().failed_ops, 2);
    }

    #[test]
    fn test_write_size_limit() {
        let lb = LoopbackTransport::new();
        lb.open_stream("in", 4).unwrap();
        assert!(lb.write("in", &[0; 4]).is_ok());
        assert!(lb.write("in", &[0; 5]).is_err());
        assert_eq!(lb.written("in").len(), 1);
    }

    #[test]
    fn test_written_history_is_bounded() {
        let lb = LoopbackTransport::new();
        lb.open_stream("in", 64).unwrap();
        for i in 0..(WRITTEN_HISTORY + 10) {
            lb.write("in", &(i as u32).to_le_bytes()).unwrap();
        }
        let history = lb.written("in");
        assert_eq!(history.len(), WRITTEN_HISTORY);
        assert_eq!(history[0], 10u32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_healed_stream_reopens() {
        let lb = LoopbackTransport::new();
        lb.open_stream("out", 64).unwrap();
        lb.fail_stream("out");
        assert!(lb.read("out", Duration::ZERO).is_err());
        assert!(lb.open_stream("out", 64).is_err());

        lb.heal_stream("out");
        lb.open_stream("out", 64).unwrap();
        lb.inject_raw("out", vec![1, 2]);
        assert_eq!(
            lb.read("out", Duration::from_millis(100)).unwrap(),
            Some(vec![1, 2])
        );
    }

    #[test]
    fn test_inject_then_read() {
        let lb = LoopbackTransport::new();
        lb.open_stream("out", 64).unwrap();
        lb.inject("out", &Message::from(Buffer::new(vec![9, 9])));
        let raw = lb.read("out", Duration::from_millis(100)).unwrap().unwrap();
        let pkt = StreamPacket::parse(&raw).unwrap();
        assert_eq!(pkt.message.data(), Some(&[9u8, 9][..]));
    }

    #[test]
    fn test_fail_stream_wakes_reader() {
        let lb = Arc::new(LoopbackTransport::new());
        lb.open_stream("out", 64).unwrap();
        let reader = {
            let lb = lb.clone();
            thread::spawn(move || lb.read("out", Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        lb.fail_stream("out");
        assert!(reader.join().unwrap().is_err());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_close_fails_everything() {
        let lb = LoopbackTransport::new();
        lb.open_stream("in", 64).unwrap();
        lb.close();
        assert!(!lb.is_connected());
        assert!(lb.write("in", &[1]).is_err());
        assert!(lb.open_stream("in", 64).is_err());
    }
}
