//! Transport trait for the host↔device link
//!
//! The runtime only needs named, message-framed byte streams. A real link
//! (USB, PCIe) and the in-process [`LoopbackTransport`] both implement
//! [`Transport`]; queues and the session hold it as `Arc<dyn Transport>`.
//!
//! Reads take a timeout so that stream workers can observe their stop flag
//! between reads and be joined on teardown.

pub mod loopback;

pub use loopback::{LoopbackTransport, SimulatedDeviceState, WRITTEN_HISTORY};

use crate::error::Result;
use serde::Serialize;
use std::time::Duration;

/// Counters for link traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub packets_written: u64,
    pub packets_read: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    /// Operations that returned an error
    pub failed_ops: u64,
}

impl TransportStats {
    pub fn record_write(&mut self, bytes: usize) {
        self.packets_written += 1;
        self.bytes_written += bytes as u64;
    }

    pub fn record_read(&mut self, bytes: usize) {
        self.packets_read += 1;
        self.bytes_read += bytes as u64;
    }

    pub fn record_failure(&mut self) {
        self.failed_ops += 1;
    }

    /// Percentage of operations that succeeded
    pub fn success_rate(&self) -> f64 {
        let ok = self.packets_written + self.packets_read;
        let total = ok + self.failed_ops;
        if total == 0 {
            100.0
        } else {
            ok as f64 / total as f64 * 100.0
        }
    }
}

/// A connection to one device exposing named packet streams.
///
/// Each stream is used by one writer and one reader at a time; the trait
/// itself must be shareable across the worker threads.
pub trait Transport: Send + Sync {
    /// Open a named stream. `max_write_size` bounds a single packet.
    fn open_stream(&self, name: &str, max_write_size: usize) -> Result<()>;

    fn close_stream(&self, name: &str) -> Result<()>;

    /// Write one packet to a stream.
    fn write(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Read one packet, waiting at most `timeout`. `Ok(None)` on timeout.
    fn read(&self, name: &str, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Tear the link down. Pending and later operations fail.
    fn close(&self);

    fn is_connected(&self) -> bool;

    /// Human-readable identity of the remote end
    fn description(&self) -> String {
        "device".to_string()
    }

    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}
