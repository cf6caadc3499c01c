//! Host-side stream queues.
//!
//! Each named stream gets one queue object and one worker thread:
//!
//! ```text
//! device ──stream──► [worker] ──push──► LockingQueue ──get──► caller   (DataOutputQueue)
//! caller ──send──► LockingQueue ──pop──► [worker] ──stream──► device   (DataInputQueue)
//! ```
//!
//! A worker that hits a transport or decode error stores the reason, marks
//! the queue broken and destructs the inner [`LockingQueue`]; every later
//! caller operation fails with `StreamBroken`. Closing a queue stops and
//! joins its worker.

pub mod input;
pub mod locking;
pub mod output;
pub mod packet;

pub use input::DataInputQueue;
pub use locking::{LockingQueue, QueueDestructed};
pub use output::DataOutputQueue;
pub use packet::{PacketHeader, StreamPacket, BODY_OVERHEAD, HEADER_LEN, PACKET_MAGIC};

use crate::error::DevLinkError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Default queue depth for device streams.
pub const DEFAULT_QUEUE_SIZE: usize = 120;

/// Construction parameters shared by input and output queues.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueOptions {
    pub max_size: usize,
    /// Evict the oldest message instead of blocking when full.
    pub overwrite: bool,
    /// Upper bound on how long a worker waits before re-checking its stop flag.
    pub poll_interval: Duration,
    /// Largest packet the stream is opened for.
    pub max_write_size: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_QUEUE_SIZE,
            overwrite: false,
            poll_interval: Duration::from_millis(10),
            max_write_size: 5 * 1024 * 1024,
        }
    }
}

impl QueueOptions {
    pub fn new(max_size: usize, overwrite: bool) -> Self {
        Self {
            max_size,
            overwrite,
            ..Self::default()
        }
    }
}

/// Snapshot of a queue's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    /// Packets read from (output) or written to (input) the stream.
    pub packets: u64,
    pub bytes: u64,
    /// Messages currently held in the queue.
    pub queued: usize,
    pub broken: bool,
}

/// State shared between a queue handle and its worker.
#[derive(Debug)]
pub(crate) struct StreamShared {
    pub name: String,
    pub running: AtomicBool,
    broken: Mutex<Option<String>>,
    packets: AtomicU64,
    bytes: AtomicU64,
}

impl StreamShared {
    pub fn new(name: String) -> Self {
        Self {
            name,
            running: AtomicBool::new(true),
            broken: Mutex::new(None),
            packets: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Record the first failure reason. Later reasons are ignored.
    pub fn set_broken(&self, reason: impl Into<String>) {
        let mut broken = self.broken.lock().unwrap_or_else(|e| e.into_inner());
        if broken.is_none() {
            *broken = Some(reason.into());
        }
        self.stop();
    }

    pub fn broken_reason(&self) -> Option<String> {
        self.broken
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn broken_error(&self) -> DevLinkError {
        let reason = self
            .broken_reason()
            .unwrap_or_else(|| "queue closed".to_string());
        DevLinkError::stream_broken(self.name.clone(), reason)
    }

    pub fn record(&self, bytes: usize) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn stats(&self, queued: usize) -> QueueStats {
        QueueStats {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            queued,
            broken: self.broken_reason().is_some(),
        }
    }
}
