//! Host → device queue.

use crate::datatype::Message;
use crate::error::{DevLinkError, Result, ResultExt};
use crate::queue::locking::{LockingQueue, QueueDestructed};
use crate::queue::packet::StreamPacket;
use crate::queue::{QueueOptions, QueueStats, StreamShared};
use crate::transport::Transport;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Sends messages to one named device stream.
///
/// Messages are stamped with the time since the queue was opened and written
/// by a background worker in the order they were enqueued.
pub struct DataInputQueue {
    shared: Arc<StreamShared>,
    queue: Arc<LockingQueue<StreamPacket>>,
    transport: Arc<dyn Transport>,
    worker: Mutex<Option<JoinHandle<()>>>,
    epoch: Instant,
}

impl DataInputQueue {
    /// Open `stream_name` and start the writer worker.
    pub fn new(
        transport: Arc<dyn Transport>,
        stream_name: impl Into<String>,
        options: QueueOptions,
    ) -> Result<Self> {
        let name = stream_name.into();
        transport
            .open_stream(&name, options.max_write_size)
            .with_context(|| format!("opening input stream '{}'", name))?;

        let shared = Arc::new(StreamShared::new(name.clone()));
        let queue = Arc::new(LockingQueue::new(options.max_size, options.overwrite));

        let worker = {
            let transport = transport.clone();
            let shared = shared.clone();
            let queue = queue.clone();
            let poll = options.poll_interval;
            thread::Builder::new()
                .name(format!("in:{}", name))
                .spawn(move || write_loop(transport, shared, queue, poll))?
        };
        tracing::debug!(stream = %name, max_size = options.max_size, "input queue opened");

        Ok(Self {
            shared,
            queue,
            transport,
            worker: Mutex::new(Some(worker)),
            epoch: Instant::now(),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_broken(&self) -> bool {
        self.shared.broken_reason().is_some()
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.stats(self.queue.len())
    }

    fn packet(&self, message: impl Into<Message>) -> StreamPacket {
        StreamPacket::new(message.into(), self.epoch.elapsed())
    }

    fn broken(&self, _: QueueDestructed) -> DevLinkError {
        self.shared.broken_error()
    }

    /// Enqueue a message, blocking while the queue is full (unless overwriting).
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        let packet = self.packet(message);
        self.queue.push(packet).map_err(|e| self.broken(e))
    }

    /// Wait until every earlier message has been taken by the worker, then
    /// enqueue. Keeps at most one message in flight.
    pub fn send_sync(&self, message: impl Into<Message>) -> Result<()> {
        self.queue.wait_empty().map_err(|e| self.broken(e))?;
        self.send(message)
    }

    /// Enqueue, waiting at most `timeout` for space. `Ok(false)` on timeout.
    pub fn send_timeout(&self, message: impl Into<Message>, timeout: Duration) -> Result<bool> {
        let packet = self.packet(message);
        self.queue
            .try_wait_and_push(packet, timeout)
            .map_err(|e| self.broken(e))
    }

    pub(crate) fn mark_broken(&self, reason: &str) {
        self.shared.set_broken(reason);
        self.queue.destruct();
    }

    /// Stop and join the worker, then close the stream. Unsent messages are
    /// dropped. Idempotent.
    pub fn close(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };
        self.shared.stop();
        self.queue.destruct();
        if handle.join().is_err() {
            tracing::error!(stream = %self.shared.name, "input worker panicked");
        }
        if let Err(e) = self.transport.close_stream(&self.shared.name) {
            tracing::warn!(stream = %self.shared.name, "failed to close stream: {}", e);
        }
        tracing::debug!(stream = %self.shared.name, "input queue closed");
    }
}

impl std::fmt::Debug for DataInputQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataInputQueue")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

impl Drop for DataInputQueue {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_loop(
    transport: Arc<dyn Transport>,
    shared: Arc<StreamShared>,
    queue: Arc<LockingQueue<StreamPacket>>,
    poll: Duration,
) {
    tracing::debug!(stream = %shared.name, "input worker started");
    while shared.is_running() {
        let packet = match queue.try_wait_and_pop(poll) {
            Ok(Some(p)) => p,
            Ok(None) => continue,
            Err(QueueDestructed) => break,
        };
        let bytes = match StreamPacket::serialize(&packet.message, packet.timestamp) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(stream = %shared.name, "dropping unencodable packet: {}", e);
                continue;
            }
        };
        if let Err(e) = transport.write(&shared.name, &bytes) {
            tracing::error!(stream = %shared.name, "write failed: {}", e);
            shared.set_broken(e.to_string());
            queue.destruct();
            break;
        }
        shared.record(bytes.len());
        tracing::trace!(stream = %shared.name, kind = %packet.message.kind(), bytes = bytes.len(), "packet sent");
    }
    tracing::debug!(stream = %shared.name, "input worker stopped");
}
