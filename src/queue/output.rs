//! Device → host queue.

use crate::datatype::{DatatypeKind, Message, Payload};
use crate::error::{Result, ResultExt};
use crate::queue::locking::LockingQueue;
use crate::queue::packet::StreamPacket;
use crate::queue::{QueueOptions, QueueStats, StreamShared};
use crate::transport::Transport;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Receives messages from one named device stream.
///
/// A background worker reads packets from the transport and enqueues them.
/// Typed getters pop the head message and return `None` if it is of a
/// different kind; the message is consumed either way.
pub struct DataOutputQueue {
    shared: Arc<StreamShared>,
    queue: Arc<LockingQueue<StreamPacket>>,
    transport: Arc<dyn Transport>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DataOutputQueue {
    /// Open `stream_name` and start the reader worker.
    pub fn new(
        transport: Arc<dyn Transport>,
        stream_name: impl Into<String>,
        options: QueueOptions,
    ) -> Result<Self> {
        let name = stream_name.into();
        transport
            .open_stream(&name, options.max_write_size)
            .with_context(|| format!("opening output stream '{}'", name))?;

        let shared = Arc::new(StreamShared::new(name.clone()));
        let queue = Arc::new(LockingQueue::new(options.max_size, options.overwrite));

        let worker = {
            let transport = transport.clone();
            let shared = shared.clone();
            let queue = queue.clone();
            let poll = options.poll_interval;
            thread::Builder::new()
                .name(format!("out:{}", name))
                .spawn(move || read_loop(transport, shared, queue, poll))?
        };
        tracing::debug!(stream = %name, max_size = options.max_size, overwrite = options.overwrite, "output queue opened");

        Ok(Self {
            shared,
            queue,
            transport,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_broken(&self) -> bool {
        self.shared.broken_reason().is_some()
    }

    pub fn broken_reason(&self) -> Option<String> {
        self.shared.broken_reason()
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.stats(self.queue.len())
    }

    fn check(&self) -> Result<()> {
        if self.queue.is_destructed() {
            return Err(self.shared.broken_error());
        }
        Ok(())
    }

    /// True if at least one message is queued.
    pub fn has(&self) -> Result<bool> {
        self.check()?;
        Ok(!self.queue.is_empty())
    }

    /// True if the head message is of `kind`.
    pub fn has_kind(&self, kind: DatatypeKind) -> Result<bool> {
        self.check()?;
        Ok(self.queue.front_with(|p| p.message.kind()) == Some(kind))
    }

    pub fn has_type<T: Payload>(&self) -> Result<bool> {
        self.has_kind(T::KIND)
    }

    pub fn try_get_packet(&self) -> Result<Option<StreamPacket>> {
        self.check()?;
        Ok(self.queue.try_pop())
    }

    pub fn try_get_message(&self) -> Result<Option<Message>> {
        Ok(self.try_get_packet()?.map(|p| p.message))
    }

    pub fn try_get<T: Payload>(&self) -> Result<Option<T>> {
        Ok(self.try_get_message()?.and_then(T::from_message))
    }

    /// Block until a packet arrives.
    pub fn get_packet(&self) -> Result<StreamPacket> {
        self.queue
            .wait_and_pop()
            .map_err(|_| self.shared.broken_error())
    }

    pub fn get_message(&self) -> Result<Message> {
        Ok(self.get_packet()?.message)
    }

    pub fn get<T: Payload>(&self) -> Result<Option<T>> {
        Ok(T::from_message(self.get_message()?))
    }

    /// Block up to `timeout`; `Ok(None)` if nothing arrived.
    pub fn get_packet_timeout(&self, timeout: Duration) -> Result<Option<StreamPacket>> {
        self.queue
            .try_wait_and_pop(timeout)
            .map_err(|_| self.shared.broken_error())
    }

    pub fn get_message_timeout(&self, timeout: Duration) -> Result<Option<Message>> {
        Ok(self.get_packet_timeout(timeout)?.map(|p| p.message))
    }

    pub fn get_timeout<T: Payload>(&self, timeout: Duration) -> Result<Option<T>> {
        Ok(self.get_message_timeout(timeout)?.and_then(T::from_message))
    }

    /// Fail the queue from outside, e.g. when the session dies.
    pub(crate) fn mark_broken(&self, reason: &str) {
        self.shared.set_broken(reason);
        self.queue.destruct();
    }

    /// Stop and join the worker, then close the stream. Idempotent.
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
            tracing::error!(stream = %self.shared.name, "output worker panicked");
        }
        if let Err(e) = self.transport.close_stream(&self.shared.name) {
            tracing::warn!(stream = %self.shared.name, "failed to close stream: {}", e);
        }
        tracing::debug!(stream = %self.shared.name, "output queue closed");
    }
}

impl std::fmt::Debug for DataOutputQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataOutputQueue")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

impl Drop for DataOutputQueue {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(
    transport: Arc<dyn Transport>,
    shared: Arc<StreamShared>,
    queue: Arc<LockingQueue<StreamPacket>>,
    poll: Duration,
) {
    tracing::debug!(stream = %shared.name, "output worker started");
    while shared.is_running() {
        let raw = match transport.read(&shared.name, poll) {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(stream = %shared.name, "read failed: {}", e);
                shared.set_broken(e.to_string());
                queue.destruct();
                break;
            }
        };
        let packet = match StreamPacket::parse(&raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(stream = %shared.name, "bad packet: {}", e);
                shared.set_broken(e.to_string());
                queue.destruct();
                break;
            }
        };
        let kind = packet.message.kind();
        // blocks while full in blocking mode; destruct() releases it on close
        if queue.push(packet).is_err() {
            break;
        }
        shared.record(raw.len());
        tracing::trace!(stream = %shared.name, %kind, bytes = raw.len(), "packet received");
    }
    tracing::debug!(stream = %shared.name, "output worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::{Buffer, ImgFrame, FrameType};
    use crate::error::DevLinkError;
    use crate::transport::LoopbackTransport;
    use std::time::Instant;

    fn open(lb: &Arc<LoopbackTransport>, name: &str, options: QueueOptions) -> DataOutputQueue {
        DataOutputQueue::new(lb.clone(), name, options).unwrap()
    }

    #[test]
    fn test_receives_injected_messages() {
        let lb = Arc::new(LoopbackTransport::new());
        let q = open(&lb, "out", QueueOptions::default());
        lb.inject("out", &Message::from(Buffer::new(vec![1, 2, 3])));

        let buf: Buffer = q.get_timeout(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(buf.data, vec![1, 2, 3]);
        let deadline = Instant::now() + Duration::from_secs(1);
        while q.stats().packets == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        // length prefix plus three data bytes
        assert_eq!(q.stats().bytes, (crate::queue::HEADER_LEN + 4) as u64);
    }

    #[test]
    fn test_typed_get_mismatch_consumes() {
        let lb = Arc::new(LoopbackTransport::new());
        let q = open(&lb, "out", QueueOptions::default());
        lb.inject("out", &Message::from(ImgFrame::new(2, 2, FrameType::Gray8)));

        let deadline = Instant::now() + Duration::from_secs(1);
        while !q.has().unwrap() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(q.has_type::<ImgFrame>().unwrap());
        assert!(!q.has_kind(DatatypeKind::NNData).unwrap());
        assert_eq!(q.try_get::<Buffer>().unwrap(), None);
        assert!(!q.has().unwrap());
    }

    #[test]
    fn test_timeout_is_not_an_error() {
        let lb = Arc::new(LoopbackTransport::new());
        let q = open(&lb, "out", QueueOptions::default());
        assert_eq!(q.get_message_timeout(Duration::from_millis(20)).unwrap(), None);
    }

    #[test]
    fn test_read_failure_breaks_queue() {
        let lb = Arc::new(LoopbackTransport::new());
        let q = open(&lb, "out", QueueOptions::default());
        lb.fail_stream("out");

        let err = q.get_message().unwrap_err();
        assert!(err.is_stream_broken());
        assert!(q.is_broken());
        assert!(q.has().unwrap_err().is_stream_broken());
    }

    #[test]
    fn test_open_failure_names_the_stream() {
        let lb = Arc::new(LoopbackTransport::new());
        lb.fail_stream("out");
        let err = DataOutputQueue::new(lb.clone(), "out", QueueOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, DevLinkError::WithContext { .. }));
        assert!(err.to_string().starts_with("opening output stream 'out'"));
    }

    #[test]
    fn test_reopen_after_healed_stream() {
        let lb = Arc::new(LoopbackTransport::new());
        let broken = open(&lb, "out", QueueOptions::default());
        lb.fail_stream("out");
        assert!(broken.get_message().unwrap_err().is_stream_broken());
        broken.close();

        lb.heal_stream("out");
        let q = open(&lb, "out", QueueOptions::default());
        lb.inject("out", &Message::from(Buffer::new(vec![4, 2])));
        let buf: Buffer = q.get_timeout(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(buf.data, vec![4, 2]);
        assert!(broken.is_broken());
        assert!(!q.is_broken());
    }

    #[test]
    fn test_malformed_packet_breaks_queue() {
        let lb = Arc::new(LoopbackTransport::new());
        let q = open(&lb, "out", QueueOptions::default());
        lb.inject_raw("out", vec![0xAB; 20]);
        let err = q.get_message_timeout(Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_overwrite_keeps_newest() {
        let lb = Arc::new(LoopbackTransport::new());
        let q = open(&lb, "out", QueueOptions::new(2, true));
        for i in 0..5u8 {
            lb.inject("out", &Message::from(Buffer::new(vec![i])));
        }
        let deadline = Instant::now() + Duration::from_secs(1);
        while q.stats().packets < 5 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        let a: Buffer = q.try_get().unwrap().unwrap();
        let b: Buffer = q.try_get().unwrap().unwrap();
        assert_eq!((a.data[0], b.data[0]), (3, 4));
    }

    #[test]
    fn test_close_joins_worker_and_is_idempotent() {
        let lb = Arc::new(LoopbackTransport::new());
        let q = open(&lb, "out", QueueOptions::default());
        assert!(lb.is_stream_open("out"));
        q.close();
        q.close();
        assert!(!lb.is_stream_open("out"));
        assert!(q.get_message().unwrap_err().is_stream_broken());
    }

    #[test]
    fn test_close_releases_full_blocking_queue() {
        let lb = Arc::new(LoopbackTransport::new());
        let q = open(&lb, "out", QueueOptions::new(1, false));
        for i in 0..3u8 {
            lb.inject("out", &Message::from(Buffer::new(vec![i])));
        }
        thread::sleep(Duration::from_millis(30));
        let start = Instant::now();
        drop(q);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
