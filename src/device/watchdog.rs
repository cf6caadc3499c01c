//! Session liveness watchdog.
//!
//! Pings the device on a fixed interval. After `max_failures` consecutive
//! failed pings it calls `on_dead` once and exits. Stopping is signalled over
//! a channel so the thread wakes immediately and can be joined.

use crate::error::Result;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Ping counters shared with the session.
#[derive(Debug, Default)]
pub struct WatchdogCounters {
    pub pings_ok: AtomicU64,
    pub pings_failed: AtomicU64,
}

impl WatchdogCounters {
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.pings_ok.load(Ordering::Relaxed),
            self.pings_failed.load(Ordering::Relaxed),
        )
    }
}

pub struct Watchdog {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn spawn<P, D>(
        interval: Duration,
        max_failures: u32,
        counters: Arc<WatchdogCounters>,
        ping: P,
        on_dead: D,
    ) -> Result<Self>
    where
        P: Fn() -> Result<()> + Send + 'static,
        D: FnOnce(String) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || {
                tracing::debug!(?interval, max_failures, "watchdog started");
                let mut failures = 0u32;
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        // stop requested or session dropped
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    match ping() {
                        Ok(()) => {
                            failures = 0;
                            counters.pings_ok.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            failures += 1;
                            counters.pings_failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(failures, max_failures, "watchdog ping failed: {}", e);
                            if failures >= max_failures {
                                let reason = format!(
                                    "device watchdog: {} consecutive pings failed, last error: {}",
                                    failures, e
                                );
                                tracing::error!("{}", reason);
                                on_dead(reason);
                                break;
                            }
                        }
                    }
                }
                tracing::debug!("watchdog stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // fails only if the thread already exited
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("watchdog thread panicked");
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
