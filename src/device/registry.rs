//! Per-session registry of open stream queues, keyed by stream name.
//!
//! Once [`QueueRegistry::break_all`] or [`QueueRegistry::close_all`] has run,
//! the registry refuses to create queues: the reason is recorded before the
//! queue maps are locked, so a queue built concurrently is either refused or
//! already registered and gets broken with the rest.

use crate::error::{DevLinkError, Result};
use crate::queue::{DataInputQueue, DataOutputQueue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
pub struct QueueRegistry {
    outputs: Mutex<HashMap<String, Arc<DataOutputQueue>>>,
    inputs: Mutex<HashMap<String, Arc<DataInputQueue>>>,
    /// Why the session stopped accepting queues.
    failed: Mutex<Option<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_accepting(&self, name: &str) -> Result<()> {
        match lock(&self.failed).as_ref() {
            Some(reason) => Err(DevLinkError::stream_broken(name, reason.clone())),
            None => Ok(()),
        }
    }

    fn record_failure(&self, reason: &str) {
        lock(&self.failed).get_or_insert_with(|| reason.to_string());
    }

    pub fn failure_reason(&self) -> Option<String> {
        lock(&self.failed).clone()
    }

    /// Existing queue for `name`, or the one built by `create`.
    ///
    /// Fails with `StreamBroken` once the registry has been broken or closed.
    pub fn output_or_insert_with(
        &self,
        name: &str,
        create: impl FnOnce() -> Result<DataOutputQueue>,
    ) -> Result<Arc<DataOutputQueue>> {
        let mut outputs = lock(&self.outputs);
        self.check_accepting(name)?;
        if let Some(q) = outputs.get(name) {
            return Ok(q.clone());
        }
        let q = Arc::new(create()?);
        outputs.insert(name.to_string(), q.clone());
        Ok(q)
    }

    pub fn input_or_insert_with(
        &self,
        name: &str,
        create: impl FnOnce() -> Result<DataInputQueue>,
    ) -> Result<Arc<DataInputQueue>> {
        let mut inputs = lock(&self.inputs);
        self.check_accepting(name)?;
        if let Some(q) = inputs.get(name) {
            return Ok(q.clone());
        }
        let q = Arc::new(create()?);
        inputs.insert(name.to_string(), q.clone());
        Ok(q)
    }

    pub fn output(&self, name: &str) -> Option<Arc<DataOutputQueue>> {
        lock(&self.outputs).get(name).cloned()
    }

    pub fn input(&self, name: &str) -> Option<Arc<DataInputQueue>> {
        lock(&self.inputs).get(name).cloned()
    }

    pub fn output_count(&self) -> usize {
        lock(&self.outputs).len()
    }

    pub fn input_count(&self) -> usize {
        lock(&self.inputs).len()
    }

    /// Fail every registered queue with `reason` and refuse new ones.
    pub fn break_all(&self, reason: &str) {
        self.record_failure(reason);
        for q in lock(&self.outputs).values() {
            q.mark_broken(reason);
        }
        for q in lock(&self.inputs).values() {
            q.mark_broken(reason);
        }
    }

    /// Close and unregister every queue, joining their workers.
    pub fn close_all(&self) {
        self.record_failure("session closed");
        let outputs: Vec<_> = lock(&self.outputs).drain().map(|(_, q)| q).collect();
        let inputs: Vec<_> = lock(&self.inputs).drain().map(|(_, q)| q).collect();
        for q in &outputs {
            q.close();
        }
        for q in &inputs {
            q.close();
        }
    }
}
