//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use devlink::config::DeviceConfig;
use devlink::transport::LoopbackTransport;
use devlink::Device;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(1)
}

/// Poll `cond` until it holds or `timeout` elapses
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Session config with the watchdog off and short RPC timeouts
pub fn quiet_config() -> DeviceConfig {
    let mut config = DeviceConfig::default();
    config.watchdog.enabled = false;
    config.rpc.timeout_ms = 250;
    config.queues.poll_interval_ms = 5;
    config
}

/// Config whose watchdog gives up after two quick failed pings
pub fn fast_watchdog_config() -> DeviceConfig {
    let mut config = quiet_config();
    config.watchdog.enabled = true;
    config.watchdog.interval_ms = 20;
    config.watchdog.max_failures = 2;
    config.rpc.timeout_ms = 40;
    config
}

/// Open a session on a fresh loopback link
pub fn loopback_device(config: DeviceConfig) -> (Arc<LoopbackTransport>, Device) {
    let lb = Arc::new(LoopbackTransport::new());
    let device = Device::new(lb.clone(), config).expect("loopback session opens");
    (lb, device)
}

/// Loopback session with the `"in"` → `"out"` passthrough graph running
pub fn running_passthrough(config: DeviceConfig) -> (Arc<LoopbackTransport>, Device) {
    let (lb, mut device) = loopback_device(config);
    let mut pipeline = builders::passthrough("in", "out");
    device.submit_pipeline(&mut pipeline).expect("graph accepted");
    device.start().expect("pipeline starts");
    (lb, device)
}
