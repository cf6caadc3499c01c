//! Control-channel error paths against a scripted transport

mod common;

use common::builders;
use common::mock_helpers::{connected_link, response, MockLink};
use devlink::device::RpcResult;
use devlink::transport::TransportStats;
use devlink::{DevLinkError, Device, DeviceConfig};
use std::sync::Arc;
use std::time::Duration;

fn config() -> DeviceConfig {
    let mut config = common::quiet_config();
    config.rpc.timeout_ms = 60;
    config
}

/// Link that accepts every write and answers reads from `script`, then idles.
fn scripted(script: Vec<Vec<u8>>) -> MockLink {
    let mut link = connected_link();
    link.expect_write().returning(|_, _| Ok(()));
    let mut script = script.into_iter();
    link.expect_read().returning(move |_, timeout| match script.next() {
        Some(bytes) => Ok(Some(bytes)),
        None => {
            std::thread::sleep(timeout.min(Duration::from_millis(5)));
            Ok(None)
        }
    });
    link
}

#[test]
fn test_disconnected_link_is_refused() {
    let mut link = MockLink::new();
    link.expect_is_connected().return_const(false);
    link.expect_description().return_const("mock".to_string());
    let err = Device::new(Arc::new(link), config()).err().unwrap();
    assert!(matches!(err, DevLinkError::Transport(_)));
}

#[test]
fn test_control_stream_open_failure() {
    let mut link = MockLink::new();
    link.expect_is_connected().return_const(true);
    link.expect_description().return_const("mock".to_string());
    link.expect_open_stream()
        .returning(|_, _| Err(DevLinkError::Transport("no endpoint".into())));
    let err = Device::new(Arc::new(link), config()).err().unwrap();
    match err {
        DevLinkError::WithContext { context, source } => {
            assert_eq!(context, "opening control channel");
            assert!(matches!(*source, DevLinkError::Transport(ref m) if m == "no endpoint"));
        }
        other => panic!("expected context-wrapped transport error, got {}", other),
    }
}

#[test]
fn test_write_failure_propagates() {
    let mut link = connected_link();
    link.expect_write()
        .returning(|_, _| Err(DevLinkError::Transport("usb reset".into())));
    let device = Device::new(Arc::new(link), config()).unwrap();
    let err = device.ping().unwrap_err();
    assert!(err.to_string().contains("usb reset"));
}

#[test]
fn test_stale_and_garbage_responses_are_skipped() {
    // first call gets id 1
    let link = scripted(vec![
        response(99, RpcResult::Ack),
        vec![0xC1, 0x00],
        response(1, RpcResult::Ack),
    ]);
    let device = Device::new(Arc::new(link), config()).unwrap();
    device.ping().unwrap();
}

#[test]
fn test_silence_times_out() {
    let device = Device::new(Arc::new(scripted(Vec::new())), config()).unwrap();
    let err = device.ping().unwrap_err();
    assert!(matches!(err, DevLinkError::Rpc(ref m) if m.contains("timed out")));
}

#[test]
fn test_rejection_maps_to_graph_rejected() {
    let link = scripted(vec![response(1, RpcResult::Rejected("too many nodes".into()))]);
    let mut device = Device::new(Arc::new(link), config()).unwrap();
    let mut pipeline = builders::encoder_graph();
    let err = device.submit_pipeline(&mut pipeline).unwrap_err();
    assert!(matches!(err, DevLinkError::GraphRejected(ref r) if r == "too many nodes"));
    assert!(pipeline.is_frozen());
}

#[test]
fn test_wrong_result_shape() {
    let link = scripted(vec![response(1, RpcResult::Ack)]);
    let device = Device::new(Arc::new(link), config()).unwrap();
    let err = device.is_pipeline_running().unwrap_err();
    assert!(matches!(err, DevLinkError::Rpc(ref m) if m.contains("unexpected response")));
    assert_eq!(device.stats().transport, TransportStats::default());
}
