//! Mock construction helpers

use devlink::device::{RpcResponse, RpcResult};
use devlink::transport::{Transport, TransportStats};
use mockall::mock;
use std::time::Duration;

// `Transport` whose every call is scripted by the test
mock! {
    pub Link {}

    impl Transport for Link {
        fn open_stream(&self, name: &str, max_write_size: usize) -> devlink::Result<()>;
        fn close_stream(&self, name: &str) -> devlink::Result<()>;
        fn write(&self, name: &str, data: &[u8]) -> devlink::Result<()>;
        fn read(&self, name: &str, timeout: Duration) -> devlink::Result<Option<Vec<u8>>>;
        fn close(&self);
        fn is_connected(&self) -> bool;
        fn description(&self) -> String;
        fn stats(&self) -> TransportStats;
    }
}

/// Mock that accepts stream open/close and reports itself connected
pub fn connected_link() -> MockLink {
    let mut link = MockLink::new();
    link.expect_is_connected().return_const(true);
    link.expect_description().return_const("mock".to_string());
    link.expect_open_stream().returning(|_, _| Ok(()));
    link.expect_close_stream().returning(|_| Ok(()));
    link.expect_close().return_const(());
    link.expect_stats().returning(TransportStats::default);
    link
}

/// Encoded response to request `id`
pub fn response(id: u64, result: RpcResult) -> Vec<u8> {
    RpcResponse { id, result }.to_bytes().unwrap()
}
