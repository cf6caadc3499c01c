//! # devlink: host runtime for vision coprocessors
//!
//! Describe a processing graph on the host, install it on a coprocessor and
//! exchange typed messages with it over named streams.
//!
//! ## Architecture
//!
//! - **Pipeline**: graph of typed nodes and links, validated on every edit
//!   and serialized to a [`GraphDescription`](pipeline::GraphDescription)
//! - **Datatype**: the closed set of [`Message`] payloads and their wire format
//! - **Queue**: bounded [`LockingQueue`](queue::LockingQueue) plus one worker
//!   thread per host stream, in each direction
//! - **Device**: session state machine, control channel, queue registry and
//!   liveness watchdog
//! - **Transport**: the link abstraction, with an in-process loopback device
//!
//! ## Example
//!
//! ```no_run
//! use devlink::{
//!     config::DeviceConfig,
//!     datatype::Buffer,
//!     pipeline::{Pipeline, XLinkIn, XLinkOut},
//!     transport::LoopbackTransport,
//!     Device,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! fn main() -> devlink::Result<()> {
//!     let config = DeviceConfig::load_or_default();
//!     let _guard = devlink::logging::init(&config.logging)?;
//!
//!     let mut pipeline = Pipeline::new();
//!     let xin = pipeline.create(XLinkIn::new("in"))?;
//!     let xout = pipeline.create(XLinkOut::new("out"))?;
//!     pipeline.link(xin.out(), xout.input())?;
//!
//!     let mut device = Device::new(Arc::new(LoopbackTransport::new()), config)?;
//!     device.submit_pipeline(&mut pipeline)?;
//!     device.start()?;
//!
//!     let input = device.get_input_queue_default("in")?;
//!     let output = device.get_output_queue_default("out")?;
//!     input.send(Buffer::new(b"hello".to_vec()))?;
//!     let echoed: Option<Buffer> = output.get_timeout(Duration::from_secs(1))?;
//!     println!("{:?}", echoed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod datatype;
pub mod device;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod transport;

// Re-export commonly used types
pub use config::DeviceConfig;
pub use datatype::{DatatypeKind, Message, Payload};
pub use device::{Device, DeviceState, SessionStats};
pub use error::{DevLinkError, Result, ResultExt};
pub use pipeline::{Pipeline, PipelineError};
pub use queue::{DataInputQueue, DataOutputQueue, QueueOptions};
pub use transport::{LoopbackTransport, Transport};
