//! Blocking TCP transport for ctlwire endpoints.
//!
//! Every operation is bounded by an explicit deadline so a single polling
//! tick can never stall beyond its configured timeout:
//! - connect attempts use [`TcpConnector`] with a connect timeout
//! - reads and writes on a [`ControlStream`] honor per-stream timeouts
//!
//! This is the lowest layer of ctlwire. Everything else builds on top of
//! the [`ControlStream`] type provided here.

pub mod addr;
pub mod error;
pub mod stream;
pub mod tcp;

pub use addr::EndpointAddr;
pub use error::{Result, TransportError};
pub use stream::ControlStream;
pub use tcp::{ControlListener, TcpConnector, DEFAULT_CONNECT_TIMEOUT};
