//! Client side of a small binary control protocol.
//!
//! ctlwire brings a set of backend endpoints to a "ready" state through a
//! two-step handshake and then broadcasts start/stop recording commands
//! with per-endpoint sequence numbers.
//!
//! # Crate Structure
//!
//! - [`transport`] — TCP connect with deadlines, listener, endpoint addresses
//! - [`frame`] — 21-byte header and configuration body codec
//! - [`session`] — Endpoint handshake sessions, coordinator, poll scheduler
//!   (behind `session` feature)
//!
//! # Example
//!
//! ```no_run
//! use ctlwire::frame::CommandKind;
//! use ctlwire::session::{CommandParams, Coordinator, CoordinatorConfig};
//!
//! let mut coordinator = Coordinator::new(&CoordinatorConfig::default())?;
//! while !coordinator.tick() {
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//! }
//! let report = coordinator.broadcast_command(CommandKind::Start, &CommandParams::default());
//! assert!(report.is_success());
//! # Ok::<(), ctlwire::session::ConfigurationError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use ctlwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ctlwire_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use ctlwire_session::*;
}
