use std::sync::mpsc;

use ctlwire_frame::CommandKind;
use tracing::{info, warn};

use crate::config::EndpointId;

/// Receiver of coordinator notifications.
///
/// Every method defaults to a no-op so sinks implement only what they need.
pub trait EventSink: Send {
    /// An endpoint entered or left `Ready`.
    fn readiness_changed(&mut self, _id: &EndpointId, _ready: bool) {}

    /// Every endpoint is `Ready`. Fires once per transition into that condition.
    fn all_ready(&mut self) {}

    /// A broadcast finished. `failed` is empty on full success.
    fn command_result(&mut self, _kind: CommandKind, _failed: &[EndpointId]) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {}

/// Logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn readiness_changed(&mut self, id: &EndpointId, ready: bool) {
        info!(endpoint = %id, ready, "readiness changed");
    }

    fn all_ready(&mut self) {
        info!("all endpoints ready");
    }

    fn command_result(&mut self, kind: CommandKind, failed: &[EndpointId]) {
        if failed.is_empty() {
            info!(command = %kind, "command delivered to all endpoints");
        } else {
            let failed: Vec<String> = failed.iter().map(ToString::to_string).collect();
            warn!(command = %kind, failed = ?failed, "command not delivered everywhere");
        }
    }
}

/// An owned copy of one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    ReadinessChanged { id: EndpointId, ready: bool },
    AllReady,
    CommandResult {
        kind: CommandKind,
        failed: Vec<EndpointId>,
    },
}

/// Forwards events over a channel. Send errors (receiver gone) are ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<CoordinatorEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::Receiver<CoordinatorEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn readiness_changed(&mut self, id: &EndpointId, ready: bool) {
        let _ = self.tx.send(CoordinatorEvent::ReadinessChanged {
            id: id.clone(),
            ready,
        });
    }

    fn all_ready(&mut self) {
        let _ = self.tx.send(CoordinatorEvent::AllReady);
    }

    fn command_result(&mut self, kind: CommandKind, failed: &[EndpointId]) {
        let _ = self.tx.send(CoordinatorEvent::CommandResult {
            kind,
            failed: failed.to_vec(),
        });
    }
}
