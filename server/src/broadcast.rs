//! Per-tick snapshot fan-out.

use crate::registry::{ConnectionId, SharedRegistry};
use log::{debug, error, warn};
use shared::Snapshot;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

/// Outcome of publishing one snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Connections whose queue was full or closed; already unregistered.
    pub dropped: Vec<ConnectionId>,
}

/// Serializes snapshots once and queues them on every registered connection.
///
/// Sends never wait: a connection that cannot take the message right now is
/// treated as gone and removed from the registry before `publish` returns.
pub struct Broadcaster {
    registry: SharedRegistry,
    latest: watch::Sender<String>,
}

impl Broadcaster {
    /// Creates a broadcaster over `registry`, seeding the greeting snapshot
    /// with `initial` so connections that join before the first tick still
    /// receive the world state.
    pub fn new(registry: SharedRegistry, initial: &Snapshot) -> Self {
        let payload = initial.to_json().unwrap_or_else(|e| {
            error!("Failed to serialize initial snapshot: {}", e);
            String::new()
        });
        let (latest, _) = watch::channel(payload);

        Self { registry, latest }
    }

    /// The registry this broadcaster fans out to.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// The most recently published snapshot, already encoded as JSON.
    ///
    /// New connections send this right after their role message.
    pub fn latest(&self) -> String {
        self.latest.borrow().clone()
    }

    /// Encodes `snapshot` once and queues it on every registered connection.
    ///
    /// The registry is walked under its read lock; each send is a
    /// `try_send`, so no connection can hold the walk up. Connections that
    /// could not take the message are unregistered before this returns.
    pub async fn publish(&self, snapshot: &Snapshot) -> BroadcastReport {
        let payload = match snapshot.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize snapshot: {}", e);
                return BroadcastReport::default();
            }
        };
        self.latest.send_replace(payload.clone());

        let mut report = BroadcastReport::default();
        self.registry.read().await.for_each(|entry| {
            match entry.sender.try_send(Message::Text(payload.clone())) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Connection {} ({}) is not keeping up, dropping it",
                        entry.id, entry.addr
                    );
                    report.dropped.push(entry.id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Connection {} already closed", entry.id);
                    report.dropped.push(entry.id);
                }
            }
        });

        if !report.dropped.is_empty() {
            let mut registry = self.registry.write().await;
            for id in &report.dropped {
                registry.unregister(*id);
            }
        }

        report
    }
}
