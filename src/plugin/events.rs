//! Event Bus
//!
//! Fan-out of editor lifecycle events to subscribed plugin contexts.
//! Subscriptions are keyed by (plugin id, event kind); a plugin
//! re-subscribing to the same kind replaces the old entry rather than
//! doubling deliveries. Publish is synchronous fan-out over unbounded
//! senders, so it never blocks the editor side.

use log::{debug, warn};
use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;

use crate::plugin::protocol::{EditorEvent, EventKind, HostMessage};

struct Subscription {
    plugin_id: String,
    kind: EventKind,
    sender: UnboundedSender<HostMessage>,
}

/// Editor event fan-out to plugin contexts
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe a plugin context to one event kind.
    ///
    /// An existing subscription for the same plugin and kind is replaced
    /// so repeated activation never duplicates deliveries.
    pub fn subscribe(&self, plugin_id: &str, kind: EventKind, sender: UnboundedSender<HostMessage>) {
        let mut subscriptions = self.subscriptions.write();
        subscriptions.retain(|s| !(s.plugin_id == plugin_id && s.kind == kind));
        debug!("Plugin '{}' subscribed to {}", plugin_id, kind.event_name());
        subscriptions.push(Subscription {
            plugin_id: plugin_id.to_string(),
            kind,
            sender,
        });
    }

    /// Remove one subscription; returns whether it existed
    pub fn unsubscribe(&self, plugin_id: &str, kind: EventKind) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| !(s.plugin_id == plugin_id && s.kind == kind));
        subscriptions.len() != before
    }

    /// Drop every subscription held by a plugin; returns how many were removed
    pub fn purge(&self, plugin_id: &str) -> usize {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.plugin_id != plugin_id);
        before - subscriptions.len()
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// Subscribers whose channel has closed are dropped from the list.
    /// Returns the number of successful deliveries.
    pub fn publish(&self, event: &EditorEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        let mut subscriptions = self.subscriptions.write();
        subscriptions.retain(|s| {
            if s.kind != kind {
                return true;
            }
            match s.sender.send(HostMessage::Event { event: event.clone() }) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    warn!(
                        "Dropping subscription of '{}' to {}: channel closed",
                        s.plugin_id,
                        kind.event_name()
                    );
                    false
                }
            }
        });
        delivered
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Event kinds a plugin is currently subscribed to
    pub fn subscriptions_of(&self, plugin_id: &str) -> Vec<EventKind> {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.plugin_id == plugin_id)
            .map(|s| s.kind)
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
