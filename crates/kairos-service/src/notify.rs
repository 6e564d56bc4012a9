//! Fire-and-forget notifications about occurrences and participations.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Mutex;

use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    OccurrenceCreated,
    OccurrenceUpdated,
    OccurrenceClosed,
    ParticipationChanged,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::OccurrenceCreated => "occurrence-created",
            Self::OccurrenceUpdated => "occurrence-updated",
            Self::OccurrenceClosed => "occurrence-closed",
            Self::ParticipationChanged => "participation-changed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct NotificationEvent {
    pub occurrence_id: uuid::Uuid,
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

/// Publishing never waits for delivery and never fails the caller.
pub trait NotificationBus: Send + Sync {
    fn publish(&self, event: NotificationEvent);

    /// Adds a user to the channel of a recurrence group.
    fn subscribe_to_group(&self, user_id: uuid::Uuid, group_id: uuid::Uuid);

    fn unsubscribe_from_group(&self, user_id: uuid::Uuid, group_id: uuid::Uuid);
}

/// In-process bus over a tokio broadcast channel.
///
/// Slow receivers lose the oldest events; publishers are never blocked.
#[derive(Debug)]
pub struct BroadcastBus {
    sender: broadcast::Sender<NotificationEvent>,
    members: Mutex<HashMap<uuid::Uuid, HashSet<uuid::Uuid>>>,
}

impl BroadcastBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            members: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }

    /// Users currently on the channel of `group_id`.
    #[must_use]
    pub fn members(&self, group_id: uuid::Uuid) -> HashSet<uuid::Uuid> {
        self.lock_members()
            .get(&group_id)
            .cloned()
            .unwrap_or_default()
    }

    fn lock_members(&self) -> std::sync::MutexGuard<'_, HashMap<uuid::Uuid, HashSet<uuid::Uuid>>> {
        self.members
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl NotificationBus for BroadcastBus {
    fn publish(&self, event: NotificationEvent) {
        let kind = event.kind;
        let occurrence_id = event.occurrence_id;
        if self.sender.send(event).is_err() {
            tracing::trace!(%kind, %occurrence_id, "No listeners for notification");
        }
    }

    fn subscribe_to_group(&self, user_id: uuid::Uuid, group_id: uuid::Uuid) {
        if self.lock_members().entry(group_id).or_default().insert(user_id) {
            tracing::debug!(%user_id, %group_id, "User subscribed to group channel");
        }
    }

    fn unsubscribe_from_group(&self, user_id: uuid::Uuid, group_id: uuid::Uuid) {
        let mut members = self.lock_members();
        if let Some(group) = members.get_mut(&group_id)
            && group.remove(&user_id)
        {
            tracing::debug!(%user_id, %group_id, "User unsubscribed from group channel");
            if group.is_empty() {
                members.remove(&group_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_publish_reaches_receivers() {
        let bus = BroadcastBus::new(8);
        let mut receiver = bus.subscribe();
        let occurrence_id = uuid::Uuid::now_v7();

        bus.publish(NotificationEvent {
            occurrence_id,
            kind: EventKind::OccurrenceCreated,
            payload: serde_json::json!({}),
        });

        let event = receiver.recv().await.expect("event delivered");
        assert_eq!(event.occurrence_id, occurrence_id);
        assert_eq!(event.kind, EventKind::OccurrenceCreated);
    }

    #[test]
    fn test_publish_without_receivers_is_silent() {
        let bus = BroadcastBus::new(1);
        bus.publish(NotificationEvent {
            occurrence_id: uuid::Uuid::now_v7(),
            kind: EventKind::OccurrenceClosed,
            payload: serde_json::Value::Null,
        });
    }

    #[test]
    fn test_group_membership() {
        let bus = BroadcastBus::new(1);
        let (user, group) = (uuid::Uuid::now_v7(), uuid::Uuid::now_v7());

        bus.subscribe_to_group(user, group);
        bus.subscribe_to_group(user, group);
        assert_eq!(bus.members(group).len(), 1);

        bus.unsubscribe_from_group(user, group);
        assert!(bus.members(group).is_empty());
    }
}
