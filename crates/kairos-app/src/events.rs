//! Background consumer of the in-process notification bus.

use kairos_service::notify::NotificationEvent;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tokio::task::JoinHandle;

/// Capacity of the notification channel between the engine and the event logger.
pub const EVENT_BUFFER: usize = 1024;

/// ## Summary
/// Logs every notification until all senders are gone, then returns the number logged.
pub fn spawn_event_logger(mut receiver: Receiver<NotificationEvent>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut logged = 0;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    logged += 1;
                    tracing::info!(
                        occurrence_id = %event.occurrence_id,
                        kind = %event.kind,
                        payload = %event.payload,
                        "Notification"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger fell behind, notifications dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!(logged, "Event logger stopped");
        logged
    })
}

#[cfg(test)]
mod tests {
    use kairos_service::notify::{BroadcastBus, EventKind, NotificationBus};

    use super::*;

    #[test_log::test(tokio::test)]
    async fn logger_drains_and_stops_with_the_bus() {
        let bus = BroadcastBus::new(EVENT_BUFFER);
        let logger = spawn_event_logger(bus.subscribe());
        for kind in [EventKind::OccurrenceCreated, EventKind::ParticipationChanged] {
            bus.publish(NotificationEvent {
                occurrence_id: uuid::Uuid::now_v7(),
                kind,
                payload: serde_json::json!({}),
            });
        }
        drop(bus);

        assert_eq!(logger.await.expect("logger finished"), 2);
    }
}
