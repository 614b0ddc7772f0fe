//! Committed-event log
//!
//! Follows the registry's event broadcast and writes every record as one
//! JSON line through `tracing`, for external indexers that tail the logs.

use crate::{Error, Result};
use rights_core::EventRecord;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{info, warn};

/// Encode one record as a single JSON line
pub fn format_event(record: &EventRecord) -> Result<String> {
    serde_json::to_string(record)
        .map_err(|e| Error::Serialization(format!("Failed to encode event {}: {}", record.sequence, e)))
}

/// Log events until the registry closes its broadcast; returns how many were logged
pub async fn follow_events(mut events: Receiver<EventRecord>) -> u64 {
    let mut logged = 0u64;
    loop {
        match events.recv().await {
            Ok(record) => match format_event(&record) {
                Ok(line) => {
                    info!(
                        target: "rights_events",
                        sequence = record.sequence,
                        name = record.event.name(),
                        "{}",
                        line
                    );
                    logged += 1;
                }
                Err(e) => warn!(error = %e, "Skipping unencodable event"),
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event log fell behind, records skipped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    logged
}

#[cfg(test)]
mod tests {
    use super::*;
    use rights_core::{
        actor::spawn_registry_actor, config::ActorConfig, metrics::Metrics, types::EventId,
        Address, ManualClock, PayoutJournal, Registry, RightsEvent,
    };
    use std::sync::Arc;

    #[test]
    fn test_format_event() {
        let record = EventRecord {
            sequence: 4,
            event_id: EventId::nil(),
            timestamp: 1_700_000_000,
            event: RightsEvent::ProceedsWithdrawn {
                amount: 778,
                recipient: Address::new("0xa11ce").unwrap(),
                success: true,
            },
        };

        let line = format_event(&record).unwrap();
        assert!(line.contains("\"sequence\":4"));
        assert!(line.contains("ProceedsWithdrawn"));
        assert!(line.contains("778"));
        assert!(!line.contains('\n'));
    }

    #[tokio::test]
    async fn test_follow_events_until_closed() {
        let registry = Registry::new(
            Address::new("0xad").unwrap(),
            Arc::new(ManualClock::new(0)),
        );
        let handle = spawn_registry_actor(
            registry,
            None,
            Arc::new(PayoutJournal::new()),
            Metrics::new().unwrap(),
            &ActorConfig::default(),
        );
        let follower = tokio::spawn(follow_events(handle.subscribe()));

        handle
            .mint(Address::new("0xa11ce").unwrap(), "uri")
            .await
            .unwrap();
        handle.shutdown().await.unwrap();
        drop(handle);

        assert_eq!(follower.await.unwrap(), 2);
    }
}
