//! Event dispatcher

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument, warn};

use super::event::Delivery;
use super::projection::{Projection, ProjectionEntry, ProjectionError};
use super::registry::{EventRegistry, RegistryError, Route};
use crate::persistence::OutboxEvent;

/// Dispatch errors
///
/// Any error counts as a failed delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Payload does not match its event type
    #[error(transparent)]
    InvalidPayload(#[from] RegistryError),

    /// A required projection append failed
    #[error("projection failed for {event_type}: {source}")]
    Projection {
        event_type: String,
        #[source]
        source: ProjectionError,
    },

    /// Failure raised by a custom [`EventDispatcher`] implementation
    #[error("dispatch failed: {0}")]
    Other(String),
}

/// Delivers one outbox event to its side effects
///
/// Implementations must not touch the event's status, attempts or timing.
#[async_trait]
pub trait EventDispatcher: Send + Sync + 'static {
    /// Dispatch an event; `Ok` means the event may be marked processed
    async fn dispatch(&self, event: &OutboxEvent) -> Result<(), DispatchError>;
}

/// Registry-backed dispatcher appending to a single projection
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use fleetops_outbox::dispatch::{Dispatcher, EventRegistry, InMemoryJournal};
///
/// let journal = Arc::new(InMemoryJournal::new());
/// let dispatcher = Dispatcher::new(EventRegistry::with_default_events(), journal);
/// ```
pub struct Dispatcher {
    registry: EventRegistry,
    projection: Arc<dyn Projection>,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(registry: EventRegistry, projection: Arc<dyn Projection>) -> Self {
        Self {
            registry,
            projection,
        }
    }

    /// Get the registry
    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }
}

#[async_trait]
impl EventDispatcher for Dispatcher {
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    async fn dispatch(&self, event: &OutboxEvent) -> Result<(), DispatchError> {
        let (projected, delivery) = match self.registry.route(&event.event_type, &event.payload)? {
            Route::Known {
                projected,
                delivery,
            } => (projected, delivery),
            Route::Unknown => {
                debug!("no handler registered for event type, skipping");
                return Ok(());
            }
        };

        let entry = ProjectionEntry {
            source_event_id: event.id,
            kind: projected.kind.to_string(),
            aggregate_type: event.aggregate_type.clone(),
            aggregate_id: event.aggregate_id.clone(),
            summary: projected.summary,
            fields: projected.fields,
            recorded_at: Utc::now(),
        };

        match self.projection.append(entry).await {
            Ok(()) => Ok(()),
            Err(e) => match delivery {
                Delivery::BestEffort => {
                    warn!(error = %e, "best-effort projection failed, continuing");
                    Ok(())
                }
                Delivery::Required => Err(DispatchError::Projection {
                    event_type: event.event_type.clone(),
                    source: e,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::dispatch::{InMemoryJournal, ProjectedEvent};
    use crate::persistence::OutboxStatus;

    fn outbox_event(event_type: &str, payload: serde_json::Value) -> OutboxEvent {
        let now = Utc::now();
        OutboxEvent {
            id: Uuid::now_v7(),
            aggregate_type: "Booking".to_string(),
            aggregate_id: "b-1".to_string(),
            event_type: event_type.to_string(),
            payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            available_at: now,
            last_error: None,
            deduplication_key: None,
            created_at: now,
            processed_at: None,
        }
    }

    fn booking_created_payload() -> serde_json::Value {
        json!({
            "bookingId": "b-1",
            "bookingNumber": "2026000001",
            "agencyId": "agency-1",
            "companyId": "company-1",
            "vehicleId": "v-1",
            "userId": "u-1"
        })
    }

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct DepositCaptured {
        booking_id: String,
    }

    impl ProjectedEvent for DepositCaptured {
        const EVENT_TYPE: &'static str = "DepositCaptured";
        const AGGREGATE_TYPE: &'static str = "Booking";
        const JOURNAL_KIND: &'static str = "DEPOSIT_CAPTURED";
        const DELIVERY: Delivery = Delivery::Required;

        fn aggregate_id(&self) -> &str {
            &self.booking_id
        }

        fn summary(&self) -> String {
            format!("Deposit captured for {}", self.booking_id)
        }
    }

    #[tokio::test]
    async fn test_dispatch_known_event_appends_entry() {
        let journal = Arc::new(InMemoryJournal::new());
        let dispatcher = Dispatcher::new(EventRegistry::with_default_events(), journal.clone());

        let event = outbox_event("BookingCreated", booking_created_payload());
        dispatcher.dispatch(&event).await.unwrap();

        let entries = journal.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, "BOOKING_CREATED");
        assert_eq!(entries[0].source_event_id, event.id);
        assert_eq!(entries[0].aggregate_id, "b-1");
        assert_eq!(entries[0].fields["bookingNumber"], json!("2026000001"));
    }

    #[tokio::test]
    async fn test_unknown_event_is_noop_success() {
        let journal = Arc::new(InMemoryJournal::new());
        let dispatcher = Dispatcher::new(EventRegistry::with_default_events(), journal.clone());

        let event = outbox_event("VehicleRepainted", json!({"color": "red"}));
        dispatcher.dispatch(&event).await.unwrap();

        assert_eq!(journal.append_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_fails_dispatch() {
        let journal = Arc::new(InMemoryJournal::new());
        let dispatcher = Dispatcher::new(EventRegistry::with_default_events(), journal.clone());

        let event = outbox_event("BookingCreated", json!({"bookingId": "b-1"}));
        let result = dispatcher.dispatch(&event).await;

        assert!(matches!(result, Err(DispatchError::InvalidPayload(_))));
        assert_eq!(journal.append_calls(), 0);
    }

    #[tokio::test]
    async fn test_best_effort_projection_failure_is_swallowed() {
        let journal = Arc::new(InMemoryJournal::new());
        journal.set_failing(true);
        let dispatcher = Dispatcher::new(EventRegistry::with_default_events(), journal.clone());

        let event = outbox_event("BookingCreated", booking_created_payload());
        dispatcher.dispatch(&event).await.unwrap();

        assert_eq!(journal.append_calls(), 1);
        assert!(journal.entries().is_empty());
    }

    #[tokio::test]
    async fn test_required_projection_failure_propagates() {
        let journal = Arc::new(InMemoryJournal::new());
        journal.set_failing(true);

        let mut registry = EventRegistry::new();
        registry.register::<DepositCaptured>();
        let dispatcher = Dispatcher::new(registry, journal.clone());

        let event = outbox_event("DepositCaptured", json!({"bookingId": "b-1"}));
        let result = dispatcher.dispatch(&event).await;

        assert!(matches!(
            result,
            Err(DispatchError::Projection { ref event_type, .. }) if event_type == "DepositCaptured"
        ));
    }
}
