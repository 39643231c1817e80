//! Event registry for type-erased payload projection
//!
//! The registry maps `event_type` tags to projectors that parse the opaque
//! payload into the registered [`ProjectedEvent`] type. A tag with no
//! registration routes to [`Route::Unknown`].

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

use super::event::{Delivery, ProjectedEvent};
use super::events::{
    BookingCancelled, BookingCreated, ContractSigned, IncidentReported, InvoiceIssued,
    VehicleCheckedIn, VehicleCheckedOut,
};

/// A payload parsed and projected by its registered event type
#[derive(Debug, Clone, PartialEq)]
pub struct Projected {
    pub kind: &'static str,
    pub summary: String,
    pub fields: Map<String, Value>,
}

/// Where an event goes
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Registered event type
    Known {
        projected: Projected,
        delivery: Delivery,
    },

    /// No registration for this event type
    Unknown,
}

/// Projector function type for turning a raw payload into a projection
pub type Projector = Box<dyn Fn(&Value) -> Result<Projected, serde_json::Error> + Send + Sync>;

struct Registration {
    projector: Projector,
    delivery: Delivery,
}

/// Registry of recognized event types
pub struct EventRegistry {
    registrations: HashMap<&'static str, Registration>,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            registrations: HashMap::new(),
        }
    }

    /// Create a registry with every event type in [`super::events`]
    pub fn with_default_events() -> Self {
        let mut registry = Self::new();
        registry.register::<BookingCreated>();
        registry.register::<BookingCancelled>();
        registry.register::<VehicleCheckedOut>();
        registry.register::<VehicleCheckedIn>();
        registry.register::<InvoiceIssued>();
        registry.register::<ContractSigned>();
        registry.register::<IncidentReported>();
        registry
    }

    /// Register an event type
    ///
    /// Registering the same `EVENT_TYPE` twice replaces the earlier entry.
    pub fn register<E: ProjectedEvent>(&mut self) {
        let projector: Projector = Box::new(|payload: &Value| {
            let event = E::deserialize(payload)?;
            let fields = match serde_json::to_value(&event)? {
                Value::Object(fields) => fields,
                other => {
                    let mut fields = Map::new();
                    fields.insert("value".to_string(), other);
                    fields
                }
            };

            Ok(Projected {
                kind: E::JOURNAL_KIND,
                summary: event.summary(),
                fields,
            })
        });

        self.registrations.insert(
            E::EVENT_TYPE,
            Registration {
                projector,
                delivery: E::DELIVERY,
            },
        );
    }

    /// Check if an event type is registered
    pub fn contains(&self, event_type: &str) -> bool {
        self.registrations.contains_key(event_type)
    }

    /// Resolve the route for an event
    ///
    /// Fails only when the event type is registered and its payload does
    /// not match the registered shape.
    pub fn route(&self, event_type: &str, payload: &Value) -> Result<Route, RegistryError> {
        let Some(registration) = self.registrations.get(event_type) else {
            return Ok(Route::Unknown);
        };

        let projected =
            (registration.projector)(payload).map_err(|source| RegistryError::InvalidPayload {
                event_type: event_type.to_string(),
                source,
            })?;

        Ok(Route::Known {
            projected,
            delivery: registration.delivery,
        })
    }

    /// Get the number of registered event types
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Get all registered event type names
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.registrations.keys().copied()
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("event_types", &self.registrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Errors from registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Payload does not match the registered event type
    #[error("invalid payload for {event_type}: {source}")]
    InvalidPayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}
