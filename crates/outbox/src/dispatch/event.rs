//! Recognized event trait

use serde::de::DeserializeOwned;
use serde::Serialize;

/// How a projection failure affects the dispatch outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Failure is logged and swallowed; the event still counts as processed
    BestEffort,

    /// Failure fails the dispatch, so the processor retries the event
    Required,
}

/// A recognized event type and its payload contract
///
/// The struct's serde representation is the payload shape producers write
/// and the dispatcher reads back, so both sides share one definition.
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct VehicleRetired {
///     vehicle_id: String,
/// }
///
/// impl ProjectedEvent for VehicleRetired {
///     const EVENT_TYPE: &'static str = "VehicleRetired";
///     const AGGREGATE_TYPE: &'static str = "Vehicle";
///     const JOURNAL_KIND: &'static str = "VEHICLE_RETIRED";
///
///     fn aggregate_id(&self) -> &str {
///         &self.vehicle_id
///     }
///
///     fn summary(&self) -> String {
///         format!("Vehicle {} retired", self.vehicle_id)
///     }
/// }
///
/// registry.register::<VehicleRetired>();
/// ```
pub trait ProjectedEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Outbox `event_type` tag
    const EVENT_TYPE: &'static str;

    /// Outbox `aggregate_type` for producers
    const AGGREGATE_TYPE: &'static str;

    /// Projection entry kind
    const JOURNAL_KIND: &'static str;

    /// Whether a projection failure should drive a retry
    const DELIVERY: Delivery = Delivery::BestEffort;

    /// Id of the aggregate this event describes
    fn aggregate_id(&self) -> &str;

    /// One-line human-readable description
    fn summary(&self) -> String;
}
