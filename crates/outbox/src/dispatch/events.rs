//! Recognized domain events
//!
//! One struct per `event_type` producers may enqueue. Payload keys are
//! camelCase. Adding an event type means adding a struct here and
//! registering it in [`EventRegistry::with_default_events`].
//!
//! [`EventRegistry::with_default_events`]: super::EventRegistry::with_default_events

use serde::{Deserialize, Serialize};

use super::event::ProjectedEvent;

/// A booking was created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreated {
    pub booking_id: String,
    pub booking_number: String,
    pub agency_id: String,
    pub company_id: String,
    pub vehicle_id: String,
    pub user_id: String,
}

impl ProjectedEvent for BookingCreated {
    const EVENT_TYPE: &'static str = "BookingCreated";
    const AGGREGATE_TYPE: &'static str = "Booking";
    const JOURNAL_KIND: &'static str = "BOOKING_CREATED";

    fn aggregate_id(&self) -> &str {
        &self.booking_id
    }

    fn summary(&self) -> String {
        format!(
            "Booking {} created for vehicle {}",
            self.booking_number, self.vehicle_id
        )
    }
}

/// A booking was cancelled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCancelled {
    pub booking_id: String,
    pub booking_number: String,
    pub agency_id: String,
    pub company_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ProjectedEvent for BookingCancelled {
    const EVENT_TYPE: &'static str = "BookingCancelled";
    const AGGREGATE_TYPE: &'static str = "Booking";
    const JOURNAL_KIND: &'static str = "BOOKING_CANCELLED";

    fn aggregate_id(&self) -> &str {
        &self.booking_id
    }

    fn summary(&self) -> String {
        match &self.reason {
            Some(reason) => format!("Booking {} cancelled: {}", self.booking_number, reason),
            None => format!("Booking {} cancelled", self.booking_number),
        }
    }
}

/// A vehicle left the agency at the start of a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleCheckedOut {
    pub booking_id: String,
    pub agency_id: String,
    pub vehicle_id: String,
    pub user_id: String,
    pub mileage: u64,
    /// Fuel level in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_level: Option<u8>,
}

impl ProjectedEvent for VehicleCheckedOut {
    const EVENT_TYPE: &'static str = "VehicleCheckedOut";
    const AGGREGATE_TYPE: &'static str = "Booking";
    const JOURNAL_KIND: &'static str = "VEHICLE_CHECKED_OUT";

    fn aggregate_id(&self) -> &str {
        &self.booking_id
    }

    fn summary(&self) -> String {
        format!(
            "Vehicle {} checked out at {} km",
            self.vehicle_id, self.mileage
        )
    }
}

/// A vehicle came back at the end of a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleCheckedIn {
    pub booking_id: String,
    pub agency_id: String,
    pub vehicle_id: String,
    pub user_id: String,
    pub mileage: u64,
    /// Fuel level in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_level: Option<u8>,
}

impl ProjectedEvent for VehicleCheckedIn {
    const EVENT_TYPE: &'static str = "VehicleCheckedIn";
    const AGGREGATE_TYPE: &'static str = "Booking";
    const JOURNAL_KIND: &'static str = "VEHICLE_CHECKED_IN";

    fn aggregate_id(&self) -> &str {
        &self.booking_id
    }

    fn summary(&self) -> String {
        format!("Vehicle {} checked in at {} km", self.vehicle_id, self.mileage)
    }
}

/// An invoice was issued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceIssued {
    pub invoice_id: String,
    pub invoice_number: String,
    pub booking_id: String,
    pub company_id: String,
    pub total_cents: i64,
    pub currency: String,
}

impl ProjectedEvent for InvoiceIssued {
    const EVENT_TYPE: &'static str = "InvoiceIssued";
    const AGGREGATE_TYPE: &'static str = "Invoice";
    const JOURNAL_KIND: &'static str = "INVOICE_ISSUED";

    fn aggregate_id(&self) -> &str {
        &self.invoice_id
    }

    fn summary(&self) -> String {
        format!(
            "Invoice {} issued: {}.{:02} {}",
            self.invoice_number,
            self.total_cents / 100,
            (self.total_cents % 100).abs(),
            self.currency
        )
    }
}

/// A rental contract was signed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSigned {
    pub contract_id: String,
    pub booking_id: String,
    pub company_id: String,
    pub user_id: String,
}

impl ProjectedEvent for ContractSigned {
    const EVENT_TYPE: &'static str = "ContractSigned";
    const AGGREGATE_TYPE: &'static str = "Contract";
    const JOURNAL_KIND: &'static str = "CONTRACT_SIGNED";

    fn aggregate_id(&self) -> &str {
        &self.contract_id
    }

    fn summary(&self) -> String {
        format!(
            "Contract {} signed for booking {}",
            self.contract_id, self.booking_id
        )
    }
}

/// An incident was reported on a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentReported {
    pub incident_id: String,
    pub vehicle_id: String,
    pub agency_id: String,
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
}

impl ProjectedEvent for IncidentReported {
    const EVENT_TYPE: &'static str = "IncidentReported";
    const AGGREGATE_TYPE: &'static str = "Incident";
    const JOURNAL_KIND: &'static str = "INCIDENT_REPORTED";

    fn aggregate_id(&self) -> &str {
        &self.incident_id
    }

    fn summary(&self) -> String {
        format!(
            "{} incident {} reported on vehicle {}",
            self.severity, self.incident_id, self.vehicle_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_booking_created_payload_shape() {
        let payload = json!({
            "bookingId": "b-1",
            "bookingNumber": "2026000001",
            "agencyId": "agency-1",
            "companyId": "company-1",
            "vehicleId": "v-1",
            "userId": "u-1"
        });

        let event: BookingCreated = serde_json::from_value(payload.clone()).unwrap();
        assert_eq!(event.aggregate_id(), "b-1");
        assert_eq!(serde_json::to_value(&event).unwrap(), payload);
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let payload = json!({"bookingId": "b-1"});
        assert!(serde_json::from_value::<BookingCreated>(payload).is_err());
    }

    #[test]
    fn test_optional_fields_default() {
        let event: BookingCancelled = serde_json::from_value(json!({
            "bookingId": "b-1",
            "bookingNumber": "2026000001",
            "agencyId": "agency-1",
            "companyId": "company-1",
            "userId": "u-1"
        }))
        .unwrap();

        assert!(event.reason.is_none());
        assert_eq!(event.summary(), "Booking 2026000001 cancelled");
    }

    #[test]
    fn test_invoice_summary_formats_amount() {
        let event = InvoiceIssued {
            invoice_id: "i-1".to_string(),
            invoice_number: "FAC-2026-000001".to_string(),
            booking_id: "b-1".to_string(),
            company_id: "company-1".to_string(),
            total_cents: 12_905,
            currency: "EUR".to_string(),
        };

        assert_eq!(event.summary(), "Invoice FAC-2026-000001 issued: 129.05 EUR");
    }
}
