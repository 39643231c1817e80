//! Document number rendering

use chrono::{DateTime, Datelike, TimeZone, Utc};

/// Human-facing number formats built from an allocated sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentNumberFormat {
    /// `FAC-{year}-{sequence:06}`
    Invoice,

    /// `{year}{sequence:06}`
    Booking,
}

impl DocumentNumberFormat {
    /// Render a document number
    ///
    /// Sequences wider than six digits are rendered in full, never truncated.
    pub fn render(self, year: i32, sequence: i64) -> String {
        match self {
            Self::Invoice => format!("FAC-{year}-{sequence:06}"),
            Self::Booking => format!("{year}{sequence:06}"),
        }
    }
}

/// Calendar year of `instant` as seen from the tenant's timezone
///
/// Numbering scopes follow the tenant's local year, not the server's. An
/// invoice issued at 23:30 UTC on Dec 31 already belongs to the next year
/// for a tenant in Tokyo.
pub fn year_in_timezone<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> i32 {
    instant.with_timezone(tz).year()
}
