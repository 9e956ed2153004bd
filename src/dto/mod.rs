use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod health;
pub mod room;
pub mod validation;
pub mod ws;

/// Timestamp sent in place of a deadline when no round is active.
pub const ZERO_TIMESTAMP: &str = "0001-01-01T00:00:00Z";

/// Render a deadline as RFC 3339, as expected by web clients.
pub fn format_timestamp(time: OffsetDateTime) -> String {
    time.format(&Rfc3339)
        .unwrap_or_else(|_| ZERO_TIMESTAMP.into())
}
