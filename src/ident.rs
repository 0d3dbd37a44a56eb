//! Public identifier generation and currency formatting.
//!
//! Order numbers and capability access tokens share one shape: an
//! 18-digit numeric string made of a 14-digit UTC timestamp prefix
//! (sortable) and a 4-digit random suffix. The two values of an order are
//! generated independently; the token is the sole authorization for
//! customer-less order lookup, so it must be as unguessable as the
//! suffix cardinality allows and is backed by a bounded collision-check
//! retry in the order service.

use chrono::{DateTime, Utc};

/// Generate an 18-digit numeric identifier: `YYYYMMDDHHMMSS` + 4 random digits.
pub fn numeric18() -> String {
    numeric18_at(Utc::now())
}

/// Same as [`numeric18`] with an explicit timestamp.
pub fn numeric18_at(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::random_range(0..10_000);
    format!("{}{:04}", now.format("%Y%m%d%H%M%S"), suffix)
}

/// Format minor currency units as a fixed two-decimal string.
///
/// Integer arithmetic only; 1050 becomes "10.50".
pub fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn numeric18_shape() {
        let id = numeric18();
        assert_eq!(id.len(), 18);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn numeric18_time_prefix() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let id = numeric18_at(at);
        assert!(id.starts_with("20260314092653"));
    }

    #[test]
    fn money_formatting() {
        assert_eq!(format_money(0), "0.00");
        assert_eq!(format_money(5), "0.05");
        assert_eq!(format_money(1050), "10.50");
        assert_eq!(format_money(123456), "1234.56");
        assert_eq!(format_money(-1050), "-10.50");
    }
}
