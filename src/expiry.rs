//! Expiry evaluation: maps an optional expiry instant to a status tag.
//!
//! Pure: the result depends only on the expiry instant, `now`, and the
//! window size. Both instants are UTC, so no calendar-string comparison
//! or local-zone arithmetic is involved.

use chrono::{DateTime, Duration, Utc};

use crate::models::ExpiryStatus;

/// Default window, in days, for the `expires-soon` tag.
pub const EXPIRY_WINDOW_DAYS: i64 = 30;

/// Evaluate with the default 30-day window.
pub fn evaluate(expiry_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ExpiryStatus {
    evaluate_with_window(expiry_date, now, EXPIRY_WINDOW_DAYS)
}

pub fn evaluate_with_window(
    expiry_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window_days: i64,
) -> ExpiryStatus {
    let Some(expiry) = expiry_date else {
        return ExpiryStatus::Active;
    };

    // A window too wide for chrono covers every future date.
    let within_window = match Duration::try_days(window_days) {
        Some(window) => expiry - now <= window,
        None => window_days > 0,
    };

    if expiry < now {
        ExpiryStatus::Expired
    } else if within_window {
        ExpiryStatus::ExpiresSoon
    } else {
        ExpiryStatus::Active
    }
}

/// Whole days until expiry, negative once passed. `None` when undated.
pub fn days_until(expiry_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    expiry_date.map(|expiry| (expiry - now).num_days())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn undated_is_active() {
        assert_eq!(evaluate(None, now()), ExpiryStatus::Active);
    }

    #[test]
    fn exactly_thirty_days_expires_soon() {
        let expiry = now() + Duration::days(30);
        assert_eq!(evaluate(Some(expiry), now()), ExpiryStatus::ExpiresSoon);
    }

    #[test]
    fn thirty_one_days_active() {
        let expiry = now() + Duration::days(31);
        assert_eq!(evaluate(Some(expiry), now()), ExpiryStatus::Active);
    }

    #[test]
    fn same_instant_not_yet_passed() {
        assert_eq!(evaluate(Some(now()), now()), ExpiryStatus::ExpiresSoon);
    }

    #[test]
    fn passed_date_is_expired() {
        let expiry = now() - Duration::seconds(1);
        assert_eq!(evaluate(Some(expiry), now()), ExpiryStatus::Expired);
    }

    #[test]
    fn insurance_card_expiring_end_of_february() {
        let expiry = Utc.with_ymd_and_hms(2024, 2, 28, 0, 0, 0).unwrap();
        assert_eq!(evaluate(Some(expiry), now()), ExpiryStatus::ExpiresSoon);
        assert_eq!(days_until(Some(expiry), now()), Some(27));
    }

    #[test]
    fn custom_window() {
        let expiry = now() + Duration::days(10);
        assert_eq!(
            evaluate_with_window(Some(expiry), now(), 7),
            ExpiryStatus::Active
        );
        assert_eq!(
            evaluate_with_window(Some(expiry), now(), 14),
            ExpiryStatus::ExpiresSoon
        );
    }

    #[test]
    fn repeated_evaluation_agrees() {
        let expiry = Some(now() + Duration::hours(5));
        assert_eq!(evaluate(expiry, now()), evaluate(expiry, now()));
    }

    #[test]
    fn out_of_range_window_does_not_panic() {
        let expiry = Some(now() + Duration::days(400));
        assert_eq!(
            evaluate_with_window(expiry, now(), i64::MAX),
            ExpiryStatus::ExpiresSoon
        );
        assert_eq!(
            evaluate_with_window(expiry, now(), i64::MIN),
            ExpiryStatus::Active
        );
    }
}
