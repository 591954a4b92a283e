//! Status classification and alert threshold matching.
//!
//! Both functions here are pure and total: they are evaluated once per probe
//! result and once per expiry facet during a batch run.

use crate::core::{CertStatus, ProbeStatus, RegistrationStatus};
use chrono::{DateTime, Utc};

/// Alert tiers in days, ascending.
pub const ALERT_THRESHOLDS: [u32; 4] = [1, 7, 14, 30];

/// Above this many days a domain is healthy.
pub const HEALTHY_ABOVE_DAYS: i64 = 30;
/// Below this many days a domain is critical.
pub const CRITICAL_BELOW_DAYS: i64 = 7;

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days from `now` until `expiry`, rounded toward negative infinity.
pub fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Maps days remaining onto healthy / warning / critical.
///
/// `ProbeStatus::Error` is never produced here; a failed probe sets it directly
/// and it takes precedence over any day count.
pub fn classify(days_remaining: i64) -> ProbeStatus {
    if days_remaining > HEALTHY_ABOVE_DAYS {
        ProbeStatus::Healthy
    } else if days_remaining >= CRITICAL_BELOW_DAYS {
        ProbeStatus::Warning
    } else {
        ProbeStatus::Critical
    }
}

pub fn to_cert_status(status: ProbeStatus) -> CertStatus {
    match status {
        ProbeStatus::Healthy => CertStatus::Valid,
        ProbeStatus::Warning => CertStatus::ExpiringSoon,
        ProbeStatus::Critical => CertStatus::Expired,
        ProbeStatus::Error => CertStatus::Error,
    }
}

pub fn to_registration_status(status: ProbeStatus) -> RegistrationStatus {
    match status {
        ProbeStatus::Healthy => RegistrationStatus::Active,
        ProbeStatus::Warning => RegistrationStatus::ExpiringSoon,
        ProbeStatus::Critical => RegistrationStatus::Expired,
        ProbeStatus::Error => RegistrationStatus::Error,
    }
}

/// Returns the tightest alert tier that applies, or `None` above the largest tier.
///
/// Negative input (already expired) always maps to the smallest tier.
pub fn match_threshold(days_remaining: i64) -> Option<u32> {
    if days_remaining < 0 {
        return Some(ALERT_THRESHOLDS[0]);
    }
    ALERT_THRESHOLDS
        .iter()
        .copied()
        .find(|&tier| days_remaining <= i64::from(tier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(classify(45), ProbeStatus::Healthy);
        assert_eq!(classify(31), ProbeStatus::Healthy);
        assert_eq!(classify(30), ProbeStatus::Warning);
        assert_eq!(classify(10), ProbeStatus::Warning);
        assert_eq!(classify(7), ProbeStatus::Warning);
        assert_eq!(classify(6), ProbeStatus::Critical);
        assert_eq!(classify(3), ProbeStatus::Critical);
        assert_eq!(classify(0), ProbeStatus::Critical);
        assert_eq!(classify(-12), ProbeStatus::Critical);
    }

    #[test]
    fn test_public_status_mapping() {
        assert_eq!(to_cert_status(classify(45)), CertStatus::Valid);
        assert_eq!(to_registration_status(classify(45)), RegistrationStatus::Active);
        assert_eq!(to_cert_status(classify(10)), CertStatus::ExpiringSoon);
        assert_eq!(to_registration_status(classify(10)), RegistrationStatus::ExpiringSoon);
        assert_eq!(to_cert_status(classify(3)), CertStatus::Expired);
        assert_eq!(to_registration_status(classify(3)), RegistrationStatus::Expired);
        assert_eq!(to_cert_status(ProbeStatus::Error), CertStatus::Error);
        assert_eq!(to_registration_status(ProbeStatus::Error), RegistrationStatus::Error);
    }

    #[test]
    fn test_match_threshold_examples() {
        assert_eq!(match_threshold(6), Some(7));
        assert_eq!(match_threshold(25), Some(30));
        assert_eq!(match_threshold(0), Some(1));
        assert_eq!(match_threshold(-5), Some(1));
        assert_eq!(match_threshold(1), Some(1));
        assert_eq!(match_threshold(7), Some(7));
        assert_eq!(match_threshold(8), Some(14));
        assert_eq!(match_threshold(14), Some(14));
        assert_eq!(match_threshold(30), Some(30));
    }

    #[test]
    fn test_match_threshold_none_above_largest_tier() {
        for days in [31, 45, 365, i64::MAX] {
            assert_eq!(match_threshold(days), None, "days = {}", days);
        }
        assert_eq!(match_threshold(i64::MIN), Some(1));
    }

    #[test]
    fn test_days_until_floors() {
        let now = Utc::now();
        assert_eq!(days_until(now + Duration::days(5) + Duration::hours(3), now), 5);
        assert_eq!(days_until(now + Duration::hours(23), now), 0);
        assert_eq!(days_until(now - Duration::hours(1), now), -1);
        assert_eq!(days_until(now - Duration::days(2) - Duration::minutes(1), now), -3);
    }
}
