//! Age-based trust tiers for displayed values.
//!
//! The tier is derived purely from `now - fetched_at` and recomputed on
//! every read. Boundaries are half-open: exactly one hour old is already
//! `Acceptable`, exactly three is `Stale`, exactly six is `Critical`.

use std::fmt;
use std::sync::Arc;

use adpulse_core::{Clock, FreshnessTier, IndicatorColor, SystemClock, Timestamp};
use chrono::Duration;

const ACCEPTABLE_AFTER_HOURS: i64 = 1;
const STALE_AFTER_HOURS: i64 = 3;
const CRITICAL_AFTER_HOURS: i64 = 6;

/// Tier for a known age. Negative ages (clock skew) count as fresh.
pub fn classify_age(age: Duration) -> FreshnessTier {
    if age < Duration::hours(ACCEPTABLE_AFTER_HOURS) {
        FreshnessTier::Fresh
    } else if age < Duration::hours(STALE_AFTER_HOURS) {
        FreshnessTier::Acceptable
    } else if age < Duration::hours(CRITICAL_AFTER_HOURS) {
        FreshnessTier::Stale
    } else {
        FreshnessTier::Critical
    }
}

/// Human-readable age, e.g. "5 minutes ago".
pub fn age_label(age: Option<Duration>) -> String {
    let Some(age) = age else {
        return "Unknown age".to_string();
    };
    let minutes = age.num_minutes().max(0);
    if minutes < 1 {
        return "Just now".to_string();
    }
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let hours = age.num_hours();
    if hours < 24 {
        return plural(hours, "hour");
    }
    plural(age.num_days(), "day")
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

/// Result of classifying one timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessReport {
    pub tier: FreshnessTier,
    pub label: String,
    /// `None` when the fetch time was unknown.
    pub age: Option<Duration>,
}

impl FreshnessReport {
    pub fn unknown() -> Self {
        Self {
            tier: FreshnessTier::Unknown,
            label: age_label(None),
            age: None,
        }
    }

    pub fn color(&self) -> IndicatorColor {
        self.tier.color()
    }

    /// Non-blocking staleness indicator, present for `Stale` and `Critical`.
    pub fn warning(&self) -> Option<StaleDataWarning> {
        match (self.tier.is_warning(), self.age) {
            (true, Some(age)) => Some(StaleDataWarning {
                tier: self.tier,
                age,
            }),
            _ => None,
        }
    }
}

/// A successful result whose data is old enough to flag. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleDataWarning {
    pub tier: FreshnessTier,
    pub age: Duration,
}

impl fmt::Display for StaleDataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} data: last updated {}",
            self.tier.label(),
            age_label(Some(self.age))
        )
    }
}

/// Classifies fetch timestamps against an injected clock.
#[derive(Clone)]
pub struct FreshnessClassifier {
    clock: Arc<dyn Clock>,
}

impl FreshnessClassifier {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    pub fn classify(&self, fetched_at: Option<Timestamp>) -> FreshnessReport {
        let Some(fetched_at) = fetched_at else {
            return FreshnessReport::unknown();
        };
        let age = self.clock.now().signed_duration_since(fetched_at);
        FreshnessReport {
            tier: classify_age(age),
            label: age_label(Some(age)),
            age: Some(age),
        }
    }
}

impl fmt::Debug for FreshnessClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreshnessClassifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adpulse_core::ManualClock;
    use proptest::prelude::*;

    fn classifier() -> (FreshnessClassifier, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch_2024());
        (FreshnessClassifier::new(clock.clone()), clock)
    }

    fn minutes_ago(clock: &ManualClock, minutes: i64) -> Option<Timestamp> {
        Some(clock.now() - Duration::minutes(minutes))
    }

    #[test]
    fn test_tier_boundaries() {
        let (c, clock) = classifier();
        let cases = [
            (59, FreshnessTier::Fresh),
            (61, FreshnessTier::Acceptable),
            (179, FreshnessTier::Acceptable),
            (181, FreshnessTier::Stale),
            (359, FreshnessTier::Stale),
            (361, FreshnessTier::Critical),
        ];
        for (minutes, tier) in cases {
            assert_eq!(c.classify(minutes_ago(&clock, minutes)).tier, tier, "{} min", minutes);
        }
    }

    #[test]
    fn test_exact_boundaries_belong_to_higher_tier() {
        assert_eq!(classify_age(Duration::hours(1)), FreshnessTier::Acceptable);
        assert_eq!(classify_age(Duration::hours(3)), FreshnessTier::Stale);
        assert_eq!(classify_age(Duration::hours(6)), FreshnessTier::Critical);
    }

    #[test]
    fn test_absent_timestamp_is_unknown() {
        let (c, _) = classifier();
        let report = c.classify(None);
        assert_eq!(report.tier, FreshnessTier::Unknown);
        assert_eq!(report.label, "Unknown age");
        assert!(report.warning().is_none());
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        assert_eq!(classify_age(Duration::minutes(-5)), FreshnessTier::Fresh);
        assert_eq!(age_label(Some(Duration::minutes(-5))), "Just now");
    }

    #[test]
    fn test_labels() {
        assert_eq!(age_label(Some(Duration::seconds(30))), "Just now");
        assert_eq!(age_label(Some(Duration::minutes(1))), "1 minute ago");
        assert_eq!(age_label(Some(Duration::minutes(45))), "45 minutes ago");
        assert_eq!(age_label(Some(Duration::minutes(150))), "2 hours ago");
        assert_eq!(age_label(Some(Duration::hours(49))), "2 days ago");
    }

    #[test]
    fn test_warning_only_for_stale_and_critical() {
        let (c, clock) = classifier();
        assert!(c.classify(minutes_ago(&clock, 90)).warning().is_none());

        let warning = c.classify(minutes_ago(&clock, 200)).warning().unwrap();
        assert_eq!(warning.tier, FreshnessTier::Stale);
        assert_eq!(warning.to_string(), "Stale data: last updated 3 hours ago");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// The tier is monotone in age.
        #[test]
        fn prop_tier_monotone(a in 0i64..1_000_000, b in 0i64..1_000_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(classify_age(Duration::seconds(lo)) <= classify_age(Duration::seconds(hi)));
        }

        /// Half-open hour buckets.
        #[test]
        fn prop_tier_matches_hour_buckets(secs in 0i64..100_000) {
            let expected = match secs {
                s if s < 3_600 => FreshnessTier::Fresh,
                s if s < 3 * 3_600 => FreshnessTier::Acceptable,
                s if s < 6 * 3_600 => FreshnessTier::Stale,
                _ => FreshnessTier::Critical,
            };
            prop_assert_eq!(classify_age(Duration::seconds(secs)), expected);
        }
    }
}
