//! Entity types: identities, profiles and advertising metrics.

use crate::{AdPlatform, TenantId, Timestamp, UserId, UserRole};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// IDENTITY
// ============================================================================

/// Authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

impl User {
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
        }
    }
}

/// Current session returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: Option<User>,
    pub expires_at: Option<Timestamp>,
}

/// Dashboard profile for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub role: UserRole,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Tenant a client user belongs to. Agency roles leave this empty.
    pub tenant_id: Option<TenantId>,
    pub metadata: Option<serde_json::Value>,
}

impl Profile {
    pub fn new(user_id: UserId, role: UserRole) -> Self {
        Self {
            user_id,
            role,
            display_name: None,
            avatar_url: None,
            tenant_id: None,
            metadata: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Whether this profile may request data for `tenant_id`.
    ///
    /// Agency roles see every tenant; client users only their own.
    pub fn can_view_tenant(&self, tenant_id: TenantId) -> bool {
        self.role.is_agency() || self.tenant_id == Some(tenant_id)
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Reporting date range (inclusive on both ends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MetricWindow {
    /// Build a window, swapping the bounds if they were given in reverse.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Window of `days` days ending on `end` (inclusive).
    pub fn trailing_days(end: NaiveDate, days: u32) -> Self {
        let span = chrono::Days::new(u64::from(days.saturating_sub(1)));
        let start = end.checked_sub_days(span).unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    /// Number of days covered.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Stable key fragment, `YYYY-MM-DD..YYYY-MM-DD`.
    pub fn key(&self) -> String {
        format!("{}..{}", self.start, self.end)
    }

    /// Parse a key fragment produced by [`MetricWindow::key`].
    pub fn parse_key(s: &str) -> Option<Self> {
        let (start, end) = s.split_once("..")?;
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").ok()?;
        let end = NaiveDate::parse_from_str(end, "%Y-%m-%d").ok()?;
        Some(Self::new(start, end))
    }
}

impl fmt::Display for MetricWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One platform's performance totals for a window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricGroup {
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    /// Spend in minor currency units.
    pub spend_cents: u64,
}

impl MetricGroup {
    pub fn new(impressions: u64, clicks: u64, conversions: u64, spend_cents: u64) -> Self {
        Self {
            impressions,
            clicks,
            conversions,
            spend_cents,
        }
    }

    /// True if at least one primary metric is non-zero.
    pub fn has_activity(&self) -> bool {
        self.impressions > 0 || self.clicks > 0 || self.conversions > 0 || self.spend_cents > 0
    }

    /// Click-through rate, if there were impressions.
    pub fn ctr(&self) -> Option<f64> {
        if self.impressions == 0 {
            None
        } else {
            Some(self.clicks as f64 / self.impressions as f64)
        }
    }
}

/// Dataset of named metric groups (one per platform, plus any extras).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsPayload {
    pub groups: BTreeMap<String, MetricGroup>,
}

impl MetricsPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload holding a single platform's group.
    pub fn for_platform(platform: AdPlatform, group: MetricGroup) -> Self {
        let mut payload = Self::new();
        payload.insert_platform(platform, group);
        payload
    }

    pub fn insert_group(&mut self, name: impl Into<String>, group: MetricGroup) {
        self.groups.insert(name.into(), group);
    }

    pub fn insert_platform(&mut self, platform: AdPlatform, group: MetricGroup) {
        self.insert_group(platform.as_str(), group);
    }

    pub fn group(&self, name: &str) -> Option<&MetricGroup> {
        self.groups.get(name)
    }

    pub fn platform(&self, platform: AdPlatform) -> Option<&MetricGroup> {
        self.group(platform.as_str())
    }

    /// True if any group has a non-zero primary metric.
    pub fn has_activity(&self) -> bool {
        self.groups.values().any(MetricGroup::has_activity)
    }

    /// Merge another payload's groups into this one. Groups from `other`
    /// replace same-named groups here.
    pub fn merge(&mut self, other: MetricsPayload) {
        self.groups.extend(other.groups);
    }
}
