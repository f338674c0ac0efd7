//! Enum types for AdPulse entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// AD PLATFORMS
// ============================================================================

/// Advertising platform whose performance data is displayed in a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdPlatform {
    GoogleAds,
    MetaAds,
}

impl AdPlatform {
    /// Every platform, in display order.
    pub const ALL: [AdPlatform; 2] = [AdPlatform::GoogleAds, AdPlatform::MetaAds];

    /// Stable string used in cache keys and metric group names.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdPlatform::GoogleAds => "google_ads",
            AdPlatform::MetaAds => "meta_ads",
        }
    }

    /// Parse from the stable string representation.
    pub fn from_key_str(s: &str) -> Option<Self> {
        match s {
            "google_ads" => Some(AdPlatform::GoogleAds),
            "meta_ads" => Some(AdPlatform::MetaAds),
            _ => None,
        }
    }
}

impl fmt::Display for AdPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// PROVENANCE
// ============================================================================

/// How a cached value was obtained.
///
/// Assigned once by the fetch path that produced the value. Never inferred
/// by the cache layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Served from an unexpired cache.
    FreshCache,
    /// Served from an expired cache entry.
    StaleCache,
    /// Fallback produced by a forced refresh.
    ForcedRefresh,
    /// Read from the persisted historical store.
    Database,
    /// Produced by a just-completed live platform call.
    LiveApi,
    /// Stand-in value emitted while real data is unavailable.
    Placeholder,
    Unknown,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::FreshCache => "fresh_cache",
            SourceTag::StaleCache => "stale_cache",
            SourceTag::ForcedRefresh => "forced_refresh",
            SourceTag::Database => "database",
            SourceTag::LiveApi => "live_api",
            SourceTag::Placeholder => "placeholder",
            SourceTag::Unknown => "unknown",
        }
    }

    /// Map a free-form provenance label onto the closed tag set.
    ///
    /// Matching is exact after normalisation (case, `-` and spaces). Labels
    /// that are not in the table map to [`SourceTag::Unknown`].
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "fresh_cache" | "cache" | "cached" | "cache_hit" | "memory_cache" => {
                SourceTag::FreshCache
            }
            "stale_cache" | "expired_cache" | "cache_expired" | "stale" => SourceTag::StaleCache,
            "forced_refresh" | "force_refresh" | "refresh_fallback" => SourceTag::ForcedRefresh,
            "database" | "db" | "historical" | "stored" | "persisted" => SourceTag::Database,
            "live_api" | "api" | "live" | "network" | "fresh_fetch" => SourceTag::LiveApi,
            "placeholder" | "empty" | "fallback_placeholder" => SourceTag::Placeholder,
            _ => SourceTag::Unknown,
        }
    }

    /// Relative trust, used when several sources are merged into one value.
    /// Higher is more trustworthy.
    pub fn trust_rank(&self) -> u8 {
        match self {
            SourceTag::LiveApi => 5,
            SourceTag::FreshCache => 4,
            SourceTag::ForcedRefresh => 3,
            SourceTag::StaleCache => 2,
            SourceTag::Database => 1,
            SourceTag::Placeholder | SourceTag::Unknown => 0,
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for SourceTag {
    fn from(label: &str) -> Self {
        SourceTag::from_label(label)
    }
}

/// Display bucket a [`SourceTag`] collapses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    FreshData,
    StaleData,
    DurableStore,
    Unknown,
}

impl SourceCategory {
    pub fn label(&self) -> &'static str {
        match self {
            SourceCategory::FreshData => "Fresh data",
            SourceCategory::StaleData => "Stale data",
            SourceCategory::DurableStore => "Stored data",
            SourceCategory::Unknown => "Unknown source",
        }
    }
}

/// Indicator color shown next to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorColor {
    Green,
    Amber,
    Red,
    Blue,
    Gray,
}

impl IndicatorColor {
    pub fn hex(&self) -> &'static str {
        match self {
            IndicatorColor::Green => "#16a34a",
            IndicatorColor::Amber => "#d97706",
            IndicatorColor::Red => "#dc2626",
            IndicatorColor::Blue => "#2563eb",
            IndicatorColor::Gray => "#6b7280",
        }
    }
}

// ============================================================================
// FRESHNESS
// ============================================================================

/// Trust tier derived from the age of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessTier {
    Fresh,
    Acceptable,
    Stale,
    Critical,
    Unknown,
}

impl FreshnessTier {
    pub fn label(&self) -> &'static str {
        match self {
            FreshnessTier::Fresh => "Fresh",
            FreshnessTier::Acceptable => "Acceptable",
            FreshnessTier::Stale => "Stale",
            FreshnessTier::Critical => "Critical",
            FreshnessTier::Unknown => "Unknown",
        }
    }

    pub fn color(&self) -> IndicatorColor {
        match self {
            FreshnessTier::Fresh => IndicatorColor::Green,
            FreshnessTier::Acceptable => IndicatorColor::Blue,
            FreshnessTier::Stale => IndicatorColor::Amber,
            FreshnessTier::Critical => IndicatorColor::Red,
            FreshnessTier::Unknown => IndicatorColor::Gray,
        }
    }

    /// Tiers that surface a non-blocking staleness indicator.
    pub fn is_warning(&self) -> bool {
        matches!(self, FreshnessTier::Stale | FreshnessTier::Critical)
    }
}

impl fmt::Display for FreshnessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// UI-FACING STATUS
// ============================================================================

/// Status of a shared dataset as seen by a consuming panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataStatus {
    /// A usable value with at least one non-zero primary metric.
    Ready,
    /// Nothing has been published yet (or it was invalidated/expired).
    Waiting,
    /// A value was published but it carries no activity.
    Empty,
}

/// Session bootstrap phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
}

/// Role attached to a user profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Agency administrator.
    Admin,
    /// Agency staff member managing client accounts.
    Staff,
    /// End client, restricted to a single tenant.
    Client,
}

impl UserRole {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Staff => "staff",
            UserRole::Client => "client",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, UserRoleParseError> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "staff" | "agency" => Ok(UserRole::Staff),
            "client" => Ok(UserRole::Client),
            _ => Err(UserRoleParseError(s.to_string())),
        }
    }

    /// Agency-side roles can view every tenant.
    pub fn is_agency(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Staff)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for UserRole {
    type Err = UserRoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid user role string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRoleParseError(pub String);

impl fmt::Display for UserRoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid user role: {}", self.0)
    }
}

impl std::error::Error for UserRoleParseError {}

/// Kind of change pushed by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_tag_from_label_collapses_spellings() {
        assert_eq!(SourceTag::from_label("cache"), SourceTag::FreshCache);
        assert_eq!(SourceTag::from_label("Fresh-Cache"), SourceTag::FreshCache);
        assert_eq!(SourceTag::from_label("expired_cache"), SourceTag::StaleCache);
        assert_eq!(SourceTag::from_label("force refresh"), SourceTag::ForcedRefresh);
        assert_eq!(SourceTag::from_label("db"), SourceTag::Database);
        assert_eq!(SourceTag::from_label(" API "), SourceTag::LiveApi);
        assert_eq!(SourceTag::from_label("placeholder"), SourceTag::Placeholder);
    }

    #[test]
    fn test_source_tag_from_label_is_exact_not_substring() {
        // "cache" appears inside these, but they are not known labels.
        assert_eq!(SourceTag::from_label("no_cache_available"), SourceTag::Unknown);
        assert_eq!(SourceTag::from_label("cache-miss-debug"), SourceTag::Unknown);
        assert_eq!(SourceTag::from_label(""), SourceTag::Unknown);
    }

    #[test]
    fn test_source_tag_as_str_roundtrips_through_label() {
        for tag in [
            SourceTag::FreshCache,
            SourceTag::StaleCache,
            SourceTag::ForcedRefresh,
            SourceTag::Database,
            SourceTag::LiveApi,
            SourceTag::Placeholder,
            SourceTag::Unknown,
        ] {
            assert_eq!(SourceTag::from_label(tag.as_str()), tag);
        }
    }

    #[test]
    fn test_platform_key_str() {
        for platform in AdPlatform::ALL {
            assert_eq!(AdPlatform::from_key_str(platform.as_str()), Some(platform));
        }
        assert_eq!(AdPlatform::from_key_str("tiktok"), None);
    }

    #[test]
    fn test_user_role_parse() {
        assert_eq!("ADMIN".parse::<UserRole>(), Ok(UserRole::Admin));
        assert_eq!("agency".parse::<UserRole>(), Ok(UserRole::Staff));
        assert!("owner".parse::<UserRole>().is_err());
        assert!(UserRole::Staff.is_agency());
        assert!(!UserRole::Client.is_agency());
    }

    #[test]
    fn test_freshness_tier_warning() {
        assert!(!FreshnessTier::Fresh.is_warning());
        assert!(!FreshnessTier::Acceptable.is_warning());
        assert!(FreshnessTier::Stale.is_warning());
        assert!(FreshnessTier::Critical.is_warning());
        assert!(!FreshnessTier::Unknown.is_warning());
    }
}
