//! Tenant-scoped keys for shared datasets.
//!
//! A [`DatasetKey`] cannot be built without a tenant, so every cached
//! dataset is attributable to exactly one tenant and can be purged by
//! tenant prefix.

use std::fmt;

use adpulse_core::{AdPlatform, MetricWindow, TenantId};

/// Separator between key segments. Never appears in a tenant id or window.
const SEPARATOR: char = ':';

/// Segment used for the platform-independent (shared) dataset.
const ALL_PLATFORMS: &str = "all";

/// Cache key for a dataset: tenant, optional platform, reporting window.
///
/// # Format
///
/// `tenant:platform:window`, e.g.
/// `0190f1c2-...:google_ads:2024-01-01..2024-01-31`. The shared dataset
/// uses `all` in the platform slot. Keys sort by tenant first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetKey {
    inner: DatasetKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct DatasetKeyInner {
    tenant_id: TenantId,
    platform: Option<AdPlatform>,
    window: MetricWindow,
}

impl DatasetKey {
    /// Key of the multi-platform dataset sibling panels share.
    pub fn shared(tenant_id: TenantId, window: MetricWindow) -> Self {
        Self {
            inner: DatasetKeyInner {
                tenant_id,
                platform: None,
                window,
            },
        }
    }

    /// Key of a single platform's slice.
    pub fn platform(tenant_id: TenantId, platform: AdPlatform, window: MetricWindow) -> Self {
        Self {
            inner: DatasetKeyInner {
                tenant_id,
                platform: Some(platform),
                window,
            },
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.inner.tenant_id
    }

    pub fn platform_scope(&self) -> Option<AdPlatform> {
        self.inner.platform
    }

    pub fn window(&self) -> MetricWindow {
        self.inner.window
    }

    pub fn is_shared(&self) -> bool {
        self.inner.platform.is_none()
    }

    /// The shared key for the same tenant and window.
    pub fn to_shared(&self) -> Self {
        Self::shared(self.inner.tenant_id, self.inner.window)
    }

    pub fn belongs_to(&self, tenant_id: TenantId) -> bool {
        self.inner.tenant_id == tenant_id
    }

    pub fn encode(&self) -> String {
        let platform = self
            .inner
            .platform
            .map(|p| p.as_str())
            .unwrap_or(ALL_PLATFORMS);
        format!(
            "{}{sep}{}{sep}{}",
            self.inner.tenant_id,
            platform,
            self.inner.window.key(),
            sep = SEPARATOR
        )
    }

    /// Parse a key produced by [`DatasetKey::encode`].
    ///
    /// Returns `None` for a wrong segment count, a malformed tenant id, an
    /// unknown platform or a malformed window.
    pub fn decode(s: &str) -> Option<Self> {
        let mut parts = s.split(SEPARATOR);
        let tenant = parts.next()?;
        let platform = parts.next()?;
        let window = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let tenant_id: TenantId = tenant.parse().ok()?;
        let platform = match platform {
            ALL_PLATFORMS => None,
            other => Some(AdPlatform::from_key_str(other)?),
        };
        let window = MetricWindow::parse_key(window)?;

        Some(Self {
            inner: DatasetKeyInner {
                tenant_id,
                platform,
                window,
            },
        })
    }

    /// Prefix shared by every encoded key of `tenant_id`.
    pub fn tenant_prefix(tenant_id: TenantId) -> String {
        format!("{}{}", tenant_id, SEPARATOR)
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adpulse_core::EntityIdType;
    use chrono::NaiveDate;

    fn window() -> MetricWindow {
        MetricWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    #[test]
    fn test_encode_format() {
        let tenant = TenantId::nil();
        let key = DatasetKey::platform(tenant, AdPlatform::MetaAds, window());
        assert_eq!(
            key.encode(),
            "00000000-0000-0000-0000-000000000000:meta_ads:2024-01-01..2024-01-31"
        );
        let shared = DatasetKey::shared(tenant, window());
        assert!(shared.encode().contains(":all:"));
    }

    #[test]
    fn test_decode_inverts_encode() {
        let tenant = TenantId::now_v7();
        for key in [
            DatasetKey::shared(tenant, window()),
            DatasetKey::platform(tenant, AdPlatform::GoogleAds, window()),
        ] {
            assert_eq!(DatasetKey::decode(&key.encode()), Some(key));
        }
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let tenant = TenantId::now_v7();
        assert!(DatasetKey::decode("").is_none());
        assert!(DatasetKey::decode("not-a-uuid:all:2024-01-01..2024-01-31").is_none());
        assert!(DatasetKey::decode(&format!("{}:tiktok:2024-01-01..2024-01-31", tenant)).is_none());
        assert!(DatasetKey::decode(&format!("{}:all:yesterday", tenant)).is_none());
        assert!(DatasetKey::decode(&format!("{}:all:2024-01-01..2024-01-31:x", tenant)).is_none());
    }

    #[test]
    fn test_tenant_prefix_matches_only_that_tenant() {
        let a = TenantId::now_v7();
        let b = TenantId::now_v7();
        let key = DatasetKey::shared(a, window());
        assert!(key.encode().starts_with(&DatasetKey::tenant_prefix(a)));
        assert!(!key.encode().starts_with(&DatasetKey::tenant_prefix(b)));
        assert!(key.belongs_to(a));
    }

    #[test]
    fn test_to_shared() {
        let tenant = TenantId::now_v7();
        let key = DatasetKey::platform(tenant, AdPlatform::GoogleAds, window());
        assert!(!key.is_shared());
        assert_eq!(key.to_shared(), DatasetKey::shared(tenant, window()));
        assert_eq!(key.platform_scope(), Some(AdPlatform::GoogleAds));
    }
}
