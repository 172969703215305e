//! Credential records and cache keys
//!
//! A [`CredentialRecord`] is the durable unit of credential state: one per
//! identity, owned exclusively by the credential store. Everything else in
//! the system holds copies or time-bounded views of it.
//!
//! A [`CacheKey`] identifies one resolved session: identity, service,
//! API version, and the normalized scope set. Scopes are kept in a
//! `BTreeSet` so two requests asking for the same logical permissions
//! produce the same key regardless of request-time ordering.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ToolgateError;

/// Seconds before nominal expiry at which a credential is already treated
/// as expired, leaving time for a refresh exchange before the provider
/// rejects the access token.
const EXPIRY_BUFFER_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// ServiceKind
// ---------------------------------------------------------------------------

/// The provider service a tool talks to.
///
/// Together with an API version this determines the REST base URL of the
/// authenticated client handed to a tool handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Spreadsheet service
    Sheets,
    /// File storage service
    Drive,
}

impl ServiceKind {
    /// Stable lowercase name, used in cache keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Sheets => "sheets",
            ServiceKind::Drive => "drive",
        }
    }

    /// Default REST base URL for this service at the given API version.
    ///
    /// Tests and local deployments override this via configuration; see
    /// `oauth.api_base`.
    pub fn base_url(&self, api_version: &str) -> String {
        match self {
            ServiceKind::Sheets => format!("https://sheets.googleapis.com/{api_version}"),
            ServiceKind::Drive => format!("https://www.googleapis.com/drive/{api_version}"),
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = ToolgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sheets" => Ok(ServiceKind::Sheets),
            "drive" => Ok(ServiceKind::Drive),
            other => Err(ToolgateError::Config(format!("unknown service type: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// CredentialRecord
// ---------------------------------------------------------------------------

/// A complete per-identity credential as persisted on disk.
///
/// The `expires_at` field is an absolute UTC timestamp computed from the
/// `expires_in` seconds the token endpoint returned, so expiry can be
/// determined without a provider round-trip. `granted_scopes` is the
/// superset-check target: a record is usable for a request only when the
/// request's required scopes are all present here.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
/// use toolgate::auth::record::CredentialRecord;
///
/// let record = CredentialRecord {
///     identity: "a@x.com".to_string(),
///     access_token: "tok".to_string(),
///     refresh_token: None,
///     granted_scopes: BTreeSet::from(["spreadsheets".to_string()]),
///     expires_at: None,
/// };
///
/// // A record with no expiry is never considered expired.
/// assert!(!record.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Verified end-user reference (e.g. email) this credential belongs to.
    /// Immutable once established.
    pub identity: String,

    /// The access token string issued by the provider.
    pub access_token: String,

    /// Refresh token used to obtain a new access token without re-running
    /// the interactive consent flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Scopes the provider actually granted.
    #[serde(default)]
    pub granted_scopes: BTreeSet<String>,

    /// UTC timestamp at which the access token expires. `None` means the
    /// token is treated as non-expiring.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    /// Returns `true` when the access token is expired or about to expire.
    ///
    /// A 60-second buffer is applied so that callers have time to perform
    /// a refresh exchange before the provider rejects the access token.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::BTreeSet;
    /// use chrono::{Duration, Utc};
    /// use toolgate::auth::record::CredentialRecord;
    ///
    /// let expired = CredentialRecord {
    ///     identity: "a@x.com".to_string(),
    ///     access_token: "tok".to_string(),
    ///     refresh_token: None,
    ///     granted_scopes: BTreeSet::new(),
    ///     expires_at: Some(Utc::now() - Duration::seconds(1)),
    /// };
    /// assert!(expired.is_expired());
    /// ```
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => {
                let buffer = chrono::Duration::seconds(EXPIRY_BUFFER_SECS);
                Utc::now() >= expires_at - buffer
            }
        }
    }

    /// Returns `true` when this record's granted scopes cover every scope
    /// in `required`.
    pub fn covers(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.granted_scopes)
    }

    /// Scopes in `required` that this record does not grant.
    pub fn missing_scopes(&self, required: &BTreeSet<String>) -> Vec<String> {
        required
            .difference(&self.granted_scopes)
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// CacheKey
// ---------------------------------------------------------------------------

/// Identifies one resolved session in the session cache and the
/// single-flight pending-operation map.
///
/// The scope set is normalized (ordered) by construction, so the key is
/// deterministic for a given logical permission set.
///
/// # Examples
///
/// ```
/// use toolgate::auth::record::{CacheKey, ServiceKind};
///
/// let a = CacheKey::new(
///     "a@x.com",
///     ServiceKind::Sheets,
///     "v4",
///     ["write".to_string(), "read".to_string()],
/// );
/// let b = CacheKey::new(
///     "a@x.com",
///     ServiceKind::Sheets,
///     "v4",
///     ["read".to_string(), "write".to_string()],
/// );
/// assert_eq!(a, b, "scope ordering must not matter");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The identity the session belongs to
    pub identity: String,
    /// The provider service
    pub service: ServiceKind,
    /// The service API version (e.g. "v4")
    pub api_version: String,
    /// Normalized required scope set
    pub scopes: BTreeSet<String>,
}

impl CacheKey {
    /// Builds a cache key, normalizing the scope set.
    pub fn new(
        identity: impl Into<String>,
        service: ServiceKind,
        api_version: impl Into<String>,
        scopes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            service,
            api_version: api_version.into(),
            scopes: scopes.into_iter().collect(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}[{}]",
            self.identity,
            self.service,
            self.api_version,
            self.scopes.iter().cloned().collect::<Vec<_>>().join(","),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_record(expires_at: Option<DateTime<Utc>>) -> CredentialRecord {
        CredentialRecord {
            identity: "a@x.com".to_string(),
            access_token: "tok".to_string(),
            refresh_token: Some("refresh".to_string()),
            granted_scopes: BTreeSet::from(["read".to_string(), "write".to_string()]),
            expires_at,
        }
    }

    // -----------------------------------------------------------------------
    // is_expired
    // -----------------------------------------------------------------------

    #[test]
    fn test_record_expired_when_past_expiry() {
        let record = make_record(Some(Utc::now() - Duration::seconds(1)));
        assert!(record.is_expired());
    }

    #[test]
    fn test_record_expired_within_buffer_window() {
        // 30 seconds in the future is still within the 60-second buffer.
        let record = make_record(Some(Utc::now() + Duration::seconds(30)));
        assert!(record.is_expired());
    }

    #[test]
    fn test_record_not_expired_with_future_expiry() {
        let record = make_record(Some(Utc::now() + Duration::hours(1)));
        assert!(!record.is_expired());
    }

    #[test]
    fn test_record_not_expired_without_expiry() {
        let record = make_record(None);
        assert!(!record.is_expired());
    }

    // -----------------------------------------------------------------------
    // covers / missing_scopes
    // -----------------------------------------------------------------------

    #[test]
    fn test_covers_subset_of_granted() {
        let record = make_record(None);
        let required = BTreeSet::from(["read".to_string()]);
        assert!(record.covers(&required));
    }

    #[test]
    fn test_covers_full_granted_set() {
        let record = make_record(None);
        let required = BTreeSet::from(["read".to_string(), "write".to_string()]);
        assert!(record.covers(&required));
    }

    #[test]
    fn test_does_not_cover_extra_scope() {
        let record = make_record(None);
        let required = BTreeSet::from(["read".to_string(), "admin".to_string()]);
        assert!(!record.covers(&required));
        assert_eq!(record.missing_scopes(&required), vec!["admin".to_string()]);
    }

    #[test]
    fn test_covers_empty_requirement() {
        let record = make_record(None);
        assert!(record.covers(&BTreeSet::new()));
    }

    // -----------------------------------------------------------------------
    // JSON round-trip
    // -----------------------------------------------------------------------

    #[test]
    fn test_record_roundtrip_through_json() {
        let original = CredentialRecord {
            identity: "a@x.com".to_string(),
            access_token: "access_abc".to_string(),
            refresh_token: Some("refresh_xyz".to_string()),
            granted_scopes: BTreeSet::from(["spreadsheets".to_string()]),
            // Fixed timestamp to avoid sub-second precision issues.
            expires_at: Some(DateTime::from_timestamp(1_800_000_000, 0).expect("valid timestamp")),
        };

        let json = serde_json::to_string(&original).expect("serialize");
        let restored: CredentialRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, original);
    }

    #[test]
    fn test_record_roundtrip_no_optional_fields() {
        let original = CredentialRecord {
            identity: "b@y.org".to_string(),
            access_token: "tok".to_string(),
            refresh_token: None,
            granted_scopes: BTreeSet::new(),
            expires_at: None,
        };

        let json = serde_json::to_string(&original).expect("serialize");
        let restored: CredentialRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, original);
    }

    // -----------------------------------------------------------------------
    // ServiceKind
    // -----------------------------------------------------------------------

    #[test]
    fn test_service_kind_from_str() {
        assert_eq!("sheets".parse::<ServiceKind>().unwrap(), ServiceKind::Sheets);
        assert_eq!("drive".parse::<ServiceKind>().unwrap(), ServiceKind::Drive);
        assert!("mail".parse::<ServiceKind>().is_err());
    }

    #[test]
    fn test_service_kind_base_urls_embed_version() {
        assert!(ServiceKind::Sheets.base_url("v4").ends_with("/v4"));
        assert!(ServiceKind::Drive.base_url("v3").ends_with("/v3"));
    }

    // -----------------------------------------------------------------------
    // CacheKey
    // -----------------------------------------------------------------------

    #[test]
    fn test_cache_key_scope_order_is_normalized() {
        let a = CacheKey::new(
            "a@x.com",
            ServiceKind::Sheets,
            "v4",
            ["b".to_string(), "a".to_string()],
        );
        let b = CacheKey::new(
            "a@x.com",
            ServiceKind::Sheets,
            "v4",
            ["a".to_string(), "b".to_string()],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_distinguishes_identity_and_service() {
        let base = CacheKey::new("a@x.com", ServiceKind::Sheets, "v4", []);
        let other_identity = CacheKey::new("b@x.com", ServiceKind::Sheets, "v4", []);
        let other_service = CacheKey::new("a@x.com", ServiceKind::Drive, "v4", []);
        assert_ne!(base, other_identity);
        assert_ne!(base, other_service);
    }

    #[test]
    fn test_cache_key_display_is_deterministic() {
        let key = CacheKey::new(
            "a@x.com",
            ServiceKind::Sheets,
            "v4",
            ["z".to_string(), "a".to_string()],
        );
        assert_eq!(key.to_string(), "a@x.com/sheets/v4[a,z]");
    }
}
