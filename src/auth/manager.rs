//! Credential resolution and lifecycle coordination
//!
//! [`AuthManager`] is the single entry point through which tool dispatch
//! obtains an authenticated [`ServiceClient`]. It coordinates the session
//! cache, the durable credential store, the refresh exchange, and the
//! interactive consent flow into one tiered resolution:
//!
//! 1. Session cache hit: return immediately.
//! 2. Stored record that is live and covers the required scopes: cache it
//!    and return.
//! 3. Stored record that is expired but refreshable: run the refresh
//!    exchange, persist the renewed record, cache it, and return.
//! 4. Nothing usable: run the interactive consent flow (when this
//!    instance allows it), persist the new record, cache it, and return.
//!
//! Resolutions for the same cache key are deduplicated: concurrent
//! callers share one in-flight refresh or consent flow and all receive
//! its outcome, success or failure. The underlying work runs on a spawned
//! task, so a caller that gives up waiting does not cancel a flow another
//! caller depends on.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::auth::cache::{SessionCache, SessionEntry};
use crate::auth::client::ServiceClient;
use crate::auth::flow::OAuthFlow;
use crate::auth::record::{CacheKey, CredentialRecord, ServiceKind};
use crate::auth::store::CredentialStore;
use crate::error::AuthError;

type PendingResolution = Shared<BoxFuture<'static, Result<SessionEntry, AuthError>>>;

/// Instance-level policy for credential resolution.
#[derive(Debug, Clone, Default)]
pub struct AuthManagerOptions {
    /// Single-identity mode: callers omit the identity and the one stored
    /// record is used.
    pub single_user: bool,

    /// Whether this instance may run the interactive consent flow. When
    /// `false`, missing or unrefreshable credentials surface as errors.
    pub interactive: bool,

    /// Override for the provider REST API base URL, applied to every
    /// service. Unset in production.
    pub api_base: Option<String>,

    /// Full scope URLs requested in addition to a call's required scopes
    /// whenever a consent flow runs, so users are not re-prompted for each
    /// tool's scopes.
    pub upfront_scopes: Vec<String>,
}

/// Coordinates the credential lifecycle and hands out authenticated
/// service clients.
///
/// Safe to share behind an `Arc`; all interior state is synchronized.
pub struct AuthManager {
    http: Arc<reqwest::Client>,
    store: Arc<CredentialStore>,
    cache: Arc<SessionCache>,
    /// `None` when no OAuth client is configured; refresh and consent
    /// flows are then unavailable and stored records are used as-is.
    flow: Option<Arc<OAuthFlow>>,
    options: AuthManagerOptions,
    /// In-flight resolutions by cache key. Each entry is removed by its
    /// own spawned task on completion, so abandoned callers cannot leave
    /// a finished resolution joinable.
    pending: Arc<Mutex<HashMap<CacheKey, PendingResolution>>>,
}

impl AuthManager {
    /// Creates a manager over the given store, cache, and optional flow.
    pub fn new(
        http: Arc<reqwest::Client>,
        store: Arc<CredentialStore>,
        cache: Arc<SessionCache>,
        flow: Option<Arc<OAuthFlow>>,
        options: AuthManagerOptions,
    ) -> Self {
        Self {
            http,
            store,
            cache,
            flow,
            options,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolves an authenticated client for one tool call.
    ///
    /// # Arguments
    ///
    /// * `identity` - The identity to act as. May be `None` only in
    ///   single-identity mode.
    /// * `service` - The provider service the tool talks to.
    /// * `api_version` - The service API version (e.g. `"v4"`).
    /// * `required_scopes` - Full scope URLs the call requires.
    ///
    /// # Errors
    ///
    /// - [`AuthError::IdentityAmbiguous`] in single-identity mode with more
    ///   than one stored record.
    /// - [`AuthError::NoCredentials`] / [`AuthError::ExpiredCredentials`] /
    ///   [`AuthError::InsufficientScope`] when the stored state cannot
    ///   satisfy the call and interactive recovery is unavailable.
    /// - [`AuthError::InvalidGrant`] when the provider revoked the refresh
    ///   token; the stale record has already been deleted.
    pub async fn resolve(
        &self,
        identity: Option<&str>,
        service: ServiceKind,
        api_version: &str,
        required_scopes: &[String],
    ) -> Result<ServiceClient, AuthError> {
        let identity = self.resolve_identity(identity)?;
        let scopes: BTreeSet<String> = required_scopes.iter().cloned().collect();
        let key = CacheKey::new(identity.clone(), service, api_version, scopes.clone());

        // Tier 1: session cache.
        if let Some(entry) = self.cache.get(&key) {
            debug!(%key, "session cache hit");
            return Ok(self.make_client(service, api_version, &entry));
        }

        // Tiers 2-4 run deduplicated: every concurrent caller for the same
        // key awaits the same resolution.
        let resolution = self.join_or_start(&key, identity, scopes);
        let entry = resolution.await?;

        Ok(self.make_client(service, api_version, &entry))
    }

    /// Deletes the stored credential for `identity` and drops every cached
    /// session derived from it.
    ///
    /// Returns `true` when a record existed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] on store I/O failure.
    pub fn revoke(&self, identity: &str) -> Result<bool, AuthError> {
        self.cache.invalidate_identity(identity);
        let deleted = self.store.delete(identity)?;
        if deleted {
            info!(identity, "revoked stored credentials");
        }
        Ok(deleted)
    }

    /// Identities with a stored credential record.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] when the store cannot be listed.
    pub fn list_identities(&self) -> Result<Vec<String>, AuthError> {
        self.store.list_identities()
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Applies single-identity mode to an optional caller-supplied identity.
    fn resolve_identity(&self, identity: Option<&str>) -> Result<String, AuthError> {
        if let Some(identity) = identity {
            return Ok(identity.to_string());
        }
        if !self.options.single_user {
            return Err(AuthError::Flow(
                "no identity given and single-identity mode is disabled".to_string(),
            ));
        }

        let identities = self.store.list_identities()?;
        match identities.len() {
            0 => Err(AuthError::NoCredentials {
                identity: "<single-user>".to_string(),
            }),
            1 => Ok(identities.into_iter().next().expect("len checked")),
            count => Err(AuthError::IdentityAmbiguous { count }),
        }
    }

    /// Joins an in-flight resolution for `key`, or starts a new one.
    ///
    /// The resolution body runs on a spawned task so it survives callers
    /// that stop awaiting.
    fn join_or_start(
        &self,
        key: &CacheKey,
        identity: String,
        scopes: BTreeSet<String>,
    ) -> PendingResolution {
        let mut pending = self.pending.lock().expect("pending map lock poisoned");
        if let Some(existing) = pending.get(key) {
            debug!(%key, "joining in-flight credential resolution");
            return existing.clone();
        }

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let flow = self.flow.clone();
        let interactive = self.options.interactive;
        let upfront = self.options.upfront_scopes.clone();
        let key_owned = key.clone();
        let pending_map = Arc::clone(&self.pending);

        let handle = tokio::spawn(async move {
            let result =
                Self::resolve_uncached(store, flow, interactive, upfront, identity, scopes).await;
            if let Ok(entry) = &result {
                cache.insert(key_owned.clone(), entry.clone());
            }
            // The entry leaves the map before the result is observable, so
            // no later caller can join a resolution that already finished.
            pending_map
                .lock()
                .expect("pending map lock poisoned")
                .remove(&key_owned);
            result
        });

        let shared: PendingResolution = async move {
            handle
                .await
                .map_err(|e| AuthError::Flow(format!("resolution task failed: {e}")))?
        }
        .boxed()
        .shared();

        // Still under the lock taken above, so the task's removal cannot
        // run before this insert.
        pending.insert(key.clone(), shared.clone());
        shared
    }

    /// Tiers 2-4: store lookup, refresh exchange, consent flow.
    async fn resolve_uncached(
        store: Arc<CredentialStore>,
        flow: Option<Arc<OAuthFlow>>,
        interactive: bool,
        upfront_scopes: Vec<String>,
        identity: String,
        required_scopes: BTreeSet<String>,
    ) -> Result<SessionEntry, AuthError> {
        let record = store.load(&identity)?;

        let record = match record {
            None => {
                debug!(identity, "no stored credentials, consent flow required");
                Self::run_consent_flow(
                    &store,
                    flow.as_deref(),
                    interactive,
                    &upfront_scopes,
                    &identity,
                    &required_scopes,
                    &BTreeSet::new(),
                )
                .await?
            }
            Some(record) if !record.covers(&required_scopes) => {
                debug!(
                    identity,
                    missing = ?record.missing_scopes(&required_scopes),
                    "stored credentials lack required scopes"
                );
                if !interactive || flow.is_none() {
                    return Err(AuthError::InsufficientScope {
                        identity,
                        required: required_scopes.iter().cloned().collect(),
                        granted: record.granted_scopes.iter().cloned().collect(),
                    });
                }
                // Re-consent for the union of old and new scopes so the
                // renewed credential keeps serving existing callers.
                Self::run_consent_flow(
                    &store,
                    flow.as_deref(),
                    interactive,
                    &upfront_scopes,
                    &identity,
                    &required_scopes,
                    &record.granted_scopes,
                )
                .await?
            }
            Some(record) if record.is_expired() => {
                Self::renew_expired(
                    &store,
                    flow.as_deref(),
                    interactive,
                    &upfront_scopes,
                    &identity,
                    &required_scopes,
                    record,
                )
                .await?
            }
            Some(record) => record,
        };

        Ok(SessionEntry {
            access_token: record.access_token,
            identity: record.identity,
        })
    }

    /// Tier 3: the stored record is expired; refresh it, falling back to a
    /// fresh consent flow when the provider revoked the refresh token.
    async fn renew_expired(
        store: &CredentialStore,
        flow: Option<&OAuthFlow>,
        interactive: bool,
        upfront_scopes: &[String],
        identity: &str,
        required_scopes: &BTreeSet<String>,
        record: CredentialRecord,
    ) -> Result<CredentialRecord, AuthError> {
        let Some(flow) = flow else {
            return Err(AuthError::ExpiredCredentials {
                identity: identity.to_string(),
            });
        };

        let Some(ref refresh_token) = record.refresh_token else {
            debug!(identity, "expired credentials have no refresh token");
            if !interactive {
                return Err(AuthError::ExpiredCredentials {
                    identity: identity.to_string(),
                });
            }
            return Self::run_consent_flow(
                store,
                Some(flow),
                interactive,
                upfront_scopes,
                identity,
                required_scopes,
                &record.granted_scopes,
            )
            .await;
        };

        match flow.refresh(identity, refresh_token, &record.granted_scopes).await {
            Ok(renewed) => {
                store.save(&renewed)?;
                info!(identity, "refreshed expired credentials");
                Ok(renewed)
            }
            Err(AuthError::InvalidGrant { identity: id, detail }) => {
                // The stored record is dead; remove it so the next attempt
                // starts clean.
                warn!(identity, detail = %detail, "refresh token rejected, deleting stored record");
                store.delete(identity)?;
                if interactive {
                    Self::run_consent_flow(
                        store,
                        Some(flow),
                        interactive,
                        upfront_scopes,
                        identity,
                        required_scopes,
                        &record.granted_scopes,
                    )
                    .await
                } else {
                    Err(AuthError::InvalidGrant { identity: id, detail })
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Tier 4: run the interactive consent flow and persist its record.
    ///
    /// The requested scope set is the union of the call's requirement, any
    /// previously granted scopes, and the deployment's upfront scopes.
    async fn run_consent_flow(
        store: &CredentialStore,
        flow: Option<&OAuthFlow>,
        interactive: bool,
        upfront_scopes: &[String],
        identity: &str,
        required_scopes: &BTreeSet<String>,
        previous_scopes: &BTreeSet<String>,
    ) -> Result<CredentialRecord, AuthError> {
        let (Some(flow), true) = (flow, interactive) else {
            return Err(AuthError::NoCredentials {
                identity: identity.to_string(),
            });
        };

        let mut request: BTreeSet<String> = required_scopes.clone();
        request.extend(previous_scopes.iter().cloned());
        request.extend(upfront_scopes.iter().cloned());
        let request: Vec<String> = request.into_iter().collect();

        let login_hint = if identity == "<single-user>" { None } else { Some(identity) };
        let record = flow.authorize(login_hint, &request).await?;
        store.save(&record)?;
        info!(identity = %record.identity, "stored credentials from consent flow");
        Ok(record)
    }

    /// Binds a service client for a resolved session.
    fn make_client(
        &self,
        service: ServiceKind,
        api_version: &str,
        entry: &SessionEntry,
    ) -> ServiceClient {
        let base_url = self
            .options
            .api_base
            .clone()
            .unwrap_or_else(|| service.base_url(api_version));
        ServiceClient::new(
            Arc::clone(&self.http),
            service,
            api_version,
            base_url,
            entry.access_token.clone(),
            entry.identity.clone(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
