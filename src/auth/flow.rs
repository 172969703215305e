//! OAuth 2.0 authorization code flow with PKCE
//!
//! This module drives the browser-based consent flow that produces a
//! durable [`CredentialRecord`], and the refresh exchange that renews one.
//!
//! # Flow overview
//!
//! 1. Generate a PKCE challenge and a random `state` nonce.
//! 2. Bind a local TCP listener for the redirect callback; the
//!    authorization URL always advertises the actually-bound port.
//! 3. Build the authorization URL (`access_type=offline` and
//!    `prompt=consent` so the provider issues a refresh token) and open it
//!    in the user's browser.
//! 4. Accept the callback connection, extract `code` and `state`.
//! 5. Validate `state`; a mismatch or a missing code is a
//!    [`AuthError::CallbackIntegrity`] and the attempt is abandoned.
//! 6. Exchange `code` for tokens at the token endpoint.
//! 7. Establish the verified identity from the provider's userinfo
//!    endpoint and assemble the credential record.
//!
//! Each attempt moves through [`FlowState`] exactly once; a failed attempt
//! leaves no partial credential behind.
//!
//! # References
//!
//! - RFC 6749 <https://www.rfc-editor.org/rfc/rfc6749>
//! - RFC 7636 PKCE <https://www.rfc-editor.org/rfc/rfc7636>

use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::auth::pkce;
use crate::auth::record::CredentialRecord;
use crate::config::Config;
use crate::error::AuthError;

// ---------------------------------------------------------------------------
// FlowState
// ---------------------------------------------------------------------------

/// Lifecycle of a single consent flow attempt.
///
/// Forward-only: an attempt never returns to an earlier state. Terminal
/// states are [`FlowState::Complete`] and [`FlowState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// No attempt in progress
    Idle,
    /// Authorization URL issued, waiting for the browser redirect
    AwaitingUserConsent,
    /// Callback received and validated
    CodeReceived,
    /// Authorization code being exchanged at the token endpoint
    Exchanging,
    /// Credential record assembled and returned
    Complete,
    /// Attempt abandoned; no partial credential persisted
    Failed,
}

impl FlowState {
    fn as_str(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::AwaitingUserConsent => "awaiting_user_consent",
            FlowState::CodeReceived => "code_received",
            FlowState::Exchanging => "exchanging",
            FlowState::Complete => "complete",
            FlowState::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Token endpoint response (raw deserialization)
// ---------------------------------------------------------------------------

/// Raw JSON response from the OAuth token endpoint.
#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    /// Granted scopes as a set; when the provider omits the `scope` field,
    /// the originally requested scopes are assumed granted.
    fn granted_scopes(&self, requested: &[String]) -> BTreeSet<String> {
        match self.scope.as_deref() {
            Some(s) if !s.is_empty() => s.split(' ').map(str::to_string).collect(),
            _ => requested.iter().cloned().collect(),
        }
    }

    /// Absolute expiry timestamp computed from `expires_in` seconds.
    ///
    /// Providers answer on the order of an hour; a lifetime claim beyond a
    /// year is treated as exactly one year so a malformed response cannot
    /// overflow the timestamp arithmetic.
    fn expires_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        const MAX_LIFETIME_SECS: u64 = 365 * 24 * 60 * 60;
        self.expires_in.map(|secs| {
            chrono::Utc::now() + chrono::Duration::seconds(secs.min(MAX_LIFETIME_SECS) as i64)
        })
    }
}

/// Error body from the token endpoint (`{"error": ..., "error_description": ...}`).
#[derive(Debug, serde::Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Userinfo endpoint response; only the verified email is needed.
#[derive(Debug, serde::Deserialize)]
struct UserinfoResponse {
    email: String,
}

// ---------------------------------------------------------------------------
// OAuthFlow
// ---------------------------------------------------------------------------

/// Drives the authorization code flow and the refresh exchange.
///
/// An `OAuthFlow` is constructed once per process and reused for every
/// attempt. It does not persist records; that is the responsibility of
/// [`CredentialStore`](super::store::CredentialStore) and
/// [`AuthManager`](super::manager::AuthManager).
pub struct OAuthFlow {
    http: Arc<reqwest::Client>,
    client_id: String,
    client_secret: String,
    auth_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
    callback_port: u16,
}

impl OAuthFlow {
    /// Builds a flow from the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Flow`] when no OAuth client is configured.
    pub fn from_config(http: Arc<reqwest::Client>, config: &Config) -> Result<Self, AuthError> {
        let (client_id, client_secret) = config
            .oauth_client()
            .map_err(|e| AuthError::Flow(e.to_string()))?;
        Ok(Self {
            http,
            client_id,
            client_secret,
            auth_endpoint: config.oauth.auth_endpoint.clone(),
            token_endpoint: config.oauth.token_endpoint.clone(),
            userinfo_endpoint: config.oauth.userinfo_endpoint.clone(),
            callback_port: config.oauth.callback_port,
        })
    }

    /// Runs the full consent flow and returns a fresh credential record.
    ///
    /// # Arguments
    ///
    /// * `login_hint` - Identity the flow is expected to authenticate, when
    ///   known. Passed to the provider so the account chooser pre-selects
    ///   it; the returned record's identity still comes from the userinfo
    ///   endpoint, never from the hint.
    /// * `scopes` - Full scope URLs to request consent for.
    ///
    /// # Errors
    ///
    /// - [`AuthError::CallbackIntegrity`] when the redirect's `state` does
    ///   not match or the authorization code is missing.
    /// - [`AuthError::TokenExchange`] when the token endpoint rejects the
    ///   code.
    /// - [`AuthError::Flow`] for listener and transport failures.
    pub async fn authorize(
        &self,
        login_hint: Option<&str>,
        scopes: &[String],
    ) -> Result<CredentialRecord, AuthError> {
        let pkce_challenge =
            pkce::generate().map_err(|e| AuthError::Flow(format!("PKCE generation: {e}")))?;
        let state = pkce::generate_state_nonce();

        // Bind the callback listener before issuing the URL so the
        // advertised redirect port is the one actually listening.
        let listener =
            tokio::net::TcpListener::bind(format!("127.0.0.1:{}", self.callback_port))
                .await
                .map_err(|e| AuthError::Flow(format!("failed to bind redirect listener: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AuthError::Flow(format!("failed to get local address: {e}")))?;
        let redirect_uri = format!("http://127.0.0.1:{}/callback", local_addr.port());

        let auth_url = self.build_authorization_url(
            &redirect_uri,
            scopes,
            &state,
            &pkce_challenge.challenge,
            login_hint,
        )?;

        debug!(state = FlowState::AwaitingUserConsent.as_str(), "consent flow started");
        eprintln!("Open the following URL in your browser to authorize access:\n{auth_url}");
        self.try_open_browser(&auth_url);

        let code = self.accept_callback(listener, &state).await?;
        debug!(state = FlowState::CodeReceived.as_str(), "authorization code received");

        debug!(state = FlowState::Exchanging.as_str(), "exchanging authorization code");
        let raw = self.exchange_code(&code, &redirect_uri, &pkce_challenge.verifier).await?;

        // The record's identity is what the provider verified, not what the
        // caller asked for.
        let identity = self.fetch_identity(&raw.access_token).await?;
        if let Some(hint) = login_hint {
            if hint != identity {
                warn!(hint, identity, "authenticated identity differs from login hint");
            }
        }

        let record = CredentialRecord {
            identity: identity.clone(),
            granted_scopes: raw.granted_scopes(scopes),
            expires_at: raw.expires_at(),
            refresh_token: raw.refresh_token,
            access_token: raw.access_token,
        };

        info!(identity, state = FlowState::Complete.as_str(), "consent flow complete");
        Ok(record)
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// The returned record keeps the given identity and falls back to the
    /// old refresh token when the provider does not rotate it.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidGrant`] when the provider reports the refresh
    ///   token as revoked or invalid. The caller must delete the stored
    ///   record and start a fresh consent flow.
    /// - [`AuthError::TokenExchange`] for any other endpoint rejection.
    pub async fn refresh(
        &self,
        identity: &str,
        refresh_token: &str,
        previous_scopes: &BTreeSet<String>,
    ) -> Result<CredentialRecord, AuthError> {
        let mut params: HashMap<&str, &str> = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", &self.client_id);
        params.insert("client_secret", &self.client_secret);

        let resp = self
            .http
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("refresh request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let parsed: TokenErrorResponse = serde_json::from_str(&body).unwrap_or(
                TokenErrorResponse {
                    error: String::new(),
                    error_description: String::new(),
                },
            );
            if parsed.error == "invalid_grant" {
                return Err(AuthError::InvalidGrant {
                    identity: identity.to_string(),
                    detail: if parsed.error_description.is_empty() {
                        body
                    } else {
                        parsed.error_description
                    },
                });
            }
            return Err(AuthError::TokenExchange(format!(
                "refresh endpoint returned {status}: {body}"
            )));
        }

        let raw: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("failed to parse refresh response: {e}")))?;

        let granted_scopes = match raw.scope.as_deref() {
            Some(s) if !s.is_empty() => s.split(' ').map(str::to_string).collect(),
            _ => previous_scopes.clone(),
        };

        Ok(CredentialRecord {
            identity: identity.to_string(),
            granted_scopes,
            expires_at: raw.expires_at(),
            refresh_token: raw.refresh_token.or_else(|| Some(refresh_token.to_string())),
            access_token: raw.access_token,
        })
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Builds the authorization URL with all required query parameters.
    ///
    /// `access_type=offline` and `prompt=consent` together make the
    /// provider issue a refresh token even on repeat consent.
    fn build_authorization_url(
        &self,
        redirect_uri: &str,
        scopes: &[String],
        state: &str,
        code_challenge: &str,
        login_hint: Option<&str>,
    ) -> Result<String, AuthError> {
        let mut url = Url::parse(&self.auth_endpoint)
            .map_err(|e| AuthError::Flow(format!("invalid authorization endpoint URL: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.client_id);
            query.append_pair("redirect_uri", redirect_uri);
            query.append_pair("scope", &scopes.join(" "));
            query.append_pair("state", state);
            query.append_pair("code_challenge", code_challenge);
            query.append_pair("code_challenge_method", "S256");
            query.append_pair("access_type", "offline");
            query.append_pair("prompt", "consent");
            if let Some(hint) = login_hint {
                query.append_pair("login_hint", hint);
            }
        }

        Ok(url.to_string())
    }

    /// Attempts to open the authorization URL in the user's default browser.
    ///
    /// Errors are intentionally ignored; if the browser does not open the
    /// user can copy the URL from stderr.
    fn try_open_browser(&self, url: &str) {
        #[cfg(target_os = "macos")]
        {
            let _ = std::process::Command::new("open").arg(url).spawn();
        }
        #[cfg(target_os = "linux")]
        {
            let _ = std::process::Command::new("xdg-open").arg(url).spawn();
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        {
            // On other platforms the user must copy the URL manually.
            let _ = url;
        }
    }

    /// Accepts a single TCP connection on the callback listener, parses the
    /// HTTP GET request line to extract `code` and `state` query parameters,
    /// validates the `state` nonce, sends a success response, and returns
    /// the authorization `code`.
    async fn accept_callback(
        &self,
        listener: tokio::net::TcpListener,
        expected_state: &str,
    ) -> Result<String, AuthError> {
        let (stream, _peer) = listener.accept().await.map_err(|e| {
            AuthError::Flow(format!("failed to accept OAuth callback connection: {e}"))
        })?;

        // Move to a blocking task so we can use std I/O for simple HTTP
        // request parsing without pulling in a full HTTP server.
        let expected_state = expected_state.to_string();
        tokio::task::spawn_blocking(move || -> Result<String, AuthError> {
            let std_stream = stream
                .into_std()
                .map_err(|e| AuthError::Flow(format!("stream conversion failed: {e}")))?;

            let mut write_stream = std_stream
                .try_clone()
                .map_err(|e| AuthError::Flow(format!("stream clone failed: {e}")))?;

            let reader = BufReader::new(std_stream);
            let mut request_line = String::new();

            for line in reader.lines() {
                let line = line
                    .map_err(|e| AuthError::Flow(format!("failed to read callback request: {e}")))?;
                // HTTP headers end at the first empty line.
                if line.is_empty() {
                    break;
                }
                if request_line.is_empty() {
                    request_line = line;
                }
            }

            // Send HTTP 200 immediately so the browser does not spin.
            let response = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\nAuthorization complete. You may close this tab.";
            let _ = write_stream.write_all(response.as_bytes());

            // Parse request line: "GET /callback?code=...&state=... HTTP/1.1"
            let path = request_line.split_whitespace().nth(1).unwrap_or("/");
            let query_string = path.split_once('?').map(|x| x.1).unwrap_or("");
            let params = parse_query_string(query_string);

            if let Some(error) = params.get("error") {
                return Err(AuthError::Flow(format!("provider denied authorization: {error}")));
            }

            let state = params.get("state").cloned().unwrap_or_default();
            if state != expected_state {
                return Err(AuthError::CallbackIntegrity(
                    "state mismatch in OAuth callback".to_string(),
                ));
            }

            params.get("code").cloned().ok_or_else(|| {
                AuthError::CallbackIntegrity("authorization code missing from callback".to_string())
            })
        })
        .await
        .map_err(|e| AuthError::Flow(format!("callback task panicked: {e}")))?
    }

    /// Exchanges an authorization code for tokens at the token endpoint.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        let mut params: HashMap<&str, &str> = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", redirect_uri);
        params.insert("client_id", &self.client_id);
        params.insert("client_secret", &self.client_secret);
        params.insert("code_verifier", code_verifier);

        let resp = self
            .http
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("token exchange request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("failed to parse token response: {e}")))
    }

    /// Fetches the verified identity (email) for a fresh access token.
    async fn fetch_identity(&self, access_token: &str) -> Result<String, AuthError> {
        let resp = self
            .http
            .get(&self.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Flow(format!("userinfo request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Flow(format!(
                "userinfo endpoint returned {status}: {body}"
            )));
        }

        let userinfo: UserinfoResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Flow(format!("failed to parse userinfo response: {e}")))?;
        Ok(userinfo.email)
    }
}

// ---------------------------------------------------------------------------
// Utility functions
// ---------------------------------------------------------------------------

/// Parses a URL query string into a key-value map.
///
/// Values are percent-decoded.  Duplicate keys are overwritten by the last
/// occurrence.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in query.split('&') {
        let mut iter = pair.splitn(2, '=');
        let key = iter.next().unwrap_or("").to_string();
        let value = iter.next().unwrap_or("").to_string();
        if !key.is_empty() {
            map.insert(key, percent_decode(&value));
        }
    }
    map
}

/// Performs minimal percent-decoding of a URL query parameter value.
///
/// Converts `+` to space and `%XX` sequences to the corresponding byte;
/// the decoded byte sequence is then interpreted as UTF-8 so multi-byte
/// sequences survive intact.
fn percent_decode(s: &str) -> String {
    let mut out = Vec::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'+' {
            out.push(b' ');
            i += 1;
        } else if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
            out.push(bytes[i]);
            i += 1;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
