//! Error types for Toolgate
//!
//! This module defines all error types used throughout the server,
//! using `thiserror` for ergonomic error handling.
//!
//! Two enums are defined:
//!
//! - [`ToolgateError`] — the top-level error for every operation in the
//!   crate (configuration, routing, I/O, HTTP).
//! - [`AuthError`] — the structured outcome of a credential resolution.
//!   It is `Clone` so that a single failed resolution can be fanned out to
//!   every waiter sharing the same in-flight operation, and it carries
//!   enough detail (identity, required scopes) for callers to build an
//!   actionable remediation message. The core never formats human prose.

use thiserror::Error;

/// Main error type for Toolgate operations
///
/// This enum encompasses all possible errors that can occur during
/// configuration loading, tool routing, credential persistence, and
/// provider interactions.
#[derive(Error, Debug)]
pub enum ToolgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No tool with the given name is registered on this instance
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Credential resolution failed (structured, see [`AuthError`])
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Tool handler execution errors
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Provider API errors surfaced by a tool handler
    #[error("Provider error: {0}")]
    Provider(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Structured outcome of a failed credential resolution.
///
/// Every variant is cheap to clone; resolutions are deduplicated across
/// concurrent callers (single-flight), so one failure may be delivered to
/// several waiters.
///
/// The variants split into two groups:
///
/// - Handled internally by the authentication manager and only surfaced
///   when recovery is impossible: [`AuthError::NoCredentials`],
///   [`AuthError::ExpiredCredentials`].
/// - Always surfaced to the caller: [`AuthError::InvalidGrant`],
///   [`AuthError::InsufficientScope`], [`AuthError::CallbackIntegrity`],
///   [`AuthError::TokenExchange`], [`AuthError::IdentityAmbiguous`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Nothing is stored for the identity and interactive authentication
    /// is disabled on this instance.
    #[error("no stored credentials for '{identity}'")]
    NoCredentials {
        /// The identity that has no stored credential record
        identity: String,
    },

    /// The stored credential is past expiry and cannot be refreshed
    /// (no refresh token) while interactive authentication is disabled.
    #[error("credentials for '{identity}' are expired and not refreshable")]
    ExpiredCredentials {
        /// The identity whose credential is expired
        identity: String,
    },

    /// The refresh token was revoked or is otherwise invalid; full
    /// re-authentication is required.
    #[error("refresh rejected for '{identity}' (invalid_grant): {detail}")]
    InvalidGrant {
        /// The identity whose refresh token was rejected
        identity: String,
        /// Provider-supplied detail, verbatim
        detail: String,
    },

    /// The stored credential does not cover the scopes the call requires.
    #[error("credentials for '{identity}' lack required scopes {required:?} (granted: {granted:?})")]
    InsufficientScope {
        /// The identity whose credential is under-scoped
        identity: String,
        /// Scopes the call requires
        required: Vec<String>,
        /// Scopes the stored credential actually grants
        granted: Vec<String>,
    },

    /// The OAuth callback failed its integrity check (state mismatch or
    /// missing parameters).
    #[error("OAuth callback integrity error: {0}")]
    CallbackIntegrity(String),

    /// The provider rejected the authorization code or refresh exchange.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// Single-identity mode found more than one stored credential record.
    #[error("single-identity mode is ambiguous: {count} credential records found")]
    IdentityAmbiguous {
        /// Number of records found in the store
        count: usize,
    },

    /// Credential store I/O failure, reduced to a message so the variant
    /// stays cloneable across single-flight waiters.
    #[error("credential storage error: {0}")]
    Storage(String),

    /// Any other OAuth flow failure (listener bind, browser handoff, ...)
    #[error("authorization flow error: {0}")]
    Flow(String),
}

/// Result type alias for Toolgate operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
