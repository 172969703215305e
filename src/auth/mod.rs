//! Authentication and credential lifecycle
//!
//! This module owns every credential concern in the server: durable
//! per-identity records ([`store`]), the TTL-bounded session cache
//! ([`cache`]), the browser consent and refresh flows ([`flow`], [`pkce`]),
//! and the tiered resolution that ties them together ([`manager`]).
//!
//! Tool handlers never touch any of this directly; they receive a bound
//! [`client::ServiceClient`] from dispatch and nothing else.

pub mod cache;
pub mod client;
pub mod flow;
pub mod manager;
pub mod pkce;
pub mod record;
pub mod store;

pub use cache::{SessionCache, SessionEntry};
pub use client::ServiceClient;
pub use flow::{FlowState, OAuthFlow};
pub use manager::{AuthManager, AuthManagerOptions};
pub use record::{CacheKey, CredentialRecord, ServiceKind};
pub use store::CredentialStore;
