//! Toolgate - authenticated multi-tenant tool-calling server
//!
//! Toolgate fronts a provider's REST APIs with a small set of named
//! tools. Every tool call names an identity; the server resolves a
//! credential for it (cached session, stored record, refresh exchange, or
//! interactive consent, in that order) and hands the tool handler a
//! client already bound to the right service, API version, and scopes.
//!
//! # Architecture
//!
//! - [`auth`] - credential records, the file-backed store, the session
//!   cache, the OAuth consent and refresh flows, and the manager that
//!   ties them into one tiered resolution.
//! - [`server`] - the routing table with per-tool capability contracts,
//!   and the inbound HTTP surface.
//! - [`tools`] - the tool implementations, grouped into activatable sets.
//! - [`config`] - YAML configuration with environment and CLI overrides.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod server;
pub mod tools;

pub use config::Config;
pub use error::{AuthError, Result, ToolgateError};
