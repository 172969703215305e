//! Configuration management for Toolgate
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! The operator-facing pieces are:
//!
//! - [`OAuthConfig`] — OAuth client identifier and secret (environment
//!   variables or a client-secrets JSON file) plus the provider endpoints.
//! - [`CredentialsConfig`] — where credential records live on disk, the
//!   session-cache TTL, and single-identity mode.
//! - [`ScopeCatalog`] — named scope aliases (e.g. `sheets_read`) resolved
//!   to full provider scope URLs at registration time, and the upfront
//!   scope set the deployment is willing to request at first consent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::{Result, ToolgateError};

/// Environment variable holding the OAuth client identifier.
pub const ENV_CLIENT_ID: &str = "TOOLGATE_CLIENT_ID";

/// Environment variable holding the OAuth client secret.
pub const ENV_CLIENT_SECRET: &str = "TOOLGATE_CLIENT_SECRET";

/// Main configuration structure for Toolgate
///
/// This structure holds all configuration needed for a running instance:
/// the inbound server settings, the OAuth client, credential persistence,
/// and the scope catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Inbound server configuration (port, active tool sets)
    #[serde(default)]
    pub server: ServerConfig,

    /// OAuth client and provider endpoint configuration
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Credential persistence and session cache configuration
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Scope alias catalog
    #[serde(default)]
    pub scopes: ScopeCatalog,
}

/// Inbound server configuration
///
/// Each running instance serves a fixed subset of tool registrations; the
/// subset is selected here (or overridden on the command line) and is
/// immutable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port for the inbound tool-call surface
    #[serde(default = "default_port")]
    pub port: u16,

    /// Named tool sets active on this instance (e.g. `["sheets", "drive"]`)
    #[serde(default = "default_tool_sets")]
    pub tool_sets: Vec<String>,
}

fn default_port() -> u16 {
    8913
}

fn default_tool_sets() -> Vec<String> {
    vec!["sheets".to_string(), "drive".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            tool_sets: default_tool_sets(),
        }
    }
}

/// OAuth client and provider endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// OAuth client identifier. Falls back to `TOOLGATE_CLIENT_ID`.
    #[serde(default)]
    pub client_id: Option<String>,

    /// OAuth client secret. Falls back to `TOOLGATE_CLIENT_SECRET`.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Path to a provider-style client-secrets JSON file
    /// (`{"installed": {"client_id": ..., "client_secret": ...}}`).
    /// Used when the inline/env values are absent.
    #[serde(default)]
    pub client_secrets_file: Option<PathBuf>,

    /// Provider authorization endpoint
    #[serde(default = "default_auth_endpoint")]
    pub auth_endpoint: String,

    /// Provider token endpoint
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,

    /// Provider userinfo endpoint, used to establish the verified identity
    /// after a consent flow when the caller did not supply one
    #[serde(default = "default_userinfo_endpoint")]
    pub userinfo_endpoint: String,

    /// Local TCP port for the consent redirect callback. `0` lets the OS
    /// assign a free port; the authorization URL always advertises the
    /// actually-bound port.
    #[serde(default)]
    pub callback_port: u16,

    /// Whether this instance may run the interactive consent flow. Headless
    /// instances set this to `false` and surface `NoCredentials` instead.
    #[serde(default = "default_interactive")]
    pub interactive: bool,

    /// Scope aliases (or literal scope URLs) requested upfront at first
    /// consent, so users are not re-prompted for each tool's scopes.
    #[serde(default)]
    pub upfront_scopes: Vec<String>,

    /// Override for the provider REST API base URL, applied to every
    /// service. Useful for tests and local mocks; unset in production.
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_auth_endpoint() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_endpoint() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_userinfo_endpoint() -> String {
    "https://openidconnect.googleapis.com/v1/userinfo".to_string()
}

fn default_interactive() -> bool {
    true
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            client_secrets_file: None,
            auth_endpoint: default_auth_endpoint(),
            token_endpoint: default_token_endpoint(),
            userinfo_endpoint: default_userinfo_endpoint(),
            callback_port: 0,
            interactive: default_interactive(),
            upfront_scopes: Vec::new(),
            api_base: None,
        }
    }
}

/// Credential persistence and session cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Base directory for credential record files (one file per identity).
    /// Shared by every instance of the process family.
    #[serde(default = "default_credentials_dir")]
    pub dir: PathBuf,

    /// Session cache entry time-to-live in minutes, measured from insertion
    #[serde(default = "default_cache_ttl_minutes")]
    pub cache_ttl_minutes: u64,

    /// Single-identity mode: callers omit the identity and the one stored
    /// record is used. More than one stored record is a configuration error.
    #[serde(default)]
    pub single_user: bool,
}

fn default_credentials_dir() -> PathBuf {
    PathBuf::from(".toolgate/credentials")
}

fn default_cache_ttl_minutes() -> u64 {
    30
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            dir: default_credentials_dir(),
            cache_ttl_minutes: default_cache_ttl_minutes(),
            single_user: false,
        }
    }
}

/// Named scope alias catalog
///
/// Tool registrations name scopes by alias (`sheets_read`) so that the
/// full provider URLs live in exactly one place. Entries that already look
/// like URLs pass through unchanged, which lets operators add literal
/// scopes in `upfront_scopes` without touching the catalog.
///
/// # Examples
///
/// ```
/// use toolgate::config::ScopeCatalog;
///
/// let catalog = ScopeCatalog::default();
/// assert_eq!(
///     catalog.resolve("sheets_read"),
///     Some("https://www.googleapis.com/auth/spreadsheets.readonly"),
/// );
/// assert_eq!(catalog.resolve("no_such_alias"), None);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeCatalog {
    /// Alias to full scope URL
    #[serde(default = "default_scope_aliases")]
    pub aliases: HashMap<String, String>,
}

fn default_scope_aliases() -> HashMap<String, String> {
    let mut aliases = HashMap::new();
    aliases.insert(
        "openid".to_string(),
        "openid https://www.googleapis.com/auth/userinfo.email".to_string(),
    );
    aliases.insert(
        "sheets_read".to_string(),
        "https://www.googleapis.com/auth/spreadsheets.readonly".to_string(),
    );
    aliases.insert(
        "sheets_write".to_string(),
        "https://www.googleapis.com/auth/spreadsheets".to_string(),
    );
    aliases.insert(
        "drive_read".to_string(),
        "https://www.googleapis.com/auth/drive.readonly".to_string(),
    );
    aliases.insert(
        "drive_write".to_string(),
        "https://www.googleapis.com/auth/drive.file".to_string(),
    );
    aliases
}

impl Default for ScopeCatalog {
    fn default() -> Self {
        Self {
            aliases: default_scope_aliases(),
        }
    }
}

impl ScopeCatalog {
    /// Resolves a single alias to its full scope URL.
    ///
    /// Returns `None` for unknown aliases.
    pub fn resolve(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    /// Resolves a list of aliases and literal scopes to full scope URLs.
    ///
    /// Entries containing `://` or a space (compound scope strings) are
    /// treated as literal and passed through; everything else must be a
    /// known alias.
    ///
    /// # Errors
    ///
    /// Returns [`ToolgateError::Config`] naming the first unknown alias.
    pub fn resolve_all(&self, entries: &[String]) -> Result<Vec<String>> {
        let mut resolved = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.contains("://") || entry.contains(' ') {
                resolved.push(entry.clone());
            } else if let Some(url) = self.resolve(entry) {
                for part in url.split(' ') {
                    resolved.push(part.to_string());
                }
            } else {
                return Err(ToolgateError::Config(format!("unknown scope alias: {entry}")).into());
            }
        }
        Ok(resolved)
    }
}

/// Shape of a provider client-secrets JSON file.
///
/// Both the `installed` (desktop) and `web` variants are accepted.
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    #[serde(default)]
    installed: Option<ClientSecretsEntry>,
    #[serde(default)]
    web: Option<ClientSecretsEntry>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsEntry {
    client_id: String,
    client_secret: String,
}

impl Config {
    /// Load configuration from a YAML file with CLI and environment overrides
    ///
    /// Missing file is not an error; defaults are used so that a bare
    /// `toolgate --port 9000` works. Override precedence, highest first:
    /// CLI flags, environment variables, config file, defaults.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed command-line arguments
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load(path: &str, cli: &Cli) -> Result<Self> {
        let mut config: Config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&contents)?
        } else {
            tracing::debug!("config file {} not found, using defaults", path);
            Config::default()
        };

        config.apply_env();
        config.apply_cli(cli);
        Ok(config)
    }

    /// Apply environment variable overrides for the OAuth client.
    fn apply_env(&mut self) {
        if let Ok(id) = std::env::var(ENV_CLIENT_ID) {
            if !id.is_empty() {
                self.oauth.client_id = Some(id);
            }
        }
        if let Ok(secret) = std::env::var(ENV_CLIENT_SECRET) {
            if !secret.is_empty() {
                self.oauth.client_secret = Some(secret);
            }
        }
    }

    /// Apply command-line overrides.
    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(ref tool_sets) = cli.tools {
            self.server.tool_sets = tool_sets.clone();
        }
        if let Some(ref dir) = cli.credentials_dir {
            self.credentials.dir = dir.clone();
        }
        if cli.single_user {
            self.credentials.single_user = true;
        }
    }

    /// Resolves the effective OAuth client id and secret.
    ///
    /// Inline/env values win; otherwise the client-secrets file is read.
    ///
    /// # Errors
    ///
    /// Returns [`ToolgateError::Config`] when no client credentials can be
    /// found, or when the secrets file is malformed.
    pub fn oauth_client(&self) -> Result<(String, String)> {
        if let (Some(id), Some(secret)) = (&self.oauth.client_id, &self.oauth.client_secret) {
            return Ok((id.clone(), secret.clone()));
        }

        if let Some(ref path) = self.oauth.client_secrets_file {
            let contents = std::fs::read_to_string(path)?;
            let parsed: ClientSecretsFile = serde_json::from_str(&contents)?;
            let entry = parsed.installed.or(parsed.web).ok_or_else(|| {
                ToolgateError::Config(format!(
                    "client secrets file {} has neither 'installed' nor 'web' section",
                    path.display()
                ))
            })?;
            return Ok((entry.client_id, entry.client_secret));
        }

        Err(ToolgateError::Config(format!(
            "no OAuth client configured: set {ENV_CLIENT_ID}/{ENV_CLIENT_SECRET} or oauth.client_secrets_file"
        ))
        .into())
    }

    /// Session cache TTL as a `chrono::Duration`.
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.credentials.cache_ttl_minutes as i64)
    }

    /// Validate the loaded configuration
    ///
    /// # Errors
    ///
    /// Returns [`ToolgateError::Config`] when the configuration is unusable:
    /// an empty tool set, a zero TTL, or an interactive instance without
    /// any OAuth client source.
    pub fn validate(&self) -> Result<()> {
        if self.server.tool_sets.is_empty() {
            return Err(ToolgateError::Config("server.tool_sets must not be empty".to_string()).into());
        }
        if self.credentials.cache_ttl_minutes == 0 {
            return Err(ToolgateError::Config(
                "credentials.cache_ttl_minutes must be greater than zero".to_string(),
            )
            .into());
        }
        if self.oauth.interactive {
            // Fail fast at startup rather than mid-flow.
            self.oauth_client().map(|_| ())?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            oauth: OAuthConfig::default(),
            credentials: CredentialsConfig::default(),
            scopes: ScopeCatalog::default(),
        }
    }
}
