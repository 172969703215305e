//! Toolgate - authenticated multi-tenant tool-calling server
//!
#![doc = "Main entry point for the Toolgate server."]

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use toolgate::auth::{
    AuthManager, AuthManagerOptions, CredentialStore, OAuthFlow, SessionCache,
};
use toolgate::cli::Cli;
use toolgate::config::Config;
use toolgate::server::http::{self, AppState};
use toolgate::tools;

// Tool handlers run cooperatively on one scheduler thread; blocking work
// inside the auth flow goes through spawn_blocking.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse_args();

    let config_path = cli.config.clone().unwrap_or_else(|| "config/config.yaml".to_string());
    let config = Config::load(&config_path, &cli)?;
    config.validate()?;

    let http_client = Arc::new(reqwest::Client::new());

    let store = Arc::new(CredentialStore::new(config.credentials.dir.clone())?);
    let cache = Arc::new(SessionCache::new(config.cache_ttl()));

    // The flow needs an OAuth client; headless instances without one still
    // serve calls from stored records and the cache.
    let flow = match OAuthFlow::from_config(Arc::clone(&http_client), &config) {
        Ok(flow) => Some(Arc::new(flow)),
        Err(e) => {
            tracing::warn!("OAuth flows disabled: {e}");
            None
        }
    };

    let upfront_scopes = config.scopes.resolve_all(&config.oauth.upfront_scopes)?;
    let auth = Arc::new(AuthManager::new(
        Arc::clone(&http_client),
        store,
        cache,
        flow,
        AuthManagerOptions {
            single_user: config.credentials.single_user,
            interactive: config.oauth.interactive,
            api_base: config.oauth.api_base.clone(),
            upfront_scopes,
        },
    ));

    let table = Arc::new(tools::build_routing_table(&config)?);
    tracing::info!(
        tools = table.len(),
        tool_sets = ?config.server.tool_sets,
        "routing table built"
    );

    http::serve(AppState { auth, table }, config.server.port).await
}

/// Initialize tracing subscriber with environment filter
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toolgate=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
