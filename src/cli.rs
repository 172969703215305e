//! Command-line interface definition for Toolgate
//!
//! Instance launch configuration lives here: the listening port and the
//! tool-set selection that restrict which tool registrations are active
//! for this running instance. Everything else comes from the config file.

use std::path::PathBuf;

use clap::Parser;

/// Toolgate - authenticated multi-tenant tool-calling server
#[derive(Parser, Debug, Default)]
#[command(name = "toolgate", version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// TCP port for the inbound tool-call surface
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Comma-separated tool sets to activate (e.g. "sheets,drive")
    #[arg(long, value_delimiter = ',')]
    pub tools: Option<Vec<String>>,

    /// Base directory for credential record files
    #[arg(long, env = "TOOLGATE_CREDENTIALS_DIR")]
    pub credentials_dir: Option<PathBuf>,

    /// Single-identity mode: use the one stored credential record without
    /// requiring callers to name an identity
    #[arg(long)]
    pub single_user: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
