//! Tool implementations and tool-set assembly
//!
//! Tools are grouped into named sets (`sheets`, `drive`); a running
//! instance activates a subset of them via `server.tool_sets`. Each tool
//! registers a capability contract naming the service, API version, and
//! scope aliases it needs; aliases are resolved against the scope catalog
//! here, at registration time, so dispatch works with full URLs only.

pub mod drive;
pub mod sheets;

use std::sync::Arc;

use tracing::info;

use crate::auth::ServiceKind;
use crate::config::Config;
use crate::error::{Result, ToolgateError};
use crate::server::{CapabilityContract, RoutingTable, Tool, ToolHandler, ToolRegistration};

/// Everything needed to register one tool.
pub(crate) struct ToolSpec {
    pub(crate) tool: Tool,
    pub(crate) service: ServiceKind,
    pub(crate) api_version: &'static str,
    /// Scope aliases, resolved against the catalog at registration time
    pub(crate) scope_aliases: &'static [&'static str],
    pub(crate) handler: Arc<dyn ToolHandler>,
}

/// Builds the routing table for the instance's active tool sets.
///
/// # Errors
///
/// Returns [`ToolgateError::Config`] for an unknown tool-set name or an
/// unknown scope alias.
pub fn build_routing_table(config: &Config) -> Result<RoutingTable> {
    let mut table = RoutingTable::new();

    for set in &config.server.tool_sets {
        let specs = match set.as_str() {
            "sheets" => sheets::tool_specs(),
            "drive" => drive::tool_specs(),
            other => {
                return Err(ToolgateError::Config(format!("unknown tool set: {other}")).into())
            }
        };
        for spec in specs {
            register(&mut table, config, spec)?;
        }
        info!(tool_set = set, "activated tool set");
    }

    Ok(table)
}

fn register(table: &mut RoutingTable, config: &Config, spec: ToolSpec) -> Result<()> {
    let aliases: Vec<String> = spec.scope_aliases.iter().map(|s| s.to_string()).collect();
    let scopes = config.scopes.resolve_all(&aliases)?;
    table.register(ToolRegistration {
        tool: spec.tool,
        contract: CapabilityContract {
            service: spec.service,
            api_version: spec.api_version.to_string(),
            scopes,
        },
        handler: spec.handler,
    });
    Ok(())
}
