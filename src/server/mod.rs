//! Tool routing and capability contracts
//!
//! This module contains the routing table that maps tool names to their
//! handlers, and the capability contract each registration declares: which
//! provider service the tool talks to, at which API version, and with
//! which scopes.
//!
//! Dispatch is where authentication meets tools: the routing table asks
//! the [`AuthManager`](crate::auth::AuthManager) for a client satisfying
//! the contract, then invokes the handler with it. Handlers never resolve
//! credentials themselves.

pub mod http;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{AuthManager, ServiceClient, ServiceKind};
use crate::error::{Result, ToolgateError};

// ---------------------------------------------------------------------------
// CapabilityContract
// ---------------------------------------------------------------------------

/// Declares what a tool needs from the provider: the service, the API
/// version, and the full scope URLs its calls require.
///
/// The contract is fixed at registration time; scope aliases are resolved
/// to full URLs before the contract is built, so dispatch never consults
/// the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityContract {
    /// Provider service the tool talks to
    pub service: ServiceKind,
    /// Service API version (e.g. "v4")
    pub api_version: String,
    /// Full scope URLs the tool's calls require
    pub scopes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tool definition and result
// ---------------------------------------------------------------------------

/// Caller-facing description of a tool.
///
/// `parameters` is a JSON schema for the tool's arguments, in the common
/// function-calling format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Name of the tool
    pub name: String,
    /// Description of what the tool does
    pub description: String,
    /// JSON schema for the tool's parameters
    pub parameters: serde_json::Value,
}

impl Tool {
    /// Create a new tool definition
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    /// Whether the tool execution succeeded
    pub success: bool,
    /// Output from the tool
    pub output: String,
    /// Error message if execution failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Create a failed tool result
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// ToolHandler
// ---------------------------------------------------------------------------

/// Execution logic for one tool.
///
/// The handler receives an authenticated [`ServiceClient`] already bound
/// to the service, API version, and scopes its contract declared, plus the
/// caller's JSON arguments.
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use toolgate::auth::ServiceClient;
/// use toolgate::error::Result;
/// use toolgate::server::{ToolHandler, ToolResult};
///
/// struct Ping;
///
/// #[async_trait]
/// impl ToolHandler for Ping {
///     async fn execute(&self, _client: ServiceClient, _args: Value) -> Result<ToolResult> {
///         Ok(ToolResult::success("pong"))
///     }
/// }
/// ```
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Executes the tool with the given client and arguments
    ///
    /// # Errors
    ///
    /// Returns error when the provider call or argument validation fails.
    async fn execute(&self, client: ServiceClient, args: serde_json::Value) -> Result<ToolResult>;
}

/// One routing table entry: the caller-facing definition, the capability
/// contract, and the handler.
pub struct ToolRegistration {
    /// Caller-facing tool definition
    pub tool: Tool,
    /// What the tool needs from the provider
    pub contract: CapabilityContract,
    /// Execution logic
    pub handler: Arc<dyn ToolHandler>,
}

// ---------------------------------------------------------------------------
// RoutingTable
// ---------------------------------------------------------------------------

/// Maps tool names to registrations and performs authenticated dispatch.
///
/// The table is built once at startup from the instance's active tool
/// sets and is immutable afterwards.
pub struct RoutingTable {
    entries: HashMap<String, ToolRegistration>,
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingTable")
            .field("tools", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RoutingTable {
    /// Create a new empty routing table
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a tool, overwriting any previous registration of the same
    /// name.
    pub fn register(&mut self, registration: ToolRegistration) {
        self.entries
            .insert(registration.tool.name.clone(), registration);
    }

    /// Get a registration by tool name
    pub fn get(&self, name: &str) -> Option<&ToolRegistration> {
        self.entries.get(name)
    }

    /// All caller-facing tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.entries.values().map(|r| r.tool.clone()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispatches one tool call.
    ///
    /// Resolves an authenticated client satisfying the tool's capability
    /// contract, then invokes the handler with it. Credential resolution
    /// happens per call; the session cache makes the repeat case cheap.
    ///
    /// # Arguments
    ///
    /// * `auth` - The credential resolution entry point.
    /// * `identity` - Identity to act as; `None` only in single-identity
    ///   mode.
    /// * `name` - Registered tool name.
    /// * `args` - Caller-supplied JSON arguments.
    ///
    /// # Errors
    ///
    /// - [`ToolgateError::UnknownTool`] when no tool with `name` is
    ///   registered on this instance.
    /// - [`ToolgateError::Auth`] when credential resolution fails.
    pub async fn dispatch(
        &self,
        auth: &AuthManager,
        identity: Option<&str>,
        name: &str,
        args: serde_json::Value,
    ) -> Result<ToolResult> {
        let registration = self
            .entries
            .get(name)
            .ok_or_else(|| ToolgateError::UnknownTool(name.to_string()))?;

        debug!(tool = name, service = %registration.contract.service, "dispatching tool call");
        let client = auth
            .resolve(
                identity,
                registration.contract.service,
                &registration.contract.api_version,
                &registration.contract.scopes,
            )
            .await
            .map_err(ToolgateError::Auth)?;

        registration.handler.execute(client, args).await
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
