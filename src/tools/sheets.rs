//! Spreadsheet tools
//!
//! Thin handlers over the spreadsheet REST API: each one validates its
//! arguments, issues the provider call through the injected client, and
//! formats a human-readable summary. All spreadsheet-level semantics stay
//! with the provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{ServiceClient, ServiceKind};
use crate::error::{Result, ToolgateError};
use crate::server::{Tool, ToolHandler, ToolResult};
use crate::tools::ToolSpec;

const DEFAULT_RANGE: &str = "A1:Z1000";

/// Registrations for the `sheets` tool set.
pub(crate) fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            tool: Tool::new(
                "read_sheet_values",
                "Read a range of cell values from a spreadsheet",
                json!({
                    "type": "object",
                    "properties": {
                        "spreadsheet_id": {"type": "string", "description": "Spreadsheet to read"},
                        "range": {"type": "string", "description": "A1-notation range (default A1:Z1000)"}
                    },
                    "required": ["spreadsheet_id"]
                }),
            ),
            service: ServiceKind::Sheets,
            api_version: "v4",
            scope_aliases: &["sheets_read"],
            handler: Arc::new(ReadSheetValues),
        },
        ToolSpec {
            tool: Tool::new(
                "modify_sheet_values",
                "Write or clear a range of cell values in a spreadsheet",
                json!({
                    "type": "object",
                    "properties": {
                        "spreadsheet_id": {"type": "string", "description": "Spreadsheet to modify"},
                        "range": {"type": "string", "description": "A1-notation range"},
                        "values": {
                            "type": "array",
                            "items": {"type": "array", "items": {"type": "string"}},
                            "description": "Rows of cell values to write"
                        },
                        "clear_values": {"type": "boolean", "description": "Clear the range instead of writing"}
                    },
                    "required": ["spreadsheet_id", "range"]
                }),
            ),
            service: ServiceKind::Sheets,
            api_version: "v4",
            scope_aliases: &["sheets_write"],
            handler: Arc::new(ModifySheetValues),
        },
        ToolSpec {
            tool: Tool::new(
                "create_spreadsheet",
                "Create a new spreadsheet",
                json!({
                    "type": "object",
                    "properties": {
                        "title": {"type": "string", "description": "Title of the new spreadsheet"},
                        "sheet_names": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Names of the initial sheets"
                        }
                    },
                    "required": ["title"]
                }),
            ),
            service: ServiceKind::Sheets,
            api_version: "v4",
            scope_aliases: &["sheets_write"],
            handler: Arc::new(CreateSpreadsheet),
        },
        ToolSpec {
            tool: Tool::new(
                "list_spreadsheets",
                "List spreadsheets accessible to the identity, most recently modified first",
                json!({
                    "type": "object",
                    "properties": {
                        "max_results": {"type": "integer", "description": "Maximum number of spreadsheets to list (default 25)"}
                    }
                }),
            ),
            service: ServiceKind::Drive,
            api_version: "v3",
            scope_aliases: &["drive_read"],
            handler: Arc::new(ListSpreadsheets),
        },
    ]
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| ToolgateError::Tool(format!("invalid arguments: {e}")).into())
}

// ---------------------------------------------------------------------------
// read_sheet_values
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ReadSheetValuesArgs {
    spreadsheet_id: String,
    #[serde(default)]
    range: Option<String>,
}

struct ReadSheetValues;

#[async_trait]
impl ToolHandler for ReadSheetValues {
    async fn execute(&self, client: ServiceClient, args: Value) -> Result<ToolResult> {
        let args: ReadSheetValuesArgs = parse_args(args)?;
        let range = args.range.as_deref().unwrap_or(DEFAULT_RANGE);

        let body = client
            .get_json(
                &format!("spreadsheets/{}/values/{}", args.spreadsheet_id, range),
                &[],
            )
            .await?;

        let rows = body["values"].as_array().cloned().unwrap_or_default();
        if rows.is_empty() {
            return Ok(ToolResult::success(format!(
                "No data found in range '{range}' of spreadsheet {}.",
                args.spreadsheet_id
            )));
        }

        let mut output = format!(
            "Values from spreadsheet {} range '{range}' ({} rows):\n",
            args.spreadsheet_id,
            rows.len()
        );
        for (i, row) in rows.iter().enumerate() {
            let cells: Vec<String> = row
                .as_array()
                .map(|r| r.iter().map(render_cell).collect())
                .unwrap_or_default();
            output.push_str(&format!("Row {:>4}: {}\n", i + 1, cells.join(" | ")));
        }
        Ok(ToolResult::success(output))
    }
}

/// Cell values come back as strings, numbers, or booleans.
fn render_cell(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// modify_sheet_values
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ModifySheetValuesArgs {
    spreadsheet_id: String,
    range: String,
    #[serde(default)]
    values: Option<Vec<Vec<String>>>,
    #[serde(default)]
    clear_values: bool,
}

struct ModifySheetValues;

#[async_trait]
impl ToolHandler for ModifySheetValues {
    async fn execute(&self, client: ServiceClient, args: Value) -> Result<ToolResult> {
        let args: ModifySheetValuesArgs = parse_args(args)?;

        if args.clear_values {
            let body = client
                .post_json(
                    &format!(
                        "spreadsheets/{}/values/{}:clear",
                        args.spreadsheet_id, args.range
                    ),
                    &[],
                    &json!({}),
                )
                .await?;
            let cleared = body["clearedRange"].as_str().unwrap_or(&args.range);
            return Ok(ToolResult::success(format!(
                "Cleared range '{cleared}' in spreadsheet {}.",
                args.spreadsheet_id
            )));
        }

        let Some(values) = args.values else {
            return Ok(ToolResult::error(
                "either 'values' must be provided or 'clear_values' must be true",
            ));
        };

        let body = client
            .put_json(
                &format!(
                    "spreadsheets/{}/values/{}",
                    args.spreadsheet_id, args.range
                ),
                &[("valueInputOption", "USER_ENTERED")],
                &json!({ "values": values }),
            )
            .await?;

        let updated_cells = body["updatedCells"].as_u64().unwrap_or(0);
        Ok(ToolResult::success(format!(
            "Updated {updated_cells} cells in range '{}' of spreadsheet {}.",
            args.range, args.spreadsheet_id
        )))
    }
}

// ---------------------------------------------------------------------------
// create_spreadsheet
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateSpreadsheetArgs {
    title: String,
    #[serde(default)]
    sheet_names: Option<Vec<String>>,
}

struct CreateSpreadsheet;

#[async_trait]
impl ToolHandler for CreateSpreadsheet {
    async fn execute(&self, client: ServiceClient, args: Value) -> Result<ToolResult> {
        let args: CreateSpreadsheetArgs = parse_args(args)?;

        let sheets: Vec<Value> = args
            .sheet_names
            .unwrap_or_default()
            .into_iter()
            .map(|name| json!({ "properties": { "title": name } }))
            .collect();

        let mut request = json!({ "properties": { "title": args.title } });
        if !sheets.is_empty() {
            request["sheets"] = Value::Array(sheets);
        }

        let body = client.post_json("spreadsheets", &[], &request).await?;

        let id = body["spreadsheetId"].as_str().unwrap_or("<unknown>");
        let url = body["spreadsheetUrl"].as_str().unwrap_or("<unknown>");
        Ok(ToolResult::success(format!(
            "Created spreadsheet '{}'.\nID: {id}\nURL: {url}",
            args.title
        )))
    }
}

// ---------------------------------------------------------------------------
// list_spreadsheets
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListSpreadsheetsArgs {
    #[serde(default)]
    max_results: Option<u32>,
}

struct ListSpreadsheets;

#[async_trait]
impl ToolHandler for ListSpreadsheets {
    async fn execute(&self, client: ServiceClient, args: Value) -> Result<ToolResult> {
        let args: ListSpreadsheetsArgs = parse_args(args)?;
        let page_size = args.max_results.unwrap_or(25).to_string();

        let body = client
            .get_json(
                "files",
                &[
                    ("q", "mimeType='application/vnd.google-apps.spreadsheet'"),
                    ("pageSize", &page_size),
                    ("orderBy", "modifiedTime desc"),
                    ("fields", "files(id,name,modifiedTime,webViewLink)"),
                ],
            )
            .await?;

        let files = body["files"].as_array().cloned().unwrap_or_default();
        if files.is_empty() {
            return Ok(ToolResult::success("No spreadsheets found.".to_string()));
        }

        let mut output = format!("Found {} spreadsheets:\n", files.len());
        for file in &files {
            output.push_str(&format!(
                "- \"{}\" (ID: {}) modified {}\n",
                file["name"].as_str().unwrap_or("<untitled>"),
                file["id"].as_str().unwrap_or("<unknown>"),
                file["modifiedTime"].as_str().unwrap_or("<unknown>"),
            ));
        }
        Ok(ToolResult::success(output))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
