//! File storage tools
//!
//! Thin handlers over the file storage REST API, same shape as the
//! spreadsheet tools: validate arguments, call the provider through the
//! injected client, format a text summary.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{ServiceClient, ServiceKind};
use crate::error::{Result, ToolgateError};
use crate::server::{Tool, ToolHandler, ToolResult};
use crate::tools::ToolSpec;

/// Registrations for the `drive` tool set.
pub(crate) fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            tool: Tool::new(
                "search_files",
                "Search files by name",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Text to match against file names"},
                        "max_results": {"type": "integer", "description": "Maximum number of files to list (default 25)"}
                    },
                    "required": ["query"]
                }),
            ),
            service: ServiceKind::Drive,
            api_version: "v3",
            scope_aliases: &["drive_read"],
            handler: Arc::new(SearchFiles),
        },
        ToolSpec {
            tool: Tool::new(
                "get_file_metadata",
                "Fetch name, type, and modification time for one file",
                json!({
                    "type": "object",
                    "properties": {
                        "file_id": {"type": "string", "description": "File to describe"}
                    },
                    "required": ["file_id"]
                }),
            ),
            service: ServiceKind::Drive,
            api_version: "v3",
            scope_aliases: &["drive_read"],
            handler: Arc::new(GetFileMetadata),
        },
    ]
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| ToolgateError::Tool(format!("invalid arguments: {e}")).into())
}

// ---------------------------------------------------------------------------
// search_files
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchFilesArgs {
    query: String,
    #[serde(default)]
    max_results: Option<u32>,
}

struct SearchFiles;

#[async_trait]
impl ToolHandler for SearchFiles {
    async fn execute(&self, client: ServiceClient, args: Value) -> Result<ToolResult> {
        let args: SearchFilesArgs = parse_args(args)?;
        let page_size = args.max_results.unwrap_or(25).to_string();
        // Single quotes in the name term would break out of the query
        // expression; escape them the way the provider expects.
        let q = format!("name contains '{}'", args.query.replace('\'', "\\'"));

        let body = client
            .get_json(
                "files",
                &[
                    ("q", q.as_str()),
                    ("pageSize", &page_size),
                    ("fields", "files(id,name,mimeType,modifiedTime)"),
                ],
            )
            .await?;

        let files = body["files"].as_array().cloned().unwrap_or_default();
        if files.is_empty() {
            return Ok(ToolResult::success(format!(
                "No files matching '{}'.",
                args.query
            )));
        }

        let mut output = format!("Found {} files matching '{}':\n", files.len(), args.query);
        for file in &files {
            output.push_str(&format!(
                "- \"{}\" (ID: {}, type: {})\n",
                file["name"].as_str().unwrap_or("<untitled>"),
                file["id"].as_str().unwrap_or("<unknown>"),
                file["mimeType"].as_str().unwrap_or("<unknown>"),
            ));
        }
        Ok(ToolResult::success(output))
    }
}

// ---------------------------------------------------------------------------
// get_file_metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GetFileMetadataArgs {
    file_id: String,
}

struct GetFileMetadata;

#[async_trait]
impl ToolHandler for GetFileMetadata {
    async fn execute(&self, client: ServiceClient, args: Value) -> Result<ToolResult> {
        let args: GetFileMetadataArgs = parse_args(args)?;

        let body = client
            .get_json(
                &format!("files/{}", args.file_id),
                &[("fields", "id,name,mimeType,modifiedTime,size,webViewLink")],
            )
            .await?;

        Ok(ToolResult::success(format!(
            "File \"{}\"\nID: {}\nType: {}\nModified: {}\nLink: {}",
            body["name"].as_str().unwrap_or("<untitled>"),
            body["id"].as_str().unwrap_or(&args.file_id),
            body["mimeType"].as_str().unwrap_or("<unknown>"),
            body["modifiedTime"].as_str().unwrap_or("<unknown>"),
            body["webViewLink"].as_str().unwrap_or("<none>"),
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ServiceClient {
        ServiceClient::new(
            Arc::new(reqwest::Client::new()),
            ServiceKind::Drive,
            "v3",
            server.uri(),
            "tok",
            "a@x.com",
        )
    }

    #[tokio::test]
    async fn test_search_files_builds_name_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("q", "name contains 'report'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [
                    {"id": "f1", "name": "report.txt", "mimeType": "text/plain"}
                ]
            })))
            .mount(&server)
            .await;

        let result = SearchFiles
            .execute(client_for(&server), json!({"query": "report"}))
            .await
            .expect("execute");
        assert!(result.output.contains("report.txt"));
    }

    #[tokio::test]
    async fn test_search_files_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
            .mount(&server)
            .await;

        let result = SearchFiles
            .execute(client_for(&server), json!({"query": "nothing"}))
            .await
            .expect("execute");
        assert!(result.output.contains("No files matching"));
    }

    #[tokio::test]
    async fn test_search_files_rejects_missing_query() {
        let server = MockServer::start().await;
        let err = SearchFiles
            .execute(client_for(&server), json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid arguments"));
    }

    #[tokio::test]
    async fn test_get_file_metadata_formats_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/f42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "f42",
                "name": "notes.md",
                "mimeType": "text/markdown",
                "modifiedTime": "2026-08-15T12:00:00Z"
            })))
            .mount(&server)
            .await;

        let result = GetFileMetadata
            .execute(client_for(&server), json!({"file_id": "f42"}))
            .await
            .expect("execute");
        assert!(result.output.contains("notes.md"));
        assert!(result.output.contains("text/markdown"));
    }
}
