//! Tool registry: catalog entries as MCP tools.

use model_relay_forward::catalog::LOCAL_CSV_TOOL;
use model_relay_forward::tabular::read_csv_rows;
use model_relay_forward::{BackendKind, Forwarder, ResolvedBackend};
use rmcp::ErrorData;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool, ToolAnnotations};
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

const PROMPT_ARG: &str = "prompt";
const FILE_PATH_ARG: &str = "file_path";

/// Protocol-level failure of a `tools/call`. Backend failures are *not* reported this way;
/// they come back as an `isError` tool result.
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },
}

impl From<ToolCallError> for ErrorData {
    fn from(e: ToolCallError) -> Self {
        ErrorData::invalid_params(e.to_string(), None)
    }
}

pub struct ToolRegistry {
    forwarder: Forwarder,
    backends: Vec<ResolvedBackend>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new(forwarder: Forwarder, backends: Vec<ResolvedBackend>) -> Self {
        Self {
            forwarder,
            backends,
        }
    }

    #[must_use]
    pub fn backends(&self) -> &[ResolvedBackend] {
        &self.backends
    }

    /// The local CSV conversion tool followed by one tool per backend, in catalog order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::with_capacity(self.backends.len() + 1);

        let mut local = Tool::new(
            LOCAL_CSV_TOOL,
            "Reads a CSV file from the specified path and converts it to a JSON list of \
             objects, one per row. Numeric cells become numbers. Provide the full path to the \
             CSV file as a string.",
            string_arg_schema(FILE_PATH_ARG, "Full path to the CSV file."),
        );
        local.annotations = Some(ToolAnnotations {
            title: None,
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
            open_world_hint: Some(false),
        });
        tools.push(local);

        for b in &self.backends {
            let schema = match b.kind {
                BackendKind::Prompt => {
                    string_arg_schema(PROMPT_ARG, "The text prompt to send to the model.")
                }
                BackendKind::Csv => string_arg_schema(FILE_PATH_ARG, "Full path to the CSV file."),
            };
            let mut tool = Tool::new(b.tool.clone(), b.description.clone(), schema);
            tool.annotations = Some(ToolAnnotations {
                title: Some(b.endpoint.label.clone()),
                read_only_hint: Some(false),
                destructive_hint: Some(false),
                idempotent_hint: Some(false),
                open_world_hint: Some(true),
            });
            tools.push(tool);
        }

        tools
    }

    /// Execute a tool.
    ///
    /// # Errors
    ///
    /// Returns an error only for unknown tools or malformed arguments. Configuration, transport,
    /// status and format problems are returned as an `isError` result whose text starts with
    /// `Error:`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
    ) -> Result<CallToolResult, ToolCallError> {
        if name == LOCAL_CSV_TOOL {
            let path = string_arg(name, arguments, FILE_PATH_ARG)?;
            info!(tool = %name, path = %path, "tool call");
            return Ok(match load_rows(PathBuf::from(path)).await {
                Ok(rows) => text_result(
                    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string()),
                ),
                Err(text) => error_result(text),
            });
        }

        let backend = self
            .backends
            .iter()
            .find(|b| b.tool == name)
            .ok_or_else(|| ToolCallError::UnknownTool(name.to_string()))?;

        match backend.kind {
            BackendKind::Prompt => {
                let prompt = string_arg(name, arguments, PROMPT_ARG)?;
                info!(tool = %name, backend = %backend.endpoint.label, "tool call");
                Ok(match self.forwarder.forward(&prompt, &backend.endpoint).await {
                    Ok(text) => text_result(text),
                    Err(e) => error_result(e.to_tool_text()),
                })
            }
            BackendKind::Csv => {
                let path = string_arg(name, arguments, FILE_PATH_ARG)?;
                info!(tool = %name, backend = %backend.endpoint.label, path = %path, "tool call");
                let rows = match load_rows(PathBuf::from(path)).await {
                    Ok(rows) => rows,
                    Err(text) => return Ok(error_result(text)),
                };
                Ok(
                    match self.forwarder.forward_rows(&rows, &backend.endpoint).await {
                        Ok(text) => text_result(text),
                        Err(e) => error_result(e.to_tool_text()),
                    },
                )
            }
        }
    }
}

async fn load_rows(path: PathBuf) -> Result<Vec<Map<String, Value>>, String> {
    let shown = path.display().to_string();
    match tokio::task::spawn_blocking(move || read_csv_rows(&path)).await {
        Ok(Ok(rows)) => {
            debug!(path = %shown, rows = rows.len(), "CSV loaded");
            Ok(rows)
        }
        Ok(Err(e)) => {
            error!(path = %shown, error = %e, "CSV conversion failed");
            Err(e.to_tool_text())
        }
        Err(e) => {
            error!(path = %shown, error = %e, "CSV conversion task failed");
            Err(format!("Error processing CSV: conversion task failed: {e}"))
        }
    }
}

fn string_arg(tool: &str, arguments: &Value, key: &str) -> Result<String, ToolCallError> {
    match arguments.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ToolCallError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("'{key}' must be a string"),
        }),
        None => Err(ToolCallError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("missing required argument '{key}'"),
        }),
    }
}

fn string_arg_schema(key: &str, description: &str) -> Arc<JsonObject> {
    let mut properties = JsonObject::new();
    properties.insert(
        key.to_string(),
        json!({ "type": "string", "description": description }),
    );

    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    schema.insert("required".to_string(), json!([key]));
    Arc::new(schema)
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text)])
}

fn error_result(text: String) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(text)],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}

#[cfg(test)]
mod tests {
    use super::{ToolCallError, ToolRegistry};
    use model_relay_forward::{CatalogConfig, Forwarder};
    use model_relay_test_support::{MockChatBackend, MockReply, chat_reply};
    use rmcp::ErrorData;
    use rmcp::model::ErrorCode;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::io::Write as _;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
        }
    }

    const CATALOG: &str = r"
defaults:
  apiKeyEnv: TEST_KEY
backends:
  - tool: ask_alpha
    label: Alpha
    urlEnv: ALPHA_URL
  - tool: send_csv
    label: CSV
    kind: csv
    urlEnv: CSV_URL
";

    fn registry(vars: &[(&str, String)]) -> anyhow::Result<ToolRegistry> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        let catalog = CatalogConfig::from_yaml_str(CATALOG)?;
        let backends = catalog.resolve(|k| vars.get(k).cloned());
        Ok(ToolRegistry::new(Forwarder::new()?, backends))
    }

    fn result_json(r: &rmcp::model::CallToolResult) -> Value {
        serde_json::to_value(r).expect("serialize tool result")
    }

    fn result_text(v: &Value) -> &str {
        v["content"][0]["text"].as_str().expect("text content")
    }

    #[test]
    fn list_tools_exposes_local_and_catalog_tools() -> anyhow::Result<()> {
        let reg = registry(&[])?;
        let tools: Vec<Value> = reg
            .list_tools()
            .iter()
            .map(|t| serde_json::to_value(t).expect("serialize tool"))
            .collect();

        let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
        assert_eq!(names, vec!["convert_csv_to_json", "ask_alpha", "send_csv"]);

        assert_eq!(tools[1]["inputSchema"]["required"], json!(["prompt"]));
        assert_eq!(
            tools[1]["inputSchema"]["properties"]["prompt"]["type"],
            json!("string")
        );
        assert_eq!(tools[2]["inputSchema"]["required"], json!(["file_path"]));
        assert_eq!(tools[1]["annotations"]["openWorldHint"], json!(true));
        assert_eq!(tools[0]["annotations"]["readOnlyHint"], json!(true));
        Ok(())
    }

    #[tokio::test]
    async fn prompt_tool_returns_backend_content() -> anyhow::Result<()> {
        let backend = MockChatBackend::start(MockReply::json(&chat_reply("hello"))).await?;
        let reg = registry(&[("ALPHA_URL", backend.url()), ("TEST_KEY", "k".to_string())])?;

        let res = reg
            .call_tool("ask_alpha", &json!({"prompt": "x"}))
            .await?;
        let v = result_json(&res);
        assert_eq!(result_text(&v), "hello");
        assert_ne!(v["isError"], json!(true));
        Ok(())
    }

    #[tokio::test]
    async fn unconfigured_backend_is_an_error_result_not_a_protocol_error() -> anyhow::Result<()> {
        let reg = registry(&[])?;
        let res = reg
            .call_tool("ask_alpha", &json!({"prompt": "x"}))
            .await?;
        let v = result_json(&res);
        assert_eq!(v["isError"], json!(true));
        assert_eq!(
            result_text(&v),
            "Error: Alpha API configuration missing on server (ALPHA_URL, TEST_KEY not set)."
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_arguments_are_protocol_errors() -> anyhow::Result<()> {
        let reg = registry(&[])?;

        let err = reg
            .call_tool("nope", &json!({}))
            .await
            .expect_err("unknown tool");
        assert!(matches!(err, ToolCallError::UnknownTool(_)));
        assert_eq!(ErrorData::from(err).code, ErrorCode::INVALID_PARAMS);

        let err = reg
            .call_tool("ask_alpha", &json!({}))
            .await
            .expect_err("missing prompt");
        assert!(matches!(err, ToolCallError::InvalidArguments { .. }));

        let err = reg
            .call_tool("ask_alpha", &json!({"prompt": 5}))
            .await
            .expect_err("non-string prompt");
        assert!(err.to_string().contains("must be a string"));
        Ok(())
    }

    #[tokio::test]
    async fn convert_csv_to_json_reads_local_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "sku,qty,price\nA-1,3,2.50\n")?;
        let reg = registry(&[])?;

        let res = reg
            .call_tool(
                "convert_csv_to_json",
                &json!({"file_path": file.path().display().to_string()}),
            )
            .await?;
        let v = result_json(&res);
        assert_eq!(
            result_text(&v),
            "[\n  {\n    \"sku\": \"A-1\",\n    \"qty\": 3,\n    \"price\": 2.5\n  }\n]"
        );
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_csv_is_logged_as_an_error() -> anyhow::Result<()> {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let reg = registry(&[])?;
        let res = reg
            .call_tool(
                "convert_csv_to_json",
                &json!({"file_path": "/definitely/not/here.csv"}),
            )
            .await?;
        assert_eq!(result_json(&res)["isError"], json!(true));

        let text = logs.text();
        assert!(text.contains("ERROR"), "{text}");
        assert!(text.contains("CSV conversion failed"), "{text}");
        assert!(text.contains("/definitely/not/here.csv"), "{text}");
        Ok(())
    }

    #[tokio::test]
    async fn csv_backend_forwards_rows_and_reports_missing_files() -> anyhow::Result<()> {
        let backend =
            MockChatBackend::start(MockReply::json(&chat_reply(r#"{"total": 3}"#))).await?;
        let reg = registry(&[("CSV_URL", backend.url()), ("TEST_KEY", "k".to_string())])?;

        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "sku,qty\nA-1,3\n")?;
        let res = reg
            .call_tool(
                "send_csv",
                &json!({"file_path": file.path().display().to_string()}),
            )
            .await?;
        let v = result_json(&res);
        let reply: Value = serde_json::from_str(result_text(&v))?;
        assert_eq!(reply, json!({"total": 3}));

        let sent = backend.last_request().expect("request");
        let content = sent.body["messages"][0]["content"]
            .as_str()
            .expect("string content");
        assert_eq!(serde_json::from_str::<Value>(content)?, json!([{"sku": "A-1", "qty": 3}]));

        let res = reg
            .call_tool("send_csv", &json!({"file_path": "/definitely/not/here.csv"}))
            .await?;
        let v = result_json(&res);
        assert_eq!(v["isError"], json!(true));
        assert!(result_text(&v).starts_with("Error processing CSV: File not found"));
        assert_eq!(backend.hits(), 1);
        Ok(())
    }
}
