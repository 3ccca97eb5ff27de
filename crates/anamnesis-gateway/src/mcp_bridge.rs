//! Line-delimited JSON-RPC 2.0 over stdin/stdout.
//!
//! A thin proxy: every `tools/call` forwards into the same `AppState` and
//! tool registry the HTTP router dispatches through, so there is exactly
//! one place a tool's behavior is defined — no separate database handle,
//! no separate dispatcher.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use anamnesis_core::ApiError;

use crate::state::AppState;
use crate::tools::registry;

pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin).lines();

    while let Some(line) = reader.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                write_response(&mut stdout, json!(null), Some(parse_error(&e.to_string())), None).await?;
                continue;
            }
        };

        let id = request.get("id").cloned().unwrap_or(json!(null));
        let is_notification = request.get("id").is_none();
        let method = request.get("method").and_then(|v| v.as_str()).unwrap_or("");

        match method {
            "initialize" => {
                write_response(
                    &mut stdout,
                    id,
                    None,
                    Some(json!({
                        "protocolVersion": "2025-06-18",
                        "capabilities": { "tools": {} },
                        "serverInfo": { "name": "anamnesis", "version": env!("CARGO_PKG_VERSION") }
                    })),
                )
                .await?;
            }

            "notifications/initialized" => {}

            "tools/list" => {
                let defs: Vec<Value> = registry()
                    .into_iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "inputSchema": t.input_schema,
                        })
                    })
                    .collect();
                write_response(&mut stdout, id, None, Some(json!({ "tools": defs }))).await?;
            }

            "tools/call" => {
                let params = request.get("params").cloned().unwrap_or(json!({}));
                let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
                let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

                let result = call_tool(state.clone(), name, arguments).await;
                match result {
                    Ok(value) => {
                        write_response(
                            &mut stdout,
                            id,
                            None,
                            Some(json!({
                                "content": [{"type": "text", "text": value.to_string()}],
                                "isError": false
                            })),
                        )
                        .await?;
                    }
                    Err(err) => {
                        write_response(
                            &mut stdout,
                            id,
                            None,
                            Some(json!({
                                "content": [{"type": "text", "text": err.message}],
                                "isError": true
                            })),
                        )
                        .await?;
                    }
                }
            }

            _ => {
                if !is_notification {
                    write_response(
                        &mut stdout,
                        id,
                        Some(json!({ "code": -32601, "message": format!("Method not found: {method}") })),
                        None,
                    )
                    .await?;
                }
            }
        }
    }

    Ok(())
}

async fn call_tool(state: Arc<AppState>, name: &str, args: Value) -> Result<Value, ApiError> {
    let tool = registry()
        .into_iter()
        .find(|t| t.name == name)
        .ok_or_else(|| ApiError::not_found(format!("unknown tool: {name}")))?;
    (tool.handler)(state, args).await
}

fn parse_error(message: &str) -> Value {
    json!({ "code": -32700, "message": format!("Parse error: {message}") })
}

async fn write_response(
    stdout: &mut tokio::io::Stdout,
    id: Value,
    error: Option<Value>,
    result: Option<Value>,
) -> std::io::Result<()> {
    let response = if let Some(err) = error {
        json!({ "jsonrpc": "2.0", "id": id, "error": err })
    } else {
        json!({ "jsonrpc": "2.0", "id": id, "result": result.unwrap_or(json!(null)) })
    };
    let mut line = serde_json::to_vec(&response)?;
    line.push(b'\n');
    stdout.write_all(&line).await?;
    stdout.flush().await?;
    Ok(())
}
