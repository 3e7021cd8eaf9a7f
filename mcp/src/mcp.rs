//! MCP (Model Context Protocol) JSON-RPC handler.
//!
//! Implements the [MCP specification](https://spec.modelcontextprotocol.io/)
//! over stdio. It reads JSON-RPC 2.0 requests from stdin (one per line) and
//! writes responses to stdout.
//!
//! ## Supported methods
//!
//! | Method              | Description                      |
//! |---------------------|----------------------------------|
//! | `initialize`        | Handshake, returns capabilities  |
//! | `tools/list`        | List available tool definitions  |
//! | `tools/call`        | Execute a tool and return result |
//! | `ping`              | Liveness check                   |
//!
//! Notifications (`notifications/initialized`, `notifications/cancelled`) are
//! acknowledged silently.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, warn};

use crate::tools::{self, ToolContext};

const SERVER_NAME: &str = "mcp-jellyseerr";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Run the MCP server on stdio, processing JSON-RPC requests until EOF.
pub async fn run_stdio(ctx: &ToolContext) {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(stdin, stdout, ctx).await;
}

/// Process newline-delimited JSON-RPC requests from `reader` until EOF,
/// writing one response line per request to `writer`.
pub async fn serve<R, W>(mut reader: R, mut writer: W, ctx: &ToolContext)
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                error!("stdin read error: {}", e);
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(response) = handle_message(trimmed, ctx).await {
            write_response(&mut writer, &response).await;
        }
    }
    debug!("input closed, leaving MCP loop");
}

/// Handle one raw JSON-RPC line. Returns `None` for notifications.
async fn handle_message(raw: &str, ctx: &ToolContext) -> Option<Value> {
    let request: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {
                    "code": -32700,
                    "message": format!("Parse error: {}", e)
                }
            }));
        }
    };

    let id = request.get("id").cloned();
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");

    // Notifications (no id) are acknowledged silently
    let Some(id) = id else {
        match method {
            "notifications/initialized" | "notifications/cancelled" => {}
            _ => warn!("unknown notification: {}", method),
        }
        return None;
    };

    let response = match method {
        "initialize" => handle_initialize(),
        "tools/list" => handle_tools_list(),
        "tools/call" => handle_tools_call(&request, ctx).await,
        "ping" => json!({ "jsonrpc": "2.0", "result": {} }),
        _ => json!({
            "jsonrpc": "2.0",
            "error": {
                "code": -32601,
                "message": format!("Method not found: {}", method)
            }
        }),
    };

    Some(inject_id(response, id))
}

/// Handle `initialize`: return protocol version, capabilities, and server info.
fn handle_initialize() -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": {
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            }
        }
    })
}

/// Handle `tools/list`: return all tool definitions.
fn handle_tools_list() -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": {
            "tools": tools::tool_definitions()
        }
    })
}

/// Handle `tools/call`: dispatch to the appropriate tool handler.
async fn handle_tools_call(request: &Value, ctx: &ToolContext) -> Value {
    let params = request.get("params").cloned().unwrap_or(json!({}));
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or(json!({}));

    let result = tools::handle_tool_call(name, &args, ctx).await;

    let mut response_result = json!({
        "content": result.content
    });
    if result.is_error {
        response_result["isError"] = json!(true);
    }

    json!({
        "jsonrpc": "2.0",
        "result": response_result
    })
}

/// Inject the request `id` into a response object.
fn inject_id(mut response: Value, id: Value) -> Value {
    response["id"] = id;
    response
}

/// Write a JSON-RPC response (one line, flushed immediately).
async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Value) {
    let mut output = serde_json::to_string(response).unwrap_or_default();
    output.push('\n');
    if let Err(e) = writer.write_all(output.as_bytes()).await {
        error!("stdout write error: {}", e);
    }
    if let Err(e) = writer.flush().await {
        error!("stdout flush error: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpMethod;
    use crate::resolver::tests::FakeApi;
    use crate::resolver::{RequestResolver, ServicePolicy};
    use crate::tools::ServerInfo;
    use std::sync::Arc;

    fn ctx(api: FakeApi) -> ToolContext {
        ToolContext {
            resolver: RequestResolver::new(Arc::new(api), ServicePolicy::default()),
            info: ServerInfo {
                transport: "stdio".into(),
                auth_enabled: false,
            },
        }
    }

    async fn run(input: &str, ctx: &ToolContext) -> Vec<Value> {
        let mut out: Vec<u8> = Vec::new();
        serve(input.as_bytes(), &mut out, ctx).await;
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn initialize_then_list_tools() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n"
        );
        let out = run(input, &ctx(FakeApi::default())).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["id"], 1);
        assert_eq!(out[0]["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(out[0]["result"]["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(out[1]["id"], 2);
        assert_eq!(out[1]["result"]["tools"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn parse_error_and_unknown_method() {
        let input = concat!(
            "not json\n\n",
            r#"{"jsonrpc":"2.0","id":"a","method":"resources/list"}"#,
            "\n"
        );
        let out = run(input, &ctx(FakeApi::default())).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["error"]["code"], -32700);
        assert!(out[0]["id"].is_null());
        assert_eq!(out[1]["id"], "a");
        assert_eq!(out[1]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn tools_call_success_and_error() {
        let api = FakeApi::default().with(
            HttpMethod::Get,
            "request/3",
            json!({ "id": 3, "status": 2 }),
        );
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"get_request","arguments":{"request_id":3}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"get_request","arguments":{"request_id":4}}}"#,
            "\n"
        );
        let out = run(input, &ctx(api)).await;
        assert_eq!(out.len(), 2);

        assert_eq!(out[0]["id"], 7);
        assert!(out[0]["result"].get("isError").is_none());
        let text = out[0]["result"]["content"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["status"], 2);

        assert_eq!(out[1]["id"], 8);
        assert_eq!(out[1]["result"]["isError"], true);
    }

    #[tokio::test]
    async fn ping_method_answers_empty_result() {
        let out = run(
            "{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"ping\"}\n",
            &ctx(FakeApi::default()),
        )
        .await;
        assert_eq!(out[0], json!({ "jsonrpc": "2.0", "id": 9, "result": {} }));
    }
}
