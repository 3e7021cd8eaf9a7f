//! MCP tool definitions and handlers.
//!
//! Each tool is defined as a JSON schema (returned by [`tool_definitions`])
//! and handled by an async function dispatched from [`handle_tool_call`].
//!
//! ## Tools
//!
//! - `ping`: liveness, reports service/transport/auth info
//! - `search_media`: text search across movies, TV and people
//! - `request_media`: create a request, resolving the Radarr/Sonarr service
//! - `get_request`: fetch one request's details/status
//! - `raw_request`: call any endpoint (GET/POST/PUT/DELETE only)

use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::client::{ClientError, HttpMethod};
use crate::resolver::{MediaRequest, MediaType, RequestResolver};

const SERVICE_NAME: &str = "jellyseerr-mcp";

/// Static facts reported by `ping`.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub transport: String,
    pub auth_enabled: bool,
}

/// Everything a tool handler needs.
pub struct ToolContext {
    pub resolver: RequestResolver,
    pub info: ServerInfo,
}

/// Returns all tool definitions.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "ping",
            "description": "Simple liveness check. Returns server and transport info.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }
        }),
        json!({
            "name": "search_media",
            "description": "Search Jellyseerr for media by text query. Results include movies, TV shows and people; use the returned id and mediaType with request_media.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Free-text search, e.g. a title."
                    },
                    "page": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Result page (1-based). Default 1."
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "request_media",
            "description": "Create a media request in Jellyseerr. For TV shows, you can optionally specify seasons to request.\n\nThe fulfillment service is chosen automatically (radarr/sonarr, or their _4k variants when is_4k is set) unless server_id or service_slug is given. server_id takes precedence over service_slug.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "media_id": {
                        "type": "integer",
                        "description": "The media id from search results (TMDB id)."
                    },
                    "media_type": {
                        "type": "string",
                        "enum": ["movie", "tv"],
                        "description": "Kind of media."
                    },
                    "is_4k": {
                        "type": "boolean",
                        "description": "Request the 4K tier. Default false."
                    },
                    "seasons": {
                        "type": ["array", "null"],
                        "items": { "type": "integer" },
                        "description": "TV only: season numbers to request. Omit to request all seasons."
                    },
                    "server_id": {
                        "type": ["integer", "null"],
                        "description": "Specific service id to use (overrides service_slug)."
                    },
                    "service_slug": {
                        "type": ["string", "null"],
                        "description": "Specific service slug to use, e.g. 'radarr', 'sonarr', 'radarr_4k'."
                    }
                },
                "required": ["media_id", "media_type"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "get_request",
            "description": "Get Jellyseerr request details/status by id.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "request_id": {
                        "type": "integer",
                        "description": "Request id returned by request_media."
                    }
                },
                "required": ["request_id"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "raw_request",
            "description": "(Advanced) Low-level tool to call any Jellyseerr endpoint. Use with caution.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "method": {
                        "type": "string",
                        "enum": ["GET", "POST", "PUT", "DELETE"],
                        "description": "HTTP method."
                    },
                    "endpoint": {
                        "type": "string",
                        "description": "Path below /api/v1, e.g. 'request?take=10' or 'media/12'."
                    },
                    "params": {
                        "type": ["object", "null"],
                        "description": "Query string parameters."
                    },
                    "body": {
                        "description": "JSON request body."
                    }
                },
                "required": ["method", "endpoint"],
                "additionalProperties": false
            }
        }),
    ]
}

/// Handle a tool call and return MCP content.
pub async fn handle_tool_call(name: &str, args: &Value, ctx: &ToolContext) -> ToolResult {
    let outcome = match name {
        "ping" => Ok(handle_ping(&ctx.info)),
        "search_media" => handle_search_media(args, &ctx.resolver).await,
        "request_media" => handle_request_media(args, &ctx.resolver).await,
        "get_request" => handle_get_request(args, &ctx.resolver).await,
        "raw_request" => handle_raw_request(args, &ctx.resolver).await,
        _ => return ToolResult::error(format!("Unknown tool: {}", name)),
    };

    match outcome {
        Ok(v) => ToolResult::success(v),
        Err(e) => {
            error!(tool = name, status = ?e.status(), error = %e, "tool call failed");
            ToolResult::error(e.to_string())
        }
    }
}

/// Result of an MCP tool call, ready to be serialized into a JSON-RPC response.
pub struct ToolResult {
    /// MCP content blocks (typically a single `{"type":"text","text":"..."}` entry).
    pub content: Vec<Value>,
    /// Whether the tool call failed (maps to `isError` in the MCP response).
    pub is_error: bool,
}

impl ToolResult {
    fn success(value: Value) -> Self {
        let text = serde_json::to_string_pretty(&value).unwrap_or_default();
        Self {
            content: vec![json!({ "type": "text", "text": text })],
            is_error: false,
        }
    }

    fn error(message: String) -> Self {
        Self {
            content: vec![json!({ "type": "text", "text": message })],
            is_error: true,
        }
    }
}

fn invalid(message: impl Into<String>) -> ClientError {
    ClientError::InvalidArgument(message.into())
}

/// An integer argument; numeric strings are accepted too.
fn get_int(args: &Value, key: &str) -> Result<Option<i64>, ClientError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| invalid(format!("Parameter '{key}' must be an integer"))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| invalid(format!("Parameter '{key}' must be an integer, got '{s}'"))),
        Some(_) => Err(invalid(format!("Parameter '{key}' must be an integer"))),
    }
}

fn require_int(args: &Value, key: &str) -> Result<i64, ClientError> {
    get_int(args, key)?.ok_or_else(|| invalid(format!("Missing required parameter: {key}")))
}

fn get_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, ClientError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(invalid(format!("Parameter '{key}' must be a string"))),
    }
}

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ClientError> {
    get_str(args, key)?.ok_or_else(|| invalid(format!("Missing required parameter: {key}")))
}

fn get_bool(args: &Value, key: &str) -> Result<bool, ClientError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(invalid(format!("Parameter '{key}' must be a boolean"))),
    }
}

fn get_int_list(args: &Value, key: &str) -> Result<Option<Vec<i64>>, ClientError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_i64().ok_or_else(|| {
                    invalid(format!("Parameter '{key}' must be a list of integers, got {v}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(invalid(format!("Parameter '{key}' must be a list of integers"))),
    }
}

fn handle_ping(info: &ServerInfo) -> Value {
    info!("ping received");
    json!({
        "ok": true,
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "transport": info.transport,
        "authEnabled": info.auth_enabled,
    })
}

async fn handle_search_media(
    args: &Value,
    resolver: &RequestResolver,
) -> Result<Value, ClientError> {
    let query = require_str(args, "query")?;
    if query.trim().is_empty() {
        return Err(invalid("Parameter 'query' must not be empty"));
    }
    let page = match get_int(args, "page")? {
        None => None,
        Some(p) if p >= 1 => {
            Some(u32::try_from(p).map_err(|_| invalid("Parameter 'page' is too large"))?)
        }
        Some(p) => return Err(invalid(format!("Parameter 'page' must be >= 1, got {p}"))),
    };

    info!(query, "searching media");
    let data = resolver.search_media(query, page).await?;
    info!("search complete");
    Ok(data)
}

async fn handle_request_media(
    args: &Value,
    resolver: &RequestResolver,
) -> Result<Value, ClientError> {
    let media_id = require_int(args, "media_id")?;
    let media_type: MediaType = require_str(args, "media_type")?.parse()?;
    let mut request = MediaRequest::new(media_id, media_type);
    request.is_4k = get_bool(args, "is_4k")?;
    request.seasons = get_int_list(args, "seasons")?;
    request.server_id = get_int(args, "server_id")?;
    request.service_slug = get_str(args, "service_slug")?
        .filter(|s| !s.is_empty())
        .map(String::from);

    info!(
        media_id,
        media_type = %media_type,
        is_4k = request.is_4k,
        seasons = ?request.seasons,
        server_id = ?request.server_id,
        service_slug = ?request.service_slug,
        "requesting media"
    );
    let data = resolver.request_media(&request).await?;
    info!(media_id, "request created");
    Ok(data)
}

async fn handle_get_request(
    args: &Value,
    resolver: &RequestResolver,
) -> Result<Value, ClientError> {
    let request_id = require_int(args, "request_id")?;
    info!(request_id, "fetching request");
    let data = resolver.get_request(request_id).await?;
    info!(request_id, "request fetched");
    Ok(data)
}

async fn handle_raw_request(
    args: &Value,
    resolver: &RequestResolver,
) -> Result<Value, ClientError> {
    let method: HttpMethod = require_str(args, "method")?.parse()?;
    let endpoint = require_str(args, "endpoint")?;
    let params: Option<&Map<String, Value>> = match args.get("params") {
        None | Some(Value::Null) => None,
        Some(Value::Object(m)) => Some(m),
        Some(_) => return Err(invalid("Parameter 'params' must be an object")),
    };
    let body = args.get("body").filter(|b| !b.is_null());

    info!(%method, endpoint, "raw request");
    let data = resolver.raw_request(method, endpoint, params, body).await?;
    info!(%method, endpoint, "raw request complete");
    Ok(data)
}
