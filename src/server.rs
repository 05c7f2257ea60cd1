//! MCP server implementation.
//!
//! Handles JSON-RPC 2.0 over stdio as described by the Model Context Protocol.
//! The server can also issue its own `sampling/createMessage` request to the
//! client while a tool call is in progress.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::io::{BufRead, Write};

use crate::convert::{get_object_arg, get_string_arg};
use crate::error::{rpc_codes, McpError, Result};
use crate::store::UserStore;
use crate::tools::ToolRegistry;
use crate::{prompts, resources};

/// MCP protocol version we support.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server information.
const SERVER_NAME: &str = "user-directory-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, must be "2.0"
    pub jsonrpc: String,
    /// Request id, absent for notifications
    pub id: Option<JsonValue>,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: Option<JsonValue>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// Protocol version, always "2.0"
    pub jsonrpc: String,
    /// Id of the request being answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,
    /// Success payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    /// Failure payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Extra error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<JsonValue>, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<JsonValue>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }

    /// Create an error response from an McpError.
    pub fn from_error(id: Option<JsonValue>, err: McpError) -> Self {
        Self::error(id, err.rpc_code(), err.to_string())
    }

    fn from_result(id: Option<JsonValue>, result: Result<JsonValue>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(err) => Self::from_error(id, err),
        }
    }
}

/// Something that can answer a server-initiated sampling request.
pub trait Sampler {
    /// Send `sampling/createMessage` with `params` and return the result object.
    fn create_message(&mut self, params: JsonValue) -> Result<JsonValue>;
}

/// Line-delimited JSON-RPC peer over a reader/writer pair.
struct LinePeer<R, W> {
    reader: R,
    writer: W,
    next_id: u64,
}

impl<R: BufRead, W: Write> LinePeer<R, W> {
    /// Read the next non-empty line, or `None` on EOF.
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let json = serde_json::to_string(message)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<R: BufRead, W: Write> Sampler for LinePeer<R, W> {
    fn create_message(&mut self, params: JsonValue) -> Result<JsonValue> {
        self.next_id += 1;
        let id = self.next_id;
        self.send(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "sampling/createMessage",
            "params": params
        }))?;
        tracing::debug!(id, "Sent sampling request");

        loop {
            let line = self.next_line()?.ok_or_else(|| {
                McpError::Io("client closed while awaiting sampling response".to_string())
            })?;
            let message: JsonValue = serde_json::from_str(&line)?;

            if let Some(method) = message.get("method").and_then(|m| m.as_str()) {
                // The client is sequential, so only notifications are expected here.
                if let Some(req_id) = message.get("id").cloned() {
                    tracing::warn!(method, "Request received while awaiting sampling response");
                    self.send(&JsonRpcResponse::error(
                        Some(req_id),
                        rpc_codes::INTERNAL_ERROR,
                        "Server is waiting for a sampling response".to_string(),
                    ))?;
                }
                continue;
            }

            if message.get("id").and_then(|v| v.as_u64()) != Some(id) {
                tracing::warn!("Ignoring response with unexpected id");
                continue;
            }

            if let Some(error) = message.get("error") {
                return Err(McpError::Rpc {
                    code: error
                        .get("code")
                        .and_then(|c| c.as_i64())
                        .map(|c| c as i32)
                        .unwrap_or(rpc_codes::INTERNAL_ERROR),
                    message: error
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("sampling failed")
                        .to_string(),
                });
            }

            return message
                .get("result")
                .cloned()
                .ok_or_else(|| McpError::Protocol("sampling response has no result".to_string()));
        }
    }
}

/// MCP server.
pub struct McpServer {
    store: UserStore,
    registry: ToolRegistry,
}

impl McpServer {
    /// Create a new MCP server over the given user store.
    pub fn new(store: UserStore) -> Self {
        Self {
            store,
            registry: ToolRegistry::new(),
        }
    }

    /// Run the server, reading from stdin and writing to stdout.
    pub fn run_sync(&mut self) -> Result<()> {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        self.serve(stdin.lock(), stdout.lock())
    }

    /// Serve line-delimited JSON-RPC until the reader reaches EOF.
    pub fn serve<R: BufRead, W: Write>(&mut self, reader: R, writer: W) -> Result<()> {
        let mut peer = LinePeer {
            reader,
            writer,
            next_id: 0,
        };

        while let Some(line) = peer.next_line()? {
            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => self.handle_request(request, &mut peer),
                Err(e) => Some(JsonRpcResponse::error(
                    None,
                    rpc_codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                )),
            };

            if let Some(response) = response {
                peer.send(&response)?;
            }
        }

        tracing::debug!("Client disconnected");
        Ok(())
    }

    /// Handle a single JSON-RPC message. Notifications produce no response.
    pub fn handle_request(
        &mut self,
        request: JsonRpcRequest,
        sampler: &mut dyn Sampler,
    ) -> Option<JsonRpcResponse> {
        // Validate JSON-RPC version
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                rpc_codes::INVALID_REQUEST,
                "Invalid JSON-RPC version".to_string(),
            ));
        }

        let Some(id) = request.id else {
            tracing::debug!(method = %request.method, "Notification");
            return None;
        };
        let id = Some(id);
        tracing::debug!(method = %request.method, "Request");

        let params = match request.params {
            Some(JsonValue::Object(obj)) => obj,
            Some(JsonValue::Null) | None => Map::new(),
            Some(_) => {
                return Some(JsonRpcResponse::error(
                    id,
                    rpc_codes::INVALID_PARAMS,
                    "'params' must be an object".to_string(),
                ))
            }
        };

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, Self::handle_initialize()),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => JsonRpcResponse::success(
                id,
                serde_json::json!({ "tools": self.registry.tools() }),
            ),
            "tools/call" => {
                JsonRpcResponse::from_result(id, self.handle_tools_call(&params, sampler))
            }
            "resources/list" => JsonRpcResponse::success(
                id,
                serde_json::json!({ "resources": resources::resources() }),
            ),
            "resources/templates/list" => JsonRpcResponse::success(
                id,
                serde_json::json!({ "resourceTemplates": resources::templates() }),
            ),
            "resources/read" => JsonRpcResponse::from_result(
                id,
                get_string_arg(&params, "uri").and_then(|uri| resources::read(&self.store, &uri)),
            ),
            "prompts/list" => JsonRpcResponse::success(
                id,
                serde_json::json!({ "prompts": prompts::prompts() }),
            ),
            "prompts/get" => JsonRpcResponse::from_result(id, Self::handle_prompts_get(&params)),
            _ => JsonRpcResponse::error(
                id,
                rpc_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
            ),
        };
        Some(response)
    }

    /// Handle the initialize request.
    fn handle_initialize() -> JsonValue {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {},
                "prompts": {}
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            }
        })
    }

    /// Handle the tools/call request.
    fn handle_tools_call(
        &self,
        params: &Map<String, JsonValue>,
        sampler: &mut dyn Sampler,
    ) -> Result<JsonValue> {
        let name = get_string_arg(params, "name")?;
        let arguments = match params.get("arguments") {
            Some(JsonValue::Null) | None => Map::new(),
            Some(_) => get_object_arg(params, "arguments")?.clone(),
        };
        tracing::info!(tool = %name, "Tool call");
        self.registry.dispatch(&self.store, sampler, &name, arguments)
    }

    /// Handle the prompts/get request.
    fn handle_prompts_get(params: &Map<String, JsonValue>) -> Result<JsonValue> {
        let name = get_string_arg(params, "name")?;
        let arguments = match params.get("arguments") {
            Some(JsonValue::Null) | None => Map::new(),
            Some(_) => get_object_arg(params, "arguments")?.clone(),
        };
        prompts::get(&name, &arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_json_rpc_response_success() {
        let response = JsonRpcResponse::success(Some(JsonValue::Number(1.into())), serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_json_rpc_response_error() {
        let response = JsonRpcResponse::error(Some(JsonValue::Number(1.into())), -32600, "Invalid".to_string());
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"error\""));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn test_sampling_round_trip_over_lines() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"role\":\"assistant\",\"content\":{\"type\":\"text\",\"text\":\"hi\"}}}\n"
        );
        let mut out = Vec::new();
        let mut peer = LinePeer {
            reader: Cursor::new(input.as_bytes()),
            writer: &mut out,
            next_id: 0,
        };
        let result = peer.create_message(serde_json::json!({"messages": []})).unwrap();
        assert_eq!(result["content"]["text"], "hi");

        let sent: JsonValue = serde_json::from_slice(out.split(|b| *b == b'\n').next().unwrap()).unwrap();
        assert_eq!(sent["method"], "sampling/createMessage");
        assert_eq!(sent["id"], 1);
    }

    #[test]
    fn test_sampling_error_response() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"code\":-1,\"message\":\"declined\"}}\n";
        let mut peer = LinePeer {
            reader: Cursor::new(input.as_bytes()),
            writer: Vec::new(),
            next_id: 0,
        };
        let err = peer.create_message(serde_json::json!({})).unwrap_err();
        assert!(matches!(err, McpError::Rpc { code: -1, .. }));
    }

    #[test]
    fn test_sampling_eof() {
        let mut peer = LinePeer {
            reader: Cursor::new(&b""[..]),
            writer: Vec::new(),
            next_id: 0,
        };
        assert!(matches!(
            peer.create_message(serde_json::json!({})),
            Err(McpError::Io(_))
        ));
    }
}
