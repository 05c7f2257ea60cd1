//! MCP client over a child process's stdio.
//!
//! Requests are written as one JSON-RPC message per line. A background task
//! reads the server's output, hands responses to the waiting caller by id, and
//! answers server-initiated requests through a [`ServerRequestHandler`].

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::client::catalog::{
    PromptDescriptor, ResourceDescriptor, ResourceTemplateDescriptor, ToolDescriptor,
};
use crate::convert::first_text;
use crate::error::{rpc_codes, McpError, Result};
use crate::server::PROTOCOL_VERSION;
use crate::BoxFuture;

const CLIENT_NAME: &str = "user-directory-client";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Answers requests the server sends to the client.
pub trait ServerRequestHandler: Send + Sync + 'static {
    /// Handle `method` with `params`, returning the JSON-RPC result.
    fn handle<'a>(&'a self, method: &'a str, params: JsonValue) -> BoxFuture<'a, Result<JsonValue>>;
}

/// Result of a `tools/call` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content items returned by the tool
    #[serde(default)]
    pub content: Vec<JsonValue>,
    /// Whether the tool reported a failure
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Text of the first text content item.
    pub fn text(&self) -> Option<&str> {
        first_text(&self.content)
    }
}

/// One item of a `resources/read` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    /// URI the content belongs to
    pub uri: String,
    /// Content type
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Text body, absent for binary content
    #[serde(default)]
    pub text: Option<String>,
}

/// One message of a `prompts/get` result.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMessage {
    /// "user" or "assistant"
    pub role: String,
    /// A single MCP content item
    pub content: JsonValue,
}

impl PromptMessage {
    /// The message text, if the content is a text item.
    pub fn text(&self) -> Option<&str> {
        first_text(std::slice::from_ref(&self.content))
    }
}

type SharedWriter = Arc<Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<JsonValue>>>>>;

/// MCP client connection.
pub struct McpClient {
    writer: SharedWriter,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    reader_task: JoinHandle<()>,
    child: std::sync::Mutex<Option<Child>>,
    server_info: JsonValue,
}

impl McpClient {
    /// Launch `program` with `args`, then perform the MCP handshake.
    pub async fn spawn(
        program: &Path,
        args: &[String],
        handler: Arc<dyn ServerRequestHandler>,
    ) -> Result<Self> {
        tracing::info!(program = %program.display(), "Starting server");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                McpError::Io(format!("failed to start '{}': {}", program.display(), e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Internal("child stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Internal("child stdout not captured".to_string()))?;

        let mut client = Self::start(stdout, stdin, handler);
        client.child = std::sync::Mutex::new(Some(child));
        client.initialize().await?;
        Ok(client)
    }

    /// Connect over an existing reader/writer pair and perform the handshake.
    pub async fn connect<R, W>(
        reader: R,
        writer: W,
        handler: Arc<dyn ServerRequestHandler>,
    ) -> Result<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut client = Self::start(reader, writer, handler);
        client.initialize().await?;
        Ok(client)
    }

    fn start<R, W>(reader: R, writer: W, handler: Arc<dyn ServerRequestHandler>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let writer: SharedWriter = Arc::new(Mutex::new(Some(boxed)));
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(
            reader,
            writer.clone(),
            pending.clone(),
            closed.clone(),
            handler,
        ));

        Self {
            writer,
            pending,
            closed,
            next_id: AtomicU64::new(0),
            reader_task,
            child: std::sync::Mutex::new(None),
            server_info: JsonValue::Null,
        }
    }

    async fn initialize(&mut self) -> Result<()> {
        let result = self
            .request(
                "initialize",
                serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "sampling": {} },
                    "clientInfo": { "name": CLIENT_NAME, "version": CLIENT_VERSION }
                }),
            )
            .await?;
        self.server_info = result.get("serverInfo").cloned().unwrap_or(JsonValue::Null);
        tracing::info!(server = %self.server_info, "Connected");

        self.notify("notifications/initialized", JsonValue::Null).await
    }

    /// `serverInfo` reported during the handshake.
    pub fn server_info(&self) -> &JsonValue {
        &self.server_info
    }

    /// Send a request and wait for its result.
    pub async fn request(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.closed.load(Ordering::SeqCst) {
            self.pending.lock().await.remove(&id);
            return Err(McpError::Io("server connection closed".to_string()));
        }

        let mut message = serde_json::json!({ "jsonrpc": "2.0", "id": id, "method": method });
        if !params.is_null() {
            message["params"] = params;
        }
        tracing::debug!(id, method, "Request");
        if let Err(e) = write_message(&self.writer, &message).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        rx.await
            .map_err(|_| McpError::Io("server connection closed".to_string()))?
    }

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: JsonValue) -> Result<()> {
        let mut message = serde_json::json!({ "jsonrpc": "2.0", "method": method });
        if !params.is_null() {
            message["params"] = params;
        }
        write_message(&self.writer, &message).await
    }

    async fn list<T: serde::de::DeserializeOwned>(&self, method: &str, key: &str) -> Result<Vec<T>> {
        let mut result = self.request(method, JsonValue::Null).await?;
        let items = result.get_mut(key).map(JsonValue::take).unwrap_or(JsonValue::Array(Vec::new()));
        serde_json::from_value(items).map_err(McpError::from)
    }

    /// `tools/list`
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.list("tools/list", "tools").await
    }

    /// `prompts/list`
    pub async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>> {
        self.list("prompts/list", "prompts").await
    }

    /// `resources/list`
    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>> {
        self.list("resources/list", "resources").await
    }

    /// `resources/templates/list`
    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplateDescriptor>> {
        self.list("resources/templates/list", "resourceTemplates").await
    }

    /// `tools/call`
    pub async fn call_tool(&self, name: &str, arguments: Map<String, JsonValue>) -> Result<CallToolResult> {
        let result = self
            .request(
                "tools/call",
                serde_json::json!({ "name": name, "arguments": arguments }),
            )
            .await?;
        serde_json::from_value(result).map_err(McpError::from)
    }

    /// `resources/read`
    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>> {
        let mut result = self
            .request("resources/read", serde_json::json!({ "uri": uri }))
            .await?;
        let contents = result
            .get_mut("contents")
            .map(JsonValue::take)
            .unwrap_or(JsonValue::Array(Vec::new()));
        serde_json::from_value(contents).map_err(McpError::from)
    }

    /// `prompts/get`
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Map<String, JsonValue>,
    ) -> Result<Vec<PromptMessage>> {
        let mut result = self
            .request(
                "prompts/get",
                serde_json::json!({ "name": name, "arguments": arguments }),
            )
            .await?;
        let messages = result
            .get_mut("messages")
            .map(JsonValue::take)
            .unwrap_or(JsonValue::Array(Vec::new()));
        serde_json::from_value(messages).map_err(McpError::from)
    }

    /// Close the server's stdin and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.writer.lock().await.take();
        let child = self
            .child
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(mut child) = child {
            let status = child.wait().await?;
            tracing::debug!(%status, "Server exited");
        }
        self.reader_task.abort();
        Ok(())
    }
}

async fn write_message(writer: &SharedWriter, message: &JsonValue) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');

    let mut guard = writer.lock().await;
    let w = guard
        .as_mut()
        .ok_or_else(|| McpError::Io("server connection closed".to_string()))?;
    w.write_all(line.as_bytes()).await?;
    w.flush().await?;
    Ok(())
}

async fn read_loop<R: AsyncRead + Send + Unpin + 'static>(
    reader: R,
    writer: SharedWriter,
    pending: Pending,
    closed: Arc<AtomicBool>,
    handler: Arc<dyn ServerRequestHandler>,
) {
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read from server");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message: JsonValue = match serde_json::from_str(&line) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed message from server");
                continue;
            }
        };

        let method = message.get("method").and_then(|m| m.as_str()).map(str::to_string);
        match method {
            Some(method) => match message.get("id").cloned() {
                Some(id) => {
                    let params = message.get("params").cloned().unwrap_or(JsonValue::Null);
                    tokio::spawn(answer_server_request(
                        writer.clone(),
                        handler.clone(),
                        id,
                        method,
                        params,
                    ));
                }
                None => tracing::debug!(method = %method, "Server notification"),
            },
            None => route_response(&pending, message).await,
        }
    }

    closed.store(true, Ordering::SeqCst);
    for (_, tx) in pending.lock().await.drain() {
        let _ = tx.send(Err(McpError::Io("server connection closed".to_string())));
    }
    tracing::debug!("Server output closed");
}

async fn route_response(pending: &Pending, message: JsonValue) {
    let Some(id) = message.get("id").and_then(|v| v.as_u64()) else {
        tracing::warn!(%message, "Response without a usable id");
        return;
    };
    let Some(tx) = pending.lock().await.remove(&id) else {
        tracing::warn!(id, "Response for unknown request");
        return;
    };

    let outcome = match message.get("error") {
        Some(error) => Err(McpError::Rpc {
            code: error
                .get("code")
                .and_then(|c| c.as_i64())
                .map(|c| c as i32)
                .unwrap_or(rpc_codes::INTERNAL_ERROR),
            message: error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string(),
        }),
        None => Ok(message.get("result").cloned().unwrap_or(JsonValue::Null)),
    };
    let _ = tx.send(outcome);
}

async fn answer_server_request(
    writer: SharedWriter,
    handler: Arc<dyn ServerRequestHandler>,
    id: JsonValue,
    method: String,
    params: JsonValue,
) {
    tracing::debug!(method = %method, "Server request");
    let outcome = if method == "ping" {
        Ok(serde_json::json!({}))
    } else {
        handler.handle(&method, params).await
    };

    let response = match outcome {
        Ok(result) => serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(e) => {
            tracing::warn!(method = %method, error = %e, "Server request failed");
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": e.rpc_code(), "message": e.to_string() }
            })
        }
    };

    if let Err(e) = write_message(&writer, &response).await {
        tracing::warn!(error = %e, "Failed to answer server request");
    }
}
