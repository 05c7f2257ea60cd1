//! Text generation bridge.
//!
//! Free-text queries are sent to a hosted model with the server's tools
//! declared as functions. Tool calls the model makes are executed against the
//! server and their results fed back until the model answers in text. The same
//! model answers the server's `sampling/createMessage` requests.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::client::catalog::ToolDescriptor;
use crate::client::operator::Operator;
use crate::client::transport::{CallToolResult, McpClient, ServerRequestHandler};
use crate::error::{rpc_codes, McpError, Result};
use crate::schema::sanitize;
use crate::BoxFuture;

/// Shown when neither the model nor any tool produced text.
pub const NO_RESPONSE: &str = "No response generated.";

/// Default Generative Language API endpoint.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model id.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The operator, or tool results sent back to the model
    User,
    /// The model
    Model,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One piece of a conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Plain text
    Text(String),
    /// A function the model wants called
    FunctionCall {
        /// Function name
        name: String,
        /// Arguments object
        args: JsonValue,
    },
    /// The outcome of a function call
    FunctionResponse {
        /// Function name
        name: String,
        /// Result object
        response: JsonValue,
    },
}

/// A conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    /// Author of the turn
    pub role: Role,
    /// Parts in order
    pub parts: Vec<Part>,
}

impl Content {
    /// A user turn holding a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    /// Function name, the MCP tool name
    pub name: String,
    /// Function description
    pub description: String,
    /// Sanitized JSON Schema of the arguments, absent for tools without any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonValue>,
}

/// Concatenate the text parts of a model reply.
pub fn text_of(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            Part::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

/// A hosted text generation model.
pub trait LanguageModel: Send + Sync {
    /// Model identifier reported back in sampling results.
    fn model_id(&self) -> &str;

    /// Generate the next model turn for `contents`, offering `functions`.
    fn generate<'a>(
        &'a self,
        contents: &'a [Content],
        functions: &'a [FunctionDeclaration],
    ) -> BoxFuture<'a, Result<Vec<Part>>>;
}

/// Runs tools on behalf of the model.
pub trait ToolInvoker: Send + Sync {
    /// Call the named tool.
    fn invoke<'a>(
        &'a self,
        name: &'a str,
        arguments: Map<String, JsonValue>,
    ) -> BoxFuture<'a, Result<CallToolResult>>;
}

impl ToolInvoker for McpClient {
    fn invoke<'a>(
        &'a self,
        name: &'a str,
        arguments: Map<String, JsonValue>,
    ) -> BoxFuture<'a, Result<CallToolResult>> {
        Box::pin(self.call_tool(name, arguments))
    }
}

/// Build function declarations for every discovered tool.
pub fn function_declarations(tools: &[ToolDescriptor]) -> Vec<FunctionDeclaration> {
    tools
        .iter()
        .map(|tool| {
            let has_params = tool
                .input_schema
                .get("properties")
                .and_then(|p| p.as_object())
                .is_some_and(|p| !p.is_empty());
            FunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone().unwrap_or_default(),
                parameters: has_params.then(|| sanitize(&tool.input_schema)),
            }
        })
        .collect()
}

/// Answer a free-text query, letting the model call tools along the way.
///
/// Returns the model's final text, else the text of the first tool result,
/// else [`NO_RESPONSE`].
pub async fn answer_query(
    model: &dyn LanguageModel,
    tools: &dyn ToolInvoker,
    functions: &[FunctionDeclaration],
    query: &str,
    max_steps: usize,
) -> Result<String> {
    let mut contents = vec![Content::user_text(query)];
    let mut first_tool_text: Option<String> = None;

    for step in 0..max_steps.max(1) {
        let parts = model.generate(&contents, functions).await?;

        let calls: Vec<(String, JsonValue)> = parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionCall { name, args } => Some((name.clone(), args.clone())),
                _ => None,
            })
            .collect();

        if calls.is_empty() {
            let text = text_of(&parts);
            if !text.trim().is_empty() {
                return Ok(text);
            }
            break;
        }

        contents.push(Content {
            role: Role::Model,
            parts,
        });

        let mut responses = Vec::with_capacity(calls.len());
        for (name, args) in calls {
            tracing::info!(step, tool = %name, "Model called tool");
            let arguments = args.as_object().cloned().unwrap_or_default();
            let (text, is_error) = match tools.invoke(&name, arguments).await {
                Ok(result) => (result.text().unwrap_or_default().to_string(), result.is_error),
                Err(e @ McpError::Rpc { .. }) => (e.to_string(), true),
                Err(e) => return Err(e),
            };
            if first_tool_text.is_none() && !text.is_empty() {
                first_tool_text = Some(text.clone());
            }
            responses.push(Part::FunctionResponse {
                name,
                response: serde_json::json!({ "result": text, "isError": is_error }),
            });
        }

        contents.push(Content {
            role: Role::User,
            parts: responses,
        });
    }

    Ok(first_tool_text.unwrap_or_else(|| NO_RESPONSE.to_string()))
}

/// Answers the server's sampling requests with the model.
pub struct SamplingBridge {
    model: Arc<dyn LanguageModel>,
    operator: Arc<dyn Operator>,
    confirm: bool,
}

impl SamplingBridge {
    /// Create a bridge. With `confirm`, each prompt is shown to the operator first.
    pub fn new(model: Arc<dyn LanguageModel>, operator: Arc<dyn Operator>, confirm: bool) -> Self {
        Self {
            model,
            operator,
            confirm,
        }
    }

    /// Handle a `sampling/createMessage` request.
    pub async fn create_message(&self, params: JsonValue) -> Result<JsonValue> {
        let messages = params
            .get("messages")
            .and_then(|m| m.as_array())
            .cloned()
            .unwrap_or_default();

        let mut texts = Vec::new();
        for message in &messages {
            let content = &message["content"];
            if content.get("type").and_then(|t| t.as_str()) != Some("text") {
                continue;
            }
            let Some(prompt) = content.get("text").and_then(|t| t.as_str()) else {
                continue;
            };

            if self.confirm {
                self.operator.show(&format!("Server sampling request:\n{}", prompt));
                if !self.operator.confirm("Run this prompt?")? {
                    tracing::info!("Sampling prompt declined");
                    continue;
                }
            }

            let parts = self.model.generate(&[Content::user_text(prompt)], &[]).await?;
            texts.push(text_of(&parts));
        }

        Ok(serde_json::json!({
            "role": "assistant",
            "model": self.model.model_id(),
            "stopReason": "endTurn",
            "content": { "type": "text", "text": texts.join("\n") }
        }))
    }
}

impl ServerRequestHandler for SamplingBridge {
    fn handle<'a>(&'a self, method: &'a str, params: JsonValue) -> BoxFuture<'a, Result<JsonValue>> {
        Box::pin(async move {
            match method {
                "sampling/createMessage" => self.create_message(params).await,
                _ => Err(McpError::Rpc {
                    code: rpc_codes::METHOD_NOT_FOUND,
                    message: format!("Unknown method: {}", method),
                }),
            }
        })
    }
}

// Wire format of the Generative Language API.

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool<'a> {
    function_declarations: &'a [FunctionDeclaration],
}

#[derive(Serialize, Deserialize, Default)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: JsonValue,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: JsonValue,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: WireContent,
}

impl From<&Content> for WireContent {
    fn from(content: &Content) -> Self {
        let parts = content
            .parts
            .iter()
            .map(|p| match p {
                Part::Text(t) => WirePart {
                    text: Some(t.clone()),
                    ..Default::default()
                },
                Part::FunctionCall { name, args } => WirePart {
                    function_call: Some(WireFunctionCall {
                        name: name.clone(),
                        args: args.clone(),
                    }),
                    ..Default::default()
                },
                Part::FunctionResponse { name, response } => WirePart {
                    function_response: Some(WireFunctionResponse {
                        name: name.clone(),
                        response: response.clone(),
                    }),
                    ..Default::default()
                },
            })
            .collect();
        Self {
            role: Some(content.role.as_str().to_string()),
            parts,
        }
    }
}

impl WirePart {
    fn into_part(self) -> Option<Part> {
        if let Some(call) = self.function_call {
            Some(Part::FunctionCall {
                name: call.name,
                args: call.args,
            })
        } else {
            self.text.map(Part::Text)
        }
    }
}

/// Google Generative Language (`generateContent`) client.
pub struct GeminiModel {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    api_base: String,
}

impl GeminiModel {
    /// Create a client. A missing key only fails once a generation is attempted.
    pub fn new(api_key: Option<String>, model: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            api_base: api_base.into(),
        }
    }

    async fn generate_content(
        &self,
        contents: &[Content],
        functions: &[FunctionDeclaration],
    ) -> Result<Vec<Part>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            McpError::Provider(
                "no API key configured; set GOOGLE_GENERATIVE_AI_API_KEY or pass --api-key"
                    .to_string(),
            )
        })?;

        let body = GenerateContentRequest {
            contents: contents.iter().map(WireContent::from).collect(),
            tools: if functions.is_empty() {
                Vec::new()
            } else {
                vec![WireTool {
                    function_declarations: functions,
                }]
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        );
        tracing::debug!(model = %self.model, turns = contents.len(), "Generating");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| McpError::Provider(format!("Failed to reach {}: {}", self.api_base, e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<JsonValue>(&detail)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(detail);
            return Err(McpError::Provider(format!("HTTP {}: {}", status.as_u16(), message)));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let parts = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts)
            .unwrap_or_default();

        Ok(parts.into_iter().filter_map(WirePart::into_part).collect())
    }
}

impl LanguageModel for GeminiModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn generate<'a>(
        &'a self,
        contents: &'a [Content],
        functions: &'a [FunctionDeclaration],
    ) -> BoxFuture<'a, Result<Vec<Part>>> {
        Box::pin(self.generate_content(contents, functions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays canned replies and records every conversation it sees.
    struct Scripted {
        replies: Mutex<Vec<Vec<Part>>>,
        seen: Mutex<Vec<Vec<Content>>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Vec<Part>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl LanguageModel for Scripted {
        fn model_id(&self) -> &str {
            "scripted"
        }

        fn generate<'a>(
            &'a self,
            contents: &'a [Content],
            _functions: &'a [FunctionDeclaration],
        ) -> BoxFuture<'a, Result<Vec<Part>>> {
            self.seen.lock().unwrap().push(contents.to_vec());
            let reply = self.replies.lock().unwrap().pop().unwrap_or_default();
            Box::pin(async move { Ok(reply) })
        }
    }

    struct EchoTools;

    impl ToolInvoker for EchoTools {
        fn invoke<'a>(
            &'a self,
            name: &'a str,
            arguments: Map<String, JsonValue>,
        ) -> BoxFuture<'a, Result<CallToolResult>> {
            Box::pin(async move {
                Ok(CallToolResult {
                    content: vec![json!({"type": "text", "text": format!("{} {}", name, JsonValue::Object(arguments))})],
                    is_error: false,
                })
            })
        }
    }

    struct Silent(bool);

    impl Operator for Silent {
        fn select(&self, _prompt: &str, _entries: &[crate::client::catalog::MenuEntry]) -> Result<usize> {
            Ok(0)
        }
        fn input(&self, _prompt: &str) -> Result<String> {
            Ok(String::new())
        }
        fn confirm(&self, _prompt: &str) -> Result<bool> {
            Ok(self.0)
        }
        fn show(&self, _text: &str) {}
    }

    fn call(name: &str, args: JsonValue) -> Part {
        Part::FunctionCall {
            name: name.to_string(),
            args,
        }
    }

    #[tokio::test]
    async fn test_query_plain_text_answer() {
        let model = Scripted::new(vec![vec![Part::Text("hello".into())]]);
        let out = answer_query(&model, &EchoTools, &[], "hi", 5).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_query_threads_tool_results() {
        let model = Scripted::new(vec![
            vec![call("create-user", json!({"name": "A"}))],
            vec![Part::Text("done".into())],
        ]);
        let out = answer_query(&model, &EchoTools, &[], "make a user", 5).await.unwrap();
        assert_eq!(out, "done");

        let seen = model.seen.lock().unwrap();
        let second = &seen[1];
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role, Role::Model);
        match &second[2].parts[0] {
            Part::FunctionResponse { name, response } => {
                assert_eq!(name, "create-user");
                assert!(response["result"].as_str().unwrap().starts_with("create-user"));
            }
            other => panic!("unexpected part: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_falls_back_to_first_tool_text() {
        let model = Scripted::new(vec![vec![call("create-random-user", json!({}))], vec![]]);
        let out = answer_query(&model, &EchoTools, &[], "random", 5).await.unwrap();
        assert_eq!(out, "create-random-user {}");
    }

    #[tokio::test]
    async fn test_query_step_limit() {
        let model = Scripted::new(vec![
            vec![call("a", json!({}))],
            vec![call("b", json!({}))],
            vec![Part::Text("never".into())],
        ]);
        let out = answer_query(&model, &EchoTools, &[], "loop", 2).await.unwrap();
        assert_eq!(out, "a {}");
    }

    #[tokio::test]
    async fn test_query_fallback_string() {
        let model = Scripted::new(vec![vec![]]);
        let out = answer_query(&model, &EchoTools, &[], "?", 5).await.unwrap();
        assert_eq!(out, NO_RESPONSE);
    }

    #[test]
    fn test_function_declarations_sanitize() {
        let tools: Vec<ToolDescriptor> = serde_json::from_value(json!([
            {"name": "create-user", "description": "Create",
             "inputSchema": {"type": "object", "properties": {"email": {"type": "string", "format": "email"}}}},
            {"name": "create-random-user", "inputSchema": {"type": "object", "properties": {}}}
        ]))
        .unwrap();
        let decls = function_declarations(&tools);
        assert_eq!(
            decls[0].parameters,
            Some(json!({"type": "object", "properties": {"email": {"type": "string"}}}))
        );
        assert_eq!(decls[1].parameters, None);
        assert_eq!(decls[1].description, "");
    }

    #[tokio::test]
    async fn test_sampling_concatenates_text_messages() {
        let model = Arc::new(Scripted::new(vec![
            vec![Part::Text("one".into())],
            vec![Part::Text("two".into())],
        ]));
        let bridge = SamplingBridge::new(model, Arc::new(Silent(true)), true);
        let result = bridge
            .create_message(json!({"messages": [
                {"role": "user", "content": {"type": "text", "text": "a"}},
                {"role": "user", "content": {"type": "image", "data": "AA=="}},
                {"role": "user", "content": {"type": "text", "text": "b"}}
            ]}))
            .await
            .unwrap();
        assert_eq!(result["role"], "assistant");
        assert_eq!(result["content"]["text"], "one\ntwo");
        assert_eq!(result["model"], "scripted");
    }

    #[tokio::test]
    async fn test_sampling_declined_contributes_nothing() {
        let model = Arc::new(Scripted::new(vec![vec![Part::Text("x".into())]]));
        let bridge = SamplingBridge::new(model.clone(), Arc::new(Silent(false)), true);
        let result = bridge
            .create_message(json!({"messages": [{"role": "user", "content": {"type": "text", "text": "a"}}]}))
            .await
            .unwrap();
        assert_eq!(result["content"]["text"], "");
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sampling_rejects_other_methods() {
        let bridge = SamplingBridge::new(
            Arc::new(Scripted::new(vec![])),
            Arc::new(Silent(true)),
            false,
        );
        let err = bridge.handle("roots/list", json!({})).await.unwrap_err();
        assert_eq!(err.rpc_code(), rpc_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_on_use() {
        let model = GeminiModel::new(None, DEFAULT_MODEL, DEFAULT_API_BASE);
        let err = model.generate(&[Content::user_text("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, McpError::Provider(_)));
    }

    #[test]
    fn test_wire_request_shape() {
        let decls = vec![FunctionDeclaration {
            name: "t".into(),
            description: "d".into(),
            parameters: None,
        }];
        let contents = [
            Content::user_text("q"),
            Content {
                role: Role::Model,
                parts: vec![call("t", json!({}))],
            },
        ];
        let body = GenerateContentRequest {
            contents: contents.iter().map(WireContent::from).collect(),
            tools: vec![WireTool {
                function_declarations: &decls,
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0], json!({"text": "q"}));
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][1]["parts"][0]["functionCall"]["name"], "t");
        assert_eq!(json["tools"][0]["functionDeclarations"][0], json!({"name": "t", "description": "d"}));
    }

    #[test]
    fn test_wire_response_parts() {
        let parsed: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "hi"},
                {"functionCall": {"name": "create-user", "args": {"name": "A"}}}
            ]}}]
        }))
        .unwrap();
        let parts: Vec<Part> = parsed.candidates.into_iter().next().unwrap().content.parts
            .into_iter()
            .filter_map(WirePart::into_part)
            .collect();
        assert_eq!(parts[0], Part::Text("hi".into()));
        assert_eq!(parts[1], call("create-user", json!({"name": "A"})));
    }
}
