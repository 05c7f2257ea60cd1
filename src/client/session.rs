//! Interactive session loop.
//!
//! Discovers the server's catalog once, then offers Query / Tools /
//! Resources / Prompts / Exit until the operator exits. Lookup failures and
//! other recoverable errors are reported and the menu comes back; provider and
//! transport failures end the session.

use std::collections::HashMap;
use std::sync::Arc;

use console::style;
use serde_json::{Map, Value as JsonValue};

use crate::client::ai::{answer_query, function_declarations, text_of, Content, LanguageModel};
use crate::client::catalog::{expand_template, template_params, Catalog, MenuEntry, ResourceTarget};
use crate::client::operator::Operator;
use crate::client::transport::McpClient;
use crate::convert::coerce_input;
use crate::error::{McpError, Result};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake done, catalog not yet discovered
    Connecting,
    /// Waiting for the next action
    Ready,
    /// Exit was chosen
    Exiting,
}

/// Top level menu choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Free-text query through the model
    Query,
    /// Call a tool directly
    Tools,
    /// Read a resource
    Resources,
    /// Render and run a prompt
    Prompts,
    /// Leave the session
    Exit,
}

impl Action {
    /// Every action, in menu order.
    pub const ALL: [Action; 5] = [
        Action::Query,
        Action::Tools,
        Action::Resources,
        Action::Prompts,
        Action::Exit,
    ];

    fn entry(&self) -> MenuEntry {
        let (label, description) = match self {
            Action::Query => ("Query", "Ask the model, which may call tools"),
            Action::Tools => ("Tools", "Call a server tool"),
            Action::Resources => ("Resources", "Read a server resource"),
            Action::Prompts => ("Prompts", "Run a server prompt"),
            Action::Exit => ("Exit", "Quit the client"),
        };
        MenuEntry {
            label: label.to_string(),
            value: label.to_lowercase(),
            description: description.to_string(),
        }
    }
}

/// A connected client session.
pub struct Session {
    client: McpClient,
    catalog: Catalog,
    model: Arc<dyn LanguageModel>,
    operator: Arc<dyn Operator>,
    max_steps: usize,
    state: SessionState,
}

impl Session {
    /// Wrap a connected client. Call [`Session::discover`] or [`Session::run`] next.
    pub fn new(
        client: McpClient,
        model: Arc<dyn LanguageModel>,
        operator: Arc<dyn Operator>,
        max_steps: usize,
    ) -> Self {
        Self {
            client,
            catalog: Catalog::default(),
            model,
            operator,
            max_steps,
            state: SessionState::Connecting,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// What the server advertised.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The underlying connection.
    pub fn client(&self) -> &McpClient {
        &self.client
    }

    /// List tools, prompts, resources, and templates concurrently.
    ///
    /// Any single failure fails discovery as a whole.
    pub async fn discover(&mut self) -> Result<()> {
        let (tools, prompts, resources, resource_templates) = tokio::try_join!(
            self.client.list_tools(),
            self.client.list_prompts(),
            self.client.list_resources(),
            self.client.list_resource_templates(),
        )?;
        tracing::info!(
            tools = tools.len(),
            prompts = prompts.len(),
            resources = resources.len(),
            templates = resource_templates.len(),
            "Discovered capabilities"
        );

        self.catalog = Catalog {
            tools,
            prompts,
            resources,
            resource_templates,
        };
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Run the menu loop until the operator exits.
    pub async fn run(&mut self) -> Result<()> {
        if self.state == SessionState::Connecting {
            self.discover().await?;
        }

        while self.state == SessionState::Ready {
            let entries: Vec<MenuEntry> = Action::ALL.iter().map(Action::entry).collect();
            let choice = self.operator.select("What would you like to do?", &entries)?;
            let action = Action::ALL.get(choice).copied().unwrap_or(Action::Exit);

            match self.perform(action).await {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(?action, error = %e, "Action failed");
                    self.operator.show(&format!("{} {}", style("Error:").red(), e));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Carry out a single action.
    pub async fn perform(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Query => self.handle_query().await,
            Action::Tools => self.handle_tool().await,
            Action::Resources => self.handle_resource().await,
            Action::Prompts => self.handle_prompt().await,
            Action::Exit => {
                self.state = SessionState::Exiting;
                Ok(())
            }
        }
    }

    /// Close the connection and wait for the server to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.client.shutdown().await
    }

    fn pick(&self, prompt: &str, entries: &[MenuEntry]) -> Result<String> {
        if entries.is_empty() {
            return Err(McpError::NotFound(format!("no entries for '{}'", prompt)));
        }
        let index = self.operator.select(prompt, entries)?;
        entries
            .get(index)
            .map(|e| e.value.clone())
            .ok_or_else(|| McpError::NotFound(format!("menu entry {}", index)))
    }

    async fn handle_query(&self) -> Result<()> {
        let query = self.operator.input("Enter your query")?;
        let functions = function_declarations(&self.catalog.tools);
        let answer = answer_query(
            self.model.as_ref(),
            &self.client,
            &functions,
            &query,
            self.max_steps,
        )
        .await?;
        self.operator.show(&answer);
        Ok(())
    }

    async fn handle_tool(&self) -> Result<()> {
        let name = self.pick("Select a tool", &self.catalog.tool_entries())?;
        let tool = self.catalog.find_tool(&name)?;

        let mut arguments = Map::new();
        for (key, property, required) in argument_order(&tool.input_schema) {
            let raw = self.operator.input(&format!("Enter value for {}", key))?;
            if raw.is_empty() && !required {
                continue;
            }
            arguments.insert(key.to_string(), coerce_input(&raw, property));
        }

        let result = self.client.call_tool(&tool.name, arguments).await?;
        match result.text() {
            Some(text) if result.is_error => {
                self.operator.show(&format!("{} {}", style("Tool error:").red(), text))
            }
            Some(text) => self.operator.show(text),
            None => self.operator.show("Tool returned no text content"),
        }
        Ok(())
    }

    async fn handle_resource(&self) -> Result<()> {
        let value = self.pick("Select a resource", &self.catalog.resource_entries())?;

        let uri = match self.catalog.find_resource(&value)? {
            ResourceTarget::Resource(r) => r.uri.clone(),
            ResourceTarget::Template(t) => {
                let mut values = HashMap::new();
                for param in template_params(&t.uri_template) {
                    let raw = self.operator.input(&format!("Enter value for {}", param))?;
                    values.insert(param, raw);
                }
                expand_template(&t.uri_template, &values)
            }
        };

        for content in self.client.read_resource(&uri).await? {
            match content.text {
                Some(text) => {
                    let pretty = serde_json::from_str::<JsonValue>(&text)
                        .ok()
                        .and_then(|v| serde_json::to_string_pretty(&v).ok())
                        .unwrap_or(text);
                    self.operator.show(&pretty);
                }
                None => self
                    .operator
                    .show(&format!("Unsupported content for {}", content.uri)),
            }
        }
        Ok(())
    }

    async fn handle_prompt(&self) -> Result<()> {
        let name = self.pick("Select a prompt", &self.catalog.prompt_entries())?;
        let prompt = self.catalog.find_prompt(&name)?;

        let mut arguments = Map::new();
        for arg in &prompt.arguments {
            let raw = self.operator.input(&format!("Enter value for {}", arg.name))?;
            if raw.is_empty() && !arg.required {
                continue;
            }
            arguments.insert(arg.name.clone(), JsonValue::String(raw));
        }

        for message in self.client.get_prompt(&prompt.name, arguments).await? {
            let Some(text) = message.text() else {
                self.operator.show("Unsupported prompt content");
                continue;
            };
            self.operator.show(text);
            if self.operator.confirm("Would you like to run the above prompt?")? {
                let parts = self.model.generate(&[Content::user_text(text)], &[]).await?;
                self.operator.show(&text_of(&parts));
            }
        }
        Ok(())
    }
}

/// Schema properties in prompting order: `required` names as listed, then
/// the optional ones. Each entry carries whether it is required.
fn argument_order(schema: &JsonValue) -> Vec<(&str, &JsonValue, bool)> {
    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return Vec::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let mut ordered: Vec<(&str, &JsonValue, bool)> = required
        .iter()
        .filter_map(|name| properties.get(*name).map(|property| (*name, property, true)))
        .collect();
    ordered.extend(
        properties
            .iter()
            .filter(|(key, _)| !required.contains(&key.as_str()))
            .map(|(key, property)| (key.as_str(), property, false)),
    );
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_argument_order_follows_required_list() {
        let schema = json!({
            "type": "object",
            "properties": {
                "address": {"type": "string"},
                "email": {"type": "string"},
                "name": {"type": "string"},
                "nickname": {"type": "string"},
                "phone": {"type": "string"}
            },
            "required": ["name", "email", "address", "phone"]
        });
        let order: Vec<(&str, bool)> = argument_order(&schema)
            .into_iter()
            .map(|(key, _, required)| (key, required))
            .collect();
        assert_eq!(
            order,
            vec![
                ("name", true),
                ("email", true),
                ("address", true),
                ("phone", true),
                ("nickname", false)
            ]
        );
    }

    #[test]
    fn test_argument_order_skips_unknown_required_names() {
        let schema = json!({
            "properties": {"a": {"type": "integer"}},
            "required": ["missing", "a"]
        });
        let order = argument_order(&schema);
        assert_eq!(order.len(), 1);
        assert_eq!(order[0].0, "a");
        assert!(order[0].2);
    }

    #[test]
    fn test_argument_order_without_properties() {
        assert!(argument_order(&json!({"type": "object"})).is_empty());
    }
}
