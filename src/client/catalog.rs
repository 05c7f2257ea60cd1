//! Discovered capabilities and their menu representation.
//!
//! Turns tool, prompt, resource, and resource template descriptors into
//! operator-facing choices, and resolves URI templates into concrete URIs.

use std::collections::HashMap;
use std::sync::LazyLock;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{McpError, Result};
use crate::tools::ToolAnnotations;

/// Description shown when a descriptor carries none.
pub const NO_DESCRIPTION: &str = "No description available";

/// Characters left as is when substituting template values, matching
/// `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name
    pub name: String,
    /// Tool description
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema for the arguments
    #[serde(default)]
    pub input_schema: JsonValue,
    /// Display hints
    #[serde(default)]
    pub annotations: Option<ToolAnnotations>,
}

/// A prompt argument as advertised by `prompts/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptArgumentDescriptor {
    /// Argument name
    pub name: String,
    /// Argument description
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the argument must be supplied
    #[serde(default)]
    pub required: bool,
}

/// A prompt as advertised by `prompts/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptDescriptor {
    /// Prompt name
    pub name: String,
    /// Display title
    #[serde(default)]
    pub title: Option<String>,
    /// Prompt description
    #[serde(default)]
    pub description: Option<String>,
    /// Accepted arguments
    #[serde(default)]
    pub arguments: Vec<PromptArgumentDescriptor>,
}

/// A resource as advertised by `resources/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Resource URI
    pub uri: String,
    /// Resource name
    pub name: String,
    /// Display title
    #[serde(default)]
    pub title: Option<String>,
    /// Resource description
    #[serde(default)]
    pub description: Option<String>,
}

/// A resource template as advertised by `resources/templates/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateDescriptor {
    /// URI template with `{param}` placeholders
    pub uri_template: String,
    /// Template name
    pub name: String,
    /// Display title
    #[serde(default)]
    pub title: Option<String>,
    /// Template description
    #[serde(default)]
    pub description: Option<String>,
}

/// A single selectable menu line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    /// Text shown to the operator
    pub label: String,
    /// Name or URI the entry resolves to
    pub value: String,
    /// Secondary text
    pub description: String,
}

impl MenuEntry {
    fn new(title: Option<&str>, name: &str, value: &str, description: Option<&str>) -> Self {
        Self {
            label: title.unwrap_or(name).to_string(),
            value: value.to_string(),
            description: description.unwrap_or(NO_DESCRIPTION).to_string(),
        }
    }
}

/// What a resource menu value refers to.
#[derive(Debug, Clone, Copy)]
pub enum ResourceTarget<'a> {
    /// A concrete resource
    Resource(&'a ResourceDescriptor),
    /// A template that needs parameters
    Template(&'a ResourceTemplateDescriptor),
}

/// Everything discovered from the server at startup.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Tools
    pub tools: Vec<ToolDescriptor>,
    /// Prompts
    pub prompts: Vec<PromptDescriptor>,
    /// Concrete resources
    pub resources: Vec<ResourceDescriptor>,
    /// Resource templates
    pub resource_templates: Vec<ResourceTemplateDescriptor>,
}

impl Catalog {
    /// Menu entries for tools.
    pub fn tool_entries(&self) -> Vec<MenuEntry> {
        self.tools
            .iter()
            .map(|t| {
                let title = t.annotations.as_ref().and_then(|a| a.title.as_deref());
                MenuEntry::new(title, &t.name, &t.name, t.description.as_deref())
            })
            .collect()
    }

    /// Menu entries for prompts.
    pub fn prompt_entries(&self) -> Vec<MenuEntry> {
        self.prompts
            .iter()
            .map(|p| MenuEntry::new(p.title.as_deref(), &p.name, &p.name, p.description.as_deref()))
            .collect()
    }

    /// Menu entries for resources followed by resource templates.
    pub fn resource_entries(&self) -> Vec<MenuEntry> {
        let concrete = self.resources.iter().map(|r| {
            MenuEntry::new(r.title.as_deref(), &r.name, &r.uri, r.description.as_deref())
        });
        let templated = self.resource_templates.iter().map(|t| {
            MenuEntry::new(
                t.title.as_deref(),
                &t.name,
                &t.uri_template,
                t.description.as_deref(),
            )
        });
        concrete.chain(templated).collect()
    }

    /// Look up a tool by name.
    pub fn find_tool(&self, name: &str) -> Result<&ToolDescriptor> {
        self.tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| McpError::NotFound(format!("tool {}", name)))
    }

    /// Look up a prompt by name.
    pub fn find_prompt(&self, name: &str) -> Result<&PromptDescriptor> {
        self.prompts
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| McpError::NotFound(format!("prompt {}", name)))
    }

    /// Look up a resource by URI, or a template by its URI template.
    pub fn find_resource(&self, value: &str) -> Result<ResourceTarget<'_>> {
        if let Some(r) = self.resources.iter().find(|r| r.uri == value) {
            return Ok(ResourceTarget::Resource(r));
        }
        self.resource_templates
            .iter()
            .find(|t| t.uri_template == value)
            .map(ResourceTarget::Template)
            .ok_or_else(|| McpError::NotFound(format!("resource {}", value)))
    }
}

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("valid placeholder regex"));

/// Names of every `{placeholder}` in a URI template, in order of appearance.
pub fn template_params(template: &str) -> Vec<String> {
    PLACEHOLDER_RE
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Substitute percent-encoded values into a URI template.
///
/// Placeholders without a value are left in place.
pub fn expand_template(template: &str, values: &HashMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures<'_>| match values.get(&caps[1]) {
            Some(v) => utf8_percent_encode(v, COMPONENT).to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
