//! Operator interaction.
//!
//! The session loop and the sampling bridge talk to the person at the
//! terminal through [`Operator`], so both can be driven by a script in tests.

use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};

use crate::client::catalog::MenuEntry;
use crate::error::{McpError, Result};

/// The person driving the client.
pub trait Operator: Send + Sync {
    /// Pick one of `entries`, returning its index.
    fn select(&self, prompt: &str, entries: &[MenuEntry]) -> Result<usize>;

    /// Read a line of free text.
    fn input(&self, prompt: &str) -> Result<String>;

    /// Ask a yes/no question.
    fn confirm(&self, prompt: &str) -> Result<bool>;

    /// Display output.
    fn show(&self, text: &str);
}

/// Interactive terminal prompts.
#[derive(Debug, Default)]
pub struct TerminalOperator;

impl Operator for TerminalOperator {
    fn select(&self, prompt: &str, entries: &[MenuEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Err(McpError::NotFound(format!("nothing to choose for '{}'", prompt)));
        }
        let items: Vec<String> = entries
            .iter()
            .map(|e| format!("{} {}", e.label, style(format!("- {}", e.description)).dim()))
            .collect();

        let index = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(&items)
            .default(0)
            .interact()?;
        Ok(index)
    }

    fn input(&self, prompt: &str) -> Result<String> {
        let value = Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;
        Ok(value)
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        let yes = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(true)
            .interact()?;
        Ok(yes)
    }

    fn show(&self, text: &str) {
        println!("{}", text);
    }
}
