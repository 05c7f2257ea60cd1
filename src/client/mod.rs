//! Interactive MCP client.
//!
//! - [`transport`]: child process stdio connection and JSON-RPC routing
//! - [`catalog`]: discovered capabilities as menu entries, URI templates
//! - [`ai`]: model provider, tool-calling query loop, sampling bridge
//! - [`operator`]: terminal prompts
//! - [`session`]: the menu loop

pub mod ai;
pub mod catalog;
pub mod operator;
pub mod session;
pub mod transport;

pub use ai::{GeminiModel, LanguageModel, SamplingBridge};
pub use catalog::{Catalog, MenuEntry};
pub use operator::{Operator, TerminalOperator};
pub use session::{Action, Session, SessionState};
pub use transport::{McpClient, ServerRequestHandler};
