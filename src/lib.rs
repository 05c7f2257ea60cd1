//! # user-directory-mcp
//!
//! Example MCP (Model Context Protocol) server for a small user directory, and an
//! interactive client that drives it.
//!
//! The server exposes users kept in a single JSON file. It speaks the MCP protocol
//! over stdin/stdout using JSON-RPC 2.0:
//!
//! - **Tools**: `create-user`, `create-random-user` (asks the client for a sampled completion)
//! - **Resources**: `users://all`, `users://details/{userId}`
//! - **Prompts**: `generate-fake-user`
//!
//! The client spawns the server as a child process, discovers its catalog, and offers a
//! menu of queries, tool calls, resource reads, and prompts. Free-text queries go through
//! a hosted model with the server's tools declared as callable functions.
//!
//! ## Library Usage
//!
//! ```no_run
//! use user_directory_mcp::{McpServer, UserStore};
//!
//! let store = UserStore::new("data/users.json");
//! let mut server = McpServer::new(store);
//!
//! // Run the server (reads from stdin, writes to stdout)
//! // server.run_sync().expect("Server error");
//! ```

#![warn(missing_docs)]

pub mod client;
mod convert;
mod error;
mod prompts;
mod resources;
mod schema;
mod server;
mod store;
mod tools;

pub use convert::{coerce_input, first_text, strip_code_fence, text_content, tool_result};
pub use error::{rpc_codes, McpError, Result};
pub use prompts::{PromptArgument, PromptDef};
pub use resources::{ResourceDef, ResourceTemplateDef};
pub use schema::{sanitize, ALLOWED_STRING_FORMATS};
pub use server::{JsonRpcRequest, JsonRpcResponse, McpServer, Sampler, PROTOCOL_VERSION};
pub use store::{NewUser, User, UserStore, USER_FIELDS};
pub use tools::{ToolAnnotations, ToolDef, ToolRegistry};

/// Boxed future used at the async trait seams.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
