//! Interactive client for the user directory MCP server.
//!
//! Run with `user-directory-client` after building both binaries. The server is
//! started as a child process and driven over its stdio.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use user_directory_mcp::client::ai::{DEFAULT_API_BASE, DEFAULT_MODEL};
use user_directory_mcp::client::{
    GeminiModel, LanguageModel, McpClient, Operator, SamplingBridge, Session, TerminalOperator,
};

/// Interactive MCP client for the user directory server.
///
/// Lists the server's tools, resources, and prompts, and lets you run them
/// directly or through a model with function calling.
#[derive(Parser)]
#[command(name = "user-directory-client")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the server executable.
    /// Defaults to `user-directory-server` next to this binary.
    #[arg(long, value_name = "PATH", env = "USER_DIRECTORY_SERVER")]
    server: Option<PathBuf>,

    /// User data file passed to the server.
    #[arg(long, value_name = "PATH", env = "USER_DIRECTORY_DATA")]
    data_file: Option<PathBuf>,

    /// API key for the Generative Language API.
    #[arg(long, env = "GOOGLE_GENERATIVE_AI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model id used for queries, prompts, and sampling.
    #[arg(long, env = "USER_DIRECTORY_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Base URL of the Generative Language API.
    #[arg(long, value_name = "URL", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Maximum model calls per query.
    #[arg(long, default_value_t = 5)]
    max_steps: usize,

    /// Answer server sampling requests without asking first.
    #[arg(long)]
    no_confirm: bool,

    /// Enable debug logging to stderr (also passed to the server).
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    // Set up logging
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("user_directory_mcp=debug".parse().unwrap()),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let server = match args.server.clone().map_or_else(default_server_path, Ok) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: Failed to locate server binary: {}", e);
            std::process::exit(1);
        }
    };

    let mut server_args = Vec::new();
    if let Some(data_file) = &args.data_file {
        server_args.push("--data-file".to_string());
        server_args.push(data_file.display().to_string());
    }
    if args.verbose {
        server_args.push("--verbose".to_string());
    }

    let model: Arc<dyn LanguageModel> = Arc::new(GeminiModel::new(
        args.api_key.clone(),
        args.model.clone(),
        args.api_base.clone(),
    ));
    let operator: Arc<dyn Operator> = Arc::new(TerminalOperator);
    let sampling = Arc::new(SamplingBridge::new(
        model.clone(),
        operator.clone(),
        !args.no_confirm,
    ));

    let client = match McpClient::spawn(&server, &server_args, sampling).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: Failed to connect to server: {}", e);
            std::process::exit(1);
        }
    };

    let mut session = Session::new(client, model, operator, args.max_steps);
    let outcome = session.run().await;
    if let Err(e) = session.shutdown().await {
        tracing::warn!(error = %e, "Server shutdown failed");
    }

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn default_server_path() -> std::io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(exe.with_file_name(format!(
        "user-directory-server{}",
        std::env::consts::EXE_SUFFIX
    )))
}
