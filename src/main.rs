//! MCP server for the user directory.
//!
//! Run with `user-directory-server --data-file /path/to/users.json`.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use user_directory_mcp::{McpServer, UserStore};

/// MCP server for a JSON-backed user directory.
///
/// Exposes user tools, resources, and prompts to MCP clients.
/// Communicates via JSON-RPC 2.0 over stdin/stdout.
#[derive(Parser)]
#[command(name = "user-directory-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the JSON file holding the user array.
    /// Created with an empty array if it does not exist.
    #[arg(long, value_name = "PATH", env = "USER_DIRECTORY_DATA", default_value = "data/users.json")]
    data_file: PathBuf,

    /// Enable debug logging to stderr.
    #[arg(long, short)]
    verbose: bool,
}

fn main() {
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

    if let Err(e) = seed_data_file(&args.data_file) {
        eprintln!(
            "Error: Failed to create data file '{}': {}",
            args.data_file.display(),
            e
        );
        std::process::exit(1);
    }

    let store = UserStore::new(args.data_file);
    let mut server = McpServer::new(store);

    // Run the server
    if let Err(e) = server.run_sync() {
        eprintln!("Error: Server error: {}", e);
        std::process::exit(1);
    }
}

/// Write an empty user array if the data file is missing.
fn seed_data_file(path: &std::path::Path) -> std::io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!(path = %path.display(), "Seeding empty user store");
    std::fs::write(path, "[]\n")
}
