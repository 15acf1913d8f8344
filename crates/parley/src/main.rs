//! Parley - live chat sessions over rotating credentials
//!
//! Main entry point for the Parley CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{Context, chat, login, logout, register, status, whoami};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Parley - live chat sessions over rotating credentials
#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Server URL (default: http://localhost:8000)
    #[arg(long, global = true, env = "PARLEY_SERVER_URL")]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the credential
    Login(login::LoginArgs),

    /// Register a new account
    Register(register::RegisterArgs),

    /// Log out and clear the stored credential
    Logout(logout::LogoutArgs),

    /// Show the currently authenticated user
    Whoami(whoami::WhoamiArgs),

    /// Check server health and login state
    Status(status::StatusArgs),

    /// Open a live chat session (REPL)
    Chat(chat::ChatArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing — console only; quiet unless --verbose
    let filter = if cli.verbose {
        "parley=debug,parley_session=debug,parley_auth=debug,parley_api=debug,info"
    } else {
        "parley=warn,parley_session=warn,parley_auth=warn,parley_api=warn,warn"
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let server_url = cli
        .server
        .unwrap_or_else(|| "http://localhost:8000".to_string());

    let ctx = Context {
        server_url,
        json_output: cli.json,
        verbose: cli.verbose,
        data_dir: commands::default_data_dir(),
    };

    match cli.command {
        Commands::Login(args) => login::run(args, &ctx).await,
        Commands::Register(args) => register::run(args, &ctx).await,
        Commands::Logout(args) => logout::run(args, &ctx).await,
        Commands::Whoami(args) => whoami::run(args, &ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Chat(args) => chat::run(args, &ctx).await,
    }
}
