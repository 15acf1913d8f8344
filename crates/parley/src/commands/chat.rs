//! Chat command - interactive live session (REPL).

use anyhow::Result;
use clap::Args;
use console::style;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use parley_api::StoredMessage;
use parley_session::{AuthScheme, ChatSession, ConnectionState, SessionConfig, SessionError};
use parley_types::{ChatMessage, MessageKind};

use super::Context;

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Fetch this stored session's history before going live
    #[arg(short, long)]
    pub session: Option<String>,

    /// Tag the socket URI with oauth2 instead of jwt
    #[arg(long)]
    pub oauth2: bool,
}

enum ControlFlow {
    Continue,
    Exit,
}

/// Run the chat command (REPL).
pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let authority = ctx.authority()?;
    let Some(user) = authority.hydrate().await? else {
        anyhow::bail!("Not logged in. Run 'parley login' first.");
    };

    // The live session holds no history; backfill from the REST endpoint.
    if let Some(session_id) = &args.session
        && let Some(token) = authority.access_token()
    {
        match authority.api().messages().history(&token, session_id).await {
            Ok(history) => {
                for msg in &history {
                    print_history(msg);
                }
            }
            Err(e) => {
                eprintln!("{}", style(format!("Could not fetch history: {e}")).red());
            }
        }
    }

    let mut config = SessionConfig::new(&ctx.server_url);
    if args.oauth2 {
        config = config.with_auth_scheme(AuthScheme::OAuth2);
    }
    let session = ChatSession::spawn(config, authority.clone());

    let _subscription = session.subscribe(print_message);

    // Surface connection transitions in the REPL instead of via tracing.
    let mut state_rx = session.state_watch();
    let state_task = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow();
            eprintln!("{}", style(format!("[{state}]")).dim());
            if state == ConnectionState::Failed {
                eprintln!(
                    "{}",
                    style("Service unavailable. Type /reconnect to retry.").red()
                );
            }
        }
    });

    if ctx.verbose {
        eprintln!("{}", style(format!("server: {}", ctx.server_url)).dim());
    }
    println!("Chatting as {}. Type /help for commands.", user.username);

    let editor_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut editor: Editor<(), DefaultHistory> = Editor::with_config(editor_config)?;

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if line.starts_with('/') {
                    match handle_slash_command(line, &session) {
                        ControlFlow::Continue => continue,
                        ControlFlow::Exit => break,
                    }
                }

                match session.send(line).await {
                    // The local echo is printed by the bus subscriber.
                    Ok(_) => {}
                    Err(SessionError::NotConnected) => {
                        eprintln!("{}", style("Not connected; message not sent.").red());
                    }
                    Err(e) => {
                        eprintln!("{}", style(format!("Error: {e}")).red());
                        break;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C - don't exit, just give a fresh prompt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        }
    }

    state_task.abort();
    session.shutdown().await;
    println!("{}", style("Goodbye!").dim());
    Ok(())
}

fn handle_slash_command(line: &str, session: &ChatSession) -> ControlFlow {
    match line {
        "/quit" | "/exit" | "/q" => ControlFlow::Exit,
        "/reconnect" => {
            if session.reconnect().is_err() {
                eprintln!("{}", style("Session is gone.").red());
            }
            ControlFlow::Continue
        }
        "/status" => {
            println!("{}", session.state());
            ControlFlow::Continue
        }
        "/help" => {
            println!("/status     show connection state");
            println!("/reconnect  force a reconnect");
            println!("/quit       leave the chat");
            ControlFlow::Continue
        }
        other => {
            eprintln!("Unknown command: {other} (try /help)");
            ControlFlow::Continue
        }
    }
}

fn print_message(msg: &ChatMessage) {
    match msg.kind {
        MessageKind::Chat => {
            if msg.from_user {
                println!("{} {}", style("you:").cyan().bold(), msg.content);
            } else {
                println!("{} {}", style("them:").green().bold(), msg.content);
            }
        }
        MessageKind::LoadingStarted => println!("{}", style("...").dim()),
        MessageKind::LoadingDone => {}
        MessageKind::Error => {
            eprintln!("{}", style(format!("error: {}", msg.content)).red());
        }
    }
}

fn print_history(msg: &StoredMessage) {
    let who = if msg.is_from_user {
        style("you:").cyan()
    } else {
        style("them:").green()
    };
    println!(
        "{} {} {}",
        style(msg.created_at.format("%H:%M")).dim(),
        who,
        msg.content
    );
}
