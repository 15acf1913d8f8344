//! Login command.

use anyhow::Result;
use clap::Args;
use console::Term;

use super::Context;

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Username (prompted if omitted)
    #[arg(short, long)]
    pub username: Option<String>,
}

/// Run the login command.
pub async fn run(args: LoginArgs, ctx: &Context) -> Result<()> {
    let authority = ctx.authority()?;

    // A stored credential that still validates means we're done.
    if let Ok(Some(user)) = authority.hydrate().await {
        println!("Already logged in as {}.", user.username);
        println!("Run 'parley logout' first to switch accounts.");
        return Ok(());
    }

    let term = Term::stdout();
    let username = match args.username {
        Some(username) => username,
        None => {
            term.write_str("username: ")?;
            term.read_line()?
        }
    };
    let username = username.trim().to_string();
    if username.is_empty() {
        anyhow::bail!("No username provided");
    }

    term.write_str("password: ")?;
    let password = term.read_secure_line()?;

    let user = authority.login(&username, &password).await?;
    println!("Logged in as {}.", user.username);
    Ok(())
}
