//! Register command.

use anyhow::Result;
use clap::Args;
use console::Term;

use super::Context;

/// Arguments for the register command.
#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Username for the new account (prompted if omitted)
    #[arg(short, long)]
    pub username: Option<String>,

    /// Email for the new account (prompted if omitted)
    #[arg(short, long)]
    pub email: Option<String>,
}

/// Run the register command.
pub async fn run(args: RegisterArgs, ctx: &Context) -> Result<()> {
    let authority = ctx.authority()?;

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

    let email = match args.email {
        Some(email) => email,
        None => {
            term.write_str("email: ")?;
            term.read_line()?
        }
    };

    term.write_str("password: ")?;
    let password = term.read_secure_line()?;

    let user = authority
        .register(&username, email.trim(), &password)
        .await?;
    println!("Account created. Logged in as {}.", user.username);
    Ok(())
}
