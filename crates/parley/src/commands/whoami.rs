//! Whoami command.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the whoami command.
#[derive(Args, Debug)]
pub struct WhoamiArgs {}

/// Run the whoami command.
pub async fn run(_args: WhoamiArgs, ctx: &Context) -> Result<()> {
    let authority = ctx.authority()?;

    match authority.hydrate().await? {
        Some(user) => {
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&user)?);
            } else {
                println!("{} (id {})", user.username, user.id);
                if !user.email.is_empty() {
                    println!("  {}", user.email);
                }
            }
        }
        None => {
            println!("Not logged in.");
            println!("Run 'parley login' to authenticate.");
        }
    }

    Ok(())
}
