//! Logout command.

use anyhow::Result;
use clap::Args;

use parley_auth::{CredentialStore, SessionAuthority, create_file_store};

use super::Context;

/// Arguments for the logout command.
#[derive(Args, Debug)]
pub struct LogoutArgs {}

/// Run the logout command.
pub async fn run(_args: LogoutArgs, ctx: &Context) -> Result<()> {
    let store = create_file_store(&ctx.data_dir);
    let Some(credential) = store.load().await? else {
        println!("Not logged in.");
        return Ok(());
    };

    let authority = SessionAuthority::new(ctx.api()?, store);
    authority.set_credential(credential).await?;
    authority.logout().await?;

    println!("Logged out.");
    Ok(())
}
