//! Status command - server health and login state.

use anyhow::Result;
use clap::Args;

use parley_auth::{CredentialStore, create_file_store};

use super::Context;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {}

/// Run the status command.
pub async fn run(_args: StatusArgs, ctx: &Context) -> Result<()> {
    let api = ctx.api()?;
    let store = create_file_store(&ctx.data_dir);

    let health = api.health().check().await;
    let logged_in = store.load().await.ok().flatten().is_some();

    if ctx.json_output {
        let report = serde_json::json!({
            "server": ctx.server_url,
            "reachable": health.is_ok(),
            "health": health.as_ref().map(|h| h.status.clone()).unwrap_or_default(),
            "logged_in": logged_in,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Server: {}", ctx.server_url);
    match health {
        Ok(report) => println!("  Health: {}", report.status),
        Err(e) => println!("  Unreachable: {}", e),
    }
    if logged_in {
        println!("  Credential: stored");
    } else {
        println!("  Credential: none (run 'parley login')");
    }

    Ok(())
}
