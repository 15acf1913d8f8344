//! CLI command handlers.

use std::path::PathBuf;

use anyhow::Result;

use parley_api::ParleyApi;
use parley_auth::{SessionAuthority, create_file_store};

pub mod chat;
pub mod login;
pub mod logout;
pub mod register;
pub mod status;
pub mod whoami;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Server URL to connect to.
    pub server_url: String,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Directory holding the stored credential.
    pub data_dir: PathBuf,
}

impl Context {
    /// Build the REST client for this context.
    pub fn api(&self) -> Result<ParleyApi> {
        Ok(ParleyApi::builder().base_url(&self.server_url).build()?)
    }

    /// Build a session authority backed by the durable credential store.
    pub fn authority(&self) -> Result<SessionAuthority> {
        Ok(SessionAuthority::new(
            self.api()?,
            create_file_store(&self.data_dir),
        ))
    }
}

/// Where the credential file lives.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PARLEY_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|d| d.join("parley"))
        .unwrap_or_else(|| PathBuf::from(".parley"))
}
