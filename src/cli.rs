//! CLI argument definitions using clap
//!
//! Every flag overrides the matching config file value; anything not given
//! on the command line keeps the file's (or the built-in) value.

use clap::Parser;
use std::path::PathBuf;

use crate::config::RelayConfig;

/// Live TF2 roster, chat and kill feed relay
#[derive(Parser, Debug, Default)]
#[command(name = "tf2-roster-relay")]
#[command(about = "Relays the live TF2 match roster, chat and kill feed over a local WebSocket")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// RCON host of the game client
    #[arg(long)]
    pub rcon_host: Option<String>,

    /// RCON port of the game client
    #[arg(long)]
    pub rcon_port: Option<u16>,

    /// RCON password (must match +rcon_password)
    #[arg(long, env = "TF2_RCON_PASSWORD", hide_env_values = true)]
    pub rcon_password: Option<String>,

    /// Port for the WebSocket push channel
    #[arg(long)]
    pub push_port: Option<u16>,

    /// Path to the game's console.log
    #[arg(long)]
    pub log_path: Option<PathBuf>,

    /// Do not empty console.log on startup
    #[arg(long)]
    pub keep_log: bool,

    /// SQLite database for players and chat
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Disable persistence
    #[arg(long)]
    pub no_store: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "TF2_RELAY_LOG")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded config
    pub fn apply(&self, config: &mut RelayConfig) {
        if let Some(host) = &self.rcon_host {
            config.rcon.host.clone_from(host);
        }
        if let Some(port) = self.rcon_port {
            config.rcon.port = port;
        }
        if let Some(password) = &self.rcon_password {
            config.rcon.password.clone_from(password);
        }
        if let Some(port) = self.push_port {
            config.push.port = port;
        }
        if let Some(path) = &self.log_path {
            config.log.path = Some(path.clone());
        }
        if self.keep_log {
            config.log.truncate_on_start = false;
        }
        if let Some(database) = &self.database {
            config.store.database = Some(database.clone());
        }
        if self.no_store {
            config.store.enabled = false;
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
    }
}
