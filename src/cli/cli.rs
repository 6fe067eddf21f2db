use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// supervisor-grace - grow or shrink supervised process groups without a restart
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the process host and its RPC server
    Serve(ServeArgs),

    /// Apply the configured numprocs of a group on a running host
    GraceUpdate(GraceUpdateArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 9001)]
    pub port: u16,

    /// Listen address
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "127.0.0.1")]
    pub address: String,

    /// Program definitions (TOML)
    #[arg(short, long, env = "GRACE_CONFIG")]
    pub config: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct GraceUpdateArgs {
    /// Group to update
    pub group: String,

    /// Start the processes that were added
    #[arg(long)]
    pub start: bool,

    /// Seconds to wait for each removed process to stop
    #[arg(long, default_value_t = 120)]
    pub stop_timeout: u64,

    /// Base URL of the running host
    #[arg(long, env = "GRACE_SERVER_URL", default_value = "http://127.0.0.1:9001")]
    pub server_url: String,
}
