//! strongbox - secrets registry client
//!
//! Commands:
//! - set <NAME|PATH> <VALUE> / set <NAME|PATH>=<VALUE>: store a credential
//! - unset <NAME|PATH>: withdraw a credential's value
//! - ls [PATH]: list credentials under a path prefix
//! - orgs list: list visible orgs
//! - invites list|send|accept|approve: manage org invites
//! - status: check the local daemon

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { cli::run(cli.command).await })
}
