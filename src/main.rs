mod control;
mod keys;
mod process;
mod service;
mod traits;
mod ui;
mod wgconf;

use clap::{Parser, Subcommand};
use service::Wgcfg;

/// Manages a WireGuard interface config file and drives `wg-quick`.
#[derive(Debug, Parser)]
#[clap(version)]
struct Config {
    #[clap(flatten)]
    service: service::Config,

    #[clap(flatten)]
    api: ui::web::Config,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API (the default).
    Serve,
    /// Print a bearer token for the peer endpoints.
    Token {
        #[clap(long, short, default_value = "admin")]
        subject: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    pretty_env_logger::init();

    let config = Config::parse();

    let service = Wgcfg::new(config.service)?;

    match config.command.unwrap_or(Command::Serve) {
        Command::Serve => ui::run(config.api, service).await?,
        Command::Token { subject } => println!("{}", service.issue_token(&subject)?),
    }

    Ok(())
}
