// ABOUTME: Entry point for nexus — a chat and speech gateway in front of an LLM API.
// ABOUTME: Parses CLI args, loads config, installs logging, and runs the app.

use std::path::PathBuf;

use clap::Parser;

use nexus::app::App;
use nexus::config::Config;
use nexus::logging;

#[derive(Debug, Parser)]
#[command(name = "nexus", version, about = "Chat and speech gateway for an LLM API")]
struct Cli {
    /// Config file (defaults to ~/.nexus/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on. Overrides PORT and the config file.
    #[arg(long)]
    port: Option<u16>,

    /// Start with empty session history instead of restoring the snapshot.
    #[arg(long)]
    fresh: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env()?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;

    logging::init(&config.logging)?;

    App::new(config, cli.fresh).run().await
}
