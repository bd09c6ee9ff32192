use std::path::PathBuf;

use blackhole::{
    config::{self, Config, CONFIG_ENV},
    Blackhole,
};
use clap::Parser;

/// SMTP server that stores every message it receives
#[derive(Parser)]
#[command(name = "blackhole", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = config::locate(cli.config, std::env::var_os(CONFIG_ENV).map(PathBuf::from))?;
    let config = Config::load(&path)?;

    Blackhole::new(config).run().await
}
