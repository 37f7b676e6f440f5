use anyhow::{Result, anyhow};
use clap::Parser;
use std::path::PathBuf;

use gmail_export::auth::GoogleOAuth;
use gmail_export::config::load_config;
use gmail_export::export::Exporter;
use gmail_export::mail::GmailConnector;

#[derive(Parser)]
#[command(name = "gmail_export")]
#[command(about = "Export Gmail messages from/to an address to CSV", long_about = None)]
struct Cli {
    /// Address to search for as sender or recipient (defaults to `address` in the config)
    address: Option<String>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())
        .map_err(|e| anyhow!("Configuration error: {e:#}"))?;

    let address = cli
        .address
        .or_else(|| cfg.address.clone())
        .ok_or_else(|| anyhow!("no address given on the command line or in the config"))?;

    let connector = GmailConnector::from_config(&cfg, GoogleOAuth::from_config(&cfg));
    let exporter = Exporter::from_config(&cfg, connector);

    let stdout = std::io::stdout();
    exporter.export_for_address(&address, &mut stdout.lock());
    Ok(())
}
