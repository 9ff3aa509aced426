// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use clap::Parser;
use site_replication::cli::{Cli, LogFormat, Verb};
use site_replication::commands;
use site_replication::config::{Strategy, UnavailableRetryConfig};
use site_replication::{RemoteStoreClient, Replicator, Result};
use std::path::Path;
use tracing::{error, info};

fn init_tracing(cli: &Cli) {
    // RUST_LOG wins over --log-lvl; logs go to stderr so stdout stays JSON.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_lvl));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cli.log_fmt {
        LogFormat::Full => builder.init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        error!(error = %e, "site-tool failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn print(value: &serde_json::Value, jsonl: bool) -> Result<()> {
    println!("{}", commands::render(value, jsonl)?);
    Ok(())
}

fn site_client(cli: &Cli) -> Result<RemoteStoreClient> {
    let retry = UnavailableRetryConfig::default().to_retry_config();
    RemoteStoreClient::new(cli.site_config()?, retry)
}

async fn run(cli: Cli) -> Result<()> {
    match cli.verb.clone() {
        Verb::Replicate {
            dest_url,
            dest_site,
            dest_token,
            start_cursor,
        } => {
            let mut config = cli.replication_config(&dest_url, &dest_site, &dest_token, Strategy::LogReplay)?;
            if let Some(start) = start_cursor {
                config.settings.start_cursor = start;
            }
            Replicator::new(config)?.run().await?;
        }
        Verb::Copyto {
            dest_url,
            dest_site,
            dest_token,
        } => {
            let config = cli.replication_config(&dest_url, &dest_site, &dest_token, Strategy::HeadReconciliation)?;
            Replicator::new(config)?.run().await?;
        }
        Verb::Get { id } => print(&commands::get(&site_client(&cli)?, &id).await?, cli.jsonl)?,
        Verb::Stats => print(&commands::stats(&site_client(&cli)?).await?, cli.jsonl)?,
        Verb::View { name } => print(&commands::view(&site_client(&cli)?, &name).await?, cli.jsonl)?,
        Verb::Hist { id } => print(&commands::hist(&site_client(&cli)?, &id).await?, cli.jsonl)?,
        Verb::Load { file } => {
            for stored in commands::load(&site_client(&cli)?, &file).await? {
                print(&stored, cli.jsonl)?;
            }
        }
        Verb::Lines { file } => {
            for stored in commands::lines(&site_client(&cli)?, &file).await? {
                print(&stored, cli.jsonl)?;
            }
        }
        Verb::Regions => {
            let written = commands::export_regions(&site_client(&cli)?, Path::new("regions")).await?;
            info!(count = written.len(), "Exported regions");
        }
    }
    Ok(())
}
