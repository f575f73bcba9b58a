use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::runtime::Builder;

use sdn_routing::switch_commands::LoggingSink;
use sdn_routing::{L3Routing, RoutingConfig, RoutingEngine, TopologyEvent};

#[derive(Parser)]
#[command(name = "sdn-routing", about = "Shortest-path L3 routing engine")]
struct Cli {
    /// JSON configuration file
    #[arg(long)]
    config: Option<String>,

    /// Flow table to program, overrides the config file
    #[arg(long)]
    table: Option<u8>,

    /// JSON-lines topology event feed, stdin when omitted
    #[arg(long)]
    events: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(cli: &Cli) -> Result<RoutingConfig> {
    let mut config = match (&cli.config, cli.table) {
        (Some(path), _) => RoutingConfig::load(path)?,
        (None, Some(table)) => RoutingConfig::new(table),
        (None, None) => bail!("either --config or --table is required"),
    };
    if let Some(table) = cli.table {
        config.table = table;
    }
    config.validate()?;
    Ok(config)
}

async fn feed_events<R: AsyncRead + Unpin>(reader: R, engine: &RoutingEngine) -> Result<usize> {
    let handle = engine.handle();
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<TopologyEvent>(line) {
            Ok(event) => {
                handle.submit(event).await?;
                count += 1;
            }
            Err(e) => warn!("Ignoring malformed event {:?}: {}", line, e),
        }
    }

    Ok(count)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level.as_str())).init();

    let config = load_config(&cli)?;

    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        let engine = RoutingEngine::start(config, Arc::new(LoggingSink)).await?;
        info!("Routing rules go to table {}", engine.routing_table_id());

        let count = match &cli.events {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("opening event feed {}", path))?;
                feed_events(file, &engine).await?
            }
            None => feed_events(tokio::io::stdin(), &engine).await?,
        };

        info!("Event feed finished after {} event(s)", count);
        engine.shutdown().await;
        Ok::<(), anyhow::Error>(())
    })
}
