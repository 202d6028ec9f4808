use std::sync::Arc;

use clap::{Parser, Subcommand};
use optionsbot_core::{ConfigLoader, PersistenceSink, PriceGateway, StateSnapshot};
use optionsbot_data::{NullSink, TradeDatabase};
use optionsbot_engine::PaperTradingEngine;
use optionsbot_gateway::{QuoteClient, StaticGateway};
use optionsbot_strategy::{MomentumFactory, RiskLimits, StraddleFactory, StrategyManager};

#[derive(Parser)]
#[command(name = "optionsbot")]
#[command(about = "Paper trading engine for Indian index options", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the paper trading engine until interrupted
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Discard trade history instead of writing it to the database
        #[arg(long)]
        no_database: bool,
        /// Use an in-memory price table instead of the broker quote API
        #[arg(long)]
        offline: bool,
    },
    /// Print the last saved ledger snapshot
    Status {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// List the strategy instances declared in the config
    Strategies {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Run {
            config,
            no_database,
            offline,
        } => {
            run_engine(&config, no_database, offline).await?;
        }
        Commands::Status { config } => {
            print_status(&config)?;
        }
        Commands::Strategies { config } => {
            print_strategies(&config)?;
        }
    }

    Ok(())
}

async fn run_engine(config_path: &str, no_database: bool, offline: bool) -> anyhow::Result<()> {
    tracing::info!("Starting paper trading engine with config: {}", config_path);

    let config = ConfigLoader::load_from(config_path)?;

    let gateway: Arc<dyn PriceGateway> = if offline {
        tracing::warn!("Offline mode: quotes come from an empty in-memory table");
        Arc::new(StaticGateway::new(false))
    } else {
        Arc::new(QuoteClient::new(&config.gateway))
    };
    if !offline && config.gateway.access_token.is_none() {
        tracing::warn!("No gateway access token configured; live mode is unavailable");
    }

    let sink: Arc<dyn PersistenceSink> = if no_database {
        tracing::warn!("Running without a database; trade history will not survive restarts");
        Arc::new(NullSink)
    } else {
        prepare_sqlite_path(&config.database.url)?;
        Arc::new(TradeDatabase::new(&config.database.url, config.database.max_connections).await?)
    };

    let manager = Arc::new(StrategyManager::new(Arc::clone(&gateway)));
    manager
        .register_class(Arc::new(StraddleFactory::new(Arc::clone(&gateway))))
        .await?;
    manager
        .register_class(Arc::new(MomentumFactory::new(Arc::clone(&gateway))))
        .await?;

    for declared in &config.strategies {
        manager
            .create_instance(
                &declared.name,
                &declared.class,
                declared.parameters.clone(),
                declared.mode,
                declared.allocated_capital,
                RiskLimits::default(),
            )
            .await?;
        manager.activate(&declared.name).await?;
        tracing::info!(
            "Activated strategy instance {} ({}) with capital {}",
            declared.name,
            declared.class,
            declared.allocated_capital
        );
    }
    if config.strategies.is_empty() {
        tracing::warn!("No strategy instances configured; the engine will idle");
    }

    let engine = PaperTradingEngine::new(config.engine, manager, gateway, sink)?;
    engine.start().await?;
    tracing::info!("Engine running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested, stopping engine");
    engine.stop().await?;

    let status = engine.status().await;
    tracing::info!(
        "Session closed: {} trades, win rate {}%, total PnL {}",
        status.total_trades,
        status.win_rate.round_dp(2),
        status.total_pnl
    );

    Ok(())
}

/// `SQLite` will not create the database file or its directory itself.
fn prepare_sqlite_path(database_url: &str) -> anyhow::Result<()> {
    let Some(file_path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    if file_path.is_empty() || file_path.starts_with(':') {
        return Ok(());
    }
    let path = std::path::Path::new(file_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(())
}

fn print_status(config_path: &str) -> anyhow::Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let path = &config.engine.snapshot_path;

    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let snapshot: StateSnapshot = serde_json::from_str(&raw)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("No snapshot at {path}; has the engine run yet?");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn print_strategies(config_path: &str) -> anyhow::Result<()> {
    let config = ConfigLoader::load_from(config_path)?;

    if config.strategies.is_empty() {
        println!("No strategy instances declared in {config_path}");
        return Ok(());
    }

    for declared in &config.strategies {
        println!(
            "{}  class={}  mode={}  capital={}",
            declared.name, declared.class, declared.mode, declared.allocated_capital
        );
    }

    Ok(())
}
