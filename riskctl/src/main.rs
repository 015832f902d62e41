use anyhow::{Context, Result};
use clap::Parser;
use finmon_risk::{
    RiskAlert, RiskEngine, RiskEngineConfig, RiskMetrics, RiskMonitor, RiskPolicyConfig,
    StaticMarketData,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

mod cli;

use cli::{Args, Command, OutputFormat};

/// Snapshot printed by the `portfolio` command
#[derive(Serialize)]
struct PortfolioOutput {
    metrics: RiskMetrics,
    alerts: Vec<RiskAlert>,
}

fn load_config(args: &Args, data: &StaticMarketData) -> Result<RiskEngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            RiskEngineConfig::from_yaml_file(path)
                .with_context(|| format!("Failed to load engine config {:?}", path))?
        }
        None => RiskEngineConfig::default(),
    };

    // Static data is historical; anchor the window at its last observation
    if config.as_of.is_none() {
        config.as_of = data.latest_timestamp();
        if let Some(as_of) = config.as_of {
            info!("Using latest observation {} as window end", as_of);
        }
    }

    Ok(config)
}

fn load_monitor(args: &Args) -> Result<RiskMonitor> {
    let policies = match &args.policies {
        Some(path) => {
            info!("Loading risk policies from {:?}", path);
            RiskPolicyConfig::from_yaml_file(path)
                .with_context(|| format!("Failed to load policies {:?}", path))?
        }
        None => RiskPolicyConfig::default(),
    };
    Ok(RiskMonitor::new(policies))
}

fn print<T: Serialize>(format: OutputFormat, value: &T) -> Result<()> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", text);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Loading market data from {:?}", args.data);
    let data = StaticMarketData::from_file(&args.data)
        .with_context(|| format!("Failed to load market data {:?}", args.data))?;
    let config = load_config(&args, &data)?;

    let data = Arc::new(data);
    let engine = RiskEngine::with_memory_cache(config, data.clone(), data)?;

    match &args.command {
        Command::Portfolio { id } => {
            let metrics = engine.get_portfolio_risk(id).await?;
            let alerts = load_monitor(&args)?.evaluate(&metrics);
            print(args.format, &PortfolioOutput { metrics, alerts })?;
        }
        Command::Asset { symbol } => {
            print(args.format, &engine.get_asset_risk(symbol).await?)?;
        }
        Command::Correlation { id } => {
            print(args.format, &engine.get_portfolio_correlation(id).await?)?;
        }
        Command::Stress { id, shocks } => {
            let result = engine.stress_test(id, Command::shock_map(shocks)).await?;
            print(args.format, &result)?;
        }
        Command::Scenarios { id } => {
            print(args.format, &engine.run_stress_scenarios(id).await?)?;
        }
    }

    Ok(())
}
