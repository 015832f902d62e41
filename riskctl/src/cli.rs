use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "riskctl", about = "Portfolio risk analytics from static market data")]
pub struct Args {
    /// Engine configuration (YAML); defaults apply when omitted
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Positions and return series (YAML, or JSON by extension)
    #[clap(short, long)]
    pub data: PathBuf,

    /// Alert thresholds (YAML); built-in thresholds when omitted
    #[clap(short, long)]
    pub policies: Option<PathBuf>,

    #[clap(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Full risk snapshot for a portfolio, with threshold alerts
    Portfolio { id: String },

    /// Risk report for a single symbol
    Asset { symbol: String },

    /// Correlation matrix of a portfolio's holdings
    Correlation { id: String },

    /// Apply price shocks to a portfolio
    Stress {
        id: String,

        /// Shock as SYMBOL=RETURN, e.g. SPY=-0.2; repeatable
        #[clap(short, long = "shock", value_parser = parse_shock, required = true)]
        shocks: Vec<(String, f64)>,
    },

    /// Run the scenarios listed in the engine configuration
    Scenarios { id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl Command {
    /// Shocks keyed by symbol; a repeated symbol keeps its last value
    pub fn shock_map(shocks: &[(String, f64)]) -> BTreeMap<String, f64> {
        shocks.iter().cloned().collect()
    }
}

fn parse_shock(s: &str) -> Result<(String, f64), String> {
    let (symbol, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected SYMBOL=RETURN, got '{}'", s))?;

    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(format!("missing symbol in '{}'", s));
    }

    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid shock '{}': {}", value, e))?;

    Ok((symbol.to_string(), value))
}
