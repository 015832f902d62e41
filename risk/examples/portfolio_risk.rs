//! Portfolio risk analytics example
//!
//! Builds an in-memory market, computes a portfolio snapshot through the
//! engine, checks it against the default alert thresholds and runs a
//! stress scenario.
//!
//! Run with: cargo run --example portfolio_risk

use chrono::{Duration, TimeZone, Utc};
use finmon_risk::{
    Position, ReturnSeries, RiskEngine, RiskEngineConfig, RiskMonitor, StaticMarketData,
    VarMethod, VolatilityModel,
};
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Portfolio Risk Analytics Example ===\n");

    // 1. Simulated daily returns for one year
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let spy: Vec<f64> = (0..252)
        .map(|i| (i as f64 * 0.05).sin() * 0.015 + ((i * 7) % 100) as f64 / 10000.0 - 0.005)
        .collect();
    let qqq: Vec<f64> = (0..252)
        .map(|i| (i as f64 * 0.05).sin() * 0.020 + ((i * 11) % 100) as f64 / 8000.0 - 0.006)
        .collect();
    let tlt: Vec<f64> = (0..252)
        .map(|i| -(i as f64 * 0.05).sin() * 0.008 + ((i * 13) % 100) as f64 / 15000.0 - 0.003)
        .collect();

    let market = Arc::new(
        StaticMarketData::new()
            .with_portfolio(
                "balanced",
                vec![
                    Position::new("SPY", 50_000.0),
                    Position::new("QQQ", 30_000.0),
                    Position::new("TLT", 20_000.0),
                ],
            )
            .with_series(ReturnSeries::daily("SPY", start, spy))
            .with_series(ReturnSeries::daily("QQQ", start, qqq))
            .with_series(ReturnSeries::daily("TLT", start, tlt)),
    );

    // 2. Engine over the market data
    let config = RiskEngineConfig {
        as_of: Some(start + Duration::days(260)),
        lookback_days: 365,
        benchmark_symbol: Some("SPY".to_string()),
        ..RiskEngineConfig::default()
    };
    let engine = RiskEngine::with_memory_cache(config, market.clone(), market)?;

    // 3. Portfolio snapshot
    let metrics = engine.get_portfolio_risk("balanced").await?;
    println!("Observations: {}", metrics.observations);

    println!("\n--- Tail Risk ---");
    for tail in &metrics.tail_risk {
        println!(
            "  {:>4.0}% {:<12} VaR {:>6.2}%  CVaR {:>6.2}%",
            tail.confidence_level * 100.0,
            tail.method.as_str(),
            tail.var * 100.0,
            tail.cvar * 100.0
        );
    }

    println!("\n--- Volatility ---");
    for model in VolatilityModel::ALL {
        if let Some(vol) = metrics.volatility(model) {
            println!("  {:<10} {:>6.2}%", model.as_str(), vol * 100.0);
        }
    }

    println!("\n--- Performance ---");
    println!("  Sharpe ratio:   {:.2}", metrics.sharpe_ratio);
    if let Some(beta) = metrics.beta {
        println!("  Beta vs SPY:    {:.2}", beta);
    }
    println!("  Max drawdown:   {:.2}%", metrics.max_drawdown * 100.0);
    println!("  Recovery days:  {}", metrics.recovery_days);

    println!("\n--- Component VaR (95%) ---");
    for (symbol, component) in &metrics.component_var {
        println!("  {:<5} {:>7.4}", symbol, component);
    }

    println!("\n--- Correlation Matrix ---");
    print!("     ");
    for symbol in &metrics.correlation.symbols {
        print!("  {:>6}", symbol);
    }
    println!();
    for (symbol, row) in metrics.correlation.symbols.iter().zip(&metrics.correlation.values) {
        print!("{:<5}", symbol);
        for rho in row {
            print!("  {:>6.3}", rho);
        }
        println!();
    }

    // 4. Threshold alerts
    println!("\n--- Alerts ---");
    let alerts = RiskMonitor::default().evaluate(&metrics);
    if alerts.is_empty() {
        println!("  none");
    }
    for alert in &alerts {
        println!("  [{:?}] {}", alert.severity, alert.message);
    }

    // 5. Cached on the second request
    let again = engine.get_portfolio_risk("balanced").await?;
    assert_eq!(again.timestamp, metrics.timestamp);
    println!(
        "\nSecond request served from cache (VaR99 {:.2}%)",
        again.var(0.99, VarMethod::Historical).unwrap_or(0.0) * 100.0
    );

    // 6. Equity sell-off
    let shocks: BTreeMap<String, f64> = [
        ("SPY".to_string(), -0.20),
        ("QQQ".to_string(), -0.30),
        ("TLT".to_string(), 0.05),
    ]
    .into_iter()
    .collect();
    let stress = engine.stress_test("balanced", shocks).await?;

    println!("\n--- Stress Test ---");
    println!("  Original value: {:.0}", stress.original_value);
    println!("  Stressed value: {:.0}", stress.stressed_value);
    println!(
        "  Impact:         {:.0} ({:.2}%)",
        stress.total_impact,
        stress.impact_percentage * 100.0
    );
    if let Some(worst) = &stress.worst_position {
        println!("  Worst position: {} ({:.0})", worst, stress.worst_position_impact);
    }

    Ok(())
}
