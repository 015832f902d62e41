//! Property-based tests for the numeric estimators

use finmon_risk::{
    calculate_correlation_matrix, calculate_max_drawdown, calculate_portfolio_volatility,
    calculate_var_cvar, portfolio_returns, VarConfig, VarEngine, VarMethod, VolatilityModel,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

const TOLERANCE: f64 = 1e-12;

fn returns_strategy(min: usize, max: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.1f64..0.1, min..max)
}

/// A smaller simulation count keeps the Monte Carlo cases fast
fn engine() -> VarEngine {
    VarEngine::new(VarConfig {
        simulations: 2_000,
        ..VarConfig::default()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn var_grows_with_confidence(returns in returns_strategy(30, 200)) {
        let engine = engine();
        for method in VarMethod::ALL {
            let vars: Vec<f64> = [0.90, 0.95, 0.99]
                .iter()
                .map(|c| engine.calculate(&returns, *c, method).unwrap().var)
                .collect();
            prop_assert!(vars[1] + TOLERANCE >= vars[0], "{}: {:?}", method, vars);
            prop_assert!(vars[2] + TOLERANCE >= vars[1], "{}: {:?}", method, vars);
        }
    }

    #[test]
    fn cvar_dominates_var(returns in returns_strategy(30, 200), confidence in 0.8f64..0.995) {
        let engine = engine();
        for method in VarMethod::ALL {
            let report = engine.calculate(&returns, confidence, method).unwrap();
            prop_assert!(report.var >= 0.0);
            prop_assert!(report.cvar + TOLERANCE >= report.var, "{}: cvar {} < var {}", method, report.cvar, report.var);
        }
    }

    #[test]
    fn estimates_are_repeatable(returns in returns_strategy(30, 120)) {
        let engine = engine();
        for method in VarMethod::ALL {
            let first = engine.calculate(&returns, 0.99, method).unwrap();
            let second = engine.calculate(&returns, 0.99, method).unwrap();
            prop_assert_eq!(first.var.to_bits(), second.var.to_bits());
            prop_assert_eq!(first.cvar.to_bits(), second.cvar.to_bits());
        }
    }

    #[test]
    fn short_series_report_zero(returns in returns_strategy(0, 30)) {
        for method in VarMethod::ALL {
            let report = calculate_var_cvar(&returns, 0.95, method).unwrap();
            prop_assert_eq!(report.var, 0.0);
            prop_assert_eq!(report.cvar, 0.0);
            prop_assert_eq!(report.observations, returns.len());
        }
        for model in VolatilityModel::ALL {
            prop_assert_eq!(calculate_portfolio_volatility(&returns, model).volatility, 0.0);
        }
    }

    #[test]
    fn volatility_is_non_negative(returns in returns_strategy(30, 200)) {
        for model in VolatilityModel::ALL {
            let report = calculate_portfolio_volatility(&returns, model);
            prop_assert!(report.volatility.is_finite());
            prop_assert!(report.volatility >= 0.0);
            prop_assert!(report.daily_volatility <= report.volatility + TOLERANCE);
        }
    }

    #[test]
    fn drawdown_stays_in_unit_interval(returns in returns_strategy(2, 200)) {
        let mut value = 1.0;
        let values: Vec<f64> = returns
            .iter()
            .map(|r| {
                value *= 1.0 + r;
                value
            })
            .collect();

        let report = calculate_max_drawdown(&values);
        prop_assert!((0.0..1.0).contains(&report.max_drawdown));
        prop_assert!(report.current_drawdown >= 0.0);
        prop_assert!(report.current_drawdown <= report.max_drawdown + TOLERANCE);
    }

    #[test]
    fn correlation_matrix_is_well_formed(
        a in returns_strategy(30, 80),
        b in returns_strategy(30, 80),
        c in returns_strategy(30, 80),
    ) {
        let mut assets = BTreeMap::new();
        assets.insert("A".to_string(), a);
        assets.insert("B".to_string(), b);
        assets.insert("C".to_string(), c);

        let matrix = calculate_correlation_matrix(&assets).unwrap();
        prop_assert_eq!(matrix.len(), 3);
        for i in 0..3 {
            prop_assert_eq!(matrix.values[i][i], 1.0);
            for j in 0..3 {
                prop_assert_eq!(matrix.values[i][j], matrix.values[j][i]);
                prop_assert!((-1.0..=1.0).contains(&matrix.values[i][j]));
            }
        }
    }

    #[test]
    fn single_asset_portfolio_reproduces_returns(returns in returns_strategy(1, 100)) {
        let weights: BTreeMap<String, f64> = [("A".to_string(), 1.0)].into_iter().collect();
        let assets: BTreeMap<String, Vec<f64>> = [("A".to_string(), returns.clone())].into_iter().collect();
        prop_assert_eq!(portfolio_returns(&weights, &assets), returns);
    }
}

#[test]
fn zero_returns_carry_no_risk() {
    let returns = vec![0.0; 60];
    for method in VarMethod::ALL {
        let report = calculate_var_cvar(&returns, 0.99, method).unwrap();
        assert_eq!(report.var, 0.0);
        assert_eq!(report.cvar, 0.0);
    }
    for model in VolatilityModel::ALL {
        assert_eq!(calculate_portfolio_volatility(&returns, model).volatility, 0.0);
    }
}

#[test]
fn identical_series_are_perfectly_correlated() {
    let series: Vec<f64> = (0..40).map(|i| ((i * 7 % 11) as f64 - 5.0) / 100.0).collect();
    let mut assets = BTreeMap::new();
    assets.insert("A".to_string(), series.clone());
    assets.insert("B".to_string(), series.clone());
    assets.insert("C".to_string(), series.iter().map(|r| r * 2.0).collect());

    let matrix = calculate_correlation_matrix(&assets).unwrap();
    for row in &matrix.values {
        for rho in row {
            assert!((rho - 1.0).abs() < 1e-12);
        }
    }
}
