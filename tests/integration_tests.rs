//! Integration tests for the weekend stress pipeline
//!
//! These tests load the shipped configurations and check end-to-end
//! properties of the report: reproducibility, scenario ordering and the
//! solvency verdicts.

use approx::assert_relative_eq;
use liquidity_sentinel::models::{generate_traders, LiquidationCascade};
use liquidity_sentinel::population::generate_accounts;
use liquidity_sentinel::{
    MarketSimulator, NewsvendorOptimizer, RngContext, Scenario, SentinelConfig, StressEngine, StressReport,
    Verdict, WithdrawalScenario,
};
use std::sync::OnceLock;

fn config_path(name: &str) -> String {
    format!("{}/configs/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn fast_config() -> SentinelConfig {
    SentinelConfig::from_file(config_path("fast.yaml")).expect("Failed to load fast config")
}

fn fast_report() -> &'static StressReport {
    static REPORT: OnceLock<StressReport> = OnceLock::new();
    REPORT.get_or_init(|| {
        StressEngine::new(fast_config())
            .and_then(|engine| engine.run())
            .expect("Stress run failed")
    })
}

#[test]
fn test_default_config_matches_builtin_defaults() {
    let config = SentinelConfig::from_file(config_path("default.yaml")).expect("Failed to load default config");
    assert_eq!(config, SentinelConfig::default());
}

#[test]
fn test_fast_config_keeps_reference_parameters() {
    let config = fast_config();

    assert_eq!(config.withdrawal.n_simulations, 1000);
    assert_eq!(config.derivatives.n_traders, 1000);
    assert_eq!(config.withdrawal.weekend_hours, 64);
    assert_eq!(config.balance_sheet, SentinelConfig::default().balance_sheet);
}

#[test]
fn test_run_is_reproducible() {
    let a = StressEngine::new(fast_config()).unwrap().run().unwrap();
    let b = StressEngine::new(fast_config()).unwrap().run().unwrap();

    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    assert_eq!(a.forecasts[2].hourly_paths, b.forecasts[2].hourly_paths);
}

#[test]
fn test_seed_changes_output() {
    let mut config = fast_config();
    config.seed = 43;
    let other = StressEngine::new(config).unwrap().run().unwrap();

    assert_ne!(other.forecasts[0].total_withdrawals, fast_report().forecasts[0].total_withdrawals);
}

#[test]
fn test_withdrawal_scenarios_ordered() {
    let report = fast_report();
    let p99 = |s| report.forecast(s).unwrap().percentiles.p99;

    assert!(p99(WithdrawalScenario::Normal) < p99(WithdrawalScenario::Mild));
    assert!(p99(WithdrawalScenario::Mild) < p99(WithdrawalScenario::Severe));
    assert!(p99(WithdrawalScenario::Severe) > 1e8);

    for forecast in &report.forecasts {
        assert!(forecast.cvar_99 >= forecast.var_99);
        assert_eq!(forecast.n_paths(), 1000);
        assert!(forecast.hourly_paths.iter().all(|p| p.len() == 64));
    }
}

#[test]
fn test_insurance_fund_under_stress() {
    let report = fast_report();
    let normal = report.insurance_outcome(Scenario::Normal).unwrap();
    let severe = report.insurance_outcome(Scenario::Severe).unwrap();

    assert_eq!(normal.exhaustion_probability, 0.0);
    assert_eq!(normal.expected_clawback, 0.0);
    assert!(severe.exhaustion_probability > 0.0);
    assert!(severe.expected_clawback > 0.0);
}

#[test]
fn test_solvency_verdicts() {
    let report = fast_report();
    let normal = report.solvency_report(Scenario::Normal).unwrap();
    let severe = report.solvency_report(Scenario::Severe).unwrap();
    let luna = report.solvency_report(Scenario::Luna).unwrap();

    assert_eq!(normal.verdict, Verdict::Solvent);
    assert_eq!(severe.verdict, Verdict::Insolvent);
    assert!(severe.min_capital_required > 0.0);

    let severe_p99 = report.forecast(WithdrawalScenario::Severe).unwrap().percentiles.p99;
    assert_relative_eq!(luna.liabilities.withdrawal_demand, severe_p99 * 1.2, max_relative = 1e-12);

    for r in &report.solvency {
        assert_relative_eq!(r.net_position, r.assets.total - r.liabilities.total, max_relative = 1e-9);
    }
}

#[test]
fn test_frontier_and_stress_consistent() {
    let report = fast_report();

    for frontier in &report.frontiers {
        assert_eq!(frontier.points.len(), 21);
        assert_eq!(frontier.points[0].failure_rate, 1.0);
        for pair in frontier.points.windows(2) {
            assert!(pair[1].failure_rate <= pair[0].failure_rate);
        }
    }
    for stress in &report.stress_tests {
        assert_relative_eq!(stress.result.failure_rate + stress.result.survive_rate, 1.0);
    }
}

#[test]
fn test_tier_allocation_covers_severe_p99() {
    let report = fast_report();
    let severe_p99 = report.forecast(WithdrawalScenario::Severe).unwrap().percentiles.p99;

    assert!(report.tiers.total >= severe_p99);
    assert_relative_eq!(
        report.tiers.total,
        report.tiers.instant + report.tiers.fast + report.tiers.liquid,
        max_relative = 1e-12
    );
}

#[test]
fn test_population_summary() {
    let population = &fast_report().population;

    assert_eq!(population.n_retail + population.n_institutional, 5000);
    assert_relative_eq!(population.total_balance, 2.9e9, max_relative = 1e-9);
    assert_relative_eq!(population.institutional_share, 0.65, max_relative = 1e-9);
    assert!(population.gini > 0.5 && population.gini < 1.0);
}

#[test]
fn test_accounts_sum_to_target() {
    let config = fast_config();
    let accounts = generate_accounts(&config.population, 1.0e9, &RngContext::new(3)).unwrap();
    let total: f64 = accounts.iter().map(|a| a.balance).sum();

    assert_relative_eq!(total, 1.0e9, max_relative = 1e-9);
    assert!(accounts.iter().all(|a| a.balance >= 0.0));
}

#[test]
fn test_zero_shock_cascade_is_inert() {
    let config = fast_config();
    let ctx = RngContext::new(11);
    let traders = generate_traders(&config.derivatives, 2.9e9, &ctx).unwrap();
    let cascade = LiquidationCascade::new(&config.derivatives);

    let result = cascade.run(&traders, 0.0, 2.9e9, 14_500_000.0, 5, &ctx).unwrap();

    assert_eq!(result.total_liquidated(), 0);
    assert_eq!(result.fund_remaining, 14_500_000.0);
    assert!(!result.exhausted);
    assert_eq!(result.clawback_required, 0.0);
}

#[test]
fn test_stationary_distribution() {
    let simulator = MarketSimulator::new(&SentinelConfig::default().market).unwrap();
    let pi = simulator.stationary_distribution();

    assert_relative_eq!(pi.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    assert!(pi[0] > 0.8 && pi[0] < 0.92);
    assert!(pi[2] < pi[1]);
}

#[test]
fn test_critical_ratio_from_defaults() {
    let optimizer = NewsvendorOptimizer::new(&SentinelConfig::default().reserve).unwrap();
    assert_relative_eq!(optimizer.critical_ratio(), 2.0 / 3.0, epsilon = 1e-12);
}

#[test]
fn test_report_json_roundtrip() {
    let report = fast_report();
    let json = report.to_json().unwrap();
    let parsed: StressReport = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.solvency.len(), 4);
    assert_eq!(parsed.seed, 42);
    assert!(parsed.forecasts.iter().all(|f| f.hourly_paths.is_empty()));
}
