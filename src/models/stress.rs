//! Hour-by-hour stress testing and safety frontier
//!
//! Tracks cumulative withdrawals against a fixed reserve on every Monte Carlo
//! path:
//! - Failure rate: share of paths whose cumulative outflow exceeds the reserve
//! - Time to insolvency (TTI): first breached hour, conditional on failure
//! - Safety frontier: failure rate swept across reserve levels

use crate::config::StressConfig;
use crate::error::{Result, SentinelError};
use crate::forecast::WithdrawalForecast;
use crate::{stats, WithdrawalScenario};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// TTI statistics over breached paths (hours)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtiSummary {
    pub mean: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
}

/// Result of a stress test at one reserve level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestResult {
    pub reserve_level: f64,
    pub n_paths: usize,
    pub failure_rate: f64,
    pub survive_rate: f64,

    /// Breach hour of every failed path
    pub tti_distribution: Vec<f64>,

    /// `None` when every path survives
    pub tti: Option<TtiSummary>,
}

/// One point of the safety frontier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub reserve_level: f64,
    pub reserve_pct_aum: f64,
    pub failure_rate: f64,
}

/// Reserve policy compared in the stress summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservePolicy {
    /// Withdrawal quantile at the newsvendor critical ratio
    Newsvendor,
    /// CVaR99 of total withdrawals
    Conservative,
    /// Fixed share of fiat liabilities
    Industry,
}

/// Stress test of one scenario under one policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStress {
    pub scenario: WithdrawalScenario,
    pub policy: ReservePolicy,
    pub result: StressTestResult,
}

/// First hour whose cumulative withdrawal exceeds `reserve`
pub fn time_to_insolvency(hourly: &[f64], reserve: f64) -> Option<usize> {
    let mut cumulative = 0.0;
    for (hour, amount) in hourly.iter().enumerate() {
        cumulative += amount;
        if cumulative > reserve {
            return Some(hour);
        }
    }
    None
}

/// Failure rate and TTI distribution at a fixed reserve
pub fn run_stress_test(hourly_paths: &[Vec<f64>], reserve_level: f64) -> Result<StressTestResult> {
    if hourly_paths.is_empty() {
        return Err(SentinelError::InsufficientData("no withdrawal paths to stress".into()));
    }

    let tti_distribution: Vec<f64> = hourly_paths
        .iter()
        .filter_map(|path| time_to_insolvency(path, reserve_level))
        .map(|hour| hour as f64)
        .collect();

    let n_paths = hourly_paths.len();
    let failure_rate = tti_distribution.len() as f64 / n_paths as f64;

    let tti = if tti_distribution.is_empty() {
        None
    } else {
        let sorted = stats::sorted(&tti_distribution);
        let q = |level: f64| stats::percentile_sorted(&sorted, level).unwrap_or(0.0);
        Some(TtiSummary {
            mean: stats::mean(&tti_distribution).unwrap_or(0.0),
            p25: q(0.25),
            p50: q(0.50),
            p75: q(0.75),
        })
    };

    Ok(StressTestResult {
        reserve_level,
        n_paths,
        failure_rate,
        survive_rate: 1.0 - failure_rate,
        tti_distribution,
        tti,
    })
}

/// Failure rate at `n_points` reserve levels from 0 to `max_reserve_pct` of fiat
pub fn safety_frontier(
    hourly_paths: &[Vec<f64>],
    total_fiat: f64,
    n_points: usize,
    max_reserve_pct: f64,
) -> Result<Vec<FrontierPoint>> {
    if !(total_fiat > 0.0 && total_fiat.is_finite()) {
        return Err(SentinelError::InvalidParameter(format!("total fiat must be positive, got {}", total_fiat)));
    }

    stats::linspace(0.0, total_fiat * max_reserve_pct, n_points)
        .into_par_iter()
        .map(|reserve_level| {
            run_stress_test(hourly_paths, reserve_level).map(|r| FrontierPoint {
                reserve_level,
                reserve_pct_aum: reserve_level / total_fiat,
                failure_rate: r.failure_rate,
            })
        })
        .collect()
}

/// Smallest frontier reserve whose failure rate is at or below `target`
pub fn reserve_for_failure_rate(frontier: &[FrontierPoint], target: f64) -> Option<&FrontierPoint> {
    frontier.iter().find(|p| p.failure_rate <= target)
}

/// Stress and frontier settings bound to a fiat base
#[derive(Debug, Clone)]
pub struct StressTester {
    config: StressConfig,
    industry_reserve_pct: f64,
}

impl StressTester {
    pub fn new(config: &StressConfig, industry_reserve_pct: f64) -> Self {
        Self {
            config: config.clone(),
            industry_reserve_pct,
        }
    }

    /// Frontier of one forecast with the configured resolution
    pub fn frontier(&self, forecast: &WithdrawalForecast) -> Result<Vec<FrontierPoint>> {
        safety_frontier(
            &forecast.hourly_paths,
            forecast.total_fiat,
            self.config.frontier_points,
            self.config.frontier_max_reserve_pct,
        )
    }

    /// Reserve level a policy assigns to a forecast
    pub fn policy_reserve(&self, forecast: &WithdrawalForecast, policy: ReservePolicy, critical_ratio: f64) -> f64 {
        match policy {
            ReservePolicy::Newsvendor => forecast.quantile(critical_ratio).unwrap_or(0.0),
            ReservePolicy::Conservative => forecast.cvar_99,
            ReservePolicy::Industry => forecast.total_fiat * self.industry_reserve_pct,
        }
    }

    /// Every scenario under every reserve policy
    pub fn run_all(&self, forecasts: &[WithdrawalForecast], critical_ratio: f64) -> Result<Vec<ScenarioStress>> {
        let policies = [ReservePolicy::Newsvendor, ReservePolicy::Conservative, ReservePolicy::Industry];

        let mut out = Vec::with_capacity(forecasts.len() * policies.len());
        for forecast in forecasts {
            for policy in policies {
                let reserve = self.policy_reserve(forecast, policy, critical_ratio);
                let result = run_stress_test(&forecast.hourly_paths, reserve)?;
                debug!(
                    scenario = forecast.scenario.name(),
                    policy = ?policy,
                    reserve,
                    failure_rate = result.failure_rate,
                    "Stress test"
                );
                out.push(ScenarioStress {
                    scenario: forecast.scenario,
                    policy,
                    result,
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn paths() -> Vec<Vec<f64>> {
        vec![
            vec![10.0, 10.0, 10.0, 10.0],
            vec![30.0, 0.0, 0.0, 0.0],
            vec![1.0, 1.0, 1.0, 1.0],
            vec![0.0, 0.0, 0.0, 50.0],
        ]
    }

    #[test]
    fn test_time_to_insolvency() {
        assert_eq!(time_to_insolvency(&[10.0, 10.0, 10.0], 15.0), Some(1));
        assert_eq!(time_to_insolvency(&[10.0, 10.0, 10.0], 30.0), None);
        assert_eq!(time_to_insolvency(&[10.0], 9.9), Some(0));
        assert_eq!(time_to_insolvency(&[], 0.0), None);
    }

    #[test]
    fn test_stress_failure_rate() {
        let result = run_stress_test(&paths(), 25.0).unwrap();

        assert_eq!(result.n_paths, 4);
        assert_relative_eq!(result.failure_rate, 0.75);
        assert_relative_eq!(result.survive_rate, 0.25);
        assert_eq!(result.tti_distribution, vec![2.0, 0.0, 3.0]);

        let tti = result.tti.unwrap();
        assert_relative_eq!(tti.mean, 5.0 / 3.0);
        assert_relative_eq!(tti.p50, 2.0);
    }

    #[test]
    fn test_all_paths_survive() {
        let result = run_stress_test(&paths(), 1_000.0).unwrap();

        assert_eq!(result.failure_rate, 0.0);
        assert!(result.tti.is_none());
        assert!(result.tti_distribution.is_empty());
    }

    #[test]
    fn test_empty_paths_rejected() {
        assert!(run_stress_test(&[], 1.0).is_err());
    }

    #[test]
    fn test_frontier_monotone() {
        let frontier = safety_frontier(&paths(), 100.0, 11, 0.6).unwrap();

        assert_eq!(frontier.len(), 11);
        assert_eq!(frontier[0].reserve_level, 0.0);
        assert_relative_eq!(frontier[10].reserve_pct_aum, 0.6);
        assert_eq!(frontier[0].failure_rate, 1.0);
        for pair in frontier.windows(2) {
            assert!(pair[1].failure_rate <= pair[0].failure_rate);
        }
    }

    #[test]
    fn test_reserve_for_failure_rate() {
        let frontier = safety_frontier(&paths(), 100.0, 11, 0.6).unwrap();

        let point = reserve_for_failure_rate(&frontier, 0.0).unwrap();
        assert!(point.reserve_level >= 50.0);
        assert_eq!(point.failure_rate, 0.0);

        let loose = reserve_for_failure_rate(&frontier, 1.0).unwrap();
        assert_eq!(loose.reserve_level, 0.0);

        assert!(reserve_for_failure_rate(&frontier[..1], 0.5).is_none());
    }
}
