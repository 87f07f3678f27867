//! Monte Carlo withdrawal forecaster
//!
//! Runs independent weekend withdrawal paths and aggregates their totals into
//! quantiles, VaR99 and CVaR99. Path `i` draws only from the context derived
//! for index `i`, so the forecast does not depend on the rayon thread count.

use crate::config::WithdrawalConfig;
use crate::error::{Result, SentinelError};
use crate::rng::{RngContext, Stream};
use crate::stats;
use crate::withdrawal::WithdrawalGenerator;
use crate::WithdrawalScenario;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Quantiles of total weekend withdrawals (USD)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalPercentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
}

impl WithdrawalPercentiles {
    fn from_sorted(sorted: &[f64]) -> Result<Self> {
        let q = |level: f64| {
            stats::percentile_sorted(sorted, level)
                .ok_or_else(|| SentinelError::InsufficientData("no withdrawal paths to aggregate".into()))
        };
        Ok(Self {
            p50: q(0.50)?,
            p75: q(0.75)?,
            p90: q(0.90)?,
            p95: q(0.95)?,
            p99: q(0.99)?,
            p999: q(0.999)?,
        })
    }
}

/// Aggregated result of one scenario's Monte Carlo run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalForecast {
    pub scenario: WithdrawalScenario,
    pub total_fiat: f64,
    pub n_hours: usize,

    /// Total withdrawn over the window, one entry per path
    pub total_withdrawals: Vec<f64>,

    /// Hourly totals, `hourly_paths[path][hour]`
    #[serde(skip)]
    pub hourly_paths: Vec<Vec<f64>>,

    /// 99th percentile of total withdrawals
    pub var_99: f64,

    /// Mean of totals at or above `var_99`
    pub cvar_99: f64,

    pub percentiles: WithdrawalPercentiles,
}

impl WithdrawalForecast {
    pub fn n_paths(&self) -> usize {
        self.total_withdrawals.len()
    }

    /// Withdrawal demand at an arbitrary quantile
    pub fn quantile(&self, q: f64) -> Option<f64> {
        stats::percentile(&self.total_withdrawals, q)
    }
}

/// One row of the cross-scenario comparison table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub scenario: WithdrawalScenario,
    pub median: f64,
    pub p90: f64,
    pub p95: f64,
    pub var_99: f64,
    pub cvar_99: f64,
    pub median_pct_fiat: f64,
    pub var_99_pct_fiat: f64,
}

/// Monte Carlo driver over the withdrawal generator
#[derive(Debug, Clone)]
pub struct WithdrawalForecaster {
    generator: WithdrawalGenerator,
}

impl WithdrawalForecaster {
    pub fn new(config: &WithdrawalConfig) -> Result<Self> {
        if config.n_simulations == 0 || config.weekend_hours == 0 {
            return Err(SentinelError::InvalidConfig(
                "forecaster needs positive n_simulations and weekend_hours".into(),
            ));
        }
        Ok(Self {
            generator: WithdrawalGenerator::new(config),
        })
    }

    pub fn generator(&self) -> &WithdrawalGenerator {
        &self.generator
    }

    /// Forecast total weekend withdrawals for one scenario
    pub fn forecast(
        &self,
        total_fiat: f64,
        scenario: WithdrawalScenario,
        n_paths: usize,
        n_hours: usize,
        ctx: &RngContext,
    ) -> Result<WithdrawalForecast> {
        if n_paths == 0 || n_hours == 0 {
            return Err(SentinelError::InvalidParameter(format!(
                "forecast needs at least one path and one hour, got {} paths x {} hours",
                n_paths, n_hours
            )));
        }

        let hourly_paths = (0..n_paths)
            .into_par_iter()
            .map(|i| {
                let path_ctx = ctx.derive(Stream::ForecastPath, i as u64);
                self.generator
                    .combined(total_fiat, scenario, n_hours, &path_ctx)
                    .map(|path| path.total)
            })
            .collect::<Result<Vec<_>>>()?;

        let total_withdrawals: Vec<f64> = hourly_paths.iter().map(|p| p.iter().sum()).collect();
        let sorted = stats::sorted(&total_withdrawals);
        let percentiles = WithdrawalPercentiles::from_sorted(&sorted)?;

        let var_99 = percentiles.p99;
        let cvar_99 = stats::upper_tail_mean(&total_withdrawals, var_99);

        debug!(
            scenario = scenario.name(),
            n_paths,
            p50 = percentiles.p50,
            var_99,
            cvar_99,
            "Withdrawal forecast complete"
        );

        Ok(WithdrawalForecast {
            scenario,
            total_fiat,
            n_hours,
            total_withdrawals,
            hourly_paths,
            var_99,
            cvar_99,
            percentiles,
        })
    }

    /// Forecast every withdrawal scenario with the configured path count and horizon
    ///
    /// Each scenario draws from its own derived context, in severity order.
    pub fn run_all_scenarios(&self, total_fiat: f64, ctx: &RngContext) -> Result<Vec<WithdrawalForecast>> {
        let config = self.generator.config();
        let forecasts = WithdrawalScenario::ALL
            .iter()
            .enumerate()
            .map(|(i, scenario)| {
                let scenario_ctx = ctx.derive(Stream::Scenario, i as u64);
                self.forecast(total_fiat, *scenario, config.n_simulations, config.weekend_hours, &scenario_ctx)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            n_paths = config.n_simulations,
            n_hours = config.weekend_hours,
            "Withdrawal forecasts complete"
        );
        Ok(forecasts)
    }
}

/// Comparison table across scenarios
pub fn summarize(forecasts: &[WithdrawalForecast]) -> Vec<ForecastSummary> {
    forecasts
        .iter()
        .map(|f| {
            let pct = |x: f64| if f.total_fiat > 0.0 { x / f.total_fiat } else { 0.0 };
            ForecastSummary {
                scenario: f.scenario,
                median: f.percentiles.p50,
                p90: f.percentiles.p90,
                p95: f.percentiles.p95,
                var_99: f.var_99,
                cvar_99: f.cvar_99,
                median_pct_fiat: pct(f.percentiles.p50),
                var_99_pct_fiat: pct(f.var_99),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIAT: f64 = 2.23e9;

    fn forecaster() -> WithdrawalForecaster {
        WithdrawalForecaster::new(&WithdrawalConfig::default()).unwrap()
    }

    #[test]
    fn test_forecast_shape() {
        let forecast = forecaster()
            .forecast(FIAT, WithdrawalScenario::Mild, 300, 64, &RngContext::new(42))
            .unwrap();

        assert_eq!(forecast.n_paths(), 300);
        assert_eq!(forecast.hourly_paths.len(), 300);
        assert!(forecast.hourly_paths.iter().all(|p| p.len() == 64));
        for (path, total) in forecast.hourly_paths.iter().zip(forecast.total_withdrawals.iter()) {
            assert_eq!(path.iter().sum::<f64>(), *total);
        }
    }

    #[test]
    fn test_percentiles_ordered() {
        let forecast = forecaster()
            .forecast(FIAT, WithdrawalScenario::Severe, 500, 64, &RngContext::new(42))
            .unwrap();
        let p = &forecast.percentiles;

        assert!(p.p50 <= p.p75 && p.p75 <= p.p90 && p.p90 <= p.p95);
        assert!(p.p95 <= p.p99 && p.p99 <= p.p999);
        assert_eq!(forecast.var_99, p.p99);
        assert!(forecast.cvar_99 >= forecast.var_99);
        assert!(forecast.cvar_99.is_finite());
    }

    #[test]
    fn test_single_path_tail_falls_back() {
        let forecast = forecaster()
            .forecast(FIAT, WithdrawalScenario::Normal, 1, 64, &RngContext::new(42))
            .unwrap();

        assert_eq!(forecast.cvar_99, forecast.var_99);
        assert_eq!(forecast.var_99, forecast.total_withdrawals[0]);
    }

    #[test]
    fn test_forecast_is_reproducible() {
        let f = forecaster();
        let a = f.forecast(FIAT, WithdrawalScenario::Severe, 200, 64, &RngContext::new(5)).unwrap();
        let b = f.forecast(FIAT, WithdrawalScenario::Severe, 200, 64, &RngContext::new(5)).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_paths_independent_of_batch_size() {
        let f = forecaster();
        let ctx = RngContext::new(5);
        let small = f.forecast(FIAT, WithdrawalScenario::Mild, 10, 64, &ctx).unwrap();
        let large = f.forecast(FIAT, WithdrawalScenario::Mild, 100, 64, &ctx).unwrap();

        assert_eq!(small.hourly_paths[..], large.hourly_paths[..10]);
    }

    #[test]
    fn test_zero_paths_rejected() {
        assert!(forecaster()
            .forecast(FIAT, WithdrawalScenario::Mild, 0, 64, &RngContext::new(1))
            .is_err());
    }

    #[test]
    fn test_scenarios_ordered_by_severity() {
        let config = WithdrawalConfig {
            n_simulations: 400,
            ..WithdrawalConfig::default()
        };
        let forecasts = WithdrawalForecaster::new(&config)
            .unwrap()
            .run_all_scenarios(FIAT, &RngContext::new(42))
            .unwrap();

        assert_eq!(forecasts.len(), 3);
        assert!(forecasts[0].var_99 <= forecasts[1].var_99);
        assert!(forecasts[1].var_99 <= forecasts[2].var_99);

        let summary = summarize(&forecasts);
        assert_eq!(summary[2].scenario, WithdrawalScenario::Severe);
        assert!(summary[2].var_99_pct_fiat > summary[0].var_99_pct_fiat);
    }
}
