//! Weekend withdrawal processes
//!
//! Two independent hourly processes:
//! - Retail: continuous Gamma flow whose mean comes from a daily rate drawn
//!   uniformly from the scenario range and whose variance comes from the
//!   scenario burstiness (coefficient of variation).
//! - Institutional: Poisson arrivals per hour with log-normal jump sizes,
//!   each jump capped at a fraction of total fiat.
//!
//! Institutional outflows lead the retail window: the institutional series
//! is generated for `n_hours + lead_time_hours` and truncated to the first
//! `n_hours`.

use crate::config::{WithdrawalConfig, WithdrawalScenarioParams};
use crate::error::{Result, SentinelError};
use crate::rng::{RngContext, Stream};
use crate::WithdrawalScenario;
use rand::Rng;
use rand_distr::{Distribution, Gamma, LogNormal, Poisson};
use serde::{Deserialize, Serialize};

/// Hourly withdrawal series for one simulated weekend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalPath {
    pub retail: Vec<f64>,
    pub institutional: Vec<f64>,
    pub total: Vec<f64>,
}

impl WithdrawalPath {
    pub fn n_hours(&self) -> usize {
        self.total.len()
    }

    /// Total withdrawn over the whole window
    pub fn total_withdrawn(&self) -> f64 {
        self.total.iter().sum()
    }

    /// Running total of withdrawals by hour
    pub fn cumulative(&self) -> Vec<f64> {
        self.total
            .iter()
            .scan(0.0, |acc, x| {
                *acc += x;
                Some(*acc)
            })
            .collect()
    }

    /// Rows of (hour, retail, institutional, total)
    pub fn rows(&self) -> impl Iterator<Item = (usize, f64, f64, f64)> + '_ {
        self.retail
            .iter()
            .zip(self.institutional.iter())
            .zip(self.total.iter())
            .enumerate()
            .map(|(hour, ((r, i), t))| (hour, *r, *i, *t))
    }
}

/// Retail and institutional withdrawal generator
#[derive(Debug, Clone)]
pub struct WithdrawalGenerator {
    config: WithdrawalConfig,
}

impl WithdrawalGenerator {
    pub fn new(config: &WithdrawalConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn config(&self) -> &WithdrawalConfig {
        &self.config
    }

    fn params(&self, scenario: WithdrawalScenario) -> &WithdrawalScenarioParams {
        self.config.scenarios.get(scenario)
    }

    /// Hourly retail withdrawals (USD)
    pub fn retail(
        &self,
        total_fiat: f64,
        scenario: WithdrawalScenario,
        n_hours: usize,
        ctx: &RngContext,
    ) -> Result<Vec<f64>> {
        validate_fiat(total_fiat)?;
        let params = self.params(scenario);
        let mut rng = ctx.stream(Stream::Retail, 0);

        let daily_rate = if params.daily_rate_max > params.daily_rate_min {
            rng.gen_range(params.daily_rate_min..params.daily_rate_max)
        } else {
            params.daily_rate_min
        };
        let hourly_mean = daily_rate * total_fiat / 24.0;
        if hourly_mean <= 0.0 {
            return Ok(vec![0.0; n_hours]);
        }

        // mean = shape * scale, variance = (cv * mean)^2
        let cv = params.burstiness_cv;
        let shape = 1.0 / (cv * cv);
        let scale = hourly_mean * cv * cv;
        let gamma = Gamma::new(shape, scale).map_err(|e| SentinelError::Distribution(e.to_string()))?;

        Ok((0..n_hours).map(|_| gamma.sample(&mut rng)).collect())
    }

    /// Hourly institutional withdrawals (USD)
    pub fn institutional(
        &self,
        total_fiat: f64,
        scenario: WithdrawalScenario,
        n_hours: usize,
        ctx: &RngContext,
    ) -> Result<Vec<f64>> {
        validate_fiat(total_fiat)?;
        let params = self.params(scenario);
        let rate_per_hour = params.jump_rate_per_day / 24.0;
        if rate_per_hour <= 0.0 {
            return Ok(vec![0.0; n_hours]);
        }

        let arrivals = Poisson::new(rate_per_hour).map_err(|e| SentinelError::Distribution(e.to_string()))?;
        let jump = LogNormal::new(params.jump_log_mu, params.jump_log_sigma)
            .map_err(|e| SentinelError::Distribution(e.to_string()))?;
        let cap = total_fiat * self.config.max_jump_fraction;

        let mut rng = ctx.stream(Stream::Institutional, 0);
        let mut hourly = Vec::with_capacity(n_hours);
        for _ in 0..n_hours {
            let n: f64 = arrivals.sample(&mut rng);
            let amount: f64 = (0..n as u64).map(|_| jump.sample(&mut rng).min(cap)).sum();
            hourly.push(amount);
        }

        Ok(hourly)
    }

    /// Both processes combined, with the institutional lead applied
    pub fn combined(
        &self,
        total_fiat: f64,
        scenario: WithdrawalScenario,
        n_hours: usize,
        ctx: &RngContext,
    ) -> Result<WithdrawalPath> {
        let lead = self.params(scenario).lead_time_hours;

        let retail = self.retail(total_fiat, scenario, n_hours, ctx)?;
        let mut institutional = self.institutional(total_fiat, scenario, n_hours + lead, ctx)?;
        institutional.truncate(n_hours);

        let total = retail.iter().zip(institutional.iter()).map(|(r, i)| r + i).collect();

        Ok(WithdrawalPath {
            retail,
            institutional,
            total,
        })
    }
}

fn validate_fiat(total_fiat: f64) -> Result<()> {
    if total_fiat.is_finite() && total_fiat >= 0.0 {
        Ok(())
    } else {
        Err(SentinelError::InvalidParameter(format!(
            "total fiat must be non-negative, got {}",
            total_fiat
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FIAT: f64 = 2.23e9;

    fn generator() -> WithdrawalGenerator {
        WithdrawalGenerator::new(&WithdrawalConfig::default())
    }

    #[test]
    fn test_retail_is_non_negative() {
        let retail = generator()
            .retail(FIAT, WithdrawalScenario::Severe, 64, &RngContext::new(42))
            .unwrap();

        assert_eq!(retail.len(), 64);
        assert!(retail.iter().all(|x| *x >= 0.0 && x.is_finite()));
    }

    #[test]
    fn test_retail_mean_tracks_rate() {
        // Long horizon so the Gamma sample mean settles near the hourly mean
        let retail = generator()
            .retail(FIAT, WithdrawalScenario::Normal, 20_000, &RngContext::new(3))
            .unwrap();
        let mean = retail.iter().sum::<f64>() / retail.len() as f64;

        let low = 0.01 * FIAT / 24.0;
        let high = 0.03 * FIAT / 24.0;
        assert!(mean > low * 0.95 && mean < high * 1.05, "mean {}", mean);
    }

    #[test]
    fn test_zero_fiat_gives_zero_flow() {
        let g = generator();
        let ctx = RngContext::new(1);

        assert!(g.retail(0.0, WithdrawalScenario::Mild, 10, &ctx).unwrap().iter().all(|x| *x == 0.0));
        assert!(g.retail(-1.0, WithdrawalScenario::Mild, 10, &ctx).is_err());
    }

    #[test]
    fn test_institutional_jump_cap() {
        let mut config = WithdrawalConfig::default();
        config.scenarios.severe.jump_log_mu = 25.0;
        let g = WithdrawalGenerator::new(&config);

        let fiat = 1e6;
        let inst = g
            .institutional(fiat, WithdrawalScenario::Severe, 500, &RngContext::new(5))
            .unwrap();

        let cap = fiat * 0.15;
        for amount in inst {
            let jumps = (amount / cap).round();
            assert_relative_eq!(amount, jumps * cap, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_zero_jump_rate() {
        let mut config = WithdrawalConfig::default();
        config.scenarios.normal.jump_rate_per_day = 0.0;
        let inst = WithdrawalGenerator::new(&config)
            .institutional(FIAT, WithdrawalScenario::Normal, 64, &RngContext::new(5))
            .unwrap();

        assert_eq!(inst, vec![0.0; 64]);
    }

    #[test]
    fn test_lead_time_truncation_point() {
        let g = generator();
        let ctx = RngContext::new(77);

        for scenario in WithdrawalScenario::ALL {
            let path = g.combined(FIAT, scenario, 64, &ctx).unwrap();
            let lead = g.config().scenarios.get(scenario).lead_time_hours;
            let full = g.institutional(FIAT, scenario, 64 + lead, &ctx).unwrap();

            assert_eq!(path.institutional.len(), 64);
            assert_eq!(path.institutional[..], full[..64]);
            assert_eq!(path.institutional, g.institutional(FIAT, scenario, 64, &ctx).unwrap());
        }
    }

    #[test]
    fn test_combined_totals() {
        let path = generator()
            .combined(FIAT, WithdrawalScenario::Mild, 64, &RngContext::new(8))
            .unwrap();

        assert_eq!(path.n_hours(), 64);
        for (_, r, i, t) in path.rows() {
            assert_eq!(t, r + i);
        }
        let cumulative = path.cumulative();
        assert_relative_eq!(cumulative[63], path.total_withdrawn(), max_relative = 1e-12);
    }

    #[test]
    fn test_combined_is_reproducible() {
        let g = generator();
        let a = g.combined(FIAT, WithdrawalScenario::Severe, 64, &RngContext::new(4)).unwrap();
        let b = g.combined(FIAT, WithdrawalScenario::Severe, 64, &RngContext::new(4)).unwrap();
        assert_eq!(a, b);
    }
}
