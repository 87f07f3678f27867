//! Insurance fund Monte Carlo
//!
//! Repeats the liquidation cascade across noisy draws of each scenario's BTC
//! shock to estimate exhaustion probability and expected clawback. The trader
//! book is generated once and shared read-only by every trial.

use super::cascade::{generate_traders, LiquidationCascade, Trader};
use crate::config::{AssetShock, DerivativesConfig, SentinelConfig, ShockTable};
use crate::error::{Result, SentinelError};
use crate::rng::{RngContext, Stream};
use crate::{stats, Scenario};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Aggregated cascade outcomes for one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuranceFundOutcome {
    pub scenario: Scenario,

    /// Base BTC shock before noise (0 for normal markets)
    pub base_shock: f64,

    pub if_initial: f64,
    pub n_trials: usize,

    /// Fund drawdown per trial (USD)
    pub drawdown_distribution: Vec<f64>,

    pub exhaustion_probability: f64,
    pub expected_clawback: f64,
    pub mean_drawdown: f64,
    pub p99_drawdown: f64,
    pub mean_final_shock: f64,
}

struct TrialOutcome {
    drawdown: f64,
    exhausted: bool,
    clawback: f64,
    final_shock: f64,
}

/// Monte Carlo driver over the liquidation cascade
#[derive(Debug, Clone)]
pub struct InsuranceFundSimulator {
    derivatives: DerivativesConfig,
    shocks: ShockTable<AssetShock>,
    insurance_fund_ratio: f64,
    cascade: LiquidationCascade,
}

impl InsuranceFundSimulator {
    pub fn new(config: &SentinelConfig) -> Self {
        Self {
            derivatives: config.derivatives.clone(),
            shocks: config.var.shocks.clone(),
            insurance_fund_ratio: config.balance_sheet.insurance_fund_ratio,
            cascade: LiquidationCascade::new(&config.derivatives),
        }
    }

    /// Base BTC shock for a scenario
    pub fn base_shock(&self, scenario: Scenario) -> f64 {
        scenario.shock().map(|s| self.shocks.get(s).btc).unwrap_or(0.0)
    }

    /// Generate the shared trader book for `aum`
    pub fn traders(&self, aum: f64, ctx: &RngContext) -> Result<Vec<Trader>> {
        generate_traders(&self.derivatives, aum, ctx)
    }

    /// Run `n_trials` noisy cascades for one scenario
    pub fn simulate_scenario(
        &self,
        traders: &[Trader],
        scenario: Scenario,
        aum: f64,
        n_trials: usize,
        ctx: &RngContext,
    ) -> Result<InsuranceFundOutcome> {
        if n_trials == 0 {
            return Err(SentinelError::InvalidParameter("n_trials must be positive".into()));
        }

        let if_initial = aum * self.insurance_fund_ratio;
        let base_shock = self.base_shock(scenario);
        let (noise_low, noise_high) = (self.derivatives.shock_noise_low, self.derivatives.shock_noise_high);

        let trials = (0..n_trials)
            .into_par_iter()
            .map(|i| -> Result<TrialOutcome> {
                let trial_ctx = ctx.derive(Stream::InsuranceTrial, i as u64);
                let mut rng = trial_ctx.stream(Stream::InsuranceTrial, 0);
                let noise = if noise_high > noise_low {
                    rng.gen_range(noise_low..noise_high)
                } else {
                    noise_low
                };

                let result = self.cascade.run(
                    traders,
                    base_shock * noise,
                    aum,
                    if_initial,
                    self.derivatives.cascade_steps,
                    &trial_ctx,
                )?;

                Ok(TrialOutcome {
                    drawdown: result.if_drawdown,
                    exhausted: result.exhausted,
                    clawback: result.clawback_required,
                    final_shock: result.final_shock,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let n = trials.len() as f64;
        let drawdown_distribution: Vec<f64> = trials.iter().map(|t| t.drawdown).collect();
        let exhaustion_probability = trials.iter().filter(|t| t.exhausted).count() as f64 / n;
        let expected_clawback = trials.iter().map(|t| t.clawback).sum::<f64>() / n;
        let mean_final_shock = trials.iter().map(|t| t.final_shock).sum::<f64>() / n;
        let mean_drawdown = stats::mean(&drawdown_distribution).unwrap_or(0.0);
        let p99_drawdown = stats::percentile(&drawdown_distribution, 0.99).unwrap_or(0.0);

        debug!(
            scenario = scenario.name(),
            base_shock,
            exhaustion_probability,
            expected_clawback,
            "Insurance fund scenario simulated"
        );

        Ok(InsuranceFundOutcome {
            scenario,
            base_shock,
            if_initial,
            n_trials,
            drawdown_distribution,
            exhaustion_probability,
            expected_clawback,
            mean_drawdown,
            p99_drawdown,
            mean_final_shock,
        })
    }

    /// Simulate every scenario against one shared trader book
    pub fn simulate(&self, aum: f64, n_trials: usize, ctx: &RngContext) -> Result<Vec<InsuranceFundOutcome>> {
        let traders = self.traders(aum, ctx)?;

        let outcomes = Scenario::ALL
            .iter()
            .enumerate()
            .map(|(i, scenario)| {
                let scenario_ctx = ctx.derive(Stream::Scenario, i as u64);
                self.simulate_scenario(&traders, *scenario, aum, n_trials, &scenario_ctx)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            n_traders = traders.len(),
            n_trials,
            if_initial = aum * self.insurance_fund_ratio,
            "Insurance fund simulated"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUM: f64 = 2.9e9;

    fn simulator() -> InsuranceFundSimulator {
        let mut config = SentinelConfig::default();
        config.derivatives.n_traders = 1_000;
        InsuranceFundSimulator::new(&config)
    }

    #[test]
    fn test_base_shocks() {
        let sim = simulator();
        assert_eq!(sim.base_shock(Scenario::Normal), 0.0);
        assert_eq!(sim.base_shock(Scenario::Mild), -0.25);
        assert_eq!(sim.base_shock(Scenario::Severe), -0.50);
        assert_eq!(sim.base_shock(Scenario::Luna), -0.40);
    }

    #[test]
    fn test_normal_scenario_never_exhausts() {
        let sim = simulator();
        let ctx = RngContext::new(42);
        let traders = sim.traders(AUM, &ctx).unwrap();
        let outcome = sim.simulate_scenario(&traders, Scenario::Normal, AUM, 50, &ctx).unwrap();

        assert_eq!(outcome.exhaustion_probability, 0.0);
        assert_eq!(outcome.expected_clawback, 0.0);
        assert_eq!(outcome.mean_drawdown, 0.0);
        assert_eq!(outcome.mean_final_shock, 0.0);
    }

    #[test]
    fn test_exhaustion_ordered_by_severity() {
        let outcomes = simulator().simulate(AUM, 100, &RngContext::new(42)).unwrap();

        assert_eq!(outcomes.len(), 4);
        let by = |s: Scenario| outcomes.iter().find(|o| o.scenario == s).unwrap();
        let normal = by(Scenario::Normal);
        let mild = by(Scenario::Mild);
        let severe = by(Scenario::Severe);

        assert!(normal.exhaustion_probability <= mild.exhaustion_probability);
        assert!(mild.exhaustion_probability <= severe.exhaustion_probability);
        assert!(severe.exhaustion_probability > 0.0);
        assert!(severe.expected_clawback >= mild.expected_clawback);
    }

    #[test]
    fn test_drawdown_bounded_by_fund() {
        let outcomes = simulator().simulate(AUM, 50, &RngContext::new(7)).unwrap();

        for outcome in outcomes {
            assert_eq!(outcome.drawdown_distribution.len(), 50);
            for d in &outcome.drawdown_distribution {
                assert!(*d >= 0.0 && *d <= outcome.if_initial);
            }
            assert!(outcome.p99_drawdown <= outcome.if_initial);
            assert!((0.0..=1.0).contains(&outcome.exhaustion_probability));
        }
    }

    #[test]
    fn test_simulation_is_reproducible() {
        let sim = simulator();
        let a = sim.simulate(AUM, 30, &RngContext::new(9)).unwrap();
        let b = sim.simulate(AUM, 30, &RngContext::new(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_trials_rejected() {
        let sim = simulator();
        let ctx = RngContext::new(1);
        let traders = sim.traders(AUM, &ctx).unwrap();
        assert!(sim.simulate_scenario(&traders, Scenario::Mild, AUM, 0, &ctx).is_err());
    }
}
