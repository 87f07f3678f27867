//! Newsvendor reserve optimization
//!
//! Holding idle fiat costs the forgone yield; running short costs emergency
//! funding. The cost-minimizing reserve is the withdrawal quantile at the
//! critical ratio q* = emergency / (opportunity + emergency).

use crate::config::ReserveConfig;
use crate::error::{Result, SentinelError};
use crate::forecast::WithdrawalForecast;
use crate::{stats, WithdrawalScenario};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Newsvendor decision for one withdrawal distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveDecision {
    pub critical_ratio: f64,

    /// Withdrawal quantile at the critical ratio (USD)
    pub optimal_reserve: f64,

    /// Conservative alternative: mean of the top 1% of withdrawals (USD)
    pub cvar_99_reserve: f64,

    pub annual_cost_optimal_hold: f64,
    pub annual_cost_cvar_hold: f64,

    /// Annualized emergency cost of the shortfall left by the optimal reserve
    pub annual_cost_unhedged: f64,

    pub opportunity_cost_rate: f64,
    pub emergency_cost_rate: f64,
}

/// One point of the reserve cost curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostCurvePoint {
    pub reserve_level: f64,
    pub opportunity_cost: f64,
    pub shortfall_cost: f64,
    pub total_cost: f64,
}

/// Newsvendor decision for a forecast scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReserve {
    pub scenario: WithdrawalScenario,
    pub decision: ReserveDecision,
    pub optimal_pct_fiat: f64,
    pub cvar_pct_fiat: f64,
}

/// Three-layer liquidity allocation (USD)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAllocation {
    /// Fiat at the bank: max(HS, FHS) VaR
    pub instant: f64,

    /// Money market and stables: p95 withdrawals not covered by `instant`
    pub fast: f64,

    /// T-bills: p99 withdrawals plus insurance obligation not yet covered
    pub liquid: f64,

    pub total: f64,
}

/// Critical ratio for positive cost rates, strictly inside (0, 1)
pub fn critical_ratio(opportunity_cost: f64, emergency_cost: f64) -> Result<f64> {
    if !(opportunity_cost > 0.0 && opportunity_cost.is_finite()) || !(emergency_cost > 0.0 && emergency_cost.is_finite()) {
        return Err(SentinelError::InvalidParameter(format!(
            "cost rates must be positive, got opportunity {} and emergency {}",
            opportunity_cost, emergency_cost
        )));
    }
    Ok(emergency_cost / (opportunity_cost + emergency_cost))
}

/// Split a reserve across instant, fast and liquid layers
pub fn tier_allocation(
    instant_var_usd: f64,
    withdrawal_p95: f64,
    withdrawal_p99: f64,
    insurance_fund_obligation: f64,
) -> TierAllocation {
    let instant = instant_var_usd.max(0.0);
    let fast = (withdrawal_p95 - instant).max(0.0);
    let liquid = (withdrawal_p99 + insurance_fund_obligation - instant - fast).max(0.0);
    TierAllocation {
        instant,
        fast,
        liquid,
        total: instant + fast + liquid,
    }
}

/// Cost-minimizing reserve optimizer
#[derive(Debug, Clone)]
pub struct NewsvendorOptimizer {
    opportunity_cost: f64,
    emergency_cost: f64,
    events_per_year: f64,
    cost_curve_points: usize,
}

impl NewsvendorOptimizer {
    pub fn new(config: &ReserveConfig) -> Result<Self> {
        critical_ratio(config.opportunity_cost, config.emergency_cost)?;
        Ok(Self {
            opportunity_cost: config.opportunity_cost,
            emergency_cost: config.emergency_cost,
            events_per_year: config.stress_events_per_year,
            cost_curve_points: config.cost_curve_points,
        })
    }

    pub fn critical_ratio(&self) -> f64 {
        self.emergency_cost / (self.opportunity_cost + self.emergency_cost)
    }

    /// Annualized emergency cost of withdrawals above `reserve`
    fn shortfall_cost(&self, withdrawals: &[f64], reserve: f64) -> f64 {
        let expected_shortfall =
            withdrawals.iter().map(|w| (w - reserve).max(0.0)).sum::<f64>() / withdrawals.len() as f64;
        expected_shortfall * self.emergency_cost * self.events_per_year
    }

    /// Optimal and CVaR-based reserves for a withdrawal distribution
    pub fn optimal_reserve(&self, withdrawals: &[f64]) -> Result<ReserveDecision> {
        if withdrawals.is_empty() {
            return Err(SentinelError::InsufficientData("empty withdrawal distribution".into()));
        }
        let sorted = stats::sorted(withdrawals);
        let critical_ratio = self.critical_ratio();

        let optimal_reserve = stats::percentile_sorted(&sorted, critical_ratio).unwrap_or(0.0);
        let var_99 = stats::percentile_sorted(&sorted, 0.99).unwrap_or(0.0);
        let cvar_99_reserve = stats::upper_tail_mean(withdrawals, var_99);

        Ok(ReserveDecision {
            critical_ratio,
            optimal_reserve,
            cvar_99_reserve,
            annual_cost_optimal_hold: optimal_reserve * self.opportunity_cost,
            annual_cost_cvar_hold: cvar_99_reserve * self.opportunity_cost,
            annual_cost_unhedged: self.shortfall_cost(withdrawals, optimal_reserve),
            opportunity_cost_rate: self.opportunity_cost,
            emergency_cost_rate: self.emergency_cost,
        })
    }

    /// Annualized cost across reserve levels from 0 to the 99.9th percentile
    pub fn cost_curve(&self, withdrawals: &[f64]) -> Result<Vec<CostCurvePoint>> {
        let max_reserve = stats::percentile(withdrawals, 0.999)
            .ok_or_else(|| SentinelError::InsufficientData("empty withdrawal distribution".into()))?;

        Ok(stats::linspace(0.0, max_reserve, self.cost_curve_points)
            .into_iter()
            .map(|reserve_level| {
                let opportunity_cost = reserve_level * self.opportunity_cost;
                let shortfall_cost = self.shortfall_cost(withdrawals, reserve_level);
                CostCurvePoint {
                    reserve_level,
                    opportunity_cost,
                    shortfall_cost,
                    total_cost: opportunity_cost + shortfall_cost,
                }
            })
            .collect())
    }

    /// Newsvendor decision for every forecast scenario
    pub fn optimize_all(&self, forecasts: &[WithdrawalForecast]) -> Result<Vec<ScenarioReserve>> {
        forecasts
            .iter()
            .map(|f| {
                let decision = self.optimal_reserve(&f.total_withdrawals)?;
                let pct = |x: f64| if f.total_fiat > 0.0 { x / f.total_fiat } else { 0.0 };
                debug!(
                    scenario = f.scenario.name(),
                    optimal = decision.optimal_reserve,
                    cvar = decision.cvar_99_reserve,
                    "Newsvendor reserve"
                );
                Ok(ScenarioReserve {
                    scenario: f.scenario,
                    optimal_pct_fiat: pct(decision.optimal_reserve),
                    cvar_pct_fiat: pct(decision.cvar_99_reserve),
                    decision,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn optimizer() -> NewsvendorOptimizer {
        NewsvendorOptimizer::new(&ReserveConfig::default()).unwrap()
    }

    #[test]
    fn test_default_critical_ratio() {
        assert_relative_eq!(optimizer().critical_ratio(), 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_costs_rejected() {
        assert!(critical_ratio(0.0, 0.09).is_err());
        assert!(critical_ratio(0.045, -1.0).is_err());

        let config = ReserveConfig {
            emergency_cost: 0.0,
            ..ReserveConfig::default()
        };
        assert!(NewsvendorOptimizer::new(&config).is_err());
    }

    #[test]
    fn test_optimal_reserve_quantile() {
        let withdrawals: Vec<f64> = (0..=100).map(|x| x as f64).collect();
        let decision = optimizer().optimal_reserve(&withdrawals).unwrap();

        assert_relative_eq!(decision.optimal_reserve, 200.0 / 3.0, epsilon = 1e-9);
        assert!(decision.cvar_99_reserve >= decision.optimal_reserve);
        assert_relative_eq!(decision.annual_cost_optimal_hold, decision.optimal_reserve * 0.045);
        assert!(decision.annual_cost_unhedged > 0.0);
    }

    #[test]
    fn test_cost_curve_shape() {
        let withdrawals: Vec<f64> = (0..1000).map(|x| x as f64).collect();
        let curve = optimizer().cost_curve(&withdrawals).unwrap();

        assert_eq!(curve.len(), 100);
        assert_eq!(curve[0].reserve_level, 0.0);
        assert_eq!(curve[0].opportunity_cost, 0.0);
        for pair in curve.windows(2) {
            assert!(pair[1].shortfall_cost <= pair[0].shortfall_cost);
            assert!(pair[1].opportunity_cost >= pair[0].opportunity_cost);
        }
        for p in &curve {
            assert_relative_eq!(p.total_cost, p.opportunity_cost + p.shortfall_cost);
        }
    }

    #[test]
    fn test_tier_allocation() {
        let tiers = tier_allocation(100.0, 300.0, 500.0, 50.0);
        assert_eq!(tiers.instant, 100.0);
        assert_eq!(tiers.fast, 200.0);
        assert_eq!(tiers.liquid, 250.0);
        assert_eq!(tiers.total, 550.0);

        let floored = tier_allocation(1000.0, 300.0, 500.0, 0.0);
        assert_eq!(floored.fast, 0.0);
        assert_eq!(floored.liquid, 0.0);
    }

    #[test]
    fn test_empty_distribution_rejected() {
        assert!(optimizer().optimal_reserve(&[]).is_err());
        assert!(optimizer().cost_curve(&[]).is_err());
    }

    proptest! {
        #[test]
        fn prop_critical_ratio_in_unit_interval(o in 1e-6f64..10.0, e in 1e-6f64..10.0) {
            let q = critical_ratio(o, e).unwrap();
            prop_assert!(q > 0.0 && q < 1.0);
        }
    }
}
