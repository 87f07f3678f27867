//! Hybrid Value at Risk suite
//!
//! Implements four complementary methodologies on BTC daily returns:
//! - Historical VaR (HS): empirical percentile of the lookback window
//! - Filtered Historical VaR (FHS): returns standardized by their EWMA
//!   volatility and rescaled to the current EWMA volatility
//! - Stressed VaR: historical VaR inside the worst contiguous window
//! - Parametric scenario VaR: fixed per-asset shocks on portfolio weights
//!
//! Every result carries CVaR (mean loss beyond VaR), never below VaR.

use crate::config::VarConfig;
use crate::error::{Result, SentinelError};
use crate::market::{self, MarketDay};
use crate::{stats, Asset, ShockScenario};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Floor applied to EWMA volatility before standardizing
const MIN_VOLATILITY: f64 = 1e-8;

/// VaR calculation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarMethod {
    Historical,
    FilteredHistorical,
    Stressed,
    Parametric(ShockScenario),
}

/// VaR calculation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarResult {
    pub method: VarMethod,

    /// Confidence level (e.g., 0.95, 0.99)
    pub confidence_level: f64,

    /// VaR as a positive loss fraction
    pub var: f64,

    /// Mean loss at or beyond VaR (>= var)
    pub cvar: f64,

    pub var_usd: f64,
    pub cvar_usd: f64,
}

impl VarResult {
    fn new(method: VarMethod, confidence_level: f64, var: f64, cvar: f64, portfolio_value: f64) -> Self {
        Self {
            method,
            confidence_level,
            var,
            cvar,
            var_usd: var * portfolio_value,
            cvar_usd: cvar * portfolio_value,
        }
    }
}

/// Portfolio loss under one parametric shock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioLoss {
    pub scenario: ShockScenario,
    pub loss_pct: f64,
    pub loss_usd: f64,
}

/// Full output of the hybrid suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarSuiteReport {
    /// Every estimator at every configured confidence level
    pub results: Vec<VarResult>,

    pub scenario_losses: Vec<ScenarioLoss>,

    /// Confidence used for the tier reserves
    pub confidence: f64,

    /// max(HS, FHS) in USD
    pub tier1_reserve: f64,

    /// max(Stressed, worst parametric loss) in USD
    pub tier2_reserve: f64,

    pub ewma_effective_sample_size: f64,
    pub portfolio_value: f64,

    /// Inclusive date range of the stressed window
    pub stressed_window: (NaiveDate, NaiveDate),
}

impl VarSuiteReport {
    pub fn result(&self, method: VarMethod, confidence: f64) -> Option<&VarResult> {
        self.results
            .iter()
            .find(|r| r.method == method && (r.confidence_level - confidence).abs() < 1e-12)
    }

    /// Result of `method` at the tier confidence
    pub fn primary(&self, method: VarMethod) -> Option<&VarResult> {
        self.result(method, self.confidence)
    }

    pub fn scenario_loss(&self, scenario: ShockScenario) -> Option<&ScenarioLoss> {
        self.scenario_losses.iter().find(|s| s.scenario == scenario)
    }
}

/// EWMA variance recursion seeded with the first squared return
///
/// σ²₀ = r₀², σ²ₜ = λσ²ₜ₋₁ + (1 − λ)r²ₜ₋₁
pub fn ewma_variance(returns: &[f64], lambda: f64) -> Vec<f64> {
    let mut variance = Vec::with_capacity(returns.len());
    if let Some(first) = returns.first() {
        variance.push(first * first);
        for t in 1..returns.len() {
            let prev = variance[t - 1];
            variance.push(lambda * prev + (1.0 - lambda) * returns[t - 1] * returns[t - 1]);
        }
    }
    variance
}

/// Returns standardized by their EWMA volatility and rescaled to the current one
pub fn filtered_returns(returns: &[f64], lambda: f64) -> Vec<f64> {
    let variance = ewma_variance(returns, lambda);
    let current_vol = variance.last().map(|v| v.sqrt()).unwrap_or(0.0);

    returns
        .iter()
        .zip(variance.iter())
        .map(|(r, v)| {
            let vol = v.sqrt();
            let vol = if vol > 0.0 { vol } else { MIN_VOLATILITY };
            r / vol * current_vol
        })
        .collect()
}

/// Hybrid VaR calculation engine
#[derive(Debug, Clone)]
pub struct HybridVarSuite {
    config: VarConfig,
}

impl HybridVarSuite {
    pub fn new(config: &VarConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn config(&self) -> &VarConfig {
        &self.config
    }

    /// Confidence levels evaluated, ascending and deduplicated
    pub fn confidence_levels(&self) -> Vec<f64> {
        let mut levels = self.config.confidence_levels.clone();
        levels.push(self.config.confidence);
        levels.sort_by(|a, b| a.total_cmp(b));
        levels.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
        levels
    }

    fn lookback<'a>(&self, returns: &'a [f64]) -> &'a [f64] {
        &returns[returns.len().saturating_sub(self.config.lookback_days)..]
    }

    /// Historical VaR over the lookback window
    pub fn historical_var(&self, returns: &[f64], confidence: f64, portfolio_value: f64) -> Result<VarResult> {
        let recent = self.lookback(returns);
        let (var, cvar) = var_cvar(recent, confidence)?;
        Ok(VarResult::new(VarMethod::Historical, confidence, var, cvar, portfolio_value))
    }

    /// EWMA-filtered historical VaR over the lookback window
    pub fn filtered_historical_var(
        &self,
        returns: &[f64],
        confidence: f64,
        portfolio_value: f64,
    ) -> Result<VarResult> {
        let rescaled = filtered_returns(self.lookback(returns), self.config.ewma_lambda);
        let (var, cvar) = var_cvar(&rescaled, confidence)?;
        Ok(VarResult::new(VarMethod::FilteredHistorical, confidence, var, cvar, portfolio_value))
    }

    /// Historical VaR restricted to the worst contiguous window of the full history
    pub fn stressed_var(&self, returns: &[f64], confidence: f64, portfolio_value: f64) -> Result<VarResult> {
        let (start, end) = market::worst_window(returns, self.config.stressed_window_days)
            .ok_or_else(|| SentinelError::InsufficientData("no returns for stressed window".into()))?;
        let (var, cvar) = var_cvar(&returns[start..=end], confidence)?;
        Ok(VarResult::new(VarMethod::Stressed, confidence, var, cvar, portfolio_value))
    }

    /// Weighted absolute shock loss per parametric scenario
    pub fn parametric_losses(&self, portfolio_value: f64) -> Vec<ScenarioLoss> {
        let w = &self.config.portfolio_weights;
        ShockScenario::ALL
            .iter()
            .map(|scenario| {
                let s = self.config.shocks.get(*scenario);
                let loss_pct = w.btc * s.btc.abs() + w.eth * s.eth.abs() + w.alt * s.alt.abs();
                ScenarioLoss {
                    scenario: *scenario,
                    loss_pct,
                    loss_usd: loss_pct * portfolio_value,
                }
            })
            .collect()
    }

    /// Run every estimator over a market history
    pub fn compute(&self, days: &[MarketDay], portfolio_value: f64) -> Result<VarSuiteReport> {
        if days.is_empty() {
            return Err(SentinelError::InsufficientData("market history is empty".into()));
        }
        let returns = market::asset_returns(days, Asset::Btc);

        let mut results = Vec::new();
        for confidence in self.confidence_levels() {
            results.push(self.historical_var(&returns, confidence, portfolio_value)?);
            results.push(self.filtered_historical_var(&returns, confidence, portfolio_value)?);
            results.push(self.stressed_var(&returns, confidence, portfolio_value)?);
        }

        let scenario_losses = self.parametric_losses(portfolio_value);
        for loss in &scenario_losses {
            // Point estimates: no distribution beyond the shock
            for confidence in self.confidence_levels() {
                results.push(VarResult::new(
                    VarMethod::Parametric(loss.scenario),
                    confidence,
                    loss.loss_pct,
                    loss.loss_pct,
                    portfolio_value,
                ));
            }
        }

        let confidence = self.config.confidence;
        let find = |method: VarMethod| {
            results
                .iter()
                .find(|r| r.method == method && (r.confidence_level - confidence).abs() < 1e-12)
                .map(|r| r.var_usd)
                .unwrap_or(0.0)
        };
        let worst_scenario_usd = scenario_losses.iter().map(|s| s.loss_usd).fold(0.0, f64::max);
        let tier1_reserve = find(VarMethod::Historical).max(find(VarMethod::FilteredHistorical));
        let tier2_reserve = find(VarMethod::Stressed).max(worst_scenario_usd);

        let (start, end) = market::worst_window(&returns, self.config.stressed_window_days)
            .ok_or_else(|| SentinelError::InsufficientData("no returns for stressed window".into()))?;
        let stressed_window = (days[start].date, days[end].date);

        info!(tier1_reserve, tier2_reserve, portfolio_value, "VaR suite computed");
        for r in results.iter().filter(|r| (r.confidence_level - confidence).abs() < 1e-12) {
            debug!(method = ?r.method, var = r.var, cvar = r.cvar, "VaR estimate");
        }

        Ok(VarSuiteReport {
            results,
            scenario_losses,
            confidence,
            tier1_reserve,
            tier2_reserve,
            ewma_effective_sample_size: self.config.ewma_effective_sample_size(),
            portfolio_value,
            stressed_window,
        })
    }
}

fn var_cvar(returns: &[f64], confidence: f64) -> Result<(f64, f64)> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(SentinelError::InvalidConfidenceLevel(confidence));
    }
    stats::loss_var_cvar(returns, confidence)
        .ok_or_else(|| SentinelError::InsufficientData("cannot compute VaR on an empty return series".into()))
}
