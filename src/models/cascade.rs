//! Leveraged trader book and liquidation cascade
//!
//! A price shock pushes under-margined positions into liquidation. Forced
//! selling moves the price further, which can liquidate more positions on the
//! next round. The insurance fund absorbs each round's shortfall until it
//! runs dry; anything left over is a clawback candidate.

use crate::config::{DerivativesConfig, LeverageDistribution};
use crate::error::{Result, SentinelError};
use crate::rng::{RngContext, Stream};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, LogNormal};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal as StatrsNormal};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraderType {
    Retail,
    Institutional,
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

/// Leveraged derivatives position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trader {
    pub id: usize,
    pub trader_type: TraderType,
    pub margin: f64,
    pub leverage: f64,
    pub notional: f64,
    pub side: Side,
}

impl Trader {
    /// Mark-to-market P&L under a fractional price change
    pub fn pnl(&self, shock: f64) -> f64 {
        self.side.sign() * shock * self.notional
    }

    /// Margin left after the shock; liquidated at or below zero
    pub fn net_margin(&self, shock: f64) -> f64 {
        self.margin + self.pnl(shock)
    }
}

/// One liquidation round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeStep {
    /// 1-based round number
    pub step: usize,
    pub n_liquidated: usize,
    pub step_shortfall: f64,
    pub if_absorbed: f64,
    pub if_remaining: f64,
    pub shortfall_after_if: f64,
    pub liq_notional: f64,

    /// Shock applied during this round
    pub cumulative_shock: f64,
}

/// Outcome of a full cascade run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeResult {
    pub history: Vec<CascadeStep>,
    pub initial_shock: f64,
    pub final_shock: f64,
    pub total_shortfall: f64,
    pub if_initial: f64,
    pub fund_remaining: f64,
    pub if_drawdown: f64,
    pub exhausted: bool,
    pub clawback_required: f64,
}

impl CascadeResult {
    pub fn total_liquidated(&self) -> usize {
        self.history.iter().map(|s| s.n_liquidated).sum()
    }
}

/// Generate the trader book
///
/// Total open interest is `aum * oi_to_aum_ratio`, split between groups by
/// the institutional notional share. Each group's notional sums to its
/// target exactly and every margin equals notional / leverage.
pub fn generate_traders(config: &DerivativesConfig, aum: f64, ctx: &RngContext) -> Result<Vec<Trader>> {
    if !(aum.is_finite() && aum > 0.0) {
        return Err(SentinelError::InvalidParameter(format!("AUM must be positive, got {}", aum)));
    }

    let (n_retail, n_inst) = config.split();
    if n_retail == 0 || n_inst == 0 {
        return Err(SentinelError::InvalidConfig(format!(
            "trader split leaves an empty group: {} retail, {} institutional",
            n_retail, n_inst
        )));
    }

    let total_oi = aum * config.oi_to_aum_ratio;
    let inst_target = total_oi * config.inst_notional_share;
    let retail_target = total_oi - inst_target;

    let mut rng = ctx.stream(Stream::Traders, 0);

    let retail_leverage = truncated_normal(&config.retail_leverage, n_retail, &mut rng)?;
    let retail_notional = scaled_lognormal(retail_target, n_retail, config.retail_notional_log_sigma, &mut rng)?;
    let inst_leverage = truncated_normal(&config.inst_leverage, n_inst, &mut rng)?;
    let inst_notional = scaled_lognormal(inst_target, n_inst, config.inst_notional_log_sigma, &mut rng)?;

    let groups = [
        (TraderType::Retail, retail_leverage, retail_notional),
        (TraderType::Institutional, inst_leverage, inst_notional),
    ];

    let mut traders = Vec::with_capacity(config.n_traders);
    for (trader_type, leverage, notional) in groups {
        for (lev, notional) in leverage.into_iter().zip(notional) {
            let side = if rng.gen_bool(0.5) { Side::Long } else { Side::Short };
            traders.push(Trader {
                id: traders.len(),
                trader_type,
                margin: notional / lev,
                leverage: lev,
                notional,
                side,
            });
        }
    }

    debug!(n_retail, n_inst, total_oi, "Trader book generated");
    Ok(traders)
}

/// Inverse-CDF sampling of a normal truncated to `[min, max]`
fn truncated_normal(dist: &LeverageDistribution, n: usize, rng: &mut ChaCha8Rng) -> Result<Vec<f64>> {
    let normal = StatrsNormal::new(dist.mean, dist.std).map_err(|e| SentinelError::Distribution(e.to_string()))?;
    let lo = normal.cdf(dist.min);
    let hi = normal.cdf(dist.max);

    Ok((0..n)
        .map(|_| {
            let u = if hi > lo { rng.gen_range(lo..hi) } else { lo };
            normal.inverse_cdf(u).clamp(dist.min, dist.max)
        })
        .collect())
}

/// Log-normal draws rescaled to sum to `target`
fn scaled_lognormal(target: f64, n: usize, sigma: f64, rng: &mut ChaCha8Rng) -> Result<Vec<f64>> {
    let mu = (target / n as f64).ln() - 0.5;
    let dist = LogNormal::new(mu, sigma).map_err(|e| SentinelError::Distribution(e.to_string()))?;

    let raw: Vec<f64> = (0..n).map(|_| dist.sample(rng)).collect();
    let sum: f64 = raw.iter().sum();
    if !(sum > 0.0 && sum.is_finite()) {
        return Err(SentinelError::NumericalInstability(format!("notional draws summed to {}", sum)));
    }
    Ok(raw.into_iter().map(|x| x / sum * target).collect())
}

/// Multi-round liquidation simulator with market-impact feedback
#[derive(Debug, Clone)]
pub struct LiquidationCascade {
    oi_to_aum_ratio: f64,
    impact_factor: f64,
    impact_noise_max: f64,
}

impl LiquidationCascade {
    pub fn new(config: &DerivativesConfig) -> Self {
        Self {
            oi_to_aum_ratio: config.oi_to_aum_ratio,
            impact_factor: config.impact_factor,
            impact_noise_max: config.impact_noise_max,
        }
    }

    /// Run up to `n_steps` liquidation rounds from `initial_shock`
    ///
    /// Stops after the first round that liquidates nobody. Each trader is
    /// liquidated at most once.
    pub fn run(
        &self,
        traders: &[Trader],
        initial_shock: f64,
        aum: f64,
        insurance_fund_initial: f64,
        n_steps: usize,
        ctx: &RngContext,
    ) -> Result<CascadeResult> {
        if !initial_shock.is_finite() {
            return Err(SentinelError::InvalidParameter(format!("shock must be finite, got {}", initial_shock)));
        }
        if !(insurance_fund_initial.is_finite() && insurance_fund_initial >= 0.0) {
            return Err(SentinelError::InvalidParameter(format!(
                "insurance fund must be non-negative, got {}",
                insurance_fund_initial
            )));
        }

        let mut rng = ctx.stream(Stream::CascadeImpact, 0);
        let total_oi = aum * self.oi_to_aum_ratio;

        let mut fund = insurance_fund_initial;
        let mut shock = initial_shock;
        let mut liquidated = vec![false; traders.len()];
        let mut history = Vec::with_capacity(n_steps);

        for step in 1..=n_steps {
            let mut n_liquidated = 0;
            let mut step_shortfall = 0.0;
            let mut liq_notional = 0.0;

            for (trader, done) in traders.iter().zip(liquidated.iter_mut()) {
                if *done {
                    continue;
                }
                let net = trader.net_margin(shock);
                if net <= 0.0 {
                    *done = true;
                    n_liquidated += 1;
                    step_shortfall += -net;
                    liq_notional += trader.notional;
                }
            }

            let if_absorbed = step_shortfall.min(fund);
            fund -= if_absorbed;

            history.push(CascadeStep {
                step,
                n_liquidated,
                step_shortfall,
                if_absorbed,
                if_remaining: fund,
                shortfall_after_if: step_shortfall - if_absorbed,
                liq_notional,
                cumulative_shock: shock,
            });

            if total_oi > 0.0 && liq_notional > 0.0 {
                let noise = 1.0 + rng.gen_range(0.0..=self.impact_noise_max);
                shock -= liq_notional / total_oi * self.impact_factor * noise;
            }

            if n_liquidated == 0 {
                break;
            }
        }

        let total_shortfall: f64 = history.iter().map(|s| s.step_shortfall).sum();
        let result = CascadeResult {
            history,
            initial_shock,
            final_shock: shock,
            total_shortfall,
            if_initial: insurance_fund_initial,
            fund_remaining: fund,
            if_drawdown: insurance_fund_initial - fund,
            exhausted: fund <= 0.0,
            clawback_required: (total_shortfall - insurance_fund_initial).max(0.0),
        };

        debug!(
            initial_shock,
            final_shock = result.final_shock,
            rounds = result.history.len(),
            total_shortfall = result.total_shortfall,
            exhausted = result.exhausted,
            "Cascade finished"
        );

        Ok(result)
    }
}
