//! Regime-switching market simulator
//!
//! Daily BTC/ETH/ALT returns follow an Itô-corrected GBM whose drift,
//! volatilities and correlations depend on a hidden three-state Markov
//! regime (normal, stressed, crisis).
//!
//! Correlated shocks come from a Cholesky factor of the regime's correlation
//! matrix. The ETH-ALT entry is the product of BTC-ETH and BTC-ALT (single
//! factor), which is not guaranteed positive semi-definite, so every matrix
//! is repaired by flooring its eigenvalues before factorization.

use crate::config::{MarketConfig, RegimeCorrelation, RegimeTable};
use crate::error::{Result, SentinelError};
use crate::rng::{RngContext, Stream};
use crate::{Asset, Regime};
use chrono::{Datelike, NaiveDate, Weekday};
use nalgebra::{Matrix3, Vector3};
use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const STATIONARY_MAX_ITERATIONS: usize = 10_000;
const STATIONARY_TOLERANCE: f64 = 1e-12;

/// One simulated trading day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDay {
    pub date: NaiveDate,
    pub regime: Regime,

    /// Daily simple returns in asset order (BTC, ETH, ALT)
    pub returns: [f64; 3],

    /// Prices compounded from the configured base
    pub prices: [f64; 3],
}

impl MarketDay {
    pub fn asset_return(&self, asset: Asset) -> f64 {
        self.returns[asset.index()]
    }

    pub fn price(&self, asset: Asset) -> f64 {
        self.prices[asset.index()]
    }
}

/// Regime-switching correlated GBM generator
#[derive(Debug, Clone)]
pub struct MarketSimulator {
    config: MarketConfig,
    cholesky: RegimeTable<Matrix3<f64>>,
    transitions: Vec<WeightedIndex<f64>>,
}

impl MarketSimulator {
    /// Build the simulator, factorizing every regime's correlation matrix once
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let cholesky = RegimeTable {
            normal: cholesky_factor(&config.correlations.normal, config.eigenvalue_floor)?,
            stressed: cholesky_factor(&config.correlations.stressed, config.eigenvalue_floor)?,
            crisis: cholesky_factor(&config.correlations.crisis, config.eigenvalue_floor)?,
        };

        let transitions = Regime::ALL
            .iter()
            .map(|regime| {
                WeightedIndex::new(config.transition.get(*regime).iter().copied()).map_err(|e| {
                    SentinelError::InvalidConfig(format!("transition row for {:?}: {}", regime, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config: config.clone(),
            cholesky,
            transitions,
        })
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Simulate `n_days` of market history starting in the normal regime
    pub fn simulate(&self, n_days: usize, ctx: &RngContext) -> Result<Vec<MarketDay>> {
        if n_days == 0 {
            return Err(SentinelError::InvalidParameter("n_days must be positive".into()));
        }

        let mut rng = ctx.stream(Stream::Market, 0);
        let dates = business_days_ending(self.config.history_end_date, n_days)?;

        let mut regime = Regime::Normal;
        let mut prices = [self.config.base_price; 3];
        let mut days = Vec::with_capacity(n_days);

        for date in dates {
            let params = self.config.params.get(regime);
            let sigmas = params.sigmas();

            let z = Vector3::new(
                rng.sample::<f64, _>(StandardNormal),
                rng.sample::<f64, _>(StandardNormal),
                rng.sample::<f64, _>(StandardNormal),
            );
            let eps = self.cholesky.get(regime) * z;

            let mut returns = [0.0; 3];
            for asset in Asset::ALL {
                let i = asset.index();
                returns[i] = params.mu - 0.5 * sigmas[i] * sigmas[i] + sigmas[i] * eps[i];
                prices[i] *= 1.0 + returns[i];
            }

            days.push(MarketDay {
                date,
                regime,
                returns,
                prices,
            });

            let next = self.transitions[regime.index()].sample(&mut rng);
            regime = Regime::from_index(next).unwrap_or(regime);
        }

        let counts = regime_counts(&days);
        info!(
            n_days,
            normal = counts[0],
            stressed = counts[1],
            crisis = counts[2],
            "Market history generated"
        );

        Ok(days)
    }

    /// Long-run share of days spent in each regime (normal, stressed, crisis)
    pub fn stationary_distribution(&self) -> [f64; 3] {
        let rows = Regime::ALL.map(|r| *self.config.transition.get(r));
        let mut pi = [1.0 / 3.0; 3];

        for _ in 0..STATIONARY_MAX_ITERATIONS {
            let mut next = [0.0; 3];
            for (from, row) in rows.iter().enumerate() {
                for (to, p) in row.iter().enumerate() {
                    next[to] += pi[from] * p;
                }
            }

            let delta: f64 = next.iter().zip(pi.iter()).map(|(a, b)| (a - b).abs()).sum();
            pi = next;
            if delta < STATIONARY_TOLERANCE {
                break;
            }
        }

        pi
    }

    /// One hourly BTC price path over a weekend, normalized to start at 1.0
    ///
    /// Hourly drift and volatility are the regime's daily values scaled by
    /// 1/24 and 1/√24. Returns `n_hours + 1` points.
    pub fn intraweekend_path(
        &self,
        regime: Regime,
        n_hours: usize,
        path_index: u64,
        ctx: &RngContext,
    ) -> Result<Vec<f64>> {
        let params = self.config.params.get(regime);
        let sigma_hourly = params.sigma_btc / 24f64.sqrt();
        let mu_hourly = params.mu / 24.0;

        let shock = Normal::new(mu_hourly - 0.5 * sigma_hourly * sigma_hourly, sigma_hourly)
            .map_err(|e| SentinelError::Distribution(e.to_string()))?;

        let mut rng = ctx.stream(Stream::IntraweekendPrices, path_index);
        let mut path = Vec::with_capacity(n_hours + 1);
        let mut price = 1.0;
        path.push(price);
        for _ in 0..n_hours {
            price *= 1.0 + shock.sample(&mut rng);
            path.push(price);
        }

        Ok(path)
    }

    /// `n_paths` independent intraweekend paths, path-major
    pub fn intraweekend_paths(
        &self,
        regime: Regime,
        n_hours: usize,
        n_paths: usize,
        ctx: &RngContext,
    ) -> Result<Vec<Vec<f64>>> {
        (0..n_paths)
            .into_par_iter()
            .map(|i| self.intraweekend_path(regime, n_hours, i as u64, ctx))
            .collect()
    }
}

/// Locate the worst contiguous window of cumulative return
///
/// Compounds `returns` into a cumulative index and returns the inclusive
/// `(start, end)` day range whose end-to-start ratio is smallest. The first
/// minimum wins on ties. A series shorter than `window` yields the whole
/// series.
pub fn worst_window(returns: &[f64], window: usize) -> Option<(usize, usize)> {
    if returns.is_empty() || window == 0 {
        return None;
    }
    if returns.len() < window {
        warn!(
            available = returns.len(),
            window, "History shorter than stress window, using full history"
        );
        return Some((0, returns.len() - 1));
    }

    let cumulative: Vec<f64> = returns
        .iter()
        .scan(1.0, |acc, r| {
            *acc *= 1.0 + r;
            Some(*acc)
        })
        .collect();

    let mut worst_end = window - 1;
    let mut worst_change = f64::INFINITY;
    for end in (window - 1)..cumulative.len() {
        let change = cumulative[end] / cumulative[end + 1 - window] - 1.0;
        if change < worst_change {
            worst_change = change;
            worst_end = end;
        }
    }

    debug!(start = worst_end + 1 - window, end = worst_end, change = worst_change, "Worst window located");
    Some((worst_end + 1 - window, worst_end))
}

/// Return series of one asset
pub fn asset_returns(days: &[MarketDay], asset: Asset) -> Vec<f64> {
    days.iter().map(|d| d.asset_return(asset)).collect()
}

/// Number of days spent in each regime (normal, stressed, crisis)
pub fn regime_counts(days: &[MarketDay]) -> [usize; 3] {
    let mut counts = [0; 3];
    for day in days {
        counts[day.regime.index()] += 1;
    }
    counts
}

/// Correlation matrix with the ETH-ALT entry inferred from BTC correlations
pub fn correlation_matrix(corr: &RegimeCorrelation) -> Matrix3<f64> {
    let eth_alt = corr.btc_eth * corr.btc_alt;
    Matrix3::new(
        1.0, corr.btc_eth, corr.btc_alt,
        corr.btc_eth, 1.0, eth_alt,
        corr.btc_alt, eth_alt, 1.0,
    )
}

/// Floor the eigenvalues of a symmetric matrix and rebuild it
pub fn repair_psd(matrix: Matrix3<f64>, floor: f64) -> (Matrix3<f64>, bool) {
    let mut eigen = matrix.symmetric_eigen();
    let mut repaired = false;
    for value in eigen.eigenvalues.iter_mut() {
        if *value < floor {
            *value = floor;
            repaired = true;
        }
    }
    (eigen.recompose(), repaired)
}

fn cholesky_factor(corr: &RegimeCorrelation, floor: f64) -> Result<Matrix3<f64>> {
    let (matrix, repaired) = repair_psd(correlation_matrix(corr), floor);
    if repaired {
        warn!(
            btc_eth = corr.btc_eth,
            btc_alt = corr.btc_alt,
            "Correlation matrix not positive definite, eigenvalues floored"
        );
    }

    matrix
        .cholesky()
        .map(|c| c.l())
        .ok_or_else(|| SentinelError::NumericalInstability("Cholesky factorization failed after eigenvalue repair".into()))
}

/// The last `n` business days on or before `end`, oldest first
fn business_days_ending(end: NaiveDate, n: usize) -> Result<Vec<NaiveDate>> {
    let mut dates = Vec::with_capacity(n);
    let mut date = end;
    while dates.len() < n {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(date);
        }
        date = date
            .pred_opt()
            .ok_or_else(|| SentinelError::InvalidParameter("history runs before the calendar start".into()))?;
    }
    dates.reverse();
    Ok(dates)
}
