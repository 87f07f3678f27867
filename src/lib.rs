//! # liquidity-sentinel: Weekend Liquidity Stress Engine
//!
//! Estimates whether a crypto exchange survives a weekend liquidity shock:
//! retail and institutional withdrawals arriving while bank rails are closed,
//! compounded by a derivatives liquidation cascade that can exhaust the
//! insurance fund.
//!
//! ## Core Components
//!
//! - **MarketSimulator**: regime-switching correlated GBM for BTC/ETH/ALT
//! - **WithdrawalGenerator**: Gamma retail flow + Poisson/log-normal institutional jumps
//! - **WithdrawalForecaster**: Monte Carlo aggregation into quantiles and CVaR
//! - **HybridVarSuite**: HS, EWMA-filtered HS, stressed and scenario VaR
//! - **LiquidationCascade / InsuranceFundSimulator**: forced liquidations with price feedback
//! - **NewsvendorOptimizer**: cost-minimizing reserve quantile
//! - **stress**: failure rate, time-to-insolvency and the safety frontier
//! - **SolvencyIntegrator**: stressed balance sheet and verdict per scenario
//! - **StressEngine**: runs everything end to end from one `SentinelConfig`
//!
//! ## Example Usage
//!
//! ```rust
//! use liquidity_sentinel::{RngContext, SentinelConfig, WithdrawalForecaster, WithdrawalScenario};
//!
//! let config = SentinelConfig::default();
//! let forecaster = WithdrawalForecaster::new(&config.withdrawal).unwrap();
//!
//! let forecast = forecaster
//!     .forecast(2.23e9, WithdrawalScenario::Severe, 200, 64, &RngContext::new(42))
//!     .unwrap();
//!
//! assert!(forecast.cvar_99 >= forecast.var_99);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod market;
pub mod models;
pub mod population;
pub mod rng;
pub mod stats;
pub mod withdrawal;

pub use config::SentinelConfig;
pub use engine::{StressEngine, StressReport};
pub use error::{Result, SentinelError};
pub use forecast::{WithdrawalForecast, WithdrawalForecaster, WithdrawalPercentiles};
pub use market::{MarketDay, MarketSimulator};
pub use models::{
    CascadeResult, CascadeStep, HybridVarSuite, InsuranceFundOutcome, InsuranceFundSimulator,
    LiquidationCascade, NewsvendorOptimizer, ReserveDecision, Side, SolvencyIntegrator,
    SolvencyReport, StressTestResult, Trader, TraderType, VarMethod, VarResult, VarSuiteReport,
    Verdict,
};
pub use population::{Account, AccountType};
pub use rng::{RngContext, Stream};
pub use withdrawal::{WithdrawalGenerator, WithdrawalPath};

use serde::{Deserialize, Serialize};

/// Asset buckets held by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    Btc,
    Eth,
    Alt,
}

impl Asset {
    pub const ALL: [Asset; 3] = [Asset::Btc, Asset::Eth, Asset::Alt];

    /// Position in per-asset arrays
    pub fn index(self) -> usize {
        match self {
            Asset::Btc => 0,
            Asset::Eth => 1,
            Asset::Alt => 2,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
            Asset::Alt => "ALT",
        }
    }
}

/// Market regime of the hidden Markov chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Normal,
    Stressed,
    Crisis,
}

impl Regime {
    pub const ALL: [Regime; 3] = [Regime::Normal, Regime::Stressed, Regime::Crisis];

    /// Row/column of this regime in the transition matrix
    pub fn index(self) -> usize {
        match self {
            Regime::Normal => 0,
            Regime::Stressed => 1,
            Regime::Crisis => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Regime> {
        Regime::ALL.get(index).copied()
    }
}

/// Withdrawal stress scenario driving the retail and institutional processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalScenario {
    Normal,
    Mild,
    Severe,
}

impl WithdrawalScenario {
    /// Ordered by severity
    pub const ALL: [WithdrawalScenario; 3] = [
        WithdrawalScenario::Normal,
        WithdrawalScenario::Mild,
        WithdrawalScenario::Severe,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WithdrawalScenario::Normal => "normal",
            WithdrawalScenario::Mild => "mild",
            WithdrawalScenario::Severe => "severe",
        }
    }
}

/// Parametric price-shock scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShockScenario {
    Mild,
    Severe,
    Luna,
}

impl ShockScenario {
    pub const ALL: [ShockScenario; 3] = [ShockScenario::Mild, ShockScenario::Severe, ShockScenario::Luna];

    pub fn name(self) -> &'static str {
        match self {
            ShockScenario::Mild => "mild",
            ShockScenario::Severe => "severe",
            ShockScenario::Luna => "luna",
        }
    }
}

/// Full stress scenario evaluated on the balance sheet
///
/// LUNA reuses the severe withdrawal process (scaled at the balance sheet)
/// and carries its own price shock; normal carries no price shock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Normal,
    Mild,
    Severe,
    Luna,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [Scenario::Normal, Scenario::Mild, Scenario::Severe, Scenario::Luna];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::Normal => "normal",
            Scenario::Mild => "mild",
            Scenario::Severe => "severe",
            Scenario::Luna => "luna",
        }
    }

    /// Withdrawal process used for this scenario
    pub fn withdrawal(self) -> WithdrawalScenario {
        match self {
            Scenario::Normal => WithdrawalScenario::Normal,
            Scenario::Mild => WithdrawalScenario::Mild,
            Scenario::Severe | Scenario::Luna => WithdrawalScenario::Severe,
        }
    }

    /// Price shock applied in this scenario, `None` for normal markets
    pub fn shock(self) -> Option<ShockScenario> {
        match self {
            Scenario::Normal => None,
            Scenario::Mild => Some(ShockScenario::Mild),
            Scenario::Severe => Some(ShockScenario::Severe),
            Scenario::Luna => Some(ShockScenario::Luna),
        }
    }
}
