//! Simulation configuration
//!
//! One immutable `SentinelConfig` value is built at startup (from defaults,
//! YAML or JSON), validated once, and passed by reference into every
//! component constructor. Per-scenario and per-regime parameters live in
//! closed tables indexed by enum, so a missing scenario is a compile error
//! rather than a lookup failure.

use crate::error::{Result, SentinelError};
use crate::{Regime, ShockScenario, WithdrawalScenario};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

const ROW_SUM_TOLERANCE: f64 = 1e-9;

/// Complete simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Root seed; identical (config, seed) reproduces identical output
    pub seed: u64,

    pub balance_sheet: BalanceSheetConfig,
    pub population: PopulationConfig,
    pub withdrawal: WithdrawalConfig,
    pub market: MarketConfig,
    pub var: VarConfig,
    pub derivatives: DerivativesConfig,
    pub reserve: ReserveConfig,
    pub stress: StressConfig,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            balance_sheet: BalanceSheetConfig::default(),
            population: PopulationConfig::default(),
            withdrawal: WithdrawalConfig::default(),
            market: MarketConfig::default(),
            var: VarConfig::default(),
            derivatives: DerivativesConfig::default(),
            reserve: ReserveConfig::default(),
            stress: StressConfig::default(),
        }
    }
}

impl SentinelConfig {
    /// Parse and validate a YAML document
    ///
    /// # Example
    ///
    /// ```
    /// use liquidity_sentinel::SentinelConfig;
    ///
    /// let yaml = r#"
    /// seed: 7
    /// withdrawal:
    ///   n_simulations: 500
    /// "#;
    ///
    /// let config = SentinelConfig::from_yaml(yaml).unwrap();
    /// assert_eq!(config.seed, 7);
    /// assert_eq!(config.withdrawal.n_simulations, 500);
    /// assert_eq!(config.withdrawal.weekend_hours, 64);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: SentinelConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SentinelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML (`.yaml`/`.yml`) or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Check every section; invalid configuration fails here, never mid-run
    pub fn validate(&self) -> Result<()> {
        self.balance_sheet.validate()?;
        self.population.validate()?;
        self.withdrawal.validate()?;
        self.market.validate()?;
        self.var.validate()?;
        self.derivatives.validate()?;
        self.reserve.validate()?;
        self.stress.validate()?;
        Ok(())
    }
}

/// Values indexed by withdrawal scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTable<T> {
    pub normal: T,
    pub mild: T,
    pub severe: T,
}

impl<T> ScenarioTable<T> {
    pub fn get(&self, scenario: WithdrawalScenario) -> &T {
        match scenario {
            WithdrawalScenario::Normal => &self.normal,
            WithdrawalScenario::Mild => &self.mild,
            WithdrawalScenario::Severe => &self.severe,
        }
    }
}

/// Values indexed by price-shock scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShockTable<T> {
    pub mild: T,
    pub severe: T,
    pub luna: T,
}

impl<T> ShockTable<T> {
    pub fn get(&self, scenario: ShockScenario) -> &T {
        match scenario {
            ShockScenario::Mild => &self.mild,
            ShockScenario::Severe => &self.severe,
            ShockScenario::Luna => &self.luna,
        }
    }
}

/// Values indexed by market regime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeTable<T> {
    pub normal: T,
    pub stressed: T,
    pub crisis: T,
}

impl<T> RegimeTable<T> {
    pub fn get(&self, regime: Regime) -> &T {
        match regime {
            Regime::Normal => &self.normal,
            Regime::Stressed => &self.stressed,
            Regime::Crisis => &self.crisis,
        }
    }
}

/// Exchange balance sheet baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceSheetConfig {
    /// Total assets under management (USD)
    pub total_assets_aum: f64,

    /// Customer fiat liabilities (USD)
    pub fiat_liabilities: f64,

    /// Insurance fund as a fraction of AUM
    pub insurance_fund_ratio: f64,

    /// Proprietary capital buffer as a fraction of AUM
    pub prop_capital_ratio: f64,

    /// Fiat reserve held, as a fraction of fiat liabilities
    pub fiat_reserve_pct: f64,

    /// Minimum capital adequacy ratio to be flagged adequate
    pub capital_adequacy_threshold: f64,

    /// Rule-of-thumb reserve compared in stress tests (fraction of fiat)
    pub industry_reserve_pct: f64,
}

impl Default for BalanceSheetConfig {
    fn default() -> Self {
        Self {
            total_assets_aum: 2_900_000_000.0,
            fiat_liabilities: 2_230_000_000.0,
            insurance_fund_ratio: 0.005,
            prop_capital_ratio: 0.02,
            fiat_reserve_pct: 0.20,
            capital_adequacy_threshold: 1.08,
            industry_reserve_pct: 0.10,
        }
    }
}

impl BalanceSheetConfig {
    /// Crypto-backed portion of the balance sheet exposed to market risk
    pub fn crypto_exposure(&self) -> f64 {
        (self.total_assets_aum - self.fiat_liabilities).max(0.0)
    }

    fn validate(&self) -> Result<()> {
        non_negative("balance_sheet.total_assets_aum", self.total_assets_aum)?;
        non_negative("balance_sheet.fiat_liabilities", self.fiat_liabilities)?;
        fraction("balance_sheet.insurance_fund_ratio", self.insurance_fund_ratio)?;
        fraction("balance_sheet.prop_capital_ratio", self.prop_capital_ratio)?;
        fraction("balance_sheet.fiat_reserve_pct", self.fiat_reserve_pct)?;
        fraction("balance_sheet.industry_reserve_pct", self.industry_reserve_pct)?;
        positive("balance_sheet.capital_adequacy_threshold", self.capital_adequacy_threshold)
    }
}

/// Synthetic account population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub n_users: usize,

    /// Fraction of accounts that are retail
    pub retail_share: f64,

    /// Fraction of total balance held by institutional accounts
    pub inst_balance_share: f64,

    pub retail_log_mu: f64,
    pub retail_log_sigma: f64,
    pub inst_log_mu: f64,
    pub inst_log_sigma: f64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            n_users: 100_000,
            retail_share: 0.95,
            inst_balance_share: 0.65,
            retail_log_mu: 8.5,
            retail_log_sigma: 2.2,
            inst_log_mu: 13.5,
            inst_log_sigma: 1.8,
        }
    }
}

impl PopulationConfig {
    /// (retail, institutional) account counts
    pub fn split(&self) -> (usize, usize) {
        let n_retail = (self.n_users as f64 * self.retail_share).floor() as usize;
        (n_retail, self.n_users - n_retail)
    }

    fn validate(&self) -> Result<()> {
        fraction("population.retail_share", self.retail_share)?;
        open_fraction("population.inst_balance_share", self.inst_balance_share)?;
        positive("population.retail_log_sigma", self.retail_log_sigma)?;
        positive("population.inst_log_sigma", self.inst_log_sigma)?;
        finite("population.retail_log_mu", self.retail_log_mu)?;
        finite("population.inst_log_mu", self.inst_log_mu)?;

        let (n_retail, n_inst) = self.split();
        if n_retail == 0 || n_inst == 0 {
            return Err(SentinelError::InvalidConfig(format!(
                "population split leaves an empty group: {} retail, {} institutional",
                n_retail, n_inst
            )));
        }
        Ok(())
    }
}

/// Withdrawal behaviour for one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalScenarioParams {
    /// Daily withdrawal rate range (fraction of total fiat), sampled uniformly
    pub daily_rate_min: f64,
    pub daily_rate_max: f64,

    /// Hourly coefficient of variation of retail flow
    pub burstiness_cv: f64,

    /// Institutional withdrawal arrivals per day
    pub jump_rate_per_day: f64,

    /// Log-normal jump size parameters (log USD)
    pub jump_log_mu: f64,
    pub jump_log_sigma: f64,

    /// Hours institutional outflows lead the retail window
    pub lead_time_hours: usize,
}

/// Withdrawal process and Monte Carlo settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalConfig {
    /// Hours without bank settlement (Friday 5PM to Monday 9AM)
    pub weekend_hours: usize,

    /// Monte Carlo paths per scenario
    pub n_simulations: usize,

    /// Cap on a single institutional withdrawal (fraction of total fiat)
    pub max_jump_fraction: f64,

    /// LUNA withdrawal demand relative to severe p99
    pub luna_withdrawal_multiplier: f64,

    pub scenarios: ScenarioTable<WithdrawalScenarioParams>,
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            weekend_hours: 64,
            n_simulations: 10_000,
            max_jump_fraction: 0.15,
            luna_withdrawal_multiplier: 1.2,
            scenarios: ScenarioTable {
                normal: WithdrawalScenarioParams {
                    daily_rate_min: 0.01,
                    daily_rate_max: 0.03,
                    burstiness_cv: 0.5,
                    jump_rate_per_day: 0.5,
                    jump_log_mu: 13.5,
                    jump_log_sigma: 1.0,
                    lead_time_hours: 0,
                },
                mild: WithdrawalScenarioParams {
                    daily_rate_min: 0.05,
                    daily_rate_max: 0.08,
                    burstiness_cv: 0.8,
                    jump_rate_per_day: 2.0,
                    jump_log_mu: 14.2,
                    jump_log_sigma: 1.2,
                    lead_time_hours: 3,
                },
                severe: WithdrawalScenarioParams {
                    daily_rate_min: 0.20,
                    daily_rate_max: 0.40,
                    burstiness_cv: 1.2,
                    jump_rate_per_day: 6.0,
                    jump_log_mu: 15.0,
                    jump_log_sigma: 1.5,
                    lead_time_hours: 6,
                },
            },
        }
    }
}

impl WithdrawalConfig {
    fn validate(&self) -> Result<()> {
        if self.weekend_hours == 0 {
            return Err(SentinelError::InvalidConfig("withdrawal.weekend_hours must be positive".into()));
        }
        if self.n_simulations == 0 {
            return Err(SentinelError::InvalidConfig("withdrawal.n_simulations must be positive".into()));
        }
        open_fraction("withdrawal.max_jump_fraction", self.max_jump_fraction)?;
        positive("withdrawal.luna_withdrawal_multiplier", self.luna_withdrawal_multiplier)?;

        for scenario in WithdrawalScenario::ALL {
            let p = self.scenarios.get(scenario);
            let name = scenario.name();
            fraction(&format!("withdrawal.{name}.daily_rate_min"), p.daily_rate_min)?;
            fraction(&format!("withdrawal.{name}.daily_rate_max"), p.daily_rate_max)?;
            if p.daily_rate_min > p.daily_rate_max {
                return Err(SentinelError::InvalidConfig(format!(
                    "withdrawal.{name}: daily_rate_min {} exceeds daily_rate_max {}",
                    p.daily_rate_min, p.daily_rate_max
                )));
            }
            positive(&format!("withdrawal.{name}.burstiness_cv"), p.burstiness_cv)?;
            non_negative(&format!("withdrawal.{name}.jump_rate_per_day"), p.jump_rate_per_day)?;
            finite(&format!("withdrawal.{name}.jump_log_mu"), p.jump_log_mu)?;
            positive(&format!("withdrawal.{name}.jump_log_sigma"), p.jump_log_sigma)?;
        }
        Ok(())
    }
}

/// Daily GBM drift and per-asset volatility for one regime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeParams {
    pub mu: f64,
    pub sigma_btc: f64,
    pub sigma_eth: f64,
    pub sigma_alt: f64,
}

impl RegimeParams {
    /// Volatilities in asset order (BTC, ETH, ALT)
    pub fn sigmas(&self) -> [f64; 3] {
        [self.sigma_btc, self.sigma_eth, self.sigma_alt]
    }
}

/// Pairwise correlations against BTC; ETH-ALT is inferred
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeCorrelation {
    pub btc_eth: f64,
    pub btc_alt: f64,
}

/// Regime-switching market generator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Days of synthetic history
    pub n_days: usize,

    /// Last calendar date of the history (business days only)
    pub history_end_date: NaiveDate,

    /// Starting price for every asset
    pub base_price: f64,

    /// Transition probabilities to (normal, stressed, crisis)
    pub transition: RegimeTable<[f64; 3]>,

    pub params: RegimeTable<RegimeParams>,
    pub correlations: RegimeTable<RegimeCorrelation>,

    /// Floor applied to correlation-matrix eigenvalues before Cholesky
    pub eigenvalue_floor: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            n_days: 365,
            history_end_date: NaiveDate::from_ymd_opt(2026, 2, 20).unwrap_or_default(),
            base_price: 100.0,
            transition: RegimeTable {
                normal: [0.980, 0.018, 0.002],
                stressed: [0.150, 0.800, 0.050],
                crisis: [0.050, 0.250, 0.700],
            },
            params: RegimeTable {
                normal: RegimeParams { mu: 0.001, sigma_btc: 0.035, sigma_eth: 0.045, sigma_alt: 0.060 },
                stressed: RegimeParams { mu: -0.003, sigma_btc: 0.070, sigma_eth: 0.090, sigma_alt: 0.120 },
                crisis: RegimeParams { mu: -0.010, sigma_btc: 0.150, sigma_eth: 0.180, sigma_alt: 0.250 },
            },
            correlations: RegimeTable {
                normal: RegimeCorrelation { btc_eth: 0.82, btc_alt: 0.70 },
                stressed: RegimeCorrelation { btc_eth: 0.90, btc_alt: 0.85 },
                crisis: RegimeCorrelation { btc_eth: 0.95, btc_alt: 0.92 },
            },
            eigenvalue_floor: 1e-8,
        }
    }
}

impl MarketConfig {
    fn validate(&self) -> Result<()> {
        if self.n_days == 0 {
            return Err(SentinelError::InvalidConfig("market.n_days must be positive".into()));
        }
        positive("market.base_price", self.base_price)?;
        positive("market.eigenvalue_floor", self.eigenvalue_floor)?;

        for regime in Regime::ALL {
            let row = self.transition.get(regime);
            if row.iter().any(|p| !p.is_finite() || *p < 0.0) {
                return Err(SentinelError::InvalidConfig(format!(
                    "market.transition.{:?} has a negative or non-finite probability: {:?}",
                    regime, row
                )));
            }
            let sum: f64 = row.iter().sum();
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(SentinelError::InvalidConfig(format!(
                    "market.transition.{:?} sums to {} (must be 1)",
                    regime, sum
                )));
            }

            let params = self.params.get(regime);
            finite("market.params.mu", params.mu)?;
            for sigma in params.sigmas() {
                non_negative("market.params.sigma", sigma)?;
            }

            let corr = self.correlations.get(regime);
            for c in [corr.btc_eth, corr.btc_alt] {
                if !c.is_finite() || c.abs() >= 1.0 {
                    return Err(SentinelError::InvalidConfig(format!(
                        "market.correlations.{:?}: correlation {} outside (-1, 1)",
                        regime, c
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Per-asset price shock (negative = decline)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetShock {
    pub btc: f64,
    pub eth: f64,
    pub alt: f64,
}

/// Portfolio weights across the three asset buckets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioWeights {
    pub btc: f64,
    pub eth: f64,
    pub alt: f64,
}

/// Hybrid VaR settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarConfig {
    /// Historical lookback in days for HS and FHS VaR
    pub lookback_days: usize,

    /// RiskMetrics EWMA decay factor
    pub ewma_lambda: f64,

    /// Length of the worst window used by stressed VaR
    pub stressed_window_days: usize,

    /// Confidence used for tier reserves and the solvency integrator
    pub confidence: f64,

    /// Additional confidence levels reported for every method
    pub confidence_levels: Vec<f64>,

    pub portfolio_weights: PortfolioWeights,
    pub shocks: ShockTable<AssetShock>,
}

impl Default for VarConfig {
    fn default() -> Self {
        Self {
            lookback_days: 365,
            ewma_lambda: 0.94,
            stressed_window_days: 90,
            confidence: 0.99,
            confidence_levels: vec![0.95, 0.99],
            portfolio_weights: PortfolioWeights { btc: 0.50, eth: 0.30, alt: 0.20 },
            shocks: ShockTable {
                mild: AssetShock { btc: -0.25, eth: -0.32, alt: -0.45 },
                severe: AssetShock { btc: -0.50, eth: -0.60, alt: -0.75 },
                luna: AssetShock { btc: -0.40, eth: -0.48, alt: -0.88 },
            },
        }
    }
}

impl VarConfig {
    /// Effective sample size of the EWMA filter, 1 / (1 - lambda)
    pub fn ewma_effective_sample_size(&self) -> f64 {
        1.0 / (1.0 - self.ewma_lambda)
    }

    fn validate(&self) -> Result<()> {
        if self.lookback_days == 0 || self.stressed_window_days == 0 {
            return Err(SentinelError::InvalidConfig(
                "var.lookback_days and var.stressed_window_days must be positive".into(),
            ));
        }
        if !(self.ewma_lambda > 0.0 && self.ewma_lambda < 1.0) {
            return Err(SentinelError::InvalidConfig(format!(
                "var.ewma_lambda {} outside (0, 1)",
                self.ewma_lambda
            )));
        }
        for level in std::iter::once(&self.confidence).chain(self.confidence_levels.iter()) {
            if !(*level > 0.0 && *level < 1.0) {
                return Err(SentinelError::InvalidConfidenceLevel(*level));
            }
        }
        let w = &self.portfolio_weights;
        for weight in [w.btc, w.eth, w.alt] {
            non_negative("var.portfolio_weights", weight)?;
        }
        for scenario in ShockScenario::ALL {
            let s = self.shocks.get(scenario);
            for shock in [s.btc, s.eth, s.alt] {
                if !shock.is_finite() || shock.abs() > 1.0 {
                    return Err(SentinelError::InvalidConfig(format!(
                        "var.shocks.{}: shock {} outside [-1, 1]",
                        scenario.name(),
                        shock
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Truncated-normal leverage distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageDistribution {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl LeverageDistribution {
    fn validate(&self, name: &str) -> Result<()> {
        positive(&format!("{name}.std"), self.std)?;
        positive(&format!("{name}.min"), self.min)?;
        finite(&format!("{name}.mean"), self.mean)?;
        if self.min >= self.max {
            return Err(SentinelError::InvalidConfig(format!(
                "{name}: leverage min {} must be below max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Derivatives book, cascade and insurance fund Monte Carlo settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivativesConfig {
    /// Open interest as a multiple of AUM
    pub oi_to_aum_ratio: f64,

    pub n_traders: usize,

    /// Fraction of trader accounts that are institutional
    pub inst_trader_share: f64,

    /// Fraction of open-interest notional held by institutions
    pub inst_notional_share: f64,

    pub retail_leverage: LeverageDistribution,
    pub inst_leverage: LeverageDistribution,

    /// Log-normal sigma of per-trader notional
    pub retail_notional_log_sigma: f64,
    pub inst_notional_log_sigma: f64,

    /// Maximum liquidation rounds per cascade
    pub cascade_steps: usize,

    /// Price move per unit of open interest liquidated
    pub impact_factor: f64,

    /// Impact is scaled by (1 + U(0, impact_noise_max))
    pub impact_noise_max: f64,

    /// Multiplicative noise range on the initial shock per trial
    pub shock_noise_low: f64,
    pub shock_noise_high: f64,

    /// Cascade trials per scenario
    pub n_simulations: usize,
}

impl Default for DerivativesConfig {
    fn default() -> Self {
        Self {
            oi_to_aum_ratio: 1.5,
            n_traders: 5_000,
            inst_trader_share: 0.10,
            inst_notional_share: 0.60,
            retail_leverage: LeverageDistribution { mean: 15.0, std: 5.0, min: 2.0, max: 50.0 },
            inst_leverage: LeverageDistribution { mean: 8.0, std: 3.0, min: 2.0, max: 20.0 },
            retail_notional_log_sigma: 1.0,
            inst_notional_log_sigma: 0.8,
            cascade_steps: 5,
            impact_factor: 0.005,
            impact_noise_max: 0.5,
            shock_noise_low: 0.8,
            shock_noise_high: 1.2,
            n_simulations: 500,
        }
    }
}

impl DerivativesConfig {
    /// (retail, institutional) trader counts
    pub fn split(&self) -> (usize, usize) {
        let n_inst = (self.n_traders as f64 * self.inst_trader_share).floor() as usize;
        (self.n_traders - n_inst, n_inst)
    }

    fn validate(&self) -> Result<()> {
        positive("derivatives.oi_to_aum_ratio", self.oi_to_aum_ratio)?;
        open_fraction("derivatives.inst_notional_share", self.inst_notional_share)?;
        fraction("derivatives.inst_trader_share", self.inst_trader_share)?;
        self.retail_leverage.validate("derivatives.retail_leverage")?;
        self.inst_leverage.validate("derivatives.inst_leverage")?;
        positive("derivatives.retail_notional_log_sigma", self.retail_notional_log_sigma)?;
        positive("derivatives.inst_notional_log_sigma", self.inst_notional_log_sigma)?;
        non_negative("derivatives.impact_factor", self.impact_factor)?;
        non_negative("derivatives.impact_noise_max", self.impact_noise_max)?;
        non_negative("derivatives.shock_noise_low", self.shock_noise_low)?;
        if self.shock_noise_low > self.shock_noise_high {
            return Err(SentinelError::InvalidConfig(format!(
                "derivatives: shock_noise_low {} exceeds shock_noise_high {}",
                self.shock_noise_low, self.shock_noise_high
            )));
        }
        if self.cascade_steps == 0 || self.n_simulations == 0 {
            return Err(SentinelError::InvalidConfig(
                "derivatives.cascade_steps and derivatives.n_simulations must be positive".into(),
            ));
        }

        let (n_retail, n_inst) = self.split();
        if n_retail == 0 || n_inst == 0 {
            return Err(SentinelError::InvalidConfig(format!(
                "trader split leaves an empty group: {} retail, {} institutional",
                n_retail, n_inst
            )));
        }
        Ok(())
    }
}

/// Newsvendor reserve optimization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReserveConfig {
    /// Annualized yield forgone on idle fiat
    pub opportunity_cost: f64,

    /// Annualized cost of emergency liquidity
    pub emergency_cost: f64,

    /// Stress events (weekends) per year used to annualize shortfall cost
    pub stress_events_per_year: f64,

    pub cost_curve_points: usize,
}

impl Default for ReserveConfig {
    fn default() -> Self {
        Self {
            opportunity_cost: 0.045,
            emergency_cost: 0.09,
            stress_events_per_year: 52.0,
            cost_curve_points: 100,
        }
    }
}

impl ReserveConfig {
    fn validate(&self) -> Result<()> {
        positive("reserve.opportunity_cost", self.opportunity_cost)?;
        positive("reserve.emergency_cost", self.emergency_cost)?;
        positive("reserve.stress_events_per_year", self.stress_events_per_year)?;
        if self.cost_curve_points < 2 {
            return Err(SentinelError::InvalidConfig("reserve.cost_curve_points must be at least 2".into()));
        }
        Ok(())
    }
}

/// Stress test and safety frontier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    pub frontier_points: usize,

    /// Upper end of the frontier sweep as a fraction of fiat
    pub frontier_max_reserve_pct: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            frontier_points: 50,
            frontier_max_reserve_pct: 0.60,
        }
    }
}

impl StressConfig {
    fn validate(&self) -> Result<()> {
        if self.frontier_points == 0 {
            return Err(SentinelError::InvalidConfig("stress.frontier_points must be positive".into()));
        }
        positive("stress.frontier_max_reserve_pct", self.frontier_max_reserve_pct)
    }
}

fn finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SentinelError::InvalidConfig(format!("{name} must be finite, got {value}")))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SentinelError::InvalidConfig(format!("{name} must be non-negative, got {value}")))
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SentinelError::InvalidConfig(format!("{name} must be positive, got {value}")))
    }
}

fn fraction(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SentinelError::InvalidConfig(format!("{name} must be within [0, 1], got {value}")))
    }
}

fn open_fraction(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(SentinelError::InvalidConfig(format!("{name} must be within (0, 1), got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        SentinelConfig::default().validate().unwrap();
    }

    #[test]
    fn test_transition_rows_sum_to_one() {
        let config = MarketConfig::default();
        for regime in Regime::ALL {
            let sum: f64 = config.transition.get(regime).iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "{:?} row sums to {}", regime, sum);
        }
    }

    #[test]
    fn test_invalid_transition_row_rejected() {
        let mut config = SentinelConfig::default();
        config.market.transition.stressed = [0.2, 0.8, 0.05];

        let err = config.validate().unwrap_err();
        assert!(matches!(err, SentinelError::InvalidConfig(_)));
    }

    #[test]
    fn test_leverage_bounds_rejected() {
        let mut config = SentinelConfig::default();
        config.derivatives.retail_leverage.min = 50.0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_rate_rejected() {
        let mut config = SentinelConfig::default();
        config.withdrawal.scenarios.mild.daily_rate_min = -0.01;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_confidence_level_rejected() {
        let mut config = SentinelConfig::default();
        config.var.confidence_levels.push(1.5);

        assert!(matches!(
            config.validate().unwrap_err(),
            SentinelError::InvalidConfidenceLevel(level) if level == 1.5
        ));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
seed: 11
balance_sheet:
  fiat_reserve_pct: 0.3
derivatives:
  n_traders: 1000
"#;
        let config = SentinelConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.seed, 11);
        assert_eq!(config.balance_sheet.fiat_reserve_pct, 0.3);
        assert_eq!(config.balance_sheet.total_assets_aum, 2_900_000_000.0);
        assert_eq!(config.derivatives.n_traders, 1000);
        assert_eq!(config.derivatives.cascade_steps, 5);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = SentinelConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed = SentinelConfig::from_json(&json).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn test_effective_sample_size() {
        let config = VarConfig::default();
        assert!((config.ewma_effective_sample_size() - 16.666_666_666).abs() < 1e-6);
    }

    #[test]
    fn test_crypto_exposure() {
        let config = BalanceSheetConfig::default();
        assert_eq!(config.crypto_exposure(), 670_000_000.0);
    }
}
