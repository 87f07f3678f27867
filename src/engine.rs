//! End-to-end stress pipeline
//!
//! Runs every component from one validated `SentinelConfig` and collects the
//! outputs into a `StressReport`. The report is the only type serialized for
//! downstream consumers.

use crate::config::SentinelConfig;
use crate::error::Result;
use crate::forecast::{self, ForecastSummary, WithdrawalForecast, WithdrawalForecaster};
use crate::market::{self, MarketSimulator};
use crate::models::reserve::{tier_allocation, CostCurvePoint, NewsvendorOptimizer, ScenarioReserve, TierAllocation};
use crate::models::solvency::{waterfall, SolvencyIntegrator, SolvencyReport, Verdict, WaterfallStep};
use crate::models::stress::{reserve_for_failure_rate, FrontierPoint, ScenarioStress, StressTester};
use crate::models::{HybridVarSuite, InsuranceFundOutcome, InsuranceFundSimulator, VarSuiteReport};
use crate::population::{self, AccountType};
use crate::rng::RngContext;
use crate::{Scenario, WithdrawalScenario};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Account book statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSummary {
    pub n_retail: usize,
    pub n_institutional: usize,
    pub total_balance: f64,
    pub institutional_share: f64,
    pub gini: f64,
}

/// Simulated market history statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub n_days: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    /// Days spent in normal, stressed and crisis regimes
    pub regime_counts: [usize; 3],

    pub stationary_distribution: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioCostCurve {
    pub scenario: WithdrawalScenario,
    pub points: Vec<CostCurvePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFrontier {
    pub scenario: WithdrawalScenario,
    pub points: Vec<FrontierPoint>,

    /// Smallest swept reserve keeping the failure rate at or below 1%
    pub reserve_for_1pct_failure: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioWaterfall {
    pub scenario: Scenario,
    pub steps: Vec<WaterfallStep>,
}

/// Everything one pipeline run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressReport {
    pub seed: u64,
    pub population: PopulationSummary,
    pub market: MarketSummary,
    pub var: VarSuiteReport,
    pub forecasts: Vec<WithdrawalForecast>,
    pub forecast_summary: Vec<ForecastSummary>,
    pub insurance: Vec<InsuranceFundOutcome>,
    pub reserves: Vec<ScenarioReserve>,
    pub cost_curves: Vec<ScenarioCostCurve>,
    pub tiers: TierAllocation,
    pub stress_tests: Vec<ScenarioStress>,
    pub frontiers: Vec<ScenarioFrontier>,
    pub solvency: Vec<SolvencyReport>,
    pub waterfalls: Vec<ScenarioWaterfall>,
}

impl StressReport {
    /// Serialize the report as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn forecast(&self, scenario: WithdrawalScenario) -> Option<&WithdrawalForecast> {
        self.forecasts.iter().find(|f| f.scenario == scenario)
    }

    pub fn insurance_outcome(&self, scenario: Scenario) -> Option<&InsuranceFundOutcome> {
        self.insurance.iter().find(|o| o.scenario == scenario)
    }

    pub fn solvency_report(&self, scenario: Scenario) -> Option<&SolvencyReport> {
        self.solvency.iter().find(|r| r.scenario == scenario)
    }
}

/// Stress pipeline bound to one configuration
///
/// # Example
///
/// ```no_run
/// use liquidity_sentinel::{SentinelConfig, StressEngine};
///
/// let engine = StressEngine::new(SentinelConfig::default()).unwrap();
/// let report = engine.run().unwrap();
/// println!("{}", report.to_json().unwrap());
/// ```
pub struct StressEngine {
    config: SentinelConfig,
}

impl StressEngine {
    /// Create an engine; the configuration is validated here
    pub fn new(config: SentinelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Load a YAML or JSON configuration file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::new(SentinelConfig::from_file(path)?)
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    /// Run the full pipeline with the configured seed
    pub fn run(&self) -> Result<StressReport> {
        let config = &self.config;
        let ctx = RngContext::new(config.seed);
        let sheet = &config.balance_sheet;

        info!(seed = config.seed, aum = sheet.total_assets_aum, "Starting stress run");

        let population = self.population_summary(&ctx)?;

        let simulator = MarketSimulator::new(&config.market)?;
        let days = simulator.simulate(config.market.n_days, &ctx)?;
        let market = MarketSummary {
            n_days: days.len(),
            start_date: days.first().map(|d| d.date).unwrap_or(config.market.history_end_date),
            end_date: days.last().map(|d| d.date).unwrap_or(config.market.history_end_date),
            regime_counts: market::regime_counts(&days),
            stationary_distribution: simulator.stationary_distribution(),
        };

        let var = HybridVarSuite::new(&config.var).compute(&days, sheet.crypto_exposure())?;

        let forecaster = WithdrawalForecaster::new(&config.withdrawal)?;
        let forecasts = forecaster.run_all_scenarios(sheet.fiat_liabilities, &ctx)?;
        let forecast_summary = forecast::summarize(&forecasts);

        let insurance = InsuranceFundSimulator::new(config).simulate(
            sheet.total_assets_aum,
            config.derivatives.n_simulations,
            &ctx,
        )?;

        let optimizer = NewsvendorOptimizer::new(&config.reserve)?;
        let reserves = optimizer.optimize_all(&forecasts)?;
        let cost_curves = forecasts
            .iter()
            .map(|f| {
                Ok(ScenarioCostCurve {
                    scenario: f.scenario,
                    points: optimizer.cost_curve(&f.total_withdrawals)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        info!(critical_ratio = optimizer.critical_ratio(), "Reserve optimization complete");

        // Tiers sized against severe withdrawals and the severe insurance drawdown
        let severe = forecasts.iter().find(|f| f.scenario == WithdrawalScenario::Severe);
        let if_obligation = insurance
            .iter()
            .find(|o| o.scenario == Scenario::Severe)
            .map(|o| o.mean_drawdown)
            .unwrap_or(0.0);
        let tiers = tier_allocation(
            var.tier1_reserve,
            severe.map(|f| f.percentiles.p95).unwrap_or(0.0),
            severe.map(|f| f.percentiles.p99).unwrap_or(0.0),
            if_obligation,
        );

        let tester = StressTester::new(&config.stress, sheet.industry_reserve_pct);
        let stress_tests = tester.run_all(&forecasts, optimizer.critical_ratio())?;
        let frontiers = forecasts
            .iter()
            .map(|f| {
                let points = tester.frontier(f)?;
                Ok(ScenarioFrontier {
                    scenario: f.scenario,
                    reserve_for_1pct_failure: reserve_for_failure_rate(&points, 0.01).map(|p| p.reserve_level),
                    points,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        info!(n_tests = stress_tests.len(), "Stress tests complete");

        let solvency = SolvencyIntegrator::new(config).compute_all(&forecasts, &var, &insurance)?;
        let insolvent = solvency.iter().filter(|r| r.verdict == Verdict::Insolvent).count();
        let waterfalls = solvency
            .iter()
            .map(|r| ScenarioWaterfall {
                scenario: r.scenario,
                steps: waterfall(r),
            })
            .collect();
        info!(insolvent, scenarios = solvency.len(), "Stress run complete");

        Ok(StressReport {
            seed: config.seed,
            population,
            market,
            var,
            forecasts,
            forecast_summary,
            insurance,
            reserves,
            cost_curves,
            tiers,
            stress_tests,
            frontiers,
            solvency,
            waterfalls,
        })
    }

    fn population_summary(&self, ctx: &RngContext) -> Result<PopulationSummary> {
        let accounts =
            population::generate_accounts(&self.config.population, self.config.balance_sheet.total_assets_aum, ctx)?;
        let balances: Vec<f64> = accounts.iter().map(|a| a.balance).collect();
        let n_institutional = accounts
            .iter()
            .filter(|a| a.account_type == AccountType::Institutional)
            .count();

        let summary = PopulationSummary {
            n_retail: accounts.len() - n_institutional,
            n_institutional,
            total_balance: balances.iter().sum(),
            institutional_share: population::institutional_share(&accounts),
            gini: population::gini(&balances),
        };
        info!(
            n_accounts = accounts.len(),
            gini = summary.gini,
            institutional_share = summary.institutional_share,
            "Account population generated"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SentinelConfig {
        let mut config = SentinelConfig::default();
        config.population.n_users = 2_000;
        config.withdrawal.n_simulations = 200;
        config.derivatives.n_traders = 500;
        config.derivatives.n_simulations = 40;
        config.stress.frontier_points = 11;
        config.reserve.cost_curve_points = 20;
        config
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SentinelConfig::default();
        config.reserve.opportunity_cost = -1.0;
        assert!(StressEngine::new(config).is_err());
    }

    #[test]
    fn test_report_shape() {
        let report = StressEngine::new(small_config()).unwrap().run().unwrap();

        assert_eq!(report.forecasts.len(), 3);
        assert_eq!(report.insurance.len(), 4);
        assert_eq!(report.solvency.len(), 4);
        assert_eq!(report.reserves.len(), 3);
        assert_eq!(report.stress_tests.len(), 9);
        assert_eq!(report.frontiers.len(), 3);
        assert_eq!(report.waterfalls.len(), 4);
        assert!(report.waterfalls.iter().all(|w| w.steps.len() == 7));
        assert!(report.frontiers.iter().all(|f| f.points.len() == 11));
        assert!(report.cost_curves.iter().all(|c| c.points.len() == 20));
        assert_eq!(report.market.n_days, 365);
        assert_eq!(report.population.n_retail + report.population.n_institutional, 2_000);
    }

    #[test]
    fn test_json_omits_hourly_paths() {
        let report = StressEngine::new(small_config()).unwrap().run().unwrap();
        let json = report.to_json().unwrap();

        assert!(!json.contains("hourly_paths"));
        assert!(json.contains("\"solvency\""));
    }
}
