//! Stressed balance sheet integration
//!
//! Assets: fiat reserve, insurance fund and proprietary capital.
//! Liabilities: p99 withdrawal demand, expected derivatives clawback and the
//! scenario's market-risk loss on crypto-backed reserves.
//!
//! Severe and LUNA scenarios are expected to come out insolvent at the
//! baseline reserve.

use super::insurance::InsuranceFundOutcome;
use super::var::{VarMethod, VarSuiteReport};
use crate::config::{BalanceSheetConfig, SentinelConfig};
use crate::error::{Result, SentinelError};
use crate::forecast::WithdrawalForecast;
use crate::{Scenario, WithdrawalScenario};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Solvent,
    Insolvent,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Solvent => write!(f, "SOLVENT"),
            Verdict::Insolvent => write!(f, "INSOLVENT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assets {
    pub fiat_reserve: f64,
    pub insurance_fund: f64,
    pub prop_capital: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Liabilities {
    pub withdrawal_demand: f64,
    pub deriv_shortfall: f64,
    pub market_risk_loss: f64,
    pub total: f64,
}

/// Stressed balance sheet and verdict for one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolvencyReport {
    pub scenario: Scenario,
    pub assets: Assets,
    pub liabilities: Liabilities,
    pub net_position: f64,

    /// assets / liabilities; +∞ when liabilities are zero (serialized as null)
    #[serde(with = "unbounded_ratio")]
    pub capital_adequacy_ratio: f64,

    /// Capital needed to bring the ratio to 1.0
    pub min_capital_required: f64,

    pub verdict: Verdict,
    pub capital_adequate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaterfallKind {
    Asset,
    Liability,
    Net,
}

/// One bar of a balance sheet waterfall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallStep {
    pub label: String,
    pub value: f64,
    pub kind: WaterfallKind,
}

/// Waterfall bars: assets positive, liabilities negative, then the net position
pub fn waterfall(report: &SolvencyReport) -> Vec<WaterfallStep> {
    let step = |label: &str, value: f64, kind| WaterfallStep {
        label: label.to_string(),
        value,
        kind,
    };
    vec![
        step("Fiat Reserve", report.assets.fiat_reserve, WaterfallKind::Asset),
        step("Insurance Fund", report.assets.insurance_fund, WaterfallKind::Asset),
        step("Prop. Capital", report.assets.prop_capital, WaterfallKind::Asset),
        step("Withdrawal Demand", -report.liabilities.withdrawal_demand, WaterfallKind::Liability),
        step("Deriv. Shortfall", -report.liabilities.deriv_shortfall, WaterfallKind::Liability),
        step("Market Risk Loss", -report.liabilities.market_risk_loss, WaterfallKind::Liability),
        step("Net Position", report.net_position, WaterfallKind::Net),
    ]
}

/// Assembles stressed balance sheets from the component outputs
#[derive(Debug, Clone)]
pub struct SolvencyIntegrator {
    balance_sheet: BalanceSheetConfig,
    luna_withdrawal_multiplier: f64,
}

impl SolvencyIntegrator {
    pub fn new(config: &SentinelConfig) -> Self {
        Self {
            balance_sheet: config.balance_sheet.clone(),
            luna_withdrawal_multiplier: config.withdrawal.luna_withdrawal_multiplier,
        }
    }

    /// Baseline fiat reserve held against fiat liabilities
    pub fn fiat_reserve(&self) -> f64 {
        self.balance_sheet.fiat_liabilities * self.balance_sheet.fiat_reserve_pct
    }

    /// Market-risk loss charged to a scenario (USD)
    ///
    /// Historical VaR in normal markets, the matching parametric shock otherwise.
    pub fn market_risk_loss(&self, scenario: Scenario, var: &VarSuiteReport) -> Result<f64> {
        match scenario.shock() {
            None => var
                .primary(VarMethod::Historical)
                .map(|r| r.var_usd)
                .ok_or_else(|| SentinelError::InsufficientData("historical VaR missing from suite".into())),
            Some(shock) => var
                .scenario_loss(shock)
                .map(|s| s.loss_usd)
                .ok_or_else(|| SentinelError::InsufficientData(format!("no parametric loss for {}", shock.name()))),
        }
    }

    /// Build the stressed balance sheet for one scenario
    pub fn build_balance_sheet(
        &self,
        scenario: Scenario,
        fiat_reserve: f64,
        withdrawal_p99: f64,
        var: &VarSuiteReport,
        insurance: &InsuranceFundOutcome,
    ) -> Result<SolvencyReport> {
        if insurance.scenario != scenario {
            warn!(
                scenario = scenario.name(),
                insurance_scenario = insurance.scenario.name(),
                "Balance sheet built with another scenario's cascade outcome"
            );
        }

        let aum = self.balance_sheet.total_assets_aum;
        let insurance_fund = aum * self.balance_sheet.insurance_fund_ratio;
        let prop_capital = aum * self.balance_sheet.prop_capital_ratio;
        let assets = Assets {
            fiat_reserve,
            insurance_fund,
            prop_capital,
            total: fiat_reserve + insurance_fund + prop_capital,
        };

        let deriv_shortfall = insurance.expected_clawback;
        let market_risk_loss = self.market_risk_loss(scenario, var)?;
        let liabilities = Liabilities {
            withdrawal_demand: withdrawal_p99,
            deriv_shortfall,
            market_risk_loss,
            total: withdrawal_p99 + deriv_shortfall + market_risk_loss,
        };

        let net_position = assets.total - liabilities.total;
        let capital_adequacy_ratio = if liabilities.total > 0.0 {
            assets.total / liabilities.total
        } else {
            f64::INFINITY
        };

        Ok(SolvencyReport {
            scenario,
            min_capital_required: (liabilities.total - assets.total).max(0.0),
            verdict: if net_position >= 0.0 { Verdict::Solvent } else { Verdict::Insolvent },
            capital_adequate: capital_adequacy_ratio >= self.balance_sheet.capital_adequacy_threshold,
            assets,
            liabilities,
            net_position,
            capital_adequacy_ratio,
        })
    }

    /// Balance sheets for every scenario at the baseline fiat reserve
    ///
    /// LUNA reuses the severe withdrawal distribution scaled by the LUNA
    /// multiplier.
    pub fn compute_all(
        &self,
        forecasts: &[WithdrawalForecast],
        var: &VarSuiteReport,
        insurance: &[InsuranceFundOutcome],
    ) -> Result<Vec<SolvencyReport>> {
        let fiat_reserve = self.fiat_reserve();

        let reports = Scenario::ALL
            .iter()
            .map(|scenario| {
                let forecast = forecasts
                    .iter()
                    .find(|f| f.scenario == scenario.withdrawal())
                    .ok_or_else(|| missing("withdrawal forecast", scenario.withdrawal().name()))?;
                let outcome = insurance
                    .iter()
                    .find(|o| o.scenario == *scenario)
                    .ok_or_else(|| missing("insurance outcome", scenario.name()))?;

                let mut withdrawal_p99 = forecast.percentiles.p99;
                if *scenario == Scenario::Luna && forecast.scenario == WithdrawalScenario::Severe {
                    withdrawal_p99 *= self.luna_withdrawal_multiplier;
                }

                let report = self.build_balance_sheet(*scenario, fiat_reserve, withdrawal_p99, var, outcome)?;
                info!(
                    scenario = scenario.name(),
                    net_position = report.net_position,
                    car = report.capital_adequacy_ratio,
                    verdict = %report.verdict,
                    "Solvency verdict"
                );
                Ok(report)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(reports)
    }
}

fn missing(what: &str, scenario: &str) -> SentinelError {
    SentinelError::InsufficientData(format!("no {} for scenario {}", what, scenario))
}

/// Serializes an unbounded ratio with +∞ as null
mod unbounded_ratio {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}
