//! # Risk Models
//!
//! Quantitative models layered on the market and withdrawal simulators.
//!
//! ## Modules
//!
//! - `var`: Historical, EWMA-filtered, stressed and parametric scenario VaR
//! - `cascade`: Trader book generation and the liquidation cascade
//! - `insurance`: Insurance fund Monte Carlo over the cascade
//! - `reserve`: Newsvendor reserve optimization and tier allocation
//! - `stress`: Failure rate, time to insolvency and the safety frontier
//! - `solvency`: Stressed balance sheet and verdict per scenario

pub mod cascade;
pub mod insurance;
pub mod reserve;
pub mod solvency;
pub mod stress;
pub mod var;

pub use cascade::{generate_traders, CascadeResult, CascadeStep, LiquidationCascade, Side, Trader, TraderType};
pub use insurance::{InsuranceFundOutcome, InsuranceFundSimulator};
pub use reserve::{
    critical_ratio, tier_allocation, CostCurvePoint, NewsvendorOptimizer, ReserveDecision, ScenarioReserve,
    TierAllocation,
};
pub use solvency::{waterfall, SolvencyIntegrator, SolvencyReport, Verdict, WaterfallStep};
pub use stress::{
    run_stress_test, safety_frontier, time_to_insolvency, FrontierPoint, ReservePolicy, ScenarioStress,
    StressTestResult, StressTester,
};
pub use var::{HybridVarSuite, ScenarioLoss, VarMethod, VarResult, VarSuiteReport};
