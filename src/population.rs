//! Synthetic exchange account population
//!
//! Retail and institutional fiat balances are drawn log-normal, the
//! institutional group is rescaled to hold the configured share of total
//! balance, and the whole book is scaled so balances sum to the target AUM.

use crate::config::PopulationConfig;
use crate::error::{Result, SentinelError};
use crate::rng::{RngContext, Stream};
use rand_distr::{Distribution, LogNormal};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Retail,
    Institutional,
}

/// One customer account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: usize,
    pub account_type: AccountType,

    /// Fiat balance (USD)
    pub balance: f64,
}

/// Generate the account book; balances sum to `target_aum`
pub fn generate_accounts(config: &PopulationConfig, target_aum: f64, ctx: &RngContext) -> Result<Vec<Account>> {
    if !(target_aum.is_finite() && target_aum > 0.0) {
        return Err(SentinelError::InvalidParameter(format!(
            "target AUM must be positive, got {}",
            target_aum
        )));
    }

    let (n_retail, n_inst) = config.split();
    let mut rng = ctx.stream(Stream::Accounts, 0);

    let retail_dist = LogNormal::new(config.retail_log_mu, config.retail_log_sigma)
        .map_err(|e| SentinelError::Distribution(e.to_string()))?;
    let inst_dist = LogNormal::new(config.inst_log_mu, config.inst_log_sigma)
        .map_err(|e| SentinelError::Distribution(e.to_string()))?;

    let retail: Vec<f64> = (0..n_retail).map(|_| retail_dist.sample(&mut rng)).collect();
    let inst: Vec<f64> = (0..n_inst).map(|_| inst_dist.sample(&mut rng)).collect();

    let retail_sum: f64 = retail.iter().sum();
    let inst_sum: f64 = inst.iter().sum();
    if retail_sum <= 0.0 || inst_sum <= 0.0 {
        return Err(SentinelError::NumericalInstability("account balances summed to zero".into()));
    }

    // Institutional group scaled so it holds exactly the configured share
    let share = config.inst_balance_share;
    let inst_scale = retail_sum * share / ((1.0 - share) * inst_sum);

    let raw_total = retail_sum + inst_sum * inst_scale;
    let scale = target_aum / raw_total;

    let accounts: Vec<Account> = retail
        .into_iter()
        .map(|b| (AccountType::Retail, b * scale))
        .chain(inst.into_iter().map(|b| (AccountType::Institutional, b * inst_scale * scale)))
        .enumerate()
        .map(|(id, (account_type, balance))| Account {
            id,
            account_type,
            balance,
        })
        .collect();

    let balances: Vec<f64> = accounts.iter().map(|a| a.balance).collect();
    info!(
        n_retail,
        n_inst,
        inst_share = institutional_share(&accounts),
        gini = gini(&balances),
        "Account population generated"
    );

    Ok(accounts)
}

/// Fraction of total balance held by institutional accounts
pub fn institutional_share(accounts: &[Account]) -> f64 {
    let total: f64 = accounts.iter().map(|a| a.balance).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let inst: f64 = accounts
        .iter()
        .filter(|a| a.account_type == AccountType::Institutional)
        .map(|a| a.balance)
        .sum();
    inst / total
}

/// Gini coefficient of a balance distribution (0 = equal, 1 = concentrated)
pub fn gini(balances: &[f64]) -> f64 {
    let sorted = crate::stats::sorted(balances);
    let n = sorted.len() as f64;
    let total: f64 = sorted.iter().sum();
    if sorted.is_empty() || total <= 0.0 {
        return 0.0;
    }

    let mut cumulative = 0.0;
    let mut cumsum_total = 0.0;
    for b in &sorted {
        cumulative += b;
        cumsum_total += cumulative;
    }
    (n + 1.0 - 2.0 * cumsum_total / total) / n
}

/// Lorenz curve as (population share, wealth share) points
pub fn lorenz_curve(balances: &[f64]) -> Vec<(f64, f64)> {
    let sorted = crate::stats::sorted(balances);
    let total: f64 = sorted.iter().sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let xs = crate::stats::linspace(0.0, 1.0, sorted.len());
    let mut cumulative = 0.0;
    xs.into_iter()
        .zip(sorted.iter())
        .map(|(x, b)| {
            cumulative += b;
            (x, cumulative / total)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small_config() -> PopulationConfig {
        PopulationConfig {
            n_users: 5_000,
            ..PopulationConfig::default()
        }
    }

    #[test]
    fn test_balances_sum_to_target() {
        let accounts = generate_accounts(&small_config(), 2.9e9, &RngContext::new(42)).unwrap();
        let total: f64 = accounts.iter().map(|a| a.balance).sum();

        assert_eq!(accounts.len(), 5_000);
        assert_relative_eq!(total, 2.9e9, max_relative = 1e-9);
        assert!(accounts.iter().all(|a| a.balance > 0.0));
    }

    #[test]
    fn test_institutional_share() {
        let accounts = generate_accounts(&small_config(), 2.9e9, &RngContext::new(42)).unwrap();
        assert_relative_eq!(institutional_share(&accounts), 0.65, epsilon = 1e-9);

        let n_inst = accounts
            .iter()
            .filter(|a| a.account_type == AccountType::Institutional)
            .count();
        assert_eq!(n_inst, 250);
    }

    #[test]
    fn test_invalid_target_rejected() {
        assert!(generate_accounts(&small_config(), 0.0, &RngContext::new(1)).is_err());
    }

    #[test]
    fn test_gini_bounds() {
        assert_relative_eq!(gini(&[5.0, 5.0, 5.0, 5.0]), 0.0, epsilon = 1e-12);

        let concentrated = gini(&[0.0, 0.0, 0.0, 100.0]);
        assert_relative_eq!(concentrated, 0.75, epsilon = 1e-12);

        let accounts = generate_accounts(&small_config(), 2.9e9, &RngContext::new(42)).unwrap();
        let balances: Vec<f64> = accounts.iter().map(|a| a.balance).collect();
        let g = gini(&balances);
        assert!(g > 0.5 && g < 1.0, "gini {}", g);
    }

    #[test]
    fn test_lorenz_curve_endpoints() {
        let curve = lorenz_curve(&[1.0, 2.0, 3.0, 4.0]);

        assert_eq!(curve.len(), 4);
        assert_eq!(curve[0].0, 0.0);
        assert_relative_eq!(curve[0].1, 0.1);
        assert_eq!(curve[3], (1.0, 1.0));
    }
}
