//! Per-pool market, per-user position, and fee-accrual state (spec §3).

use serde::{Deserialize, Serialize};

use crate::math::{self, Ray, Wei};

/// Developer-fee routing configuration carried on the market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeveloperFeeConfig {
    pub bps: u32,
    pub collector: Option<crate::address::Address>,
}

impl Default for DeveloperFeeConfig {
    fn default() -> Self {
        DeveloperFeeConfig {
            bps: 0,
            collector: None,
        }
    }
}

/// Cached oracle observation for the pool's collateral/borrow pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleCache {
    pub median_wei: Wei,
    pub prev_median_wei: Wei,
    pub updated_block: u64,
}

impl Default for OracleCache {
    fn default() -> Self {
        OracleCache {
            median_wei: Wei::zero(),
            prev_median_wei: Wei::zero(),
            updated_block: 0,
        }
    }
}

/// Per-pool market state. `supplyIndex`/`borrowIndex` start at `R` and are
/// non-decreasing; `totalSupplyShares == 0` iff `totalSupplied == 0` at
/// genesis (spec §3 invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub pool_id: String,
    pub total_supplied: Wei,
    pub total_borrowed: Wei,
    pub total_supply_shares: Wei,
    pub supply_index: Ray,
    pub borrow_index: Ray,
    pub last_update_block: u64,
    pub reserve_factor_bps: u32,
    pub developer_fee: DeveloperFeeConfig,
    pub oracle_cache: OracleCache,
    /// Cumulative `amountOut` borrowed during `borrowed_this_block_number`;
    /// reset to zero whenever a `borrow` call observes a new `current_block`
    /// (spec §4.5.7's per-block cap bounds this sum, not any single call).
    pub borrowed_this_block: Wei,
    pub borrowed_this_block_number: u64,
}

impl Market {
    /// Creates a freshly genesis-initialized market: zero balances, indices
    /// at `R`, `lastUpdateBlock` set to the initializing block.
    pub fn genesis(pool_id: impl Into<String>, current_block: u64) -> Self {
        Market {
            pool_id: pool_id.into(),
            total_supplied: Wei::zero(),
            total_borrowed: Wei::zero(),
            total_supply_shares: Wei::zero(),
            supply_index: Ray::one(),
            borrow_index: Ray::one(),
            last_update_block: current_block,
            reserve_factor_bps: 0,
            developer_fee: DeveloperFeeConfig::default(),
            oracle_cache: OracleCache::default(),
            borrowed_this_block: Wei::zero(),
            borrowed_this_block_number: current_block,
        }
    }

    /// `totalSupplied - totalBorrowed`, the liquidity free to withdraw or
    /// borrow, floored at zero (never negative by invariant, but guarded).
    pub fn available_liquidity(&self) -> Wei {
        self.total_supplied.saturating_sub(&self.total_borrowed)
    }

    pub fn utilisation_bps(&self) -> u32 {
        if self.total_supplied.is_zero() {
            return 0;
        }
        let num = &self.total_borrowed.0 * num_bigint::BigUint::from(math::BPS_DENOM);
        (num / &self.total_supplied.0)
            .try_into()
            .unwrap_or(u32::MAX)
    }
}

/// Per-pool, per-address position. `scaledDebt == 0 <=> debt == 0`;
/// `debt` is always recomputed from `scaledDebt` and the market's current
/// `borrowIndex`, never stored independently of that relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub collateral: Wei,
    pub supply_shares: Wei,
    pub scaled_debt: Wei,
}

impl Default for UserAccount {
    fn default() -> Self {
        UserAccount {
            collateral: Wei::zero(),
            supply_shares: Wei::zero(),
            scaled_debt: Wei::zero(),
        }
    }
}

impl UserAccount {
    /// `debt = scaledDebt * borrowIndex / R`.
    pub fn debt(&self, borrow_index: &Ray) -> Wei {
        math::debt_from_scaled(&self.scaled_debt, borrow_index)
    }
}

/// Monotonically non-decreasing fee buckets (except by explicit
/// withdrawal), per pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeAccrual {
    pub protocol_fees: Wei,
    pub developer_fees: Wei,
}

impl Default for FeeAccrual {
    fn default() -> Self {
        FeeAccrual {
            protocol_fees: Wei::zero(),
            developer_fees: Wei::zero(),
        }
    }
}
