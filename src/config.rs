//! Engine configuration (spec §6 "Configuration recognized options").
//! Plain serde-derived structs with `Default` impls; no file-format parsing
//! lives here, that's a host concern outside this crate's scope.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::lending::interest::InterestModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowCaps {
    /// 0 disables the check.
    pub per_block: u64,
    pub total: u64,
    pub utilisation_bps: u32,
}

impl Default for BorrowCaps {
    fn default() -> Self {
        BorrowCaps {
            per_block: 0,
            total: 0,
            utilisation_bps: BPS_DENOM_DEFAULT,
        }
    }
}

const BPS_DENOM_DEFAULT: u32 = 10_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LendingPauses {
    pub supply: bool,
    pub withdraw: bool,
    pub borrow: bool,
    pub repay: bool,
    pub liquidate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub max_age_blocks: u64,
    pub max_deviation_bps: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            max_age_blocks: 0,
            max_deviation_bps: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollateralRouting {
    pub liquidator_bps: u32,
    pub developer_bps: u32,
    pub developer_target: Option<Address>,
    pub protocol_bps: u32,
    pub protocol_target: Option<Address>,
}

/// Per-pool risk and fee configuration for the Lending Engine (C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingConfig {
    pub max_ltv_bps: u32,
    pub liquidation_threshold_bps: u32,
    pub liquidation_bonus_bps: u32,
    pub reserve_factor_bps: u32,
    pub protocol_fee_bps: u32,
    pub developer_fee_bps: u32,
    pub developer_fee_collector: Option<Address>,
    pub developer_fee_cap_bps: u32,
    pub interest_model: Option<InterestModel>,
    pub borrow_caps: BorrowCaps,
    pub pauses: LendingPauses,
    pub oracle: OracleConfig,
    pub collateral_routing: CollateralRouting,
}

impl Default for LendingConfig {
    fn default() -> Self {
        LendingConfig {
            max_ltv_bps: 0,
            liquidation_threshold_bps: 0,
            liquidation_bonus_bps: 0,
            reserve_factor_bps: 0,
            protocol_fee_bps: 0,
            developer_fee_bps: 0,
            developer_fee_collector: None,
            developer_fee_cap_bps: 0,
            interest_model: None,
            borrow_caps: BorrowCaps::default(),
            pauses: LendingPauses::default(),
            oracle: OracleConfig::default(),
            collateral_routing: CollateralRouting::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CashOutCaps {
    pub asset_caps: std::collections::HashMap<String, u64>,
    pub tiers: std::collections::HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwapRiskConfig {
    pub per_address_daily_cap_wei: u64,
    pub per_address_monthly_cap_wei: u64,
    pub per_tx_min_wei: u64,
    pub per_tx_max_wei: u64,
    pub velocity_window_seconds: u64,
    pub velocity_max_mints: u32,
    pub sanctions_check_enabled: bool,
}

/// Swap / Stable Engine (C6) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConfig {
    pub allowed_fiat: Vec<String>,
    pub max_quote_age_seconds: i64,
    pub slippage_bps: u32,
    pub oracle_priority: Vec<String>,
    pub twap_window_seconds: i64,
    pub twap_sample_cap: usize,
    pub price_proof_max_deviation_bps: u32,
    pub payout_authorities: Vec<Address>,
    pub risk: SwapRiskConfig,
    pub providers_allow: Vec<String>,
    pub sanctions_deny_list: Vec<String>,
    pub cash_out: CashOutCaps,
}

impl Default for SwapConfig {
    fn default() -> Self {
        SwapConfig {
            allowed_fiat: vec!["USD".to_string()],
            max_quote_age_seconds: 300,
            slippage_bps: 0,
            oracle_priority: Vec::new(),
            twap_window_seconds: 3600,
            twap_sample_cap: 128,
            price_proof_max_deviation_bps: 0,
            payout_authorities: Vec::new(),
            risk: SwapRiskConfig::default(),
            providers_allow: Vec::new(),
            sanctions_deny_list: Vec::new(),
            cash_out: CashOutCaps::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lending_config_default_has_no_interest_model() {
        let cfg = LendingConfig::default();
        assert!(cfg.interest_model.is_none());
        assert_eq!(cfg.borrow_caps.per_block, 0);
    }

    #[test]
    fn swap_config_default_has_usd_allowed() {
        let cfg = SwapConfig::default();
        assert_eq!(cfg.allowed_fiat, vec!["USD".to_string()]);
    }
}
