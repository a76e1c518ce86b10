//! Shared data model: the global per-address ledger (spec §3 "Account").

use serde::{Deserialize, Serialize};

use crate::math::Wei;

/// The two native assets the core mutates balances of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    /// Liquidity token.
    Nhb,
    /// Collateral / stake token.
    Znhb,
}

impl Asset {
    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Nhb => "NHB",
            Asset::Znhb => "ZNHB",
        }
    }
}

/// Per-address balances for the two native assets. The engine exclusively
/// mutates balances of the module treasury, the collateral custody address,
/// and whichever user participates in an operation (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub nhb_balance: Wei,
    pub znhb_balance: Wei,
}

impl Default for Account {
    fn default() -> Self {
        Account {
            nhb_balance: Wei::zero(),
            znhb_balance: Wei::zero(),
        }
    }
}

impl Account {
    pub fn balance(&self, asset: Asset) -> &Wei {
        match asset {
            Asset::Nhb => &self.nhb_balance,
            Asset::Znhb => &self.znhb_balance,
        }
    }

    pub fn balance_mut(&mut self, asset: Asset) -> &mut Wei {
        match asset {
            Asset::Nhb => &mut self.nhb_balance,
            Asset::Znhb => &mut self.znhb_balance,
        }
    }
}

/// Well-known addresses the engine mutates that aren't a transacting user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAddresses {
    pub module_treasury: crate::address::Address,
    pub collateral_custody: crate::address::Address,
}
