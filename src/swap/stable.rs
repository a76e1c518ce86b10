//! Stable deposit / cash-out lifecycle (spec §4.6.2): fiat-backed deposit
//! vouchers, cash-out intents with paired escrow locks, and the soft
//! inventory invariant `payouts <= deposits`.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::error::{EngineError, Result};
use crate::math::Wei;
use crate::storage::SwapStore;

fn normalize_asset(asset: &str) -> Result<String> {
    let upper = asset.trim().to_uppercase();
    if upper != "USDC" && upper != "USDT" {
        return Err(EngineError::InvalidAmount {
            reason: format!("unsupported stable asset {asset}"),
        });
    }
    Ok(upper)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasurySoftInventory {
    pub asset: String,
    pub deposits: Wei,
    pub payouts: Wei,
}

impl TreasurySoftInventory {
    pub fn balance(&self) -> Wei {
        self.deposits.saturating_sub(&self.payouts)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositVoucher {
    pub invoice_id: String,
    pub asset: String,
    pub amount: Wei,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashOutStatus {
    Pending,
    Settled,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashOutIntent {
    pub intent_id: String,
    pub asset: String,
    pub stable_amount: Wei,
    pub nhb_amount: Wei,
    pub lock_id: String,
    pub status: CashOutStatus,
    pub created_at: i64,
    pub settled_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowLock {
    pub lock_id: String,
    pub intent_id: String,
    pub asset: String,
    pub amount: Wei,
    pub burned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub intent_id: String,
    pub asset: String,
    pub stable_amount: Wei,
    pub nhb_amount: Wei,
    pub settled_at: i64,
}

fn corrupt(e: serde_json::Error) -> EngineError {
    EngineError::Corrupt {
        reason: e.to_string(),
    }
}

fn inventory_key(asset: &str) -> String {
    format!("swap/stable/inventory/{asset}")
}
fn deposit_voucher_key(id: &str) -> String {
    format!("swap/stable/voucher/{id}")
}
const DEPOSIT_INDEX_KEY: &str = "swap/stable/voucher/index";
fn intent_key(id: &str) -> String {
    format!("swap/stable/intent/{id}")
}
fn escrow_key(id: &str) -> String {
    format!("swap/stable/escrow/{id}")
}
fn receipt_key(id: &str) -> String {
    format!("swap/stable/receipt/{id}")
}

/// Operates over a `SwapStore`, never opening storage directly (spec §4.2).
pub struct StableEngine<'a> {
    store: &'a dyn SwapStore,
    clock: SharedClock,
}

impl<'a> StableEngine<'a> {
    pub fn new(store: &'a dyn SwapStore, clock: SharedClock) -> Self {
        StableEngine { store, clock }
    }

    pub fn get_inventory(&self, asset: &str) -> Result<TreasurySoftInventory> {
        match self.store.kv_get(inventory_key(asset).as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(corrupt),
            None => Ok(TreasurySoftInventory {
                asset: asset.to_string(),
                deposits: Wei::zero(),
                payouts: Wei::zero(),
            }),
        }
    }

    /// Enforces `payouts <= deposits` before persisting; any update that
    /// would violate it fails before any state is written (spec §3).
    fn put_inventory(&self, inventory: TreasurySoftInventory) -> Result<()> {
        if inventory.payouts.0 > inventory.deposits.0 {
            return Err(EngineError::InvalidAmount {
                reason: format!(
                    "soft inventory invariant violated for {}: payouts {} > deposits {}",
                    inventory.asset, inventory.payouts, inventory.deposits
                ),
            });
        }
        let encoded = serde_json::to_vec(&inventory).map_err(corrupt)?;
        self.store.kv_put(inventory_key(&inventory.asset).as_bytes(), &encoded)
    }

    /// §4.6.2 `putDepositVoucher`.
    pub fn put_deposit_voucher(&self, invoice_id: &str, asset: &str, amount: &Wei) -> Result<()> {
        if invoice_id.trim().is_empty() {
            return Err(EngineError::InvalidAmount {
                reason: "invoiceId must not be empty".to_string(),
            });
        }
        let asset = normalize_asset(asset)?;
        if amount.is_zero() {
            return Err(EngineError::InvalidAmount {
                reason: "deposit amount must be > 0".to_string(),
            });
        }
        let key = deposit_voucher_key(invoice_id);
        if self.store.kv_get(key.as_bytes())?.is_some() {
            return Err(EngineError::IdempotencyConflict {
                key: invoice_id.to_string(),
            });
        }

        let voucher = DepositVoucher {
            invoice_id: invoice_id.to_string(),
            asset: asset.clone(),
            amount: amount.clone(),
            created_at: self.clock.now_unix(),
        };
        let encoded = serde_json::to_vec(&voucher).map_err(corrupt)?;
        self.store.kv_put(key.as_bytes(), &encoded)?;

        let mut inventory = self.get_inventory(&asset)?;
        inventory.asset = asset;
        inventory.deposits = &inventory.deposits + amount;
        self.put_inventory(inventory)?;

        #[derive(Serialize)]
        struct IndexEntry<'a> {
            id: &'a str,
            created_at: i64,
        }
        let entry_bytes = serde_json::to_vec(&IndexEntry {
            id: invoice_id,
            created_at: voucher.created_at,
        })
        .map_err(corrupt)?;
        self.store.kv_append(DEPOSIT_INDEX_KEY.as_bytes(), &entry_bytes)
    }

    /// §4.6.2 `createCashOutIntent`.
    pub fn create_cash_out_intent(
        &self,
        intent_id: &str,
        asset: &str,
        stable_amount: &Wei,
        nhb_amount: &Wei,
    ) -> Result<()> {
        if intent_id.trim().is_empty() {
            return Err(EngineError::InvalidAmount {
                reason: "intentId must not be empty".to_string(),
            });
        }
        let asset = normalize_asset(asset)?;
        if self.store.kv_get(intent_key(intent_id).as_bytes())?.is_some() {
            return Err(EngineError::IdempotencyConflict {
                key: intent_id.to_string(),
            });
        }

        let inventory = self.get_inventory(&asset)?;
        let balance = inventory.balance();
        if balance.0 < stable_amount.0 {
            return Err(EngineError::InsufficientLiquidity {
                need: stable_amount.to_string(),
                available: balance.to_string(),
            });
        }

        let intent = CashOutIntent {
            intent_id: intent_id.to_string(),
            asset: asset.clone(),
            stable_amount: stable_amount.clone(),
            nhb_amount: nhb_amount.clone(),
            lock_id: intent_id.to_string(),
            status: CashOutStatus::Pending,
            created_at: self.clock.now_unix(),
            settled_at: None,
        };
        let encoded = serde_json::to_vec(&intent).map_err(corrupt)?;
        self.store.kv_put(intent_key(intent_id).as_bytes(), &encoded)?;

        let lock = EscrowLock {
            lock_id: intent_id.to_string(),
            intent_id: intent_id.to_string(),
            asset,
            amount: stable_amount.clone(),
            burned: false,
        };
        let lock_bytes = serde_json::to_vec(&lock).map_err(corrupt)?;
        self.store.kv_put(escrow_key(intent_id).as_bytes(), &lock_bytes)
    }

    pub fn get_intent(&self, intent_id: &str) -> Result<Option<CashOutIntent>> {
        match self.store.kv_get(intent_key(intent_id).as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(corrupt).map(Some),
            None => Ok(None),
        }
    }

    /// §4.6.2 `recordPayoutReceipt`.
    pub fn record_payout_receipt(
        &self,
        intent_id: &str,
        asset: &str,
        stable_amount: &Wei,
        nhb_amount: &Wei,
    ) -> Result<()> {
        let asset = normalize_asset(asset)?;
        if self.store.kv_get(receipt_key(intent_id).as_bytes())?.is_some() {
            return Err(EngineError::IdempotencyConflict {
                key: intent_id.to_string(),
            });
        }

        let mut intent = self
            .get_intent(intent_id)?
            .ok_or_else(|| EngineError::NotFound {
                what: format!("cash-out intent {intent_id}"),
            })?;
        if intent.status != CashOutStatus::Pending {
            return Err(EngineError::InvalidAmount {
                reason: format!("intent {intent_id} is not pending"),
            });
        }
        if intent.asset != asset
            || intent.stable_amount.0 != stable_amount.0
            || intent.nhb_amount.0 != nhb_amount.0
        {
            return Err(EngineError::InvalidAmount {
                reason: format!("payout for {intent_id} does not match intent"),
            });
        }

        let mut lock: EscrowLock = self
            .store
            .kv_get(escrow_key(intent_id).as_bytes())?
            .map(|b| serde_json::from_slice(&b).map_err(corrupt))
            .transpose()?
            .ok_or_else(|| EngineError::NotFound {
                what: format!("escrow lock {intent_id}"),
            })?;

        self.store
            .adjust_token_supply("NHB", &(-BigInt::from(nhb_amount.0.clone())))?;
        lock.burned = true;
        let lock_bytes = serde_json::to_vec(&lock).map_err(corrupt)?;
        self.store.kv_put(escrow_key(intent_id).as_bytes(), &lock_bytes)?;

        let mut inventory = self.get_inventory(&asset)?;
        inventory.payouts = &inventory.payouts + stable_amount;
        self.put_inventory(inventory)?;

        let settled_at = self.clock.now_unix();
        intent.status = CashOutStatus::Settled;
        intent.settled_at = Some(settled_at);
        let intent_bytes = serde_json::to_vec(&intent).map_err(corrupt)?;
        self.store.kv_put(intent_key(intent_id).as_bytes(), &intent_bytes)?;

        let receipt = PayoutReceipt {
            intent_id: intent_id.to_string(),
            asset,
            stable_amount: stable_amount.clone(),
            nhb_amount: nhb_amount.clone(),
            settled_at,
        };
        let receipt_bytes = serde_json::to_vec(&receipt).map_err(corrupt)?;
        self.store.kv_put(receipt_key(intent_id).as_bytes(), &receipt_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::MemSwapStore;
    use chrono::Utc;
    use std::sync::Arc;

    fn engine(store: &MemSwapStore) -> StableEngine<'_> {
        StableEngine::new(store, Arc::new(FixedClock(Utc::now())))
    }

    #[test]
    fn deposit_then_cash_out_then_payout_lifecycle() {
        let store = MemSwapStore::new();
        let e = engine(&store);
        e.put_deposit_voucher("inv-1", "usdc", &Wei::from(1000u64)).unwrap();
        assert_eq!(e.get_inventory("USDC").unwrap().balance(), Wei::from(1000u64));

        e.create_cash_out_intent("intent-1", "usdc", &Wei::from(400u64), &Wei::from(400u64))
            .unwrap();
        let intent = e.get_intent("intent-1").unwrap().unwrap();
        assert_eq!(intent.status, CashOutStatus::Pending);

        e.record_payout_receipt("intent-1", "usdc", &Wei::from(400u64), &Wei::from(400u64))
            .unwrap();
        let settled = e.get_intent("intent-1").unwrap().unwrap();
        assert_eq!(settled.status, CashOutStatus::Settled);
        assert!(settled.settled_at.is_some());

        let inventory = e.get_inventory("USDC").unwrap();
        assert_eq!(inventory.balance(), Wei::from(600u64));
    }

    #[test]
    fn cash_out_rejects_when_balance_insufficient() {
        let store = MemSwapStore::new();
        let e = engine(&store);
        e.put_deposit_voucher("inv-1", "usdc", &Wei::from(100u64)).unwrap();
        let err = e
            .create_cash_out_intent("intent-1", "usdc", &Wei::from(500u64), &Wei::from(500u64))
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_liquidity");
    }

    #[test]
    fn record_payout_rejects_double_settlement() {
        let store = MemSwapStore::new();
        let e = engine(&store);
        e.put_deposit_voucher("inv-1", "usdc", &Wei::from(1000u64)).unwrap();
        e.create_cash_out_intent("intent-1", "usdc", &Wei::from(400u64), &Wei::from(400u64))
            .unwrap();
        e.record_payout_receipt("intent-1", "usdc", &Wei::from(400u64), &Wei::from(400u64))
            .unwrap();
        let err = e
            .record_payout_receipt("intent-1", "usdc", &Wei::from(400u64), &Wei::from(400u64))
            .unwrap_err();
        assert_eq!(err.code(), "idempotency_conflict");
    }
}
