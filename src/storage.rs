//! State Adapter Contract (C2): the polymorphic capability set the engines
//! consume instead of opening storage themselves (spec §4.2). Concrete
//! backings live in `persistence.rs` (`RocksStateStore`) and in this
//! module's `MemStateStore` (test/in-memory backing, grounded on the
//! teacher's `UTXOSet` `HashMap` + address-index shape).

use num_bigint::BigInt;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::address::Address;
use crate::error::{EngineError, Result};
use crate::lending::market::{FeeAccrual, Market, UserAccount};
use crate::model::Account;

/// Lending-side storage capability: markets, per-pool user positions, fee
/// accrual buckets, and the global account ledger.
pub trait StateStore: Send + Sync {
    fn get_account(&self, addr: &Address) -> Result<Account>;
    fn put_account(&self, addr: &Address, account: Account) -> Result<()>;

    fn get_market(&self, pool_id: &str) -> Result<Option<Market>>;
    fn put_market(&self, pool_id: &str, market: Market) -> Result<()>;

    /// Lazily materialized: callers receive a zero-valued default when no
    /// position has ever been written for `(pool_id, addr)`.
    fn get_user_account(&self, pool_id: &str, addr: &Address) -> Result<UserAccount>;
    fn put_user_account(&self, pool_id: &str, addr: &Address, account: UserAccount) -> Result<()>;

    fn get_fee_accrual(&self, pool_id: &str) -> Result<FeeAccrual>;
    fn put_fee_accrual(&self, pool_id: &str, accrual: FeeAccrual) -> Result<()>;

    fn list_markets(&self) -> Result<Vec<String>>;
}

/// Swap/stable-side storage capability: a flat append-capable KV namespace
/// plus the one privileged operation (token-supply adjustment) the swap
/// engine needs that a plain KV store can't express.
pub trait SwapStore: Send + Sync {
    fn kv_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn kv_put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    /// Appends `value` to the ordered list stored under `key`; values are
    /// retrievable via `kv_get_list` in insertion order.
    fn kv_append(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn kv_get_list(&self, key: &[u8]) -> Result<Vec<Vec<u8>>>;
    fn kv_delete(&self, key: &[u8]) -> Result<()>;

    /// Adjusts the circulating supply of `symbol` by `delta` (negative to
    /// burn). Must fail (not saturate) on underflow below zero.
    fn adjust_token_supply(&self, symbol: &str, delta: &BigInt) -> Result<()>;
}

/// Consulted by every mutating operation; when `is_paused(module)` is true
/// the operation returns `ModulePaused` before any state is read or
/// written (spec §4.4).
pub trait PauseView: Send + Sync {
    fn is_paused(&self, module: &str) -> bool;
}

/// A `PauseView` backed by an in-memory set, for tests and simple hosts.
#[derive(Debug, Default)]
pub struct StaticPauseView {
    paused: RwLock<std::collections::HashSet<String>>,
}

impl StaticPauseView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_paused(&self, module: &str, paused: bool) {
        let mut set = self.paused.write().unwrap();
        if paused {
            set.insert(module.to_string());
        } else {
            set.remove(module);
        }
    }
}

impl PauseView for StaticPauseView {
    fn is_paused(&self, module: &str) -> bool {
        self.paused.read().unwrap().contains(module)
    }
}

/// In-memory `StateStore`, grounded on the teacher's `UTXOSet`: a `HashMap`
/// guarded by a single `RwLock`, since the host serializes transactions
/// (spec §5) and this store only needs interior mutability, not per-key
/// locking.
#[derive(Debug, Default)]
pub struct MemStateStore {
    inner: RwLock<MemStateInner>,
}

#[derive(Debug, Default)]
struct MemStateInner {
    accounts: HashMap<Address, Account>,
    markets: HashMap<String, Market>,
    user_accounts: HashMap<(String, Address), UserAccount>,
    fee_accruals: HashMap<String, FeeAccrual>,
}

impl MemStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemStateStore {
    fn get_account(&self, addr: &Address) -> Result<Account> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .accounts
            .get(addr)
            .cloned()
            .unwrap_or_default())
    }

    fn put_account(&self, addr: &Address, account: Account) -> Result<()> {
        self.inner.write().unwrap().accounts.insert(*addr, account);
        Ok(())
    }

    fn get_market(&self, pool_id: &str) -> Result<Option<Market>> {
        Ok(self.inner.read().unwrap().markets.get(pool_id).cloned())
    }

    fn put_market(&self, pool_id: &str, market: Market) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .markets
            .insert(pool_id.to_string(), market);
        Ok(())
    }

    fn get_user_account(&self, pool_id: &str, addr: &Address) -> Result<UserAccount> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .user_accounts
            .get(&(pool_id.to_string(), *addr))
            .cloned()
            .unwrap_or_default())
    }

    fn put_user_account(&self, pool_id: &str, addr: &Address, account: UserAccount) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .user_accounts
            .insert((pool_id.to_string(), *addr), account);
        Ok(())
    }

    fn get_fee_accrual(&self, pool_id: &str) -> Result<FeeAccrual> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .fee_accruals
            .get(pool_id)
            .cloned()
            .unwrap_or_default())
    }

    fn put_fee_accrual(&self, pool_id: &str, accrual: FeeAccrual) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .fee_accruals
            .insert(pool_id.to_string(), accrual);
        Ok(())
    }

    fn list_markets(&self) -> Result<Vec<String>> {
        Ok(self.inner.read().unwrap().markets.keys().cloned().collect())
    }
}

/// In-memory `SwapStore`, used by the same tests/hosts that use
/// `MemStateStore`.
#[derive(Debug, Default)]
pub struct MemSwapStore {
    inner: RwLock<MemSwapInner>,
}

#[derive(Debug, Default)]
struct MemSwapInner {
    kv: HashMap<Vec<u8>, Vec<u8>>,
    lists: HashMap<Vec<u8>, Vec<Vec<u8>>>,
    supply: HashMap<String, BigInt>,
}

impl MemSwapStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SwapStore for MemSwapStore {
    fn kv_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().unwrap().kv.get(key).cloned())
    }

    fn kv_put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .kv
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn kv_append(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .lists
            .entry(key.to_vec())
            .or_default()
            .push(value.to_vec());
        Ok(())
    }

    fn kv_get_list(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .lists
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    fn kv_delete(&self, key: &[u8]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.kv.remove(key);
        inner.lists.remove(key);
        Ok(())
    }

    fn adjust_token_supply(&self, symbol: &str, delta: &BigInt) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let entry = inner.supply.entry(symbol.to_string()).or_default();
        let projected = &*entry + delta;
        if projected < BigInt::from(0) {
            return Err(EngineError::SupplyUnderflow {
                symbol: symbol.to_string(),
                have: entry.to_string(),
                requested: (-delta).to_string(),
            });
        }
        *entry = projected;
        Ok(())
    }
}
