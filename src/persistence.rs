//! Concrete State Adapter backing store (C2): `RocksStateStore` persists
//! both the `StateStore` and `SwapStore` capabilities over rocksdb column
//! families, grounded on the teacher's `BlockchainDB` (`open_cf_descriptors`,
//! one column family per concern, bincode-encoded values, `?`-propagated
//! `rocksdb::Error`).

use num_bigint::BigInt;
use std::path::Path;
use std::sync::Arc;

use crate::address::Address;
use crate::error::{EngineError, Result};
use crate::lending::market::{FeeAccrual, Market, UserAccount};
use crate::model::Account;
use crate::storage::{StateStore, SwapStore};

const ACCOUNTS_CF: &str = "accounts";
const MARKETS_CF: &str = "markets";
const USER_ACCOUNTS_CF: &str = "user_accounts";
const FEE_ACCRUALS_CF: &str = "fee_accruals";
const SWAP_KV_CF: &str = "swap_kv";
const SWAP_LISTS_CF: &str = "swap_lists";
const SUPPLY_CF: &str = "token_supply";

/// Rocksdb-backed implementation of both storage capability traits, keyed
/// per the persisted layout in spec §6. A host opens one `RocksStateStore`
/// per data directory and hands `&dyn StateStore` / `&dyn SwapStore`
/// references to the engines; the engines never touch `rocksdb` directly.
pub struct RocksStateStore {
    db: rocksdb::DB,
}

impl RocksStateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            rocksdb::ColumnFamilyDescriptor::new(ACCOUNTS_CF, rocksdb::Options::default()),
            rocksdb::ColumnFamilyDescriptor::new(MARKETS_CF, rocksdb::Options::default()),
            rocksdb::ColumnFamilyDescriptor::new(USER_ACCOUNTS_CF, rocksdb::Options::default()),
            rocksdb::ColumnFamilyDescriptor::new(FEE_ACCRUALS_CF, rocksdb::Options::default()),
            rocksdb::ColumnFamilyDescriptor::new(SWAP_KV_CF, rocksdb::Options::default()),
            rocksdb::ColumnFamilyDescriptor::new(SWAP_LISTS_CF, rocksdb::Options::default()),
            rocksdb::ColumnFamilyDescriptor::new(SUPPLY_CF, rocksdb::Options::default()),
        ];

        let db = rocksdb::DB::open_cf_descriptors(&opts, path, cf_descriptors)?;
        Ok(Self { db })
    }

    pub fn compact(&self) {
        self.db.compact_range::<&[u8], &[u8]>(None, None);
    }

    fn cf(&self, name: &str) -> Result<Arc<rocksdb::BoundColumnFamily>> {
        self.db.cf_handle(name).ok_or_else(|| EngineError::Corrupt {
            reason: format!("column family '{name}' not found"),
        })
    }

    fn get_bincode<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(&cf, key)? {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes)
                    .map_err(|e| EngineError::Corrupt { reason: e.to_string() })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put_bincode<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes =
            bincode::serialize(value).map_err(|e| EngineError::Corrupt { reason: e.to_string() })?;
        self.db.put_cf(&cf, key, bytes)?;
        Ok(())
    }

    fn user_account_key(pool_id: &str, addr: &Address) -> Vec<u8> {
        format!("{pool_id}/{}", addr.to_hex()).into_bytes()
    }
}

impl StateStore for RocksStateStore {
    fn get_account(&self, addr: &Address) -> Result<Account> {
        Ok(self.get_bincode(ACCOUNTS_CF, &addr.0)?.unwrap_or_default())
    }

    fn put_account(&self, addr: &Address, account: Account) -> Result<()> {
        self.put_bincode(ACCOUNTS_CF, &addr.0, &account)
    }

    fn get_market(&self, pool_id: &str) -> Result<Option<Market>> {
        self.get_bincode(MARKETS_CF, pool_id.as_bytes())
    }

    fn put_market(&self, pool_id: &str, market: Market) -> Result<()> {
        self.put_bincode(MARKETS_CF, pool_id.as_bytes(), &market)
    }

    fn get_user_account(&self, pool_id: &str, addr: &Address) -> Result<UserAccount> {
        let key = Self::user_account_key(pool_id, addr);
        Ok(self.get_bincode(USER_ACCOUNTS_CF, &key)?.unwrap_or_default())
    }

    fn put_user_account(&self, pool_id: &str, addr: &Address, account: UserAccount) -> Result<()> {
        let key = Self::user_account_key(pool_id, addr);
        self.put_bincode(USER_ACCOUNTS_CF, &key, &account)
    }

    fn get_fee_accrual(&self, pool_id: &str) -> Result<FeeAccrual> {
        Ok(self
            .get_bincode(FEE_ACCRUALS_CF, pool_id.as_bytes())?
            .unwrap_or_default())
    }

    fn put_fee_accrual(&self, pool_id: &str, accrual: FeeAccrual) -> Result<()> {
        self.put_bincode(FEE_ACCRUALS_CF, pool_id.as_bytes(), &accrual)
    }

    fn list_markets(&self) -> Result<Vec<String>> {
        let cf = self.cf(MARKETS_CF)?;
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (key, _) = item?;
            ids.push(String::from_utf8_lossy(&key).into_owned());
        }
        ids.sort();
        Ok(ids)
    }
}

impl SwapStore for RocksStateStore {
    fn kv_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(SWAP_KV_CF)?;
        Ok(self.db.get_cf(&cf, key)?)
    }

    fn kv_put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf(SWAP_KV_CF)?;
        self.db.put_cf(&cf, key, value)?;
        Ok(())
    }

    fn kv_append(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut list: Vec<Vec<u8>> = self.get_bincode(SWAP_LISTS_CF, key)?.unwrap_or_default();
        list.push(value.to_vec());
        self.put_bincode(SWAP_LISTS_CF, key, &list)
    }

    fn kv_get_list(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self.get_bincode(SWAP_LISTS_CF, key)?.unwrap_or_default())
    }

    fn kv_delete(&self, key: &[u8]) -> Result<()> {
        let kv_cf = self.cf(SWAP_KV_CF)?;
        let lists_cf = self.cf(SWAP_LISTS_CF)?;
        self.db.delete_cf(&kv_cf, key)?;
        self.db.delete_cf(&lists_cf, key)?;
        Ok(())
    }

    fn adjust_token_supply(&self, symbol: &str, delta: &BigInt) -> Result<()> {
        let current: BigInt = self
            .get_bincode(SUPPLY_CF, symbol.as_bytes())?
            .unwrap_or_default();
        let projected = &current + delta;
        if projected < BigInt::from(0) {
            return Err(EngineError::SupplyUnderflow {
                symbol: symbol.to_string(),
                have: current.to_string(),
                requested: (-delta).to_string(),
            });
        }
        self.put_bincode(SUPPLY_CF, symbol.as_bytes(), &projected)
    }
}
