//! Voucher and burn ledgers (spec §4.6.1, §4.6.3): append-only logs keyed
//! by provider/receipt id, with a parallel index for paginated listing and
//! a base64-encoded CSV export.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::clock::SharedClock;
use crate::error::{EngineError, Result};
use crate::math::Wei;
use crate::storage::SwapStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    Minted,
    Reconciled,
    Reversed,
}

impl VoucherStatus {
    fn as_str(&self) -> &'static str {
        match self {
            VoucherStatus::Minted => "minted",
            VoucherStatus::Reconciled => "reconciled",
            VoucherStatus::Reversed => "reversed",
        }
    }
}

/// A minted stable-swap voucher. Immutable once inserted except for
/// `status` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherRecord {
    pub provider_tx_id: String,
    pub provider: String,
    pub fiat_currency: String,
    pub fiat_amount: String,
    pub usd: String,
    pub rate: String,
    pub token: String,
    pub mint_amount_wei: Wei,
    pub recipient: Address,
    pub username: String,
    pub address: String,
    pub quote_ts: i64,
    pub source: String,
    pub oracle_median: String,
    pub oracle_feeders: String,
    pub price_proof_id: String,
    pub minter_sig: String,
    pub status: VoucherStatus,
    pub created_at: i64,
    pub twap_rate: String,
    pub twap_observations: u32,
    pub twap_window_seconds: i64,
    pub twap_start: i64,
    pub twap_end: i64,
}

const VOUCHER_CSV_HEADER: &str = "providerTxId,provider,fiatCurrency,fiatAmount,usd,rate,token,mintAmountWei,recipient,username,address,quoteTs,source,oracleMedian,oracleFeeders,priceProofId,minterSig,status,createdAt,twapRate,twapObservations,twapWindowSeconds,twapStart,twapEnd";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: String,
    created_at: i64,
}

const VOUCHER_PREFIX: &str = "swap/voucher/";
const VOUCHER_INDEX_KEY: &str = "swap/voucher/index";

fn voucher_key(id: &str) -> String {
    format!("{VOUCHER_PREFIX}{id}")
}

/// Operates over a `SwapStore`, never opening storage directly (spec §4.2).
pub struct VoucherLedger<'a> {
    store: &'a dyn SwapStore,
    clock: SharedClock,
}

impl<'a> VoucherLedger<'a> {
    pub fn new(store: &'a dyn SwapStore, clock: SharedClock) -> Self {
        VoucherLedger { store, clock }
    }

    /// §4.6.1 `put`.
    pub fn put(&self, mut record: VoucherRecord) -> Result<()> {
        if record.provider_tx_id.trim().is_empty() {
            return Err(EngineError::InvalidAmount {
                reason: "providerTxId must not be empty".to_string(),
            });
        }
        let key = voucher_key(&record.provider_tx_id);
        if self.store.kv_get(key.as_bytes())?.is_some() {
            return Err(EngineError::IdempotencyConflict {
                key: record.provider_tx_id.clone(),
            });
        }
        if record.created_at == 0 {
            record.created_at = self.clock.now_unix();
        }

        let encoded = encode(&record)?;
        self.store.kv_put(key.as_bytes(), &encoded)?;

        let entry = IndexEntry {
            id: record.provider_tx_id.clone(),
            created_at: record.created_at,
        };
        let entry_bytes = serde_json::to_vec(&entry).map_err(corrupt)?;
        self.store.kv_append(VOUCHER_INDEX_KEY.as_bytes(), &entry_bytes)
    }

    pub fn get(&self, id: &str) -> Result<Option<VoucherRecord>> {
        match self.store.kv_get(voucher_key(id).as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// §4.6.1 `list`: inclusive `[startTs, endTs]` filter, stable sort by
    /// `(createdAt, providerTxId)`, `limit <= 0` means unbounded.
    pub fn list(
        &self,
        start_ts: i64,
        end_ts: i64,
        cursor: &str,
        limit: i64,
    ) -> Result<(Vec<VoucherRecord>, String)> {
        let mut entries = self.read_index()?;
        entries.retain(|e| e.created_at >= start_ts && e.created_at <= end_ts);
        entries.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let start_index = if cursor.is_empty() {
            0
        } else {
            match entries.iter().position(|e| e.id == cursor) {
                Some(pos) => pos + 1,
                None => 0,
            }
        };

        let slice = &entries[start_index.min(entries.len())..];
        let take = if limit <= 0 {
            slice.len()
        } else {
            slice.len().min(limit as usize)
        };

        let mut records = Vec::with_capacity(take);
        for entry in &slice[..take] {
            if let Some(record) = self.get(&entry.id)? {
                records.push(record);
            }
        }
        let next_cursor = if take < slice.len() {
            slice[take - 1].id.clone()
        } else {
            String::new()
        };
        Ok((records, next_cursor))
    }

    /// §4.6.1 `exportCsv`: returns `(base64Csv, count, totalMintedWei)`.
    pub fn export_csv(&self, start_ts: i64, end_ts: i64) -> Result<(String, usize, Wei)> {
        let (records, _) = self.list(start_ts, end_ts, "", 0)?;
        let mut csv = String::from(VOUCHER_CSV_HEADER);
        csv.push('\n');
        let mut total = Wei::zero();
        for r in &records {
            total = &total + &r.mint_amount_wei;
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
                r.provider_tx_id,
                r.provider,
                r.fiat_currency,
                r.fiat_amount,
                r.usd,
                r.rate,
                r.token,
                r.mint_amount_wei,
                r.recipient,
                r.username,
                r.address,
                r.quote_ts,
                r.source,
                r.oracle_median,
                r.oracle_feeders,
                r.price_proof_id,
                r.minter_sig,
                r.status.as_str(),
                r.created_at,
                r.twap_rate,
                r.twap_observations,
                r.twap_window_seconds,
                r.twap_start,
                r.twap_end,
            ));
        }
        let encoded = BASE64.encode(csv.as_bytes());
        Ok((encoded, records.len(), total))
    }

    /// §4.6.1 `markReconciled`: idempotent across ids; unknown ids are
    /// silently skipped (only `markReversed` reports a missing id as an
    /// error).
    pub fn mark_reconciled(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            if let Some(mut record) = self.get(id)? {
                record.status = VoucherStatus::Reconciled;
                self.store.kv_put(voucher_key(id).as_bytes(), &encode(&record)?)?;
            }
        }
        Ok(())
    }

    /// §4.6.1 `markReversed`: errors if `id` doesn't exist; idempotent once
    /// already reversed.
    pub fn mark_reversed(&self, id: &str) -> Result<()> {
        let mut record = self.get(id)?.ok_or_else(|| EngineError::NotFound {
            what: format!("voucher {id}"),
        })?;
        if record.status == VoucherStatus::Reversed {
            return Ok(());
        }
        record.status = VoucherStatus::Reversed;
        self.store.kv_put(voucher_key(id).as_bytes(), &encode(&record)?)
    }

    fn read_index(&self) -> Result<Vec<IndexEntry>> {
        self.store
            .kv_get_list(VOUCHER_INDEX_KEY.as_bytes())?
            .into_iter()
            .map(|bytes| serde_json::from_slice(&bytes).map_err(corrupt))
            .collect()
    }
}

fn encode(record: &VoucherRecord) -> Result<Vec<u8>> {
    serde_json::to_vec(record).map_err(corrupt)
}

fn decode(bytes: &[u8]) -> Result<VoucherRecord> {
    serde_json::from_slice(bytes).map_err(corrupt)
}

fn corrupt(e: serde_json::Error) -> EngineError {
    EngineError::Corrupt {
        reason: e.to_string(),
    }
}

/// A single off-ramp redemption record (spec §4.6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurnReceipt {
    pub receipt_id: String,
    pub burner: Address,
    pub token: String,
    pub amount_wei: Wei,
    pub observed_at: i64,
}

const BURN_PREFIX: &str = "swap/burn/";
const BURN_INDEX_KEY: &str = "swap/burn/index";

fn burn_key(id: &str) -> String {
    format!("{BURN_PREFIX}{id}")
}

pub struct BurnLedger<'a> {
    store: &'a dyn SwapStore,
    clock: SharedClock,
}

impl<'a> BurnLedger<'a> {
    pub fn new(store: &'a dyn SwapStore, clock: SharedClock) -> Self {
        BurnLedger { store, clock }
    }

    pub fn put(&self, mut receipt: BurnReceipt) -> Result<()> {
        if receipt.receipt_id.trim().is_empty() {
            return Err(EngineError::InvalidAmount {
                reason: "receiptId must not be empty".to_string(),
            });
        }
        let key = burn_key(&receipt.receipt_id);
        if self.store.kv_get(key.as_bytes())?.is_some() {
            return Err(EngineError::IdempotencyConflict {
                key: receipt.receipt_id.clone(),
            });
        }
        if receipt.observed_at == 0 {
            receipt.observed_at = self.clock.now_unix();
        }
        let encoded = serde_json::to_vec(&receipt).map_err(corrupt)?;
        self.store.kv_put(key.as_bytes(), &encoded)?;

        let entry = IndexEntry {
            id: receipt.receipt_id.clone(),
            created_at: receipt.observed_at,
        };
        let entry_bytes = serde_json::to_vec(&entry).map_err(corrupt)?;
        self.store.kv_append(BURN_INDEX_KEY.as_bytes(), &entry_bytes)
    }

    pub fn get(&self, id: &str) -> Result<Option<BurnReceipt>> {
        match self.store.kv_get(burn_key(id).as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(corrupt)?)),
            None => Ok(None),
        }
    }

    pub fn list(
        &self,
        start_ts: i64,
        end_ts: i64,
        cursor: &str,
        limit: i64,
    ) -> Result<(Vec<BurnReceipt>, String)> {
        let mut entries: Vec<IndexEntry> = self
            .store
            .kv_get_list(BURN_INDEX_KEY.as_bytes())?
            .into_iter()
            .map(|bytes| serde_json::from_slice(&bytes).map_err(corrupt))
            .collect::<Result<_>>()?;
        entries.retain(|e| e.created_at >= start_ts && e.created_at <= end_ts);
        entries.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let start_index = if cursor.is_empty() {
            0
        } else {
            match entries.iter().position(|e| e.id == cursor) {
                Some(pos) => pos + 1,
                None => 0,
            }
        };
        let slice = &entries[start_index.min(entries.len())..];
        let take = if limit <= 0 {
            slice.len()
        } else {
            slice.len().min(limit as usize)
        };
        let mut receipts = Vec::with_capacity(take);
        for entry in &slice[..take] {
            if let Some(r) = self.get(&entry.id)? {
                receipts.push(r);
            }
        }
        let next_cursor = if take < slice.len() {
            slice[take - 1].id.clone()
        } else {
            String::new()
        };
        Ok((receipts, next_cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::MemSwapStore;
    use chrono::Utc;
    use std::sync::Arc;

    fn sample(id: &str, created_at: i64) -> VoucherRecord {
        VoucherRecord {
            provider_tx_id: id.to_string(),
            provider: "acme".to_string(),
            fiat_currency: "USD".to_string(),
            fiat_amount: "10.00".to_string(),
            usd: "10.00".to_string(),
            rate: "1.0".to_string(),
            token: "NHB".to_string(),
            mint_amount_wei: Wei::from(10u64),
            recipient: Address([1u8; 20]),
            username: "alice".to_string(),
            address: "nhb1...".to_string(),
            quote_ts: created_at,
            source: "acme".to_string(),
            oracle_median: "1.0".to_string(),
            oracle_feeders: "acme,beta".to_string(),
            price_proof_id: "proof1".to_string(),
            minter_sig: "sig".to_string(),
            status: VoucherStatus::Minted,
            created_at,
            twap_rate: "1.0".to_string(),
            twap_observations: 3,
            twap_window_seconds: 3600,
            twap_start: created_at - 100,
            twap_end: created_at,
        }
    }

    #[test]
    fn put_rejects_duplicate_provider_tx_id() {
        let store = MemSwapStore::new();
        let clock: SharedClock = Arc::new(FixedClock(Utc::now()));
        let ledger = VoucherLedger::new(&store, clock);
        ledger.put(sample("tx-1", 100)).unwrap();
        let err = ledger.put(sample("tx-1", 100)).unwrap_err();
        assert_eq!(err.code(), "idempotency_conflict");
    }

    #[test]
    fn list_paginates_with_cursor() {
        let store = MemSwapStore::new();
        let clock: SharedClock = Arc::new(FixedClock(Utc::now()));
        let ledger = VoucherLedger::new(&store, clock);
        ledger.put(sample("tx-1", 100)).unwrap();
        ledger.put(sample("tx-2", 200)).unwrap();
        ledger.put(sample("tx-3", 300)).unwrap();

        let (page1, cursor1) = ledger.list(0, 1000, "", 2).unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].provider_tx_id, "tx-1");
        assert_eq!(cursor1, "tx-2");

        let (page2, cursor2) = ledger.list(0, 1000, &cursor1, 2).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].provider_tx_id, "tx-3");
        assert_eq!(cursor2, "");
    }

    #[test]
    fn zero_limit_is_unbounded() {
        let store = MemSwapStore::new();
        let clock: SharedClock = Arc::new(FixedClock(Utc::now()));
        let ledger = VoucherLedger::new(&store, clock);
        for i in 0..5 {
            ledger.put(sample(&format!("tx-{i}"), 100 + i)).unwrap();
        }
        let (page, cursor) = ledger.list(0, 1000, "", 0).unwrap();
        assert_eq!(page.len(), 5);
        assert_eq!(cursor, "");
    }

    #[test]
    fn mark_reversed_errors_on_missing_then_idempotent() {
        let store = MemSwapStore::new();
        let clock: SharedClock = Arc::new(FixedClock(Utc::now()));
        let ledger = VoucherLedger::new(&store, clock);
        assert!(ledger.mark_reversed("missing").is_err());
        ledger.put(sample("tx-1", 100)).unwrap();
        ledger.mark_reversed("tx-1").unwrap();
        ledger.mark_reversed("tx-1").unwrap();
        assert_eq!(ledger.get("tx-1").unwrap().unwrap().status, VoucherStatus::Reversed);
    }

    #[test]
    fn export_csv_base64_round_trips() {
        let store = MemSwapStore::new();
        let clock: SharedClock = Arc::new(FixedClock(Utc::now()));
        let ledger = VoucherLedger::new(&store, clock);
        ledger.put(sample("tx-1", 100)).unwrap();
        let (encoded, count, total) = ledger.export_csv(0, 1000).unwrap();
        assert_eq!(count, 1);
        assert_eq!(total, Wei::from(10u64));
        let decoded = BASE64.decode(encoded).unwrap();
        let csv = String::from_utf8(decoded).unwrap();
        assert!(csv.starts_with(VOUCHER_CSV_HEADER));
        assert!(csv.contains("tx-1"));
    }
}
