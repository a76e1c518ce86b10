//! Risk Engine (C4): per-address caps, velocity, sanctions, slippage,
//! oracle guards, cash-out caps, and the module-pause gate (spec §4.4).

use chrono::{DateTime, Datelike, Utc};
use num_bigint::BigUint;
use std::collections::HashSet;

use crate::address::Address;
use crate::clock::SharedClock;
use crate::error::{EngineError, Result};
use crate::math::{Wei, BPS_DENOM};
use crate::storage::{PauseView, SwapStore};

/// `amount < per_tx_min || amount > per_tx_max` (zero-valued bound disables
/// the corresponding check, per spec §4.4 "when configured nonzero").
pub fn check_per_tx(amount: &Wei, per_tx_min: &Wei, per_tx_max: &Wei) -> Result<()> {
    if !per_tx_min.is_zero() && amount < per_tx_min {
        return Err(EngineError::PerTxMin {
            amount: amount.to_string(),
            min: per_tx_min.to_string(),
        });
    }
    if !per_tx_max.is_zero() && amount > per_tx_max {
        return Err(EngineError::PerTxMax {
            amount: amount.to_string(),
            max: per_tx_max.to_string(),
        });
    }
    Ok(())
}

/// `|expected - submitted| * 10^4 / expected > maxBps`.
pub fn check_slippage(expected: &Wei, submitted: &Wei, max_bps: u32) -> Result<()> {
    if expected.is_zero() {
        return Ok(());
    }
    let diff = if expected.0 >= submitted.0 {
        &expected.0 - &submitted.0
    } else {
        &submitted.0 - &expected.0
    };
    let current_bps = (diff * BigUint::from(BPS_DENOM) / &expected.0)
        .try_into()
        .unwrap_or(u32::MAX);
    if current_bps > max_bps {
        return Err(EngineError::Slippage {
            current_bps,
            limit_bps: max_bps,
        });
    }
    Ok(())
}

/// `now - observed > maxAge || observed > now + tolerance`.
pub fn check_oracle_freshness(
    observed_unix: i64,
    now_unix: i64,
    max_age_seconds: i64,
    tolerance_seconds: i64,
) -> Result<()> {
    if now_unix - observed_unix > max_age_seconds || observed_unix > now_unix + tolerance_seconds {
        return Err(EngineError::OracleStale {
            observed: now_unix - observed_unix,
            max_age: max_age_seconds,
        });
    }
    Ok(())
}

/// `|current - previous| / previous * 10^4 > maxBps`.
pub fn check_oracle_deviation(previous: &Wei, current: &Wei, max_bps: u32) -> Result<()> {
    if previous.is_zero() {
        return Ok(());
    }
    let diff = if previous.0 >= current.0 {
        &previous.0 - &current.0
    } else {
        &current.0 - &previous.0
    };
    let current_bps: u32 = (diff * BigUint::from(BPS_DENOM) / &previous.0)
        .try_into()
        .unwrap_or(u32::MAX);
    if current_bps > max_bps {
        return Err(EngineError::OracleDeviation {
            current_bps,
            limit_bps: max_bps,
        });
    }
    Ok(())
}

/// `settledToday + pendingEscrow + requested > assetCap || > tierCap`.
pub fn check_cashout_caps(
    requested: &Wei,
    settled_today: &Wei,
    pending_escrow: &Wei,
    asset_cap: &Wei,
    tier_cap: &Wei,
) -> Result<()> {
    let sum = settled_today + pending_escrow;
    let projected = &sum + requested;
    if !asset_cap.is_zero() && projected.0 > asset_cap.0 {
        return Err(EngineError::CashOutAssetCap {
            limit: asset_cap.to_string(),
            projected: projected.to_string(),
        });
    }
    if !tier_cap.is_zero() && projected.0 > tier_cap.0 {
        return Err(EngineError::CashOutTierCap {
            limit: tier_cap.to_string(),
            projected: projected.to_string(),
        });
    }
    Ok(())
}

fn day_bucket(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d").to_string()
}

fn month_bucket(dt: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", dt.year(), dt.month())
}

fn addr_hex(addr: &Address) -> String {
    addr.to_hex()
}

fn read_bucket(store: &dyn SwapStore, key: &str) -> Result<Wei> {
    match store.kv_get(key.as_bytes())? {
        Some(bytes) => {
            let s = String::from_utf8(bytes).map_err(|e| EngineError::Corrupt {
                reason: e.to_string(),
            })?;
            let big = s.parse::<BigUint>().map_err(|e| EngineError::Corrupt {
                reason: e.to_string(),
            })?;
            Ok(Wei(big))
        }
        None => Ok(Wei::zero()),
    }
}

fn write_bucket(store: &dyn SwapStore, key: &str, value: &Wei) -> Result<()> {
    store.kv_put(key.as_bytes(), value.to_string().as_bytes())
}

/// An append-only sanctions-audit entry (spec §4.4).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SanctionsFailure {
    pub addr: String,
    pub provider: String,
    pub provider_tx_id: String,
    pub ts: i64,
}

/// Stateful guards that persist their working counters through a
/// `SwapStore` (daily/monthly caps, velocity, sanctions audit) plus the
/// module-pause gate. Pure guards (`check_per_tx`, `check_slippage`,
/// `check_oracle_*`) are free functions above so lending and swap can both
/// call them without needing a `RiskEngine` instance.
pub struct RiskEngine<'a> {
    store: &'a dyn SwapStore,
    pause: &'a dyn PauseView,
    clock: SharedClock,
    deny_list: HashSet<String>,
}

impl<'a> RiskEngine<'a> {
    pub fn new(
        store: &'a dyn SwapStore,
        pause: &'a dyn PauseView,
        clock: SharedClock,
        deny_list: impl IntoIterator<Item = String>,
    ) -> Self {
        let deny_list = deny_list
            .into_iter()
            .map(|a| a.trim().to_lowercase())
            .collect::<HashSet<_>>();
        RiskEngine {
            store,
            pause,
            clock,
            deny_list,
        }
    }

    pub fn check_module_paused(&self, module: &str) -> Result<()> {
        if self.pause.is_paused(module) {
            return Err(EngineError::ModulePaused {
                module: module.to_string(),
            });
        }
        Ok(())
    }

    /// Checks the daily bucket for `addr` and, if it would not exceed
    /// `cap`, persists the incremented total.
    pub fn check_and_record_daily(&self, addr: &Address, amount: &Wei, cap: &Wei) -> Result<()> {
        if cap.is_zero() {
            return Ok(());
        }
        let key = format!(
            "swap/risk/daily/{}/{}",
            day_bucket(self.clock.now()),
            addr_hex(addr)
        );
        let current = read_bucket(self.store, &key)?;
        let projected = &current + amount;
        if projected.0 > cap.0 {
            return Err(EngineError::DailyCap {
                limit: cap.to_string(),
                current: projected.to_string(),
            });
        }
        write_bucket(self.store, &key, &projected)
    }

    /// Same as `check_and_record_daily` but keyed by calendar month.
    pub fn check_and_record_monthly(&self, addr: &Address, amount: &Wei, cap: &Wei) -> Result<()> {
        if cap.is_zero() {
            return Ok(());
        }
        let key = format!(
            "swap/risk/monthly/{}/{}",
            month_bucket(self.clock.now()),
            addr_hex(addr)
        );
        let current = read_bucket(self.store, &key)?;
        let projected = &current + amount;
        if projected.0 > cap.0 {
            return Err(EngineError::MonthlyCap {
                limit: cap.to_string(),
                current: projected.to_string(),
            });
        }
        write_bucket(self.store, &key, &projected)
    }

    /// Rejects if `addr` already has `>= max_mints` events within
    /// `[now - window_seconds, now]`; otherwise records this event.
    /// Samples older than 24h are pruned on every write.
    pub fn check_and_record_velocity(
        &self,
        addr: &Address,
        window_seconds: u64,
        max_mints: u32,
    ) -> Result<()> {
        if max_mints == 0 {
            return Ok(());
        }
        let key = format!("swap/risk/velocity/{}", addr_hex(addr));
        let now = self.clock.now_unix();
        let mut samples: Vec<i64> = match self.store.kv_get(key.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            None => Vec::new(),
        };
        samples.retain(|t| now - t <= 24 * 3600);

        let window_start = now - window_seconds as i64;
        let count = samples.iter().filter(|t| **t >= window_start && **t <= now).count() as u32;
        if count >= max_mints {
            return Err(EngineError::Velocity {
                count,
                max: max_mints,
                window_seconds,
            });
        }

        samples.push(now);
        let encoded = serde_json::to_vec(&samples).map_err(|e| EngineError::Corrupt {
            reason: e.to_string(),
        })?;
        self.store.kv_put(key.as_bytes(), &encoded)
    }

    /// Rejects if `addr` (lowercased hex) is on the deny-list, appending a
    /// `SanctionsFailure` to the address's audit log either way the caller
    /// chooses to record it (the audit append happens only on rejection,
    /// per spec §4.4).
    pub fn check_sanctions(
        &self,
        addr: &Address,
        provider: &str,
        provider_tx_id: &str,
    ) -> Result<()> {
        let hex = addr_hex(addr);
        if self.deny_list.contains(&hex) {
            let failure = SanctionsFailure {
                addr: hex.clone(),
                provider: provider.to_string(),
                provider_tx_id: provider_tx_id.to_string(),
                ts: self.clock.now_unix(),
            };
            let key = format!("swap/sanctions/audit/{hex}");
            let encoded = serde_json::to_vec(&failure).map_err(|e| EngineError::Corrupt {
                reason: e.to_string(),
            })?;
            self.store.kv_append(key.as_bytes(), &encoded)?;
            return Err(EngineError::InvalidAmount {
                reason: format!("address {hex} is sanctioned"),
            });
        }
        Ok(())
    }

    /// Reads the full sanctions-audit log for `addr` (read accessor beside
    /// the write path, spec §11 supplement).
    pub fn list_sanctions_failures(&self, addr: &Address) -> Result<Vec<SanctionsFailure>> {
        let key = format!("swap/sanctions/audit/{}", addr_hex(addr));
        self.store
            .kv_get_list(key.as_bytes())?
            .into_iter()
            .map(|bytes| {
                serde_json::from_slice(&bytes).map_err(|e| EngineError::Corrupt {
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}
