//! Swap / Stable Engine (C6) orchestration: ties the voucher ledger, the
//! stable deposit/cash-out lifecycle, the oracle aggregator, and the risk
//! engine's guards into the public mint and cash-out flows.

use crate::address::Address;
use crate::clock::SharedClock;
use crate::config::SwapConfig;
use crate::error::Result;
use crate::math::Wei;
use crate::oracle::{Aggregator, PriceProof, PriceProofRecord, SignerRegistry};
use crate::risk::RiskEngine;
use crate::storage::{PauseView, SwapStore};

use super::stable::StableEngine;
use super::voucher::{BurnLedger, BurnReceipt, VoucherLedger, VoucherRecord};

/// Everything a mint request needs beyond the signed proof itself: the
/// already-assembled voucher fields the caller wants persisted once risk
/// and oracle guards pass.
pub struct MintRequest {
    pub record: VoucherRecord,
    pub proof: PriceProof,
    pub expected_provider: String,
}

pub struct SwapEngine<'a> {
    store: &'a dyn SwapStore,
    pause: &'a dyn PauseView,
    clock: SharedClock,
    config: SwapConfig,
}

impl<'a> SwapEngine<'a> {
    pub fn new(
        store: &'a dyn SwapStore,
        pause: &'a dyn PauseView,
        clock: SharedClock,
        config: SwapConfig,
    ) -> Self {
        SwapEngine {
            store,
            pause,
            clock,
            config,
        }
    }

    fn risk(&self) -> RiskEngine<'a> {
        RiskEngine::new(
            self.store,
            self.pause,
            self.clock.clone(),
            self.config.sanctions_deny_list.clone(),
        )
    }

    /// Verifies the signed price proof, runs every per-address risk guard,
    /// and records the voucher. `last_accepted` is the caller's cached
    /// `PriceProofRecord` for the proof's base symbol, if any.
    pub fn mint_voucher(
        &self,
        request: MintRequest,
        last_accepted: Option<&PriceProofRecord>,
        registry: &SignerRegistry,
    ) -> Result<PriceProofRecord> {
        self.risk().check_module_paused("swap.mint")?;

        let now = self.clock.now_unix();
        let accepted = crate::oracle::verify_price_proof(
            &request.proof,
            &request.expected_provider,
            registry,
            last_accepted,
            now,
            self.config.max_quote_age_seconds,
            self.config.price_proof_max_deviation_bps,
        )?;

        let risk = self.risk();
        let recipient = request.record.recipient;
        let amount = request.record.mint_amount_wei.clone();

        risk.check_sanctions(&recipient, &request.record.provider, &request.record.provider_tx_id)?;
        crate::risk::check_per_tx(
            &amount,
            &Wei::from(self.config.risk.per_tx_min_wei),
            &Wei::from(self.config.risk.per_tx_max_wei),
        )?;
        risk.check_and_record_daily(
            &recipient,
            &amount,
            &Wei::from(self.config.risk.per_address_daily_cap_wei),
        )?;
        risk.check_and_record_monthly(
            &recipient,
            &amount,
            &Wei::from(self.config.risk.per_address_monthly_cap_wei),
        )?;
        risk.check_and_record_velocity(
            &recipient,
            self.config.risk.velocity_window_seconds,
            self.config.risk.velocity_max_mints,
        )?;

        let ledger = VoucherLedger::new(self.store, self.clock.clone());
        ledger.put(request.record)?;

        Ok(accepted)
    }

    pub fn vouchers(&self) -> VoucherLedger<'a> {
        VoucherLedger::new(self.store, self.clock.clone())
    }

    pub fn burns(&self) -> BurnLedger<'a> {
        BurnLedger::new(self.store, self.clock.clone())
    }

    pub fn record_burn(&self, receipt: BurnReceipt) -> Result<()> {
        self.risk().check_module_paused("swap.burn")?;
        self.burns().put(receipt)
    }

    fn stable(&self) -> StableEngine<'a> {
        StableEngine::new(self.store, self.clock.clone())
    }

    pub fn deposit_stable(&self, invoice_id: &str, asset: &str, amount: &Wei) -> Result<()> {
        self.risk().check_module_paused("swap.stable")?;
        self.stable().put_deposit_voucher(invoice_id, asset, amount)
    }

    /// Runs the cash-out asset/tier caps (spec §4.4) before creating the
    /// paired intent and escrow lock.
    pub fn request_cash_out(
        &self,
        intent_id: &str,
        asset: &str,
        tier: &str,
        stable_amount: &Wei,
        nhb_amount: &Wei,
        settled_today: &Wei,
        pending_escrow: &Wei,
    ) -> Result<()> {
        self.risk().check_module_paused("swap.stable")?;
        let asset_cap = Wei::from(
            *self
                .config
                .cash_out
                .asset_caps
                .get(asset)
                .unwrap_or(&0u64),
        );
        let tier_cap = Wei::from(*self.config.cash_out.tiers.get(tier).unwrap_or(&0u64));
        crate::risk::check_cashout_caps(
            stable_amount,
            settled_today,
            pending_escrow,
            &asset_cap,
            &tier_cap,
        )?;
        self.stable()
            .create_cash_out_intent(intent_id, asset, stable_amount, nhb_amount)
    }

    pub fn settle_cash_out(
        &self,
        intent_id: &str,
        asset: &str,
        stable_amount: &Wei,
        nhb_amount: &Wei,
    ) -> Result<()> {
        self.stable()
            .record_payout_receipt(intent_id, asset, stable_amount, nhb_amount)
    }

    pub fn list_sanctions_failures(&self, addr: &Address) -> Result<Vec<crate::risk::SanctionsFailure>> {
        self.risk().list_sanctions_failures(addr)
    }
}
