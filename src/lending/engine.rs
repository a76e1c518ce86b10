//! Lending Engine (C5): supply, withdraw, collateral, borrow, repay,
//! liquidate, interest accrual, and fee withdrawal (spec §4.5).

use num_bigint::BigUint;

use crate::address::Address;
use crate::config::LendingConfig;
use crate::error::{BorrowCapKind, EngineError, Result};
use crate::lending::market::{Market, UserAccount};
use crate::math::{self, Ray, Rational, Wei};
use crate::model::{Asset, SystemAddresses};
use crate::risk;
use crate::storage::StateStore;

/// Operates over a `StateStore` and the global `SystemAddresses`; never
/// opens storage directly (spec §4.2).
pub struct LendingEngine<S: StateStore> {
    store: S,
    system: SystemAddresses,
}

impl<S: StateStore> LendingEngine<S> {
    pub fn new(store: S, system: SystemAddresses) -> Self {
        LendingEngine { store, system }
    }

    fn require_market(&self, pool_id: &str) -> Result<Market> {
        self.store
            .get_market(pool_id)?
            .ok_or_else(|| EngineError::PoolNotConfigured {
                pool_id: pool_id.to_string(),
            })
    }

    fn require_amount_positive(amount: &Wei) -> Result<()> {
        if amount.is_zero() {
            return Err(EngineError::InvalidAmount {
                reason: "amount must be > 0".to_string(),
            });
        }
        Ok(())
    }

    fn debit(&self, addr: &Address, asset: Asset, amount: &Wei) -> Result<()> {
        let mut account = self.store.get_account(addr)?;
        let have = account.balance(asset).clone();
        if &have < amount {
            return Err(EngineError::InsufficientBalance {
                need: amount.to_string(),
                have: have.to_string(),
            });
        }
        *account.balance_mut(asset) = &have - amount;
        self.store.put_account(addr, account)
    }

    fn credit(&self, addr: &Address, asset: Asset, amount: &Wei) -> Result<()> {
        let mut account = self.store.get_account(addr)?;
        let have = account.balance(asset).clone();
        *account.balance_mut(asset) = &have + amount;
        self.store.put_account(addr, account)
    }

    /// Accrues interest up to `current_block` (spec §4.5.7). Returns
    /// whether fee buckets changed so callers can decide whether to
    /// re-read `FeeAccrual`.
    pub fn accrue_interest(
        &self,
        pool_id: &str,
        config: &LendingConfig,
        current_block: u64,
    ) -> Result<bool> {
        let mut market = self.require_market(pool_id)?;
        let delta = current_block.saturating_sub(market.last_update_block);

        let model = match &config.interest_model {
            Some(m) if delta > 0 && !market.total_borrowed.is_zero() => m.clone(),
            _ => {
                market.last_update_block = current_block;
                self.store.put_market(pool_id, market)?;
                return Ok(false);
            }
        };

        let utilisation = crate::lending::interest::utilisation(
            &market.total_borrowed,
            &market.total_supplied,
        );
        let borrow_apr = model.borrow_apr(&utilisation);

        let fee_bps = config.reserve_factor_bps + config.protocol_fee_bps;
        let retained = rational_one_minus_bps(fee_bps);
        let supply_rate = rational_mul(&rational_mul(&borrow_apr, &utilisation), &retained);

        market.borrow_index = math::ray_mul(
            &market.borrow_index,
            &math::rate_factor(&borrow_apr, delta),
        );
        market.supply_index = math::ray_mul(
            &market.supply_index,
            &math::rate_factor(&supply_rate, delta),
        );

        let interest = math::compute_interest(&market.total_borrowed, &borrow_apr, delta);
        let mut fees_changed = false;
        if !interest.is_zero() {
            let reserve_share = interest.mul_bps_floor(config.reserve_factor_bps);
            let protocol_share = interest.mul_bps_floor(config.protocol_fee_bps);
            let mut accrual = self.store.get_fee_accrual(pool_id)?;
            accrual.protocol_fees = &accrual.protocol_fees + &(&reserve_share + &protocol_share);
            self.store.put_fee_accrual(pool_id, accrual)?;
            market.total_borrowed = &market.total_borrowed + &interest;
            market.total_supplied = &market.total_supplied + &interest;
            fees_changed = true;
        }

        market.last_update_block = current_block;
        self.store.put_market(pool_id, market)?;
        Ok(fees_changed)
    }

    /// Resyncs `user.scaledDebt`'s derived `debt` against the market's
    /// current `borrowIndex`; returns the recomputed debt.
    fn sync_debt(user: &UserAccount, market: &Market) -> Wei {
        user.debt(&market.borrow_index)
    }

    fn check_health(collateral: &Wei, debt: &Wei, liquidation_threshold_bps: u32) -> Result<()> {
        let lhs = &collateral.0 * BigUint::from(liquidation_threshold_bps);
        let rhs = &debt.0 * BigUint::from(math::BPS_DENOM);
        if lhs < rhs {
            return Err(EngineError::HealthCheckFailed {
                collateral: collateral.to_string(),
                debt: debt.to_string(),
                threshold_bps: liquidation_threshold_bps,
            });
        }
        Ok(())
    }

    fn check_paused(paused: bool, module: &str) -> Result<()> {
        if paused {
            return Err(EngineError::ModulePaused {
                module: module.to_string(),
            });
        }
        Ok(())
    }

    /// §4.5.1. Returns minted LP shares.
    pub fn supply(
        &self,
        pool_id: &str,
        config: &LendingConfig,
        current_block: u64,
        supplier: &Address,
        amount: &Wei,
    ) -> Result<Wei> {
        Self::check_paused(config.pauses.supply, "lending.supply")?;
        Self::require_amount_positive(amount)?;
        self.accrue_interest(pool_id, config, current_block)?;

        let mut market = self.require_market(pool_id)?;
        self.debit(supplier, Asset::Nhb, amount)?;
        self.credit(&self.system.module_treasury, Asset::Nhb, amount)?;

        let shares = if market.total_supply_shares.is_zero() {
            amount.clone()
        } else {
            math::shares_from_liquidity(amount, &market.supply_index)
        };

        let mut user = self.store.get_user_account(pool_id, supplier)?;
        user.supply_shares = &user.supply_shares + &shares;
        market.total_supplied = &market.total_supplied + amount;
        market.total_supply_shares = &market.total_supply_shares + &shares;

        self.store.put_user_account(pool_id, supplier, user)?;
        self.store.put_market(pool_id, market)?;
        Ok(shares)
    }

    /// §4.5.2. Returns redeemed liquidity.
    pub fn withdraw(
        &self,
        pool_id: &str,
        config: &LendingConfig,
        current_block: u64,
        supplier: &Address,
        shares: &Wei,
    ) -> Result<Wei> {
        Self::check_paused(config.pauses.withdraw, "lending.withdraw")?;
        Self::require_amount_positive(shares)?;
        self.accrue_interest(pool_id, config, current_block)?;

        let mut market = self.require_market(pool_id)?;
        if market.total_supply_shares.is_zero() {
            return Err(EngineError::InsufficientLiquidity {
                need: shares.to_string(),
                available: "0".to_string(),
            });
        }

        let redeem = math::liquidity_from_shares(shares, &market.supply_index);
        let available = market.available_liquidity();
        let module_balance = self
            .store
            .get_account(&self.system.module_treasury)?
            .balance(Asset::Nhb)
            .clone();
        if available < redeem || module_balance < redeem {
            return Err(EngineError::InsufficientLiquidity {
                need: redeem.to_string(),
                available: Wei::min(&available, &module_balance).to_string(),
            });
        }

        let mut user = self.store.get_user_account(pool_id, supplier)?;
        if user.supply_shares < *shares {
            return Err(EngineError::InsufficientBalance {
                need: shares.to_string(),
                have: user.supply_shares.to_string(),
            });
        }

        self.debit(&self.system.module_treasury, Asset::Nhb, &redeem)?;
        self.credit(supplier, Asset::Nhb, &redeem)?;

        user.supply_shares = &user.supply_shares - shares;
        market.total_supply_shares = &market.total_supply_shares - shares;
        market.total_supplied = market.total_supplied.saturating_sub(&redeem);

        self.store.put_user_account(pool_id, supplier, user)?;
        self.store.put_market(pool_id, market)?;
        Ok(redeem)
    }

    /// §4.5.3 DepositCollateral.
    pub fn deposit_collateral(
        &self,
        pool_id: &str,
        depositor: &Address,
        amount: &Wei,
    ) -> Result<()> {
        Self::require_amount_positive(amount)?;
        self.require_market(pool_id)?;

        self.debit(depositor, Asset::Znhb, amount)?;
        self.credit(&self.system.collateral_custody, Asset::Znhb, amount)?;

        let mut user = self.store.get_user_account(pool_id, depositor)?;
        user.collateral = &user.collateral + amount;
        self.store.put_user_account(pool_id, depositor, user)
    }

    /// §4.5.3 WithdrawCollateral.
    pub fn withdraw_collateral(
        &self,
        pool_id: &str,
        config: &LendingConfig,
        current_block: u64,
        withdrawer: &Address,
        amount: &Wei,
    ) -> Result<()> {
        Self::require_amount_positive(amount)?;
        self.accrue_interest(pool_id, config, current_block)?;

        let market = self.require_market(pool_id)?;
        let mut user = self.store.get_user_account(pool_id, withdrawer)?;
        if user.collateral < *amount {
            return Err(EngineError::InsufficientBalance {
                need: amount.to_string(),
                have: user.collateral.to_string(),
            });
        }
        let debt = Self::sync_debt(&user, &market);
        let projected_collateral = &user.collateral - amount;
        Self::check_health(&projected_collateral, &debt, config.liquidation_threshold_bps)?;

        self.debit(&self.system.collateral_custody, Asset::Znhb, amount)?;
        self.credit(withdrawer, Asset::Znhb, amount)?;

        user.collateral = projected_collateral;
        self.store.put_user_account(pool_id, withdrawer, user)
    }

    /// §4.5.4. Returns `(amountOut, feeAmount)`.
    #[allow(clippy::too_many_arguments)]
    pub fn borrow(
        &self,
        pool_id: &str,
        config: &LendingConfig,
        current_block: u64,
        borrower: &Address,
        amount: &Wei,
        fee_bps: u32,
        fee_recipient: Option<Address>,
    ) -> Result<(Wei, Wei)> {
        Self::check_paused(config.pauses.borrow, "lending.borrow")?;
        Self::require_amount_positive(amount)?;
        self.accrue_interest(pool_id, config, current_block)?;

        let mut market = self.require_market(pool_id)?;

        risk::check_oracle_freshness(
            market.oracle_cache.updated_block as i64,
            current_block as i64,
            config.oracle.max_age_blocks as i64,
            0,
        )?;
        risk::check_oracle_deviation(
            &market.oracle_cache.prev_median_wei,
            &market.oracle_cache.median_wei,
            config.oracle.max_deviation_bps,
        )?;

        let (effective_fee_bps, effective_recipient) = if fee_bps == 0 && fee_recipient.is_none()
        {
            (config.developer_fee_bps, config.developer_fee_collector)
        } else {
            (fee_bps, fee_recipient)
        };
        if effective_fee_bps > config.developer_fee_cap_bps {
            return Err(EngineError::DeveloperFeeCapExceeded {
                requested: effective_fee_bps,
                cap: config.developer_fee_cap_bps,
            });
        }
        if effective_fee_bps > 0 && effective_recipient.is_none() {
            return Err(EngineError::DeveloperFeeRecipientMissing);
        }

        let fee_amount = amount.mul_bps_floor(effective_fee_bps);
        let total_out = amount + &fee_amount;

        let available = market.available_liquidity();
        if available < total_out {
            return Err(EngineError::InsufficientLiquidity {
                need: total_out.to_string(),
                available: available.to_string(),
            });
        }

        let mut user = self.store.get_user_account(pool_id, borrower)?;
        let debt = Self::sync_debt(&user, &market);
        let projected_debt = &debt + &total_out;
        Self::check_health(&user.collateral, &projected_debt, config.liquidation_threshold_bps)?;

        if market.borrowed_this_block_number != current_block {
            market.borrowed_this_block = Wei::zero();
            market.borrowed_this_block_number = current_block;
        }
        let projected_block_total = &market.borrowed_this_block + &total_out;
        if config.borrow_caps.per_block != 0 {
            let cap = Wei::from(config.borrow_caps.per_block);
            if projected_block_total.0 > cap.0 {
                return Err(EngineError::BorrowCapExceeded {
                    kind: BorrowCapKind::PerBlock,
                    limit: cap.to_string(),
                    projected: projected_block_total.to_string(),
                });
            }
        }
        let projected_total_borrowed = &market.total_borrowed + &total_out;
        if config.borrow_caps.utilisation_bps != 0 && !market.total_supplied.is_zero() {
            let projected_util_bps: u32 = (&projected_total_borrowed.0
                * BigUint::from(math::BPS_DENOM)
                / &market.total_supplied.0)
                .try_into()
                .unwrap_or(u32::MAX);
            if projected_util_bps > config.borrow_caps.utilisation_bps {
                return Err(EngineError::BorrowCapExceeded {
                    kind: BorrowCapKind::Utilisation,
                    limit: config.borrow_caps.utilisation_bps.to_string(),
                    projected: projected_util_bps.to_string(),
                });
            }
        }
        if config.borrow_caps.total != 0 {
            let cap = Wei::from(config.borrow_caps.total);
            if projected_total_borrowed.0 > cap.0 {
                return Err(EngineError::BorrowCapExceeded {
                    kind: BorrowCapKind::Global,
                    limit: cap.to_string(),
                    projected: projected_total_borrowed.to_string(),
                });
            }
        }

        self.debit(&self.system.module_treasury, Asset::Nhb, &total_out)?;
        self.credit(borrower, Asset::Nhb, amount)?;
        if !fee_amount.is_zero() {
            let recipient = effective_recipient.expect("checked above");
            self.credit(&recipient, Asset::Nhb, &fee_amount)?;
        }

        let scaled_delta = math::scaled_debt_from_amount(&total_out, &market.borrow_index);
        user.scaled_debt = &user.scaled_debt + &scaled_delta;
        market.total_borrowed = projected_total_borrowed;
        market.borrowed_this_block = projected_block_total;

        if !fee_amount.is_zero() {
            let mut accrual = self.store.get_fee_accrual(pool_id)?;
            accrual.developer_fees = &accrual.developer_fees + &fee_amount;
            self.store.put_fee_accrual(pool_id, accrual)?;
        }

        self.store.put_user_account(pool_id, borrower, user)?;
        self.store.put_market(pool_id, market)?;
        Ok((amount.clone(), fee_amount))
    }

    /// §4.5.5. Returns the amount actually repaid.
    pub fn repay(
        &self,
        pool_id: &str,
        config: &LendingConfig,
        current_block: u64,
        borrower: &Address,
        amount: &Wei,
    ) -> Result<Wei> {
        Self::check_paused(config.pauses.repay, "lending.repay")?;
        Self::require_amount_positive(amount)?;
        self.accrue_interest(pool_id, config, current_block)?;

        let mut market = self.require_market(pool_id)?;
        let mut user = self.store.get_user_account(pool_id, borrower)?;
        let debt = Self::sync_debt(&user, &market);
        if debt.is_zero() {
            return Err(EngineError::NoDebt);
        }

        let repay = Wei::min(amount, &debt);
        let payer_balance = self.store.get_account(borrower)?.balance(Asset::Nhb).clone();
        if payer_balance < repay {
            return Err(EngineError::InsufficientBalance {
                need: repay.to_string(),
                have: payer_balance.to_string(),
            });
        }

        self.debit(borrower, Asset::Nhb, &repay)?;
        self.credit(&self.system.module_treasury, Asset::Nhb, &repay)?;

        let scaled_repay = math::scaled_debt_from_amount(&repay, &market.borrow_index);
        user.scaled_debt = user.scaled_debt.saturating_sub(&scaled_repay);
        market.total_borrowed = market.total_borrowed.saturating_sub(&repay);

        self.store.put_user_account(pool_id, borrower, user)?;
        self.store.put_market(pool_id, market)?;
        Ok(repay)
    }

    /// §4.5.6. Returns `(repayAmount, seize, liquidatorShare, developerShare,
    /// protocolShare)`.
    pub fn liquidate(
        &self,
        pool_id: &str,
        config: &LendingConfig,
        current_block: u64,
        liquidator: &Address,
        borrower: &Address,
    ) -> Result<(Wei, Wei, Wei, Wei, Wei)> {
        Self::check_paused(config.pauses.liquidate, "lending.liquidate")?;
        self.accrue_interest(pool_id, config, current_block)?;

        let mut market = self.require_market(pool_id)?;
        let mut user = self.store.get_user_account(pool_id, borrower)?;
        let debt = Self::sync_debt(&user, &market);
        if debt.is_zero() {
            return Err(EngineError::NotLiquidatable);
        }
        if Self::check_health(&user.collateral, &debt, config.liquidation_threshold_bps).is_ok() {
            return Err(EngineError::NotLiquidatable);
        }

        let repay_amount = debt;

        let liquidator_balance = self
            .store
            .get_account(liquidator)?
            .balance(Asset::Nhb)
            .clone();
        if liquidator_balance < repay_amount {
            return Err(EngineError::InsufficientBalance {
                need: repay_amount.to_string(),
                have: liquidator_balance.to_string(),
            });
        }
        self.debit(liquidator, Asset::Nhb, &repay_amount)?;
        self.credit(&self.system.module_treasury, Asset::Nhb, &repay_amount)?;

        let bonus_numer = &repay_amount.0
            * BigUint::from(math::BPS_DENOM + config.liquidation_bonus_bps);
        let bonus_target = Wei(bonus_numer / BigUint::from(math::BPS_DENOM));
        let seize = Wei::min(&bonus_target, &user.collateral);

        let routing = &config.collateral_routing;
        let total_bps = routing.liquidator_bps + routing.developer_bps + routing.protocol_bps;
        if total_bps > math::BPS_DENOM {
            return Err(EngineError::CollateralRoutingInvalid { total: total_bps });
        }
        if routing.developer_bps > 0 && routing.developer_target.is_none() {
            return Err(EngineError::CollateralRecipientMissing);
        }
        if routing.protocol_bps > 0 && routing.protocol_target.is_none() {
            return Err(EngineError::CollateralRecipientMissing);
        }

        let developer_share = seize.mul_bps_floor(routing.developer_bps);
        let protocol_share = seize.mul_bps_floor(routing.protocol_bps);
        let liquidator_share = &seize - &(&developer_share + &protocol_share);

        self.debit(&self.system.collateral_custody, Asset::Znhb, &seize)?;
        self.credit(liquidator, Asset::Znhb, &liquidator_share)?;
        if !developer_share.is_zero() {
            let target = routing.developer_target.expect("checked above");
            self.credit(&target, Asset::Znhb, &developer_share)?;
        }
        if !protocol_share.is_zero() {
            let target = routing.protocol_target.expect("checked above");
            self.credit(&target, Asset::Znhb, &protocol_share)?;
        }

        user.scaled_debt = Wei::zero();
        user.collateral = user.collateral.saturating_sub(&seize);
        market.total_borrowed = market.total_borrowed.saturating_sub(&repay_amount);

        self.store.put_user_account(pool_id, borrower, user)?;
        self.store.put_market(pool_id, market)?;
        Ok((
            repay_amount,
            seize,
            liquidator_share,
            developer_share,
            protocol_share,
        ))
    }

    /// §4.5.9: withdraws from the protocol-fee bucket.
    pub fn withdraw_protocol_fees(
        &self,
        pool_id: &str,
        recipient: &Address,
        amount: &Wei,
    ) -> Result<()> {
        self.withdraw_fee_bucket(pool_id, recipient, amount, true)
    }

    /// §4.5.9: withdraws from the developer-fee bucket.
    pub fn withdraw_developer_fees(
        &self,
        pool_id: &str,
        recipient: &Address,
        amount: &Wei,
    ) -> Result<()> {
        self.withdraw_fee_bucket(pool_id, recipient, amount, false)
    }

    fn withdraw_fee_bucket(
        &self,
        pool_id: &str,
        recipient: &Address,
        amount: &Wei,
        protocol: bool,
    ) -> Result<()> {
        Self::require_amount_positive(amount)?;
        let mut market = self.require_market(pool_id)?;
        let mut accrual = self.store.get_fee_accrual(pool_id)?;

        let bucket = if protocol {
            &mut accrual.protocol_fees
        } else {
            &mut accrual.developer_fees
        };
        if *bucket < *amount {
            return Err(EngineError::InsufficientBalance {
                need: amount.to_string(),
                have: bucket.to_string(),
            });
        }

        let module_balance = self
            .store
            .get_account(&self.system.module_treasury)?
            .balance(Asset::Nhb)
            .clone();
        if module_balance < *amount {
            return Err(EngineError::InsufficientBalance {
                need: amount.to_string(),
                have: module_balance.to_string(),
            });
        }

        self.debit(&self.system.module_treasury, Asset::Nhb, amount)?;
        self.credit(recipient, Asset::Nhb, amount)?;
        *bucket = &*bucket - amount;
        market.total_supplied = market.total_supplied.saturating_sub(amount);

        self.store.put_fee_accrual(pool_id, accrual)?;
        self.store.put_market(pool_id, market)
    }
}

fn rational_one_minus_bps(bps: u32) -> Rational {
    let bps = bps.min(math::BPS_DENOM);
    Rational {
        numerator: BigUint::from(math::BPS_DENOM - bps),
        denominator: BigUint::from(math::BPS_DENOM),
    }
}

fn rational_mul(a: &Rational, b: &Rational) -> Rational {
    Rational {
        numerator: &a.numerator * &b.numerator,
        denominator: &a.denominator * &b.denominator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BorrowCaps, CollateralRouting, LendingConfig, LendingPauses, OracleConfig};
    use crate::lending::interest::InterestModel;
    use crate::storage::MemStateStore;

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    fn system() -> SystemAddresses {
        SystemAddresses {
            module_treasury: addr(250),
            collateral_custody: addr(251),
        }
    }

    fn engine_with_market(pool_id: &str) -> LendingEngine<MemStateStore> {
        let store = MemStateStore::new();
        store
            .put_market(pool_id, Market::genesis(pool_id, 0))
            .unwrap();
        LendingEngine::new(store, system())
    }

    fn base_config() -> LendingConfig {
        LendingConfig {
            max_ltv_bps: 8000,
            liquidation_threshold_bps: 8500,
            liquidation_bonus_bps: 500,
            reserve_factor_bps: 1000,
            protocol_fee_bps: 0,
            developer_fee_bps: 0,
            developer_fee_collector: None,
            developer_fee_cap_bps: 10_000,
            interest_model: Some(InterestModel {
                base_rate: Rational::new(0, 1),
                slope1: Rational::new(1, 1),
                slope2: Rational::new(0, 1),
                kink: Rational::new(1, 1),
            }),
            borrow_caps: BorrowCaps::default(),
            pauses: LendingPauses::default(),
            oracle: OracleConfig::default(),
            collateral_routing: CollateralRouting::default(),
        }
    }

    #[test]
    fn s1_supply_genesis_shares_equal_amount() {
        let engine = engine_with_market("pool-1");
        let config = base_config();
        let supplier = addr(1);
        engine
            .credit(&supplier, Asset::Nhb, &Wei::from(1000u64))
            .unwrap();
        let shares = engine
            .supply("pool-1", &config, 0, &supplier, &Wei::from(1000u64))
            .unwrap();
        assert_eq!(shares, Wei::from(1000u64));
    }

    #[test]
    fn s1_accrual_doubles_borrow_index_at_half_utilisation() {
        let engine = engine_with_market("pool-1");
        let config = base_config();
        let supplier = addr(1);
        engine
            .credit(&supplier, Asset::Nhb, &Wei::from(1000u64))
            .unwrap();
        engine
            .supply("pool-1", &config, 0, &supplier, &Wei::from(1000u64))
            .unwrap();

        let borrower = addr(2);
        engine
            .credit(&borrower, Asset::Znhb, &Wei::from(10_000u64))
            .unwrap();
        engine
            .deposit_collateral("pool-1", &borrower, &Wei::from(10_000u64))
            .unwrap();
        engine
            .borrow("pool-1", &config, 0, &borrower, &Wei::from(500u64), 0, None)
            .unwrap();

        engine
            .accrue_interest("pool-1", &config, math::BLOCKS_PER_YEAR)
            .unwrap();
        let market = engine.require_market("pool-1").unwrap();
        // utilisation 0.5, borrowAPR = 0 + 1*0.5 = 0.5, factor = 1.5R.
        let expected = math::ray_mul(&Ray::one(), &math::rate_factor(&Rational::new(1, 2), math::BLOCKS_PER_YEAR));
        assert_eq!(market.borrow_index, expected);
    }

    #[test]
    fn s3_paused_module_blocks_supply() {
        let engine = engine_with_market("pool-1");
        let mut config = base_config();
        config.pauses.supply = true;
        let supplier = addr(1);
        let err = engine
            .supply("pool-1", &config, 0, &supplier, &Wei::from(100u64))
            .unwrap_err();
        assert_eq!(err.code(), "module_paused");
    }

    #[test]
    fn s2_liquidation_routes_collateral_by_bps() {
        let engine = engine_with_market("pool-1");
        let mut config = base_config();
        config.collateral_routing = CollateralRouting {
            liquidator_bps: 0,
            developer_bps: 2000,
            developer_target: Some(addr(40)),
            protocol_bps: 1000,
            protocol_target: Some(addr(41)),
        };

        let supplier = addr(1);
        engine
            .credit(&supplier, Asset::Nhb, &Wei::from(1000u64))
            .unwrap();
        engine
            .supply("pool-1", &config, 0, &supplier, &Wei::from(1000u64))
            .unwrap();

        let borrower = addr(2);
        engine
            .credit(&borrower, Asset::Znhb, &Wei::from(1000u64))
            .unwrap();
        engine
            .deposit_collateral("pool-1", &borrower, &Wei::from(1000u64))
            .unwrap();
        engine
            .borrow("pool-1", &config, 0, &borrower, &Wei::from(850u64), 0, None)
            .unwrap();

        // Tighten the threshold below the position's 85% ratio to force it underwater.
        config.liquidation_threshold_bps = 8000;

        let liquidator = addr(3);
        engine
            .credit(&liquidator, Asset::Nhb, &Wei::from(850u64))
            .unwrap();
        let (repay_amount, seize, liquidator_share, developer_share, protocol_share) = engine
            .liquidate("pool-1", &config, 0, &liquidator, &borrower)
            .unwrap();

        assert_eq!(repay_amount, Wei::from(850u64));
        let expected_seize = Wei::from(850u64 * 10_500 / 10_000);
        assert_eq!(seize, expected_seize);
        assert_eq!(
            &(&liquidator_share + &developer_share) + &protocol_share,
            seize
        );
        assert_eq!(developer_share, seize.mul_bps_floor(2000));
        assert_eq!(protocol_share, seize.mul_bps_floor(1000));
    }

    #[test]
    fn per_block_borrow_cap_bounds_cumulative_borrow_not_just_one_call() {
        let engine = engine_with_market("pool-1");
        let mut config = base_config();
        config.borrow_caps.per_block = 600;

        let supplier = addr(1);
        engine
            .credit(&supplier, Asset::Nhb, &Wei::from(10_000u64))
            .unwrap();
        engine
            .supply("pool-1", &config, 0, &supplier, &Wei::from(10_000u64))
            .unwrap();

        let borrower = addr(2);
        engine
            .credit(&borrower, Asset::Znhb, &Wei::from(10_000u64))
            .unwrap();
        engine
            .deposit_collateral("pool-1", &borrower, &Wei::from(10_000u64))
            .unwrap();

        // Each call alone is under the 600 cap, but their sum (800) is not.
        engine
            .borrow("pool-1", &config, 0, &borrower, &Wei::from(400u64), 0, None)
            .unwrap();
        let err = engine
            .borrow("pool-1", &config, 0, &borrower, &Wei::from(400u64), 0, None)
            .unwrap_err();
        assert_eq!(err.code(), "borrow_cap_per_block");

        // A later block resets the cumulative counter.
        engine
            .borrow("pool-1", &config, 1, &borrower, &Wei::from(400u64), 0, None)
            .unwrap();
    }

    #[test]
    fn repay_with_no_debt_fails() {
        let engine = engine_with_market("pool-1");
        let config = base_config();
        let borrower = addr(9);
        let err = engine
            .repay("pool-1", &config, 0, &borrower, &Wei::from(1u64))
            .unwrap_err();
        assert_eq!(err.code(), "no_debt");
    }
}
