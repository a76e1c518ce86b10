//! Black-box scenarios exercising the lending and swap engines purely
//! through their public APIs, backed by the in-memory storage adapters.

use std::sync::Arc;

use chrono::Utc;
use num_bigint::BigUint;
use secp256k1::{Message, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

use nhb_core::address::Address;
use nhb_core::clock::{FixedClock, SharedClock};
use nhb_core::config::{CollateralRouting, LendingConfig, SwapConfig};
use nhb_core::lending::interest::InterestModel;
use nhb_core::lending::market::Market;
use nhb_core::lending::LendingEngine;
use nhb_core::math::Rational;
use nhb_core::model::{Asset, SystemAddresses};
use nhb_core::oracle::{PriceProof, SignerRegistry, PRICE_PROOF_DOMAIN};
use nhb_core::storage::{MemStateStore, MemSwapStore, StateStore, StaticPauseView};
use nhb_core::swap::{MintRequest, SwapEngine, VoucherRecord, VoucherStatus};
use nhb_core::Wei;

fn addr(n: u8) -> Address {
    Address([n; 20])
}

fn system() -> SystemAddresses {
    SystemAddresses {
        module_treasury: addr(200),
        collateral_custody: addr(201),
    }
}

fn lending_config() -> LendingConfig {
    LendingConfig {
        max_ltv_bps: 8000,
        liquidation_threshold_bps: 8500,
        liquidation_bonus_bps: 500,
        reserve_factor_bps: 1000,
        developer_fee_cap_bps: 10_000,
        interest_model: Some(InterestModel {
            base_rate: Rational::new(0, 1),
            slope1: Rational::new(1, 1),
            slope2: Rational::new(0, 1),
            kink: Rational::new(1, 1),
        }),
        ..LendingConfig::default()
    }
}

fn fund(store: &MemStateStore, who: &Address, asset: Asset, amount: u64) {
    let mut account = store.get_account(who).unwrap();
    *account.balance_mut(asset) = Wei::from(amount);
    store.put_account(who, account).unwrap();
}

/// S1: supply liquidity, borrow against collateral, let interest accrue,
/// then repay and withdraw. Exercises the full happy path end to end.
#[test]
fn lending_supply_borrow_accrue_repay_withdraw_round_trip() {
    let store = MemStateStore::new();
    store.put_market("pool-core", Market::genesis("pool-core", 0)).unwrap();

    let supplier = addr(1);
    fund(&store, &supplier, Asset::Nhb, 10_000);
    let borrower = addr(2);
    fund(&store, &borrower, Asset::Znhb, 5_000);

    let engine = LendingEngine::new(store, system());
    let config = lending_config();

    let shares = engine
        .supply("pool-core", &config, 0, &supplier, &Wei::from(10_000u64))
        .unwrap();
    assert_eq!(shares, Wei::from(10_000u64));

    engine
        .deposit_collateral("pool-core", &borrower, &Wei::from(5_000u64))
        .unwrap();
    let (borrowed, fee) = engine
        .borrow("pool-core", &config, 0, &borrower, &Wei::from(2_000u64), 0, None)
        .unwrap();
    assert_eq!(borrowed, Wei::from(2_000u64));
    assert!(fee.is_zero());

    engine
        .accrue_interest("pool-core", &config, nhb_core::math::BLOCKS_PER_YEAR)
        .unwrap();

    let repaid = engine
        .repay(
            "pool-core",
            &config,
            nhb_core::math::BLOCKS_PER_YEAR,
            &borrower,
            &Wei::from(100_000u64),
        )
        .unwrap();
    assert!(repaid > Wei::from(2_000u64), "accrued interest must be repayable too");

    let redeemed = engine
        .withdraw(
            "pool-core",
            &config,
            nhb_core::math::BLOCKS_PER_YEAR,
            &supplier,
            &shares,
        )
        .unwrap();
    assert!(redeemed >= Wei::from(10_000u64));
}

/// S2: an undercollateralized position is liquidated and the seized
/// collateral is split between liquidator, developer and protocol per the
/// configured routing bps. A healthy position cannot be liquidated twice.
#[test]
fn lending_liquidation_underwater_position_routes_collateral() {
    let store = MemStateStore::new();
    store.put_market("pool-core", Market::genesis("pool-core", 0)).unwrap();

    let supplier = addr(1);
    fund(&store, &supplier, Asset::Nhb, 1_000);
    let borrower = addr(2);
    fund(&store, &borrower, Asset::Znhb, 1_000);
    let liquidator = addr(3);
    fund(&store, &liquidator, Asset::Nhb, 850);

    let engine = LendingEngine::new(store, system());

    let mut config = lending_config();
    config.collateral_routing = CollateralRouting {
        liquidator_bps: 7000,
        developer_bps: 2000,
        developer_target: Some(addr(40)),
        protocol_bps: 1000,
        protocol_target: Some(addr(41)),
    };

    engine
        .supply("pool-core", &config, 0, &supplier, &Wei::from(1_000u64))
        .unwrap();
    engine
        .deposit_collateral("pool-core", &borrower, &Wei::from(1_000u64))
        .unwrap();
    engine
        .borrow("pool-core", &config, 0, &borrower, &Wei::from(850u64), 0, None)
        .unwrap();

    // Tighten the threshold so the 85% position becomes liquidatable.
    config.liquidation_threshold_bps = 8000;

    let (repay_amount, seize, liquidator_share, developer_share, protocol_share) = engine
        .liquidate("pool-core", &config, 0, &liquidator, &borrower)
        .unwrap();

    assert_eq!(repay_amount, Wei::from(850u64));
    assert_eq!(
        &(&liquidator_share + &developer_share) + &protocol_share,
        seize
    );
    assert!(liquidator_share > Wei::zero());
    assert!(developer_share > Wei::zero());
    assert!(protocol_share > Wei::zero());

    let err = engine
        .liquidate("pool-core", &config, 0, &liquidator, &borrower)
        .unwrap_err();
    assert_eq!(err.code(), "not_liquidatable");
}

/// S3: the module pause gate blocks mutating operations.
#[test]
fn lending_paused_module_blocks_borrow() {
    let store = MemStateStore::new();
    store.put_market("pool-core", Market::genesis("pool-core", 0)).unwrap();
    let engine = LendingEngine::new(store, system());

    let mut config = lending_config();
    config.pauses.borrow = true;

    let borrower = addr(9);
    let err = engine
        .borrow("pool-core", &config, 0, &borrower, &Wei::from(1u64), 0, None)
        .unwrap_err();
    assert_eq!(err.code(), "module_paused");
}

/// S7: every operation against an unconfigured pool fails cleanly.
#[test]
fn lending_unconfigured_pool_rejects_supply() {
    let store = MemStateStore::new();
    let engine = LendingEngine::new(store, system());
    let config = lending_config();
    let err = engine
        .supply("ghost-pool", &config, 0, &addr(1), &Wei::from(1u64))
        .unwrap_err();
    assert_eq!(err.code(), "pool_not_configured");
}

/// Developer-fee routing on borrow: the fee is capped and paid to the
/// configured collector, while the borrower still receives the full
/// requested principal.
#[test]
fn lending_borrow_developer_fee_routes_to_collector() {
    let store = MemStateStore::new();
    store.put_market("pool-core", Market::genesis("pool-core", 0)).unwrap();

    let supplier = addr(1);
    fund(&store, &supplier, Asset::Nhb, 10_000);
    let borrower = addr(2);
    fund(&store, &borrower, Asset::Znhb, 10_000);

    let engine = LendingEngine::new(store, system());
    let mut config = lending_config();
    let collector = addr(77);
    config.developer_fee_bps = 100;
    config.developer_fee_collector = Some(collector);
    config.developer_fee_cap_bps = 200;

    engine
        .supply("pool-core", &config, 0, &supplier, &Wei::from(10_000u64))
        .unwrap();
    engine
        .deposit_collateral("pool-core", &borrower, &Wei::from(10_000u64))
        .unwrap();
    let (amount_out, fee) = engine
        .borrow("pool-core", &config, 0, &borrower, &Wei::from(1_000u64), 0, None)
        .unwrap();
    assert_eq!(amount_out, Wei::from(1_000u64));
    assert_eq!(fee, Wei::from(10u64)); // 1000 * 1% = 10

    engine
        .withdraw_developer_fees("pool-core", &collector, &Wei::from(10u64))
        .unwrap();
}

fn fixed_clock_now() -> (SharedClock, i64) {
    let now = Utc::now();
    (Arc::new(FixedClock(now)), now.timestamp())
}

fn signed_proof(secret: &SecretKey, provider: &str, rate: Rational, timestamp: i64) -> PriceProof {
    let mut proof = PriceProof {
        domain: PRICE_PROOF_DOMAIN.to_string(),
        provider: provider.to_string(),
        base: "NHB".to_string(),
        quote: "USD".to_string(),
        rate,
        timestamp,
        signature: [0u8; 65],
    };
    let digest: [u8; 32] = Keccak256::digest(proof.canonical_message().as_bytes()).into();
    let secp = Secp256k1::signing_only();
    let message = Message::from_slice(&digest).unwrap();
    let (recovery_id, compact) = secp.sign_ecdsa_recoverable(&message, secret).serialize_compact();
    let mut signature = [0u8; 65];
    signature[..64].copy_from_slice(&compact);
    signature[64] = recovery_id.to_i32() as u8;
    proof.signature = signature;
    proof
}

fn sample_voucher(id: &str, recipient: Address, ts: i64) -> VoucherRecord {
    VoucherRecord {
        provider_tx_id: id.to_string(),
        provider: "acme".to_string(),
        fiat_currency: "USD".to_string(),
        fiat_amount: "10.00".to_string(),
        usd: "10.00".to_string(),
        rate: "1.0".to_string(),
        token: "NHB".to_string(),
        mint_amount_wei: Wei::from(10u64),
        recipient,
        username: "alice".to_string(),
        address: "nhb1...".to_string(),
        quote_ts: ts,
        source: "acme".to_string(),
        oracle_median: "1.0".to_string(),
        oracle_feeders: "acme".to_string(),
        price_proof_id: "proof-1".to_string(),
        minter_sig: "sig".to_string(),
        status: VoucherStatus::Minted,
        created_at: 0,
        twap_rate: "1.0".to_string(),
        twap_observations: 1,
        twap_window_seconds: 3600,
        twap_start: ts,
        twap_end: ts,
    }
}

/// S5/S6: minting a voucher verifies the signed price proof, runs every
/// risk guard, and persists the voucher record exactly once per
/// `providerTxId`.
#[test]
fn swap_mint_voucher_verifies_proof_and_rejects_replay() {
    let store = MemSwapStore::new();
    let pause = StaticPauseView::new();
    let (clock, ts) = fixed_clock_now();
    let config = SwapConfig::default();

    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[7u8; 32]).unwrap();
    let public = secret.public_key(&secp);
    let mut registry = SignerRegistry::new();
    registry.register("acme", public);

    let proof = signed_proof(&secret, "acme", Rational::new(1, 1), ts);

    let engine = SwapEngine::new(&store, &pause, clock, config);
    let record = sample_voucher("tx-1", addr(5), ts);

    let request = MintRequest {
        record,
        proof,
        expected_provider: "acme".to_string(),
    };
    engine.mint_voucher(request, None, &registry).unwrap();

    let ledger = engine.vouchers();
    let stored = ledger.get("tx-1").unwrap().unwrap();
    assert_eq!(stored.recipient, addr(5));
    assert_eq!(stored.mint_amount_wei, Wei::from(10u64));

    // Re-minting the same providerTxId is rejected by voucher idempotency.
    let proof2 = signed_proof(&secret, "acme", Rational::new(1, 1), ts);
    let request2 = MintRequest {
        record: sample_voucher("tx-1", addr(5), ts),
        proof: proof2,
        expected_provider: "acme".to_string(),
    };
    let err = engine.mint_voucher(request2, None, &registry).unwrap_err();
    assert_eq!(err.code(), "idempotency_conflict");
}

/// Sanctioned recipients are blocked before the voucher is written, and the
/// rejection is recorded to the sanctions audit log.
#[test]
fn swap_mint_voucher_blocks_sanctioned_recipient() {
    let store = MemSwapStore::new();
    let pause = StaticPauseView::new();
    let (clock, ts) = fixed_clock_now();
    let recipient = addr(66);
    let mut config = SwapConfig::default();
    config.sanctions_deny_list = vec![recipient.to_hex()];

    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[9u8; 32]).unwrap();
    let public = secret.public_key(&secp);
    let mut registry = SignerRegistry::new();
    registry.register("acme", public);
    let proof = signed_proof(&secret, "acme", Rational::new(1, 1), ts);

    let engine = SwapEngine::new(&store, &pause, clock, config);
    let record = sample_voucher("tx-sanctioned", recipient, ts);
    let request = MintRequest {
        record,
        proof,
        expected_provider: "acme".to_string(),
    };
    let err = engine.mint_voucher(request, None, &registry).unwrap_err();
    assert_eq!(err.code(), "invalid_amount");

    let failures = engine.list_sanctions_failures(&recipient).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].provider_tx_id, "tx-sanctioned");
}

/// An unknown signer is rejected even with a structurally valid signature.
#[test]
fn swap_mint_voucher_rejects_unregistered_signer() {
    let store = MemSwapStore::new();
    let pause = StaticPauseView::new();
    let (clock, ts) = fixed_clock_now();
    let config = SwapConfig::default();

    let secret = SecretKey::from_slice(&[11u8; 32]).unwrap();
    let registry = SignerRegistry::new(); // nobody registered
    let proof = signed_proof(&secret, "acme", Rational::new(1, 1), ts);

    let engine = SwapEngine::new(&store, &pause, clock, config);
    let request = MintRequest {
        record: sample_voucher("tx-2", addr(6), ts),
        proof,
        expected_provider: "acme".to_string(),
    };
    let err = engine.mint_voucher(request, None, &registry).unwrap_err();
    assert_eq!(err.code(), "price_proof_signer_unknown");
}

/// Deposit -> cash-out -> settle lifecycle through the orchestrating
/// `SwapEngine`, including the cash-out asset cap guard.
#[test]
fn swap_deposit_then_cash_out_respects_caps_and_settles() {
    let store = MemSwapStore::new();
    let pause = StaticPauseView::new();
    let (clock, _ts) = fixed_clock_now();
    let mut config = SwapConfig::default();
    config.cash_out.asset_caps.insert("USDC".to_string(), 500);
    config.cash_out.tiers.insert("standard".to_string(), 1_000);

    let engine = SwapEngine::new(&store, &pause, clock, config);
    engine
        .deposit_stable("inv-1", "usdc", &Wei::from(1_000u64))
        .unwrap();

    let over_cap = engine.request_cash_out(
        "intent-over",
        "usdc",
        "standard",
        &Wei::from(600u64),
        &Wei::from(600u64),
        &Wei::zero(),
        &Wei::zero(),
    );
    assert_eq!(over_cap.unwrap_err().code(), "cashout_asset_cap");

    engine
        .request_cash_out(
            "intent-1",
            "usdc",
            "standard",
            &Wei::from(400u64),
            &Wei::from(400u64),
            &Wei::zero(),
            &Wei::zero(),
        )
        .unwrap();

    engine
        .settle_cash_out("intent-1", "usdc", &Wei::from(400u64), &Wei::from(400u64))
        .unwrap();
}

/// Oracle deviation and freshness guards used directly by the lending
/// borrow path (shared free functions in the risk engine).
#[test]
fn risk_oracle_guards_reject_stale_and_deviated_prices() {
    assert!(nhb_core::risk::check_oracle_freshness(100, 110, 20, 0).is_ok());
    assert!(nhb_core::risk::check_oracle_freshness(100, 200, 20, 0).is_err());

    assert!(nhb_core::risk::check_oracle_deviation(&Wei::from(100u64), &Wei::from(103u64), 500).is_ok());
    assert!(nhb_core::risk::check_oracle_deviation(&Wei::from(100u64), &Wei::from(200u64), 500).is_err());
}

/// Basis-point multiplication floors rather than rounding up, and a tiny
/// nonzero amount times a tiny bps value can legitimately floor to zero.
#[test]
fn math_bps_multiplication_floors() {
    let amount = Wei::from(9_999u64);
    assert_eq!(amount.mul_bps_floor(1), Wei::zero());
    assert_eq!(Wei::from(20_000u64).mul_bps_floor(50), Wei::from(100u64));
}

/// Ray-scaled debt accounting round-trips within one unit under index
/// growth, matching the fixed-point module's own rounding contract.
#[test]
fn math_ray_debt_round_trip_within_rounding_unit() {
    use nhb_core::math::{debt_from_scaled, scaled_debt_from_amount, Ray};
    let index = Ray(BigUint::from(10u32).pow(27) + BigUint::from(1u32));
    let amount = Wei::from(1_000_000u64);
    let scaled = scaled_debt_from_amount(&amount, &index);
    let back = debt_from_scaled(&scaled, &index);
    let diff = back.saturating_sub(&amount);
    assert!(diff.0 <= BigUint::from(1u32));
}

#[test]
fn clock_fixed_reports_consistent_unix_time() {
    let now = Utc::now();
    let fixed: SharedClock = Arc::new(FixedClock(now));
    assert_eq!(fixed.now_unix(), now.timestamp());
}
