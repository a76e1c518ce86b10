//! Oracle Layer (C3): priority-ordered multi-source aggregation, TWAP over
//! a rolling window, and signed price-proof verification (spec §4.3).

use chrono::{DateTime, Utc};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1};
use sha3::{Digest, Keccak256};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use crate::clock::SharedClock;
use crate::error::{EngineError, Result};
use crate::math::{rational_to_fixed_string, Rational};

/// Fixed domain every price proof must carry (spec §4.3).
pub const PRICE_PROOF_DOMAIN: &str = "NHB_SWAP_PRICE_V1";
/// Tolerance for a proof timestamp that is slightly ahead of `now`.
pub const FUTURE_TOLERANCE_SECONDS: i64 = 30;

pub const DEFAULT_TWAP_SAMPLE_CAP: usize = 128;

/// A single observed rate from a named source.
#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub rate: Rational,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

/// A pluggable upstream price source. Implementations may be backed by an
/// RPC client, a cached feed, anything; the aggregator treats them as an
/// opaque priority-ordered list.
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;
    /// Returns `None` if this source has no (or no positive) rate for the
    /// pair right now.
    fn query(&self, base: &str, quote: &str) -> Option<PriceQuote>;
}

fn normalize_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

struct AggregatorInner {
    sources: Vec<Box<dyn PriceSource>>,
    priority: Vec<String>,
    max_age: chrono::Duration,
    twap_window: chrono::Duration,
    twap_sample_cap: usize,
    samples: HashMap<(String, String), VecDeque<PriceQuote>>,
}

/// Process-wide caches (sample history, source registry) scoped to one
/// explicitly owned instance rather than globals (spec §9 Design Notes).
pub struct Aggregator {
    clock: SharedClock,
    inner: RwLock<AggregatorInner>,
}

impl Aggregator {
    pub fn new(clock: SharedClock, max_age: chrono::Duration, twap_window: chrono::Duration) -> Self {
        Aggregator {
            clock,
            inner: RwLock::new(AggregatorInner {
                sources: Vec::new(),
                priority: Vec::new(),
                max_age,
                twap_window,
                twap_sample_cap: DEFAULT_TWAP_SAMPLE_CAP,
                samples: HashMap::new(),
            }),
        }
    }

    /// Exclusive: registers a source and appends it to the priority order.
    pub fn register(&self, source: Box<dyn PriceSource>) {
        let mut inner = self.inner.write().unwrap();
        inner.priority.push(source.name().to_string());
        inner.sources.push(source);
    }

    /// Exclusive: sets the full priority order by source name.
    pub fn set_priority(&self, order: Vec<String>) {
        self.inner.write().unwrap().priority = order;
    }

    pub fn set_max_age(&self, max_age: chrono::Duration) {
        self.inner.write().unwrap().max_age = max_age;
    }

    pub fn set_twap_window(&self, window: chrono::Duration) {
        self.inner.write().unwrap().twap_window = window;
    }

    pub fn set_twap_sample_cap(&self, cap: usize) {
        self.inner.write().unwrap().twap_sample_cap = cap;
    }

    /// Iterates sources in priority order; the first to return a positive
    /// rate within the freshness window wins. The winning quote is recorded
    /// into the rolling sample buffer (exclusive access) before returning a
    /// deep copy of it.
    pub fn get_rate(&self, base: &str, quote: &str) -> Result<PriceQuote> {
        let base = normalize_symbol(base);
        let quote = normalize_symbol(quote);
        let now = self.clock.now();

        let mut inner = self.inner.write().unwrap();
        let max_age = inner.max_age;
        let priority = inner.priority.clone();

        let mut winner: Option<PriceQuote> = None;
        for name in &priority {
            let Some(source) = inner.sources.iter().find(|s| s.name() == name) else {
                continue;
            };
            if let Some(q) = source.query(&base, &quote) {
                if q.rate.numerator == num_bigint::BigUint::from(0u32) {
                    continue;
                }
                if now.signed_duration_since(q.timestamp) <= max_age {
                    winner = Some(q);
                    break;
                }
            }
        }

        let quote_result = winner.ok_or_else(|| EngineError::NotFound {
            what: format!("no fresh rate for {}/{}", base, quote),
        })?;

        let key = (base, quote);
        let cap = inner.twap_sample_cap;
        let window = inner.twap_window;
        let buf = inner.samples.entry(key).or_default();
        buf.push_back(quote_result.clone());
        while buf.len() > cap {
            buf.pop_front();
        }
        let cutoff = now - window;
        while buf.front().map(|s| s.timestamp < cutoff).unwrap_or(false) {
            buf.pop_front();
        }

        Ok(quote_result)
    }

    /// Shared: the time-weighted average over `window` (or the configured
    /// default if `None`), plus the median and the oldest/newest sample
    /// timestamps used.
    pub fn twap(&self, base: &str, quote: &str, window: Option<chrono::Duration>) -> Result<TwapResult> {
        let base = normalize_symbol(base);
        let quote = normalize_symbol(quote);
        let inner = self.inner.read().unwrap();
        let window = window.unwrap_or(inner.twap_window);
        let now = self.clock.now();
        let cutoff = now - window;

        let samples: Vec<PriceQuote> = inner
            .samples
            .get(&(base, quote))
            .map(|buf| {
                buf.iter()
                    .filter(|s| s.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if samples.is_empty() {
            return Err(EngineError::NotFound {
                what: "no samples in TWAP window".to_string(),
            });
        }

        let mut sorted = samples.clone();
        sorted.sort_by_key(|s| s.timestamp);

        let average = mean(&sorted);
        let median = median_of(&sorted);
        let start = sorted.first().unwrap().timestamp;
        let end = sorted.last().unwrap().timestamp;

        Ok(TwapResult {
            average,
            median,
            start,
            end,
            window,
            samples: sorted,
        })
    }

    /// Shared: lightweight aggregator health snapshot.
    pub fn health(&self) -> AggregatorHealth {
        let inner = self.inner.read().unwrap();
        AggregatorHealth {
            source_count: inner.sources.len(),
            tracked_pairs: inner.samples.len(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AggregatorHealth {
    pub source_count: usize,
    pub tracked_pairs: usize,
}

#[derive(Debug, Clone)]
pub struct TwapResult {
    pub average: Rational,
    pub median: Rational,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub window: chrono::Duration,
    pub samples: Vec<PriceQuote>,
}

impl TwapResult {
    /// Deterministic auditable commitment (spec §4.3): SHA-256 over
    /// `BASE:QUOTE|w=<window-ns>|(t=<ns>|r=<18-decimal>|s=<source>)*`, with
    /// samples sorted ascending by timestamp before serialization (spec §9
    /// Design Notes: never rely on insertion order).
    pub fn proof_id(&self, base: &str, quote: &str) -> String {
        let mut samples = self.samples.clone();
        samples.sort_by_key(|s| s.timestamp);

        let mut canonical = format!(
            "{}:{}|w={}",
            normalize_symbol(base),
            normalize_symbol(quote),
            self.window.num_nanoseconds().unwrap_or(i64::MAX)
        );
        for s in &samples {
            canonical.push_str(&format!(
                "|t={}|r={}|s={}",
                s.timestamp.timestamp_nanos_opt().unwrap_or(0),
                rational_to_fixed_string(&s.rate, 18),
                s.source
            ));
        }

        let digest = sha2::Sha256::digest(canonical.as_bytes());
        hex::encode(digest)
    }
}

fn mean(samples: &[PriceQuote]) -> Rational {
    let mut numerator = num_bigint::BigUint::from(0u32);
    let mut common_denominator = num_bigint::BigUint::from(1u32);
    for s in samples {
        common_denominator = &common_denominator * &s.rate.denominator;
    }
    for s in samples {
        let factor = &common_denominator / &s.rate.denominator;
        numerator = numerator + &s.rate.numerator * factor;
    }
    Rational {
        numerator,
        denominator: common_denominator * num_bigint::BigUint::from(samples.len() as u64),
    }
}

fn median_of(sorted_by_time: &[PriceQuote]) -> Rational {
    let mut by_value: Vec<&Rational> = sorted_by_time.iter().map(|s| &s.rate).collect();
    by_value.sort_by(|a, b| (&a.numerator * &b.denominator).cmp(&(&b.numerator * &a.denominator)));
    let n = by_value.len();
    if n % 2 == 1 {
        by_value[n / 2].clone()
    } else {
        let a = by_value[n / 2 - 1];
        let b = by_value[n / 2];
        Rational {
            numerator: &a.numerator * &b.denominator + &b.numerator * &a.denominator,
            denominator: &a.denominator * &b.denominator * num_bigint::BigUint::from(2u32),
        }
    }
}

/// A signed, provider-attested quote (spec §4.3).
#[derive(Debug, Clone)]
pub struct PriceProof {
    pub domain: String,
    pub provider: String,
    pub base: String,
    pub quote: String,
    pub rate: Rational,
    pub timestamp: i64,
    pub signature: [u8; 65],
}

impl PriceProof {
    /// `UPPER(DOMAIN)|provider=<lower>|pair=BASE/QUOTE|rate=<18-decimal>|ts=<unix>`.
    pub fn canonical_message(&self) -> String {
        format!(
            "{}|provider={}|pair={}/{}|rate={}|ts={}",
            self.domain.trim().to_uppercase(),
            self.provider.trim().to_lowercase(),
            normalize_symbol(&self.base),
            normalize_symbol(&self.quote),
            rational_to_fixed_string(&self.rate, 18),
            self.timestamp
        )
    }

    fn digest(&self) -> [u8; 32] {
        let mut hasher = Keccak256::new();
        hasher.update(self.canonical_message().as_bytes());
        hasher.finalize().into()
    }
}

/// Last accepted signed quote per base symbol, for deviation tracking.
#[derive(Debug, Clone)]
pub struct PriceProofRecord {
    pub base: String,
    pub rate: Rational,
    pub timestamp: i64,
}

/// Maps provider name (lowercased) to its registered secp256k1 signer.
#[derive(Debug, Default)]
pub struct SignerRegistry {
    signers: HashMap<String, PublicKey>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: &str, signer: PublicKey) {
        self.signers.insert(provider.trim().to_lowercase(), signer);
    }

    pub fn get(&self, provider: &str) -> Option<&PublicKey> {
        self.signers.get(&provider.trim().to_lowercase())
    }
}

/// Verifies a signed price proof against every guard in spec §4.3, in
/// order, returning the record to persist as `lastAccepted` on success.
#[allow(clippy::too_many_arguments)]
pub fn verify_price_proof(
    proof: &PriceProof,
    expected_provider: &str,
    registry: &SignerRegistry,
    last_accepted: Option<&PriceProofRecord>,
    now_unix: i64,
    max_age_seconds: i64,
    max_deviation_bps: u32,
) -> Result<PriceProofRecord> {
    if proof.domain.trim().is_empty() || !proof.domain.trim().eq_ignore_ascii_case(PRICE_PROOF_DOMAIN) {
        return Err(EngineError::PriceProofDomain {
            expected: PRICE_PROOF_DOMAIN.to_string(),
        });
    }

    let base = normalize_symbol(&proof.base);
    if base != "NHB" && base != "ZNHB" {
        return Err(EngineError::PriceProofPair {
            base: proof.base.clone(),
            quote: proof.quote.clone(),
        });
    }
    let quote = normalize_symbol(&proof.quote);
    if quote != "USD" {
        return Err(EngineError::PriceProofPair {
            base: proof.base.clone(),
            quote: proof.quote.clone(),
        });
    }

    if !proof
        .provider
        .trim()
        .eq_ignore_ascii_case(expected_provider.trim())
    {
        return Err(EngineError::PriceProofProviderMismatch {
            expected: expected_provider.to_string(),
            got: proof.provider.clone(),
        });
    }

    let signer = registry
        .get(&proof.provider)
        .ok_or_else(|| EngineError::PriceProofSignerUnknown {
            provider: proof.provider.clone(),
        })?;

    let recovered = recover_signer(proof).ok_or(EngineError::PriceProofSignatureInvalid)?;
    if &recovered != signer {
        return Err(EngineError::PriceProofSignatureInvalid);
    }

    if proof.timestamp > now_unix + FUTURE_TOLERANCE_SECONDS {
        return Err(EngineError::PriceProofStale {
            timestamp: proof.timestamp,
            now: now_unix,
            max_age: max_age_seconds,
        });
    }
    if now_unix - proof.timestamp > max_age_seconds {
        return Err(EngineError::PriceProofStale {
            timestamp: proof.timestamp,
            now: now_unix,
            max_age: max_age_seconds,
        });
    }

    if let Some(prev) = last_accepted {
        if prev.base == base && !prev.rate.numerator.eq(&num_bigint::BigUint::from(0u32)) {
            let deviation_bps = deviation_bps(&prev.rate, &proof.rate);
            if deviation_bps > max_deviation_bps {
                return Err(EngineError::PriceProofDeviation {
                    current_bps: deviation_bps,
                    limit_bps: max_deviation_bps,
                });
            }
        }
    }

    Ok(PriceProofRecord {
        base,
        rate: proof.rate.clone(),
        timestamp: proof.timestamp,
    })
}

fn recover_signer(proof: &PriceProof) -> Option<PublicKey> {
    let recovery_id = RecoveryId::from_i32(i32::from(proof.signature[64])).ok()?;
    let sig = RecoverableSignature::from_compact(&proof.signature[..64], recovery_id).ok()?;
    let message = Message::from_slice(&proof.digest()).ok()?;
    let secp = Secp256k1::verification_only();
    secp.recover_ecdsa(&message, &sig).ok()
}

/// `|current - previous| * 10^4 / previous`, in basis points.
pub fn deviation_bps(previous: &Rational, current: &Rational) -> u32 {
    if previous.numerator.eq(&num_bigint::BigUint::from(0u32)) {
        return 0;
    }
    let prev_cross = &previous.numerator * &current.denominator;
    let cur_cross = &current.numerator * &previous.denominator;
    let diff = if prev_cross >= cur_cross {
        prev_cross.clone() - &cur_cross
    } else {
        cur_cross - &prev_cross
    };
    // bps = diff / (previous.den * current.den) * 10^4 / (previous.num / previous.den)
    //     = diff * 10^4 / (previous.num * current.den)
    let numerator = diff * num_bigint::BigUint::from(crate::math::BPS_DENOM);
    let denominator = &previous.numerator * &current.denominator;
    (numerator / denominator).try_into().unwrap_or(u32::MAX)
}
