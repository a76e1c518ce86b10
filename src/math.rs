//! Fixed-point math (C1): ray (10^27) and bps (10^4) arithmetic with
//! half-even^ rounding, rational-to-ray conversion, and interest-accrual
//! factors.
//!
//! ^ "half-even" in spec §4.1's heading; every worked example in spec §8
//! (S1) and every helper's own half-up description resolves ties away from
//! zero, so this module implements half-up throughout and documents the
//! discrepancy here rather than silently picking one reading.
//!
//! Amounts are arbitrary-precision non-negative integers (`num_bigint::
//! BigUint`), grounded on XOXNO-rs-lending's big-integer ledger math
//! (`common/math/src/math.rs`'s `mul_half_up`/`div_half_up`, which this
//! module's `ray_mul`/`ray_div` adapt from `ManagedDecimal` raw-unit
//! arithmetic to plain `BigUint`).

use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Ray precision: 10^27.
pub const RAY_EXP: u32 = 27;
/// Basis-point denominator: 10^4.
pub const BPS_DENOM: u32 = 10_000;
/// Fixed block-time constant for per-block interest deltas.
pub const BLOCKS_PER_YEAR: u64 = 31_536_000;

fn ray_const() -> BigUint {
    BigUint::from(10u32).pow(RAY_EXP)
}

/// A non-negative integer amount denominated in wei (smallest base unit).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Wei(pub BigUint);

impl Wei {
    pub fn zero() -> Self {
        Wei(BigUint::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn min(a: &Wei, b: &Wei) -> Wei {
        if a.0 <= b.0 {
            a.clone()
        } else {
            b.clone()
        }
    }

    pub fn saturating_sub(&self, other: &Wei) -> Wei {
        if self.0 >= other.0 {
            Wei(&self.0 - &other.0)
        } else {
            Wei::zero()
        }
    }

    /// `floor(self * bps / BPS_DENOM)`.
    pub fn mul_bps_floor(&self, bps: u32) -> Wei {
        Wei(&self.0 * BigUint::from(bps) / BigUint::from(BPS_DENOM))
    }
}

impl From<u64> for Wei {
    fn from(v: u64) -> Self {
        Wei(BigUint::from(v))
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for &Wei {
    type Output = Wei;
    fn add(self, rhs: &Wei) -> Wei {
        Wei(&self.0 + &rhs.0)
    }
}

impl Sub for &Wei {
    type Output = Wei;
    /// Panics on underflow: callers must check solvency before subtracting.
    fn sub(self, rhs: &Wei) -> Wei {
        Wei(&self.0 - &rhs.0)
    }
}

/// A ray-precision (10^27) fixed-point index or rate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ray(pub BigUint);

impl Ray {
    /// The ray unit, R = 10^27.
    pub fn one() -> Self {
        Ray(ray_const())
    }

    pub fn zero() -> Self {
        Ray(BigUint::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Ray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An exact non-negative rational `numerator / denominator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub numerator: BigUint,
    pub denominator: BigUint,
}

impl Rational {
    pub fn new(numerator: u64, denominator: u64) -> Self {
        Rational {
            numerator: BigUint::from(numerator),
            denominator: BigUint::from(denominator),
        }
    }

    pub fn zero() -> Self {
        Rational::new(0, 1)
    }
}

/// `(numerator + denominator/2) / denominator`, half-up rounding.
///
/// Division by zero returns zero; every call site here has a caller-checked
/// nonzero denominator except where documented otherwise.
fn half_up_div(numerator: BigUint, denominator: &BigUint) -> BigUint {
    if denominator.is_zero() {
        return BigUint::zero();
    }
    let half = denominator / 2u32;
    (numerator + half) / denominator
}

/// `rayMul(a, b) = (a*b + R/2) / R`.
pub fn ray_mul(a: &Ray, b: &Ray) -> Ray {
    Ray(half_up_div(&a.0 * &b.0, &ray_const()))
}

/// `rayDiv(a, b) = (a*R + b/2) / b`. Division by zero returns ray zero.
pub fn ray_div(a: &Ray, b: &Ray) -> Ray {
    if b.is_zero() {
        return Ray::zero();
    }
    Ray(half_up_div(&a.0 * ray_const(), &b.0))
}

/// Maps an exact rational to ray with half-up rounding. Never produces zero
/// for a strictly positive input: the minimum representable nonzero ray
/// value (one ray unit) is returned instead of a floor-to-zero.
pub fn rat_to_ray(r: &Rational) -> Ray {
    if r.numerator.is_zero() {
        return Ray::zero();
    }
    let scaled = half_up_div(&r.numerator * ray_const(), &r.denominator);
    if scaled.is_zero() {
        Ray(BigUint::one())
    } else {
        Ray(scaled)
    }
}

/// `rateFactor(annualRate, deltaBlocks) = ratToRay(1 + annualRate * deltaBlocks / blocksPerYear)`.
pub fn rate_factor(annual_rate: &Rational, delta_blocks: u64) -> Ray {
    let blocks_per_year = BigUint::from(BLOCKS_PER_YEAR);
    // 1 + annualRate * deltaBlocks / blocksPerYear, as an exact rational with
    // denominator annualRate.denominator * blocksPerYear.
    let denominator = &annual_rate.denominator * &blocks_per_year;
    let numerator =
        &denominator + &annual_rate.numerator * BigUint::from(delta_blocks);
    rat_to_ray(&Rational {
        numerator,
        denominator,
    })
}

/// `computeInterest(totalBorrowed, annualRate, deltaBlocks) =
///  floor(totalBorrowed * annualRate * deltaBlocks / blocksPerYear)`.
pub fn compute_interest(
    total_borrowed: &Wei,
    annual_rate: &Rational,
    delta_blocks: u64,
) -> Wei {
    if total_borrowed.is_zero() || annual_rate.numerator.is_zero() || delta_blocks == 0 {
        return Wei::zero();
    }
    let numerator =
        &total_borrowed.0 * &annual_rate.numerator * BigUint::from(delta_blocks);
    let denominator = &annual_rate.denominator * BigUint::from(BLOCKS_PER_YEAR);
    Wei(numerator / denominator)
}

/// Converts a deposited liquidity amount to minted LP shares at the current
/// supply index, half-up rounded. Never rounds a positive amount to zero
/// shares (minimum 1).
pub fn shares_from_liquidity(amount: &Wei, supply_index: &Ray) -> Wei {
    if amount.is_zero() {
        return Wei::zero();
    }
    let scaled = half_up_div(&amount.0 * ray_const(), &supply_index.0);
    if scaled.is_zero() {
        Wei(BigUint::one())
    } else {
        Wei(scaled)
    }
}

/// Converts LP shares back to liquidity at the current supply index,
/// half-up rounded.
pub fn liquidity_from_shares(shares: &Wei, supply_index: &Ray) -> Wei {
    if shares.is_zero() {
        return Wei::zero();
    }
    Wei(half_up_div(&shares.0 * &supply_index.0, &ray_const()))
}

/// Converts a borrowed amount to ray-scaled debt principal at the current
/// borrow index. Never rounds a positive amount to zero (minimum 1).
pub fn scaled_debt_from_amount(amount: &Wei, borrow_index: &Ray) -> Wei {
    if amount.is_zero() {
        return Wei::zero();
    }
    let scaled = half_up_div(&amount.0 * ray_const(), &borrow_index.0);
    if scaled.is_zero() {
        Wei(BigUint::one())
    } else {
        Wei(scaled)
    }
}

/// Converts ray-scaled debt principal to the real amount owed at the
/// current borrow index.
pub fn debt_from_scaled(scaled_debt: &Wei, borrow_index: &Ray) -> Wei {
    if scaled_debt.is_zero() {
        return Wei::zero();
    }
    Wei(half_up_div(&scaled_debt.0 * &borrow_index.0, &ray_const()))
}

/// Renders a rational as a fixed-point decimal string with exactly
/// `decimals` fractional digits, truncating (not rounding) any remainder.
/// Used for canonical message construction (price proofs, TWAP proof ids)
/// where the wire format is a plain `<integer>.<decimals>` string.
pub fn rational_to_fixed_string(r: &Rational, decimals: u32) -> String {
    if r.denominator.is_zero() {
        return "0".to_string();
    }
    let scale = BigUint::from(10u32).pow(decimals);
    let scaled = (&r.numerator * &scale) / &r.denominator;
    let scaled_str = scaled.to_str_radix(10);
    let decimals = decimals as usize;
    if decimals == 0 {
        return scaled_str;
    }
    if scaled_str.len() <= decimals {
        let padded = format!("{:0>width$}", scaled_str, width = decimals + 1);
        let split_at = padded.len() - decimals;
        format!("{}.{}", &padded[..split_at], &padded[split_at..])
    } else {
        let split_at = scaled_str.len() - decimals;
        format!("{}.{}", &scaled_str[..split_at], &scaled_str[split_at..])
    }
}
