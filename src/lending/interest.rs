//! Kinked interest-rate model (spec §4.5.8).

use serde::{Deserialize, Serialize};

use crate::math::Rational;

/// `BaseRate`, `Slope1`, `Slope2`, `Kink`, all rationals, all in the same
/// units as `utilisation` (fraction of 1, not bps).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestModel {
    pub base_rate: Rational,
    pub slope1: Rational,
    pub slope2: Rational,
    pub kink: Rational,
}

impl InterestModel {
    /// `utilisation <= kink => base + slope1*utilisation`
    /// `utilisation >  kink => base + slope1*kink + slope2*(utilisation-kink)`
    pub fn borrow_apr(&self, utilisation: &Rational) -> Rational {
        let util_cmp = cross_compare(utilisation, &self.kink);
        if util_cmp <= std::cmp::Ordering::Equal {
            add(&self.base_rate, &mul(&self.slope1, utilisation))
        } else {
            let base_plus_kink = add(&self.base_rate, &mul(&self.slope1, &self.kink));
            let over_kink = sub(utilisation, &self.kink);
            add(&base_plus_kink, &mul(&self.slope2, &over_kink))
        }
    }
}

fn cross_compare(a: &Rational, b: &Rational) -> std::cmp::Ordering {
    (&a.numerator * &b.denominator).cmp(&(&b.numerator * &a.denominator))
}

fn add(a: &Rational, b: &Rational) -> Rational {
    Rational {
        numerator: &a.numerator * &b.denominator + &b.numerator * &a.denominator,
        denominator: &a.denominator * &b.denominator,
    }
}

fn sub(a: &Rational, b: &Rational) -> Rational {
    let an = &a.numerator * &b.denominator;
    let bn = &b.numerator * &a.denominator;
    let denominator = &a.denominator * &b.denominator;
    let numerator = if an >= bn {
        an - bn
    } else {
        // utilisation is always >= kink on this branch; guard defensively.
        num_bigint::BigUint::from(0u32)
    };
    Rational {
        numerator,
        denominator,
    }
}

fn mul(a: &Rational, b: &Rational) -> Rational {
    Rational {
        numerator: &a.numerator * &b.numerator,
        denominator: &a.denominator * &b.denominator,
    }
}

/// `totalBorrowed / totalSupplied`, zero if `totalSupplied == 0`.
pub fn utilisation(total_borrowed: &crate::math::Wei, total_supplied: &crate::math::Wei) -> Rational {
    if total_supplied.is_zero() {
        return Rational::zero();
    }
    Rational {
        numerator: total_borrowed.0.clone(),
        denominator: total_supplied.0.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_kink_is_linear() {
        let model = InterestModel {
            base_rate: Rational::new(0, 1),
            slope1: Rational::new(1, 1),
            slope2: Rational::new(0, 1),
            kink: Rational::new(1, 1),
        };
        let apr = model.borrow_apr(&Rational::new(1, 2));
        // 0 + 1 * 0.5 = 0.5
        assert_eq!(apr.numerator, num_bigint::BigUint::from(1u32));
        // normalize: 1/2 reduces identically since constructed that way
        assert_eq!(cross_compare(&apr, &Rational::new(1, 2)), std::cmp::Ordering::Equal);
    }

    #[test]
    fn above_kink_uses_slope2() {
        let model = InterestModel {
            base_rate: Rational::new(1, 100),
            slope1: Rational::new(2, 10),
            slope2: Rational::new(5, 10),
            kink: Rational::new(8, 10),
        };
        let apr = model.borrow_apr(&Rational::new(9, 10));
        // base + slope1*kink + slope2*(0.9-0.8) = 0.01 + 0.16 + 0.05 = 0.22
        let expected = Rational::new(22, 100);
        assert_eq!(cross_compare(&apr, &expected), std::cmp::Ordering::Equal);
    }
}
