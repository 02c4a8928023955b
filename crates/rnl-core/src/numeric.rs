use crate::CoreError;

/// Floating point type used throughout system
pub type Real = f64;

/// One tolerance for everything
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Round `number` to the nearest multiple of `precision`, ties away from zero.
///
/// `precision == 0` rounds to an integer. NaN passes through unchanged.
/// The quotient is first snapped to 9 decimals so that decimal inputs such as
/// `2.675 / 0.01` round the way they read.
pub fn round_to_precision(number: Real, precision: Real) -> Real {
    if number.is_nan() {
        return number;
    }
    if precision == 0.0 {
        return snap(number).round();
    }
    let precision = precision.abs();
    let steps = snap(number / precision).round();
    let inverse = 1.0 / precision;
    if precision < 1.0 && (inverse - inverse.round()).abs() < 1e-9 {
        // divide by the integer inverse to keep results like 2.68 exact
        steps / inverse.round()
    } else {
        steps * precision
    }
}

/// Round to a number of decimals (ties away from zero).
pub fn round_decimals(number: Real, decimals: u32) -> Real {
    round_to_precision(number, 10_f64.powi(-(decimals as i32)))
}

/// Round `number` to at most `digits` significant digits.
pub fn round_to_significant_digits(number: Real, digits: u32) -> Result<Real, CoreError> {
    if number == 0.0 || number.is_nan() {
        return Ok(number);
    }
    if digits == 0 {
        return Err(CoreError::InvalidArg {
            what: "significant digits must be a positive integer".to_string(),
        });
    }
    let exponent = number.abs().log10().floor() as i32;
    let precision = 10_f64.powi(exponent - digits as i32 + 1);
    Ok(round_to_precision(number, precision))
}

fn snap(q: Real) -> Real {
    let snapped = (q * 1e9).round() / 1e9;
    if snapped.is_finite() { snapped } else { q }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn rounding_stays_within_half_a_step(x in -1.0e6_f64..1.0e6_f64, p in prop::sample::select(vec![0.001_f64, 0.01, 0.1, 1.0, 10.0])) {
            let r = round_to_precision(x, p);
            prop_assert!((r - x).abs() <= p / 2.0 + 1e-6);
        }

        #[test]
        fn rounding_is_idempotent(x in -1.0e4_f64..1.0e4_f64) {
            let once = round_to_precision(x, 0.01);
            let twice = round_to_precision(once, 0.01);
            prop_assert_eq!(once, twice);
        }
    }
}
