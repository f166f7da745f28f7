use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// `num / den` clamped to `[0, 1]`. A zero denominator yields `if_zero`.
#[inline]
pub fn unit_ratio(num: i64, den: i64, if_zero: Fixed64) -> Fixed64 {
    if den <= 0 {
        return if_zero;
    }
    if num <= 0 {
        return Fixed64::ZERO;
    }
    if num >= den {
        return Fixed64::ONE;
    }
    // num < den < 2^63, so the quotient is in (0, 1) and fits in Q32.32.
    let bits = ((num as i128) << 32) / den as i128;
    Fixed64::from_bits(bits as i64)
}

/// Scale an integer amount by a ratio, truncating toward zero.
#[inline]
pub fn scale(amount: i64, ratio: Fixed64) -> i64 {
    ((amount as i128 * ratio.to_bits() as i128) >> 32) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed64_basic_arithmetic() {
        let a = f64_to_fixed64(1.5);
        let b = f64_to_fixed64(2.0);
        assert_eq!(fixed64_to_f64(a + b), 3.5);
    }

    #[test]
    fn unit_ratio_clamps() {
        assert_eq!(unit_ratio(5, 10, Fixed64::ONE), f64_to_fixed64(0.5));
        assert_eq!(unit_ratio(20, 10, Fixed64::ZERO), Fixed64::ONE);
        assert_eq!(unit_ratio(-3, 10, Fixed64::ONE), Fixed64::ZERO);
        assert_eq!(unit_ratio(3, 0, Fixed64::ONE), Fixed64::ONE);
        assert_eq!(unit_ratio(3, 0, Fixed64::ZERO), Fixed64::ZERO);
    }

    #[test]
    fn scale_truncates() {
        assert_eq!(scale(10_000, Fixed64::ONE), 10_000);
        assert_eq!(scale(10_000, f64_to_fixed64(0.25)), 2_500);
        assert_eq!(scale(3, f64_to_fixed64(0.5)), 1);
        assert_eq!(scale(7, Fixed64::ZERO), 0);
    }
}
