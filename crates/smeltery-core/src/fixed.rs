use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
/// Infinities saturate; NaN becomes zero.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    if v.is_nan() {
        return Fixed64::ZERO;
    }
    Fixed64::saturating_from_num(v)
}

/// Convert Fixed64 to f64. Use only for display and logging.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Convert a configured percentage (0..=100) into a fraction.
#[inline]
pub fn percent_to_fraction(percent: f64) -> Fixed64 {
    f64_to_fixed64(percent) / Fixed64::from_num(100)
}

/// `floor(value * fraction)`, saturating at zero for negative fractions.
pub fn scale_floor(value: u32, fraction: Fixed64) -> u32 {
    let scaled = Fixed64::saturating_from_num(value).saturating_mul(fraction);
    if scaled <= Fixed64::ZERO {
        0
    } else {
        scaled.floor().saturating_to_num::<u32>()
    }
}
