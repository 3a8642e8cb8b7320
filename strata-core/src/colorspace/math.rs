//! Fixed-point arithmetic on 8-bit channel values.
//!
//! The rounding rule is part of the compositing contract: every product of two
//! channel values is `(a * b + 127) / 255`.

pub const OPAQUE: u8 = u8::MAX;
pub const TRANSPARENT: u8 = 0;

/// `a * b` on the [0, 255] -> [0.0, 1.0] scale.
#[inline]
#[must_use]
pub fn mul(a: u8, b: u8) -> u8 {
    // Max of the numerator is 255 * 255 + 127, the quotient always fits.
    ((u32::from(a) * u32::from(b) + 127) / 255) as u8
}

/// `a / b` on the [0, 255] -> [0.0, 1.0] scale, saturating at 255. Division by zero gives 255.
#[inline]
#[must_use]
pub fn div(a: u8, b: u8) -> u8 {
    if b == 0 {
        return OPAQUE;
    }
    let b = u32::from(b);
    ((u32::from(a) * 255 + b / 2) / b).min(255) as u8
}

/// `a + b - a * b`. Never exceeds 255.
#[inline]
#[must_use]
pub fn screen(a: u8, b: u8) -> u8 {
    (u16::from(a) + u16::from(b) - u16::from(mul(a, b))) as u8
}

/// Linear interpolation from `a` (t = 0) to `b` (t = 255).
#[inline]
#[must_use]
pub fn lerp(a: u8, b: u8, t: u8) -> u8 {
    let t = u32::from(t);
    ((u32::from(a) * (255 - t) + u32::from(b) * t + 127) / 255) as u8
}

/// One color channel of the general separable compositing equation.
///
/// `blended` is `B(s, d)`, `sa` the effective source alpha (opacity and masks applied),
/// `da` the destination alpha and `na` the resulting alpha, which must be nonzero.
#[inline]
#[must_use]
pub fn composite_channel(blended: u8, s: u8, d: u8, sa: u8, da: u8, na: u8) -> u8 {
    let [blended, s, d, sa, da, na] = [blended, s, d, sa, da, na].map(u32::from);
    let numerator = blended * sa * da + d * da * (255 - sa) + s * sa * (255 - da);
    let denominator = 255 * na;
    ((numerator + denominator / 2) / denominator).min(255) as u8
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn mul_rounding_contract() {
        assert_eq!(mul(255, 255), 255);
        assert_eq!(mul(255, 0), 0);
        assert_eq!(mul(255, 128), 128);
        assert_eq!(mul(128, 128), 64);
        // (127 * 1 + 127) / 255 == 0, the +128 rule would round this up.
        assert_eq!(mul(127, 1), 0);
        for v in 0..=255u8 {
            assert_eq!(mul(v, OPAQUE), v);
            assert_eq!(mul(OPAQUE, v), v);
        }
    }
    #[test]
    fn screen_bounds() {
        for a in 0..=255u8 {
            for b in (0..=255u8).step_by(3) {
                let s = screen(a, b);
                assert!(s >= a.max(b));
            }
        }
    }
    #[test]
    fn lerp_endpoints() {
        for v in (0..=255u8).step_by(7) {
            assert_eq!(lerp(v, 200, 0), v);
            assert_eq!(lerp(v, 200, 255), 200);
        }
    }
    #[test]
    fn composite_over_transparent_keeps_source() {
        for s in (0..=255u8).step_by(11) {
            for sa in 1..=255u8 {
                assert_eq!(composite_channel(s, s, 0, sa, 0, sa), s);
            }
        }
    }
}
