//! Pure BGR -> HSV projections.
//!
//! All three channels are scaled to fit a `u8`: `V` is `max(R, G, B)`; hue
//! is scaled so 60 degrees maps to 42 and a full 360-degree cycle maps to
//! 252 (`42 * 6`), rather than the more common 0..=360 or 0.0..=1.0 ranges.
//! This matches the integer-only hue formula of the original tool; the
//! resulting *ordering* of hues matches the textbook floating-point
//! definition even though individual byte values don't line up with it.

use crate::pixel::Color;

/// 60 degrees, expressed in units of 1/256 of a hemisphere (`42 * 6 == 252`).
const SIXTY_DEGREES: i32 = 42;

/// `max(R, G, B)`.
#[must_use]
pub fn value(color: Color) -> u8 {
    color.value()
}

/// Hue, saturation, and value of `color`, all in `0..=255`.
///
/// `V` is `max(R, G, B)`. `S` is `0` when `V` is `0`, else
/// `floor(255 * (V - min) / V)`. `H` is `0` whenever `S` is `0` (including
/// the achromatic `R == G == B` case); otherwise it follows the canonical
/// six-sector hue formula.
#[must_use]
pub fn to_hsv(color: Color) -> (u8, u8, u8) {
    let r = i32::from(color.r());
    let g = i32::from(color.g());
    let b = i32::from(color.b());

    let (v, min, h) = if r > g {
        let min = g.min(b);
        if r > b {
            let v = r;
            let diff = v - min;
            let mut h = if diff == 0 {
                0
            } else {
                (SIXTY_DEGREES * (g - b)) / diff
            };
            if h < 0 {
                h += 6 * SIXTY_DEGREES;
            }
            (v, min, h)
        } else {
            let v = b;
            let diff = v - min;
            let h = if diff == 0 {
                0
            } else {
                4 * SIXTY_DEGREES + (SIXTY_DEGREES * (r - g)) / diff
            };
            (v, min, h)
        }
    } else if g > b {
        let v = g;
        let min = r.min(b);
        let diff = v - min;
        let h = if diff == 0 {
            0
        } else {
            2 * SIXTY_DEGREES + (SIXTY_DEGREES * (b - r)) / diff
        };
        (v, min, h)
    } else {
        // r <= g <= b, with g == b meaning a tie handled by the original's
        // fallthrough branch (r, g, b) with v = b, min = r.
        let v = b;
        let min = r;
        let diff = b - r;
        let h = if diff != 0 {
            4 * SIXTY_DEGREES + (SIXTY_DEGREES * (r - g)) / diff
        } else {
            0
        };
        (v, min, h)
    };

    if v == 0 {
        return (0, 0, 0);
    }

    let diff = v - min;
    let s = (255 * diff) / v;
    let h = if s == 0 { 0 } else { h };

    (h as u8, s as u8, v as u8)
}

/// Hue channel only.
#[must_use]
pub fn hue(color: Color) -> u8 {
    to_hsv(color).0
}

/// Saturation channel only.
#[must_use]
pub fn saturation(color: Color) -> u8 {
    to_hsv(color).1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grey_is_achromatic() {
        for level in [0u8, 1, 127, 255] {
            let c = Color::from_rgb(level, level, level);
            let (h, s, v) = to_hsv(c);
            assert_eq!(h, 0);
            assert_eq!(s, 0);
            assert_eq!(v, level);
        }
    }

    #[test]
    fn black_is_zero_everywhere() {
        let (h, s, v) = to_hsv(Color::from_rgb(0, 0, 0));
        assert_eq!((h, s, v), (0, 0, 0));
    }

    #[test]
    fn pure_red_hue_is_zero() {
        let (h, s, v) = to_hsv(Color::from_rgb(255, 0, 0));
        assert_eq!(h, 0);
        assert_eq!(s, 255);
        assert_eq!(v, 255);
    }

    #[test]
    fn pure_green_hue_is_two_sixths() {
        let (h, _s, _v) = to_hsv(Color::from_rgb(0, 255, 0));
        assert_eq!(h, (2 * SIXTY_DEGREES) as u8);
    }

    #[test]
    fn value_matches_channel_max() {
        let c = Color::from_rgb(12, 200, 45);
        assert_eq!(value(c), 200);
    }
}
