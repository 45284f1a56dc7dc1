//! Per-channel posterization: quantizing each of R, G, B independently to a
//! small number of levels, with white staying exactly white.

use crate::error::{Error, Result};
use crate::pixel::Color;

/// Quantizes each color channel to `levels` output values, `1..=256`.
#[derive(Debug, Clone, Copy)]
pub struct Posterizer {
    levels: u32,
}

const MAX_CHANNEL: u32 = 255;

impl Posterizer {
    pub fn new(levels: u32) -> Result<Self> {
        if levels == 0 || levels > 256 {
            return Err(Error::InvalidArgument(format!(
                "posterize level count must be in 1..=256, got {levels}"
            )));
        }
        Ok(Posterizer { levels })
    }

    #[must_use]
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Quantize one channel value.
    ///
    /// The output range `[0, 255]` is split into `levels` equal-width
    /// buckets; a raw value falls into bucket
    /// `min(floor(raw * levels / 256), levels - 1)`. Each bucket's output
    /// value is `round(bucket * 255 / (levels - 1))`, except the last
    /// bucket, which is forced to exactly 255 regardless of rounding.
    #[must_use]
    pub fn quantize_channel(&self, raw: u8) -> u8 {
        if self.levels == 1 {
            return 255;
        }

        let bucket = ((u32::from(raw) * self.levels) / (MAX_CHANNEL + 1)).min(self.levels - 1);
        if bucket == self.levels - 1 {
            255
        } else {
            let level = (f64::from(bucket) * f64::from(MAX_CHANNEL) / f64::from(self.levels - 1))
                .round();
            level as u8
        }
    }

    #[must_use]
    pub fn apply(&self, color: Color) -> Color {
        Color::from_rgb(
            self.quantize_channel(color.r()),
            self.quantize_channel(color.g()),
            self.quantize_channel(color.b()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_stays_white_at_every_level_count() {
        for levels in [1u32, 2, 3, 7, 16, 255, 256] {
            let p = Posterizer::new(levels).unwrap();
            assert_eq!(p.quantize_channel(255), 255);
        }
    }

    #[test]
    fn one_level_collapses_to_white() {
        let p = Posterizer::new(1).unwrap();
        for raw in [0u8, 1, 128, 254, 255] {
            assert_eq!(p.quantize_channel(raw), 255);
        }
    }

    #[test]
    fn two_levels_is_a_binary_threshold() {
        let p = Posterizer::new(2).unwrap();
        assert_eq!(p.quantize_channel(0), 0);
        assert_eq!(p.quantize_channel(127), 0);
        assert_eq!(p.quantize_channel(128), 255);
        assert_eq!(p.quantize_channel(255), 255);
    }

    #[test]
    fn output_values_are_monotonic_in_input() {
        let p = Posterizer::new(5).unwrap();
        let mut prev = 0u8;
        for raw in 0u8..=255 {
            let out = p.quantize_channel(raw);
            assert!(out >= prev);
            prev = out;
        }
    }

    #[test]
    fn zero_and_257_levels_are_rejected() {
        assert!(Posterizer::new(0).is_err());
        assert!(Posterizer::new(257).is_err());
    }

    #[test]
    fn posterize_is_idempotent() {
        for levels in [1u32, 2, 3, 7, 16, 255, 256] {
            let p = Posterizer::new(levels).unwrap();
            for raw in 0u8..=255 {
                let once = p.quantize_channel(raw);
                let twice = p.quantize_channel(once);
                assert_eq!(once, twice, "levels={levels} raw={raw}");
            }
        }
    }
}
