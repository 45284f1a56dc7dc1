//! Palettes: extracting one from an image, and the lookup structure used
//! to map arbitrary pixels onto a palette's entries.

use rand::Rng;

use crate::error::{Error, Result};
use crate::hsv;
use crate::kdtree::KDTree3;
use crate::kmeans::{self, KMeansPoint};
use crate::pixel::{Color, PixelBuffer};

/// Which property of a pixel selects its palette entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Nearest neighbor in full RGB space.
    Color,
    /// Nearest `V = max(R, G, B)`.
    Brightness,
    /// Nearest hue channel (see [`hsv`]).
    Hue,
    /// Nearest saturation channel (see [`hsv`]).
    Saturation,
    /// Bucket by brightness into the palette's own size, ignoring color
    /// content entirely.
    Gradient,
}

/// A palette prepared for pixel lookup under one [`Metric`].
///
/// Construction only reorders the input colors for `Brightness`/`Hue`/
/// `Saturation`, sorting them ascending by that metric's value so lookup can
/// binary-search. `Color` and `Gradient` keep the caller's order unchanged:
/// `Color` looks up through a k-d tree built over insertion order (the
/// insertion index is meaningful, e.g. for tie-breaking), and `Gradient`
/// indexes the palette in its stored order per its bucket formula. Note
/// this lookup order is different from the order [`PaletteExtractor::extract`]
/// returns (descending cluster size) — that order is for presentation.
#[derive(Debug, Clone)]
pub struct Palette {
    metric: Metric,
    colors: Vec<Color>,
    /// Parallel to `colors`; populated only for `Brightness`/`Hue`/`Saturation`.
    values: Vec<u8>,
    /// Populated only for `Color`.
    kdtree: Option<KDTree3>,
}

impl Palette {
    /// Build a lookup-ready palette from a color list (order as returned by
    /// [`PaletteExtractor::extract`], or user-supplied).
    pub fn build(colors: &[Color], metric: Metric) -> Result<Self> {
        if colors.is_empty() {
            return Err(Error::InvalidArgument(
                "palette must have at least one color".to_string(),
            ));
        }

        let mut colors = colors.to_vec();

        match metric {
            Metric::Color | Metric::Gradient => {
                // Neither metric sorts: `Color` looks up through a k-d tree
                // built over the caller's insertion order (insertion index is
                // meaningful, e.g. for tie-breaking), and `Gradient` indexes
                // the palette "in its stored order" per its bucket formula.
                let kdtree = if metric == Metric::Color {
                    Some(KDTree3::build(&colors)?)
                } else {
                    None
                };
                Ok(Palette {
                    metric,
                    colors,
                    values: Vec::new(),
                    kdtree,
                })
            }
            Metric::Brightness | Metric::Hue | Metric::Saturation => {
                let metric_fn: fn(Color) -> u8 = match metric {
                    Metric::Brightness => Color::value,
                    Metric::Hue => hsv::hue,
                    Metric::Saturation => hsv::saturation,
                    _ => unreachable!(),
                };
                colors.sort_by_key(|&c| metric_fn(c));
                let values = colors.iter().map(|&c| metric_fn(c)).collect();
                Ok(Palette {
                    metric,
                    colors,
                    values,
                    kdtree: None,
                })
            }
        }
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    #[must_use]
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Map `pixel` onto its selected entry, per [`Metric`].
    pub fn lookup(&self, pixel: Color) -> Color {
        match self.metric {
            Metric::Color => {
                let tree = self
                    .kdtree
                    .as_ref()
                    .expect("Color palette always builds a k-d tree");
                let (index, _) = tree
                    .nearest(pixel)
                    .expect("palette is never empty after Palette::build");
                self.colors[index]
            }
            Metric::Gradient => {
                let k = self.colors.len();
                let v = u32::from(hsv::value(pixel));
                let bucket = ((v * k as u32) / 256).min(k as u32 - 1);
                self.colors[bucket as usize]
            }
            Metric::Brightness | Metric::Hue | Metric::Saturation => {
                let val = match self.metric {
                    Metric::Brightness => pixel.value(),
                    Metric::Hue => hsv::hue(pixel),
                    Metric::Saturation => hsv::saturation(pixel),
                    _ => unreachable!(),
                };
                self.colors[self.nearest_by_value(val)]
            }
        }
    }

    /// `std::lower_bound`-style binary search over `values`, preferring
    /// whichever of the first-index-at-or-above and its predecessor is
    /// closer; ties go to the predecessor (lower index).
    fn nearest_by_value(&self, val: u8) -> usize {
        let ge = self.values.partition_point(|&v| v < val);
        if ge == self.values.len() {
            return self.values.len() - 1;
        }
        if ge == 0 {
            return 0;
        }
        let above = i32::from(self.values[ge]) - i32::from(val);
        let below = i32::from(self.values[ge - 1]) - i32::from(val);
        if above.abs() < below.abs() {
            ge
        } else {
            ge - 1
        }
    }
}

/// Quality measurement returned alongside a palette extraction, useful for
/// callers sweeping K to find a good tradeoff between size and fidelity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionReport {
    pub mean_intra_cluster_distance: f64,
}

const SAMPLE_CAP_LIMIT: usize = 10_000;
const CLUSTER_MAX_ITERS: usize = 100;
const DEFAULT_SEED_ATTEMPTS: usize = 40;

/// Extracts a K-color palette from a [`PixelBuffer`], ordered by
/// descending cluster size (most-represented color first).
pub struct PaletteExtractor;

impl PaletteExtractor {
    /// Run the full extraction pipeline: linearize with adjacent-dedup,
    /// sort, take unique runs, sub-sample if needed, cluster, and resolve
    /// each cluster to the real source color closest to its centroid.
    pub fn extract(
        buffer: &PixelBuffer,
        k: usize,
        rng: &mut impl Rng,
    ) -> Result<(Vec<Color>, ExtractionReport)> {
        if k == 0 {
            return Err(Error::InvalidArgument("K must be nonzero".to_string()));
        }

        let mut colors = Vec::new();
        let mut prev: Option<Color> = None;
        for y in 0..buffer.height() {
            for x in 0..buffer.width() {
                let c = buffer.get(x, y);
                if prev != Some(c) {
                    colors.push(c);
                    prev = Some(c);
                }
            }
        }

        colors.sort();
        let mut unique_colors = Vec::new();
        let mut prev: Option<Color> = None;
        for c in colors {
            if prev != Some(c) {
                unique_colors.push(c);
                prev = Some(c);
            }
        }

        if unique_colors.len() <= k {
            let report = ExtractionReport {
                mean_intra_cluster_distance: 0.0,
            };
            return Ok((unique_colors, report));
        }

        let sample_cap = k.max(SAMPLE_CAP_LIMIT.min(unique_colors.len()));
        let mut sample = Vec::with_capacity(sample_cap);
        for _ in 0..sample_cap {
            let idx = rng.gen_range(0..unique_colors.len());
            sample.push(unique_colors[idx]);
        }

        let mut points: Vec<KMeansPoint> = sample
            .iter()
            .enumerate()
            .map(|(i, c)| {
                KMeansPoint::new(
                    i,
                    vec![
                        f64::from(c.r()) / 255.0,
                        f64::from(c.g()) / 255.0,
                        f64::from(c.b()) / 255.0,
                    ],
                )
            })
            .collect();

        let mut clusters = kmeans::run(&mut points, k, CLUSTER_MAX_ITERS, DEFAULT_SEED_ATTEMPTS, rng)?;
        kmeans::sort_by_size_desc(&mut clusters);

        let report = ExtractionReport {
            mean_intra_cluster_distance: kmeans::mean_intra_cluster_distance(&clusters, &points),
        };

        let closest = kmeans::closest_points(&clusters, &points);
        let palette: Vec<Color> = closest
            .into_iter()
            .flatten()
            .map(|point_index| sample[point_index])
            .collect();

        Ok((palette, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::BitDepth;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn solid(w: u32, h: u32, c: Color) -> PixelBuffer {
        let mut buf = PixelBuffer::new(w, h, BitDepth::Bpp24);
        buf.flood_fill(c);
        buf
    }

    #[test]
    fn fewer_unique_colors_than_k_skips_clustering() {
        let buf = solid(4, 4, Color::from_rgb(10, 20, 30));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (palette, _report) = PaletteExtractor::extract(&buf, 5, &mut rng).unwrap();
        assert_eq!(palette, vec![Color::from_rgb(10, 20, 30)]);
    }

    #[test]
    fn palette_colors_come_from_the_source_image() {
        let mut buf = PixelBuffer::new(16, 16, BitDepth::Bpp24);
        let palette_in = [
            Color::from_rgb(255, 0, 0),
            Color::from_rgb(0, 255, 0),
            Color::from_rgb(0, 0, 255),
            Color::from_rgb(255, 255, 0),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for y in 0..16 {
            for x in 0..16 {
                buf.set(x, y, palette_in[(x as usize + y as usize) % palette_in.len()]);
            }
        }

        let (palette, _report) = PaletteExtractor::extract(&buf, 2, &mut rng).unwrap();
        for c in &palette {
            assert!(palette_in.contains(c));
        }
    }

    #[test]
    fn color_metric_lookup_matches_linear_nearest() {
        let colors = vec![
            Color::from_rgb(0, 0, 0),
            Color::from_rgb(255, 255, 255),
            Color::from_rgb(128, 0, 0),
        ];
        let palette = Palette::build(&colors, Metric::Color).unwrap();
        let got = palette.lookup(Color::from_rgb(200, 10, 10));
        let want = crate::kdtree::linear_nearest(&colors, Color::from_rgb(200, 10, 10))
            .map(|(i, _)| colors[i])
            .unwrap();
        assert_eq!(got, want);
    }

    #[test]
    fn gradient_metric_uses_palette_size_as_bucket_count() {
        let colors: Vec<Color> = (0..4)
            .map(|i| Color::from_rgb(i * 60, i * 60, i * 60))
            .collect();
        let palette = Palette::build(&colors, Metric::Gradient).unwrap();
        assert_eq!(palette.lookup(Color::from_rgb(0, 0, 0)), palette.colors()[0]);
        assert_eq!(
            palette.lookup(Color::from_rgb(255, 255, 255)),
            *palette.colors().last().unwrap()
        );
    }

    #[test]
    fn brightness_metric_picks_closer_of_two_neighbors() {
        let colors = vec![
            Color::from_rgb(10, 10, 10),
            Color::from_rgb(100, 100, 100),
            Color::from_rgb(200, 200, 200),
        ];
        let palette = Palette::build(&colors, Metric::Brightness).unwrap();
        // value 60 is 50 away from 10 and 40 away from 100: nearer is 100.
        let got = palette.lookup(Color::from_rgb(60, 60, 60));
        assert_eq!(got.value(), 100);
    }

    #[test]
    fn empty_palette_is_rejected() {
        assert!(Palette::build(&[], Metric::Color).is_err());
    }
}
