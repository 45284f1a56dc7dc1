//! Compositing scaled source images into rectangles of a destination
//! canvas, with optional per-tile greyscale/colorize/posterize passes.
//!
//! The greyscale weights below sum to 254, not 256 (faithful to the
//! original's integer weights), so greyscale is only an approximate
//! identity on already-grey pixels: `c=0` maps exactly to `0`, but e.g.
//! `c=255` maps to `253`. Spec §8 property 5 ("greyscale invariance") holds
//! only approximately as a result — see the test below for the exact bound.

use std::sync::Mutex;

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::palette::Palette;
use crate::pixel::{BitDepth, Color, PixelBuffer};
use crate::posterize::Posterizer;

/// Destination rectangle for one tile, in destination-buffer coordinates.
#[derive(Debug, Clone, Copy)]
pub struct TileSpec {
    pub offset_x: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
}

/// Per-tile transforms, applied in this order: greyscale, then at most one
/// of colorize/posterize (colorize wins if both are set).
///
/// `caption_lock` is a seam for a future caption-rendering sink: typical
/// host font/graphics libraries aren't thread-safe, so drawing a caption
/// must be serialized across tiles even though the pixel transforms
/// themselves run in parallel. No caption is drawn today; the lock is
/// acquired and released per tile purely to keep the serialization point
/// exercised and ready for a renderer to be slotted in.
pub struct TileOptions<'a> {
    pub greyscale: bool,
    pub colorizer: Option<&'a Palette>,
    pub posterizer: Option<&'a Posterizer>,
    pub caption_lock: Option<&'a Mutex<()>>,
}

impl Default for TileOptions<'_> {
    fn default() -> Self {
        TileOptions {
            greyscale: false,
            colorizer: None,
            posterizer: None,
            caption_lock: None,
        }
    }
}

/// `Y = (54R + 182G + 18B) / 256`, stored equally into all three channels.
///
/// The weights sum to 254, not 256, so this is not an exact identity on
/// grey input — see the module doc.
#[must_use]
pub fn greyscale(color: Color) -> Color {
    let y = (54 * u32::from(color.r()) + 182 * u32::from(color.g()) + 18 * u32::from(color.b()))
        / 256;
    let y = y as u8;
    Color::from_rgb(y, y, y)
}

fn transform_pixel(color: Color, options: &TileOptions<'_>) -> Color {
    let color = if options.greyscale {
        greyscale(color)
    } else {
        color
    };
    if let Some(palette) = options.colorizer {
        palette.lookup(color)
    } else if let Some(posterizer) = options.posterizer {
        posterizer.apply(color)
    } else {
        color
    }
}

fn transform_tile(source: &PixelBuffer, options: &TileOptions<'_>) -> PixelBuffer {
    let mut out = source.clone();
    for y in 0..out.height() {
        for x in 0..out.width() {
            let c = transform_pixel(out.get(x, y), options);
            out.set(x, y, c);
        }
    }
    out
}

fn blit(dest: &mut PixelBuffer, spec: &TileSpec, tile: &PixelBuffer) {
    for y in 0..tile.height() {
        for x in 0..tile.width() {
            dest.set(spec.offset_x + x, spec.offset_y + y, tile.get(x, y));
        }
    }
}

fn validate_tile(dest: &PixelBuffer, spec: &TileSpec, source: &PixelBuffer) -> Result<()> {
    if dest.depth() != source.depth() {
        return Err(Error::InvalidArgument(format!(
            "tile bit depth {:?} does not match destination {:?}",
            source.depth(),
            dest.depth()
        )));
    }
    if source.width() != spec.width || source.height() != spec.height {
        return Err(Error::InvalidArgument(format!(
            "tile source is {}x{} but the destination rectangle is {}x{}",
            source.width(),
            source.height(),
            spec.width,
            spec.height
        )));
    }
    if spec.offset_x + spec.width > dest.width() || spec.offset_y + spec.height > dest.height() {
        return Err(Error::InvalidArgument(
            "tile rectangle falls outside the destination canvas".to_string(),
        ));
    }
    Ok(())
}

/// Flood-fills `dest` with `background`, then composites every `(rect,
/// source)` pair into it. Tile transforms run in parallel (each tile reads
/// only its own source and writes only its own scratch buffer); the final
/// blit into `dest` is sequential since it is the only step that touches
/// shared destination memory.
pub fn compose(
    dest: &mut PixelBuffer,
    background: Color,
    tiles: &[(TileSpec, PixelBuffer)],
    options: &TileOptions<'_>,
) -> Result<()> {
    for (spec, source) in tiles {
        validate_tile(dest, spec, source)?;
    }

    dest.flood_fill(background);

    let rendered: Vec<(TileSpec, PixelBuffer)> = tiles
        .par_iter()
        .map(|(spec, source)| {
            let rendered = transform_tile(source, options);
            if let Some(lock) = options.caption_lock {
                let _guard = lock.lock().expect("caption lock is never poisoned");
            }
            (*spec, rendered)
        })
        .collect();

    for (spec, tile) in &rendered {
        blit(dest, spec, tile);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greyscale_is_exactly_invariant_at_zero() {
        let c = Color::from_rgb(0, 0, 0);
        assert_eq!(greyscale(c), c);
    }

    #[test]
    fn greyscale_is_approximately_invariant_on_a_solid_color() {
        // The 54+182+18=254 weight sum (not 256) means grey-in isn't
        // grey-out exactly; it's off by at most 2 levels.
        for level in [1u8, 50, 77, 128, 200, 255] {
            let c = Color::from_rgb(level, level, level);
            let out = greyscale(c);
            assert_eq!(out.r(), out.g());
            assert_eq!(out.g(), out.b());
            assert!(
                i32::from(out.r()).abs_diff(i32::from(level)) <= 2,
                "level={level} out={}",
                out.r()
            );
        }
    }

    #[test]
    fn background_shows_through_where_no_tile_is_drawn() {
        let mut dest = PixelBuffer::new(4, 4, BitDepth::Bpp24);
        let mut tile = PixelBuffer::new(2, 2, BitDepth::Bpp24);
        tile.flood_fill(Color::from_rgb(255, 0, 0));
        let spec = TileSpec {
            offset_x: 0,
            offset_y: 0,
            width: 2,
            height: 2,
        };
        let options = TileOptions::default();
        compose(
            &mut dest,
            Color::from_rgb(0, 255, 0),
            &[(spec, tile)],
            &options,
        )
        .unwrap();

        assert_eq!(dest.get(0, 0), Color::from_rgb(255, 0, 0));
        assert_eq!(dest.get(3, 3), Color::from_rgb(0, 255, 0));
    }

    #[test]
    fn mismatched_bit_depth_is_rejected() {
        let mut dest = PixelBuffer::new(2, 2, BitDepth::Bpp24);
        let tile = PixelBuffer::new(2, 2, BitDepth::Bpp48);
        let spec = TileSpec {
            offset_x: 0,
            offset_y: 0,
            width: 2,
            height: 2,
        };
        let options = TileOptions::default();
        assert!(compose(&mut dest, Color::from_rgb(0, 0, 0), &[(spec, tile)], &options).is_err());
    }

    #[test]
    fn tile_larger_than_destination_rect_is_rejected() {
        let mut dest = PixelBuffer::new(2, 2, BitDepth::Bpp24);
        let tile = PixelBuffer::new(3, 3, BitDepth::Bpp24);
        let spec = TileSpec {
            offset_x: 0,
            offset_y: 0,
            width: 2,
            height: 2,
        };
        let options = TileOptions::default();
        assert!(compose(&mut dest, Color::from_rgb(0, 0, 0), &[(spec, tile)], &options).is_err());
    }

    #[test]
    fn colorizer_wins_over_posterizer_when_both_set() {
        use crate::palette::Metric;

        let mut dest = PixelBuffer::new(1, 1, BitDepth::Bpp24);
        let mut tile = PixelBuffer::new(1, 1, BitDepth::Bpp24);
        tile.set(0, 0, Color::from_rgb(128, 128, 128));

        let palette_colors = vec![Color::from_rgb(9, 9, 9)];
        let palette = Palette::build(&palette_colors, Metric::Color).unwrap();
        let posterizer = Posterizer::new(2).unwrap();

        let options = TileOptions {
            greyscale: false,
            colorizer: Some(&palette),
            posterizer: Some(&posterizer),
            caption_lock: None,
        };
        let spec = TileSpec {
            offset_x: 0,
            offset_y: 0,
            width: 1,
            height: 1,
        };
        compose(&mut dest, Color::from_rgb(0, 0, 0), &[(spec, tile)], &options).unwrap();
        assert_eq!(dest.get(0, 0), Color::from_rgb(9, 9, 9));
    }
}
