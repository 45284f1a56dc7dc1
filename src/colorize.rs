//! Applies a [`Palette`] to every pixel of a buffer, one scan line at a time.

use rayon::prelude::*;

use crate::palette::Palette;
use crate::pixel::PixelBuffer;

/// Remaps every pixel in `buffer` to its palette entry, in place.
///
/// Rows are independent and processed in parallel; there is no
/// synchronization needed since each row only reads and writes its own
/// bytes.
pub fn colorize(buffer: &mut PixelBuffer, palette: &Palette) {
    let height = buffer.height();
    let width = buffer.width();
    let depth = buffer.depth();
    let stride = buffer.stride();

    buffer
        .bytes_mut()
        .par_chunks_mut(stride)
        .take(height as usize)
        .for_each(|row_bytes| {
            // Build a throwaway single-row buffer so we can reuse
            // PixelBuffer's get/set logic without duplicating bit-depth
            // branching here.
            let mut row = PixelBuffer::from_bytes(width, 1, depth, stride, row_bytes.to_vec())
                .expect("row carved from a valid buffer is itself valid");
            for x in 0..width {
                let mapped = palette.lookup(row.get(x, 0));
                row.set(x, 0, mapped);
            }
            row_bytes.copy_from_slice(row.bytes());
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::Metric;
    use crate::pixel::{BitDepth, Color};

    #[test]
    fn every_pixel_becomes_a_palette_entry() {
        let mut buf = PixelBuffer::new(4, 4, BitDepth::Bpp24);
        for y in 0..4 {
            for x in 0..4 {
                buf.set(x, y, Color::from_rgb(x as u8 * 10, y as u8 * 10, 5));
            }
        }

        let colors = vec![Color::from_rgb(0, 0, 0), Color::from_rgb(255, 255, 255)];
        let palette = Palette::build(&colors, Metric::Color).unwrap();
        colorize(&mut buf, &palette);

        for y in 0..4 {
            for x in 0..4 {
                let c = buf.get(x, y);
                assert!(colors.contains(&c));
            }
        }
    }

    #[test]
    fn works_on_48bpp_buffers() {
        let mut buf = PixelBuffer::new(2, 2, BitDepth::Bpp48);
        buf.set(0, 0, Color::from_rgb(10, 10, 10));
        buf.set(1, 0, Color::from_rgb(200, 200, 200));
        buf.set(0, 1, Color::from_rgb(50, 50, 50));
        buf.set(1, 1, Color::from_rgb(250, 250, 250));

        let colors = vec![Color::from_rgb(0, 0, 0), Color::from_rgb(255, 255, 255)];
        let palette = Palette::build(&colors, Metric::Brightness).unwrap();
        colorize(&mut buf, &palette);

        assert_eq!(buf.get(0, 0), Color::from_rgb(0, 0, 0));
        assert_eq!(buf.get(1, 1), Color::from_rgb(255, 255, 255));
    }
}
