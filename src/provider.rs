//! The only boundary the core engine depends on: opening images, reading
//! their pixels at a requested size and bit depth, center-cropping to an
//! aspect ratio, and writing a [`PixelBuffer`] back out to disk.
//!
//! Backed by `image` for decode/encode and `fast_image_resize` for
//! scaling, the same pairing the mosaic-generator teacher this engine
//! grew from uses for its own tile loading.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageReader};

use crate::error::{Error, Result};
use crate::pixel::{BitDepth, Color, PixelBuffer};

/// Resampling algorithm used when scaling a source image to a requested
/// tile size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scaling {
    NearestNeighbor,
    HighQualityCubic,
}

/// Output container format for [`ImageProvider::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Bmp,
    Gif,
    Jpeg,
    Png,
    Tiff,
}

/// Compression quality for formats that support it (currently only jpeg).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityProfile {
    /// Chroma-subsampled, roughly 60% quality.
    Low,
    /// No chroma subsampling, roughly 100% quality.
    High,
}

/// A decoded image, held in memory so it can be cropped and/or resampled
/// any number of times without re-reading the source file.
pub struct ImageHandle {
    image: DynamicImage,
}

/// The external collaborator the core engine depends on for everything
/// that touches a codec.
pub trait ImageProvider {
    fn open(&self, path: &Path) -> Result<ImageHandle>;
    fn dimensions(&self, handle: &ImageHandle) -> (u32, u32);
    fn read_pixels(
        &self,
        handle: &ImageHandle,
        depth: BitDepth,
        width: u32,
        height: u32,
        scaling: Scaling,
    ) -> Result<PixelBuffer>;
    fn clip(&self, handle: &ImageHandle, target_aspect: f64) -> Result<ImageHandle>;
    fn write(
        &self,
        buffer: &PixelBuffer,
        path: &Path,
        format: OutputFormat,
        quality: QualityProfile,
    ) -> Result<()>;
}

/// The default [`ImageProvider`], backed by `image` and
/// `fast_image_resize`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdImageProvider;

fn resize_alg(scaling: Scaling) -> ResizeAlg {
    match scaling {
        Scaling::NearestNeighbor => ResizeAlg::Nearest,
        Scaling::HighQualityCubic => ResizeAlg::Interpolation(FilterType::CatmullRom),
    }
}

impl ImageProvider for StdImageProvider {
    fn open(&self, path: &Path) -> Result<ImageHandle> {
        let reader = ImageReader::open(path).map_err(Error::backend)?;
        let reader = reader.with_guessed_format().map_err(Error::backend)?;
        let image = reader.decode().map_err(Error::backend)?;
        Ok(ImageHandle { image })
    }

    fn dimensions(&self, handle: &ImageHandle) -> (u32, u32) {
        handle.image.dimensions()
    }

    fn read_pixels(
        &self,
        handle: &ImageHandle,
        depth: BitDepth,
        width: u32,
        height: u32,
        scaling: Scaling,
    ) -> Result<PixelBuffer> {
        let mut out = PixelBuffer::new(width, height, depth);
        let alg = resize_alg(scaling);

        match depth {
            BitDepth::Bpp24 => {
                let rgb = handle.image.to_rgb8();
                let (sw, sh) = rgb.dimensions();
                let src = Image::from_vec_u8(sw, sh, rgb.into_raw(), PixelType::U8x3)
                    .map_err(Error::backend)?;
                let mut dst = Image::new(width, height, PixelType::U8x3);
                Resizer::new()
                    .resize(&src, &mut dst, &ResizeOptions::default().resize_alg(alg))
                    .map_err(Error::backend)?;
                let buf = dst.into_vec();
                for y in 0..height {
                    for x in 0..width {
                        let off = (y as usize * width as usize + x as usize) * 3;
                        out.set(x, y, Color::from_rgb(buf[off], buf[off + 1], buf[off + 2]));
                    }
                }
            }
            BitDepth::Bpp48 => {
                let rgb16 = handle.image.to_rgb16();
                let (sw, sh) = rgb16.dimensions();
                let raw: Vec<u8> = rgb16
                    .into_raw()
                    .iter()
                    .flat_map(|v| v.to_le_bytes())
                    .collect();
                let src =
                    Image::from_vec_u8(sw, sh, raw, PixelType::U16x3).map_err(Error::backend)?;
                let mut dst = Image::new(width, height, PixelType::U16x3);
                Resizer::new()
                    .resize(&src, &mut dst, &ResizeOptions::default().resize_alg(alg))
                    .map_err(Error::backend)?;
                let buf = dst.into_vec();
                for y in 0..height {
                    for x in 0..width {
                        let off = (y as usize * width as usize + x as usize) * 6;
                        let r = u16::from_le_bytes([buf[off], buf[off + 1]]);
                        let g = u16::from_le_bytes([buf[off + 2], buf[off + 3]]);
                        let b = u16::from_le_bytes([buf[off + 4], buf[off + 5]]);
                        out.set(
                            x,
                            y,
                            Color::from_rgb((r >> 8) as u8, (g >> 8) as u8, (b >> 8) as u8),
                        );
                    }
                }
            }
        }

        Ok(out)
    }

    fn clip(&self, handle: &ImageHandle, target_aspect: f64) -> Result<ImageHandle> {
        let (w, h) = handle.image.dimensions();
        if w == 0 || h == 0 {
            return Err(Error::InvalidArgument(
                "cannot crop a zero-sized image".to_string(),
            ));
        }

        let current_aspect = f64::from(w) / f64::from(h);
        let cropped = if current_aspect > target_aspect {
            let new_w = (f64::from(h) * target_aspect).round() as u32;
            let new_w = new_w.min(w).max(1);
            let x = (w - new_w) / 2;
            handle.image.crop_imm(x, 0, new_w, h)
        } else {
            let new_h = (f64::from(w) / target_aspect).round() as u32;
            let new_h = new_h.min(h).max(1);
            let y = (h - new_h) / 2;
            handle.image.crop_imm(0, y, w, new_h)
        };

        Ok(ImageHandle { image: cropped })
    }

    fn write(
        &self,
        buffer: &PixelBuffer,
        path: &Path,
        format: OutputFormat,
        quality: QualityProfile,
    ) -> Result<()> {
        let width = buffer.width();
        let height = buffer.height();

        let dynamic = match buffer.depth() {
            BitDepth::Bpp24 => {
                let mut img = image::RgbImage::new(width, height);
                for y in 0..height {
                    for x in 0..width {
                        let c = buffer.get(x, y);
                        img.put_pixel(x, y, image::Rgb([c.r(), c.g(), c.b()]));
                    }
                }
                DynamicImage::ImageRgb8(img)
            }
            BitDepth::Bpp48 => {
                let mut img = image::ImageBuffer::<image::Rgb<u16>, Vec<u16>>::new(width, height);
                for y in 0..height {
                    for x in 0..width {
                        let c = buffer.get(x, y);
                        img.put_pixel(
                            x,
                            y,
                            image::Rgb([
                                u16::from(c.r()) << 8,
                                u16::from(c.g()) << 8,
                                u16::from(c.b()) << 8,
                            ]),
                        );
                    }
                }
                DynamicImage::ImageRgb16(img)
            }
        };

        if format == OutputFormat::Jpeg {
            let jpeg_quality = match quality {
                QualityProfile::Low => 60,
                QualityProfile::High => 100,
            };
            let file = File::create(path).map_err(Error::backend)?;
            let mut writer = BufWriter::new(file);
            let encoder = JpegEncoder::new_with_quality(&mut writer, jpeg_quality);
            dynamic.write_with_encoder(encoder).map_err(Error::backend)?;
            return Ok(());
        }

        let image_format = match format {
            OutputFormat::Bmp => image::ImageFormat::Bmp,
            OutputFormat::Gif => image::ImageFormat::Gif,
            OutputFormat::Jpeg => unreachable!("handled above"),
            OutputFormat::Png => image::ImageFormat::Png,
            OutputFormat::Tiff => image::ImageFormat::Tiff,
        };
        dynamic
            .save_with_format(path, image_format)
            .map_err(Error::backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_narrows_a_wide_image_to_target_aspect() {
        let wide = DynamicImage::new_rgb8(200, 100);
        let handle = ImageHandle { image: wide };
        let provider = StdImageProvider;
        let cropped = provider.clip(&handle, 1.0).unwrap();
        let (w, h) = provider.dimensions(&cropped);
        assert_eq!(h, 100);
        assert_eq!(w, 100);
    }

    #[test]
    fn clip_narrows_a_tall_image_to_target_aspect() {
        let tall = DynamicImage::new_rgb8(100, 300);
        let handle = ImageHandle { image: tall };
        let provider = StdImageProvider;
        let cropped = provider.clip(&handle, 2.0).unwrap();
        let (w, h) = provider.dimensions(&cropped);
        assert_eq!(w, 100);
        assert_eq!(h, 50);
    }
}
