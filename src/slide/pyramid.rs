//! Pyramidal TIFF slide reader
//!
//! Whole-slide images stored as multi-page TIFF carry one image directory
//! per resolution level (level 0 is full resolution). Only the strips or
//! tiles of the requested level that overlap the region are decoded; the
//! other directories are skipped over.

use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::ColorType;

use super::{SlideError, SlideReader};
use crate::dataset::Region;

/// Largest single strip or tile the reader will decode
const MAX_CHUNK_BYTES: usize = 256 * 1024 * 1024;

/// Tile offset tables of full-resolution levels outgrow the default 1 MiB
const MAX_IFD_VALUE_BYTES: usize = 64 * 1024 * 1024;

/// Default slide backend: pure-Rust pyramidal TIFF
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffPyramidReader;

impl SlideReader for TiffPyramidReader {
    fn read_region(&self, path: &Path, level: u32, region: Region) -> Result<RgbImage, SlideError> {
        read_tiff_region(path, level, region)
    }
}

fn slide_limits() -> Limits {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = MAX_CHUNK_BYTES;
    limits.intermediate_buffer_size = MAX_CHUNK_BYTES;
    limits.ifd_value_size = MAX_IFD_VALUE_BYTES;
    limits
}

/// Crop a region out of one level of a pyramidal TIFF
///
/// # Arguments
/// * `path` - Path to the slide
/// * `level` - Image directory to read (0 = full resolution)
/// * `region` - Crop rectangle in that level's pixel coordinates
///
/// # Returns
/// * `Ok(RgbImage)` - The region as 8-bit RGB, `region.width` x `region.height`
/// * `Err(SlideError)` - Missing file, corrupt TIFF, missing level or
///   out-of-bounds region
pub fn read_tiff_region(path: &Path, level: u32, region: Region) -> Result<RgbImage, SlideError> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(slide_limits());

    for skipped in 0..level {
        if !decoder.more_images() {
            return Err(SlideError::UnsupportedLevel {
                level,
                available: skipped + 1,
            });
        }
        decoder.next_image()?;
    }

    let (width, height) = decoder.dimensions()?;
    if !region.fits_within(width, height) {
        return Err(SlideError::OutOfBounds {
            region,
            width,
            height,
        });
    }

    let color = decoder.colortype()?;
    let channels = channel_count(color)?;
    let pixels = read_chunks(&mut decoder, width, region, channels, color)?;
    Ok(to_dynamic(color, region.width, region.height, pixels)?.to_rgb8())
}

/// Decode the strips or tiles intersecting `region` and stitch them into a
/// row-major buffer of `region.width * region.height * channels` bytes.
fn read_chunks(
    decoder: &mut Decoder<BufReader<File>>,
    width: u32,
    region: Region,
    channels: usize,
    color: ColorType,
) -> Result<Vec<u8>, SlideError> {
    let mut out = vec![0u8; region.width as usize * region.height as usize * channels];
    if region.width == 0 || region.height == 0 {
        return Ok(out);
    }

    let (chunk_w, chunk_h) = decoder.chunk_dimensions();
    let (chunk_w, chunk_h) = (chunk_w.max(1), chunk_h.max(1));
    let chunks_across = width.div_ceil(chunk_w);
    let x_end = region.x + region.width;
    let y_end = region.y + region.height;
    let short_buffer =
        || SlideError::UnsupportedColor(format!("{color:?} with short chunk buffer"));

    for cy in region.y / chunk_h..=(y_end - 1) / chunk_h {
        for cx in region.x / chunk_w..=(x_end - 1) / chunk_w {
            let chunk = cy * chunks_across + cx;
            let (data_w, data_h) = decoder.chunk_data_dimensions(chunk);
            let data = match decoder.read_chunk(chunk)? {
                DecodingResult::U8(data) => data,
                _ => return Err(SlideError::UnsupportedColor(format!("{color:?}"))),
            };
            // Edge tiles may come back padded to the full tile size
            let full_tile = chunk_w as usize * chunk_h as usize * channels;
            let stride = if data.len() == full_tile { chunk_w } else { data_w };
            let stride = stride as usize;

            let (origin_x, origin_y) = (cx * chunk_w, cy * chunk_h);
            let x0 = region.x.max(origin_x);
            let x1 = x_end.min(origin_x + data_w);
            let y0 = region.y.max(origin_y);
            let y1 = y_end.min(origin_y + data_h);
            if x0 >= x1 {
                continue;
            }
            let row_bytes = (x1 - x0) as usize * channels;

            for y in y0..y1 {
                let src = ((y - origin_y) as usize * stride + (x0 - origin_x) as usize) * channels;
                let dst = ((y - region.y) as usize * region.width as usize
                    + (x0 - region.x) as usize)
                    * channels;
                let row = data.get(src..src + row_bytes).ok_or_else(short_buffer)?;
                out[dst..dst + row_bytes].copy_from_slice(row);
            }
        }
    }
    Ok(out)
}

fn channel_count(color: ColorType) -> Result<usize, SlideError> {
    match color {
        ColorType::Gray(8) => Ok(1),
        ColorType::GrayA(8) => Ok(2),
        ColorType::RGB(8) => Ok(3),
        ColorType::RGBA(8) => Ok(4),
        other => Err(SlideError::UnsupportedColor(format!("{other:?}"))),
    }
}

fn to_dynamic(
    color: ColorType,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
) -> Result<DynamicImage, SlideError> {
    let short_buffer =
        || SlideError::UnsupportedColor(format!("{color:?} with short pixel buffer"));
    let image = match color {
        ColorType::RGB(8) => RgbImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(short_buffer)?,
        ColorType::RGBA(8) => RgbaImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(short_buffer)?,
        ColorType::Gray(8) => GrayImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(short_buffer)?,
        ColorType::GrayA(8) => GrayAlphaImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageLumaA8)
            .ok_or_else(short_buffer)?,
        other => return Err(SlideError::UnsupportedColor(format!("{other:?}"))),
    };
    Ok(image)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;
    use tiff::encoder::{colortype, TiffEncoder};

    /// Write a two-level RGB pyramid: 200x160 at level 0, 100x80 at level 1.
    /// Pixel values encode their coordinates so crops can be checked.
    pub(crate) fn write_pyramid(dir: &Path) -> PathBuf {
        let path = dir.join("slide.tiff");
        let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
        for (w, h) in [(200u32, 160u32), (100, 80)] {
            let mut data = Vec::with_capacity((w * h * 3) as usize);
            for y in 0..h {
                for x in 0..w {
                    data.extend_from_slice(&[x as u8, y as u8, (w / 100) as u8]);
                }
            }
            encoder.write_image::<colortype::RGB8>(w, h, &data).unwrap();
        }
        path
    }

    #[test]
    fn test_region_at_level_zero() {
        let dir = tempdir().unwrap();
        let slide = write_pyramid(dir.path());

        let img = read_tiff_region(&slide, 0, Region::new(10, 10, 50, 50)).unwrap();
        assert_eq!(img.dimensions(), (50, 50));
        assert_eq!(img.get_pixel(0, 0).0, [10, 10, 2]);
        assert_eq!(img.get_pixel(49, 5).0, [59, 15, 2]);
    }

    #[test]
    fn test_region_at_level_one() {
        let dir = tempdir().unwrap();
        let slide = write_pyramid(dir.path());

        let img = read_tiff_region(&slide, 1, Region::new(10, 10, 50, 50)).unwrap();
        assert_eq!(img.dimensions(), (50, 50));
        assert_eq!(img.get_pixel(0, 0).0, [10, 10, 1]);
    }

    #[test]
    fn test_missing_level() {
        let dir = tempdir().unwrap();
        let slide = write_pyramid(dir.path());

        let err = read_tiff_region(&slide, 3, Region::new(0, 0, 1, 1)).unwrap_err();
        assert!(matches!(err, SlideError::UnsupportedLevel { level: 3, available: 2 }));
    }

    #[test]
    fn test_out_of_bounds_region() {
        let dir = tempdir().unwrap();
        let slide = write_pyramid(dir.path());

        let err = read_tiff_region(&slide, 1, Region::new(60, 0, 50, 10)).unwrap_err();
        assert!(matches!(err, SlideError::OutOfBounds { width: 100, height: 80, .. }));
    }

    #[test]
    fn test_missing_file() {
        let missing = Path::new("/nonexistent/slide.tiff");
        let err = read_tiff_region(missing, 0, Region::new(0, 0, 1, 1)).unwrap_err();
        assert!(matches!(err, SlideError::Io(_)));
    }

    /// Single-level 64x64 RGB slide stored in 8-row strips
    fn write_striped(dir: &Path) -> PathBuf {
        let path = dir.join("striped.tiff");
        let (w, h) = (64u32, 64u32);
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[x as u8, y as u8, 7]);
            }
        }
        let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
        let mut image = encoder.new_image::<colortype::RGB8>(w, h).unwrap();
        image.rows_per_strip(8).unwrap();
        image.write_data(&data).unwrap();
        path
    }

    #[test]
    fn test_region_spanning_strip_boundaries() {
        let dir = tempdir().unwrap();
        let slide = write_striped(dir.path());

        let img = read_tiff_region(&slide, 0, Region::new(5, 6, 20, 20)).unwrap();
        assert_eq!(img.dimensions(), (20, 20));
        for (x, y, px) in img.enumerate_pixels() {
            assert_eq!(px.0, [(x + 5) as u8, (y + 6) as u8, 7]);
        }
    }

    #[test]
    fn test_region_inside_last_strip() {
        let dir = tempdir().unwrap();
        let slide = write_striped(dir.path());

        let img = read_tiff_region(&slide, 0, Region::new(60, 57, 4, 7)).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [60, 57, 7]);
        assert_eq!(img.get_pixel(3, 6).0, [63, 63, 7]);
    }
}
