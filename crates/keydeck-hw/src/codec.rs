//! Key image encoding.
//!
//! Converts an RGBA bitmap into the byte encoding a profile expects:
//! a 24-bit BMP in the panel's scan order, or a baseline JPEG.

use crate::profile::{DeviceProfile, ImageEncoding};
use crate::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, RgbaImage};

/// BMP file header + info header size.
pub const BMP_HEADER_SIZE: usize = 54;

/// JPEG quality used for key images.
pub const JPEG_QUALITY: u8 = 75;

/// Horizontal/vertical resolution written into the BMP header (px/m).
const BMP_PIXELS_PER_METER: u32 = 3780;

/// Sigma and threshold of the sharpening pass after resampling.
const UNSHARP_SIGMA: f32 = 1.0;
const UNSHARP_THRESHOLD: i32 = 0;

/// Builds the 54-byte BMP header for a square 24-bit image.
pub fn bmp_header(size: u32) -> [u8; BMP_HEADER_SIZE] {
    let image_size = size * size * 3;
    let file_size = BMP_HEADER_SIZE as u32 + image_size;

    let mut header = [0u8; BMP_HEADER_SIZE];
    header[0] = b'B';
    header[1] = b'M';
    header[2..6].copy_from_slice(&file_size.to_le_bytes());
    header[10..14].copy_from_slice(&(BMP_HEADER_SIZE as u32).to_le_bytes());

    // BITMAPINFOHEADER
    header[14..18].copy_from_slice(&40u32.to_le_bytes());
    header[18..22].copy_from_slice(&size.to_le_bytes());
    header[22..26].copy_from_slice(&size.to_le_bytes());
    header[26..28].copy_from_slice(&1u16.to_le_bytes());
    header[28..30].copy_from_slice(&24u16.to_le_bytes());
    header[34..38].copy_from_slice(&image_size.to_le_bytes());
    header[38..42].copy_from_slice(&BMP_PIXELS_PER_METER.to_le_bytes());
    header[42..46].copy_from_slice(&BMP_PIXELS_PER_METER.to_le_bytes());
    header
}

/// Resamples an image with Lanczos3 followed by a light unsharp mask.
pub fn resample(img: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let resized = imageops::resize(img, width, height, FilterType::Lanczos3);
    imageops::unsharpen(&resized, UNSHARP_SIGMA, UNSHARP_THRESHOLD)
}

/// Encodes one key image for the given profile.
///
/// Images that are not `button_size` square are resampled first.
pub fn encode(profile: &DeviceProfile, img: &RgbaImage) -> Result<Vec<u8>> {
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::EmptyImage {
            width: img.width(),
            height: img.height(),
        });
    }
    let size = profile.button_size;
    let mut img = if img.dimensions() != (size, size) {
        resample(img, size, size)
    } else {
        img.clone()
    };

    if profile.rotate_180 {
        imageops::rotate180_in_place(&mut img);
    }

    match profile.image_encoding {
        ImageEncoding::RawBgr => Ok(encode_bmp(&img)),
        ImageEncoding::Jpeg => encode_jpeg(&img),
    }
}

/// Encodes a square image as BMP in panel scan order.
///
/// Rows go top to bottom, columns right to left, each pixel as B, G, R.
pub fn encode_bmp(img: &RgbaImage) -> Vec<u8> {
    let size = img.width();
    let mut buf = Vec::with_capacity(BMP_HEADER_SIZE + (size * size * 3) as usize);
    buf.extend_from_slice(&bmp_header(size));

    for row in 0..img.height() {
        for col in (0..size).rev() {
            let [r, g, b, _] = img.get_pixel(col, row).0;
            buf.extend_from_slice(&[b, g, r]);
        }
    }
    buf
}

/// Encodes an image as baseline JPEG.
pub fn encode_jpeg(img: &RgbaImage) -> Result<Vec<u8>> {
    // JPEG has no alpha channel
    let rgb = image::DynamicImage::ImageRgba8(img.clone()).into_rgb8();

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{original, original_v2, plus};
    use image::Rgba;

    const BMP_HEADER_72: [u8; BMP_HEADER_SIZE] = [
        0x42, 0x4D, 0xF6, 0x3C, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x36, 0x00, 0x00, 0x00,
        0x28, 0x00, 0x00, 0x00, 0x48, 0x00, 0x00, 0x00, 0x48, 0x00, 0x00, 0x00, 0x01, 0x00,
        0x18, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x3C, 0x00, 0x00, 0xC4, 0x0E, 0x00, 0x00,
        0xC4, 0x0E, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn test_bmp_header_matches_panel_header() {
        assert_eq!(bmp_header(72), BMP_HEADER_72);
    }

    #[test]
    fn test_encode_red_bmp() {
        let img = RgbaImage::from_pixel(72, 72, Rgba([255, 0, 0, 255]));
        let data = encode(&original(), &img).unwrap();
        assert_eq!(data.len(), 54 + 72 * 72 * 3);
        assert_eq!(&data[54..57], &[0, 0, 255]);
    }

    #[test]
    fn test_bmp_scan_order() {
        let mut img = RgbaImage::new(72, 72);
        img.put_pixel(71, 0, Rgba([1, 2, 3, 255]));
        img.put_pixel(0, 1, Rgba([4, 5, 6, 255]));

        let data = encode_bmp(&img);
        // First emitted pixel is the rightmost of row 0
        assert_eq!(&data[54..57], &[3, 2, 1]);
        // Last pixel of row 1 is its leftmost
        let end_of_row1 = 54 + 2 * 72 * 3;
        assert_eq!(&data[end_of_row1 - 3..end_of_row1], &[6, 5, 4]);
    }

    #[test]
    fn test_encode_resizes() {
        let img = RgbaImage::from_pixel(144, 144, Rgba([0, 255, 0, 255]));
        let data = encode(&original(), &img).unwrap();
        assert_eq!(data.len(), 54 + 72 * 72 * 3);
    }

    #[test]
    fn test_encode_jpeg() {
        let img = RgbaImage::from_pixel(120, 120, Rgba([0, 0, 255, 255]));
        let data = encode(&plus(), &img).unwrap();
        assert_eq!(&data[..2], &[0xFF, 0xD8]);
        assert_eq!(&data[data.len() - 2..], &[0xFF, 0xD9]);

        let decoded = image::load_from_memory(&data).unwrap();
        assert_eq!(decoded.width(), 120);
        assert_eq!(decoded.height(), 120);
    }

    #[test]
    fn test_encode_empty_image() {
        assert!(matches!(
            encode(&plus(), &RgbaImage::new(0, 0)),
            Err(Error::EmptyImage { .. })
        ));
    }

    #[test]
    fn test_rotation_applied() {
        let mut img = RgbaImage::from_pixel(72, 72, Rgba([0, 0, 0, 255]));
        for y in 0..8 {
            for x in 0..8 {
                img.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }

        let data = encode(&original_v2(), &img).unwrap();
        let decoded = image::load_from_memory(&data).unwrap().to_rgb8();
        // White corner moved from top-left to bottom-right
        assert!(decoded.get_pixel(68, 68).0[0] > 200);
        assert!(decoded.get_pixel(3, 3).0[0] < 50);
    }
}
