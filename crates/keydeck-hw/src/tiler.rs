//! Splits a whole-panel image into per-button images.

use crate::codec::resample;
use crate::profile::DeviceProfile;
use crate::{Error, Result};
use image::imageops;
use image::RgbaImage;
use tracing::debug;

/// Scales and crops `img` to the panel size of `profile`.
///
/// The image is scaled to the panel width, keeping its aspect ratio. Anything
/// taller than the panel is center-cropped. The crop is taken in source
/// coordinates first so only the visible part is ever resampled.
pub fn fit_to_panel(profile: &DeviceProfile, img: &RgbaImage) -> Result<RgbaImage> {
    let (src_w, src_h) = img.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(Error::EmptyImage {
            width: src_w,
            height: src_h,
        });
    }
    let (panel_w, panel_h) = (profile.panel_width(), profile.panel_height());

    // Source rows that map onto the panel height at the target scale
    let visible_h = (u64::from(src_w) * u64::from(panel_h) / u64::from(panel_w)).max(1);
    let img = if u64::from(src_h) > visible_h {
        let h = visible_h as u32;
        imageops::crop_imm(img, 0, (src_h - h) / 2, src_w, h).to_image()
    } else {
        img.clone()
    };

    let height = if img.height() as u64 >= visible_h {
        panel_h
    } else {
        ((u64::from(img.height()) * u64::from(panel_w) / u64::from(src_w)) as u32).max(1)
    };

    if img.dimensions() == (panel_w, height) {
        return Ok(img);
    }
    debug!(
        "Scaling panel image {}x{} -> {}x{}",
        img.width(),
        img.height(),
        panel_w,
        height
    );
    Ok(resample(&img, panel_w, height))
}

/// Cuts a panel image into `(button index, button image)` pairs, row-major.
pub fn tile(profile: &DeviceProfile, img: &RgbaImage) -> Result<Vec<(usize, RgbaImage)>> {
    let img = fit_to_panel(profile, img)?;
    let size = profile.button_size;
    let pitch = size + profile.spacer;

    let mut tiles = Vec::with_capacity(profile.button_count());
    for row in 0..profile.rows as u32 {
        for col in 0..profile.columns as u32 {
            let index = (row as usize) * profile.columns + col as usize;
            let mut button = RgbaImage::new(size, size);
            // Copies only the part that overlaps the (possibly short) source
            imageops::replace(
                &mut button,
                &img,
                -((col * pitch) as i64),
                -((row * pitch) as i64),
            );
            tiles.push((index, button));
        }
    }
    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{original, plus};
    use image::Rgba;

    fn panel_image(profile: &DeviceProfile) -> RgbaImage {
        let mut img = RgbaImage::new(profile.panel_width(), profile.panel_height());
        let pitch = profile.button_size + profile.spacer;
        for (x, y, px) in img.enumerate_pixels_mut() {
            let col = (x / pitch) as u8;
            let row = (y / pitch) as u8;
            *px = Rgba([col * 40, row * 80, 0, 255]);
        }
        img
    }

    #[test]
    fn test_tile_order_and_rects() {
        let p = original();
        let tiles = tile(&p, &panel_image(&p)).unwrap();
        assert_eq!(tiles.len(), 15);

        for (i, (index, button)) in tiles.iter().enumerate() {
            assert_eq!(*index, i);
            assert_eq!(button.dimensions(), (72, 72));
            let col = (i % 5) as u8;
            let row = (i / 5) as u8;
            assert_eq!(button.get_pixel(0, 0).0, [col * 40, row * 80, 0, 255]);
            assert_eq!(button.get_pixel(71, 71).0, [col * 40, row * 80, 0, 255]);
        }
    }

    #[test]
    fn test_fit_scales_by_width() {
        let p = plus();
        let img = RgbaImage::new(p.panel_width() * 2, p.panel_height() * 2);
        let fitted = fit_to_panel(&p, &img).unwrap();
        assert_eq!(fitted.dimensions(), (p.panel_width(), p.panel_height()));
    }

    #[test]
    fn test_fit_crops_tall_images() {
        let p = original();
        let img = RgbaImage::new(p.panel_width(), p.panel_height() + 100);
        let fitted = fit_to_panel(&p, &img).unwrap();
        assert_eq!(fitted.dimensions(), (p.panel_width(), p.panel_height()));
    }

    #[test]
    fn test_fit_center_crop_keeps_middle() {
        let p = original();
        let extra = 40;
        let mut img = RgbaImage::from_pixel(
            p.panel_width(),
            p.panel_height() + extra,
            Rgba([255, 0, 0, 255]),
        );
        for x in 0..p.panel_width() {
            for y in 0..extra / 2 {
                img.put_pixel(x, y, Rgba([0, 0, 255, 255]));
            }
        }
        let fitted = fit_to_panel(&p, &img).unwrap();
        assert_eq!(fitted.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_short_image_leaves_bottom_black() {
        let p = original();
        let img = RgbaImage::from_pixel(p.panel_width(), 72, Rgba([9, 9, 9, 255]));
        let tiles = tile(&p, &img).unwrap();
        assert_eq!(tiles[0].1.get_pixel(10, 10).0, [9, 9, 9, 255]);
        assert_eq!(tiles[14].1.get_pixel(10, 10).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_empty_image_rejected() {
        let p = original();
        assert!(matches!(
            tile(&p, &RgbaImage::new(0, 10)),
            Err(Error::EmptyImage { width: 0, height: 10 })
        ));
        assert!(matches!(
            fit_to_panel(&p, &RgbaImage::new(10, 0)),
            Err(Error::EmptyImage { .. })
        ));
    }

    #[test]
    fn test_extreme_aspect_ratios_stay_small() {
        let p = original();

        let tall = RgbaImage::from_pixel(1, 100_000, Rgba([5, 5, 5, 255]));
        let fitted = fit_to_panel(&p, &tall).unwrap();
        assert_eq!(fitted.dimensions(), (p.panel_width(), p.panel_height()));

        let wide = RgbaImage::from_pixel(100_000, 1, Rgba([5, 5, 5, 255]));
        let fitted = fit_to_panel(&p, &wide).unwrap();
        assert_eq!(fitted.dimensions(), (p.panel_width(), 1));
        assert_eq!(tile(&p, &wide).unwrap().len(), 15);
    }
}
