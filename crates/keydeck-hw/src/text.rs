//! Text rendering onto key images using fontdue.
//!
//! Fonts are owned by the caller through a [`FontSet`] and passed into every
//! render call; nothing is loaded at process start.

use crate::profile::DeviceProfile;
use crate::{Error, Result};
use fontdue::{Font, FontSettings};
use image::{Pixel, Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Named fonts available to text buttons.
#[derive(Default)]
pub struct FontSet {
    fonts: HashMap<String, Font>,
}

impl FontSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TrueType/OpenType font and registers it under `name`.
    pub fn add_font(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let font = Font::from_bytes(data, FontSettings::default())
            .map_err(|e| Error::Font(e.to_string()))?;
        self.fonts.insert(name.to_string(), font);
        debug!("Loaded font '{}'", name);
        Ok(())
    }

    /// Loads a font file and registers it under `name`.
    pub fn add_font_file<P: AsRef<Path>>(&mut self, name: &str, path: P) -> Result<()> {
        let data = std::fs::read(path.as_ref())?;
        self.add_font(name, &data)
    }

    pub fn get(&self, name: &str) -> Option<&Font> {
        self.fonts.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

/// One line of text on a key.
#[derive(Debug, Clone)]
pub struct TextLine {
    pub text: String,
    /// Left edge in pixels.
    pub x: i32,
    /// Top edge in pixels.
    pub y: i32,
    /// Name of a font in the [`FontSet`].
    pub font: String,
    /// Font size in pixels.
    pub size: f32,
    pub color: Rgba<u8>,
}

/// Lines of text drawn over a solid background.
///
/// It is up to the caller to make the lines fit the key.
#[derive(Debug, Clone)]
pub struct TextButton {
    pub background: Rgba<u8>,
    pub lines: Vec<TextLine>,
}

impl TextButton {
    /// Renders the button into a key-sized bitmap.
    pub fn render(&self, profile: &DeviceProfile, fonts: &FontSet) -> Result<RgbaImage> {
        let size = profile.button_size;
        let mut img = RgbaImage::from_pixel(size, size, self.background);

        for line in &self.lines {
            let font = fonts
                .get(&line.font)
                .ok_or_else(|| Error::FontNotFound(line.font.clone()))?;
            draw_text(&mut img, font, line);
        }
        Ok(img)
    }
}

/// Alpha-blends one line of glyphs onto the image.
///
/// `line.y` is the top of the line; glyphs sit on the font's ascent below it.
fn draw_text(img: &mut RgbaImage, font: &Font, line: &TextLine) {
    let ascent = font
        .horizontal_line_metrics(line.size)
        .map(|m| m.ascent)
        .unwrap_or(line.size);
    let baseline = line.y as f32 + ascent;
    let [r, g, b, _] = line.color.0;

    let mut pen_x = line.x as f32;
    let mut previous = None;

    for ch in line.text.chars() {
        if let Some(prev) = previous {
            pen_x += font.horizontal_kern(prev, ch, line.size).unwrap_or(0.0);
        }
        previous = Some(ch);

        let (metrics, coverage) = font.rasterize(ch, line.size);
        let left = pen_x.round() as i64 + metrics.xmin as i64;
        let top = baseline.round() as i64 - (metrics.ymin as i64 + metrics.height as i64);

        for (i, &alpha) in coverage.iter().enumerate() {
            if alpha == 0 {
                continue;
            }
            let x = left + (i % metrics.width) as i64;
            let y = top + (i / metrics.width) as i64;
            if let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) {
                if x < img.width() && y < img.height() {
                    img.get_pixel_mut(x, y).blend(&Rgba([r, g, b, alpha]));
                }
            }
        }

        pen_x += metrics.advance_width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::original;

    #[test]
    fn test_background_only() {
        let button = TextButton {
            background: Rgba([10, 20, 30, 255]),
            lines: Vec::new(),
        };
        let img = button.render(&original(), &FontSet::new()).unwrap();
        assert_eq!(img.dimensions(), (72, 72));
        assert_eq!(img.get_pixel(36, 36).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_unknown_font() {
        let button = TextButton {
            background: Rgba([0, 0, 0, 255]),
            lines: vec![TextLine {
                text: "Hi".to_string(),
                x: 0,
                y: 0,
                font: "mono".to_string(),
                size: 20.0,
                color: Rgba([255, 255, 255, 255]),
            }],
        };
        assert!(matches!(
            button.render(&original(), &FontSet::new()),
            Err(Error::FontNotFound(name)) if name == "mono"
        ));
    }

    const MONO: &[u8] = include_bytes!("../fonts/DejaVuSansMono.ttf");

    fn white_line(text: &str, x: i32, y: i32) -> TextLine {
        TextLine {
            text: text.to_string(),
            x,
            y,
            font: "mono".to_string(),
            size: 32.0,
            color: Rgba([255, 255, 255, 255]),
        }
    }

    #[test]
    fn test_render_glyphs() {
        let mut fonts = FontSet::new();
        fonts.add_font("mono", MONO).unwrap();

        let button = TextButton {
            background: Rgba([0, 0, 0, 255]),
            lines: vec![white_line("H", 20, 10)],
        };
        let img = button.render(&original(), &fonts).unwrap();

        let lit: Vec<_> = img
            .enumerate_pixels()
            .filter(|(_, _, px)| px.0[0] > 128)
            .collect();
        assert!(!lit.is_empty());
        // Glyph stays inside the line box and the background is untouched
        assert!(lit.iter().all(|(x, y, _)| *x >= 20 && *y >= 10 && *y < 10 + 32));
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(71, 71).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_glyphs_clipped_at_edges() {
        let mut fonts = FontSet::new();
        fonts.add_font("mono", MONO).unwrap();

        let button = TextButton {
            background: Rgba([0, 0, 255, 255]),
            lines: vec![white_line("WWWWWW", -10, -10), white_line("g", 60, 60)],
        };
        let img = button.render(&original(), &fonts).unwrap();
        assert_eq!(img.dimensions(), (72, 72));
        assert!(img.pixels().any(|px| px.0[0] > 128));
    }

    #[test]
    fn test_invalid_font_data() {
        let mut fonts = FontSet::new();
        assert!(matches!(
            fonts.add_font("broken", b"not a font"),
            Err(Error::Font(_))
        ));
        assert!(fonts.is_empty());
    }
}
