//! Bitmap text rasterization
//!
//! Glyphs come from the public-domain 8x8 font in `font8x8`, scaled by an
//! integer factor. Every character occupies one cell, so widths are exact
//! and independent of the platform's installed fonts.

use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::{Rgba, RgbaImage};

const GLYPH_SIZE: u32 = 8;

/// Scaled 8x8 monospace font
#[derive(Debug, Clone, Copy)]
pub struct BitmapFont {
    scale: u32,
}

impl BitmapFont {
    #[must_use]
    pub fn new(scale: u32) -> Self {
        Self {
            scale: scale.max(1),
        }
    }

    /// Edge length of one character cell in pixels
    #[must_use]
    pub fn cell_size(&self) -> u32 {
        GLYPH_SIZE * self.scale
    }

    /// Rendered width of `text` in pixels
    #[must_use]
    pub fn measure(&self, text: &str) -> u32 {
        text.chars().count() as u32 * self.cell_size()
    }

    /// Draw `text` centered on (`center_x`, `center_y`), clipping at the canvas edges
    pub fn draw_line(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        center_x: i64,
        center_y: i64,
        color: Rgba<u8>,
    ) {
        let cell = i64::from(self.cell_size());
        let left = center_x - i64::from(self.measure(text)) / 2;
        let top = center_y - cell / 2;

        for (i, ch) in text.chars().enumerate() {
            let Some(rows) = glyph(ch) else {
                continue;
            };
            let origin_x = left + i as i64 * cell;

            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_SIZE {
                    if bits & (1 << col) == 0 {
                        continue;
                    }
                    let x = origin_x + i64::from(col * self.scale);
                    let y = top + row as i64 * i64::from(self.scale);
                    self.fill_block(canvas, x, y, color);
                }
            }
        }
    }

    fn fill_block(&self, canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
        let (width, height) = (i64::from(canvas.width()), i64::from(canvas.height()));
        let scale = i64::from(self.scale);

        for py in y.max(0)..(y + scale).min(height) {
            for px in x.max(0)..(x + scale).min(width) {
                canvas.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}

impl Default for BitmapFont {
    fn default() -> Self {
        Self::new(4)
    }
}

fn glyph(ch: char) -> Option<[u8; 8]> {
    BASIC_FONTS.get(ch).or_else(|| LATIN_FONTS.get(ch))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn blank(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
    }

    fn inked(canvas: &RgbaImage) -> Vec<(u32, u32)> {
        canvas
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == INK)
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn test_measure() {
        let font = BitmapFont::new(4);
        assert_eq!(font.cell_size(), 32);
        assert_eq!(font.measure("CAT"), 96);
        assert_eq!(font.measure(""), 0);
        assert_eq!(font.measure("é!"), 64);
    }

    #[test]
    fn test_zero_scale_clamped() {
        assert_eq!(BitmapFont::new(0).cell_size(), 8);
    }

    #[test]
    fn test_draw_stays_in_cell_box() {
        let font = BitmapFont::new(2);
        let mut canvas = blank(100, 50);
        font.draw_line(&mut canvas, "HI", 50, 25, INK);

        let pixels = inked(&canvas);
        assert!(!pixels.is_empty());
        // 2 chars * 16px centered on 50 -> x in [34, 66), 16px tall centered on 25 -> y in [17, 33)
        for (x, y) in pixels {
            assert!((34..66).contains(&x), "x={x}");
            assert!((17..33).contains(&y), "y={y}");
        }
    }

    #[test]
    fn test_space_draws_nothing() {
        let font = BitmapFont::new(3);
        let mut canvas = blank(60, 60);
        font.draw_line(&mut canvas, "   ", 30, 30, INK);
        assert!(inked(&canvas).is_empty());
    }

    #[test]
    fn test_clips_at_edges() {
        let font = BitmapFont::new(4);
        let mut canvas = blank(40, 20);
        // Far wider than the canvas; must not panic
        font.draw_line(&mut canvas, "WWWWWWWWWW", 20, 0, INK);
        assert!(!inked(&canvas).is_empty());
    }
}
