//! Meme compositing
//!
//! Renders the final downloadable picture:
//! - background scaled into the top 800x800 region
//! - near-opaque caption band across the bottom
//! - greedy word-wrapped caption, centered, one line every 40px
//! - PNG encoding with a timestamped file name
//!
//! [`Compositor::render`] is pure and does no I/O; [`Compositor::compose`]
//! loads the background first.

pub mod glyph;
pub mod wrap;

use chrono::{DateTime, Utc};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::Deserialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::expression::Background;
pub use glyph::BitmapFont;
pub use wrap::wrap_words;

/// Failures producing the downloadable image
#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("HTTP client error: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to fetch background {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("background {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read background {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode background {background}: {source}")]
    Decode {
        background: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode PNG: {0}")]
    Encode(#[source] image::ImageError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Canvas geometry and styling (`[compositor]` in the config file)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Canvas width
    pub width: u32,
    /// Canvas height
    pub height: u32,
    /// Height of the region the background is scaled into
    pub image_height: u32,
    /// First row of the caption band
    pub band_top: u32,
    /// Caption band RGB
    pub band_color: [u8; 3],
    /// Caption band opacity (0.0 - 1.0)
    pub band_opacity: f32,
    /// Caption text RGB
    pub text_color: [u8; 3],
    /// Widest a wrapped line may be (single words excepted)
    pub max_line_width: u32,
    /// Vertical distance between line centers
    pub line_height: u32,
    /// Vertical center of the first caption line
    pub first_line_y: u32,
    /// Integer upscale of the 8x8 glyphs
    pub glyph_scale: u32,
    /// Output file name prefix
    pub file_prefix: String,
    /// Background download timeout in seconds
    pub fetch_timeout_secs: u64,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 900,
            image_height: 800,
            band_top: 750,
            band_color: [255, 255, 255],
            band_opacity: 0.95,
            text_color: [0, 0, 0],
            max_line_width: 750,
            line_height: 40,
            first_line_y: 825,
            glyph_scale: 4,
            file_prefix: "cat-meme".to_string(),
            fetch_timeout_secs: 30,
        }
    }
}

/// One wrapped caption line and where it goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionLine {
    pub text: String,
    /// Measured width in pixels
    pub width: u32,
    /// Vertical center on the canvas
    pub center_y: i64,
}

/// A rendered, encoded meme ready to save
#[derive(Debug, Clone)]
pub struct ComposedMeme {
    pub file_name: String,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub lines: Vec<String>,
}

impl ComposedMeme {
    /// Write the PNG into `dir`, creating it if needed
    pub async fn save_in(&self, dir: &Path) -> Result<PathBuf, CompositionError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| CompositionError::Write {
                path: dir.to_path_buf(),
                source,
            })?;

        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.png)
            .await
            .map_err(|source| CompositionError::Write {
                path: path.clone(),
                source,
            })?;

        info!("Saved meme to {}", path.display());
        Ok(path)
    }
}

/// Background + caption → PNG
pub struct Compositor {
    config: CompositorConfig,
    font: BitmapFont,
    client: reqwest::Client,
}

impl Compositor {
    /// Create a compositor with default config
    pub fn new() -> Result<Self, CompositionError> {
        Self::with_config(CompositorConfig::default())
    }

    /// Create a compositor with custom config
    pub fn with_config(config: CompositorConfig) -> Result<Self, CompositionError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(CompositionError::Client)?;

        Ok(Self {
            font: BitmapFont::new(config.glyph_scale),
            config,
            client,
        })
    }

    #[must_use]
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Wrap `caption` and assign each line its vertical position
    #[must_use]
    pub fn layout(&self, caption: &str) -> Vec<CaptionLine> {
        wrap_words(caption, self.config.max_line_width, |s| self.font.measure(s))
            .into_iter()
            .enumerate()
            .map(|(i, text)| CaptionLine {
                width: self.font.measure(&text),
                center_y: i64::from(self.config.first_line_y)
                    + i as i64 * i64::from(self.config.line_height),
                text,
            })
            .collect()
    }

    /// Draw the meme onto a fresh canvas
    #[must_use]
    pub fn render(&self, background: &DynamicImage, caption: &str) -> RgbaImage {
        let c = &self.config;
        let mut canvas = RgbaImage::from_pixel(c.width, c.height, Rgba([255, 255, 255, 255]));

        let scaled = background
            .resize_exact(c.width, c.image_height, FilterType::Triangle)
            .to_rgba8();
        imageops::overlay(&mut canvas, &scaled, 0, 0);

        self.fill_band(&mut canvas);

        let [r, g, b] = c.text_color;
        let ink = Rgba([r, g, b, 255]);
        let center_x = i64::from(c.width / 2);

        for line in self.layout(caption) {
            self.font
                .draw_line(&mut canvas, &line.text, center_x, line.center_y, ink);
        }

        canvas
    }

    fn fill_band(&self, canvas: &mut RgbaImage) {
        let alpha = self.config.band_opacity.clamp(0.0, 1.0);
        let color = self.config.band_color;
        let top = self.config.band_top.min(canvas.height());

        for y in top..canvas.height() {
            for x in 0..canvas.width() {
                let pixel = canvas.get_pixel_mut(x, y);
                for (channel, src) in pixel.0.iter_mut().take(3).zip(color) {
                    let blended = f32::from(src) * alpha + f32::from(*channel) * (1.0 - alpha);
                    *channel = blended.round() as u8;
                }
                pixel.0[3] = 255;
            }
        }
    }

    /// Output file name for a meme created at `at`
    #[must_use]
    pub fn file_name(&self, at: DateTime<Utc>) -> String {
        format!("{}-{}.png", self.config.file_prefix, at.timestamp_millis())
    }

    /// Fetch or read the background image
    pub async fn load_background(&self, background: &Background) -> Result<DynamicImage, CompositionError> {
        let bytes = match background {
            Background::Remote(url) => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|source| CompositionError::Fetch {
                        url: url.clone(),
                        source,
                    })?;

                let status = response.status();
                if !status.is_success() {
                    return Err(CompositionError::Status {
                        url: url.clone(),
                        status: status.as_u16(),
                    });
                }

                response
                    .bytes()
                    .await
                    .map_err(|source| CompositionError::Fetch {
                        url: url.clone(),
                        source,
                    })?
                    .to_vec()
            }
            Background::Local(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| CompositionError::Read {
                        path: path.clone(),
                        source,
                    })?
            }
        };

        debug!(bytes = bytes.len(), "Loaded background");

        image::load_from_memory(&bytes).map_err(|source| CompositionError::Decode {
            background: background.to_string(),
            source,
        })
    }

    /// Load `background`, render `caption` over it and encode as PNG
    #[instrument(skip(self, caption), fields(background = %background))]
    pub async fn compose(&self, background: &Background, caption: &str) -> Result<ComposedMeme, CompositionError> {
        let image = self.load_background(background).await?;
        let canvas = self.render(&image, caption);
        let png = encode_png(&canvas)?;

        let meme = ComposedMeme {
            file_name: self.file_name(Utc::now()),
            png,
            width: canvas.width(),
            height: canvas.height(),
            lines: self.layout(caption).into_iter().map(|l| l.text).collect(),
        };

        info!(file = %meme.file_name, bytes = meme.png.len(), "Composed meme");
        Ok(meme)
    }
}

fn encode_png(canvas: &RgbaImage) -> Result<Vec<u8>, CompositionError> {
    let mut png = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(CompositionError::Encode)?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> DynamicImage {
        let [r, g, b] = rgb;
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([r, g, b, 255])))
    }

    fn ink_pixels(canvas: &RgbaImage) -> Vec<(u32, u32)> {
        canvas
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == INK)
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn test_render_dimensions() {
        let compositor = Compositor::new().unwrap();
        let canvas = compositor.render(&solid(64, 48, [10, 200, 10]), "hi");
        assert_eq!(canvas.dimensions(), (800, 900));
    }

    #[test]
    fn test_background_fills_top_region() {
        let compositor = Compositor::new().unwrap();
        let canvas = compositor.render(&solid(10, 10, [200, 0, 0]), "");

        for (x, y) in [(0, 0), (799, 0), (400, 400), (799, 749)] {
            let Rgba([r, g, b, a]) = *canvas.get_pixel(x, y);
            assert!(r.abs_diff(200) <= 1 && g == 0 && b == 0 && a == 255, "({x},{y})");
        }
    }

    #[test]
    fn test_band_is_blended() {
        let compositor = Compositor::new().unwrap();
        let canvas = compositor.render(&solid(10, 10, [0, 0, 0]), "");

        // 255 * 0.95 over black inside the scaled background
        assert_eq!(*canvas.get_pixel(400, 760), Rgba([242, 242, 242, 255]));
        // Below the background the canvas is white, so the band stays white
        assert_eq!(*canvas.get_pixel(400, 850), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_empty_caption_draws_no_text() {
        let compositor = Compositor::new().unwrap();
        let canvas = compositor.render(&solid(10, 10, [200, 0, 0]), "");
        assert!(ink_pixels(&canvas).is_empty());
        assert!(compositor.layout("").is_empty());
    }

    #[test]
    fn test_text_confined_to_band() {
        let compositor = Compositor::new().unwrap();
        let caption = "YOU'RE 5 MINUTES LATE WITH DINNER";
        let canvas = compositor.render(&solid(10, 10, [200, 0, 0]), caption);

        let pixels = ink_pixels(&canvas);
        assert!(!pixels.is_empty());
        for (x, y) in pixels {
            assert!((750..900).contains(&y), "ink at y={y}");
            assert!((25..775).contains(&x), "ink at x={x}");
        }
    }

    #[test]
    fn test_layout_positions() {
        let compositor = Compositor::new().unwrap();
        // 23 cells of 32px fit in 750px
        let lines = compositor.layout("YOU'RE 5 MINUTES LATE WITH DINNER");

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "YOU'RE 5 MINUTES LATE");
        assert_eq!(lines[1].text, "WITH DINNER");
        assert_eq!(lines[0].center_y, 825);
        assert_eq!(lines[1].center_y, 865);
        for line in &lines {
            assert!(line.width <= 750);
        }
    }

    #[test]
    fn test_overwide_word_gets_own_line() {
        let compositor = Compositor::new().unwrap();
        let lines = compositor.layout("meow SUPERCALIFRAGILISTICEXPIALIDOCIOUS meow");

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].text, "SUPERCALIFRAGILISTICEXPIALIDOCIOUS");
        assert!(lines[1].width > 750);
    }

    #[test]
    fn test_file_name_uses_millis() {
        let compositor = Compositor::new().unwrap();
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(compositor.file_name(at), "cat-meme-1700000000123.png");
    }

    #[tokio::test]
    async fn test_compose_local_background() {
        let dir = tempfile::tempdir().unwrap();
        let bg_path = dir.path().join("cat.png");
        solid(32, 32, [90, 90, 200]).save(&bg_path).unwrap();

        let compositor = Compositor::new().unwrap();
        let meme = compositor
            .compose(&Background::Local(bg_path), "THE VACUUM IS OUT")
            .await
            .unwrap();

        assert!(meme.file_name.starts_with("cat-meme-"));
        assert!(meme.file_name.ends_with(".png"));
        assert_eq!(meme.lines, vec!["THE VACUUM IS OUT"]);

        let decoded = image::load_from_memory(&meme.png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 900));

        let saved = meme.save_in(&dir.path().join("out")).await.unwrap();
        assert_eq!(std::fs::read(saved).unwrap(), meme.png);
    }

    #[tokio::test]
    async fn test_missing_background_is_read_error() {
        let compositor = Compositor::new().unwrap();
        let err = compositor
            .compose(&Background::Local(PathBuf::from("/nonexistent/cat.png")), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, CompositionError::Read { .. }));
    }

    #[tokio::test]
    async fn test_garbage_background_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        std::fs::write(&path, b"not a picture").unwrap();

        let compositor = Compositor::new().unwrap();
        let err = compositor
            .compose(&Background::Local(path), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, CompositionError::Decode { .. }));
    }
}
