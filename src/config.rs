//! Configuration loaded from `~/.config/catemoji/config.toml`
//!
//! Every section is optional. `ANTHROPIC_API_KEY` supplies the caption
//! service key when the file does not.
//!
//! ```toml
//! output_dir = "/home/me/Pictures/memes"
//!
//! [caption]
//! model = "claude-sonnet-4-20250514"
//! max_words = 10
//!
//! [classifier]
//! delay_ms = 1500
//!
//! [compositor]
//! glyph_scale = 4
//!
//! [backgrounds]
//! happy = "/home/me/cats/happy.jpg"
//! angry = "https://example.com/angry-cat.jpg"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::caption::{AnthropicCaptions, CaptionConfig};
use crate::classify::RandomClassifier;
use crate::compose::{Compositor, CompositorConfig};
use crate::expression::Catalog;
use crate::session::Session;

/// Environment variable consulted for the API key
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Placeholder classifier settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Simulated inference latency in milliseconds
    pub delay_ms: u64,
    /// Fixed RNG seed for reproducible labels
    pub seed: Option<u64>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            delay_ms: RandomClassifier::DEFAULT_DELAY.as_millis() as u64,
            seed: None,
        }
    }
}

/// Top-level config file
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub caption: CaptionConfig,
    pub classifier: ClassifierConfig,
    pub compositor: CompositorConfig,
    /// Per-label background overrides (label → URL or path)
    pub backgrounds: HashMap<String, String>,
    /// Where downloaded memes go (default: current directory)
    pub output_dir: Option<PathBuf>,
}

impl Config {
    /// Load config from `path`, or the default location when `None`
    ///
    /// A missing default file yields defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(std::env::var(API_KEY_ENV).ok());
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        Self::from_toml(&content).with_context(|| format!("invalid config in {}", path.display()))
    }

    /// Parse TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        // Fail early on typos in [backgrounds]
        Catalog::from_overrides(&config.backgrounds)?;
        Ok(config)
    }

    fn apply_env(&mut self, env_key: Option<String>) {
        if self.caption.usable_key().is_none() {
            if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
                self.caption.api_key = Some(key);
            }
        }
    }

    /// Label → background lookup
    pub fn catalog(&self) -> Result<Catalog> {
        Ok(Catalog::from_overrides(&self.backgrounds)?)
    }

    /// Random classifier per `[classifier]`
    #[must_use]
    pub fn classifier(&self) -> RandomClassifier {
        let delay = Duration::from_millis(self.classifier.delay_ms);
        match self.classifier.seed {
            Some(seed) => RandomClassifier::seeded(seed, delay),
            None => RandomClassifier::new(delay),
        }
    }

    /// Compositor per `[compositor]`
    pub fn compositor(&self) -> Result<Compositor> {
        Compositor::with_config(self.compositor.clone()).context("failed to create compositor")
    }

    /// Fully wired session
    pub fn session(&self) -> Result<Session> {
        let captions =
            AnthropicCaptions::new(self.caption.clone()).context("failed to create caption client")?;

        Ok(Session::new(
            Arc::new(self.classifier()),
            Arc::new(captions),
            self.catalog()?,
        ))
    }

    /// Directory memes are saved into
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Return the path to the default config file.
#[must_use]
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("catemoji")
        .join("config.toml")
}
