//! `Catemoji` - Your face + AI cat memes
//!
//! # Features
//!
//! - **Session state machine**: upload → detecting → generating → complete, with restart
//! - **Expression classifier**: pluggable; ships a random placeholder
//! - **Captions**: Anthropic Messages API with a static fallback table
//! - **Compositor**: 800x900 PNG with a word-wrapped caption band
//! - **Camera**: webcam capture through ffmpeg, always released
//!
//! # Example
//!
//! ```rust,no_run
//! use catemoji::{Config, CycleOutcome};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let session = config.session()?;
//!
//!     if let CycleOutcome::Completed(meme) = session.upload_file("me.jpg").await? {
//!         println!("{}: {}", meme.expression, meme.caption);
//!         let path = session.download_to(&config.compositor()?, &config.output_dir()).await?;
//!         println!("Saved {}", path.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod camera;
pub mod caption;
pub mod classify;
pub mod compose;
pub mod config;
pub mod expression;
pub mod session;
pub mod source;

pub use camera::{AcquisitionError, CameraDevice, CameraGuard, CameraStream, FfmpegCamera, FfmpegCameraConfig};
pub use caption::{AnthropicCaptions, CaptionConfig, CaptionProvider, CaptionServiceError, FallbackCaptions};
pub use classify::{ClassificationError, ExpressionClassifier, RandomClassifier};
pub use compose::{CaptionLine, ComposedMeme, CompositionError, Compositor, CompositorConfig};
pub use config::Config;
pub use expression::{fallback_caption_for, Background, Catalog, Expression, UnknownExpression, DEFAULT_CAPTION};
pub use session::{CameraStatus, CompletedMeme, CycleOutcome, Phase, PhaseKind, Session, SessionError, SessionEvent};
pub use source::{ImageOrigin, SourceImage};

/// Version of catemoji
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
