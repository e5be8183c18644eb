//! Expression classification
//!
//! [`RandomClassifier`] is a stand-in: it validates the input and picks a
//! label uniformly at random after a simulated inference delay. A real
//! face/emotion model plugs in by implementing [`ExpressionClassifier`].

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::expression::Expression;
use crate::source::SourceImage;

/// Input the classifier refuses to label
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("image is empty")]
    Empty,

    #[error("unrecognized image data ({len} bytes)")]
    Malformed { len: usize },
}

/// Maps one image to exactly one expression label
#[async_trait]
pub trait ExpressionClassifier: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Label the face in `image`
    async fn classify(&self, image: &SourceImage) -> Result<Expression, ClassificationError>;
}

/// Reject inputs no classifier could make sense of
pub fn validate(image: &SourceImage) -> Result<(), ClassificationError> {
    if image.is_empty() {
        return Err(ClassificationError::Empty);
    }
    if image.format().is_none() {
        return Err(ClassificationError::Malformed { len: image.len() });
    }
    Ok(())
}

/// Uniform random placeholder classifier
pub struct RandomClassifier {
    delay: Duration,
    rng: Mutex<StdRng>,
}

impl RandomClassifier {
    /// Simulated inference latency
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(1500);

    /// Create a classifier seeded from OS entropy
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create a classifier with a reproducible label sequence
    #[must_use]
    pub fn seeded(seed: u64, delay: Duration) -> Self {
        Self {
            delay,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomClassifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

#[async_trait]
impl ExpressionClassifier for RandomClassifier {
    fn name(&self) -> &'static str {
        "random"
    }

    #[instrument(skip_all, fields(bytes = image.len()))]
    async fn classify(&self, image: &SourceImage) -> Result<Expression, ClassificationError> {
        validate(image)?;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut rng = self.rng.lock().await;
        let expression = *Expression::ALL
            .choose(&mut *rng)
            .unwrap_or(&Expression::Neutral);

        debug!(%expression, "Picked expression");
        Ok(expression)
    }
}
