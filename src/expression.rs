//! Expression labels and their static cat configuration
//!
//! Every label maps to exactly one stock background and one fallback
//! caption. Backgrounds can be overridden per label from the config file;
//! captions cannot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Caption used when a label has no entry in the fallback table
pub const DEFAULT_CAPTION: &str = "I'M A CAT AND I'M JUDGING YOU";

/// Detected facial expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Happy,
    Sad,
    Surprised,
    Angry,
    Neutral,
    Fearful,
    Disgusted,
}

impl Expression {
    /// All labels, in catalog order
    pub const ALL: [Expression; 7] = [
        Self::Happy,
        Self::Sad,
        Self::Surprised,
        Self::Angry,
        Self::Neutral,
        Self::Fearful,
        Self::Disgusted,
    ];

    /// Lowercase label name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Surprised => "surprised",
            Self::Angry => "angry",
            Self::Neutral => "neutral",
            Self::Fearful => "fearful",
            Self::Disgusted => "disgusted",
        }
    }

    /// Caption used when the caption service is unavailable
    #[must_use]
    pub fn fallback_caption(&self) -> &'static str {
        match self {
            Self::Happy => "WHEN THE TREAT JAR OPENS",
            Self::Sad => "no one came to my birthday party",
            Self::Surprised => "DID YOU JUST OPEN A CAN??",
            Self::Angry => "YOU'RE 5 MINUTES LATE WITH DINNER",
            Self::Neutral => "i have seen things you wouldn't believe",
            Self::Fearful => "THE VACUUM IS OUT",
            Self::Disgusted => "you call this... food?",
        }
    }

    /// Stock cat photo for this label
    #[must_use]
    pub fn default_background(&self) -> &'static str {
        match self {
            Self::Happy => "https://images.unsplash.com/photo-1574158622682-e40e69881006?w=800&q=80",
            Self::Sad => "https://images.unsplash.com/photo-1577023311546-cdc07a8454d9?w=800&q=80",
            Self::Surprised => "https://images.unsplash.com/photo-1518791841217-8f162f1e1131?w=800&q=80",
            Self::Angry => "https://images.unsplash.com/photo-1506755855567-92ff770e8d00?w=800&q=80",
            Self::Neutral => "https://images.unsplash.com/photo-1514888286974-6c03e2ca1dba?w=800&q=80",
            Self::Fearful => "https://images.unsplash.com/photo-1543852786-1cf6624b9987?w=800&q=80",
            Self::Disgusted => "https://images.unsplash.com/photo-1529778873920-4da4926a72c2?w=800&q=80",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label name outside the expression enumeration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown expression label: {0:?}")]
pub struct UnknownExpression(pub String);

impl FromStr for Expression {
    type Err = UnknownExpression;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| UnknownExpression(s.to_string()))
    }
}

/// Fallback caption for a free-form label name
///
/// Unrecognized names get [`DEFAULT_CAPTION`].
#[must_use]
pub fn fallback_caption_for(label: &str) -> &'static str {
    label
        .parse::<Expression>()
        .map_or(DEFAULT_CAPTION, |e| e.fallback_caption())
}

/// Where a background image comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    /// Fetched over HTTP(S)
    Remote(String),
    /// Read from disk
    Local(PathBuf),
}

impl Background {
    /// Classify a config string: `http://` / `https://` is remote, anything else a path
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Self::Remote(trimmed.to_string())
        } else {
            Self::Local(PathBuf::from(trimmed))
        }
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => f.write_str(url),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Label → background lookup with optional per-label overrides
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    overrides: HashMap<Expression, Background>,
}

impl Catalog {
    /// Catalog with the stock backgrounds only
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[backgrounds]` config table
    pub fn from_overrides(table: &HashMap<String, String>) -> Result<Self, UnknownExpression> {
        let mut catalog = Self::new();
        for (label, source) in table {
            let expression: Expression = label.parse()?;
            catalog = catalog.with_background(expression, Background::parse(source));
        }
        Ok(catalog)
    }

    /// Override one label's background
    #[must_use]
    pub fn with_background(mut self, expression: Expression, background: Background) -> Self {
        self.overrides.insert(expression, background);
        self
    }

    /// Background bound to `expression`
    #[must_use]
    pub fn background(&self, expression: Expression) -> Background {
        self.overrides
            .get(&expression)
            .cloned()
            .unwrap_or_else(|| Background::Remote(expression.default_background().to_string()))
    }
}
