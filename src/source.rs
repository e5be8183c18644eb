//! The user's captured photo, normalized from either input path

use bytes::Bytes;
use std::path::{Path, PathBuf};

/// How the photo entered the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOrigin {
    /// Picked from disk
    File { path: PathBuf },
    /// Grabbed from a live camera stream
    Camera,
}

/// Encoded image bytes plus their origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    bytes: Bytes,
    origin: ImageOrigin,
}

impl SourceImage {
    pub fn new(bytes: impl Into<Bytes>, origin: ImageOrigin) -> Self {
        Self {
            bytes: bytes.into(),
            origin,
        }
    }

    pub fn from_file(path: impl AsRef<Path>, bytes: impl Into<Bytes>) -> Self {
        Self::new(
            bytes,
            ImageOrigin::File {
                path: path.as_ref().to_path_buf(),
            },
        )
    }

    pub fn from_camera(bytes: impl Into<Bytes>) -> Self {
        Self::new(bytes, ImageOrigin::Camera)
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn origin(&self) -> &ImageOrigin {
        &self.origin
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Detected encoding, if the bytes look like a known image format
    #[must_use]
    pub fn format(&self) -> Option<image::ImageFormat> {
        image::guess_format(&self.bytes).ok()
    }
}
