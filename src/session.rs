//! Single-user meme session
//!
//! Drives one interaction through its phases:
//!
//! ```text
//! upload ──image──▶ detecting ──label──▶ generating ──caption──▶ complete
//!    ▲                                                              │
//!    └──────────────────────────── restart ◀────────────────────────┘
//! ```
//!
//! The camera sub-state (`Idle` / `Streaming`) only exists while in
//! `upload`. Classifier and caption calls run without holding the session
//! lock; each result is checked against the generation it was started in
//! and dropped if a restart happened meanwhile.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::camera::{AcquisitionError, CameraDevice, CameraGuard};
use crate::caption::CaptionProvider;
use crate::classify::{ClassificationError, ExpressionClassifier};
use crate::compose::{ComposedMeme, CompositionError, Compositor};
use crate::expression::{Background, Catalog, Expression};
use crate::source::SourceImage;

/// User-visible session failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error("cannot {action} while {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: PhaseKind,
    },

    /// The session was restarted before the operation could finish
    #[error("session restarted before it could {action}")]
    Superseded { action: &'static str },
}

/// Phase name without its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Upload,
    Detecting,
    Generating,
    Complete,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upload => "upload",
            Self::Detecting => "detecting",
            Self::Generating => "generating",
            Self::Complete => "complete",
        })
    }
}

/// Everything a finished cycle produced
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedMeme {
    pub source: SourceImage,
    pub expression: Expression,
    pub background: Background,
    pub caption: String,
}

/// Session phase with the data valid in it
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Phase {
    #[default]
    Upload,
    Detecting {
        source: SourceImage,
    },
    Generating {
        source: SourceImage,
        expression: Expression,
        background: Background,
    },
    Complete(CompletedMeme),
}

impl Phase {
    #[must_use]
    pub fn kind(&self) -> PhaseKind {
        match self {
            Self::Upload => PhaseKind::Upload,
            Self::Detecting { .. } => PhaseKind::Detecting,
            Self::Generating { .. } => PhaseKind::Generating,
            Self::Complete(_) => PhaseKind::Complete,
        }
    }

    /// The user's photo, if one is held
    #[must_use]
    pub fn source(&self) -> Option<&SourceImage> {
        match self {
            Self::Upload => None,
            Self::Detecting { source } | Self::Generating { source, .. } => Some(source),
            Self::Complete(meme) => Some(&meme.source),
        }
    }

    #[must_use]
    pub fn expression(&self) -> Option<Expression> {
        match self {
            Self::Generating { expression, .. } => Some(*expression),
            Self::Complete(meme) => Some(meme.expression),
            _ => None,
        }
    }
}

/// Camera sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Idle,
    Streaming,
}

/// Broadcast on every state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PhaseChanged { generation: u64, phase: PhaseKind },
    CameraChanged { status: CameraStatus },
}

/// How a submitted cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Reached `complete`
    Completed(CompletedMeme),
    /// The session was restarted while this cycle was in flight
    Abandoned { generation: u64 },
}

#[derive(Debug, Default)]
struct State {
    generation: u64,
    phase: Phase,
    camera: Option<CameraGuard>,
}

/// The meme session and its collaborators
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<State>>,
    events: broadcast::Sender<SessionEvent>,
    classifier: Arc<dyn ExpressionClassifier>,
    captions: Arc<dyn CaptionProvider>,
    catalog: Arc<Catalog>,
}

impl Session {
    pub fn new(
        classifier: Arc<dyn ExpressionClassifier>,
        captions: Arc<dyn CaptionProvider>,
        catalog: Catalog,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            events,
            classifier,
            captions,
            catalog: Arc::new(catalog),
        }
    }

    /// Receive every subsequent [`SessionEvent`]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn phase(&self) -> PhaseKind {
        self.state.lock().await.phase.kind()
    }

    /// Copy of the current phase and its data
    pub async fn snapshot(&self) -> Phase {
        self.state.lock().await.phase.clone()
    }

    /// Bumped on every restart
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    pub async fn camera_status(&self) -> CameraStatus {
        if self.state.lock().await.camera.is_some() {
            CameraStatus::Streaming
        } else {
            CameraStatus::Idle
        }
    }

    /// Start streaming from `device`. No-op if a stream is already live.
    ///
    /// Fails with [`SessionError::Superseded`] if the session restarted while
    /// the device was opening; the stream is released in that case.
    pub async fn start_camera(&self, device: &dyn CameraDevice) -> Result<(), SessionError> {
        let generation = {
            let state = self.state.lock().await;
            ensure_upload(&state, "start the camera")?;
            if state.camera.is_some() {
                return Ok(());
            }
            state.generation
        };

        let stream = device.open().await.inspect_err(|e| {
            warn!("Could not access camera {}: {e}", device.name());
        })?;
        let guard = CameraGuard::new(stream);

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!("Session moved on while the camera was opening");
            guard.release();
            return Err(SessionError::Superseded {
                action: "start the camera",
            });
        }
        if state.camera.is_some() {
            guard.release();
            return Ok(());
        }
        if let Err(e) = ensure_upload(&state, "start the camera") {
            guard.release();
            return Err(e);
        }

        state.camera = Some(guard);
        self.emit(SessionEvent::CameraChanged {
            status: CameraStatus::Streaming,
        });
        info!(device = %device.name(), "Camera started");
        Ok(())
    }

    /// Abort camera use. Returns whether a stream was live.
    pub async fn stop_camera(&self) -> bool {
        let mut state = self.state.lock().await;
        self.release_camera(&mut state)
    }

    /// Take a photo from the live stream and run a full cycle with it
    ///
    /// The stream is stopped before the session enters `detecting`,
    /// whether or not the frame grab succeeded.
    pub async fn capture(&self) -> Result<CycleOutcome, SessionError> {
        let mut camera = {
            let mut state = self.state.lock().await;
            ensure_upload(&state, "capture")?;
            let camera = state.camera.take().ok_or(AcquisitionError::NotStreaming)?;
            self.emit(SessionEvent::CameraChanged {
                status: CameraStatus::Idle,
            });
            camera
        };

        let frame = camera.capture().await;
        camera.release();

        self.submit(SourceImage::from_camera(frame?)).await
    }

    /// Read a photo from disk and run a full cycle with it
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<CycleOutcome, SessionError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| AcquisitionError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        self.submit(SourceImage::from_file(path, bytes)).await
    }

    /// Run classification and captioning for `source`
    ///
    /// Only accepted in `upload`, so at most one cycle is in flight.
    #[instrument(skip_all, fields(bytes = source.len()))]
    pub async fn submit(&self, source: SourceImage) -> Result<CycleOutcome, SessionError> {
        let generation = {
            let mut state = self.state.lock().await;
            ensure_upload(&state, "submit an image")?;
            self.release_camera(&mut state);
            self.transition(
                &mut state,
                Phase::Detecting {
                    source: source.clone(),
                },
            );
            state.generation
        };

        let classified = self.classifier.classify(&source).await;

        let (expression, background) = {
            let mut state = self.state.lock().await;
            if state.generation != generation {
                debug!(generation, "Discarding stale classification");
                return Ok(CycleOutcome::Abandoned { generation });
            }

            match classified {
                Ok(expression) => {
                    let background = self.catalog.background(expression);
                    self.transition(
                        &mut state,
                        Phase::Generating {
                            source: source.clone(),
                            expression,
                            background: background.clone(),
                        },
                    );
                    (expression, background)
                }
                Err(e) => {
                    warn!(classifier = self.classifier.name(), "Classification failed: {e}");
                    self.transition(&mut state, Phase::Upload);
                    return Err(e.into());
                }
            }
        };

        let caption = self.captions.caption(expression).await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(generation, "Discarding stale caption");
            return Ok(CycleOutcome::Abandoned { generation });
        }

        let meme = CompletedMeme {
            source,
            expression,
            background,
            caption,
        };
        self.transition(&mut state, Phase::Complete(meme.clone()));
        Ok(CycleOutcome::Completed(meme))
    }

    /// Render the finished meme. Leaves the session untouched.
    pub async fn download(&self, compositor: &Compositor) -> Result<ComposedMeme, SessionError> {
        let (background, caption) = {
            let state = self.state.lock().await;
            match &state.phase {
                Phase::Complete(meme) => (meme.background.clone(), meme.caption.clone()),
                other => {
                    return Err(SessionError::InvalidPhase {
                        action: "download",
                        phase: other.kind(),
                    })
                }
            }
        };

        Ok(compositor.compose(&background, &caption).await?)
    }

    /// [`download`](Self::download) and save into `dir`
    pub async fn download_to(&self, compositor: &Compositor, dir: &Path) -> Result<PathBuf, SessionError> {
        let meme = self.download(compositor).await?;
        Ok(meme.save_in(dir).await?)
    }

    /// Back to `upload` with everything cleared
    ///
    /// Any in-flight classifier or caption result is ignored when it lands.
    pub async fn restart(&self) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        self.release_camera(&mut state);
        self.transition(&mut state, Phase::Upload);
    }

    fn transition(&self, state: &mut State, phase: Phase) {
        let kind = phase.kind();
        state.phase = phase;
        info!(generation = state.generation, phase = %kind, "Session phase");
        self.emit(SessionEvent::PhaseChanged {
            generation: state.generation,
            phase: kind,
        });
    }

    fn release_camera(&self, state: &mut State) -> bool {
        match state.camera.take() {
            Some(camera) => {
                camera.release();
                self.emit(SessionEvent::CameraChanged {
                    status: CameraStatus::Idle,
                });
                true
            }
            None => false,
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn ensure_upload(state: &State, action: &'static str) -> Result<(), SessionError> {
    match state.phase.kind() {
        PhaseKind::Upload => Ok(()),
        phase => Err(SessionError::InvalidPhase { action, phase }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::FallbackCaptions;
    use async_trait::async_trait;

    struct Fixed(Expression);

    #[async_trait]
    impl ExpressionClassifier for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn classify(&self, image: &SourceImage) -> Result<Expression, ClassificationError> {
            crate::classify::validate(image)?;
            Ok(self.0)
        }
    }

    fn session(expression: Expression) -> Session {
        Session::new(
            Arc::new(Fixed(expression)),
            Arc::new(FallbackCaptions),
            Catalog::new(),
        )
    }

    fn png() -> SourceImage {
        SourceImage::from_camera(&b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"[..])
    }

    #[tokio::test]
    async fn test_starts_in_upload() {
        let session = session(Expression::Happy);
        assert_eq!(session.phase().await, PhaseKind::Upload);
        assert_eq!(session.camera_status().await, CameraStatus::Idle);
        assert_eq!(session.generation().await, 0);
    }

    #[tokio::test]
    async fn test_submit_rejected_outside_upload() {
        let session = session(Expression::Sad);
        session.submit(png()).await.unwrap();

        let err = session.submit(png()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidPhase {
                phase: PhaseKind::Complete,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_download_requires_complete() {
        let session = session(Expression::Sad);
        let compositor = Compositor::new().unwrap();
        let err = session.download(&compositor).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidPhase {
                action: "download",
                phase: PhaseKind::Upload
            }
        ));
    }

    #[tokio::test]
    async fn test_capture_without_stream() {
        let session = session(Expression::Sad);
        let err = session.capture().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Acquisition(AcquisitionError::NotStreaming)
        ));
        assert_eq!(session.phase().await, PhaseKind::Upload);
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let session = session(Expression::Sad);
        let err = session.upload_file("/nonexistent/face.jpg").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Acquisition(AcquisitionError::Read { .. })
        ));
        assert_eq!(session.phase().await, PhaseKind::Upload);
    }

    #[tokio::test]
    async fn test_restart_clears_and_bumps_generation() {
        let session = session(Expression::Neutral);
        session.submit(png()).await.unwrap();
        assert_eq!(session.phase().await, PhaseKind::Complete);

        session.restart().await;
        assert_eq!(session.snapshot().await, Phase::Upload);
        assert_eq!(session.generation().await, 1);
    }

    #[test]
    fn test_phase_accessors() {
        let meme = CompletedMeme {
            source: png(),
            expression: Expression::Angry,
            background: Background::Remote("https://x/cat.jpg".to_string()),
            caption: "hi".to_string(),
        };
        let phase = Phase::Complete(meme);
        assert_eq!(phase.kind(), PhaseKind::Complete);
        assert_eq!(phase.expression(), Some(Expression::Angry));
        assert!(phase.source().is_some());
        assert_eq!(Phase::Upload.source(), None);
    }
}
