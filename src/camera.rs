//! Camera acquisition
//!
//! A [`CameraDevice`] opens a live [`CameraStream`]; the session holds the
//! stream inside a [`CameraGuard`] so the device is released on every exit
//! path, including errors and early returns.
//!
//! [`FfmpegCamera`] drives a real webcam through ffmpeg:
//! - `v4l2` on Linux, `avfoundation` on macOS
//! - a long-running ffmpeg keeps overwriting a single JPEG frame file
//! - capturing reads the most recent frame
//! - stopping kills ffmpeg and removes the frame file

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// ffmpeg stderr lines kept for error reporting
const STDERR_TAIL_LINES: usize = 32;

/// Reads of a half-written frame before giving up
const FRAME_READ_ATTEMPTS: u32 = 5;

/// Failures acquiring an image from the user
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("camera unavailable: {0}")]
    Unavailable(String),

    #[error("no camera stream is active")]
    NotStreaming,

    #[error("frame capture failed: {0}")]
    Capture(String),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Something that can start a live video stream
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Human-readable device name
    fn name(&self) -> String;

    /// Start streaming
    async fn open(&self) -> Result<Box<dyn CameraStream>, AcquisitionError>;
}

/// A live, exclusively owned video stream
#[async_trait]
pub trait CameraStream: Send {
    /// Grab the current frame as encoded image bytes
    async fn capture_frame(&mut self) -> Result<Vec<u8>, AcquisitionError>;

    /// Release the device. Must be idempotent.
    fn stop(&mut self);
}

/// Owns a stream and stops it when dropped
pub struct CameraGuard {
    stream: Option<Box<dyn CameraStream>>,
}

impl CameraGuard {
    #[must_use]
    pub fn new(stream: Box<dyn CameraStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Grab one frame from the held stream
    pub async fn capture(&mut self) -> Result<Vec<u8>, AcquisitionError> {
        match self.stream.as_mut() {
            Some(stream) => stream.capture_frame().await,
            None => Err(AcquisitionError::NotStreaming),
        }
    }

    /// Stop the stream now instead of at drop
    pub fn release(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!("Camera stream released");
        }
    }
}

impl Drop for CameraGuard {
    fn drop(&mut self) {
        self.stop_inner();
    }
}

impl std::fmt::Debug for CameraGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraGuard")
            .field("live", &self.stream.is_some())
            .finish()
    }
}

/// Configuration for [`FfmpegCamera`]
#[derive(Debug, Clone)]
pub struct FfmpegCameraConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// ffmpeg input format (`v4l2`, `avfoundation`, `dshow`)
    pub input_format: String,
    /// Device identifier passed to `-i`
    pub device: String,
    /// Frames per second written to the frame file
    pub frame_rate: u32,
    /// Directory for the rolling frame file
    pub scratch_dir: PathBuf,
    /// How long to wait for the first frame before giving up
    pub startup_timeout: Duration,
}

impl Default for FfmpegCameraConfig {
    fn default() -> Self {
        #[cfg(target_os = "macos")]
        let (input_format, device) = ("avfoundation", "0");
        #[cfg(target_os = "windows")]
        let (input_format, device) = ("dshow", "video=Integrated Camera");
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let (input_format, device) = ("v4l2", "/dev/video0");

        Self {
            ffmpeg_path: which::which("ffmpeg").map_or_else(
                |_| "ffmpeg".to_string(),
                |p| p.to_string_lossy().to_string(),
            ),
            input_format: input_format.to_string(),
            device: device.to_string(),
            frame_rate: 5,
            scratch_dir: std::env::temp_dir().join("catemoji_camera"),
            startup_timeout: Duration::from_secs(5),
        }
    }
}

impl FfmpegCameraConfig {
    /// Use a specific device
    #[must_use]
    pub fn with_device(mut self, device: &str) -> Self {
        self.device = device.to_string();
        self
    }

    fn build_args(&self, frame_path: &std::path::Path) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-f"]
            .iter()
            .map(std::string::ToString::to_string)
            .collect();

        args.push(self.input_format.clone());

        if self.input_format == "avfoundation" {
            // avfoundation refuses to open without an explicit rate
            args.push("-framerate".to_string());
            args.push("30".to_string());
        }

        args.push("-i".to_string());
        args.push(self.device.clone());
        args.push("-vf".to_string());
        args.push(format!("fps={}", self.frame_rate.max(1)));
        args.push("-update".to_string());
        args.push("1".to_string());
        args.push("-q:v".to_string());
        args.push("2".to_string());
        args.push("-y".to_string());
        args.push(frame_path.to_string_lossy().to_string());

        args
    }
}

/// Webcam access through an ffmpeg subprocess
pub struct FfmpegCamera {
    config: FfmpegCameraConfig,
}

impl FfmpegCamera {
    #[must_use]
    pub fn new(config: FfmpegCameraConfig) -> Self {
        Self { config }
    }

    async fn ffmpeg_available(&self) -> bool {
        Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|s| s.success())
    }
}

impl Default for FfmpegCamera {
    fn default() -> Self {
        Self::new(FfmpegCameraConfig::default())
    }
}

#[async_trait]
impl CameraDevice for FfmpegCamera {
    fn name(&self) -> String {
        format!("{} ({})", self.config.device, self.config.input_format)
    }

    async fn open(&self) -> Result<Box<dyn CameraStream>, AcquisitionError> {
        if !self.ffmpeg_available().await {
            return Err(AcquisitionError::Unavailable(format!(
                "ffmpeg not found at {}",
                self.config.ffmpeg_path
            )));
        }

        if self.config.input_format == "v4l2"
            && !std::path::Path::new(&self.config.device).exists()
        {
            return Err(AcquisitionError::Unavailable(format!(
                "{} does not exist",
                self.config.device
            )));
        }

        tokio::fs::create_dir_all(&self.config.scratch_dir)
            .await
            .map_err(|e| AcquisitionError::Unavailable(e.to_string()))?;

        let frame_path = self
            .config
            .scratch_dir
            .join(format!("frame-{}.jpg", uuid::Uuid::new_v4()));
        let args = self.config.build_args(&frame_path);

        debug!("ffmpeg camera args: {:?}", args);

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AcquisitionError::Unavailable(e.to_string()))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AcquisitionError::Unavailable("failed to capture ffmpeg stderr".to_string()))?;
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr_task = spawn_stderr_reader(stderr, Arc::clone(&stderr_tail));

        let mut stream = FfmpegStream {
            child,
            frame_path,
            stderr_tail,
            stderr_task,
        };
        stream.wait_for_first_frame(self.config.startup_timeout).await?;

        info!(device = %self.config.device, "Camera streaming");
        Ok(Box::new(stream))
    }
}

/// Drain ffmpeg's stderr so it never blocks on a full pipe, keeping the last lines
fn spawn_stderr_reader(stderr: ChildStderr, tail: Arc<Mutex<VecDeque<String>>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if line.contains("Error") || line.contains("error") {
                warn!("ffmpeg: {}", line);
            }
            if let Ok(mut tail) = tail.lock() {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
    })
}

struct FfmpegStream {
    child: Child,
    frame_path: PathBuf,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    stderr_task: JoinHandle<()>,
}

impl FfmpegStream {
    async fn wait_for_first_frame(&mut self, timeout: Duration) -> Result<(), AcquisitionError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Ok(Some(status)) = self.child.try_wait() {
                // Let the reader reach EOF so the tail is complete
                let _ = tokio::time::timeout(Duration::from_millis(500), &mut self.stderr_task).await;
                let stderr = self.stderr_text();
                self.stop();
                return Err(classify_ffmpeg_failure(&stderr, &status.to_string()));
            }

            if tokio::fs::metadata(&self.frame_path)
                .await
                .is_ok_and(|m| m.len() > 0)
            {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                self.stop();
                return Err(AcquisitionError::Unavailable(
                    "camera produced no frames".to_string(),
                ));
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    fn stderr_text(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }
}

#[async_trait]
impl CameraStream for FfmpegStream {
    async fn capture_frame(&mut self) -> Result<Vec<u8>, AcquisitionError> {
        if let Ok(Some(status)) = self.child.try_wait() {
            return Err(AcquisitionError::Capture(format!(
                "ffmpeg exited with status: {status}"
            )));
        }

        // ffmpeg rewrites the file in place; retry a read that caught it mid-write
        for attempt in 1..=FRAME_READ_ATTEMPTS {
            let bytes = tokio::fs::read(&self.frame_path)
                .await
                .map_err(|source| AcquisitionError::Read {
                    path: self.frame_path.clone(),
                    source,
                })?;

            if is_complete_jpeg(&bytes) {
                debug!(bytes = bytes.len(), attempt, "Captured frame");
                return Ok(bytes);
            }

            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        Err(AcquisitionError::Capture("incomplete frame".to_string()))
    }

    fn stop(&mut self) {
        self.stderr_task.abort();
        if let Err(e) = self.child.start_kill() {
            // Already exited is the normal case after a failed start
            debug!("ffmpeg kill: {e}");
        }
        if let Err(e) = std::fs::remove_file(&self.frame_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {e}", self.frame_path.display());
            }
        }
    }
}

/// SOI at the start and EOI at the end
fn is_complete_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8]) && bytes.ends_with(&[0xFF, 0xD9])
}

fn classify_ffmpeg_failure(stderr: &str, status: &str) -> AcquisitionError {
    let lower = stderr.to_lowercase();
    if lower.contains("permission denied") || lower.contains("not authorized") {
        AcquisitionError::PermissionDenied(stderr.trim().to_string())
    } else if stderr.trim().is_empty() {
        AcquisitionError::Unavailable(format!("ffmpeg exited with status: {status}"))
    } else {
        AcquisitionError::Unavailable(stderr.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingStream {
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CameraStream for CountingStream {
        async fn capture_frame(&mut self) -> Result<Vec<u8>, AcquisitionError> {
            Ok(vec![0xFF, 0xD8, 0xFF])
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_guard_stops_on_drop() {
        let stops = Arc::new(AtomicUsize::new(0));
        {
            let _guard = CameraGuard::new(Box::new(CountingStream {
                stops: stops.clone(),
            }));
        }
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_release_stops_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let guard = CameraGuard::new(Box::new(CountingStream {
            stops: stops.clone(),
        }));
        guard.release();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_guard_capture() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut guard = CameraGuard::new(Box::new(CountingStream { stops }));
        assert_eq!(guard.capture().await.unwrap(), vec![0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_build_args_v4l2() {
        let config = FfmpegCameraConfig {
            input_format: "v4l2".to_string(),
            ..Default::default()
        }
        .with_device("/dev/video2");
        let args = config.build_args(std::path::Path::new("/tmp/frame.jpg"));

        assert!(args.windows(2).any(|w| w == ["-f", "v4l2"]));
        assert!(args.windows(2).any(|w| w == ["-i", "/dev/video2"]));
        assert!(args.windows(2).any(|w| w == ["-update", "1"]));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/frame.jpg"));
        assert!(!args.contains(&"-framerate".to_string()));
    }

    #[test]
    fn test_build_args_avfoundation_sets_framerate() {
        let config = FfmpegCameraConfig {
            input_format: "avfoundation".to_string(),
            ..Default::default()
        };
        let args = config.build_args(std::path::Path::new("/tmp/frame.jpg"));
        assert!(args.windows(2).any(|w| w == ["-framerate", "30"]));
    }

    #[test]
    fn test_classify_ffmpeg_failure() {
        assert!(matches!(
            classify_ffmpeg_failure("/dev/video0: Permission denied", "exit status: 1"),
            AcquisitionError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_ffmpeg_failure("", "exit status: 1"),
            AcquisitionError::Unavailable(_)
        ));
    }

    #[test]
    fn test_is_complete_jpeg() {
        assert!(is_complete_jpeg(&[0xFF, 0xD8, 0x00, 0x11, 0xFF, 0xD9]));
        assert!(!is_complete_jpeg(&[0xFF, 0xD8, 0x00, 0x11]));
        assert!(!is_complete_jpeg(b"\x89PNG\r\n\x1a\n"));
        assert!(!is_complete_jpeg(&[]));
    }

    /// Stand-in ffmpeg: answers `-version`, writes a frame, floods stderr,
    /// then writes a second frame and idles.
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &std::path::Path, stderr_bytes: usize) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = format!(
            r#"#!/bin/sh
if [ "$1" = "-version" ]; then exit 0; fi
for out; do :; done
printf '\377\330FRAME1\377\331' > "$out"
head -c {stderr_bytes} /dev/zero | tr '\000' 'x' >&2
echo >&2
echo "Error opening input: device busy" >&2
printf '\377\330FRAME2\377\331' > "$out.tmp" && mv "$out.tmp" "$out"
exec sleep 30
"#
        );
        let path = dir.join("ffmpeg");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    #[cfg(unix)]
    fn fake_camera(dir: &std::path::Path, ffmpeg_path: String) -> FfmpegCamera {
        FfmpegCamera::new(FfmpegCameraConfig {
            ffmpeg_path,
            input_format: "fake".to_string(),
            device: "cam0".to_string(),
            frame_rate: 5,
            scratch_dir: dir.join("scratch"),
            startup_timeout: Duration::from_secs(5),
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_chatty_ffmpeg_keeps_refreshing_frames() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(dir.path(), 200_000);
        let camera = fake_camera(dir.path(), ffmpeg);

        let mut stream = camera.open().await.unwrap();

        // The second frame only lands once ffmpeg's stderr has been drained
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut frame = stream.capture_frame().await.unwrap();
        while !frame.ends_with(b"FRAME2\xFF\xD9") && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
            frame = stream.capture_frame().await.unwrap();
        }
        stream.stop();

        assert!(frame.ends_with(b"FRAME2\xFF\xD9"), "stale frame: {frame:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ffmpeg_exit_reports_stderr_tail() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffmpeg");
        std::fs::write(
            &path,
            "#!/bin/sh\nif [ \"$1\" = \"-version\" ]; then exit 0; fi\necho 'cam0: Permission denied' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let camera = fake_camera(dir.path(), path.to_string_lossy().to_string());
        let err = camera.open().await.err().unwrap();
        assert!(
            matches!(&err, AcquisitionError::PermissionDenied(msg) if msg.contains("cam0")),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_unavailable() {
        let camera = FfmpegCamera::new(FfmpegCameraConfig {
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ..Default::default()
        });
        let err = camera.open().await.err().unwrap();
        assert!(matches!(err, AcquisitionError::Unavailable(_)));
    }
}
