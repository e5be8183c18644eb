use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use catemoji::{CameraDevice, Config, FfmpegCamera, FfmpegCameraConfig};

use super::output::{finish, settle, spawn_progress};

pub async fn cmd_camera(
    config: &Config,
    device: Option<&str>,
    warmup_ms: u64,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let dir = output.unwrap_or_else(|| config.output_dir());

    let mut camera_config = FfmpegCameraConfig::default();
    if let Some(device) = device {
        camera_config = camera_config.with_device(device);
    }
    let camera = FfmpegCamera::new(camera_config);

    eprintln!("📸 Camera: {}", camera.name());
    eprintln!("   Output: {}", dir.display());

    let session = config.session()?;
    let compositor = config.compositor()?;
    let progress = spawn_progress(&session);

    let outcome = async {
        session
            .start_camera(&camera)
            .await
            .context("could not access the camera; check permissions or try uploading a file")?;

        if warmup_ms > 0 {
            tokio::time::sleep(Duration::from_millis(warmup_ms)).await;
        }

        eprintln!("   Smile!");
        Ok::<_, anyhow::Error>(session.capture().await?)
    }
    .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            settle(session, progress).await;
            return Err(e);
        }
    };

    finish(session, progress, &compositor, outcome, &dir, json).await
}
