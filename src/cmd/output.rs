use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use catemoji::{CameraStatus, Compositor, CycleOutcome, PhaseKind, Session, SessionEvent};

/// Print session events to stderr until every `Session` clone is dropped
pub fn spawn_progress(session: &Session) -> JoinHandle<()> {
    let mut events = session.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::PhaseChanged { phase, .. } => match phase {
            PhaseKind::Detecting => eprintln!("🔍 Detecting expression..."),
            PhaseKind::Generating => eprintln!("✍️  Writing caption..."),
            PhaseKind::Complete => eprintln!("✅ Meme ready"),
            PhaseKind::Upload => eprintln!("↩️  Back to upload"),
        },
        SessionEvent::CameraChanged { status } => match status {
            CameraStatus::Streaming => eprintln!("📷 Camera on"),
            CameraStatus::Idle => eprintln!("📷 Camera off"),
        },
    }
}

/// Drop the session and wait for its remaining progress lines
pub async fn settle(session: Session, progress: JoinHandle<()>) {
    drop(session);
    let _ = progress.await;
}

/// Render a finished cycle into `dir` and report it
pub async fn finish(
    session: Session,
    progress: JoinHandle<()>,
    compositor: &Compositor,
    outcome: CycleOutcome,
    dir: &Path,
    json: bool,
) -> Result<()> {
    let meme = match outcome {
        CycleOutcome::Completed(meme) => meme,
        CycleOutcome::Abandoned { generation } => {
            settle(session, progress).await;
            bail!("session restarted (generation {generation}) before the meme was finished")
        }
    };

    let saved = session
        .download_to(compositor, dir)
        .await
        .context("failed to render meme");

    settle(session, progress).await;
    let path: PathBuf = saved?;

    if json {
        let summary = json!({
            "expression": meme.expression,
            "caption": meme.caption,
            "background": meme.background.to_string(),
            "file": path,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        eprintln!("\n😺 Expression: {}", meme.expression);
        eprintln!("   Caption: {}", meme.caption);
        eprintln!("💾 Saved to {}", path.display());
        println!("{}", path.display());
    }

    Ok(())
}
