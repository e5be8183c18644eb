use std::path::{Path, PathBuf};

use anyhow::Result;

use catemoji::Config;

use super::output::{finish, settle, spawn_progress};

pub async fn cmd_make(
    config: &Config,
    image: &Path,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let dir = output.unwrap_or_else(|| config.output_dir());

    eprintln!("🐱 Making a meme from: {}", image.display());
    eprintln!("   Output: {}", dir.display());

    let session = config.session()?;
    let compositor = config.compositor()?;
    let progress = spawn_progress(&session);

    let outcome = match session.upload_file(image).await {
        Ok(outcome) => outcome,
        Err(e) => {
            settle(session, progress).await;
            return Err(e.into());
        }
    };

    finish(session, progress, &compositor, outcome, &dir, json).await
}
