//! Input resolution: which recording to analyze and what to call it
//!
//! The source identifier doubles as the YouTube video id when the recording
//! has to be downloaded.

use setscan_common::config::{InputConfig, YoutubeConfig};
use setscan_common::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

/// Identifier used when nothing else is available
pub const LOCAL_SOURCE_ID: &str = "local";

/// Determine the source identifier
///
/// **Priority:**
/// 1. Explicit override (CLI or config)
/// 2. `GITHUB_REF_NAME`, unless it is `main` or `master`
/// 3. Repository name from `GITHUB_REPOSITORY` (`owner/repo`)
/// 4. `"local"`
pub fn resolve_source_id(explicit: Option<&str>) -> String {
    if let Some(id) = explicit.map(str::trim).filter(|id| !id.is_empty()) {
        return id.to_string();
    }

    source_id_from_env(
        std::env::var("GITHUB_REF_NAME").ok().as_deref(),
        std::env::var("GITHUB_REPOSITORY").ok().as_deref(),
    )
}

fn source_id_from_env(ref_name: Option<&str>, repository: Option<&str>) -> String {
    if let Some(r) = ref_name.map(str::trim) {
        if !r.is_empty() && r != "main" && r != "master" {
            return r.to_string();
        }
    }

    if let Some(repo) = repository.map(str::trim) {
        if let Some((_, name)) = repo.rsplit_once('/') {
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }

    LOCAL_SOURCE_ID.to_string()
}

/// Resolve the audio file to analyze, downloading it when necessary
///
/// Uses the local file when `prefer_local` is set and it exists; otherwise
/// fetches `https://www.youtube.com/watch?v=<source_id>` with yt-dlp into
/// `input.audio_path`.
pub async fn resolve_audio_input(input: &InputConfig, source_id: &str) -> Result<PathBuf> {
    let audio_path = input.audio_path.clone();

    if input.prefer_local && audio_path.exists() {
        info!(path = %audio_path.display(), "Using local audio file");
        return Ok(audio_path);
    }

    if !input.youtube.enabled {
        return Err(Error::Config(format!(
            "No audio file at {} and YouTube input is disabled",
            audio_path.display()
        )));
    }

    download_audio(source_id, &audio_path, &input.youtube).await?;

    if !audio_path.exists() {
        return Err(Error::Audio(format!(
            "yt-dlp finished but {} was not found",
            audio_path.display()
        )));
    }

    Ok(audio_path)
}

/// Download audio for `video_id` with yt-dlp
async fn download_audio(video_id: &str, out_path: &Path, youtube: &YoutubeConfig) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let url = format!("https://www.youtube.com/watch?v={}", video_id);
    info!(url = %url, dest = %out_path.display(), "Downloading audio with yt-dlp");

    let output = Command::new("yt-dlp")
        .arg("-x")
        .arg("--audio-format")
        .arg(&youtube.audio_format)
        .arg("--audio-quality")
        .arg(youtube.audio_quality.to_string())
        .arg("-o")
        .arg(out_path)
        .arg(&url)
        .output()
        .await
        .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("Failed to run yt-dlp: {}", e))))?;

    if !output.status.success() {
        return Err(Error::Audio(format!(
            "yt-dlp failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}
