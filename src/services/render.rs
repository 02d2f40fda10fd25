//! Per-platform rendering: resize, then subtitle burn-in, via ffmpeg.
//!
//! Two ordered stages per platform: (a) transcode the source to the target
//! dimensions into an intermediate file, (b) overlay the subtitle track onto
//! the intermediate while copying the audio stream unchanged. The
//! intermediate never outlives the overlay stage, whatever the outcome.

use async_trait::async_trait;
use std::env;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::models::PlatformSpec;

#[derive(Debug)]
pub enum RenderError {
    /// The resize/transcode stage failed
    Resize(String),
    /// The subtitle overlay stage failed
    Overlay(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Resize(diag) => write!(f, "video resize failed: {}", diag),
            RenderError::Overlay(diag) => write!(f, "subtitle overlay failed: {}", diag),
        }
    }
}

impl std::error::Error for RenderError {}

/// One-platform render capability: source -> resized, captioned artifact
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `source` at `spec` dimensions with `subtitle_path` burned in,
    /// writing the final artifact to `dest_path`. `intermediate_path` holds
    /// the pre-overlay transcode and is deleted before this returns.
    async fn render(
        &self,
        source: &Path,
        spec: PlatformSpec,
        subtitle_path: &Path,
        intermediate_path: &Path,
        dest_path: &Path,
    ) -> Result<(), RenderError>;
}

/// Renderer shelling out to ffmpeg
pub struct FfmpegRenderer;

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(
        &self,
        source: &Path,
        spec: PlatformSpec,
        subtitle_path: &Path,
        intermediate_path: &Path,
        dest_path: &Path,
    ) -> Result<(), RenderError> {
        resize(source, spec, intermediate_path).await?;

        let result = burn_subtitles(intermediate_path, subtitle_path, spec, dest_path).await;

        // The intermediate is transient on every path, success or failure.
        if let Err(e) = tokio::fs::remove_file(intermediate_path).await {
            eprintln!(
                "[render] Failed to cleanup intermediate {}: {}",
                intermediate_path.display(),
                e
            );
        }

        result
    }
}

/// Stage a: transcode the source to the platform dimensions
async fn resize(source: &Path, spec: PlatformSpec, dest: &Path) -> Result<(), RenderError> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
    if let Some(threads) = ffmpeg_threads() {
        cmd.args(["-threads", &threads.to_string()]);
    }
    let output = cmd
        .arg("-i")
        .arg(source)
        .args(["-vf", &format!("scale={}:{}", spec.width, spec.height)])
        .args(["-preset", "fast"])
        .arg("-y")
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| RenderError::Resize(format!("failed to spawn ffmpeg: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let _ = tokio::fs::remove_file(dest).await;
        return Err(RenderError::Resize(stderr.trim().to_string()));
    }

    Ok(())
}

/// Stage b: burn the subtitle track in, copying audio unchanged
async fn burn_subtitles(
    source: &Path,
    subtitle_path: &Path,
    spec: PlatformSpec,
    dest: &Path,
) -> Result<(), RenderError> {
    let filter = subtitle_filter(subtitle_path, spec);

    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
    if let Some(threads) = ffmpeg_threads() {
        cmd.args(["-threads", &threads.to_string()]);
    }
    let output = cmd
        .arg("-i")
        .arg(source)
        .args(["-vf", &filter])
        .args(["-c:a", "copy"])
        .arg("-y")
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| RenderError::Overlay(format!("failed to spawn ffmpeg: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let _ = tokio::fs::remove_file(dest).await;
        return Err(RenderError::Overlay(stderr.trim().to_string()));
    }

    Ok(())
}

/// Build the subtitles filter expression for the overlay stage
fn subtitle_filter(subtitle_path: &Path, spec: PlatformSpec) -> String {
    format!(
        "subtitles='{}':original_size={}",
        escape_subtitle_path(subtitle_path),
        spec.resolution()
    )
}

/// Escape a path for ffmpeg's subtitles filter expression.
///
/// Backslashes become forward slashes and a colon after a leading drive
/// letter is escaped. An unescaped path silently corrupts the filter, so
/// this is load-bearing, not cosmetic.
fn escape_subtitle_path(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\\', "/");

    let bytes = escaped.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        format!("{}\\:{}", &escaped[..1], &escaped[2..])
    } else {
        escaped
    }
}

fn ffmpeg_threads() -> Option<usize> {
    env::var("FFMPEG_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v| *v > 0)
}
