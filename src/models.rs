//! Shared data models used across modules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Target output dimensions for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformSpec {
    pub width: u32,
    pub height: u32,
}

impl PlatformSpec {
    /// Resolution string in ffmpeg's WxH form, e.g. "720x1280"
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Aspect ratio string, e.g. "720:1280"
    pub fn aspect_ratio(&self) -> String {
        format!("{}:{}", self.width, self.height)
    }
}

/// One accepted upload waiting to be processed.
///
/// Created at request receipt and consumed by the pipeline; the source file
/// is removed unconditionally when the job ends.
#[derive(Debug, Clone)]
pub struct UploadJob {
    /// Saved source video on disk
    pub source_path: PathBuf,
    /// Filename as the user uploaded it
    pub original_filename: String,
    /// Requested platform ids; duplicates are processed independently
    pub platforms: Vec<String>,
    /// Owning user, trusted as given
    pub user_id: String,
    /// Per-upload unique token embedded in every artifact filename
    pub token: String,
}

/// Caption and hashtags produced by the content service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    /// Missing fields in an otherwise-parseable object degrade to empty
    /// values rather than failing the parse.
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

/// One finished platform deliverable within a video record
#[derive(Debug, Clone, Serialize)]
pub struct PlatformResult {
    /// Platform id as requested
    pub platform: String,
    /// Display name (platform id with the first letter upper-cased)
    pub name: String,
    /// Final captioned artifact filename in the output directory
    pub filename: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
    #[serde(rename = "previewUrl")]
    pub preview_url: String,
    #[serde(flatten)]
    pub content: GeneratedContent,
    #[serde(rename = "aspectRatio")]
    pub aspect_ratio: String,
    pub resolution: String,
}

/// Lifecycle status stored on a video record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Completed,
}

/// Aggregate result of one fully successful job.
///
/// Only ever created when every requested platform succeeded; append-only
/// once inserted into the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct VideoRecord {
    pub id: String,
    #[serde(rename = "originalFilename")]
    pub original_filename: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub status: VideoStatus,
    pub platforms: Vec<PlatformResult>,
}

/// Display name for a platform id, e.g. "instagram" -> "Instagram"
pub fn display_name(platform: &str) -> String {
    let mut chars = platform.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
