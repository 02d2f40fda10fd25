//! Upload intake and per-user video listing

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::models::{UploadJob, VideoRecord};
use crate::services::error::{ErrorBody, bad_request, pipeline_error_response};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/upload", post(upload_video))
        .route("/api/videos/{user_id}", get(list_videos))
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    message: String,
    video: VideoRecord,
}

#[derive(Serialize)]
struct VideoListResponse {
    success: bool,
    videos: Vec<VideoRecord>,
}

/// POST /upload - Run one video through the full pipeline
///
/// Multipart form: `video` (the file), `platforms` (JSON array of platform
/// ids), `userId`. Responds with the completed record, or one failure
/// indication; a failed job never returns partial artifact URLs.
async fn upload_video(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, Json<ErrorBody>)> {
    let mut video: Option<(String, Bytes)> = None;
    let mut platforms: Option<Vec<String>> = None;
    let mut user_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&format!("Invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("video") => {
                let filename = field.file_name().unwrap_or("upload.mp4").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(&format!("Failed to read upload: {}", e)))?;
                video = Some((filename, data));
            }
            Some("platforms") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(&format!("Failed to read platforms: {}", e)))?;
                platforms = serde_json::from_str(&text).ok();
            }
            Some("userId") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(&format!("Failed to read userId: {}", e)))?;
                user_id = Some(text);
            }
            _ => {}
        }
    }

    let (Some((original_filename, data)), Some(platforms), Some(user_id)) =
        (video, platforms, user_id.filter(|u| !u.is_empty()))
    else {
        return Err(bad_request("Missing required fields"));
    };

    // Unique token keeps concurrent jobs apart in the shared directories;
    // only the final path component of the client filename is trusted.
    let token = Uuid::new_v4().to_string();
    let safe_name = std::path::Path::new(&original_filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.mp4".to_string());
    let source_path = state.upload_dir.join(format!("{}-{}", token, safe_name));

    tokio::fs::write(&source_path, &data).await.map_err(|e| {
        eprintln!("[upload] Failed to store upload: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "Failed to store upload".to_string(),
                details: Some(e.to_string()),
            }),
        )
    })?;

    println!(
        "[upload] Processing {} for user {} -> {:?}",
        original_filename, user_id, platforms
    );

    let job = UploadJob {
        source_path,
        original_filename,
        platforms,
        user_id,
        token,
    };

    let record = state
        .pipeline
        .process(job)
        .await
        .map_err(pipeline_error_response)?;

    Ok(Json(UploadResponse {
        success: true,
        message: "Video processed successfully with subtitles burned per platform".to_string(),
        video: record,
    }))
}

/// GET /api/videos/{user_id} - Completed videos for a user, oldest first
async fn list_videos(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<VideoListResponse> {
    let videos = state.catalog.list(&user_id).await;
    Json(VideoListResponse {
        success: true,
        videos,
    })
}
