//! Produced artifact serving: inline preview and forced download

use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/outputs/{filename}", get(preview_artifact))
        .route("/download/{filename}", get(download_artifact))
}

fn content_type_for(filename: &str) -> &'static str {
    if filename.ends_with(".mp4") {
        "video/mp4"
    } else if filename.ends_with(".webm") {
        "video/webm"
    } else if filename.ends_with(".mov") {
        "video/quicktime"
    } else {
        "application/octet-stream"
    }
}

/// Reject anything that could escape the output directory
fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains('\0')
}

/// GET /outputs/{filename} - Serve an artifact for inline preview
async fn preview_artifact(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let bytes = read_artifact(&state, &filename).await?;
    Ok((
        [(header::CONTENT_TYPE, content_type_for(&filename).to_string())],
        bytes,
    ))
}

/// GET /download/{filename} - Serve an artifact as a forced download
async fn download_artifact(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let bytes = read_artifact(&state, &filename).await?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                content_type_for(&filename).to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}

async fn read_artifact(state: &AppState, filename: &str) -> Result<Vec<u8>, StatusCode> {
    if !is_safe_filename(filename) {
        return Err(StatusCode::FORBIDDEN);
    }

    tokio::fs::read(state.output_dir.join(filename))
        .await
        .map_err(|_| StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type_for("captioned-youtube-abc.mp4"), "video/mp4");
        assert_eq!(content_type_for("clip.webm"), "video/webm");
        assert_eq!(content_type_for("clip.mov"), "video/quicktime");
        assert_eq!(content_type_for("notes.txt"), "application/octet-stream");
    }

    #[test]
    fn test_traversal_attempts_are_unsafe() {
        assert!(is_safe_filename("captioned-youtube-abc.mp4"));
        assert!(!is_safe_filename("../secrets.env"));
        assert!(!is_safe_filename("a/../../b.mp4"));
        assert!(!is_safe_filename("dir/clip.mp4"));
        assert!(!is_safe_filename("dir\\clip.mp4"));
        assert!(!is_safe_filename("clip\0.mp4"));
        assert!(!is_safe_filename(""));
    }
}
