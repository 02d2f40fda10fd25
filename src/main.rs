mod catalog;
mod constants;
mod models;
mod routes;
mod services;

use axum::extract::DefaultBodyLimit;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use catalog::{InMemoryCatalog, VideoCatalog};
use constants::MAX_VIDEO_UPLOAD_SIZE;
use services::content::GeminiClient;
use services::pipeline::VideoPipeline;
use services::render::FfmpegRenderer;
use services::transcribe::WhisperTranscriber;

pub struct AppState {
    pub pipeline: VideoPipeline,
    pub catalog: Arc<dyn VideoCatalog>,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    let upload_dir =
        PathBuf::from(std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()));
    let output_dir =
        PathBuf::from(std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "outputs".to_string()));
    std::fs::create_dir_all(&upload_dir).expect("Failed to create upload directory");
    std::fs::create_dir_all(&output_dir).expect("Failed to create output directory");
    println!("Serving videos from directory: {}", output_dir.display());

    let gemini_api_key = std::env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY must be set");
    let gemini_model =
        std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());
    let gemini = GeminiClient::new(&gemini_api_key, &gemini_model);

    let catalog: Arc<dyn VideoCatalog> = Arc::new(InMemoryCatalog::new());
    let pipeline = VideoPipeline::new(
        Arc::new(WhisperTranscriber::from_env()),
        Arc::new(FfmpegRenderer),
        Arc::new(gemini),
        catalog.clone(),
        output_dir.clone(),
    );

    let state = Arc::new(AppState {
        pipeline,
        catalog,
        upload_dir,
        output_dir,
    });

    let app = routes::build_routes()
        .layer(DefaultBodyLimit::max(MAX_VIDEO_UPLOAD_SIZE))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "5000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", addr, e));

    println!("Listening on http://{}", addr);
    axum::serve(listener, app).await.expect("Server failed");
}
