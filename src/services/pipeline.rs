//! Video processing pipeline.
//!
//! One job turns one uploaded video into a deliverable per requested
//! platform: transcribe once, then fan out per platform (resize + subtitle
//! burn, then caption generation), then aggregate into a catalog record.
//! Completion is all-or-nothing: any platform failure voids the whole job.
//! The source file and the shared subtitle file are removed on every exit
//! path, and a failed job leaves no artifacts behind in the output directory.

use chrono::Utc;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::catalog::VideoCatalog;
use crate::constants::platform_spec;
use crate::models::{PlatformResult, UploadJob, VideoRecord, VideoStatus, display_name};
use crate::services::content::{ContentError, ContentGenerator};
use crate::services::render::{RenderError, Renderer};
use crate::services::transcribe::{Transcriber, TranscriptionError, TranscriptionResult};

const DEFAULT_RENDER_CONCURRENCY: usize = 4;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 600;

#[derive(Debug)]
pub enum PipelineError {
    /// Rejected before any stage ran; nothing to clean up
    Validation(String),
    Transcription(TranscriptionError),
    Render {
        platform: String,
        source: RenderError,
    },
    ContentGeneration {
        platform: String,
        source: ContentError,
    },
    /// The job exceeded its deadline
    Timeout(Duration),
    /// A fan-out task died without returning a result
    Internal(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Validation(msg) => write!(f, "{}", msg),
            PipelineError::Transcription(e) => write!(f, "{}", e),
            PipelineError::Render { platform, source } => {
                write!(f, "rendering for {} failed: {}", platform, source)
            }
            PipelineError::ContentGeneration { platform, source } => {
                write!(f, "content generation for {} failed: {}", platform, source)
            }
            PipelineError::Timeout(deadline) => {
                write!(f, "job exceeded the {}s deadline", deadline.as_secs())
            }
            PipelineError::Internal(msg) => write!(f, "internal pipeline error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Job lifecycle, for log lines; FAILED is reachable from any non-terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobStage {
    Received,
    Transcribing,
    RenderingAndGenerating,
    Aggregating,
    Completed,
    Failed,
}

/// Orchestrator over the injected transcription, render, content and
/// catalog capabilities
pub struct VideoPipeline {
    transcriber: Arc<dyn Transcriber>,
    renderer: Arc<dyn Renderer>,
    generator: Arc<dyn ContentGenerator>,
    catalog: Arc<dyn VideoCatalog>,
    output_dir: PathBuf,
    concurrency: usize,
    job_timeout: Duration,
}

impl VideoPipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        renderer: Arc<dyn Renderer>,
        generator: Arc<dyn ContentGenerator>,
        catalog: Arc<dyn VideoCatalog>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            transcriber,
            renderer,
            generator,
            catalog,
            output_dir,
            concurrency: render_concurrency(),
            job_timeout: Duration::from_secs(job_timeout_secs()),
        }
    }

    pub fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    /// Run one job end to end.
    ///
    /// Returns the appended record on full success. On any failure the first
    /// error surfaces, no record is stored, and every artifact this job
    /// produced is discarded.
    pub async fn process(&self, job: UploadJob) -> Result<VideoRecord, PipelineError> {
        self.log_stage(&job, JobStage::Received);

        if job.platforms.is_empty() {
            self.log_stage(&job, JobStage::Failed);
            return Err(PipelineError::Validation(
                "at least one target platform is required".to_string(),
            ));
        }

        // Everything past this point runs inside the cleanup scope: the
        // source file and (once produced) the subtitle file are released
        // when the job settles, however it settles.
        let mut scratch = ScratchFiles::new(job.source_path.clone());

        let outcome = match tokio::time::timeout(self.job_timeout, self.run(&job, &mut scratch))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(PipelineError::Timeout(self.job_timeout)),
        };

        scratch.remove_all().await;

        if let Err(ref e) = outcome {
            eprintln!("[pipeline] Job {} failed: {}", job.token, e);
            self.discard_outputs(&job.token).await;
            self.log_stage(&job, JobStage::Failed);
        }

        outcome
    }

    async fn run(
        &self,
        job: &UploadJob,
        scratch: &mut ScratchFiles,
    ) -> Result<VideoRecord, PipelineError> {
        self.log_stage(job, JobStage::Transcribing);
        let transcription = self
            .transcriber
            .transcribe(&job.source_path, &self.output_dir)
            .await
            .map_err(PipelineError::Transcription)?;
        scratch.subtitle_path = Some(transcription.subtitle_path.clone());

        self.log_stage(job, JobStage::RenderingAndGenerating);
        let transcription = Arc::new(transcription);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(usize, Result<PlatformResult, PipelineError>)> = JoinSet::new();

        for (index, platform) in job.platforms.iter().enumerate() {
            let renderer = Arc::clone(&self.renderer);
            let generator = Arc::clone(&self.generator);
            let transcription = Arc::clone(&transcription);
            let semaphore = Arc::clone(&semaphore);
            let platform = platform.clone();
            let source = job.source_path.clone();
            let output_dir = self.output_dir.clone();
            let token = job.token.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("render semaphore closed");
                let result = render_and_generate(
                    renderer.as_ref(),
                    generator.as_ref(),
                    &source,
                    &transcription,
                    &platform,
                    &output_dir,
                    &token,
                )
                .await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<PlatformResult>> = Vec::new();
        slots.resize_with(job.platforms.len(), || None);

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(result))) => {
                    slots[index] = Some(result);
                }
                Ok((_, Err(e))) => {
                    // First failure voids the job: cancel the siblings and
                    // drain them before surfacing the error.
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(e);
                }
                Err(join_err) => {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(PipelineError::Internal(format!(
                        "render task died: {}",
                        join_err
                    )));
                }
            }
        }

        self.log_stage(job, JobStage::Aggregating);
        let mut results: Vec<PlatformResult> = slots.into_iter().flatten().collect();
        // Aggregation order is by platform id, not completion order; the
        // sort is stable, so duplicate ids keep their request order.
        results.sort_by(|a, b| a.platform.cmp(&b.platform));

        let record = VideoRecord {
            id: Uuid::new_v4().to_string(),
            original_filename: job.original_filename.clone(),
            user_id: job.user_id.clone(),
            created_at: Utc::now(),
            status: VideoStatus::Completed,
            platforms: results,
        };

        self.catalog.append(&job.user_id, record.clone()).await;
        self.log_stage(job, JobStage::Completed);

        Ok(record)
    }

    /// Remove every file this job wrote to the shared output directory.
    ///
    /// Artifact filenames embed the upload token, so the sweep cannot touch
    /// concurrent jobs, and it also catches partials left by aborted tasks.
    async fn discard_outputs(&self, token: &str) {
        let mut entries = match tokio::fs::read_dir(&self.output_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                eprintln!("[pipeline] Failed to scan output dir for cleanup: {}", e);
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().contains(token) {
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    eprintln!(
                        "[pipeline] Failed to discard artifact {}: {}",
                        entry.path().display(),
                        e
                    );
                }
            }
        }
    }

    fn log_stage(&self, job: &UploadJob, stage: JobStage) {
        println!(
            "[pipeline] Job {} (user {}): {:?}",
            job.token, job.user_id, stage
        );
    }
}

/// Render then generate for one platform; the unit of the fan-out
async fn render_and_generate(
    renderer: &dyn Renderer,
    generator: &dyn ContentGenerator,
    source: &Path,
    transcription: &TranscriptionResult,
    platform: &str,
    output_dir: &Path,
    token: &str,
) -> Result<PlatformResult, PipelineError> {
    let spec = platform_spec(platform);
    let intermediate = output_dir.join(intermediate_filename(platform, token));
    let final_name = captioned_filename(platform, token);
    let dest = output_dir.join(&final_name);

    renderer
        .render(
            source,
            spec,
            &transcription.subtitle_path,
            &intermediate,
            &dest,
        )
        .await
        .map_err(|source| PipelineError::Render {
            platform: platform.to_string(),
            source,
        })?;

    let content = generator
        .generate(&transcription.transcript, platform)
        .await
        .map_err(|source| PipelineError::ContentGeneration {
            platform: platform.to_string(),
            source,
        })?;

    println!("[pipeline] Produced {} for {}", final_name, platform);

    Ok(PlatformResult {
        platform: platform.to_string(),
        name: display_name(platform),
        download_url: format!("/download/{}", final_name),
        preview_url: format!("/outputs/{}", final_name),
        filename: final_name,
        content,
        aspect_ratio: spec.aspect_ratio(),
        resolution: spec.resolution(),
    })
}

/// Pre-overlay transcode name; never outlives the job
pub fn intermediate_filename(platform: &str, token: &str) -> String {
    format!("{}-resized-{}.mp4", platform, token)
}

/// Final artifact name, deterministic from platform id and upload token
pub fn captioned_filename(platform: &str, token: &str) -> String {
    format!("captioned-{}-{}.mp4", platform, token)
}

/// Files tied to one job that must not survive it
struct ScratchFiles {
    source_path: PathBuf,
    subtitle_path: Option<PathBuf>,
}

impl ScratchFiles {
    fn new(source_path: PathBuf) -> Self {
        Self {
            source_path,
            subtitle_path: None,
        }
    }

    async fn remove_all(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.source_path).await {
            eprintln!(
                "[pipeline] Failed to cleanup source {}: {}",
                self.source_path.display(),
                e
            );
        }
        if let Some(subtitle) = &self.subtitle_path {
            if let Err(e) = tokio::fs::remove_file(subtitle).await {
                eprintln!(
                    "[pipeline] Failed to cleanup subtitle {}: {}",
                    subtitle.display(),
                    e
                );
            }
        }
    }
}

fn render_concurrency() -> usize {
    env::var("RENDER_CONCURRENCY")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_RENDER_CONCURRENCY)
}

fn job_timeout_secs() -> u64 {
    env::var("PIPELINE_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_JOB_TIMEOUT_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::models::{GeneratedContent, PlatformSpec};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTranscriber {
        calls: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    impl FakeTranscriber {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay: None,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::ok()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::ok()
            }
        }
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(
            &self,
            video_path: &Path,
            output_dir: &Path,
        ) -> Result<TranscriptionResult, TranscriptionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(TranscriptionError::Process("model load failed".to_string()));
            }

            let stem = video_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "input".to_string());
            let subtitle = output_dir.join(format!("{}.srt", stem));
            tokio::fs::write(&subtitle, "1\n00:00:00,000 --> 00:00:01,000\nhello\n")
                .await
                .unwrap();

            Ok(TranscriptionResult {
                transcript: "hello world".to_string(),
                subtitle_path: subtitle,
            })
        }
    }

    /// Writes an intermediate then a final file, mirroring the real staging;
    /// fails when the destination name contains the marker.
    struct FakeRenderer {
        fail_when_contains: Option<String>,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(
            &self,
            _source: &Path,
            _spec: PlatformSpec,
            _subtitle_path: &Path,
            intermediate_path: &Path,
            dest_path: &Path,
        ) -> Result<(), RenderError> {
            tokio::fs::write(intermediate_path, b"intermediate").await.unwrap();

            if let Some(marker) = &self.fail_when_contains {
                if dest_path.to_string_lossy().contains(marker.as_str()) {
                    let _ = tokio::fs::remove_file(intermediate_path).await;
                    return Err(RenderError::Resize("simulated encoder failure".to_string()));
                }
            }

            tokio::fs::write(dest_path, b"captioned video").await.unwrap();
            let _ = tokio::fs::remove_file(intermediate_path).await;
            Ok(())
        }
    }

    struct FakeGenerator {
        fail: bool,
    }

    #[async_trait]
    impl ContentGenerator for FakeGenerator {
        async fn generate(
            &self,
            _transcript: &str,
            platform: &str,
        ) -> Result<GeneratedContent, ContentError> {
            if self.fail {
                return Err(ContentError::Api("quota exceeded".to_string()));
            }
            Ok(GeneratedContent {
                caption: format!("caption for {}", platform),
                hashtags: vec!["#one".to_string(), "#two".to_string()],
            })
        }
    }

    struct TestEnv {
        root: PathBuf,
        output_dir: PathBuf,
    }

    impl TestEnv {
        async fn new() -> Self {
            let root =
                std::env::temp_dir().join(format!("reelforge_pipeline_{}", rand::random::<u64>()));
            let output_dir = root.join("outputs");
            tokio::fs::create_dir_all(&output_dir).await.unwrap();
            Self { root, output_dir }
        }

        async fn job(&self, platforms: &[&str]) -> UploadJob {
            let token = Uuid::new_v4().to_string();
            let source_path = self.root.join(format!("{}-clip.mp4", token));
            tokio::fs::write(&source_path, b"source video").await.unwrap();
            UploadJob {
                source_path,
                original_filename: "clip.mp4".to_string(),
                platforms: platforms.iter().map(|p| p.to_string()).collect(),
                user_id: "u1".to_string(),
                token,
            }
        }

        fn pipeline(
            &self,
            transcriber: FakeTranscriber,
            renderer: FakeRenderer,
            generator: FakeGenerator,
        ) -> (VideoPipeline, Arc<InMemoryCatalog>) {
            let catalog = Arc::new(InMemoryCatalog::new());
            let pipeline = VideoPipeline::new(
                Arc::new(transcriber),
                Arc::new(renderer),
                Arc::new(generator),
                catalog.clone(),
                self.output_dir.clone(),
            );
            (pipeline, catalog)
        }

        /// Output-dir filenames containing the given token
        async fn files_for_token(&self, token: &str) -> Vec<String> {
            let mut found = Vec::new();
            let mut entries = tokio::fs::read_dir(&self.output_dir).await.unwrap();
            while let Some(entry) = entries.next_entry().await.unwrap() {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.contains(token) {
                    found.push(name);
                }
            }
            found.sort();
            found
        }

        async fn teardown(self) {
            let _ = tokio::fs::remove_dir_all(&self.root).await;
        }
    }

    #[tokio::test]
    async fn test_success_appends_record_with_all_platforms() {
        let env = TestEnv::new().await;
        let (pipeline, catalog) = env.pipeline(
            FakeTranscriber::ok(),
            FakeRenderer {
                fail_when_contains: None,
            },
            FakeGenerator { fail: false },
        );

        let job = env.job(&["instagram", "youtube"]).await;
        let source_path = job.source_path.clone();
        let token = job.token.clone();

        let record = pipeline.process(job).await.unwrap();

        assert_eq!(record.status, VideoStatus::Completed);
        assert_eq!(record.platforms.len(), 2);
        assert_eq!(record.platforms[0].platform, "instagram");
        assert_eq!(record.platforms[0].resolution, "720x1280");
        assert_eq!(record.platforms[0].aspect_ratio, "720:1280");
        assert_eq!(record.platforms[1].platform, "youtube");
        assert_eq!(record.platforms[1].resolution, "1280x720");
        assert_eq!(record.platforms[1].aspect_ratio, "1280:720");
        assert!(record.platforms[0].content.caption.contains("instagram"));
        assert!(record.platforms[0].content.hashtags.len() <= 5);

        let listed = catalog.list("u1").await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, record.id);

        // Source and subtitle are gone; final artifacts, and nothing else,
        // remain for the token.
        assert!(!source_path.exists());
        assert_eq!(
            env.files_for_token(&token).await,
            vec![
                format!("captioned-instagram-{}.mp4", token),
                format!("captioned-youtube-{}.mp4", token),
            ]
        );

        env.teardown().await;
    }

    #[tokio::test]
    async fn test_render_failure_voids_whole_job() {
        let env = TestEnv::new().await;
        let (pipeline, catalog) = env.pipeline(
            FakeTranscriber::ok(),
            FakeRenderer {
                fail_when_contains: Some("youtube".to_string()),
            },
            FakeGenerator { fail: false },
        );

        let job = env.job(&["instagram", "youtube"]).await;
        let source_path = job.source_path.clone();
        let token = job.token.clone();

        let err = pipeline.process(job).await.unwrap_err();
        match err {
            PipelineError::Render { platform, .. } => assert_eq!(platform, "youtube"),
            other => panic!("expected render error, got {:?}", other),
        }

        // No record, no artifacts, no temp files.
        assert!(catalog.list("u1").await.is_empty());
        assert!(env.files_for_token(&token).await.is_empty());
        assert!(!source_path.exists());

        env.teardown().await;
    }

    #[tokio::test]
    async fn test_generation_failure_voids_whole_job() {
        let env = TestEnv::new().await;
        let (pipeline, catalog) = env.pipeline(
            FakeTranscriber::ok(),
            FakeRenderer {
                fail_when_contains: None,
            },
            FakeGenerator { fail: true },
        );

        let job = env.job(&["instagram"]).await;
        let token = job.token.clone();

        let err = pipeline.process(job).await.unwrap_err();
        assert!(matches!(err, PipelineError::ContentGeneration { .. }));
        assert!(catalog.list("u1").await.is_empty());
        assert!(env.files_for_token(&token).await.is_empty());

        env.teardown().await;
    }

    #[tokio::test]
    async fn test_transcription_failure_stops_the_job() {
        let env = TestEnv::new().await;
        let (pipeline, catalog) = env.pipeline(
            FakeTranscriber::failing(),
            FakeRenderer {
                fail_when_contains: None,
            },
            FakeGenerator { fail: false },
        );

        let job = env.job(&["instagram"]).await;
        let source_path = job.source_path.clone();

        let err = pipeline.process(job).await.unwrap_err();
        assert!(matches!(err, PipelineError::Transcription(_)));
        assert!(catalog.list("u1").await.is_empty());
        assert!(!source_path.exists());

        env.teardown().await;
    }

    #[tokio::test]
    async fn test_empty_platform_list_rejected_before_any_stage() {
        let env = TestEnv::new().await;
        let transcriber = FakeTranscriber::ok();
        let catalog = Arc::new(InMemoryCatalog::new());
        let transcriber = Arc::new(transcriber);
        let pipeline = VideoPipeline::new(
            transcriber.clone(),
            Arc::new(FakeRenderer {
                fail_when_contains: None,
            }),
            Arc::new(FakeGenerator { fail: false }),
            catalog.clone(),
            env.output_dir.clone(),
        );

        let job = env.job(&[]).await;
        let source_path = job.source_path.clone();

        let err = pipeline.process(job).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
        // Rejected pre-pipeline: the cleanup scope never ran.
        assert!(source_path.exists());

        env.teardown().await;
    }

    #[tokio::test]
    async fn test_unknown_platform_uses_square_fallback() {
        let env = TestEnv::new().await;
        let (pipeline, _) = env.pipeline(
            FakeTranscriber::ok(),
            FakeRenderer {
                fail_when_contains: None,
            },
            FakeGenerator { fail: false },
        );

        let record = pipeline.process(env.job(&["tiktok"]).await).await.unwrap();
        assert_eq!(record.platforms.len(), 1);
        assert_eq!(record.platforms[0].resolution, "720x720");
        assert_eq!(record.platforms[0].aspect_ratio, "720:720");

        env.teardown().await;
    }

    #[tokio::test]
    async fn test_duplicate_platforms_processed_independently() {
        let env = TestEnv::new().await;
        let (pipeline, _) = env.pipeline(
            FakeTranscriber::ok(),
            FakeRenderer {
                fail_when_contains: None,
            },
            FakeGenerator { fail: false },
        );

        let record = pipeline
            .process(env.job(&["instagram", "instagram"]).await)
            .await
            .unwrap();
        assert_eq!(record.platforms.len(), 2);
        assert!(record.platforms.iter().all(|p| p.platform == "instagram"));

        env.teardown().await;
    }

    #[tokio::test]
    async fn test_aggregation_is_ordered_by_platform_id() {
        let env = TestEnv::new().await;
        let (pipeline, _) = env.pipeline(
            FakeTranscriber::ok(),
            FakeRenderer {
                fail_when_contains: None,
            },
            FakeGenerator { fail: false },
        );

        let record = pipeline
            .process(env.job(&["youtube", "instagram", "facebook"]).await)
            .await
            .unwrap();
        let order: Vec<&str> = record
            .platforms
            .iter()
            .map(|p| p.platform.as_str())
            .collect();
        assert_eq!(order, vec!["facebook", "instagram", "youtube"]);

        env.teardown().await;
    }

    #[tokio::test]
    async fn test_deadline_expiry_fails_job_and_cleans_up() {
        let env = TestEnv::new().await;
        let (pipeline, catalog) = env.pipeline(
            FakeTranscriber::slow(Duration::from_secs(10)),
            FakeRenderer {
                fail_when_contains: None,
            },
            FakeGenerator { fail: false },
        );
        let pipeline = pipeline.with_job_timeout(Duration::from_millis(50));

        let job = env.job(&["instagram"]).await;
        let source_path = job.source_path.clone();
        let token = job.token.clone();

        let err = pipeline.process(job).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
        assert!(catalog.list("u1").await.is_empty());
        assert!(!source_path.exists());
        assert!(env.files_for_token(&token).await.is_empty());

        env.teardown().await;
    }
}
