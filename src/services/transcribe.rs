//! Speech transcription via an external whisper process.
//!
//! The pipeline only depends on the `Transcriber` trait, so the subprocess
//! implementation can be swapped for an in-process model or a remote service.

use async_trait::async_trait;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

const DEFAULT_WHISPER_COMMAND: &str = "python3";
const DEFAULT_WHISPER_SCRIPT: &str = "whisper_script.py";

/// Transcript plus the subtitle file the transcription process wrote.
///
/// Produced once per job and shared read-only across the platform fan-out.
/// The subtitle file belongs to the caller, who must delete it.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    pub transcript: String,
    pub subtitle_path: PathBuf,
}

#[derive(Debug)]
pub enum TranscriptionError {
    /// The process could not be spawned at all
    Spawn(std::io::Error),
    /// The process exited non-zero; carries the captured stderr
    Process(String),
    /// The process exited zero but printed nothing usable
    NoOutput,
}

impl std::fmt::Display for TranscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptionError::Spawn(e) => {
                write!(f, "failed to spawn transcription process: {}", e)
            }
            TranscriptionError::Process(diag) => {
                write!(f, "transcription process failed: {}", diag)
            }
            TranscriptionError::NoOutput => {
                write!(f, "transcription process produced no usable output")
            }
        }
    }
}

impl std::error::Error for TranscriptionError {}

/// Speech-to-text capability: one call per job, before any rendering
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe `video_path`, writing the subtitle file into `output_dir`
    async fn transcribe(
        &self,
        video_path: &Path,
        output_dir: &Path,
    ) -> Result<TranscriptionResult, TranscriptionError>;
}

/// Subprocess transcriber running the whisper script.
///
/// Contract: invoked as `{command} {script} {video_path} {output_dir}`; on
/// success it prints the transcript followed by the subtitle file path as the
/// final stdout line, and exits 0. Diagnostics go to stderr.
pub struct WhisperTranscriber {
    command: String,
    script: PathBuf,
}

impl WhisperTranscriber {
    pub fn new(command: String, script: PathBuf) -> Self {
        Self { command, script }
    }

    /// Build from `WHISPER_COMMAND` / `WHISPER_SCRIPT` env vars
    pub fn from_env() -> Self {
        let command =
            env::var("WHISPER_COMMAND").unwrap_or_else(|_| DEFAULT_WHISPER_COMMAND.to_string());
        let script = env::var("WHISPER_SCRIPT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_WHISPER_SCRIPT));
        Self { command, script }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(
        &self,
        video_path: &Path,
        output_dir: &Path,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        let output = Command::new(&self.command)
            .arg(&self.script)
            .arg(video_path)
            .arg(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(TranscriptionError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscriptionError::Process(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_transcription_output(&stdout).ok_or(TranscriptionError::NoOutput)
    }
}

/// Split process stdout into (transcript, subtitle path).
///
/// All lines but the last form the transcript, newline-joined; the last line
/// is the subtitle file path. Empty stdout has no usable output.
fn parse_transcription_output(stdout: &str) -> Option<TranscriptionResult> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lines: Vec<&str> = trimmed.split('\n').collect();
    let (subtitle_line, transcript_lines) = lines.split_last()?;

    Some(TranscriptionResult {
        transcript: transcript_lines.join("\n"),
        subtitle_path: PathBuf::from(subtitle_line.trim()),
    })
}
