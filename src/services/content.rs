//! AI caption and hashtag generation from a transcript.
//!
//! The generative service returns free-form text that usually, but not
//! reliably, contains a JSON object. Parsing degrades gracefully: a response
//! with no usable JSON becomes the caption verbatim. Only the service call
//! itself can fail.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::constants::MAX_HASHTAGS;
use crate::models::GeneratedContent;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug)]
pub enum ContentError {
    Http(reqwest::Error),
    Api(String),
}

impl From<reqwest::Error> for ContentError {
    fn from(e: reqwest::Error) -> Self {
        ContentError::Http(e)
    }
}

impl std::fmt::Display for ContentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentError::Http(e) => write!(f, "HTTP error: {}", e),
            ContentError::Api(s) => write!(f, "content service error: {}", s),
        }
    }
}

impl std::error::Error for ContentError {}

/// Caption/hashtag generation capability, one call per platform
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        transcript: &str,
        platform: &str,
    ) -> Result<GeneratedContent, ContentError>;
}

/// Gemini-backed content generator
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    http: Client,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            http: Client::new(),
        }
    }

    /// One prompt -> raw response text round trip
    async fn generate_text(&self, prompt: &str) -> Result<String, ContentError> {
        let url = format!("{}/{}:generateContent", GEMINI_BASE_URL, self.model);

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(ContentError::Api(text));
        }

        let wrapper: GenerateContentResponse = resp.json().await?;
        let text: String = wrapper
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ContentError::Api("response carried no candidate text".into()));
        }

        Ok(text)
    }
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate(
        &self,
        transcript: &str,
        platform: &str,
    ) -> Result<GeneratedContent, ContentError> {
        let prompt = build_prompt(transcript, platform);
        let raw = self.generate_text(&prompt).await?;
        Ok(parse_generated_content(&raw))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Instruction asking for a two-field JSON result for one platform
fn build_prompt(transcript: &str, platform: &str) -> String {
    format!(
        r#"You are a social media content generator.
Generate a JSON object with two properties:
- "caption": a short caption (max 100 words)
- "hashtags": an array of 5 trending hashtags for platform "{}"

Video transcript: """{}"""
Respond ONLY with JSON.
"#,
        platform, transcript
    )
}

/// Extract caption/hashtags from the raw model response.
///
/// Three stages: strict decode of the whole payload; decode of the substring
/// from the first `{` through the last `}`; raw-text fallback with the whole
/// trimmed response as the caption and no hashtags. Hashtag lists are capped
/// at `MAX_HASHTAGS`.
fn parse_generated_content(raw: &str) -> GeneratedContent {
    let trimmed = raw.trim();

    if let Ok(content) = serde_json::from_str::<GeneratedContent>(trimmed) {
        return cap_hashtags(content);
    }

    if let Some(embedded) = find_json_object(trimmed) {
        if let Ok(content) = serde_json::from_str::<GeneratedContent>(embedded) {
            return cap_hashtags(content);
        }
    }

    GeneratedContent {
        caption: trimmed.to_string(),
        hashtags: Vec::new(),
    }
}

/// The first `{`-to-last-`}` span, if any
fn find_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn cap_hashtags(mut content: GeneratedContent) -> GeneratedContent {
    content.hashtags.truncate(MAX_HASHTAGS);
    content
}
