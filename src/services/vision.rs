use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::models::analysis::{
    AnalysisResult, BoundingBox, DenseCaption, DetectedObject, ImageTag,
};

/// Tags below this confidence are dropped from results.
const MIN_TAG_CONFIDENCE: f64 = 0.5;

/// The external visual-analysis capability.
///
/// Implementations take raw image bytes, honor the cancellation token, and
/// either return a populated result or an error. Every error is treated as
/// retryable by the pipeline's retry policy.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        image: &[u8],
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, VisionError>;
}

/// Configuration for the Azure AI Vision adapter.
#[derive(Debug, Clone)]
pub struct VisionOptions {
    /// Azure AI Vision endpoint URL.
    pub endpoint: String,
    /// Azure AI Vision API key.
    pub api_key: String,
    /// Client-side timeout for each analysis request.
    pub request_timeout: Duration,
    pub include_dense_captions: bool,
    pub include_objects: bool,
    pub include_text: bool,
    pub include_tags: bool,
}

impl Default for VisionOptions {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(30),
            include_dense_captions: true,
            include_objects: true,
            include_text: true,
            include_tags: true,
        }
    }
}

/// Client for the Azure AI Vision Image Analysis 4.0 REST API.
pub struct AzureVisionClient {
    http: reqwest::Client,
    options: VisionOptions,
}

impl AzureVisionClient {
    pub fn new(options: VisionOptions) -> Result<Self, VisionError> {
        if options.endpoint.trim().is_empty() {
            return Err(VisionError::Config("vision endpoint is required".into()));
        }
        if options.api_key.trim().is_empty() {
            return Err(VisionError::Config("vision API key is required".into()));
        }
        reqwest::Url::parse(&options.endpoint)
            .map_err(|_| VisionError::Config("vision endpoint must be a valid URL".into()))?;

        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(VisionError::Http)?;

        Ok(Self { http, options })
    }

    /// Feature list for the `features` query parameter, driven by the
    /// configured facet toggles. Caption is always requested.
    fn features(&self) -> String {
        let mut features = vec!["caption"];
        if self.options.include_dense_captions {
            features.push("denseCaptions");
        }
        if self.options.include_objects {
            features.push("objects");
        }
        if self.options.include_text {
            features.push("read");
        }
        if self.options.include_tags {
            features.push("tags");
        }
        features.join(",")
    }
}

#[async_trait]
impl VisionAnalyzer for AzureVisionClient {
    async fn analyze(
        &self,
        image: &[u8],
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, VisionError> {
        let url = format!(
            "{}/computervision/imageanalysis:analyze?api-version=2024-02-01&features={}&gender-neutral-caption=true",
            self.options.endpoint.trim_end_matches('/'),
            self.features(),
        );

        let started = std::time::Instant::now();
        let request = self
            .http
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", &self.options.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(VisionError::Cancelled),
            response = request => response.map_err(VisionError::Http)?,
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(VisionError::Api { status, message });
        }

        let body: AnalyzeResponse = response.json().await.map_err(VisionError::Http)?;

        let mut result = to_analysis_result(body);
        result.processing_time_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vision API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("analysis was cancelled")]
    Cancelled,

    #[error("vision configuration error: {0}")]
    Config(String),
}

// ── Image Analysis 4.0 response shape ───────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    caption_result: Option<CaptionResult>,
    dense_captions_result: Option<DenseCaptionsResult>,
    objects_result: Option<ObjectsResult>,
    tags_result: Option<TagsResult>,
    read_result: Option<ReadResult>,
}

#[derive(Debug, Deserialize)]
struct CaptionResult {
    text: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct DenseCaptionsResult {
    values: Vec<CaptionResult>,
}

#[derive(Debug, Deserialize)]
struct ObjectsResult {
    values: Vec<ObjectValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectValue {
    #[serde(default)]
    bounding_box: Option<BoundingBoxValue>,
    #[serde(default)]
    tags: Vec<TagValue>,
}

#[derive(Debug, Deserialize)]
struct BoundingBoxValue {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

#[derive(Debug, Deserialize)]
struct TagsResult {
    values: Vec<TagValue>,
}

#[derive(Debug, Deserialize)]
struct TagValue {
    name: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct ReadResult {
    blocks: Vec<ReadBlock>,
}

#[derive(Debug, Deserialize)]
struct ReadBlock {
    #[serde(default)]
    lines: Vec<ReadLine>,
}

#[derive(Debug, Deserialize)]
struct ReadLine {
    text: String,
}

/// Map the provider response into the pipeline's result model: dense
/// captions ordered by descending confidence, objects reduced to their
/// strongest tag, tags filtered to confidence > 0.5 descending, and all
/// recognized text lines joined with spaces.
fn to_analysis_result(response: AnalyzeResponse) -> AnalysisResult {
    let mut result = AnalysisResult::empty_success();

    if let Some(caption) = response.caption_result {
        result.main_caption = Some(caption.text);
        result.main_caption_confidence = caption.confidence;
    }

    if let Some(dense) = response.dense_captions_result {
        let mut captions: Vec<DenseCaption> = dense
            .values
            .into_iter()
            .map(|c| DenseCaption {
                text: c.text,
                confidence: c.confidence,
            })
            .collect();
        captions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        result.dense_captions = captions;
    }

    if let Some(objects) = response.objects_result {
        result.objects = objects
            .values
            .into_iter()
            .filter_map(|object| {
                let tag = object.tags.into_iter().next()?;
                let bounding_box = object
                    .bounding_box
                    .map(|b| BoundingBox {
                        x: b.x,
                        y: b.y,
                        width: b.w,
                        height: b.h,
                    })
                    .unwrap_or_default();
                Some(DetectedObject {
                    name: tag.name,
                    confidence: tag.confidence,
                    bounding_box,
                })
            })
            .collect();
    }

    if let Some(tags) = response.tags_result {
        let mut tags: Vec<ImageTag> = tags
            .values
            .into_iter()
            .filter(|tag| tag.confidence > MIN_TAG_CONFIDENCE)
            .map(|tag| ImageTag {
                name: tag.name,
                confidence: tag.confidence,
            })
            .collect();
        tags.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        result.tags = tags;
    }

    if let Some(read) = response.read_result {
        let lines: Vec<String> = read
            .blocks
            .into_iter()
            .flat_map(|block| block.lines)
            .map(|line| line.text)
            .collect();
        if !lines.is_empty() {
            result.extracted_text = Some(lines.join(" "));
        }
    }

    result
}
