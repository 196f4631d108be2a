use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::pipeline::PipelineOptions;
use crate::services::vision::VisionOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Azure AI Vision endpoint URL
    pub vision_endpoint: String,

    /// Azure AI Vision API key
    pub vision_api_key: String,

    /// Directory where uploaded screenshots are stored
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,

    /// Maximum analysis attempts per job (0 fails jobs without calling)
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Base delay for linear retry backoff, in milliseconds
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Client-side timeout for each vision API request, in seconds
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Maximum accepted image size in bytes (default 20 MiB)
    #[serde(default = "default_max_input_size_bytes")]
    pub max_input_size_bytes: u64,

    /// Analysis facet toggles
    #[serde(default = "default_true")]
    pub include_dense_captions: bool,
    #[serde(default = "default_true")]
    pub include_objects: bool,
    #[serde(default = "default_true")]
    pub include_text: bool,
    #[serde(default = "default_true")]
    pub include_tags: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_max_input_size_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            max_retry_attempts: self.max_retry_attempts,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_input_size_bytes: self.max_input_size_bytes,
        }
    }

    pub fn vision_options(&self) -> VisionOptions {
        VisionOptions {
            endpoint: self.vision_endpoint.clone(),
            api_key: self.vision_api_key.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            include_dense_captions: self.include_dense_captions,
            include_objects: self.include_objects,
            include_text: self.include_text,
            include_tags: self.include_tags,
        }
    }
}
