use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured outcome of one vision analysis pass.
///
/// Either a populated success (caption, dense captions, objects, tags,
/// extracted text) or a failure carrying only `error_message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub success: bool,
    pub main_caption: Option<String>,
    pub main_caption_confidence: f64,
    /// Region captions, ordered by descending confidence.
    pub dense_captions: Vec<DenseCaption>,
    pub objects: Vec<DetectedObject>,
    /// Tags with confidence > 0.5, ordered by descending confidence.
    pub tags: Vec<ImageTag>,
    /// All recognized text lines joined with spaces.
    pub extracted_text: Option<String>,
    pub error_message: Option<String>,
    pub processing_time_ms: u64,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseCaption {
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedObject {
    pub name: String,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageTag {
    pub name: String,
    pub confidence: f64,
}

impl AnalysisResult {
    /// An empty successful result; callers fill in the analysis facets.
    pub fn empty_success() -> Self {
        Self {
            success: true,
            main_caption: None,
            main_caption_confidence: 0.0,
            dense_captions: Vec::new(),
            objects: Vec::new(),
            tags: Vec::new(),
            extracted_text: None,
            error_message: None,
            processing_time_ms: 0,
            analyzed_at: Utc::now(),
        }
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(error_message.into()),
            ..Self::empty_success()
        }
    }

    /// One-line summary combining the main caption with the strongest
    /// dense captions, objects, and a text preview, for display in list
    /// views.
    pub fn comprehensive_description(&self) -> String {
        let mut parts = Vec::new();

        if let Some(caption) = self.main_caption.as_deref().filter(|c| !c.trim().is_empty()) {
            parts.push(format!("Main: {caption}"));
        }

        if !self.dense_captions.is_empty() {
            let details: Vec<&str> = self
                .dense_captions
                .iter()
                .take(3)
                .map(|dc| dc.text.as_str())
                .collect();
            parts.push(format!("Details: {}", details.join(", ")));
        }

        let object_names: Vec<&str> = self
            .objects
            .iter()
            .filter(|o| o.confidence > 0.7)
            .take(5)
            .map(|o| o.name.as_str())
            .collect();
        if !object_names.is_empty() {
            parts.push(format!("Objects: {}", object_names.join(", ")));
        }

        if let Some(text) = self.extracted_text.as_deref().filter(|t| !t.is_empty()) {
            let preview = if text.len() > 100 {
                let mut end = 100;
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                format!("{}...", &text[..end])
            } else {
                text.to_string()
            };
            parts.push(format!("Text: {preview}"));
        }

        if parts.is_empty() {
            "Analysis completed".to_string()
        } else {
            parts.join(" | ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_carries_message() {
        let result = AnalysisResult::failure("rate limited");
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("rate limited"));
        assert!(result.main_caption.is_none());
    }

    #[test]
    fn test_comprehensive_description_empty() {
        let result = AnalysisResult::empty_success();
        assert_eq!(result.comprehensive_description(), "Analysis completed");
    }

    #[test]
    fn test_comprehensive_description_combines_facets() {
        let mut result = AnalysisResult::empty_success();
        result.main_caption = Some("a desktop with an open editor".to_string());
        result.dense_captions = vec![
            DenseCaption { text: "a code editor".to_string(), confidence: 0.9 },
            DenseCaption { text: "a terminal window".to_string(), confidence: 0.8 },
        ];
        result.objects = vec![
            DetectedObject {
                name: "monitor".to_string(),
                confidence: 0.95,
                bounding_box: BoundingBox::default(),
            },
            DetectedObject {
                name: "cable".to_string(),
                confidence: 0.4, // below display threshold
                bounding_box: BoundingBox::default(),
            },
        ];
        result.extracted_text = Some("fn main() {}".to_string());

        let description = result.comprehensive_description();
        assert!(description.contains("Main: a desktop with an open editor"));
        assert!(description.contains("Details: a code editor, a terminal window"));
        assert!(description.contains("Objects: monitor"));
        assert!(!description.contains("cable"));
        assert!(description.contains("Text: fn main() {}"));
    }

    #[test]
    fn test_comprehensive_description_truncates_long_text() {
        let mut result = AnalysisResult::empty_success();
        result.extracted_text = Some("x".repeat(300));
        let description = result.comprehensive_description();
        assert!(description.ends_with("..."));
        assert!(description.len() < 120);
    }
}
