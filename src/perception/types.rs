use serde::{Deserialize, Serialize};

use crate::agent_engine::types::ScreenElement;

/// Result of one perception cycle: normalized elements plus the raw
/// detector payload for prompt context.
#[derive(Debug, Clone)]
pub struct Perception {
    pub elements: Vec<ScreenElement>,
    pub raw: serde_json::Value,
    pub image_size: (u32, u32),
}

/// One raw detection as returned by the detector, with fractional
/// coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(default)]
    pub bbox: [f64; 4],
    #[serde(default)]
    pub content: String,
    #[serde(default = "unknown_kind", rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub confidence: f64,
}

fn unknown_kind() -> String {
    "unknown".to_string()
}

/// Detector response body.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorResponse {
    #[serde(default)]
    pub bboxes: Vec<RawDetection>,
}
