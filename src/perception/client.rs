//! Client for a hosted OmniParser-style element detector.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine as _;

use crate::agent_engine::types::ScreenElement;
use crate::errors::{VisualAgentError, VisualAgentResult};
use crate::perception::traits::Perceiver;
use crate::perception::types::{DetectorResponse, Perception, RawDetection};

pub struct OmniParserClient {
    api_url: String,
    api_token: String,
    bbox_threshold: f64,
    iou_threshold: f64,
    client: reqwest::Client,
}

impl OmniParserClient {
    pub fn new(
        api_url: impl Into<String>,
        api_token: impl Into<String>,
        bbox_threshold: f64,
        iou_threshold: f64,
    ) -> VisualAgentResult<Self> {
        let api_url = api_url.into();
        let api_token = api_token.into();
        if api_url.is_empty() || api_token.is_empty() {
            return Err(VisualAgentError::Config(
                "detector credentials are not configured".into(),
            ));
        }
        Ok(Self {
            api_url,
            api_token,
            bbox_threshold,
            iou_threshold,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl Perceiver for OmniParserClient {
    async fn analyze(&self, screenshot: &Path) -> VisualAgentResult<Perception> {
        if !screenshot.exists() {
            return Err(VisualAgentError::Perception(format!(
                "screenshot not found: {}",
                screenshot.display()
            )));
        }
        let (width, height) = image::image_dimensions(screenshot)?;
        let bytes = std::fs::read(screenshot)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

        let payload = serde_json::json!({
            "inputs": {
                "image": encoded,
                "image_size": { "w": width, "h": height },
                "bbox_threshold": self.bbox_threshold,
                "iou_threshold": self.iou_threshold,
            }
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VisualAgentError::Perception(format!(
                "detector request failed: {status} {body}"
            )));
        }

        let raw: serde_json::Value = response.json().await?;
        let parsed: DetectorResponse = serde_json::from_value(raw.clone())?;
        let elements = normalize_elements(&parsed.bboxes, width, height);
        tracing::debug!(
            elements = elements.len(),
            width,
            height,
            "perception cycle complete"
        );
        Ok(Perception {
            elements,
            raw,
            image_size: (width, height),
        })
    }
}

/// Converts fractional detector boxes to pixel-space elements. This is
/// the single place fraction→pixel conversion happens; ids are assigned
/// from 1 in returned order and are only stable within this call.
pub fn normalize_elements(raw: &[RawDetection], width: u32, height: u32) -> Vec<ScreenElement> {
    raw.iter()
        .enumerate()
        .map(|(idx, det)| {
            let bbox = [
                (det.bbox[0] * width as f64) as i32,
                (det.bbox[1] * height as f64) as i32,
                (det.bbox[2] * width as f64) as i32,
                (det.bbox[3] * height as f64) as i32,
            ];
            ScreenElement {
                id: idx as u32 + 1,
                text: det.content.clone(),
                kind: det.kind.clone(),
                bbox,
                center: ScreenElement::bbox_center(bbox),
                confidence: det.confidence,
            }
        })
        .collect()
}
