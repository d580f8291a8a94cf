//! OpenAI-compatible function-calling planner. The model is forced to
//! call a single `run_desktop_actions` tool whose schema matches
//! [`PlannerResponse`], so no free-text parsing is involved.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;

use crate::agent_engine::types::{PlannedAction, PlannerResponse, ScreenElement};
use crate::errors::{VisualAgentError, VisualAgentResult};
use crate::executor::ActionRecord;
use crate::planner::prompt::{self, ELEMENT_CHUNK_SIZE, SYSTEM_PROMPT};
use crate::planner::Planner;

pub struct OpenAiPlanner {
    api_base: String,
    api_key: String,
    model: String,
    temperature: f64,
    client: reqwest::Client,
}

impl OpenAiPlanner {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f64,
    ) -> VisualAgentResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(VisualAgentError::Config(
                "planner API key is not configured".into(),
            ));
        }
        Ok(Self {
            api_base: api_base.into(),
            api_key,
            model: model.into(),
            temperature,
            client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl Planner for OpenAiPlanner {
    async fn plan(
        &self,
        instruction: &str,
        screenshot: &Path,
        elements: &[ScreenElement],
        history: &[ActionRecord],
    ) -> VisualAgentResult<PlannerResponse> {
        let image_bytes = std::fs::read(screenshot).map_err(|e| {
            VisualAgentError::Planner(format!(
                "screenshot unreadable at {}: {e}",
                screenshot.display()
            ))
        })?;
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(image_bytes);

        let history_text = prompt::history_to_text(history);
        let elements_json = serde_json::to_string(elements)?;
        let element_chunks = prompt::chunk_text(&elements_json, ELEMENT_CHUNK_SIZE);

        let mut segments = vec![
            serde_json::json!({
                "type": "text",
                "text": format!(
                    "User request (include follow-up clarifications if provided):\n{instruction}\n"
                ),
            }),
            serde_json::json!({
                "type": "text",
                "text": format!(
                    "Recent action history (most recent last):\n{}\n",
                    if history_text.is_empty() { "None yet." } else { &history_text }
                ),
            }),
        ];
        let total = element_chunks.len();
        for (idx, chunk) in element_chunks.into_iter().enumerate() {
            segments.push(serde_json::json!({
                "type": "text",
                "text": format!("Screen elements chunk {}/{total}:\n{chunk}", idx + 1),
            }));
        }
        segments.push(serde_json::json!({
            "type": "image_url",
            "image_url": { "url": format!("data:image/png;base64,{image_b64}") },
        }));

        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": segments },
            ],
            "tools": [run_actions_tool()],
            "tool_choice": { "type": "function", "function": { "name": "run_desktop_actions" } },
        });

        tracing::debug!(
            model = %self.model,
            elements = elements.len(),
            history = history.len(),
            "sending planner request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VisualAgentError::Planner(format!("planner call failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(VisualAgentError::Planner(format!(
                "planner request failed: {status} {err_body}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VisualAgentError::Planner(format!("planner response unreadable: {e}")))?;

        let arguments = json["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"]
            .as_str()
            .ok_or_else(|| {
                VisualAgentError::Planner(
                    "model response did not include the required run_desktop_actions tool call"
                        .into(),
                )
            })?;
        let args: serde_json::Value = serde_json::from_str(arguments).map_err(|e| {
            VisualAgentError::Planner(format!("tool arguments were not valid JSON: {e}"))
        })?;
        parse_response(&args)
    }
}

/// Flat action shape as emitted by the model; only the fields relevant
/// to each tool are populated.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawAction {
    #[serde(default)]
    tool: String,
    coordinates: Option<Vec<f64>>,
    element_id: Option<u32>,
    value: Option<String>,
    keys: Option<Vec<String>>,
    explanation: Option<String>,
    bbox: Option<Vec<f64>>,
    amount: Option<i64>,
    wait_seconds: Option<f64>,
}

/// Parses the tool-call arguments into a [`PlannerResponse`], enforcing
/// the non-empty batch contract.
pub fn parse_response(args: &serde_json::Value) -> VisualAgentResult<PlannerResponse> {
    let thinking = args["thinking"].as_str().unwrap_or("").to_string();
    let should_continue = args["should_continue"].as_bool().unwrap_or(false);
    let needs_user_input = args["needs_user_input"].as_bool().unwrap_or(false);
    let user_question = args["user_question"].as_str().map(|s| s.to_string());

    let mut actions = Vec::new();
    if let Some(items) = args["actions"].as_array() {
        for item in items {
            if !item.is_object() {
                continue;
            }
            let raw: RawAction = serde_json::from_value(item.clone())
                .map_err(|e| VisualAgentError::Planner(format!("malformed action: {e}")))?;
            actions.push(raw_to_action(raw));
        }
    }

    if actions.is_empty() && !needs_user_input {
        return Err(VisualAgentError::Planner(
            "tool call did not provide any actions".into(),
        ));
    }

    Ok(PlannerResponse {
        thinking,
        actions,
        should_continue,
        needs_user_input,
        user_question,
    })
}

fn raw_to_action(raw: RawAction) -> PlannedAction {
    let explanation = raw.explanation.unwrap_or_default();
    match raw.tool.as_str() {
        "click" => PlannedAction::Click {
            coordinates: pair(&raw.coordinates),
            element_id: raw.element_id,
            bbox: quad(&raw.bbox),
            explanation,
        },
        "type" => match raw.value {
            Some(text) => PlannedAction::Type {
                coordinates: pair(&raw.coordinates),
                text,
                explanation,
            },
            None => PlannedAction::Noop { explanation },
        },
        "scroll" => match raw.amount {
            Some(amount) if amount != 0 => PlannedAction::Scroll {
                delta: amount as i32,
                explanation,
            },
            _ => PlannedAction::Noop { explanation },
        },
        "wait" => match raw.wait_seconds {
            Some(seconds) if seconds > 0.0 => PlannedAction::Wait { seconds, explanation },
            _ => PlannedAction::Noop { explanation },
        },
        "shortcut" | "hotkey" => {
            let keys = raw.keys.unwrap_or_else(|| {
                raw.value
                    .map(|v| v.split('+').map(|part| part.trim().to_string()).collect())
                    .unwrap_or_default()
            });
            PlannedAction::Shortcut { keys, explanation }
        }
        "annotate" => match quad(&raw.bbox) {
            Some(bbox) if !explanation.is_empty() => {
                PlannedAction::Annotate { bbox, explanation }
            }
            _ => PlannedAction::Noop { explanation },
        },
        "screenshot" => PlannedAction::Screenshot { explanation },
        _ => PlannedAction::Noop { explanation },
    }
}

fn pair(values: &Option<Vec<f64>>) -> Option<(i32, i32)> {
    match values.as_deref() {
        Some([x, y, ..]) => Some((*x as i32, *y as i32)),
        _ => None,
    }
}

fn quad(values: &Option<Vec<f64>>) -> Option<[i32; 4]> {
    match values.as_deref() {
        Some([a, b, c, d]) => Some([*a as i32, *b as i32, *c as i32, *d as i32]),
        _ => None,
    }
}

fn run_actions_tool() -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": "run_desktop_actions",
            "description": "Plan the exact desktop actions to execute next. Always include at least one action.",
            "parameters": {
                "type": "object",
                "properties": {
                    "thinking": {
                        "type": "string",
                        "description": "Concise reasoning for the next steps."
                    },
                    "should_continue": {
                        "type": "boolean",
                        "description": "True when another perception cycle is required."
                    },
                    "needs_user_input": {
                        "type": "boolean",
                        "description": "Only true when progress is impossible without clarification."
                    },
                    "user_question": {
                        "type": ["string", "null"],
                        "description": "Question to show the user when needs_user_input is true."
                    },
                    "actions": {
                        "type": "array",
                        "description": "Sequential actions to execute immediately.",
                        "items": {
                            "type": "object",
                            "properties": {
                                "tool": {
                                    "type": "string",
                                    "enum": ["click", "type", "scroll", "wait", "annotate", "screenshot", "shortcut"]
                                },
                                "explanation": {
                                    "type": "string",
                                    "description": "Why this action is required (shown in the run log)."
                                },
                                "coordinates": {
                                    "type": "array",
                                    "description": "Pixel coordinates [x, y] for click/type actions.",
                                    "items": { "type": "number" },
                                    "minItems": 2,
                                    "maxItems": 2
                                },
                                "element_id": {
                                    "type": ["integer", "null"],
                                    "description": "Screen element id if referenced."
                                },
                                "value": {
                                    "type": ["string", "null"],
                                    "description": "Text to type or paste."
                                },
                                "keys": {
                                    "type": "array",
                                    "items": { "type": "string" },
                                    "description": "Keyboard combo for shortcut actions (e.g., [\"ctrl\", \"t\"])."
                                },
                                "amount": {
                                    "type": ["integer", "null"],
                                    "description": "Scroll delta (positive=up, negative=down)."
                                },
                                "wait_seconds": {
                                    "type": ["number", "null"],
                                    "description": "Duration for wait actions."
                                },
                                "bbox": {
                                    "type": "array",
                                    "items": { "type": "number" },
                                    "minItems": 4,
                                    "maxItems": 4,
                                    "description": "Bounding box [x1,y1,x2,y2] for annotate actions."
                                }
                            },
                            "required": ["tool", "explanation"]
                        },
                        "minItems": 1
                    }
                },
                "required": ["thinking", "should_continue", "needs_user_input", "actions"]
            }
        }
    })
}
