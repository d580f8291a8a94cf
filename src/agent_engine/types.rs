use serde::{Deserialize, Serialize};

use crate::executor::ActionRecord;

/// One detected UI element, in source-image pixel coordinates.
///
/// Ids are assigned per perception cycle and are meaningless across
/// screenshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenElement {
    pub id: u32,
    pub text: String,
    pub kind: String,
    /// [x1, y1, x2, y2] in pixels.
    pub bbox: [i32; 4],
    pub center: (i32, i32),
    pub confidence: f64,
}

impl ScreenElement {
    /// Integer midpoint of the bounding box.
    pub fn bbox_center(bbox: [i32; 4]) -> (i32, i32) {
        ((bbox[0] + bbox[2]) / 2, (bbox[1] + bbox[3]) / 2)
    }
}

/// A single concrete step the planner asked for.
///
/// Every variant carries a human-readable `explanation` used for the
/// action log and the overlay narration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum PlannedAction {
    Click {
        coordinates: Option<(i32, i32)>,
        element_id: Option<u32>,
        bbox: Option<[i32; 4]>,
        explanation: String,
    },
    Type {
        coordinates: Option<(i32, i32)>,
        text: String,
        explanation: String,
    },
    Scroll {
        /// Signed wheel delta; positive scrolls up.
        delta: i32,
        explanation: String,
    },
    Wait {
        seconds: f64,
        explanation: String,
    },
    Shortcut {
        keys: Vec<String>,
        explanation: String,
    },
    Annotate {
        bbox: [i32; 4],
        explanation: String,
    },
    Screenshot {
        explanation: String,
    },
    Noop {
        explanation: String,
    },
}

impl PlannedAction {
    pub fn kind(&self) -> &'static str {
        match self {
            PlannedAction::Click { .. } => "click",
            PlannedAction::Type { .. } => "type",
            PlannedAction::Scroll { .. } => "scroll",
            PlannedAction::Wait { .. } => "wait",
            PlannedAction::Shortcut { .. } => "shortcut",
            PlannedAction::Annotate { .. } => "annotate",
            PlannedAction::Screenshot { .. } => "screenshot",
            PlannedAction::Noop { .. } => "noop",
        }
    }

    /// Whether a missing screen change after this action should force a
    /// retry. Wait, screenshot and annotate never alter the UI.
    pub fn is_significant(&self) -> bool {
        !matches!(
            self,
            PlannedAction::Wait { .. }
                | PlannedAction::Screenshot { .. }
                | PlannedAction::Annotate { .. }
        )
    }
}

/// One planning cycle's decision: reasoning, an executable action batch
/// and the continuation / clarification flags.
///
/// When `needs_user_input` is true the batch is advisory reasoning only
/// and must not be executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerResponse {
    pub thinking: String,
    pub actions: Vec<PlannedAction>,
    pub should_continue: bool,
    pub needs_user_input: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_question: Option<String>,
}

/// Terminal status of one agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    NeedsInput,
    Error,
}

/// Terminal record of a run, created once and never mutated after return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub status: RunStatus,
    pub final_message: String,
    pub actions: Vec<ActionRecord>,
    pub screenshots: Vec<String>,
    pub elements: Vec<ScreenElement>,
    pub plan: Option<PlannerResponse>,
    pub log_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<String>,
}
