//! High-level desktop action executor. Every primitive action becomes
//! exactly one [`ActionRecord`]; underlying OS failures are captured in
//! the record instead of propagating, so one bad action can never crash
//! a run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent_engine::types::{PlannedAction, ScreenElement};
use crate::errors::VisualAgentResult;
use crate::executor::input::InputDriver;
use crate::executor::logger::{self, ActionLogger};
use crate::overlay::OverlayController;
use crate::perception::screenshot;

const BOX_COLOR: [u8; 4] = [255, 0, 0, 200];
const TEXT_COLOR: [u8; 4] = [0, 120, 255, 220];
const ANNOTATION_COLOR: [u8; 4] = [0, 255, 0, 180];
const TEXT_SIZE: u32 = 14;

/// Once this many annotations are active, the next one clears the
/// overlay first to keep the screen readable.
const MAX_ACTIVE_ANNOTATIONS: u32 = 3;

/// Settle time after a focus click before typing.
const FOCUS_SETTLE: Duration = Duration::from_millis(100);

/// Immutable log entry for one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coords: Option<(i32, i32)>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
}

impl ActionRecord {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            coords: None,
            metadata: serde_json::Map::new(),
            success: true,
            error: None,
            created_at: logger::timestamp(),
        }
    }

    pub fn with_coords(mut self, x: i32, y: i32) -> Self {
        self.coords = Some((x, y));
        self
    }

    pub fn with_meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.success = false;
        self.error = Some(error.into());
    }

    /// Path recorded by a successful screenshot action.
    pub fn screenshot_path(&self) -> Option<PathBuf> {
        if !self.success {
            return None;
        }
        self.metadata.get("path").and_then(|v| v.as_str()).map(PathBuf::from)
    }
}

/// Executes planned actions against the desktop and owns the append-only
/// action log plus its in-memory mirror for the lifetime of one run.
pub struct ActionExecutor {
    run_label: String,
    logger: ActionLogger,
    overlay: OverlayController,
    screenshot_dir: PathBuf,
    input: Box<dyn InputDriver>,
    dry_run: bool,
    history: Vec<ActionRecord>,
    active_annotations: u32,
}

impl ActionExecutor {
    pub fn new(
        run_label: impl Into<String>,
        log_file: impl Into<PathBuf>,
        screenshot_dir: impl Into<PathBuf>,
        overlay: OverlayController,
        input: Box<dyn InputDriver>,
        dry_run: bool,
    ) -> VisualAgentResult<Self> {
        let screenshot_dir = screenshot_dir.into();
        std::fs::create_dir_all(&screenshot_dir)?;
        Ok(Self {
            run_label: run_label.into(),
            logger: ActionLogger::new(log_file)?,
            overlay,
            screenshot_dir,
            input,
            dry_run,
            history: Vec::new(),
            active_annotations: 0,
        })
    }

    pub fn log_path(&self) -> &Path {
        self.logger.path()
    }

    pub fn history(&self) -> &[ActionRecord] {
        &self.history
    }

    pub fn read_log(&self) -> VisualAgentResult<String> {
        self.logger.read()
    }

    /// Executes one planned action. Always returns a record; failures
    /// are recorded, never raised.
    pub async fn execute(
        &mut self,
        action: &PlannedAction,
        elements: &[ScreenElement],
    ) -> ActionRecord {
        match action {
            PlannedAction::Click {
                coordinates,
                element_id,
                bbox,
                explanation,
            } => {
                let target = coordinates.or_else(|| {
                    element_id
                        .and_then(|id| elements.iter().find(|e| e.id == id))
                        .map(|e| e.center)
                });
                match target {
                    Some((x, y)) => self.click(x, y, explanation, *bbox),
                    None => {
                        let mut record = ActionRecord::new(
                            "click",
                            non_empty(explanation, "Action failed"),
                        );
                        record.fail("click action missing coordinates and resolvable element reference");
                        self.log_action(record)
                    }
                }
            }
            PlannedAction::Type {
                coordinates,
                text,
                explanation,
            } => self.type_text(*coordinates, text, explanation).await,
            PlannedAction::Scroll { delta, explanation } => self.scroll(*delta, explanation),
            PlannedAction::Wait { seconds, explanation } => {
                self.wait(*seconds, explanation).await
            }
            PlannedAction::Shortcut { keys, explanation } => self.shortcut(keys, explanation),
            PlannedAction::Annotate { bbox, explanation } => self.annotate(*bbox, explanation),
            PlannedAction::Screenshot { .. } => {
                let label = format!("{}_step", self.run_label);
                self.take_screenshot(&label)
            }
            PlannedAction::Noop { explanation } => {
                let record =
                    ActionRecord::new("noop", non_empty(explanation, "No-op requested"));
                self.log_action(record)
            }
        }
    }

    pub fn click(
        &mut self,
        x: i32,
        y: i32,
        explanation: &str,
        bbox: Option<[i32; 4]>,
    ) -> ActionRecord {
        let mut record =
            ActionRecord::new("click", non_empty(explanation, &format!("Click at ({x}, {y})")))
                .with_coords(x, y)
                .with_meta("bbox", serde_json::json!(bbox));
        if let Some(b) = bbox {
            self.overlay
                .draw_box([b[0], b[1], b[2] - b[0], b[3] - b[1]], BOX_COLOR, 2);
        }
        if !explanation.is_empty() {
            self.overlay
                .draw_text([x + 10, y + 10], explanation, TEXT_COLOR, TEXT_SIZE);
        }
        if !self.dry_run {
            if let Err(e) = self.input.click(x, y) {
                record.fail(e.to_string());
            }
        }
        self.log_action(record)
    }

    pub async fn type_text(
        &mut self,
        coords: Option<(i32, i32)>,
        text: &str,
        explanation: &str,
    ) -> ActionRecord {
        let mut record =
            ActionRecord::new("type", non_empty(explanation, &format!("Type '{text}'")))
                .with_meta("text", serde_json::json!(text));
        record.coords = coords;
        if !self.dry_run {
            let focus = match coords {
                Some((x, y)) => self.input.click(x, y),
                None => Ok(()),
            };
            if coords.is_some() && focus.is_ok() {
                tokio::time::sleep(FOCUS_SETTLE).await;
            }
            let result = focus.and_then(|_| self.input.type_text(text));
            if let Err(e) = result {
                record.fail(e.to_string());
            }
        }
        self.log_action(record)
    }

    pub fn scroll(&mut self, delta: i32, explanation: &str) -> ActionRecord {
        let direction = if delta > 0 { "up" } else { "down" };
        let mut record = ActionRecord::new(
            "scroll",
            non_empty(
                explanation,
                &format!("Scroll {direction} by {}", delta.abs()),
            ),
        )
        .with_meta("amount", serde_json::json!(delta));
        if !self.dry_run {
            if let Err(e) = self.input.scroll(delta) {
                record.fail(e.to_string());
            }
        }
        self.log_action(record)
    }

    pub async fn wait(&mut self, seconds: f64, explanation: &str) -> ActionRecord {
        let seconds = seconds.max(0.0);
        let record = ActionRecord::new(
            "wait",
            non_empty(explanation, &format!("Wait {seconds:.2}s")),
        )
        .with_meta("duration", serde_json::json!(seconds));
        if !self.dry_run {
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        }
        self.log_action(record)
    }

    pub fn shortcut(&mut self, keys: &[String], explanation: &str) -> ActionRecord {
        let normalized: Vec<String> = keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let combo = if normalized.is_empty() {
            "shortcut".to_string()
        } else {
            normalized.join(" + ")
        };
        let mut record =
            ActionRecord::new("shortcut", non_empty(explanation, &format!("Press {combo}")))
                .with_meta("keys", serde_json::json!(normalized));
        // An empty combo is a recorded no-op.
        if !self.dry_run && !normalized.is_empty() {
            if let Err(e) = self.input.hotkey(&normalized) {
                record.fail(e.to_string());
            }
        }
        self.log_action(record)
    }

    pub fn annotate(&mut self, bbox: [i32; 4], text: &str) -> ActionRecord {
        if self.active_annotations >= MAX_ACTIVE_ANNOTATIONS {
            self.clear_overlay();
        }
        self.overlay.draw_box(
            [bbox[0], bbox[1], bbox[2] - bbox[0], bbox[3] - bbox[1]],
            ANNOTATION_COLOR,
            2,
        );
        self.overlay.draw_text(
            [bbox[0], (bbox[1] - 20).max(0)],
            text,
            ANNOTATION_COLOR,
            TEXT_SIZE,
        );
        self.active_annotations += 1;
        let record =
            ActionRecord::new("annotate", text).with_meta("bbox", serde_json::json!(bbox));
        self.log_action(record)
    }

    pub fn take_screenshot(&mut self, label: &str) -> ActionRecord {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
        let path = self.screenshot_dir.join(format!("{label}_{stamp}.png"));
        let mut record =
            ActionRecord::new("screenshot", format!("Saved screenshot to {}", path.display()));
        let saved = if self.dry_run {
            screenshot::write_placeholder(&path)
        } else {
            screenshot::capture_primary(&path)
        };
        match saved {
            Ok(()) => {
                record
                    .metadata
                    .insert("path".into(), serde_json::json!(path.to_string_lossy()));
            }
            Err(e) => record.fail(e.to_string()),
        }
        self.log_action(record)
    }

    /// Appends an informational record (run start, stall notices).
    pub fn log_info(&mut self, message: &str) -> ActionRecord {
        self.log_action(ActionRecord::new("info", message))
    }

    pub fn clear_overlay(&mut self) {
        self.overlay.clear();
        self.active_annotations = 0;
    }

    pub async fn shutdown(&mut self) {
        self.overlay.shutdown().await;
    }

    fn log_action(&mut self, record: ActionRecord) -> ActionRecord {
        if let Err(e) = self.logger.append(&record) {
            tracing::warn!(error = %e, "failed to append to action log");
        }
        self.history.push(record.clone());
        record
    }
}

fn non_empty(explanation: &str, fallback: &str) -> String {
    if explanation.is_empty() {
        fallback.to_string()
    } else {
        explanation.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::errors::{VisualAgentError, VisualAgentResult};
    use crate::overlay::{MemorySurface, OverlayController};

    #[derive(Clone, Default)]
    struct StubDriver {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl InputDriver for StubDriver {
        fn click(&mut self, x: i32, y: i32) -> VisualAgentResult<()> {
            self.calls.lock().unwrap().push(format!("click {x},{y}"));
            Ok(())
        }

        fn type_text(&mut self, text: &str) -> VisualAgentResult<()> {
            self.calls.lock().unwrap().push(format!("type {text}"));
            Ok(())
        }

        fn scroll(&mut self, delta: i32) -> VisualAgentResult<()> {
            self.calls.lock().unwrap().push(format!("scroll {delta}"));
            Ok(())
        }

        fn hotkey(&mut self, keys: &[String]) -> VisualAgentResult<()> {
            self.calls.lock().unwrap().push(format!("hotkey {}", keys.join("+")));
            Ok(())
        }
    }

    struct FailingDriver;

    impl InputDriver for FailingDriver {
        fn click(&mut self, _x: i32, _y: i32) -> VisualAgentResult<()> {
            Err(VisualAgentError::Executor("injection refused".into()))
        }

        fn type_text(&mut self, _text: &str) -> VisualAgentResult<()> {
            Err(VisualAgentError::Executor("injection refused".into()))
        }

        fn scroll(&mut self, _delta: i32) -> VisualAgentResult<()> {
            Err(VisualAgentError::Executor("injection refused".into()))
        }

        fn hotkey(&mut self, _keys: &[String]) -> VisualAgentResult<()> {
            Err(VisualAgentError::Executor("injection refused".into()))
        }
    }

    fn executor_with(
        dir: &tempfile::TempDir,
        input: Box<dyn InputDriver>,
        dry_run: bool,
    ) -> ActionExecutor {
        ActionExecutor::new(
            "run_test",
            dir.path().join("actions.log"),
            dir.path().join("shots"),
            OverlayController::disabled(),
            input,
            dry_run,
        )
        .unwrap()
    }

    fn element(id: u32, bbox: [i32; 4]) -> ScreenElement {
        ScreenElement {
            id,
            text: "Submit".into(),
            kind: "button".into(),
            bbox,
            center: ScreenElement::bbox_center(bbox),
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn click_prefers_explicit_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let driver = StubDriver::default();
        let calls = driver.calls.clone();
        let mut executor = executor_with(&dir, Box::new(driver), false);

        let action = PlannedAction::Click {
            coordinates: Some((900, 500)),
            element_id: Some(1),
            bbox: None,
            explanation: "Focus username".into(),
        };
        let record = executor
            .execute(&action, &[element(1, [0, 0, 100, 40])])
            .await;

        assert!(record.success);
        assert_eq!(record.coords, Some((900, 500)));
        assert_eq!(calls.lock().unwrap().as_slice(), ["click 900,500"]);
    }

    #[tokio::test]
    async fn click_resolves_element_reference_to_bbox_center() {
        let dir = tempfile::tempdir().unwrap();
        let driver = StubDriver::default();
        let calls = driver.calls.clone();
        let mut executor = executor_with(&dir, Box::new(driver), false);

        let action = PlannedAction::Click {
            coordinates: None,
            element_id: Some(7),
            bbox: None,
            explanation: String::new(),
        };
        let record = executor
            .execute(&action, &[element(7, [100, 200, 300, 280])])
            .await;

        assert!(record.success);
        assert_eq!(record.coords, Some((200, 240)));
        assert_eq!(calls.lock().unwrap().as_slice(), ["click 200,240"]);
    }

    #[tokio::test]
    async fn ungroundable_click_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let driver = StubDriver::default();
        let calls = driver.calls.clone();
        let mut executor = executor_with(&dir, Box::new(driver), false);

        let action = PlannedAction::Click {
            coordinates: None,
            element_id: Some(42),
            bbox: None,
            explanation: "Press submit".into(),
        };
        let record = executor.execute(&action, &[element(1, [0, 0, 10, 10])]).await;

        assert!(!record.success);
        assert!(record.error.as_deref().unwrap_or("").contains("resolvable element"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn injection_failure_is_recorded_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let mut executor = executor_with(&dir, Box::new(FailingDriver), false);

        let action = PlannedAction::Click {
            coordinates: Some((10, 10)),
            element_id: None,
            bbox: None,
            explanation: String::new(),
        };
        let record = executor.execute(&action, &[]).await;

        assert!(!record.success);
        assert!(!record.error.as_deref().unwrap_or("").is_empty());
    }

    #[tokio::test]
    async fn type_focuses_before_typing() {
        let dir = tempfile::tempdir().unwrap();
        let driver = StubDriver::default();
        let calls = driver.calls.clone();
        let mut executor = executor_with(&dir, Box::new(driver), false);

        let action = PlannedAction::Type {
            coordinates: Some((900, 500)),
            text: "Jane Doe".into(),
            explanation: String::new(),
        };
        let record = executor.execute(&action, &[]).await;

        assert!(record.success);
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            ["click 900,500", "type Jane Doe"]
        );
    }

    #[tokio::test]
    async fn shortcut_normalizes_and_drops_empty_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let driver = StubDriver::default();
        let calls = driver.calls.clone();
        let mut executor = executor_with(&dir, Box::new(driver), false);

        let action = PlannedAction::Shortcut {
            keys: vec![" ctrl ".into(), "".into(), "  ".into(), "t".into()],
            explanation: String::new(),
        };
        let record = executor.execute(&action, &[]).await;

        assert!(record.success);
        assert_eq!(record.message, "Press ctrl + t");
        assert_eq!(calls.lock().unwrap().as_slice(), ["hotkey ctrl+t"]);
    }

    #[tokio::test]
    async fn empty_shortcut_is_a_recorded_noop() {
        let dir = tempfile::tempdir().unwrap();
        let driver = StubDriver::default();
        let calls = driver.calls.clone();
        let mut executor = executor_with(&dir, Box::new(driver), false);

        let action = PlannedAction::Shortcut {
            keys: vec!["  ".into(), "".into()],
            explanation: String::new(),
        };
        let record = executor.execute(&action, &[]).await;

        assert!(record.success);
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(executor.history().len(), 1);
    }

    #[tokio::test]
    async fn scroll_message_reflects_direction() {
        let dir = tempfile::tempdir().unwrap();
        let mut executor = executor_with(&dir, Box::new(StubDriver::default()), true);

        let down = executor
            .execute(
                &PlannedAction::Scroll { delta: -400, explanation: String::new() },
                &[],
            )
            .await;
        let up = executor
            .execute(
                &PlannedAction::Scroll { delta: 200, explanation: String::new() },
                &[],
            )
            .await;

        assert_eq!(down.message, "Scroll down by 400");
        assert_eq!(up.message, "Scroll up by 200");
    }

    #[tokio::test]
    async fn dry_run_screenshot_writes_a_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let mut executor = executor_with(&dir, Box::new(StubDriver::default()), true);

        let record = executor.take_screenshot("run_test_start");
        assert!(record.success);
        let path = record.screenshot_path().expect("path recorded");
        assert!(path.exists());
        let (w, h) = image::image_dimensions(&path).unwrap();
        assert_eq!((w, h), (200, 100));
    }

    #[tokio::test]
    async fn dry_run_matches_live_record_shape() {
        let dir = tempfile::tempdir().unwrap();
        let batch = vec![
            PlannedAction::Click {
                coordinates: Some((900, 500)),
                element_id: None,
                bbox: None,
                explanation: "Focus username".into(),
            },
            PlannedAction::Type {
                coordinates: Some((900, 500)),
                text: "Jane Doe".into(),
                explanation: String::new(),
            },
            PlannedAction::Scroll { delta: -400, explanation: String::new() },
        ];

        let mut dry = executor_with(&dir, Box::new(StubDriver::default()), true);
        let mut live = executor_with(&dir, Box::new(StubDriver::default()), false);
        for action in &batch {
            dry.execute(action, &[]).await;
            live.execute(action, &[]).await;
        }

        assert_eq!(dry.history().len(), live.history().len());
        for (d, l) in dry.history().iter().zip(live.history().iter()) {
            assert_eq!(d.kind, l.kind);
            assert_eq!(d.success, l.success);
        }
    }

    #[tokio::test]
    async fn annotation_cap_clears_overlay_state() {
        let dir = tempfile::tempdir().unwrap();
        let surface = MemorySurface::new();
        let state = surface.state();
        let mut executor = ActionExecutor::new(
            "run_test",
            dir.path().join("actions.log"),
            dir.path().join("shots"),
            OverlayController::spawn(Box::new(surface)),
            Box::new(StubDriver::default()),
            true,
        )
        .unwrap();

        for i in 0..4 {
            executor.annotate([i, i, i + 10, i + 10], "note");
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        // The fourth annotation cleared the first three before drawing.
        let state = state.lock().unwrap();
        assert_eq!(state.boxes.len(), 1);
        assert_eq!(state.texts.len(), 1);
        drop(state);
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn every_attempt_appends_exactly_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut executor = executor_with(&dir, Box::new(StubDriver::default()), true);

        let batch = vec![
            PlannedAction::Noop { explanation: String::new() },
            PlannedAction::Wait { seconds: 0.0, explanation: String::new() },
            PlannedAction::Click {
                coordinates: None,
                element_id: None,
                bbox: None,
                explanation: String::new(),
            },
        ];
        for action in &batch {
            executor.execute(action, &[]).await;
        }

        assert_eq!(executor.history().len(), batch.len());
        for record in executor.history() {
            if !record.success {
                assert!(!record.error.as_deref().unwrap_or("").is_empty());
            }
        }

        // The on-disk log mirrors the in-memory history line for line.
        let log = executor.read_log().unwrap();
        assert_eq!(log.lines().count(), batch.len() + 1);
    }
}
