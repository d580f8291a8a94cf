//! The perceive→plan→act→verify control loop.
//!
//! Each iteration clears the overlay, perceives the current screen,
//! asks the planner for an action batch, executes it, then perceives
//! again to verify that something visibly changed. A significant batch
//! that produced no visible change forces another cycle regardless of
//! what the planner said, bounded by the iteration ceiling.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::agent_engine::types::{AgentResult, PlannerResponse, RunStatus, ScreenElement};
use crate::errors::{VisualAgentError, VisualAgentResult};
use crate::executor::{ActionExecutor, ActionRecord};
use crate::perception::{Perceiver, Perception};
use crate::planner::Planner;

/// Only the first this-many elements of each snapshot take part in the
/// state-change comparison.
const STATE_COMPARE_LIMIT: usize = 80;

const START_MESSAGE: &str =
    "Agent run started; performing the requested task on the live desktop.";

const STALL_MESSAGE: &str =
    "No visible change detected after the last actions; retrying with a fresh look at the screen.";

const CAPTURE_FAILED_MESSAGE: &str =
    "Post-action screenshot failed; ending the run with the last observed state.";

pub struct VisualAgentEngine {
    run_id: String,
    max_iterations: u32,
    action_pause: Duration,
    toolbox: ActionExecutor,
    perceiver: Box<dyn Perceiver>,
    planner: Box<dyn Planner>,
    plans_dir: Option<PathBuf>,
}

#[derive(Default)]
struct RunState {
    screenshots: Vec<PathBuf>,
    history: Vec<ActionRecord>,
    elements: Vec<ScreenElement>,
    plan: Option<PlannerResponse>,
    pending_question: Option<String>,
}

impl VisualAgentEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: impl Into<String>,
        toolbox: ActionExecutor,
        perceiver: Box<dyn Perceiver>,
        planner: Box<dyn Planner>,
        max_iterations: u32,
        action_pause: Duration,
        plans_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            max_iterations,
            action_pause,
            toolbox,
            perceiver,
            planner,
            plans_dir,
        }
    }

    /// Runs one instruction to completion. Perception and planner
    /// failures terminate the run as an `Error` result; per-action
    /// failures are recorded and execution continues.
    pub async fn run(
        &mut self,
        prompt: &str,
        screenshot: Option<PathBuf>,
        clarifications: &[String],
    ) -> AgentResult {
        let instruction = compose_instruction(prompt, clarifications);
        let mut state = RunState::default();
        let outcome = self.drive(&instruction, screenshot, &mut state).await;
        self.toolbox.shutdown().await;

        let (status, final_message) = match outcome {
            Ok(status) => {
                let thinking = state
                    .plan
                    .as_ref()
                    .map(|p| p.thinking.clone())
                    .unwrap_or_default();
                let message = if thinking.is_empty() {
                    "Action plan completed".to_string()
                } else {
                    thinking
                };
                (status, message)
            }
            Err(e) => {
                tracing::error!(run_id = %self.run_id, error = %e, "agent run failed");
                (RunStatus::Error, e.to_string())
            }
        };

        AgentResult {
            status,
            final_message,
            actions: std::mem::take(&mut state.history),
            screenshots: state
                .screenshots
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            elements: std::mem::take(&mut state.elements),
            plan: state.plan.take(),
            log_path: self.toolbox.log_path().to_string_lossy().into_owned(),
            pending_question: state.pending_question.take(),
        }
    }

    async fn drive(
        &mut self,
        instruction: &str,
        initial: Option<PathBuf>,
        state: &mut RunState,
    ) -> VisualAgentResult<RunStatus> {
        let start = self.toolbox.log_info(START_MESSAGE);
        state.history.push(start);

        let mut screenshot_path = match initial {
            Some(path) => path,
            None => {
                let shot = self
                    .toolbox
                    .take_screenshot(&format!("run_{}_start", self.run_id));
                shot.screenshot_path().ok_or_else(|| {
                    VisualAgentError::Perception(
                        shot.error
                            .clone()
                            .unwrap_or_else(|| "initial screenshot failed".into()),
                    )
                })?
            }
        };
        state.screenshots.push(screenshot_path.clone());

        // Verification perception from the previous cycle doubles as the
        // next cycle's input, saving a duplicate detector call.
        let mut carried: Option<Perception> = None;

        for iteration in 0..self.max_iterations {
            self.toolbox.clear_overlay();

            let perception = match carried.take() {
                Some(p) => p,
                None => self.perceiver.analyze(&screenshot_path).await?,
            };
            state.elements = perception.elements;

            tracing::info!(
                run_id = %self.run_id,
                iteration,
                elements = state.elements.len(),
                "planning next actions"
            );
            let plan = self
                .planner
                .plan(instruction, &screenshot_path, &state.elements, &state.history)
                .await?;
            self.write_plan_log(iteration, &plan);
            state.plan = Some(plan.clone());

            if plan.needs_user_input {
                tracing::info!("planner requested user input; halting before execution");
                state.pending_question = plan.user_question.clone();
                return Ok(RunStatus::NeedsInput);
            }
            if plan.actions.is_empty() {
                return Err(VisualAgentError::Planner(
                    "planner returned an empty action batch".into(),
                ));
            }

            let significant = plan.actions.iter().any(|a| a.is_significant());
            for action in &plan.actions {
                let record = self.toolbox.execute(action, &state.elements).await;
                tracing::debug!(kind = action.kind(), success = record.success, "action executed");
                state.history.push(record);
                // Let the UI settle before the next action; state changes
                // are not instantaneously observable.
                tokio::time::sleep(self.action_pause).await;
            }

            let shot = self
                .toolbox
                .take_screenshot(&format!("run_{}_{}", self.run_id, iteration));
            let Some(after_path) = shot.screenshot_path() else {
                tracing::warn!("post-action screenshot failed; stopping");
                let note = self.toolbox.log_info(CAPTURE_FAILED_MESSAGE);
                state.history.push(note);
                break;
            };
            state.screenshots.push(after_path.clone());

            let after = self.perceiver.analyze(&after_path).await?;
            let changed = state_changed(&state.elements, &after.elements);
            // The verification snapshot is the last-seen screen state and
            // must be what the final result reports.
            state.elements = after.elements.clone();

            let mut should_continue = plan.should_continue;
            if significant && !changed {
                tracing::info!(iteration, "no visible change after action batch; forcing another cycle");
                let note = self.toolbox.log_info(STALL_MESSAGE);
                state.history.push(note);
                should_continue = true;
            }

            if !should_continue {
                break;
            }
            screenshot_path = after_path;
            carried = Some(after);
        }

        Ok(RunStatus::Success)
    }

    fn write_plan_log(&self, iteration: u32, plan: &PlannerResponse) {
        let Some(dir) = &self.plans_dir else { return };
        let path = dir.join(format!("plan_iter_{}.json", iteration + 1));
        let write = std::fs::create_dir_all(dir).and_then(|_| {
            let payload = serde_json::to_string_pretty(plan).unwrap_or_default();
            std::fs::write(&path, payload)
        });
        if let Err(e) = write {
            tracing::debug!(error = %e, "failed to write plan log");
        }
    }
}

/// Combines the prompt with any accumulated clarifications.
pub fn compose_instruction(prompt: &str, clarifications: &[String]) -> String {
    let prompt = prompt.trim();
    if clarifications.is_empty() {
        return prompt.to_string();
    }
    let details: Vec<String> = clarifications.iter().map(|c| format!("- {c}")).collect();
    format!(
        "{prompt}\n\nAdditional details from user:\n{}",
        details.join("\n")
    )
}

/// State-change heuristic: two snapshots count as equal when the
/// `(trimmed text, bbox)` pairs of their first 80 elements match as
/// sets. Symmetric and reflexive by construction.
pub fn state_changed(before: &[ScreenElement], after: &[ScreenElement]) -> bool {
    fingerprint(before) != fingerprint(after)
}

fn fingerprint(elements: &[ScreenElement]) -> HashSet<(String, [i32; 4])> {
    elements
        .iter()
        .take(STATE_COMPARE_LIMIT)
        .map(|e| (e.text.trim().to_string(), e.bbox))
        .collect()
}
