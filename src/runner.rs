//! One-shot run coordinator. Prepares the per-run directory layout,
//! wires detector, planner, executor and overlay together, and drives
//! a single engine invocation.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent_engine::{AgentResult, RunStatus, VisualAgentEngine};
use crate::config::AgentConfig;
use crate::errors::VisualAgentResult;
use crate::executor::{ActionExecutor, EnigoDriver};
use crate::overlay::{NullSurface, OverlayController};
use crate::perception::OmniParserClient;
use crate::planner::openai::OpenAiPlanner;

/// One pipeline stage transition, kept for post-run inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLog {
    pub stage: String,
    pub message: String,
    pub timestamp: String,
}

impl StageLog {
    fn new(stage: &str, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug, Serialize)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub logs: Vec<StageLog>,
    pub result: AgentResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<String>,
}

/// Runs one user instruction end to end. Engine-level failures arrive
/// as an `Error` result; only wiring problems (bad credentials,
/// unwritable run directory) surface as `Err` here.
pub async fn execute_run(
    config: &AgentConfig,
    run_id: &str,
    prompt: &str,
    screenshot: Option<PathBuf>,
    clarifications: &[String],
) -> VisualAgentResult<PipelineOutcome> {
    let mut logs = Vec::new();

    let run_dir = config.agent.runs_dir.join(run_id);
    let screenshots_dir = run_dir.join("screenshots");
    let logs_dir = run_dir.join("logs");
    let plans_dir = run_dir.join("plans");
    std::fs::create_dir_all(&screenshots_dir)?;
    std::fs::create_dir_all(&logs_dir)?;
    std::fs::create_dir_all(&plans_dir)?;
    logs.push(StageLog::new(
        "setup",
        format!("run directory ready at {}", run_dir.display()),
    ));

    let overlay = if config.agent.enable_overlay {
        OverlayController::spawn(Box::new(NullSurface))
    } else {
        OverlayController::disabled()
    };
    let toolbox = ActionExecutor::new(
        run_id,
        logs_dir.join("actions.log"),
        screenshots_dir,
        overlay,
        Box::new(EnigoDriver),
        config.agent.dry_run,
    )?;

    let perceiver = OmniParserClient::new(
        &config.perception.api_url,
        &config.perception.api_token,
        config.perception.bbox_threshold,
        config.perception.iou_threshold,
    )?;
    let planner = OpenAiPlanner::new(
        &config.planner.api_base,
        &config.planner.api_key,
        &config.planner.model,
        config.planner.temperature,
    )?;

    let mut engine = VisualAgentEngine::new(
        run_id,
        toolbox,
        Box::new(perceiver),
        Box::new(planner),
        config.agent.max_iterations,
        Duration::from_millis(config.agent.action_pause_ms),
        Some(plans_dir),
    );

    logs.push(StageLog::new("engine", "starting agent loop"));
    tracing::info!(run_id, dry_run = config.agent.dry_run, "executing run");
    let result = engine.run(prompt, screenshot, clarifications).await;
    logs.push(StageLog::new(
        "engine",
        format!("agent loop finished with status {:?}", result.status),
    ));

    let pending_question = result.pending_question.clone();
    let outcome = PipelineOutcome {
        run_id: run_id.to_string(),
        status: result.status,
        logs,
        result,
        pending_question,
    };

    // Persist is best effort; a failed write must not fail the run.
    let summary_path = run_dir.join("pipeline.json");
    match serde_json::to_string_pretty(&outcome) {
        Ok(payload) => {
            if let Err(e) = std::fs::write(&summary_path, payload) {
                tracing::warn!(error = %e, path = %summary_path.display(), "failed to persist run summary");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to serialize run summary"),
    }

    Ok(outcome)
}
