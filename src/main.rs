use std::path::PathBuf;
use std::process::ExitCode;

use visual_agent::agent_engine::RunStatus;
use visual_agent::{config, runner};

struct CliArgs {
    prompt: String,
    screenshot: Option<PathBuf>,
    clarifications: Vec<String>,
    dry_run: bool,
}

fn parse_args(mut args: std::env::Args) -> Result<CliArgs, String> {
    let _bin = args.next();
    let mut prompt = None;
    let mut screenshot = None;
    let mut clarifications = Vec::new();
    let mut dry_run = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--screenshot" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--screenshot requires a path".to_string())?;
                screenshot = Some(PathBuf::from(value));
            }
            "--clarify" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--clarify requires a value".to_string())?;
                clarifications.push(value);
            }
            "--dry-run" => dry_run = true,
            other if other.starts_with("--") => {
                return Err(format!("unknown flag: {other}"));
            }
            other => {
                if prompt.is_some() {
                    return Err("only one instruction may be given".into());
                }
                prompt = Some(other.to_string());
            }
        }
    }

    let prompt = prompt.ok_or_else(|| {
        "usage: visual-agent \"<instruction>\" [--screenshot <path>] [--clarify <detail>]... [--dry-run]"
            .to_string()
    })?;
    Ok(CliArgs {
        prompt,
        screenshot,
        clarifications,
        dry_run,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let cli = match parse_args(std::env::args()) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let mut config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "no config.toml found; using defaults and environment");
            config::config_from_env()
        }
    };
    if cli.dry_run {
        config.agent.dry_run = true;
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    match runner::execute_run(
        &config,
        &run_id,
        &cli.prompt,
        cli.screenshot,
        &cli.clarifications,
    )
    .await
    {
        Ok(outcome) => {
            match serde_json::to_string_pretty(&outcome) {
                Ok(payload) => println!("{payload}"),
                Err(e) => tracing::error!(error = %e, "failed to render run outcome"),
            }
            if outcome.status == RunStatus::Error {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "run could not be started");
            ExitCode::FAILURE
        }
    }
}
