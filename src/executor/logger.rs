//! Append-only action log. The line format is read back verbatim by
//! external log viewers, so the timestamp precision and uppercase kind
//! are part of the contract.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::VisualAgentResult;
use crate::executor::toolbox::ActionRecord;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const LOG_HEADER: &str = "--- Agent Action Log ---";

/// Current UTC timestamp with millisecond precision.
pub fn timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Renders a record as one log line: `[<timestamp>] <KIND> - <message>`.
pub fn format_line(record: &ActionRecord) -> String {
    format!(
        "[{}] {} - {}",
        record.created_at,
        record.kind.to_uppercase(),
        record.message
    )
}

/// Fields recovered from one log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLogLine {
    pub created_at: String,
    pub kind: String,
    pub message: String,
}

/// Parses a line produced by [`format_line`]. Returns `None` for the
/// header or malformed lines.
pub fn parse_line(line: &str) -> Option<ParsedLogLine> {
    let rest = line.strip_prefix('[')?;
    let (created_at, rest) = rest.split_once("] ")?;
    chrono::NaiveDateTime::parse_from_str(created_at, TIMESTAMP_FORMAT).ok()?;
    let (kind, message) = rest.split_once(" - ")?;
    Some(ParsedLogLine {
        created_at: created_at.to_string(),
        kind: kind.to_lowercase(),
        message: message.to_string(),
    })
}

/// Single-writer append-only log file, owned by one executor for the
/// lifetime of a run.
pub struct ActionLogger {
    path: PathBuf,
}

impl ActionLogger {
    pub fn new(path: impl Into<PathBuf>) -> VisualAgentResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            std::fs::write(&path, format!("{LOG_HEADER}\n"))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &ActionRecord) -> VisualAgentResult<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", format_line(record))?;
        Ok(())
    }

    pub fn read(&self) -> VisualAgentResult<String> {
        Ok(std::fs::read_to_string(&self.path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_line_round_trips() {
        let record = ActionRecord::new("click", "Click at (900, 500)");
        let line = format_line(&record);
        let parsed = parse_line(&line).expect("line should parse");
        assert_eq!(parsed.kind, "click");
        assert_eq!(parsed.message, "Click at (900, 500)");
        assert_eq!(parsed.created_at, record.created_at);
    }

    #[test]
    fn kind_is_rendered_uppercase() {
        let record = ActionRecord::new("shortcut", "Press ctrl + t");
        assert!(format_line(&record).contains("] SHORTCUT - "));
    }

    #[test]
    fn header_and_garbage_lines_do_not_parse() {
        assert!(parse_line(LOG_HEADER).is_none());
        assert!(parse_line("[not-a-timestamp] CLICK - hi").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn logger_writes_header_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("actions.log");
        let logger = ActionLogger::new(&path).unwrap();
        logger.append(&ActionRecord::new("info", "run started")).unwrap();

        let contents = logger.read().unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some(LOG_HEADER));
        let parsed = parse_line(lines.next().unwrap()).unwrap();
        assert_eq!(parsed.kind, "info");
        assert_eq!(parsed.message, "run started");
    }
}
