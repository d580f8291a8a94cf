//! Prompt assembly helpers shared by planner implementations.

use crate::executor::ActionRecord;

/// Ceiling for one element/context text segment sent to the model.
pub const ELEMENT_CHUNK_SIZE: usize = 3500;

/// At most this many recent history entries are rendered into the
/// prompt to bound its size.
pub const HISTORY_WINDOW: usize = 10;

pub const SYSTEM_PROMPT: &str = "\
You are a careful desktop task planner.
1. Inputs: latest screenshot (base64 image), the parsed screen element array, \
the user request, and up to 10 recent action logs.
2. Goal: finish the user's task exactly (form filling, text entry, navigation). \
Only propose actions that can be executed by the available toolbox.

Tool usage:
- Always call the run_desktop_actions tool. Every response must include at \
least one executable action. Insert a wait action if you need to pause.
- Use keyboard shortcuts when faster (Ctrl+T, Ctrl+L, Ctrl+C/V, Alt+Tab, etc.).
- Only reference coordinates or element ids that appear in the supplied \
element list; never invent targets.
- After every critical action (navigation, submit, open document), inspect the \
updated element context. If the screen still looks the same or the expected \
element is missing, try an alternative approach instead of declaring success.
- Handle broad user requests independently; choose an appropriate search \
result or workflow without asking for preferences unless the user explicitly \
required a choice.
- Prefer interacting with actual buttons/inputs rather than surrounding text \
labels; if text isn't clickable, locate the nearest actionable element.
- When a required form field (username, DOB, etc.) needs information the user \
has not provided, do not invent data; set needs_user_input=true and ask for it \
explicitly.
- Ask for clarification only when the user's request truly cannot be completed \
from the current UI.
- Only set should_continue=false when the latest screenshot/analysis clearly \
shows the user's goal is complete (e.g., logged-in dashboard visible, blank \
document loaded, item added to cart). If unsure, keep should_continue=true.
";

/// Renders the most recent history entries as short prompt lines.
pub fn history_to_text(history: &[ActionRecord]) -> String {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    history[start..]
        .iter()
        .map(|record| {
            format!(
                "- {}: {} ({})",
                record.kind,
                record.message,
                if record.success { "ok" } else { "failed" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits text into ordered segments of at most `chunk_size` characters,
/// so the payload is never sent as one unbounded blob.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|c| c.iter().collect())
        .collect()
}
