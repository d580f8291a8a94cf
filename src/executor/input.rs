//! Physical input injection behind a trait seam so dry runs and tests
//! can substitute a stub driver.

use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::errors::{VisualAgentError, VisualAgentResult};

pub trait InputDriver: Send {
    fn click(&mut self, x: i32, y: i32) -> VisualAgentResult<()>;
    fn type_text(&mut self, text: &str) -> VisualAgentResult<()>;
    /// Signed wheel delta; positive scrolls up.
    fn scroll(&mut self, delta: i32) -> VisualAgentResult<()>;
    fn hotkey(&mut self, keys: &[String]) -> VisualAgentResult<()>;
}

/// OS-level driver. An enigo session is created per call because the
/// underlying handle is not `Send` and must not be held across awaits.
pub struct EnigoDriver;

fn session() -> VisualAgentResult<Enigo> {
    Enigo::new(&Settings::default())
        .map_err(|e| VisualAgentError::Executor(format!("input session failed: {e}")))
}

fn input_err(e: enigo::InputError) -> VisualAgentError {
    VisualAgentError::Executor(format!("input injection failed: {e}"))
}

impl InputDriver for EnigoDriver {
    fn click(&mut self, x: i32, y: i32) -> VisualAgentResult<()> {
        let mut enigo = session()?;
        enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_err)?;
        enigo.button(Button::Left, Direction::Click).map_err(input_err)?;
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> VisualAgentResult<()> {
        let mut enigo = session()?;
        enigo.text(text).map_err(input_err)?;
        Ok(())
    }

    fn scroll(&mut self, delta: i32) -> VisualAgentResult<()> {
        let mut enigo = session()?;
        // Wheel delta → line count; enigo's positive direction is down.
        let mut lines = (delta / 100).clamp(-50, 50);
        if lines == 0 {
            lines = delta.signum();
        }
        enigo.scroll(-lines, Axis::Vertical).map_err(input_err)?;
        Ok(())
    }

    fn hotkey(&mut self, keys: &[String]) -> VisualAgentResult<()> {
        let parsed: Vec<Key> = keys
            .iter()
            .map(|k| {
                parse_key(k).ok_or_else(|| {
                    VisualAgentError::Executor(format!("unknown key in shortcut: {k}"))
                })
            })
            .collect::<VisualAgentResult<_>>()?;

        let mut enigo = session()?;
        for key in &parsed {
            enigo.key(*key, Direction::Press).map_err(input_err)?;
        }
        for key in parsed.iter().rev() {
            enigo.key(*key, Direction::Release).map_err(input_err)?;
        }
        Ok(())
    }
}

/// Maps a key token from the planner ("ctrl", "enter", "t", ...) to an
/// enigo key.
pub fn parse_key(token: &str) -> Option<Key> {
    let token = token.trim().to_lowercase();
    let key = match token.as_str() {
        "ctrl" | "control" => Key::Control,
        "alt" => Key::Alt,
        "shift" => Key::Shift,
        "win" | "meta" | "cmd" | "super" => Key::Meta,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        other => {
            let mut chars = other.chars();
            let c = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            Key::Unicode(c)
        }
    };
    Some(key)
}
