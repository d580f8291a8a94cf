//! Visual overlay modelled as a drawing sink behind an ordered one-way
//! command channel. The issuing side never blocks and never waits for a
//! draw to complete; commands are drained on a fixed polling interval by
//! a background task that owns the drawing surface.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the command queue. Sends beyond this are dropped with a
/// warning so a long run cannot grow the queue unbounded.
const QUEUE_CAPACITY: usize = 256;

/// Drain cadence of the sink task.
const POLL_INTERVAL: Duration = Duration::from_millis(32);

/// Wire protocol of the overlay sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OverlayCommand {
    /// `rect` is [x, y, width, height]; `color` is RGBA.
    Box {
        rect: [i32; 4],
        color: [u8; 4],
        width: u32,
    },
    Text {
        point: [i32; 2],
        text: String,
        color: [u8; 4],
        size: u32,
    },
    Clear,
    Shutdown,
}

/// Drawing surface driven by the sink task. Implementations may render
/// to a native window, a buffer, or nowhere at all; the command contract
/// (ordered delivery, idempotent clear) is what matters.
pub trait OverlaySurface: Send {
    fn draw_box(&mut self, rect: [i32; 4], color: [u8; 4], width: u32);
    fn draw_text(&mut self, point: [i32; 2], text: &str, color: [u8; 4], size: u32);
    fn clear(&mut self);
    fn close(&mut self);
}

/// Headless surface that narrates draw commands to the log.
pub struct NullSurface;

impl OverlaySurface for NullSurface {
    fn draw_box(&mut self, rect: [i32; 4], _color: [u8; 4], width: u32) {
        tracing::trace!(?rect, width, "overlay box");
    }

    fn draw_text(&mut self, point: [i32; 2], text: &str, _color: [u8; 4], size: u32) {
        tracing::trace!(?point, size, text = %text, "overlay text");
    }

    fn clear(&mut self) {
        tracing::trace!("overlay clear");
    }

    fn close(&mut self) {
        tracing::trace!("overlay closed");
    }
}

/// Shared in-memory surface state, inspectable from outside the sink.
#[derive(Debug, Default)]
pub struct SurfaceState {
    pub boxes: Vec<([i32; 4], [u8; 4], u32)>,
    pub texts: Vec<([i32; 2], String, [u8; 4], u32)>,
    pub closed: bool,
}

/// Surface backed by shared memory, used in dry runs and tests.
#[derive(Clone, Default)]
pub struct MemorySurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Arc<Mutex<SurfaceState>> {
        self.state.clone()
    }
}

impl OverlaySurface for MemorySurface {
    fn draw_box(&mut self, rect: [i32; 4], color: [u8; 4], width: u32) {
        self.state.lock().unwrap().boxes.push((rect, color, width));
    }

    fn draw_text(&mut self, point: [i32; 2], text: &str, color: [u8; 4], size: u32) {
        self.state
            .lock()
            .unwrap()
            .texts
            .push((point, text.to_string(), color, size));
    }

    fn clear(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.boxes.clear();
        state.texts.clear();
    }

    fn close(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}

/// Fire-and-forget handle to the overlay sink.
pub struct OverlayController {
    tx: Option<mpsc::Sender<OverlayCommand>>,
    task: Option<JoinHandle<()>>,
}

impl OverlayController {
    /// Spawns the sink task around the given surface.
    pub fn spawn(surface: Box<dyn OverlaySurface>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let task = tokio::spawn(run_sink(rx, surface));
        Self {
            tx: Some(tx),
            task: Some(task),
        }
    }

    /// Controller that accepts and discards all commands.
    pub fn disabled() -> Self {
        Self { tx: None, task: None }
    }

    pub fn draw_box(&self, rect: [i32; 4], color: [u8; 4], width: u32) {
        self.send(OverlayCommand::Box { rect, color, width });
    }

    pub fn draw_text(&self, point: [i32; 2], text: &str, color: [u8; 4], size: u32) {
        self.send(OverlayCommand::Text {
            point,
            text: text.to_string(),
            color,
            size,
        });
    }

    pub fn clear(&self) {
        self.send(OverlayCommand::Clear);
    }

    /// Sends the terminal shutdown command and joins the sink task.
    pub async fn shutdown(&mut self) {
        self.send(OverlayCommand::Shutdown);
        self.tx = None;
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
                tracing::warn!("overlay sink did not shut down within 2s");
            }
        }
    }

    fn send(&self, command: OverlayCommand) {
        let Some(tx) = &self.tx else { return };
        match tx.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(cmd)) => {
                tracing::warn!(?cmd, "overlay queue full; dropping command");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

async fn run_sink(mut rx: mpsc::Receiver<OverlayCommand>, mut surface: Box<dyn OverlaySurface>) {
    let mut tick = tokio::time::interval(POLL_INTERVAL);
    loop {
        tick.tick().await;
        loop {
            match rx.try_recv() {
                Ok(OverlayCommand::Box { rect, color, width }) => {
                    surface.draw_box(rect, color, width);
                }
                Ok(OverlayCommand::Text {
                    point,
                    text,
                    color,
                    size,
                }) => {
                    surface.draw_text(point, &text, color, size);
                }
                Ok(OverlayCommand::Clear) => surface.clear(),
                Ok(OverlayCommand::Shutdown) => {
                    surface.close();
                    return;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    surface.close();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(120)).await;
    }

    #[tokio::test]
    async fn commands_apply_in_submission_order() {
        let surface = MemorySurface::new();
        let state = surface.state();
        let mut overlay = OverlayController::spawn(Box::new(surface));

        overlay.draw_box([10, 20, 30, 40], [255, 0, 0, 200], 2);
        overlay.draw_text([15, 25], "open the menu", [0, 120, 255, 220], 14);
        settle().await;

        {
            let state = state.lock().unwrap();
            assert_eq!(state.boxes, vec![([10, 20, 30, 40], [255, 0, 0, 200], 2)]);
            assert_eq!(state.texts.len(), 1);
            assert_eq!(state.texts[0].1, "open the menu");
        }
        overlay.shutdown().await;
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let surface = MemorySurface::new();
        let state = surface.state();
        let mut overlay = OverlayController::spawn(Box::new(surface));

        overlay.draw_box([0, 0, 10, 10], [255, 0, 0, 200], 2);
        overlay.clear();
        overlay.clear();
        settle().await;

        {
            let state = state.lock().unwrap();
            assert!(state.boxes.is_empty());
            assert!(state.texts.is_empty());
        }
        overlay.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_the_surface() {
        let surface = MemorySurface::new();
        let state = surface.state();
        let mut overlay = OverlayController::spawn(Box::new(surface));

        overlay.shutdown().await;
        assert!(state.lock().unwrap().closed);
    }

    #[tokio::test]
    async fn disabled_controller_discards_commands() {
        let mut overlay = OverlayController::disabled();
        overlay.draw_box([0, 0, 1, 1], [255, 0, 0, 200], 2);
        overlay.clear();
        overlay.shutdown().await;
    }
}
