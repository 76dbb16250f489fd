//! Console rendering of sync progress.
//!
//! The sync pass runs on a background task and never touches the terminal
//! itself. It talks to a [`UiHandle`], which forwards every call as a
//! [`UiEvent`] to the single [`ConsoleUi`] loop that owns stderr.

use std::time::Duration;

use deckard_sync::Notifier;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

pub enum UiEvent {
    Status(String),
    Clear,
    Run(Box<dyn FnOnce() + Send>),
}

/// [`Notifier`] that posts to a [`ConsoleUi`].
#[derive(Clone)]
pub struct UiHandle {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiHandle {
    fn send(&self, event: UiEvent) {
        // The loop only stops once every handle is gone.
        if self.tx.send(event).is_err() {
            tracing::debug!("console ui already closed");
        }
    }
}

impl Notifier for UiHandle {
    fn status(&self, text: &str) {
        self.send(UiEvent::Status(text.to_string()));
    }

    fn clear(&self) {
        self.send(UiEvent::Clear);
    }

    fn schedule_on_ui(&self, task: Box<dyn FnOnce() + Send>) {
        self.send(UiEvent::Run(task));
    }
}

pub struct ConsoleUi {
    rx: mpsc::UnboundedReceiver<UiEvent>,
    spinner: Option<ProgressBar>,
}

impl ConsoleUi {
    /// Create the loop and its first handle. Without a terminal, status
    /// lines are printed plainly instead of animated.
    pub fn new(interactive: bool) -> (Self, UiHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let spinner = interactive.then(|| {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        });
        (Self { rx, spinner }, UiHandle { tx })
    }

    /// Render events until every [`UiHandle`] is dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            match event {
                UiEvent::Status(text) => match &self.spinner {
                    Some(pb) => pb.set_message(text),
                    None => eprintln!("{text}"),
                },
                UiEvent::Clear => {
                    if let Some(pb) = &self.spinner {
                        pb.set_message("");
                    }
                }
                UiEvent::Run(task) => match &self.spinner {
                    Some(pb) => pb.suspend(task),
                    None => task(),
                },
            }
        }
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }
}
