use std::sync::{Mutex, PoisonError};

/// Sink for progress messages of a sync pass.
///
/// Implementations must be callable from any task. `schedule_on_ui` hands a
/// closure to whatever thread owns the display; it is how a finished pass
/// asks the UI to reload.
pub trait Notifier: Send + Sync {
    /// Replace the current status line.
    fn status(&self, text: &str);

    /// Remove the status line.
    fn clear(&self);

    /// Run `task` on the UI side.
    fn schedule_on_ui(&self, task: Box<dyn FnOnce() + Send>);
}

/// Notifier without a display. Scheduled tasks run immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn status(&self, _text: &str) {}

    fn clear(&self) {}

    fn schedule_on_ui(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

/// One call received by a [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierEvent {
    Status(String),
    Clear,
    Scheduled,
}

/// Notifier that remembers every call, for assertions in tests.
///
/// # Examples
///
/// ```
/// use deckard_sync::{Notifier, NotifierEvent, RecordingNotifier};
///
/// let notifier = RecordingNotifier::default();
/// notifier.status("Pulling repo: deckard");
/// notifier.clear();
/// assert_eq!(
///     notifier.events(),
///     vec![
///         NotifierEvent::Status("Pulling repo: deckard".into()),
///         NotifierEvent::Clear,
///     ]
/// );
/// ```
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotifierEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<NotifierEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Status texts only, in the order they were sent.
    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                NotifierEvent::Status(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: NotifierEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl Notifier for RecordingNotifier {
    fn status(&self, text: &str) {
        self.push(NotifierEvent::Status(text.to_string()));
    }

    fn clear(&self) {
        self.push(NotifierEvent::Clear);
    }

    fn schedule_on_ui(&self, task: Box<dyn FnOnce() + Send>) {
        self.push(NotifierEvent::Scheduled);
        task();
    }
}
