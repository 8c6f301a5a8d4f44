use crate::screenshots::Screenshot;
use tokio::sync::mpsc;

/// Notification surface the controller publishes to. Every call is
/// fire-and-forget.
pub trait EventSink: Send + Sync {
    fn loading_start(&self);
    fn chunk(&self, text: &str);
    fn complete(&self);
    fn stopped(&self);
    fn error(&self, message: &str);
    fn loading_end(&self);
    fn screenshot_taken(&self, shot: &Screenshot);
    fn screenshots_updated(&self, shots: &[Screenshot]);
    /// A fresh capture started; the UI drops its previous answer and error.
    fn conversation_cleared(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    LoadingStart,
    Chunk(String),
    Complete,
    Stopped,
    Error(String),
    LoadingEnd,
    ScreenshotTaken(Screenshot),
    ScreenshotsUpdated(Vec<Screenshot>),
    ConversationCleared,
}

/// Forwards every event into an unbounded channel as a [`UiEvent`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<UiEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: UiEvent) {
        // Receiver gone means the UI shut down; nothing left to notify.
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn loading_start(&self) {
        self.send(UiEvent::LoadingStart);
    }

    fn chunk(&self, text: &str) {
        self.send(UiEvent::Chunk(text.to_string()));
    }

    fn complete(&self) {
        self.send(UiEvent::Complete);
    }

    fn stopped(&self) {
        self.send(UiEvent::Stopped);
    }

    fn error(&self, message: &str) {
        self.send(UiEvent::Error(message.to_string()));
    }

    fn loading_end(&self) {
        self.send(UiEvent::LoadingEnd);
    }

    fn screenshot_taken(&self, shot: &Screenshot) {
        self.send(UiEvent::ScreenshotTaken(shot.clone()));
    }

    fn screenshots_updated(&self, shots: &[Screenshot]) {
        self.send(UiEvent::ScreenshotsUpdated(shots.to_vec()));
    }

    fn conversation_cleared(&self) {
        self.send(UiEvent::ConversationCleared);
    }
}
