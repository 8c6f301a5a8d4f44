//! Request lifecycle controller.
//!
//! One task owns the conversation, the screenshot ring and the active
//! generation session. Triggers from [`ControllerHandle`] and results from
//! capture/streaming tasks all arrive as [`Action`]s on a single channel and
//! are applied in order, so a newer trigger always supersedes older work
//! before that work can touch state again.

use crate::capture::ScreenCapture;
use crate::conversation::{Conversation, Message};
use crate::events::EventSink;
use crate::llm::{extract_error_message, Endpoint, GenerationRequest, Limits, ModelClient, ModelError};
use crate::prompts::{self, APPEND_SPACER, CONTINUATION_CUE, SCREENSHOT_CUE, SECTION_SEPARATOR};
use crate::screenshots::{Screenshot, ScreenshotRing};
use crate::session::{CancelReason, GenerationSession, SessionId, SessionKind};
use crate::state::{OverlayState, SettingsStore};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const INVALID_STATE: &str = "Invalid state";
pub const NO_ACTIVE_CONVERSATION: &str = "No active conversation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Fresh,
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpResult {
    pub success: bool,
    pub error: Option<String>,
}

impl FollowUpResult {
    fn accepted() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn rejected(reason: &str) -> Self {
        Self {
            success: false,
            error: Some(reason.to_string()),
        }
    }
}

/// Point-in-time copy of the controller's state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerSnapshot {
    pub history: Vec<Message>,
    pub screenshots: Vec<Screenshot>,
    /// A session is streaming and has not been cancelled.
    pub generating: bool,
}

/// How a streaming task ended, as seen from inside the task.
#[derive(Debug)]
pub enum StreamOutcome {
    Completed,
    Cancelled,
    Failed(ModelError),
}

#[derive(Debug)]
pub enum Command {
    NewCapture,
    AppendCapture,
    FollowUp {
        question: String,
        reply: oneshot::Sender<FollowUpResult>,
    },
    Stop {
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<ControllerSnapshot>,
    },
}

#[derive(Debug)]
pub enum Action {
    Command(Command),
    Captured {
        epoch: u64,
        mode: CaptureMode,
        screenshot: Option<Screenshot>,
    },
    Fragment {
        session: SessionId,
        text: String,
    },
    Finished {
        session: SessionId,
        outcome: StreamOutcome,
    },
}

/// Everything the controller talks to.
#[derive(Clone)]
pub struct ControllerDeps {
    pub settings: SettingsStore,
    pub overlay: OverlayState,
    pub client: Arc<dyn ModelClient>,
    pub capture: Arc<dyn ScreenCapture>,
    pub sink: Arc<dyn EventSink>,
}

/// Cloneable front door to a running controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Action>,
}

impl ControllerHandle {
    pub fn new_capture(&self) {
        self.send(Command::NewCapture);
    }

    pub fn append_capture(&self) {
        self.send(Command::AppendCapture);
    }

    /// Stop the active session. Returns whether there was one to stop.
    pub async fn stop(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply });
        rx.await.unwrap_or(false)
    }

    /// Ask a question about the current conversation. Resolves once the
    /// request has been accepted or rejected; the answer itself streams
    /// through the event sink.
    pub async fn follow_up(&self, question: impl Into<String>) -> FollowUpResult {
        let (reply, rx) = oneshot::channel();
        self.send(Command::FollowUp {
            question: question.into(),
            reply,
        });
        rx.await
            .unwrap_or_else(|_| FollowUpResult::rejected(INVALID_STATE))
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply });
        rx.await.unwrap_or_default()
    }

    fn send(&self, command: Command) {
        if self.tx.send(Action::Command(command)).is_err() {
            warn!("Controller is gone; dropping command");
        }
    }
}

pub struct Controller {
    settings: SettingsStore,
    overlay: OverlayState,
    client: Arc<dyn ModelClient>,
    capture: Arc<dyn ScreenCapture>,
    sink: Arc<dyn EventSink>,
    action_tx: mpsc::WeakUnboundedSender<Action>,
    conversation: Conversation,
    screenshots: ScreenshotRing,
    active: Option<GenerationSession>,
    /// Session whose loading span is open.
    loading: Option<SessionId>,
    epoch: u64,
    next_session: u64,
    appended_since_reset: bool,
}

impl Controller {
    /// Start the controller task. It runs until every handle is dropped and
    /// no capture or streaming task is left holding a sender.
    pub fn spawn(deps: ControllerDeps) -> ControllerHandle {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = Controller::new(deps, tx.downgrade());

        tokio::spawn(async move {
            while let Some(action) = rx.recv().await {
                controller.update(action);
            }
            debug!("Controller loop finished");
        });

        ControllerHandle { tx }
    }

    fn new(deps: ControllerDeps, action_tx: mpsc::WeakUnboundedSender<Action>) -> Self {
        Self {
            settings: deps.settings,
            overlay: deps.overlay,
            client: deps.client,
            capture: deps.capture,
            sink: deps.sink,
            action_tx,
            conversation: Conversation::new(),
            screenshots: ScreenshotRing::new(),
            active: None,
            loading: None,
            epoch: 0,
            next_session: 0,
            appended_since_reset: false,
        }
    }

    pub fn update(&mut self, action: Action) {
        match action {
            Action::Command(Command::NewCapture) => self.trigger_capture(CaptureMode::Fresh),
            Action::Command(Command::AppendCapture) => self.trigger_capture(CaptureMode::Append),
            Action::Command(Command::FollowUp { question, reply }) => {
                let result = self.follow_up(question);
                let _ = reply.send(result);
            }
            Action::Command(Command::Stop { reply }) => {
                let stopped = self.stop();
                let _ = reply.send(stopped);
            }
            Action::Command(Command::Snapshot { reply }) => {
                let _ = reply.send(self.snapshot());
            }
            Action::Captured {
                epoch,
                mode,
                screenshot,
            } => self.on_captured(epoch, mode, screenshot),
            Action::Fragment { session, text } => self.on_fragment(session, text),
            Action::Finished { session, outcome } => self.on_finished(session, outcome),
        }
    }

    fn ready(&self) -> bool {
        self.overlay.is_active() && self.settings.snapshot().has_credentials()
    }

    /// Bump the epoch and take the active session's right to emit.
    fn supersede(&mut self) -> u64 {
        self.epoch += 1;
        if let Some(session) = self.active.as_mut() {
            if session.cancel(CancelReason::Superseded) {
                info!("Session {} superseded", session.id());
            }
        }
        self.epoch
    }

    fn trigger_capture(&mut self, mode: CaptureMode) {
        if !self.ready() {
            debug!("Ignoring {:?} capture: overlay inactive or no API key", mode);
            return;
        }
        let epoch = self.supersede();
        let Some(tx) = self.action_tx.upgrade() else {
            return;
        };
        let capture = self.capture.clone();
        tokio::spawn(async move {
            let screenshot = capture.capture().await;
            let _ = tx.send(Action::Captured {
                epoch,
                mode,
                screenshot,
            });
        });
    }

    fn on_captured(&mut self, epoch: u64, mode: CaptureMode, screenshot: Option<Screenshot>) {
        if epoch != self.epoch {
            debug!("Dropping capture from epoch {} (now {})", epoch, self.epoch);
            return;
        }
        let Some(shot) = screenshot else {
            warn!("Capture returned no image");
            return;
        };

        if mode == CaptureMode::Append && !self.conversation.is_empty() {
            self.conversation
                .push(Message::user_with_image(CONTINUATION_CUE, &shot));
            self.screenshots.push(shot.clone());
            self.sink.screenshot_taken(&shot);
            self.sink.screenshots_updated(&self.screenshots.to_vec());

            let lead = if self.appended_since_reset {
                APPEND_SPACER
            } else {
                SECTION_SEPARATOR
            };
            self.appended_since_reset = true;

            let messages = self.conversation.messages().to_vec();
            self.open_session(SessionKind::Append, messages, Some(lead));
        } else {
            self.conversation
                .reset(Message::user_with_image(SCREENSHOT_CUE, &shot));
            self.screenshots.reset_to(shot.clone());
            self.appended_since_reset = false;
            self.sink.conversation_cleared();
            self.sink.screenshots_updated(&self.screenshots.to_vec());
            self.sink.screenshot_taken(&shot);

            let messages = self.conversation.messages().to_vec();
            self.open_session(SessionKind::Capture, messages, None);
        }
    }

    fn follow_up(&mut self, question: String) -> FollowUpResult {
        if !self.ready() {
            return FollowUpResult::rejected(INVALID_STATE);
        }
        if self.conversation.is_empty() {
            return FollowUpResult::rejected(NO_ACTIVE_CONVERSATION);
        }

        self.supersede();
        let messages = self.conversation.with_question(&question);
        self.open_session(
            SessionKind::FollowUp { question },
            messages,
            Some(SECTION_SEPARATOR),
        );
        FollowUpResult::accepted()
    }

    fn stop(&mut self) -> bool {
        match self.active.as_mut() {
            Some(session) => {
                if session.cancel(CancelReason::User) {
                    info!("Session {} stopped by user", session.id());
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            history: self.conversation.messages().to_vec(),
            screenshots: self.screenshots.to_vec(),
            generating: self.active.as_ref().is_some_and(|s| !s.is_cancelled()),
        }
    }

    /// Replace the active session and start streaming. `lead` is a
    /// presentation-only chunk shown before the answer.
    fn open_session(&mut self, kind: SessionKind, messages: Vec<Message>, lead: Option<&str>) {
        let Some(tx) = self.action_tx.upgrade() else {
            return;
        };

        self.next_session += 1;
        let id = SessionId(self.next_session);
        let session = GenerationSession::new(id, kind);

        let config = self.settings.snapshot();
        let request = GenerationRequest {
            endpoint: Endpoint::from_config(&config),
            system_prompt: prompts::system_prompt(&config, session.kind()),
            messages,
            limits: Limits::for_provider(config.provider),
        };

        if let Some(previous) = self.loading.take() {
            debug!("Closing loading span of {}", previous);
            self.sink.loading_end();
        }
        if let Some(lead) = lead {
            self.sink.chunk(lead);
        }
        self.loading = Some(id);
        self.sink.loading_start();

        info!(
            "Session {} started ({:?}, {} messages)",
            id,
            session.kind(),
            request.messages.len()
        );
        let cancel = session.cancel_token();
        self.active = Some(session);

        tokio::spawn(stream_session(self.client.clone(), request, id, cancel, tx));
    }

    fn on_fragment(&mut self, id: SessionId, text: String) {
        match self.active.as_mut() {
            Some(session) if session.id() == id && !session.is_cancelled() => {
                session.append_output(&text);
                self.sink.chunk(&text);
            }
            _ => debug!("Dropping fragment from inactive session {}", id),
        }
    }

    fn on_finished(&mut self, id: SessionId, outcome: StreamOutcome) {
        let session = match self.active.take() {
            Some(session) if session.id() == id => session,
            other => {
                self.active = other;
                debug!("Session {} finished after being replaced", id);
                self.close_loading(id);
                return;
            }
        };

        match (session.cancel_reason(), outcome) {
            (Some(CancelReason::User), _) => {
                info!("Session {} ended: stopped", id);
                self.sink.stopped();
            }
            (Some(CancelReason::Superseded), _) => {
                debug!("Session {} ended: superseded", id);
            }
            (None, StreamOutcome::Completed) => {
                if let SessionKind::FollowUp { question } = session.kind() {
                    self.conversation.push(Message::user_text(question));
                }
                if !session.output().is_empty() {
                    self.conversation
                        .push(Message::assistant(session.output().to_string()));
                }
                info!("Session {} ended: complete", id);
                self.sink.complete();
            }
            (None, StreamOutcome::Failed(err)) => {
                error!("Session {} failed: {:?}", id, err);
                self.sink.error(&extract_error_message(&err));
            }
            (None, StreamOutcome::Cancelled) => {
                warn!("Session {} cancelled without a reason", id);
                self.sink.stopped();
            }
        }

        self.close_loading(id);
    }

    fn close_loading(&mut self, id: SessionId) {
        if self.loading == Some(id) {
            self.loading = None;
            self.sink.loading_end();
        }
    }
}

/// Drive one session's stream, reporting fragments and the final outcome
/// back to the controller. Always sends exactly one `Finished`.
async fn stream_session(
    client: Arc<dyn ModelClient>,
    request: GenerationRequest,
    session: SessionId,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<Action>,
) {
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => StreamOutcome::Cancelled,
        outcome = forward_fragments(client.as_ref(), request, session, &cancel, &tx) => outcome,
    };
    let _ = tx.send(Action::Finished { session, outcome });
}

async fn forward_fragments(
    client: &dyn ModelClient,
    request: GenerationRequest,
    session: SessionId,
    cancel: &CancellationToken,
    tx: &mpsc::UnboundedSender<Action>,
) -> StreamOutcome {
    let failed = |err: ModelError| {
        if cancel.is_cancelled() {
            StreamOutcome::Cancelled
        } else {
            StreamOutcome::Failed(err)
        }
    };

    let mut stream = match client.stream(request, cancel.clone()).await {
        Ok(stream) => stream,
        Err(err) => return failed(err),
    };

    while let Some(item) = stream.next().await {
        match item {
            Ok(text) => {
                if tx.send(Action::Fragment { session, text }).is_err() {
                    return StreamOutcome::Cancelled;
                }
            }
            Err(err) => return failed(err),
        }
    }

    if cancel.is_cancelled() {
        StreamOutcome::Cancelled
    } else {
        StreamOutcome::Completed
    }
}
