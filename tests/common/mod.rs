#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use snapsolve::capture::ScreenCapture;
use snapsolve::config::Config;
use snapsolve::controller::{Controller, ControllerDeps, ControllerHandle};
use snapsolve::events::{ChannelSink, UiEvent};
use snapsolve::llm::{GenerationRequest, ModelClient, ModelError, TextStream};
use snapsolve::screenshots::Screenshot;
use snapsolve::state::{OverlayState, SettingsStore};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What the scripted client does for one request.
#[derive(Clone, Default)]
pub struct Reply {
    pub fragments: Vec<String>,
    /// Keep the stream open after the fragments until cancelled.
    pub hang: bool,
    /// Yielded after the fragments.
    pub error: Option<ModelError>,
    /// Returned instead of a stream.
    pub refuse: Option<ModelError>,
}

impl Reply {
    pub fn text(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn hanging(fragments: &[&str]) -> Self {
        Self {
            hang: true,
            ..Self::text(fragments)
        }
    }

    pub fn refused(error: ModelError) -> Self {
        Self {
            refuse: Some(error),
            ..Self::default()
        }
    }

    pub fn failing_after(fragments: &[&str], error: ModelError) -> Self {
        Self {
            error: Some(error),
            ..Self::text(fragments)
        }
    }
}

/// Model client that answers by looking at the newest user turn: the
/// screenshot payload if it has one, otherwise its text.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedClient {
    pub fn on(&self, key: &str, reply: Reply) {
        self.replies.lock().insert(key.to_string(), reply);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    fn key_of(request: &GenerationRequest) -> String {
        match request.messages.last() {
            Some(message) => match message.images().first() {
                Some(image) => image.as_base64().to_string(),
                None => message.text(),
            },
            None => String::new(),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn stream(
        &self,
        request: GenerationRequest,
        _cancel: CancellationToken,
    ) -> Result<TextStream, ModelError> {
        let reply = self
            .replies
            .lock()
            .get(&Self::key_of(&request))
            .cloned()
            .unwrap_or_default();
        self.requests.lock().push(request);

        if let Some(err) = reply.refuse {
            return Err(err);
        }

        let mut items: Vec<Result<String, ModelError>> =
            reply.fragments.into_iter().map(Ok).collect();
        if let Some(err) = reply.error {
            items.push(Err(err));
        }
        let head = futures::stream::iter(items);
        if reply.hang {
            Ok(head.chain(futures::stream::pending()).boxed())
        } else {
            Ok(head.boxed())
        }
    }
}

/// Hands out queued screenshots; `None` once the queue is empty.
#[derive(Default)]
pub struct QueuedCapture {
    shots: Mutex<VecDeque<Option<Screenshot>>>,
}

impl QueuedCapture {
    pub fn push(&self, shot: Option<Screenshot>) {
        self.shots.lock().push_back(shot);
    }

    pub fn remaining(&self) -> usize {
        self.shots.lock().len()
    }
}

#[async_trait]
impl ScreenCapture for QueuedCapture {
    async fn capture(&self) -> Option<Screenshot> {
        self.shots.lock().pop_front().flatten()
    }
}

pub struct Harness {
    pub handle: ControllerHandle,
    pub client: Arc<ScriptedClient>,
    pub capture: Arc<QueuedCapture>,
    pub overlay: OverlayState,
    pub settings: SettingsStore,
    pub events: mpsc::UnboundedReceiver<UiEvent>,
}

pub fn shot(data: &str) -> Screenshot {
    Screenshot::from_base64(data)
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config {
            api_key: "sk-test".to_string(),
            model: "test-model".to_string(),
            ..Config::default()
        })
    }

    pub fn with_config(config: Config) -> Self {
        let client = Arc::new(ScriptedClient::default());
        let capture = Arc::new(QueuedCapture::default());
        let overlay = OverlayState::new(true);
        let settings = SettingsStore::new(config);
        let (sink, events) = ChannelSink::channel();

        let handle = Controller::spawn(ControllerDeps {
            settings: settings.clone(),
            overlay: overlay.clone(),
            client: client.clone(),
            capture: capture.clone(),
            sink: Arc::new(sink),
        });

        Self {
            handle,
            client,
            capture,
            overlay,
            settings,
            events,
        }
    }

    pub async fn next_event(&mut self) -> UiEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    /// Collect events up to and including the first one matching `done`.
    pub async fn events_until(&mut self, done: impl Fn(&UiEvent) -> bool) -> Vec<UiEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next_event().await;
            let stop = done(&event);
            seen.push(event);
            if stop {
                return seen;
            }
        }
    }

    /// Collect events until `n` loading spans have closed.
    pub async fn events_until_loading_ends(&mut self, n: usize) -> Vec<UiEvent> {
        let mut seen = Vec::new();
        let mut ended = 0;
        while ended < n {
            let event = self.next_event().await;
            if event == UiEvent::LoadingEnd {
                ended += 1;
            }
            seen.push(event);
        }
        seen
    }

    /// Let spawned tasks run, then confirm nothing else was emitted.
    pub async fn assert_quiet(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Round-trip through the controller so every queued action has run.
        let _ = self.handle.snapshot().await;
        if let Ok(event) = self.events.try_recv() {
            panic!("unexpected event: {:?}", event);
        }
    }
}

pub fn chunks(events: &[UiEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::Chunk(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}
