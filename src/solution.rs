use crate::events::UiEvent;
use crate::screenshots::Screenshot;

/// What the front end shows for the current answer, rebuilt from events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolutionView {
    pub loading: bool,
    pub text: String,
    pub latest_screenshot: Option<Screenshot>,
    pub screenshot_count: usize,
    pub error: Option<String>,
    pub stopped: bool,
}

impl SolutionView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &UiEvent) {
        match event {
            UiEvent::ConversationCleared => {
                *self = Self::default();
            }
            UiEvent::ScreenshotTaken(shot) => {
                self.latest_screenshot = Some(shot.clone());
            }
            UiEvent::ScreenshotsUpdated(shots) => {
                self.screenshot_count = shots.len();
            }
            UiEvent::LoadingStart => {
                self.loading = true;
                self.stopped = false;
                self.error = None;
            }
            UiEvent::Chunk(text) => self.text.push_str(text),
            UiEvent::Complete | UiEvent::LoadingEnd => self.loading = false,
            UiEvent::Stopped => {
                self.loading = false;
                self.stopped = true;
            }
            UiEvent::Error(message) => {
                self.loading = false;
                self.error = Some(message.clone());
            }
        }
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }
}
