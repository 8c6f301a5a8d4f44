use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of recent captures kept for the gallery.
pub const RING_CAPACITY: usize = 5;

/// A captured screen image, base64-encoded PNG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Screenshot(String);

impl Screenshot {
    pub fn from_base64(data: impl Into<String>) -> Self {
        Self(data.into())
    }

    pub fn as_base64(&self) -> &str {
        &self.0
    }

    /// `data:` URL form used by OpenAI-compatible image parts.
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.0)
    }
}

/// Bounded list of the most recent captures, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ScreenshotRing {
    items: VecDeque<Screenshot>,
}

impl ScreenshotRing {
    pub fn new() -> Self {
        Self {
            items: VecDeque::with_capacity(RING_CAPACITY),
        }
    }

    /// Replace the contents with a single capture.
    pub fn reset_to(&mut self, shot: Screenshot) {
        self.items.clear();
        self.items.push_back(shot);
    }

    /// Append a capture, evicting the oldest beyond capacity.
    pub fn push(&mut self, shot: Screenshot) {
        self.items.push_back(shot);
        while self.items.len() > RING_CAPACITY {
            self.items.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Screenshot> {
        self.items.iter().cloned().collect()
    }
}
