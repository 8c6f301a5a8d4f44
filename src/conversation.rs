//! Conversation history fed to the model.
//!
//! The history only ever holds complete turns: the assistant reply being
//! streamed lives in the generation session until it finishes cleanly.

use crate::screenshots::Screenshot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
    Image { image: Screenshot },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    /// A user turn made of a text cue followed by a screenshot.
    pub fn user_with_image(cue: &str, image: &Screenshot) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: cue.to_string(),
                },
                ContentPart::Image {
                    image: image.clone(),
                },
            ]),
        }
    }

    pub fn user_text(text: &str) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![ContentPart::Text {
                text: text.to_string(),
            }]),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Content as a list of parts, wrapping plain text in a single part.
    pub fn parts(&self) -> Vec<ContentPart> {
        match &self.content {
            MessageContent::Text(text) => vec![ContentPart::Text { text: text.clone() }],
            MessageContent::Parts(parts) => parts.clone(),
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn images(&self) -> Vec<&Screenshot> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Image { image } => Some(image),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }
}

/// Ordered message log of the active exchange.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all history and start over from `first`.
    pub fn reset(&mut self, first: Message) {
        self.messages.clear();
        self.messages.push(first);
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// History as sent for a follow-up: the stored turns plus the question,
    /// without committing the question.
    pub fn with_question(&self, question: &str) -> Vec<Message> {
        let mut messages = self.messages.clone();
        messages.push(Message::user_text(question));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_replaces_history() {
        let mut conv = Conversation::new();
        conv.push(Message::user_text("a"));
        conv.push(Message::assistant("b"));
        let shot = Screenshot::from_base64("xyz");
        conv.reset(Message::user_with_image("cue", &shot));
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages()[0].images(), vec![&shot]);
        assert_eq!(conv.messages()[0].text(), "cue");
    }

    #[test]
    fn test_with_question_does_not_commit() {
        let mut conv = Conversation::new();
        conv.push(Message::user_text("first"));
        let sent = conv.with_question("why?");
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].text(), "why?");
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn test_message_serialization_shape() {
        let msg = Message::user_with_image("look", &Screenshot::from_base64("AAA"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image");
        assert_eq!(json["content"][1]["image"], "AAA");

        let reply = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert_eq!(reply["content"], "hi");
    }
}
