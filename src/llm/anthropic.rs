use super::sse::{self, Frame};
use super::{GenerationRequest, ModelError, TextStream};
use crate::conversation::{ContentPart, Message, MessageContent};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const API_VERSION: &str = "2023-06-01";
/// The messages API rejects requests without `max_tokens`.
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    max_tokens: u32,
    stream: bool,
    messages: Vec<Value>,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    delta: Option<TextDelta>,
}

#[derive(Deserialize)]
struct TextDelta {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Accept a bare host as well as a `/v1` root, so `{base}/messages` always
/// lands on `/v1/messages`.
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{}/v1", trimmed)
    }
}

fn wire_message(message: &Message) -> Value {
    let content = match &message.content {
        MessageContent::Text(text) => json!(text),
        MessageContent::Parts(parts) => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                    ContentPart::Image { image } => json!({
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/png",
                            "data": image.as_base64()
                        }
                    }),
                })
                .collect(),
        ),
    };
    json!({ "role": message.role.as_str(), "content": content })
}

fn build_body(request: &GenerationRequest) -> MessagesRequest<'_> {
    MessagesRequest {
        model: &request.endpoint.model,
        system: Some(request.system_prompt.as_str()).filter(|s| !s.is_empty()),
        max_tokens: request
            .limits
            .max_output_tokens
            .unwrap_or(DEFAULT_MAX_TOKENS),
        stream: true,
        messages: request.messages.iter().map(wire_message).collect(),
    }
}

fn parse_frame(data: &str) -> Frame {
    let event = match serde_json::from_str::<StreamEvent>(data) {
        Ok(event) => event,
        Err(e) => {
            return Frame::Fail(ModelError::malformed(format!(
                "Malformed stream payload: {}",
                e
            )))
        }
    };
    match event.kind.as_str() {
        "content_block_delta" => match event.delta {
            Some(delta) if delta.kind == "text_delta" && !delta.text.is_empty() => {
                Frame::Text(delta.text)
            }
            _ => Frame::Skip,
        },
        "message_stop" => Frame::Done,
        "error" => Frame::Fail(ModelError::provider(None, data)),
        _ => Frame::Skip,
    }
}

pub async fn stream(
    client: &Client,
    request: &GenerationRequest,
    cancel: CancellationToken,
) -> Result<TextStream, ModelError> {
    let url = format!("{}/messages", normalize_base_url(&request.endpoint.base_url));
    let response = client
        .post(url)
        .header("x-api-key", &request.endpoint.api_key)
        .header("anthropic-version", API_VERSION)
        .json(&build_body(request))
        .send()
        .await
        .map_err(ModelError::network)?;

    if !response.status().is_success() {
        return Err(ModelError::from_response(response).await);
    }

    Ok(sse::pump(response.bytes_stream(), cancel, parse_frame))
}
