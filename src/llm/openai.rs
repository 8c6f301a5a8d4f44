use super::sse::{self, Frame};
use super::{GenerationRequest, ModelError, TextStream};
use crate::conversation::{ContentPart, Message, MessageContent};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    content: Option<String>,
}

pub fn chat_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if base.is_empty() { DEFAULT_BASE_URL } else { base };
    format!("{}/chat/completions", base)
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
                        "type": "image_url",
                        "image_url": { "url": image.data_url() }
                    }),
                })
                .collect(),
        ),
    };
    json!({ "role": message.role.as_str(), "content": content })
}

fn build_body(request: &GenerationRequest) -> ChatRequest<'_> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system_prompt.is_empty() {
        messages.push(json!({ "role": "system", "content": request.system_prompt }));
    }
    messages.extend(request.messages.iter().map(wire_message));

    ChatRequest {
        model: &request.endpoint.model,
        messages,
        stream: true,
        max_tokens: request.limits.max_output_tokens,
    }
}

fn parse_frame(data: &str) -> Frame {
    if data == "[DONE]" {
        return Frame::Done;
    }
    match serde_json::from_str::<ChatChunk>(data) {
        Ok(chunk) => {
            if chunk.error.is_some() {
                return Frame::Fail(ModelError::provider(None, data));
            }
            let text: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if text.is_empty() {
                Frame::Skip
            } else {
                Frame::Text(text)
            }
        }
        Err(e) => Frame::Fail(ModelError::malformed(format!(
            "Malformed stream payload: {}",
            e
        ))),
    }
}

pub async fn stream(
    client: &Client,
    request: &GenerationRequest,
    cancel: CancellationToken,
) -> Result<TextStream, ModelError> {
    let response = client
        .post(chat_url(&request.endpoint.base_url))
        .bearer_auth(&request.endpoint.api_key)
        .json(&build_body(request))
        .send()
        .await
        .map_err(ModelError::network)?;

    if !response.status().is_success() {
        return Err(ModelError::from_response(response).await);
    }

    Ok(sse::pump(response.bytes_stream(), cancel, parse_frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use crate::llm::{extract_error_message, Endpoint, Limits, ModelErrorKind};
    use crate::screenshots::Screenshot;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(base_url: String) -> GenerationRequest {
        GenerationRequest {
            endpoint: Endpoint {
                provider: Provider::OpenAi,
                base_url,
                api_key: "sk-test".to_string(),
                model: "gpt-4o".to_string(),
            },
            system_prompt: "sys".to_string(),
            messages: vec![Message::user_with_image(
                "This is a screenshot.",
                &Screenshot::from_base64("QUJD"),
            )],
            limits: Limits::default(),
        }
    }

    #[test]
    fn test_chat_url() {
        assert_eq!(chat_url(""), "https://api.openai.com/v1/chat/completions");
        assert_eq!(
            chat_url("http://localhost:8000/v1/"),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn test_body_shape() {
        let req = request(String::new());
        let body = serde_json::to_value(build_body(&req)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"][1]["type"], "image_url");
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,QUJD"
        );
        assert!(body.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn test_stream_yields_deltas() {
        let mock_server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n",
            "data: [DONE]\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "gpt-4o", "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let req = request(format!("{}/v1", mock_server.uri()));
        let stream = stream(&client, &req, CancellationToken::new())
            .await
            .expect("Failed to start stream");

        let fragments: Vec<String> = stream.map(|r| r.expect("fragment")).collect().await;
        assert_eq!(fragments, vec!["Hello", " world"]);
    }

    #[tokio::test]
    async fn test_error_status_keeps_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_string(r#"{"error":{"message":"Incorrect API key provided"}}"#),
            )
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let req = request(mock_server.uri());
        let err = stream(&client, &req, CancellationToken::new())
            .await
            .err()
            .expect("401 must fail");

        assert_eq!(err.kind, ModelErrorKind::Provider);
        assert_eq!(err.status_code, Some(401));
        assert_eq!(extract_error_message(&err), "Incorrect API key provided");
    }

    #[test]
    fn test_in_stream_error_fails() {
        match parse_frame(r#"{"error":{"message":"overloaded"}}"#) {
            Frame::Fail(err) => assert_eq!(extract_error_message(&err), "overloaded"),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
