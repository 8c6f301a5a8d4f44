//! Server-sent event plumbing shared by the HTTP providers.

use super::{ModelError, TextStream};
use bytes::Bytes;
use futures::stream::StreamExt;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Splits a byte stream into `data:` payloads, one per line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = data_payload(&line_bytes) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.is_empty() {
        None
    } else {
        Some(data.to_string())
    }
}

/// What a provider made of one `data:` payload.
#[derive(Debug)]
pub enum Frame {
    Text(String),
    Skip,
    Done,
    Fail(ModelError),
}

/// Drive an HTTP body on a background task, turning each `data:` payload
/// into fragments via `parse`. Stops reading as soon as `cancel` fires.
pub fn pump<S, F>(body: S, cancel: CancellationToken, mut parse: F) -> TextStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
    F: FnMut(&str) -> Frame + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut body = body;
        let mut decoder = SseDecoder::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                next = body.next() => next,
            };
            match next {
                Some(Ok(bytes)) => {
                    for data in decoder.push(&bytes) {
                        if !forward(&tx, parse(&data)) {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    let _ = tx.send(Err(ModelError::network(e)));
                    return;
                }
                None => break,
            }
        }

        if let Some(data) = decoder.finish() {
            forward(&tx, parse(&data));
        }
    });

    tokio_stream::wrappers::UnboundedReceiverStream::new(rx).boxed()
}

/// Returns whether the pump should keep reading.
fn forward(tx: &mpsc::UnboundedSender<Result<String, ModelError>>, frame: Frame) -> bool {
    match frame {
        Frame::Text(text) => tx.send(Ok(text)).is_ok(),
        Frame::Skip => true,
        Frame::Done => false,
        Frame::Fail(err) => {
            let _ = tx.send(Err(err));
            false
        }
    }
}
