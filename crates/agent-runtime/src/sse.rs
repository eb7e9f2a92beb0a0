//! Server-sent-events parsing for streamed completions.
//!
//! Lines are split on raw bytes and decoded only once complete, so a
//! multi-byte character cut by a network chunk boundary survives intact.

use bytes::BytesMut;
use futures::Stream;
use std::pin::Pin;
use tokio_stream::StreamExt;

type ByteStream = Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>;

/// A parsed SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

struct LineState {
    bytes: ByteStream,
    buffer: BytesMut,
}

impl LineState {
    fn new(bytes: ByteStream) -> Self {
        Self {
            bytes,
            buffer: BytesMut::new(),
        }
    }

    /// Next complete line, without its terminator. A trailing unterminated
    /// line is returned once the body ends.
    async fn next_line(&mut self) -> Option<anyhow::Result<String>> {
        loop {
            if let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
                let mut line = self.buffer.split_to(newline + 1);
                line.truncate(newline);
                if line.last() == Some(&b'\r') {
                    line.truncate(newline - 1);
                }
                return Some(decode(&line));
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Some(Err(anyhow::anyhow!("response stream error: {e}"))),
                None if self.buffer.is_empty() => return None,
                None => {
                    let rest = self.buffer.split();
                    return Some(decode(&rest));
                }
            }
        }
    }
}

fn decode(line: &[u8]) -> anyhow::Result<String> {
    String::from_utf8(line.to_vec()).map_err(|e| anyhow::anyhow!("response line is not UTF-8: {e}"))
}

/// Parse a response body as an SSE stream
pub fn parse_sse_stream(response: reqwest::Response) -> impl Stream<Item = anyhow::Result<SseEvent>> + Send {
    parse_sse_bytes(Box::pin(response.bytes_stream()))
}

fn parse_sse_bytes(bytes: ByteStream) -> impl Stream<Item = anyhow::Result<SseEvent>> + Send {
    futures::stream::unfold(
        (LineState::new(bytes), None::<String>, Vec::<String>::new()),
        |(mut lines, mut event, mut data)| async move {
            loop {
                let Some(line) = lines.next_line().await else {
                    if data.is_empty() {
                        return None;
                    }
                    let sse = SseEvent {
                        event: event.take(),
                        data: data.join("\n"),
                    };
                    return Some((Ok(sse), (lines, None, Vec::new())));
                };

                let line = match line {
                    Ok(line) => line,
                    Err(e) => return Some((Err(e), (lines, event, data))),
                };

                if line.is_empty() {
                    if data.is_empty() {
                        continue;
                    }
                    let sse = SseEvent {
                        event: event.take(),
                        data: data.join("\n"),
                    };
                    return Some((Ok(sse), (lines, None, Vec::new())));
                }

                if line.starts_with(':') {
                    continue;
                }
                if let Some(value) = line.strip_prefix("event:") {
                    event = Some(value.trim_start().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.trim_start().to_string());
                }
            }
        },
    )
}
