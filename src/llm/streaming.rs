//! Normalises provider output into the "progressively growing string"
//! callback contract.
//!
//! Two transports sit behind [`OnChunk`]:
//! * true incremental delivery, where Server-Sent-Event frames are decoded
//!   with [`SseDecoder`] as bytes arrive from the network;
//! * cosmetic playback via [`simulate_playback`], which replays an already
//!   complete answer word by word. It gives no network-level guarantee and
//!   exists purely so both providers look alike to the UI.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::llm::{LlmError, OnChunk};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Line-oriented `data:` frame decoder. Buffers raw bytes so a multi-byte
/// character split across network chunks is reassembled before decoding.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk and returns every frame completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = Self::parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        Self::parse_line(&line)
    }

    fn parse_line(raw: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            Some(SseEvent::Done)
        } else {
            Some(SseEvent::Data(data.to_string()))
        }
    }
}

/// Races `fut` against the cancellation token.
pub async fn until_cancelled<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, LlmError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LlmError::Aborted),
        out = fut => Ok(out),
    }
}

/// Replays `text` word by word through `on_chunk`, pausing `delay` between
/// words. Cancellation is checked before every word.
pub async fn simulate_playback(
    text: &str,
    delay: Duration,
    on_chunk: &mut OnChunk<'_>,
    cancel: &CancellationToken,
) -> Result<String, LlmError> {
    let mut shown = String::with_capacity(text.len());

    for (i, word) in text.split(' ').enumerate() {
        if cancel.is_cancelled() {
            return Err(LlmError::Aborted);
        }
        if i > 0 {
            shown.push(' ');
        }
        shown.push_str(word);
        on_chunk(&shown);

        if !delay.is_zero() {
            until_cancelled(cancel, tokio::time::sleep(delay)).await?;
        }
    }

    if cancel.is_cancelled() {
        return Err(LlmError::Aborted);
    }
    Ok(shown)
}
