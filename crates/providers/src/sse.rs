//! SSE framing shared by the provider adapters.
//!
//! [`SseBody`] incrementally decodes a `reqwest` response body into
//! `data:` payloads, one complete event at a time. [`chunk_stream`]
//! feeds those payloads through a provider-specific parser and enforces
//! the terminal contract for every adapter at once: the stream ends at
//! the first `Finish`/`Error` chunk, and a fallback `Finish` is
//! appended if the body closes without one.

use crate::util::from_reqwest;
use tm_domain::error::Result;
use tm_domain::stream::{BoxStream, StreamChunk};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pop the next complete event's data payload from `buffer`.
///
/// Events are blocks separated by a blank line. A block's `data:` lines
/// are joined with `\n` into a single payload; blocks carrying no data
/// (comments, `event:`-only heartbeats) are consumed and skipped.
/// Returns `None` when the buffer holds no further complete event; any
/// trailing partial block stays buffered for the next call.
fn next_payload(buffer: &mut String) -> Option<String> {
    loop {
        let end = buffer.find("\n\n")?;
        let block: String = buffer.drain(..end + 2).collect();
        if let Some(payload) = payload_of(&block) {
            return Some(payload);
        }
    }
}

/// The joined data payload of one raw event block, if it has any.
fn payload_of(block: &str) -> Option<String> {
    let data_lines: Vec<&str> = block
        .lines()
        .filter_map(|line| line.trim().strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .collect();
    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SseBody — incremental response decoder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decodes a streaming response body into `data:` payloads on demand.
pub(crate) struct SseBody {
    response: reqwest::Response,
    buffer: String,
    eof: bool,
}

impl SseBody {
    pub(crate) fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: String::new(),
            eof: false,
        }
    }

    /// The next `data:` payload, reading more of the body as needed.
    /// `None` once the body is exhausted.
    pub(crate) async fn next_data(&mut self) -> Option<Result<String>> {
        loop {
            if let Some(payload) = next_payload(&mut self.buffer) {
                return Some(Ok(payload));
            }
            if self.eof {
                // A final block with no closing blank line is still an
                // event; the buffer is taken so this fires only once.
                let tail = std::mem::take(&mut self.buffer);
                return payload_of(&tail).map(Ok);
            }
            match self.response.chunk().await {
                Ok(Some(bytes)) => self.buffer.push_str(&String::from_utf8_lossy(&bytes)),
                Ok(None) => self.eof = true,
                Err(e) => return Some(Err(from_reqwest(e))),
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// chunk_stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Adapt an SSE response into a [`StreamChunk`] stream via a
/// provider-specific parser.
///
/// The parser is `FnMut` so adapters can carry assembly state across
/// events (block indexes, held-back usage). Termination is owned here,
/// not by the parsers: the stream cuts off at the first terminal chunk
/// a parser produces, and reaching the end of the body without one
/// yields a fallback `Finish`.
pub(crate) fn chunk_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamChunk>>
where
    F: FnMut(&str) -> Vec<Result<StreamChunk>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = SseBody::new(response);

        while let Some(data) = body.next_data().await {
            match data {
                Ok(payload) => {
                    for chunk in parse_data(&payload) {
                        let terminal = matches!(&chunk, Ok(c) if c.is_terminal());
                        yield chunk;
                        if terminal {
                            return;
                        }
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        // Body closed without a terminal chunk.
        yield Ok(StreamChunk::Finish {
            reason: Some("stop".into()),
            usage: None,
        });
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiple_data_lines_in_one_event_join_with_newline() {
        let mut buf = String::from("data: first half\ndata: second half\n\n");
        assert_eq!(
            next_payload(&mut buf).as_deref(),
            Some("first half\nsecond half")
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_event_waits_for_more_bytes() {
        let mut buf = String::from("data: {\"par");
        assert_eq!(next_payload(&mut buf), None);
        assert_eq!(buf, "data: {\"par");

        buf.push_str("tial\"}\n\n");
        assert_eq!(next_payload(&mut buf).as_deref(), Some("{\"partial\"}"));
        assert!(buf.is_empty());
    }

    #[test]
    fn dataless_blocks_are_consumed_and_skipped() {
        let mut buf = String::from(": keep-alive\n\nevent: ping\nid: 3\n\ndata: real\n\n");
        assert_eq!(next_payload(&mut buf).as_deref(), Some("real"));
        assert!(buf.is_empty());
        assert_eq!(next_payload(&mut buf), None);
    }

    #[test]
    fn empty_data_lines_do_not_produce_a_payload() {
        let mut buf = String::from("data: \n\n");
        assert_eq!(next_payload(&mut buf), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn done_sentinel_passes_through_as_a_payload() {
        let mut buf = String::from("data: [DONE]\n\n");
        assert_eq!(next_payload(&mut buf).as_deref(), Some("[DONE]"));
    }

    #[test]
    fn unterminated_tail_block_still_yields_its_data() {
        // The body can close mid-event; the leftover bytes are one last
        // event for the eof flush path.
        assert_eq!(payload_of("data: last words").as_deref(), Some("last words"));
        assert_eq!(payload_of("event: ping"), None);
        assert_eq!(payload_of(""), None);
    }

    #[test]
    fn several_events_drain_in_order() {
        let mut buf = String::from("data: one\n\ndata: two\n\ndata: thr");
        assert_eq!(next_payload(&mut buf).as_deref(), Some("one"));
        assert_eq!(next_payload(&mut buf).as_deref(), Some("two"));
        assert_eq!(next_payload(&mut buf), None);
        assert_eq!(buf, "data: thr");
    }
}
