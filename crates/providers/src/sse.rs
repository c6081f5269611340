//! Upstream SSE decoding shared by provider adapters.
//!
//! An OpenAI-style completions stream arrives as `data:` frames separated
//! by blank lines, chunked at arbitrary byte boundaries. This module owns
//! the buffering; the adapter supplies an [`SseParser`] that turns each
//! complete payload into stream events and gets a final `finish` call so
//! state held across frames (tool-call assembly) can be flushed even when
//! the upstream closes without a `finish_reason`.

use rl_domain::error::Result;
use rl_domain::stream::{BoxStream, StreamEvent};

use crate::util::from_reqwest;

/// Stateful frame parser for one provider dialect.
pub(crate) trait SseParser: Send + 'static {
    /// Handle one complete `data:` payload.
    fn data(&mut self, payload: &str) -> Vec<Result<StreamEvent>>;

    /// The upstream body ended. Flush whatever is still buffered.
    fn finish(&mut self) -> Vec<Result<StreamEvent>>;
}

/// Pull complete `data:` payloads out of the buffer, leaving any trailing
/// partial frame in place for the next chunk.
pub(crate) fn drain_data_payloads(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let frame: String = buffer.drain(..pos + 2).collect();
        for line in frame.lines() {
            if let Some(rest) = line.trim_start().strip_prefix("data:") {
                let payload = rest.trim();
                if !payload.is_empty() {
                    payloads.push(payload.to_owned());
                }
            }
        }
    }

    payloads
}

/// Decode a streaming `reqwest::Response` into provider stream events.
///
/// Guarantees a terminal [`StreamEvent::Done`] even when the upstream
/// closes abruptly: the parser's `finish` runs first, and a synthetic
/// `Done` is appended if neither path produced one.
pub(crate) fn decode_sse_response<P: SseParser>(
    response: reqwest::Response,
    mut parser: P,
) -> BoxStream<'static, Result<StreamEvent>> {
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut done_seen = false;

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for payload in drain_data_payloads(&mut buffer) {
                        for event in parser.data(&payload) {
                            done_seen |= matches!(event, Ok(StreamEvent::Done { .. }));
                            yield event;
                        }
                    }
                }
                Ok(None) => {
                    // Body closed. A trailing frame without the final blank
                    // line is still a complete payload at this point.
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for payload in drain_data_payloads(&mut buffer) {
                            for event in parser.data(&payload) {
                                done_seen |= matches!(event, Ok(StreamEvent::Done { .. }));
                                yield event;
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            }
        }

        for event in parser.finish() {
            done_seen |= matches!(event, Ok(StreamEvent::Done { .. }));
            yield event;
        }

        if !done_seen {
            yield Ok(StreamEvent::Done {
                tokens_used: None,
                finish_reason: None,
            });
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_one_frame() {
        let mut buf = String::from("data: {\"a\":1}\n\n");
        assert_eq!(drain_data_payloads(&mut buf), vec!["{\"a\":1}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn keeps_partial_frame_buffered() {
        let mut buf = String::from("data: whole\n\ndata: par");
        assert_eq!(drain_data_payloads(&mut buf), vec!["whole"]);
        assert_eq!(buf, "data: par");

        buf.push_str("tial\n\n");
        assert_eq!(drain_data_payloads(&mut buf), vec!["partial"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn ignores_event_id_and_retry_lines() {
        let mut buf = String::from("event: delta\nid: 7\nretry: 100\ndata: x\n\n");
        assert_eq!(drain_data_payloads(&mut buf), vec!["x"]);
    }

    #[test]
    fn skips_blank_data_payloads() {
        let mut buf = String::from("data:\n\ndata:   \n\n");
        assert!(drain_data_payloads(&mut buf).is_empty());
    }

    #[test]
    fn done_sentinel_passes_through() {
        let mut buf = String::from("data: [DONE]\n\n");
        assert_eq!(drain_data_payloads(&mut buf), vec!["[DONE]"]);
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let mut buf = String::from("data: one\n\ndata: two\n\ndata: three\n\n");
        assert_eq!(drain_data_payloads(&mut buf), vec!["one", "two", "three"]);
    }
}
