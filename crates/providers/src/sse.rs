//! Server-sent events decoding for streamed chat completions.
//!
//! [`SseBuffer`] accumulates raw body chunks and yields the `data:`
//! payload of every complete event block. [`sse_response_stream`] drives
//! a `reqwest::Response` through the buffer and a parser closure.

use crate::util::from_reqwest;
use kp_domain::error::Result;
use kp_domain::stream::{BoxStream, StreamEvent};

/// Incremental SSE decoder.
///
/// Events are separated by a blank line. Only `data:` fields are kept;
/// `event:`, `id:` and `retry:` lines and `:` comments are ignored.
/// CRLF line endings are normalized to LF on the way in.
#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    pending: String,
}

impl SseBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(bytes);
        if text.contains('\r') {
            self.pending.push_str(&text.replace("\r\n", "\n"));
        } else {
            self.pending.push_str(&text);
        }
        self.drain_complete()
    }

    /// Flush a trailing event that the server closed without a blank line.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        if self.pending.trim().is_empty() {
            self.pending.clear();
            return Vec::new();
        }
        self.pending.push_str("\n\n");
        self.drain_complete()
    }

    fn drain_complete(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.find("\n\n") {
            let block: String = self.pending.drain(..pos + 2).collect();
            for line in block.lines() {
                if let Some(data) = line.trim().strip_prefix("data:") {
                    let data = data.trim();
                    if !data.is_empty() {
                        payloads.push(data.to_string());
                    }
                }
            }
        }
        payloads
    }
}

/// Turn an SSE response into a [`BoxStream`] of events.
///
/// `parse_data` maps one `data:` payload to zero or more events. A
/// synthetic `Done` is emitted if the parser never produced one, so
/// consumers can always rely on a terminal event.
pub(crate) fn sse_response_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = SseBuffer::default();
        let mut done_emitted = false;

        loop {
            let payloads = match response.chunk().await {
                Ok(Some(bytes)) => buffer.push(&bytes),
                Ok(None) => {
                    for data in buffer.finish() {
                        for event in parse_data(&data) {
                            done_emitted |= matches!(&event, Ok(StreamEvent::Done { .. }));
                            yield event;
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    return;
                }
            };
            for data in payloads {
                for event in parse_data(&data) {
                    done_emitted |= matches!(&event, Ok(StreamEvent::Done { .. }));
                    yield event;
                }
            }
        }

        if !done_emitted {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_event_is_returned() {
        let mut buf = SseBuffer::default();
        let out = buf.push(b"event: message\ndata: {\"a\":1}\n\n");
        assert_eq!(out, vec!["{\"a\":1}"]);
    }

    #[test]
    fn partial_event_waits_for_terminator() {
        let mut buf = SseBuffer::default();
        assert!(buf.push(b"data: chu").is_empty());
        assert!(buf.push(b"nk1").is_empty());
        assert_eq!(buf.push(b"\n\ndata: chunk2\n\n"), vec!["chunk1", "chunk2"]);
    }

    #[test]
    fn crlf_streams_are_normalized() {
        let mut buf = SseBuffer::default();
        let out = buf.push(b"data: one\r\n\r\ndata: two\r\n\r\n");
        assert_eq!(out, vec!["one", "two"]);
    }

    #[test]
    fn comments_and_metadata_are_ignored() {
        let mut buf = SseBuffer::default();
        let out = buf.push(b": keep-alive\nid: 4\nretry: 100\ndata: payload\n\ndata: \n\n");
        assert_eq!(out, vec!["payload"]);
    }

    #[test]
    fn finish_flushes_unterminated_tail() {
        let mut buf = SseBuffer::default();
        assert!(buf.push(b"data: [DONE]").is_empty());
        assert_eq!(buf.finish(), vec!["[DONE]"]);
        assert!(buf.finish().is_empty());
    }
}
