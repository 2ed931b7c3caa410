//! Auto-closing stream adapter for streaming-mode fetches
//!
//! Wraps a [`ThrottleReader`] plus ownership of the response body and couples
//! terminal-condition detection to exactly-once closing and final checksum
//! comparison. Downstream consumers see an ordinary byte stream with
//! integrity and cleanup already guaranteed.

use crate::engine::reader::ThrottleReader;
use crate::error::FetchError;
use crate::source::Body;

enum StreamState {
    Open,
    /// Clean end-of-stream was already delivered.
    Done,
    /// A terminal failure was already delivered; replayed on later reads.
    Failed(String),
}

pub struct SourceStream<B> {
    reader: ThrottleReader<B>,
    expected_checksum: String,
    state: StreamState,
}

impl<B> std::fmt::Debug for SourceStream<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream")
            .field("expected_checksum", &self.expected_checksum)
            .finish_non_exhaustive()
    }
}

impl<B: Body> SourceStream<B> {
    pub fn new(reader: ThrottleReader<B>, expected_checksum: String) -> Self {
        Self {
            reader,
            expected_checksum,
            state: StreamState::Open,
        }
    }

    /// Read up to `buf.len()` bytes; `Ok(0)` signals end-of-stream.
    ///
    /// The first error or end-of-stream closes the underlying body exactly
    /// once. End-of-stream additionally triggers the checksum comparison, so
    /// a corrupted stream surfaces as an error on the very call that would
    /// otherwise have completed cleanly. Reads after a terminal signal keep
    /// reporting that same outcome without touching the body again.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, FetchError> {
        match &self.state {
            StreamState::Done => return Ok(0),
            StreamState::Failed(message) => {
                return Err(FetchError::Terminated(message.clone()));
            }
            StreamState::Open => {}
        }

        // A zero-length buffer is a no-op, not end-of-stream; the body has
        // more to give and must stay open.
        if buf.is_empty() {
            return Ok(0);
        }

        match self.reader.read(buf).await {
            Ok(0) => {
                if let Err(close_err) = self.reader.body_mut().close() {
                    return Err(self.fail(close_err));
                }
                if !self.expected_checksum.is_empty() {
                    let actual = self.reader.digest_hex();
                    if !self.expected_checksum.eq_ignore_ascii_case(&actual) {
                        return Err(self.fail(FetchError::ChecksumMismatch {
                            expected: self.expected_checksum.clone(),
                            actual,
                        }));
                    }
                }
                self.state = StreamState::Done;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(read_err) => {
                let close_result = self.reader.body_mut().close();
                Err(self.fail(read_err.with_close_result(close_result)))
            }
        }
    }

    fn fail(&mut self, err: FetchError) -> FetchError {
        self.state = StreamState::Failed(err.to_string());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rate_limiter::RateLimiter;
    use bytes::Bytes;
    use sha2::{Digest, Sha256};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingBody {
        chunks: VecDeque<Result<Bytes, String>>,
        close_calls: Arc<AtomicUsize>,
        close_error: Option<String>,
    }

    impl CountingBody {
        fn ok(chunks: Vec<&[u8]>) -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    chunks: chunks
                        .into_iter()
                        .map(|c| Ok(Bytes::copy_from_slice(c)))
                        .collect(),
                    close_calls: closes.clone(),
                    close_error: None,
                },
                closes,
            )
        }
    }

    impl Body for CountingBody {
        async fn chunk(&mut self) -> Result<Option<Bytes>, FetchError> {
            match self.chunks.pop_front() {
                Some(Ok(chunk)) => Ok(Some(chunk)),
                Some(Err(message)) => Err(FetchError::Io(std::io::Error::other(message))),
                None => Ok(None),
            }
        }

        fn close(&mut self) -> Result<(), FetchError> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            match self.close_error.take() {
                Some(message) => Err(FetchError::Io(std::io::Error::other(message))),
                None => Ok(()),
            }
        }
    }

    fn stream_over(body: CountingBody, expected: &str) -> SourceStream<CountingBody> {
        let reader = ThrottleReader::new(body, RateLimiter::unlimited(), !expected.is_empty());
        SourceStream::new(reader, expected.to_string())
    }

    async fn drain(stream: &mut SourceStream<CountingBody>) -> Result<Vec<u8>, FetchError> {
        let mut buf = [0u8; 16];
        let mut out = Vec::new();
        loop {
            match stream.read(&mut buf).await? {
                0 => return Ok(out),
                n => out.extend_from_slice(&buf[..n]),
            }
        }
    }

    #[tokio::test]
    async fn clean_eof_with_matching_checksum_closes_once() {
        let expected = hex::encode(Sha256::digest(b"payload"));
        let (body, closes) = CountingBody::ok(vec![&b"pay"[..], &b"load"[..]]);
        let mut stream = stream_over(body, &expected);

        let out = drain(&mut stream).await.unwrap();
        assert_eq!(out, b"payload");
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        // EOF stays EOF on later reads, with no extra close.
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn checksum_mismatch_replaces_clean_eof() {
        let (body, closes) = CountingBody::ok(vec![&b"corrupted"[..]]);
        let mut stream = stream_over(body, "deadbeef");

        let err = drain(&mut stream).await.unwrap_err();
        assert!(matches!(err, FetchError::ChecksumMismatch { .. }));
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        // The terminal outcome is replayed, still without reopening the body.
        let mut buf = [0u8; 4];
        let replay = stream.read(&mut buf).await.unwrap_err();
        assert!(matches!(replay, FetchError::Terminated(_)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_buffer_read_leaves_stream_open() {
        let expected = hex::encode(Sha256::digest(b"payload"));
        let (body, closes) = CountingBody::ok(vec![&b"payload"[..]]);
        let mut stream = stream_over(body, &expected);

        // A zero-length read mid-stream must not close the body or latch a
        // terminal state.
        let mut empty = [0u8; 0];
        assert_eq!(stream.read(&mut empty).await.unwrap(), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 0);

        // The full payload is still reachable and verifies cleanly.
        let out = drain(&mut stream).await.unwrap();
        assert_eq!(out, b"payload");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_failure_at_clean_eof_surfaces_and_sticks() {
        let closes = Arc::new(AtomicUsize::new(0));
        let body = CountingBody {
            chunks: VecDeque::from([Ok(Bytes::from_static(b"payload"))]),
            close_calls: closes.clone(),
            close_error: Some("close refused".to_string()),
        };
        let mut stream = stream_over(body, "");

        let err = drain(&mut stream).await.unwrap_err();
        assert!(err.to_string().contains("close refused"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        // The failure is terminal; the body is not closed again.
        let mut buf = [0u8; 4];
        let replay = stream.read(&mut buf).await.unwrap_err();
        assert!(matches!(replay, FetchError::Terminated(_)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mid_stream_error_closes_once_and_sticks() {
        let closes = Arc::new(AtomicUsize::new(0));
        let body = CountingBody {
            chunks: VecDeque::from([
                Ok(Bytes::from_static(b"partial")),
                Err("connection reset".to_string()),
            ]),
            close_calls: closes.clone(),
            close_error: None,
        };
        let mut stream = stream_over(body, "");

        let err = drain(&mut stream).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let mut buf = [0u8; 4];
        assert!(stream.read(&mut buf).await.is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_and_close_failures_are_both_reported() {
        let closes = Arc::new(AtomicUsize::new(0));
        let body = CountingBody {
            chunks: VecDeque::from([Err("connection reset".to_string())]),
            close_calls: closes.clone(),
            close_error: Some("close refused".to_string()),
        };
        let mut stream = stream_over(body, "");

        let mut buf = [0u8; 4];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, FetchError::CloseCompound { .. }));
        let text = err.to_string();
        assert!(text.contains("connection reset"));
        assert!(text.contains("close refused"));
    }
}
