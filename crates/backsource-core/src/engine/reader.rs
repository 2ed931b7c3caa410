//! Rate-limited hashing reader
//!
//! Wraps a response [`Body`] behind a buffer-oriented read call that
//! throttles cumulative throughput and folds every byte handed to the caller
//! into a running digest. Forward-only and single-pass; there is no way to
//! rewind or reset the hash.

use crate::engine::rate_limiter::RateLimiter;
use crate::error::FetchError;
use crate::source::Body;
use bytes::Bytes;
use sha2::{Digest, Sha256};

pub struct ThrottleReader<B> {
    body: B,
    limiter: RateLimiter,
    /// Present only when checksum verification was requested.
    hasher: Option<Sha256>,
    /// Bytes pulled from the body but not yet handed to the caller.
    pending: Bytes,
}

impl<B: Body> ThrottleReader<B> {
    pub fn new(body: B, limiter: RateLimiter, hash: bool) -> Self {
        Self {
            body,
            limiter,
            hasher: hash.then(Sha256::new),
            pending: Bytes::new(),
        }
    }

    /// Read up to `buf.len()` bytes; `Ok(0)` signals end-of-stream.
    ///
    /// May sleep until enough rate budget has accrued. Bytes are hashed only
    /// once they are actually returned, so the digest always reflects exactly
    /// what the caller has consumed so far.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, FetchError> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pending.is_empty() {
            match self.body.chunk().await? {
                Some(chunk) if chunk.is_empty() => continue,
                Some(chunk) => self.pending = chunk,
                None => return Ok(0),
            }
        }

        let n = self.pending.len().min(buf.len());
        let part = self.pending.split_to(n);
        self.limiter.acquire(n as u64).await;

        buf[..n].copy_from_slice(&part);
        if let Some(hasher) = &mut self.hasher {
            hasher.update(&part);
        }
        Ok(n)
    }

    /// Hex digest over the bytes consumed so far.
    ///
    /// Valid at any point in the stream; returns an empty string when
    /// verification was not requested.
    pub fn digest_hex(&self) -> String {
        match &self.hasher {
            Some(hasher) => hex::encode(hasher.clone().finalize()),
            None => String::new(),
        }
    }

    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }
}
