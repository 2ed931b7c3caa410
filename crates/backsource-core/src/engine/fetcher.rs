//! Fetch orchestrator - downloads a file straight from the source station
//!
//! This is the fallback path used when the peer-assisted route is
//! unavailable or disallowed. It owns the policy gate, the GET, status
//! validation, and either the temp-file-staging copy (materialized mode) or
//! handing back an auto-closing stream (streaming mode), plus guaranteed
//! idempotent cleanup.

use crate::engine::rate_limiter::RateLimiter;
use crate::engine::reader::ThrottleReader;
use crate::engine::staging::{remove_staged, staged_path, StagedTempFile};
use crate::engine::stream::SourceStream;
use crate::error::FetchError;
use crate::source::{Body, HttpOrigin, Origin};
use backsource_types::{reason, FetchRequest};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Copy buffer for the materialized path.
const COPY_BUF_SIZE: usize = 512 * 1024;

/// Downloads one file from its origin, bypassing the peer network.
///
/// One instance drives one fetch; instances are independent and must not be
/// shared across tasks. The session signature feeds temp-file naming and is
/// passed in explicitly so concurrent fetches stay collision-free without
/// any global state.
pub struct BackSourceFetcher<O: Origin> {
    origin: O,
    request: FetchRequest,
    session_sign: String,
    /// Temp path recorded for cleanup as soon as staging starts.
    temp_path: Option<PathBuf>,
    cleaned: bool,
}

impl BackSourceFetcher<HttpOrigin> {
    /// Build a fetcher over a real HTTP client configured from the request's
    /// TLS options.
    pub fn over_http(
        request: FetchRequest,
        session_sign: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let origin = HttpOrigin::new(&request.tls)?;
        Ok(Self::new(origin, request, session_sign))
    }
}

impl<O: Origin> BackSourceFetcher<O> {
    pub fn new(origin: O, request: FetchRequest, session_sign: impl Into<String>) -> Self {
        Self {
            origin,
            request,
            session_sign: session_sign.into(),
            temp_path: None,
            cleaned: false,
        }
    }

    /// Download the file into `request.destination` (materialized mode).
    ///
    /// The body is staged into a colocated temp file and promoted with an
    /// atomic rename only after the checksum (if any) matched. Cleanup runs
    /// on every exit path; cancellation aborts the transfer mid-copy and
    /// still cleans up.
    pub async fn run_to_file(&mut self, cancel: &CancellationToken) -> Result<(), FetchError> {
        self.check_policy()?;

        let file_name = self
            .request
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(
            task_id = self.request.task_id.as_deref().unwrap_or(""),
            file = %file_name,
            "start download {} from the source station", file_name
        );

        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let result = tokio::select! {
            result = self.fetch_to_file() => result,
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
        };
        self.cleanup().await;
        result
    }

    /// Download the file as a lazily-consumed byte stream (streaming mode).
    ///
    /// No disk I/O happens; the returned stream closes the network resource
    /// itself once it reaches a terminal state, and converts a checksum
    /// mismatch into an error on the final read.
    pub async fn run_to_stream(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<SourceStream<O::Body>, FetchError> {
        self.check_policy()?;

        let (status, body) = tokio::select! {
            result = self.get_validated() => result,
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
        }?;
        debug!(status, url = %self.request.url, "source responded, handing back stream");

        let reader = ThrottleReader::new(
            body,
            RateLimiter::new(self.request.rate_limit),
            self.request.wants_checksum(),
        );
        Ok(SourceStream::new(
            reader,
            self.request.expected_checksum.clone(),
        ))
    }

    /// Delete the staged temp file if one was created.
    ///
    /// Idempotent and infallible: unexpected deletion failures only reach the
    /// diagnostic log, since cleanup runs in guaranteed-exit contexts where an
    /// error would mask the primary failure.
    pub async fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        if let Some(path) = &self.temp_path {
            match remove_staged(path).await {
                Ok(removed) => {
                    if removed {
                        debug!(path = %path.display(), "removed staged temp file");
                    }
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove staged temp file");
                }
            }
        }
        self.cleaned = true;
    }

    /// Fast local failure when back-sourcing is disallowed, or when a
    /// no-space condition was already recorded upstream.
    fn check_policy(&self) -> Result<(), FetchError> {
        let policy = &self.request.policy;
        if !policy.allowed || policy.reason_code == reason::NO_SPACE {
            return Err(FetchError::PolicyDenied {
                reason_code: policy.reason_code + reason::FORCE_NOT_BACK_SOURCE,
            });
        }
        Ok(())
    }

    /// Issue the GET and validate the response status.
    async fn get_validated(&self) -> Result<(u16, O::Body), FetchError> {
        url::Url::parse(&self.request.url)
            .map_err(|_| FetchError::InvalidUrl(self.request.url.clone()))?;

        let (status, mut body) = self
            .origin
            .get(&self.request.url, &self.request.headers)
            .await?;
        if !is_success_status(status) {
            if let Err(err) = body.close() {
                warn!(error = %err, "failed to close body of rejected response");
            }
            return Err(FetchError::BadStatus { status });
        }
        Ok((status, body))
    }

    async fn fetch_to_file(&mut self) -> Result<(), FetchError> {
        // Record the path before touching the disk, so cleanup can delete
        // the staged file even when this future is dropped mid-creation.
        let path = staged_path(&self.request.destination, &self.session_sign);
        self.temp_path = Some(path.clone());
        let mut staged = StagedTempFile::create_at(path).await?;

        let (_, body) = self.get_validated().await?;

        let mut reader = ThrottleReader::new(
            body,
            RateLimiter::new(self.request.rate_limit),
            self.request.wants_checksum(),
        );
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            staged.write_all(&buf[..n]).await?;
        }

        if self.request.wants_checksum() {
            let actual = reader.digest_hex();
            if !self.request.expected_checksum.eq_ignore_ascii_case(&actual) {
                return Err(FetchError::ChecksumMismatch {
                    expected: self.request.expected_checksum.clone(),
                    actual,
                });
            }
        }

        staged.promote(&self.request.destination).await?;
        debug!(destination = %self.request.destination.display(), "promoted staged file");
        Ok(())
    }
}

fn is_success_status(status: u16) -> bool {
    status < 400
}
