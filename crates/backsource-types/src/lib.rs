//! Shared types for the back-source fetch core
//!
//! This crate contains the request and policy structures exchanged between
//! the scheduler-facing layers and the fetch engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Reason codes recorded by the upstream scheduler when it decides that a
/// download must fall back to the source station.
pub mod reason {
    pub const NONE: i32 = 0;
    pub const REGISTER_FAIL: i32 = 1;
    pub const MD5_NOT_MATCH: i32 = 2;
    pub const DOWNLOAD_ERROR: i32 = 3;
    pub const NO_SPACE: i32 = 4;
    pub const INIT_ERROR: i32 = 5;
    pub const WRITE_ERROR: i32 = 6;
    pub const HOST_SYS_ERROR: i32 = 7;
    pub const NODE_EMPTY: i32 = 8;
    pub const SOURCE_ERROR: i32 = 10;

    /// Added to the recorded reason when back-sourcing itself is refused,
    /// so the final code still identifies the original failure.
    pub const FORCE_NOT_BACK_SOURCE: i32 = 1000;
}

/// Whether back-sourcing is permitted for a given task, and why the
/// peer-assisted path was abandoned in the first place.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackSourcePolicy {
    /// False when the caller disabled direct source downloads outright.
    pub allowed: bool,
    /// Accumulated back-source reason code, see [`reason`].
    pub reason_code: i32,
}

impl Default for BackSourcePolicy {
    fn default() -> Self {
        Self {
            allowed: true,
            reason_code: reason::NONE,
        }
    }
}

/// TLS settings passed through to the HTTP client unmodified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsOptions {
    /// Skip certificate verification.
    pub insecure: bool,
    /// Extra PEM-encoded root certificates to trust.
    pub ca_certs: Vec<PathBuf>,
}

/// A single back-source fetch: one URL, one destination, one full-body GET.
///
/// Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Source URL of the file to download.
    pub url: String,
    /// Full final path the file is promoted to on success.
    pub destination: PathBuf,
    /// Expected hex-encoded digest of the body; empty means no verification.
    #[serde(default)]
    pub expected_checksum: String,
    /// Identifier of the task this fetch belongs to, for log correlation.
    #[serde(default)]
    pub task_id: Option<String>,
    /// Throughput cap in bytes per second; 0 means unlimited.
    #[serde(default)]
    pub rate_limit: u64,
    #[serde(default)]
    pub tls: TlsOptions,
    /// Extra request headers, passed through as-is.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub policy: BackSourcePolicy,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            expected_checksum: String::new(),
            task_id: None,
            rate_limit: 0,
            tls: TlsOptions::default(),
            headers: HashMap::new(),
            policy: BackSourcePolicy::default(),
        }
    }

    /// True when the caller asked for content verification.
    pub fn wants_checksum(&self) -> bool {
        !self.expected_checksum.is_empty()
    }
}
