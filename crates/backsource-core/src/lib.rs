//! Backsource Core - direct-from-origin download engine
//!
//! This crate implements the fallback ("back-source") fetch path used when
//! peer-assisted distribution is unavailable or disallowed: a single
//! full-body HTTP(S) GET, throttled to a configured rate, optionally
//! verified against an expected checksum, and delivered either as a file
//! promoted atomically into place or as a lazily-consumed byte stream.

mod engine;
mod error;
mod source;

pub use engine::*;
pub use error::*;
pub use source::*;

pub use backsource_types::{reason, BackSourcePolicy, FetchRequest, TlsOptions};
