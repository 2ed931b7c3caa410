//! Back-source fetch engine
//!
//! Layered leaves-first:
//! - token bucket rate limiting
//! - rate-limited hashing reads over a response body
//! - auto-closing stream adapter for streaming consumers
//! - temp-file staging with atomic promotion
//! - the orchestrator tying policy, GET, copy and cleanup together

mod fetcher;
mod rate_limiter;
mod reader;
mod staging;
mod stream;

pub use fetcher::*;
pub use rate_limiter::*;
pub use reader::*;
pub use staging::*;
pub use stream::*;
