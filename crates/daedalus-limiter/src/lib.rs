//! # Daedalus Limiter
//!
//! Per-key token-bucket rate limiting.
//!
//! A [`LimiterManager`] keeps one `governor` bucket per key. The key is the
//! enabled subset of route pattern, client IP and user id joined by `:`.
//! Buckets idle for longer than the TTL are removed by a background sweep.
//!
//! Two modes are supported:
//!
//! - [`LimitMode::Allow`] fails fast with [`LimitError::Exceeded`]
//! - [`LimitMode::Wait`] waits for a token until the request context is done

#![doc(html_root_url = "https://docs.rs/daedalus-limiter/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod key;
mod limiter;
mod manager;

pub use config::{LimitMode, RateLimitConfig, RouteLimitConfig};
pub use error::{LimitError, LimitResult};
pub use key::{build_key, LimitSubject, KEY_SEPARATOR};
pub use limiter::RouteLimiter;
pub use manager::{LimiterManager, LimiterManagerBuilder, DEFAULT_IDLE_TTL, DEFAULT_SWEEP_INTERVAL};
