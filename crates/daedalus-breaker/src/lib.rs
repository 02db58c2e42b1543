//! # Daedalus Breaker
//!
//! Circuit breakers keyed by name.
//!
//! - [`Breaker`] - closed/open/half-open state machine wrapping futures
//! - [`BreakerManager`] - lazily creates one breaker per route or method
//! - [`TripPolicy`] - consecutive-failures or failure-rate trip predicate
//!
//! Rejections surface as [`BreakerError::Open`] or
//! [`BreakerError::TooManyRequests`], which convert into an unavailable
//! [`DaedalusError`](daedalus_core::DaedalusError).

#![doc(html_root_url = "https://docs.rs/daedalus-breaker/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod breaker;
mod config;
mod error;
mod manager;
mod state;

pub use breaker::{Breaker, StateChangeHook};
pub use config::{BreakerConfig, PolicyConfig, PolicyKind, TripPolicy};
pub use error::{BreakerError, BreakerResult};
pub use manager::BreakerManager;
pub use state::{Counts, State};
