//! # Daedalus Supervisor
//!
//! Lifecycle management for a group of [`Server`](daedalus_core::Server)s.
//!
//! - [`ServerSet`] starts servers in parallel and stops them in registration order
//! - [`StopRegistry`] is the process-wide, append-only list of stop functions
//! - [`SignalListener`] drains the registry on SIGINT or SIGTERM
//!
//! ## Shutdown flow
//!
//! ```text
//! SIGTERM ──► SignalListener ──► StopRegistry::stop_all
//!                                     │
//!                                     ▼
//!                               ServerSet::stop ──► S1.stop, S2.stop, ...
//!                                     │
//!                                     ▼
//!                               ServerSet::start returns
//! ```
//!
//! The registry and listener are owned by the application, not hidden in
//! statics.

#![doc(html_root_url = "https://docs.rs/daedalus-supervisor/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod registry;
mod set;
mod signal;

pub use registry::{StopFn, StopRegistry};
pub use set::ServerSet;
pub use signal::SignalListener;
