//! # Daedalus Core
//!
//! Core types and traits shared by every Daedalus crate.
//!
//! - [`RequestContext`] - Cancellable propagation context (trace id, deadline, auth info)
//! - [`AuthInfo`] - Authenticated caller extracted from a validated token
//! - [`DaedalusError`] - Cross-cutting error taxonomy with HTTP and gRPC mappings
//! - [`Server`] - The unit of lifecycle managed by the supervisor
//! - [`ShutdownSignal`] - Idempotent, cloneable shutdown trigger

#![doc(html_root_url = "https://docs.rs/daedalus-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod auth;
mod context;
mod error;
mod server;
pub mod shutdown;

pub use auth::AuthInfo;
pub use context::{ContextError, RequestContext, TRACE_ID_HEADER};
pub use error::{DaedalusError, DaedalusResult, ErrorEnvelope, ErrorKind, GrpcCode};
pub use server::Server;
pub use shutdown::{wait_for_os_signal, ShutdownSignal};
