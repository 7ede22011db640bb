//! HTTP clients for the Vellum workflow platform.
//!
//! Provides the upstream REST client used by the proxy functions, the
//! invocation client used by callers of those functions, the shared
//! timeout/retry policy, and the client-side execution counter.

pub mod api;
pub mod invoke;
pub mod retry;
pub mod stats;
