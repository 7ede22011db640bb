//! Domain layer for the Agent Days workflow gateway.
//!
//! Pure types and functions with no I/O: workflow request/response
//! envelopes, form-field to input mapping, the legacy swag-order
//! translation, the shape-tolerant output normalizer, stats cache
//! freshness policy, and the invocation guard used to serialize
//! "find more" calls.

pub mod error;
pub mod guard;
pub mod normalize;
pub mod session;
pub mod stats_cache;
pub mod swag;
pub mod types;
pub mod workflow;
