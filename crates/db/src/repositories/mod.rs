//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods
//! that accept `&PgPool` as the first argument.

pub mod workflow_stats_repo;

pub use workflow_stats_repo::WorkflowStatsRepo;
