//! Retention policy resolver: executes per-category retention plans against
//! tenant data.
//!
//! ## Components
//!
//! - `RetentionPolicyStore`: per-tenant policy lookup
//! - `RetentionStore`: executes one [`RetentionStep`](hrflow_retention::RetentionStep)
//!   as one statement (in-memory or Postgres)
//! - `RetentionResolver`: walks a category's plan, stopping at the first failure
//! - `RetentionJob`: the `gdpr_retention` job wrapping the resolver

pub mod job;
pub mod postgres;
pub mod resolver;
pub mod store;

pub use job::RetentionJob;
pub use postgres::{PostgresRetentionPolicyStore, PostgresRetentionStore};
pub use resolver::{RetentionError, RetentionResolver};
pub use store::{
    InMemoryRecordStore, InMemoryRetentionPolicyStore, Record, RetentionPolicyStore, RetentionStore,
};
