//! Infrastructure layer: storage adapters, configuration and the background
//! job orchestrator.
//!
//! ## Components
//!
//! - `jobs`: run ledger, bounded work queue, worker loop, schedulers and the
//!   [`Orchestrator`] that ties them together
//! - `retention`: executes the per-category retention plans
//! - `accrual`: applies leave accrual idempotently per (tenant, policy)
//! - `tenants`: tenant enumeration
//! - `db` / `config`: Postgres wiring and layered configuration

pub mod accrual;
pub mod config;
pub mod db;
pub mod jobs;
pub mod retention;
pub mod tenants;

mod integration_tests;

pub use config::Configuration;
pub use db::StoreError;
pub use jobs::{Orchestrator, OrchestratorConfig, OrchestratorHandle};
