//! `hrflow-core`: identifiers and error model shared by every hrflow crate.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod tenant;

pub use error::{DomainError, DomainResult};
pub use id::{EmployeeId, LeavePolicyId, TenantId};
pub use tenant::TenantScoped;
