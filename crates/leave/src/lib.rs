//! `hrflow-leave`: leave accrual rules.
//!
//! Pure domain: leave policies, accrual periods and the per-policy accrual
//! watermark. Storage and scheduling live in `hrflow-infra`.

pub mod accrual;
pub mod policy;

pub use accrual::{AccrualFrequency, AccrualRun};
pub use policy::LeavePolicy;
