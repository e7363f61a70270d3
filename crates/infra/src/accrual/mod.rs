//! Leave accrual: credits leave balances once per accrual period, tracked by
//! a per-(tenant, policy) watermark.

pub mod job;
pub mod postgres;
pub mod resolver;
pub mod store;

pub use job::AccrualJob;
pub use postgres::PostgresAccrualStore;
pub use resolver::{AccrualError, AccrualReport, AccrualResolver, PolicyAccrual, PolicyAccrualStatus};
pub use store::{AccrualApplication, AccrualStore, InMemoryAccrualStore};
