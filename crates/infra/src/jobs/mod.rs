//! Background job orchestration.
//!
//! ## Design
//!
//! - Jobs are tenant-scoped and typed (`leave_accrual`, `gdpr_retention`)
//! - Every execution is recorded in the run ledger (`running` → `completed` | `failed`)
//! - Queued work goes through a bounded, drop-on-full queue and a single worker
//! - `run_now` executes inline and returns the job's error to the caller
//! - Two schedulers sweep all tenants on fixed intervals
//!
//! ## Components
//!
//! - `Job`: unit of work (`AccrualJob`, `RetentionJob`, closures via `FnJob`)
//! - `JobRunStore`: run ledger (in-memory or Postgres)
//! - `JobQueue`: bounded work queue
//! - `JobExecutor`: ledgered execution shared by the worker and `run_now`
//! - `Orchestrator`: wires queue, worker and schedulers; `start`/`shutdown`

pub mod executor;
pub mod job;
pub mod orchestrator;
pub mod postgres;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod types;

pub use executor::JobExecutor;
pub use job::{BoxedJob, FnJob, Job, JobError, JobFailure, JobOutcome};
pub use orchestrator::{JobServices, Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorHandle};
pub use postgres::PostgresJobRunStore;
pub use queue::{DEFAULT_QUEUE_CAPACITY, JobQueue};
pub use store::{InMemoryJobRunStore, JobRunFilter, JobRunPage, JobRunStore, Pagination};
pub use types::{JobRun, JobRunId, JobStatus, JobType};
