//! `hrflow-retention`: data-retention rules.
//!
//! **Responsibility:** decide *what* ages out and in which order, never *how*
//! it is deleted. Every data category maps to a static, ordered list of
//! [`RetentionStep`]s over the relations declared in [`plan::RELATIONS`];
//! storage adapters in `hrflow-infra` execute those steps one statement at a
//! time.

pub mod category;
pub mod plan;
pub mod policy;
pub mod report;

pub use category::DataCategory;
pub use plan::{plan_for, Relation, RetentionStep, RowFilter, Scope, RELATIONS};
pub use policy::RetentionPolicy;
pub use report::RetentionReport;
