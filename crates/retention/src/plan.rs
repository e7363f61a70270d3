//! Ordered retention steps per data category.
//!
//! A step targets one table and runs as one self-contained statement. Within a
//! category, dependants of a parent row set are always purged (or detached)
//! before the parent set itself; `tests::every_plan_clears_dependants_first`
//! checks that against [`RELATIONS`].

use crate::category::DataCategory;

/// Equality predicate on a text column, e.g. `status = 'finalized'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowFilter {
    pub column: &'static str,
    pub equals: &'static str,
}

/// A set of rows in one table, relative to a tenant and a cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Rows whose `age_column` is strictly before the cutoff.
    Aged {
        table: &'static str,
        age_column: &'static str,
        filter: Option<RowFilter>,
    },
    /// Rows whose `foreign_key` points into the `parent` scope.
    ChildrenOf {
        table: &'static str,
        foreign_key: &'static str,
        parent: &'static Scope,
    },
}

impl Scope {
    pub const fn table(&self) -> &'static str {
        match self {
            Scope::Aged { table, .. } | Scope::ChildrenOf { table, .. } => *table,
        }
    }
}

/// One retention statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionStep {
    /// Hard-delete every row in the scope.
    Purge(Scope),
    /// Keep rows of `table` but null out `foreign_key` where it points into `parent`.
    Detach {
        table: &'static str,
        foreign_key: &'static str,
        parent: &'static Scope,
    },
}

impl RetentionStep {
    pub const fn table(&self) -> &'static str {
        match self {
            RetentionStep::Purge(scope) => scope.table(),
            RetentionStep::Detach { table, .. } => *table,
        }
    }

    /// Whether this step releases `child.foreign_key` references into `parent`.
    #[cfg(test)]
    fn releases(&self, child: &str, foreign_key: &str, parent: &Scope) -> bool {
        match self {
            RetentionStep::Purge(Scope::ChildrenOf {
                table,
                foreign_key: fk,
                parent: p,
            })
            | RetentionStep::Detach {
                table,
                foreign_key: fk,
                parent: p,
            } => *table == child && *fk == foreign_key && **p == *parent,
            RetentionStep::Purge(Scope::Aged { .. }) => false,
        }
    }
}

/// A foreign key between two retention-managed tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub child: &'static str,
    pub foreign_key: &'static str,
    pub parent: &'static str,
}

const fn rel(child: &'static str, foreign_key: &'static str, parent: &'static str) -> Relation {
    Relation {
        child,
        foreign_key,
        parent,
    }
}

/// Every foreign key between tables touched by a retention plan.
pub const RELATIONS: &[Relation] = &[
    rel("leave_approvals", "leave_request_id", "leave_requests"),
    rel("payroll_inputs", "period_id", "payroll_periods"),
    rel("payroll_adjustments", "period_id", "payroll_periods"),
    rel("payroll_results", "period_id", "payroll_periods"),
    rel("payslips", "period_id", "payroll_periods"),
    rel("payroll_journal_exports", "period_id", "payroll_periods"),
    rel("review_responses", "task_id", "review_tasks"),
    rel("review_tasks", "cycle_id", "review_cycles"),
    rel("goal_comments", "goal_id", "goals"),
    rel("feedback", "goal_id", "goals"),
];

const fn aged(table: &'static str, age_column: &'static str) -> Scope {
    Scope::Aged {
        table,
        age_column,
        filter: None,
    }
}

const fn aged_where(table: &'static str, age_column: &'static str, column: &'static str, equals: &'static str) -> Scope {
    Scope::Aged {
        table,
        age_column,
        filter: Some(RowFilter { column, equals }),
    }
}

const fn children(table: &'static str, foreign_key: &'static str, parent: &'static Scope) -> Scope {
    Scope::ChildrenOf {
        table,
        foreign_key,
        parent,
    }
}

const AUDIT_EVENTS: Scope = aged("audit_events", "created_at");

const AUDIT_PLAN: &[RetentionStep] = &[RetentionStep::Purge(AUDIT_EVENTS)];

const LEAVE_REQUESTS: Scope = aged("leave_requests", "created_at");

const LEAVE_PLAN: &[RetentionStep] = &[
    RetentionStep::Purge(children("leave_approvals", "leave_request_id", &LEAVE_REQUESTS)),
    RetentionStep::Purge(aged("leave_approvals", "created_at")),
    RetentionStep::Purge(LEAVE_REQUESTS),
];

const FINALIZED_PERIODS: Scope = aged_where("payroll_periods", "period_end", "status", "finalized");

const PAYROLL_PLAN: &[RetentionStep] = &[
    RetentionStep::Purge(children("payroll_inputs", "period_id", &FINALIZED_PERIODS)),
    RetentionStep::Purge(children("payroll_adjustments", "period_id", &FINALIZED_PERIODS)),
    RetentionStep::Purge(children("payroll_results", "period_id", &FINALIZED_PERIODS)),
    RetentionStep::Purge(children("payslips", "period_id", &FINALIZED_PERIODS)),
    RetentionStep::Purge(children("payroll_journal_exports", "period_id", &FINALIZED_PERIODS)),
    RetentionStep::Purge(FINALIZED_PERIODS),
];

const GOALS: Scope = aged("goals", "created_at");
const REVIEW_CYCLES: Scope = aged("review_cycles", "created_at");
const REVIEW_TASKS: Scope = aged("review_tasks", "created_at");
const TASKS_OF_EXPIRING_CYCLES: Scope = children("review_tasks", "cycle_id", &REVIEW_CYCLES);

const PERFORMANCE_PLAN: &[RetentionStep] = &[
    RetentionStep::Detach {
        table: "feedback",
        foreign_key: "goal_id",
        parent: &GOALS,
    },
    RetentionStep::Purge(children("review_responses", "task_id", &TASKS_OF_EXPIRING_CYCLES)),
    RetentionStep::Purge(children("review_responses", "task_id", &REVIEW_TASKS)),
    RetentionStep::Purge(aged("review_responses", "created_at")),
    RetentionStep::Purge(TASKS_OF_EXPIRING_CYCLES),
    RetentionStep::Purge(REVIEW_TASKS),
    RetentionStep::Purge(REVIEW_CYCLES),
    RetentionStep::Purge(children("goal_comments", "goal_id", &GOALS)),
    RetentionStep::Purge(aged("goal_comments", "created_at")),
    RetentionStep::Purge(GOALS),
    RetentionStep::Purge(aged("feedback", "created_at")),
    RetentionStep::Purge(aged("check_ins", "created_at")),
    RetentionStep::Purge(aged("performance_improvement_plans", "created_at")),
];

const GDPR_PLAN: &[RetentionStep] = &[
    RetentionStep::Purge(aged_where("dsar_exports", "completed_at", "status", "completed")),
    RetentionStep::Purge(aged_where("anonymization_jobs", "completed_at", "status", "completed")),
];

const ACCESS_LOGS_PLAN: &[RetentionStep] = &[RetentionStep::Purge(aged("access_logs", "created_at"))];

const NOTIFICATIONS_PLAN: &[RetentionStep] = &[RetentionStep::Purge(aged("notifications", "created_at"))];

/// Ordered steps for a category. Empty for categories without a strategy.
pub fn plan_for(category: &DataCategory) -> &'static [RetentionStep] {
    match category {
        DataCategory::Audit => AUDIT_PLAN,
        DataCategory::Leave => LEAVE_PLAN,
        DataCategory::Payroll => PAYROLL_PLAN,
        DataCategory::Performance => PERFORMANCE_PLAN,
        DataCategory::Gdpr => GDPR_PLAN,
        DataCategory::AccessLogs => ACCESS_LOGS_PLAN,
        DataCategory::Notifications => NOTIFICATIONS_PLAN,
        DataCategory::Other(_) => &[],
    }
}
