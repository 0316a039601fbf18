use crate::models::record::Record;
use thiserror::Error;

/// Why pagination stopped before the quota was met.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExhaustReason {
    #[error("no control found for page {0}")]
    NoPageControl(u32),

    #[error("page {0} rendered no rows")]
    EmptyPage(u32),
}

/// Why a run is reported as failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("history control not found")]
    HistoryControlNotFound,

    #[error("session failure on page {page}: {message}")]
    Session { page: u32, message: String },

    #[error("session failure before pagination: {0}")]
    Setup(String),

    #[error("cancelled before page {0}")]
    Cancelled(u32),
}

/// Terminal result of one extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The quota was met exactly.
    Success(Vec<Record>),
    /// The source ran out of rows first.
    PartialSuccess {
        records: Vec<Record>,
        reason: ExhaustReason,
    },
    /// The run was aborted. Rows accumulated before the abort are kept.
    Failure {
        records: Vec<Record>,
        reason: FailureReason,
    },
}

impl Outcome {
    pub fn records(&self) -> &[Record] {
        match self {
            Outcome::Success(records) => records,
            Outcome::PartialSuccess { records, .. } => records,
            Outcome::Failure { records, .. } => records,
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Outcome::Success(records) => records,
            Outcome::PartialSuccess { records, .. } => records,
            Outcome::Failure { records, .. } => records,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::PartialSuccess { .. } => "partial",
            Outcome::Failure { .. } => "failure",
        }
    }

    /// Human-readable reason for any result short of a full quota.
    pub fn reason(&self) -> Option<String> {
        match self {
            Outcome::Success(_) => None,
            Outcome::PartialSuccess { reason, .. } => Some(reason.to_string()),
            Outcome::Failure { reason, .. } => Some(reason.to_string()),
        }
    }
}
