//! Error taxonomy for grade aggregation.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{ExamTypeId, StudentId, SubjectId, TrimesterId};

#[derive(Debug, Error)]
pub enum GradeError {
    /// A score fell outside `[0, max_score]`.
    #[error("invalid score {score} (max {max_score}) for student {student_id}, subject {subject_id}")]
    InvalidScore {
        student_id: StudentId,
        subject_id: SubjectId,
        score: Decimal,
        max_score: Decimal,
    },

    /// An exam type carries a negative percentage.
    #[error("invalid weight {percentage}% for exam type {exam_type_id}")]
    InvalidWeight {
        exam_type_id: ExamTypeId,
        percentage: Decimal,
    },

    /// No graded subject contributes to the average.
    #[error("no grades recorded for student {student_id} in trimester {trimester_id}")]
    NoGradesRecorded {
        student_id: StudentId,
        trimester_id: TrimesterId,
    },

    /// A weighted sum left the range `Decimal` can hold.
    #[error("arithmetic overflow while computing {0}")]
    Overflow(String),

    /// The store handed back a view that does not hang together.
    #[error("inconsistent snapshot: {0}")]
    InconsistentSnapshot(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type GradeResult<T> = Result<T, GradeError>;
