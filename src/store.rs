//! Repository seam between the aggregation core and whatever keeps the grades.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::{GradeError, GradeResult};
use crate::models::{
    AttendanceRecord, BulletinAnnotations, ClassId, ExamTypeId, ExamTypeWeight, GradeEntry,
    RankScope, StudentId, StudentPlacement, SubjectCoefficient, SubjectId, Trimester, TrimesterId,
};

/// One consistent read of everything a ranking needs.
#[derive(Debug, Clone)]
pub struct CohortSnapshot {
    pub scope: RankScope,
    pub trimester_id: TrimesterId,
    pub roster: Vec<StudentPlacement>,
    pub grades: Vec<GradeEntry>,
    pub exam_weights: HashMap<ExamTypeId, ExamTypeWeight>,
    pub coefficients: HashMap<SubjectId, SubjectCoefficient>,
}

impl CohortSnapshot {
    /// Rejects views where grades point at rows the snapshot does not carry.
    pub fn verify(&self) -> GradeResult<()> {
        let members: HashSet<StudentId> = self.roster.iter().map(|s| s.student_id).collect();

        for student in &self.roster {
            if !student.in_scope(&self.scope) {
                return Err(GradeError::InconsistentSnapshot(format!(
                    "student {} listed outside {}",
                    student.student_id, self.scope
                )));
            }
        }

        for grade in &self.grades {
            if grade.trimester_id != self.trimester_id {
                return Err(GradeError::InconsistentSnapshot(format!(
                    "grade for trimester {} in snapshot of {}",
                    grade.trimester_id, self.trimester_id
                )));
            }
            if !members.contains(&grade.student_id) {
                return Err(GradeError::InconsistentSnapshot(format!(
                    "grade for student {} outside {}",
                    grade.student_id, self.scope
                )));
            }
            if !self.exam_weights.contains_key(&grade.exam_type_id) {
                return Err(GradeError::InconsistentSnapshot(format!(
                    "exam type {} missing from snapshot",
                    grade.exam_type_id
                )));
            }
            if !self.coefficients.contains_key(&grade.subject_id) {
                return Err(GradeError::InconsistentSnapshot(format!(
                    "subject {} missing from snapshot",
                    grade.subject_id
                )));
            }
        }

        Ok(())
    }

}

#[async_trait]
pub trait GradeStore: Send + Sync {
    /// Grades of one student, ordered by subject then exam type.
    async fn fetch_grades(
        &self,
        student_id: StudentId,
        trimester_id: TrimesterId,
    ) -> anyhow::Result<Vec<GradeEntry>>;

    async fn fetch_exam_weights(&self) -> anyhow::Result<HashMap<ExamTypeId, ExamTypeWeight>>;

    async fn fetch_subject_coefficients(
        &self,
    ) -> anyhow::Result<HashMap<SubjectId, SubjectCoefficient>>;

    async fn fetch_student(&self, student_id: StudentId) -> anyhow::Result<Option<StudentPlacement>>;

    async fn fetch_trimester(&self, trimester_id: TrimesterId) -> anyhow::Result<Option<Trimester>>;

    /// Roster, grades, weights and coefficients read as one unit.
    async fn fetch_cohort_snapshot(
        &self,
        scope: RankScope,
        trimester_id: TrimesterId,
    ) -> anyhow::Result<CohortSnapshot>;

    /// Attendance records dated inside the trimester.
    async fn fetch_attendance(
        &self,
        student_id: StudentId,
        trimester_id: TrimesterId,
    ) -> anyhow::Result<Vec<AttendanceRecord>>;

    /// Teacher names and remarks for one student's bulletin.
    async fn fetch_annotations(
        &self,
        student_id: StudentId,
        class_id: ClassId,
        trimester_id: TrimesterId,
    ) -> anyhow::Result<BulletinAnnotations>;
}
