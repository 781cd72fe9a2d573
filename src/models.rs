use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type StudentId = Uuid;
pub type SubjectId = Uuid;
pub type ExamTypeId = Uuid;
pub type TrimesterId = Uuid;
pub type ClassId = Uuid;
pub type LevelId = Uuid;

/// One recorded exam grade. Corrections replace the row and bump `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeEntry {
    pub student_id: StudentId,
    pub subject_id: SubjectId,
    pub exam_type_id: ExamTypeId,
    pub trimester_id: TrimesterId,
    pub score: Decimal,
    pub max_score: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamTypeWeight {
    pub exam_type_id: ExamTypeId,
    pub name: String,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectCoefficient {
    pub subject_id: SubjectId,
    pub name: String,
    /// Arabic display name; empty when the school never entered one.
    pub name_ar: String,
    pub coefficient: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAverage {
    pub student_id: StudentId,
    pub subject_id: SubjectId,
    pub trimester_id: TrimesterId,
    pub average: Decimal,
    pub grade_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallAverage {
    pub student_id: StudentId,
    pub trimester_id: TrimesterId,
    pub average: Decimal,
    pub total_coefficient: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum RankScope {
    Class(ClassId),
    Level(LevelId),
}

impl std::fmt::Display for RankScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankScope::Class(id) => write!(f, "class {id}"),
            RankScope::Level(id) => write!(f, "level {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub student_id: StudentId,
    pub scope: RankScope,
    pub rank: u32,
    pub cohort_size: u32,
}

/// Where a student sits for one academic year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentPlacement {
    pub student_id: StudentId,
    pub full_name: String,
    pub class_id: ClassId,
    pub class_name: String,
    pub level_id: LevelId,
}

impl StudentPlacement {
    pub fn in_scope(&self, scope: &RankScope) -> bool {
        match scope {
            RankScope::Class(id) => self.class_id == *id,
            RankScope::Level(id) => self.level_id == *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: StudentId,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceSummary {
    pub total_days: u32,
    pub present_days: u32,
    pub absent_days: u32,
    pub attendance_rate: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trimester {
    pub trimester_id: TrimesterId,
    pub name: String,
    pub academic_year: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Trimester {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

/// Free-text remarks printed on a bulletin. None of it feeds the averages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletinAnnotations {
    /// Teacher of each subject for the student's class.
    pub subject_teachers: HashMap<SubjectId, String>,
    /// Per-subject remark for this student and trimester.
    pub subject_notes: HashMap<SubjectId, String>,
    pub teacher_notes: String,
    pub principal_notes: String,
}
