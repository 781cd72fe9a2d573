//! `GradeStore` kept entirely in process memory.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{
    AttendanceRecord, BulletinAnnotations, ClassId, ExamTypeId, ExamTypeWeight, GradeEntry,
    RankScope, StudentId, StudentPlacement, SubjectCoefficient, SubjectId, Trimester, TrimesterId,
};
use crate::store::{CohortSnapshot, GradeStore};

#[derive(Debug, Default)]
struct Tables {
    students: HashMap<StudentId, StudentPlacement>,
    trimesters: HashMap<TrimesterId, Trimester>,
    exam_weights: HashMap<ExamTypeId, ExamTypeWeight>,
    coefficients: HashMap<SubjectId, SubjectCoefficient>,
    grades: Vec<GradeEntry>,
    attendance: Vec<AttendanceRecord>,
    teachers: HashMap<(ClassId, SubjectId), String>,
    subject_notes: HashMap<(StudentId, TrimesterId, SubjectId), String>,
    bulletin_notes: HashMap<(StudentId, TrimesterId), (String, String)>,
}

#[derive(Debug, Default)]
pub struct InMemoryGradeStore {
    tables: RwLock<Tables>,
}

impl InMemoryGradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_student(&self, placement: StudentPlacement) {
        let mut tables = self.tables.write().await;
        tables.students.insert(placement.student_id, placement);
    }

    pub async fn add_trimester(&self, trimester: Trimester) {
        let mut tables = self.tables.write().await;
        tables.trimesters.insert(trimester.trimester_id, trimester);
    }

    pub async fn add_exam_type(&self, weight: ExamTypeWeight) {
        let mut tables = self.tables.write().await;
        tables.exam_weights.insert(weight.exam_type_id, weight);
    }

    pub async fn add_subject(&self, coefficient: SubjectCoefficient) {
        let mut tables = self.tables.write().await;
        tables.coefficients.insert(coefficient.subject_id, coefficient);
    }

    /// Inserts a grade, replacing any earlier entry for the same
    /// (student, subject, exam type, trimester).
    pub async fn record_grade(&self, grade: GradeEntry) {
        let mut tables = self.tables.write().await;
        tables.grades.retain(|existing| {
            !(existing.student_id == grade.student_id
                && existing.subject_id == grade.subject_id
                && existing.exam_type_id == grade.exam_type_id
                && existing.trimester_id == grade.trimester_id)
        });
        tables.grades.push(grade);
    }

    pub async fn record_attendance(&self, record: AttendanceRecord) {
        let mut tables = self.tables.write().await;
        tables.attendance.push(record);
    }

    pub async fn assign_teacher(&self, class_id: ClassId, subject_id: SubjectId, name: &str) {
        let mut tables = self.tables.write().await;
        tables.teachers.insert((class_id, subject_id), name.to_string());
    }

    pub async fn note_subject(
        &self,
        student_id: StudentId,
        trimester_id: TrimesterId,
        subject_id: SubjectId,
        notes: &str,
    ) {
        let mut tables = self.tables.write().await;
        tables
            .subject_notes
            .insert((student_id, trimester_id, subject_id), notes.to_string());
    }

    pub async fn note_bulletin(
        &self,
        student_id: StudentId,
        trimester_id: TrimesterId,
        teacher_notes: &str,
        principal_notes: &str,
    ) {
        let mut tables = self.tables.write().await;
        tables.bulletin_notes.insert(
            (student_id, trimester_id),
            (teacher_notes.to_string(), principal_notes.to_string()),
        );
    }
}

fn sorted_grades<'a>(grades: impl Iterator<Item = &'a GradeEntry>) -> Vec<GradeEntry> {
    let mut selected: Vec<GradeEntry> = grades.cloned().collect();
    selected.sort_by(|a, b| {
        a.student_id
            .cmp(&b.student_id)
            .then_with(|| a.subject_id.cmp(&b.subject_id))
            .then_with(|| a.exam_type_id.cmp(&b.exam_type_id))
    });
    selected
}

#[async_trait]
impl GradeStore for InMemoryGradeStore {
    async fn fetch_grades(
        &self,
        student_id: StudentId,
        trimester_id: TrimesterId,
    ) -> anyhow::Result<Vec<GradeEntry>> {
        let tables = self.tables.read().await;
        Ok(sorted_grades(tables.grades.iter().filter(|grade| {
            grade.student_id == student_id && grade.trimester_id == trimester_id
        })))
    }

    async fn fetch_exam_weights(&self) -> anyhow::Result<HashMap<ExamTypeId, ExamTypeWeight>> {
        Ok(self.tables.read().await.exam_weights.clone())
    }

    async fn fetch_subject_coefficients(
        &self,
    ) -> anyhow::Result<HashMap<SubjectId, SubjectCoefficient>> {
        Ok(self.tables.read().await.coefficients.clone())
    }

    async fn fetch_student(&self, student_id: StudentId) -> anyhow::Result<Option<StudentPlacement>> {
        Ok(self.tables.read().await.students.get(&student_id).cloned())
    }

    async fn fetch_trimester(&self, trimester_id: TrimesterId) -> anyhow::Result<Option<Trimester>> {
        Ok(self.tables.read().await.trimesters.get(&trimester_id).cloned())
    }

    async fn fetch_cohort_snapshot(
        &self,
        scope: RankScope,
        trimester_id: TrimesterId,
    ) -> anyhow::Result<CohortSnapshot> {
        // A single read guard covers the whole snapshot.
        let tables = self.tables.read().await;

        let mut roster: Vec<StudentPlacement> = tables
            .students
            .values()
            .filter(|student| student.in_scope(&scope))
            .cloned()
            .collect();
        roster.sort_by(|a, b| a.student_id.cmp(&b.student_id));

        let grades = sorted_grades(tables.grades.iter().filter(|grade| {
            grade.trimester_id == trimester_id
                && roster.iter().any(|student| student.student_id == grade.student_id)
        }));

        Ok(CohortSnapshot {
            scope,
            trimester_id,
            roster,
            grades,
            exam_weights: tables.exam_weights.clone(),
            coefficients: tables.coefficients.clone(),
        })
    }

    async fn fetch_attendance(
        &self,
        student_id: StudentId,
        trimester_id: TrimesterId,
    ) -> anyhow::Result<Vec<AttendanceRecord>> {
        let tables = self.tables.read().await;
        let trimester = tables
            .trimesters
            .get(&trimester_id)
            .with_context(|| format!("unknown trimester {trimester_id}"))?;

        let mut records: Vec<AttendanceRecord> = tables
            .attendance
            .iter()
            .filter(|record| record.student_id == student_id && trimester.contains(record.date))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(records)
    }

    async fn fetch_annotations(
        &self,
        student_id: StudentId,
        class_id: ClassId,
        trimester_id: TrimesterId,
    ) -> anyhow::Result<BulletinAnnotations> {
        let tables = self.tables.read().await;

        let subject_teachers: HashMap<SubjectId, String> = tables
            .teachers
            .iter()
            .filter(|((class, _), _)| *class == class_id)
            .map(|((_, subject_id), name)| (*subject_id, name.clone()))
            .collect();
        let subject_notes: HashMap<SubjectId, String> = tables
            .subject_notes
            .iter()
            .filter(|((student, trimester, _), _)| {
                *student == student_id && *trimester == trimester_id
            })
            .map(|((_, _, subject_id), notes)| (*subject_id, notes.clone()))
            .collect();
        let (teacher_notes, principal_notes) = tables
            .bulletin_notes
            .get(&(student_id, trimester_id))
            .cloned()
            .unwrap_or_default();

        Ok(BulletinAnnotations {
            subject_teachers,
            subject_notes,
            teacher_notes,
            principal_notes,
        })
    }
}
