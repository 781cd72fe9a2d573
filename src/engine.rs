use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use crate::averages::{self, WeightingMode};
use crate::error::{GradeError, GradeResult};
use crate::models::{
    OverallAverage, RankEntry, RankScope, StudentId, StudentPlacement, SubjectAverage,
    SubjectCoefficient, SubjectId, TrimesterId,
};
use crate::ranking;
use crate::store::{CohortSnapshot, GradeStore};

/// Overall averages of a cohort, with the students that had nothing to average.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortAverages {
    pub averages: BTreeMap<StudentId, OverallAverage>,
    pub excluded: Vec<StudentId>,
}

/// Computes every overall average in a snapshot. Students without grades
/// land in `excluded`; any other failure aborts the whole cohort.
pub fn cohort_averages(snapshot: &CohortSnapshot, mode: WeightingMode) -> GradeResult<CohortAverages> {
    snapshot.verify()?;

    let mut averages = BTreeMap::new();
    let mut excluded = Vec::new();

    for student in &snapshot.roster {
        let subjects = averages::subject_averages(
            student.student_id,
            snapshot.trimester_id,
            &snapshot.grades,
            &snapshot.exam_weights,
            mode,
        )?;

        match averages::overall_average(
            student.student_id,
            snapshot.trimester_id,
            subjects.values(),
            &snapshot.coefficients,
        ) {
            Ok(overall) => {
                averages.insert(student.student_id, overall);
            }
            Err(GradeError::NoGradesRecorded { student_id, .. }) => {
                debug!(%student_id, "no grades recorded, excluded from cohort");
                excluded.push(student_id);
            }
            Err(err) => return Err(err),
        }
    }

    Ok(CohortAverages { averages, excluded })
}

/// A graded subject together with the subject record it was averaged under.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectStanding {
    pub subject: SubjectCoefficient,
    pub average: SubjectAverage,
}

/// Everything a bulletin states about one student, taken from one snapshot
/// so the averages and both ranks always agree.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentStanding {
    pub placement: StudentPlacement,
    pub subjects: Vec<SubjectStanding>,
    /// `None` when the student has nothing to average.
    pub overall: Option<OverallAverage>,
    pub class_rank: Option<RankEntry>,
    pub level_rank: Option<RankEntry>,
}

/// Derives one student's standing from a level snapshot. The class rank
/// reuses the same averages, restricted to the student's class.
pub fn student_standing(
    snapshot: &CohortSnapshot,
    student_id: StudentId,
    mode: WeightingMode,
) -> GradeResult<StudentStanding> {
    if !matches!(snapshot.scope, RankScope::Level(_)) {
        return Err(GradeError::InconsistentSnapshot(format!(
            "student standing needs a level snapshot, got {}",
            snapshot.scope
        )));
    }

    let cohort = cohort_averages(snapshot, mode)?;
    let placement = snapshot
        .roster
        .iter()
        .find(|student| student.student_id == student_id)
        .cloned()
        .ok_or_else(|| {
            GradeError::InconsistentSnapshot(format!(
                "student {student_id} is not on the {} roster",
                snapshot.scope
            ))
        })?;

    let averages = averages::subject_averages(
        student_id,
        snapshot.trimester_id,
        &snapshot.grades,
        &snapshot.exam_weights,
        mode,
    )?;
    let mut subjects = Vec::with_capacity(averages.len());
    for average in averages.into_values() {
        let subject = snapshot
            .coefficients
            .get(&average.subject_id)
            .cloned()
            .ok_or_else(|| {
                GradeError::InconsistentSnapshot(format!(
                    "subject {} has grades but no coefficient",
                    average.subject_id
                ))
            })?;
        subjects.push(SubjectStanding { subject, average });
    }

    let overall = cohort.averages.get(&student_id).cloned();
    let (class_rank, level_rank) = if overall.is_some() {
        let level: Vec<OverallAverage> = cohort.averages.values().cloned().collect();
        let class: Vec<OverallAverage> = snapshot
            .roster
            .iter()
            .filter(|student| student.class_id == placement.class_id)
            .filter_map(|student| cohort.averages.get(&student.student_id).cloned())
            .collect();
        (
            ranking::rank_cohort(RankScope::Class(placement.class_id), &class).remove(&student_id),
            ranking::rank_cohort(snapshot.scope, &level).remove(&student_id),
        )
    } else {
        (None, None)
    };

    Ok(StudentStanding {
        placement,
        subjects,
        overall,
        class_rank,
        level_rank,
    })
}

pub struct GradeEngine<S> {
    store: S,
    mode: WeightingMode,
}

impl<S: GradeStore> GradeEngine<S> {
    pub fn new(store: S, mode: WeightingMode) -> Self {
        Self { store, mode }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    #[instrument(skip(self), fields(mode = ?self.mode))]
    pub async fn compute_subject_averages(
        &self,
        student_id: StudentId,
        trimester_id: TrimesterId,
    ) -> GradeResult<BTreeMap<SubjectId, SubjectAverage>> {
        let grades = self.store.fetch_grades(student_id, trimester_id).await?;
        let weights = self.store.fetch_exam_weights().await?;
        let subjects =
            averages::subject_averages(student_id, trimester_id, &grades, &weights, self.mode)?;
        debug!(grades = grades.len(), subjects = subjects.len(), "subject averages computed");
        Ok(subjects)
    }

    #[instrument(skip(self), fields(mode = ?self.mode))]
    pub async fn compute_overall_average(
        &self,
        student_id: StudentId,
        trimester_id: TrimesterId,
    ) -> GradeResult<OverallAverage> {
        let subjects = self.compute_subject_averages(student_id, trimester_id).await?;
        let coefficients = self.store.fetch_subject_coefficients().await?;
        averages::overall_average(student_id, trimester_id, subjects.values(), &coefficients)
    }

    #[instrument(skip(self), fields(mode = ?self.mode))]
    pub async fn fetch_cohort_overall_averages(
        &self,
        scope: RankScope,
        trimester_id: TrimesterId,
    ) -> GradeResult<CohortAverages> {
        let snapshot = self.store.fetch_cohort_snapshot(scope, trimester_id).await?;
        cohort_averages(&snapshot, self.mode)
    }

    #[instrument(skip(self), fields(mode = ?self.mode))]
    pub async fn compute_ranks(
        &self,
        scope: RankScope,
        trimester_id: TrimesterId,
    ) -> GradeResult<BTreeMap<StudentId, RankEntry>> {
        let cohort = self.fetch_cohort_overall_averages(scope, trimester_id).await?;
        let averages: Vec<OverallAverage> = cohort.averages.into_values().collect();
        let ranks = ranking::rank_cohort(scope, &averages);
        info!(
            ranked = ranks.len(),
            excluded = cohort.excluded.len(),
            "cohort ranked"
        );
        Ok(ranks)
    }

    /// Subject lines, overall average and both ranks of one student from a
    /// single read of the student's level.
    #[instrument(skip(self), fields(mode = ?self.mode))]
    pub async fn compute_student_standing(
        &self,
        student_id: StudentId,
        trimester_id: TrimesterId,
    ) -> GradeResult<StudentStanding> {
        let student = self
            .store
            .fetch_student(student_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("unknown student {student_id}"))?;
        let snapshot = self
            .store
            .fetch_cohort_snapshot(RankScope::Level(student.level_id), trimester_id)
            .await?;
        let standing = student_standing(&snapshot, student_id, self.mode)?;
        debug!(
            subjects = standing.subjects.len(),
            ranked = standing.level_rank.is_some(),
            "student standing computed"
        );
        Ok(standing)
    }
}
