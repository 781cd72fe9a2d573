use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{GradeError, GradeResult};
use crate::models::{
    ExamTypeId, ExamTypeWeight, GradeEntry, OverallAverage, StudentId, SubjectAverage,
    SubjectCoefficient, SubjectId, TrimesterId,
};

/// Decimal places kept on every published average.
pub const AVERAGE_DP: u32 = 2;

/// How exam percentages turn into a subject average.
///
/// `Literal` sums `score * percentage / 100` and stops there, so the result is
/// only a true average when the percentages of the recorded exams add up to 100.
/// `Normalized` divides that sum by the share of weight actually recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WeightingMode {
    #[default]
    Literal,
    Normalized,
}

pub fn validate_weight(weight: &ExamTypeWeight) -> GradeResult<()> {
    if weight.percentage.is_sign_negative() && !weight.percentage.is_zero() {
        return Err(GradeError::InvalidWeight {
            exam_type_id: weight.exam_type_id,
            percentage: weight.percentage,
        });
    }
    Ok(())
}

fn overflow(what: &str, subject_id: SubjectId) -> GradeError {
    GradeError::Overflow(format!("{what} for subject {subject_id}"))
}

pub fn validate_score(entry: &GradeEntry) -> GradeResult<()> {
    if entry.score < Decimal::ZERO || entry.score > entry.max_score {
        return Err(GradeError::InvalidScore {
            student_id: entry.student_id,
            subject_id: entry.subject_id,
            score: entry.score,
            max_score: entry.max_score,
        });
    }
    Ok(())
}

/// Reduces the entries of one subject to its average.
///
/// Returns `Ok(None)` when nothing contributes, which callers treat as
/// "subject not graded" rather than a zero.
pub fn subject_average<'a, I>(
    entries: I,
    weights: &HashMap<ExamTypeId, ExamTypeWeight>,
    mode: WeightingMode,
) -> GradeResult<Option<Decimal>>
where
    I: IntoIterator<Item = &'a GradeEntry>,
{
    let mut weighted_sum = Decimal::ZERO;
    let mut total_percentage = Decimal::ZERO;
    let mut count = 0usize;

    for entry in entries {
        let weight = weights.get(&entry.exam_type_id).ok_or_else(|| {
            GradeError::InconsistentSnapshot(format!(
                "grade references exam type {} with no weight",
                entry.exam_type_id
            ))
        })?;
        validate_weight(weight)?;
        validate_score(entry)?;

        let contribution = weight
            .percentage
            .checked_div(Decimal::ONE_HUNDRED)
            .and_then(|share| entry.score.checked_mul(share))
            .ok_or_else(|| overflow("a weighted score", entry.subject_id))?;
        weighted_sum = weighted_sum
            .checked_add(contribution)
            .ok_or_else(|| overflow("a subject average", entry.subject_id))?;
        total_percentage = total_percentage
            .checked_add(weight.percentage)
            .ok_or_else(|| overflow("the recorded weight", entry.subject_id))?;
        count += 1;
    }

    if count == 0 {
        return Ok(None);
    }

    let average = match mode {
        WeightingMode::Literal => weighted_sum,
        WeightingMode::Normalized => {
            if total_percentage.is_zero() {
                return Ok(None);
            }
            weighted_sum
                .checked_mul(Decimal::ONE_HUNDRED)
                .and_then(|scaled| scaled.checked_div(total_percentage))
                .ok_or_else(|| GradeError::Overflow("a normalized subject average".to_string()))?
        }
    };

    Ok(Some(average.round_dp(AVERAGE_DP)))
}

/// Groups a student's grades by subject and averages each group.
pub fn subject_averages(
    student_id: StudentId,
    trimester_id: TrimesterId,
    grades: &[GradeEntry],
    weights: &HashMap<ExamTypeId, ExamTypeWeight>,
    mode: WeightingMode,
) -> GradeResult<BTreeMap<SubjectId, SubjectAverage>> {
    let mut by_subject: BTreeMap<SubjectId, Vec<&GradeEntry>> = BTreeMap::new();

    for grade in grades {
        if grade.student_id != student_id || grade.trimester_id != trimester_id {
            continue;
        }
        by_subject.entry(grade.subject_id).or_default().push(grade);
    }

    let mut averages = BTreeMap::new();
    for (subject_id, entries) in by_subject {
        let grade_count = entries.len();
        if let Some(average) = subject_average(entries, weights, mode)? {
            averages.insert(
                subject_id,
                SubjectAverage {
                    student_id,
                    subject_id,
                    trimester_id,
                    average,
                    grade_count,
                },
            );
        }
    }

    Ok(averages)
}

/// Coefficient-weighted mean of subject averages.
pub fn overall_average<'a, I>(
    student_id: StudentId,
    trimester_id: TrimesterId,
    subject_averages: I,
    coefficients: &HashMap<SubjectId, SubjectCoefficient>,
) -> GradeResult<OverallAverage>
where
    I: IntoIterator<Item = &'a SubjectAverage>,
{
    let mut weighted_sum = Decimal::ZERO;
    let mut total_coefficient = Decimal::ZERO;

    for subject in subject_averages {
        let coefficient = coefficients.get(&subject.subject_id).ok_or_else(|| {
            GradeError::InconsistentSnapshot(format!(
                "subject {} has grades but no coefficient",
                subject.subject_id
            ))
        })?;
        if coefficient.coefficient <= Decimal::ZERO {
            return Err(GradeError::InconsistentSnapshot(format!(
                "subject {} has non-positive coefficient {}",
                subject.subject_id, coefficient.coefficient
            )));
        }

        weighted_sum = subject
            .average
            .checked_mul(coefficient.coefficient)
            .and_then(|weighted| weighted_sum.checked_add(weighted))
            .ok_or_else(|| overflow("the overall average", subject.subject_id))?;
        total_coefficient = total_coefficient
            .checked_add(coefficient.coefficient)
            .ok_or_else(|| overflow("the total coefficient", subject.subject_id))?;
    }

    if total_coefficient.is_zero() {
        return Err(GradeError::NoGradesRecorded {
            student_id,
            trimester_id,
        });
    }

    let average = weighted_sum.checked_div(total_coefficient).ok_or_else(|| {
        GradeError::Overflow(format!("the overall average of student {student_id}"))
    })?;

    Ok(OverallAverage {
        student_id,
        trimester_id,
        average: average.round_dp(AVERAGE_DP),
        total_coefficient,
    })
}
