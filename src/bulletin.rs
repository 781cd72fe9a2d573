use std::fmt::Write;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::attendance;
use crate::engine::GradeEngine;
use crate::error::GradeResult;
use crate::models::{
    AttendanceSummary, RankEntry, StudentId, StudentPlacement, Trimester, TrimesterId,
};
use crate::store::GradeStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Fr,
    Ar,
}

struct Labels {
    title: &'static str,
    student: &'static str,
    full_name: &'static str,
    class: &'static str,
    academic_year: &'static str,
    trimester: &'static str,
    results: &'static str,
    overall: &'static str,
    class_rank: &'static str,
    level_rank: &'static str,
    grades: &'static str,
    subject: &'static str,
    coefficient: &'static str,
    average: &'static str,
    teacher: &'static str,
    remarks: &'static str,
    attendance: &'static str,
    total_days: &'static str,
    present_days: &'static str,
    absent_days: &'static str,
    rate: &'static str,
    missing: &'static str,
    no_grades: &'static str,
    teacher_notes: &'static str,
    principal_notes: &'static str,
}

const FR: Labels = Labels {
    title: "Bulletin Scolaire",
    student: "Informations élève",
    full_name: "Nom complet",
    class: "Classe",
    academic_year: "Année scolaire",
    trimester: "Trimestre",
    results: "Résultats académiques",
    overall: "Moyenne générale",
    class_rank: "Rang dans la classe",
    level_rank: "Rang dans le niveau",
    grades: "Détail des notes",
    subject: "Matière",
    coefficient: "Coefficient",
    average: "Moyenne",
    teacher: "Enseignant",
    remarks: "Remarques",
    attendance: "Assiduité",
    total_days: "Total des jours",
    present_days: "Jours présents",
    absent_days: "Jours absents",
    rate: "Taux d'assiduité",
    missing: "N/A",
    no_grades: "Aucune note enregistrée pour ce trimestre.",
    teacher_notes: "Observations de l'enseignant",
    principal_notes: "Observations du directeur",
};

const AR: Labels = Labels {
    title: "كشف النقاط",
    student: "معلومات التلميذ",
    full_name: "الاسم الكامل",
    class: "الفصل",
    academic_year: "السنة الدراسية",
    trimester: "الثلث",
    results: "النتائج الأكاديمية",
    overall: "المعدل العام",
    class_rank: "الترتيب في الفصل",
    level_rank: "الترتيب في المستوى",
    grades: "تفاصيل الدرجات",
    subject: "المادة",
    coefficient: "المعامل",
    average: "المعدل",
    teacher: "المعلم",
    remarks: "ملاحظات",
    attendance: "الحضور",
    total_days: "إجمالي الأيام",
    present_days: "أيام الحضور",
    absent_days: "أيام الغياب",
    rate: "معدل الحضور",
    missing: "غير متوفر",
    no_grades: "لا توجد درجات مسجلة لهذا الثلث.",
    teacher_notes: "ملاحظات المعلم",
    principal_notes: "ملاحظات المدير",
};

impl Language {
    fn labels(&self) -> &'static Labels {
        match self {
            Language::Fr => &FR,
            Language::Ar => &AR,
        }
    }
}

/// Remarks longer than this are cut in the grades table.
const NOTE_WIDTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulletinSubject {
    pub subject_name: String,
    pub subject_name_ar: String,
    pub coefficient: Decimal,
    pub average: Decimal,
    pub teacher_name: String,
    pub teacher_notes: String,
}

impl BulletinSubject {
    fn display_name(&self, language: Language) -> &str {
        match language {
            Language::Ar if !self.subject_name_ar.is_empty() => &self.subject_name_ar,
            _ => &self.subject_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rank {
    pub rank: u32,
    pub cohort_size: u32,
}

impl From<&RankEntry> for Rank {
    fn from(entry: &RankEntry) -> Self {
        Self {
            rank: entry.rank,
            cohort_size: entry.cohort_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bulletin {
    pub student: StudentPlacement,
    pub trimester: Trimester,
    pub subjects: Vec<BulletinSubject>,
    /// `None` when no grade was recorded; never shown as zero.
    pub overall_average: Option<Decimal>,
    pub class_rank: Option<Rank>,
    pub level_rank: Option<Rank>,
    pub attendance: AttendanceSummary,
    pub teacher_notes: String,
    pub principal_notes: String,
}

/// Gathers averages, ranks, attendance and remarks for one student's
/// bulletin. Averages and ranks come from one snapshot of the student's level.
pub async fn assemble<S: GradeStore>(
    engine: &GradeEngine<S>,
    student_id: StudentId,
    trimester_id: TrimesterId,
) -> GradeResult<Bulletin> {
    let store = engine.store();
    let trimester = store
        .fetch_trimester(trimester_id)
        .await?
        .with_context(|| format!("unknown trimester {trimester_id}"))?;

    let standing = engine.compute_student_standing(student_id, trimester_id).await?;
    let mut annotations = store
        .fetch_annotations(student_id, standing.placement.class_id, trimester_id)
        .await?;

    let mut subjects: Vec<BulletinSubject> = standing
        .subjects
        .iter()
        .map(|line| BulletinSubject {
            subject_name: line.subject.name.clone(),
            subject_name_ar: line.subject.name_ar.clone(),
            coefficient: line.subject.coefficient,
            average: line.average.average,
            teacher_name: annotations
                .subject_teachers
                .remove(&line.subject.subject_id)
                .unwrap_or_default(),
            teacher_notes: annotations
                .subject_notes
                .remove(&line.subject.subject_id)
                .unwrap_or_default(),
        })
        .collect();
    subjects.sort_by(|a, b| a.subject_name.cmp(&b.subject_name));

    let records = store.fetch_attendance(student_id, trimester_id).await?;

    Ok(Bulletin {
        student: standing.placement,
        trimester,
        subjects,
        overall_average: standing.overall.map(|overall| overall.average),
        class_rank: standing.class_rank.as_ref().map(Rank::from),
        level_rank: standing.level_rank.as_ref().map(Rank::from),
        attendance: attendance::summarize(&records),
        teacher_notes: annotations.teacher_notes,
        principal_notes: annotations.principal_notes,
    })
}

fn truncate_note(note: &str) -> String {
    if note.chars().count() > NOTE_WIDTH {
        let cut: String = note.chars().take(NOTE_WIDTH).collect();
        format!("{cut}...")
    } else {
        note.to_string()
    }
}

pub fn render_markdown(bulletin: &Bulletin, language: Language) -> String {
    let labels = language.labels();
    let mut output = String::new();

    let _ = writeln!(output, "# {}", labels.title);
    let _ = writeln!(output);
    let _ = writeln!(output, "## {}", labels.student);
    let _ = writeln!(output, "- {}: {}", labels.full_name, bulletin.student.full_name);
    let _ = writeln!(output, "- {}: {}", labels.class, bulletin.student.class_name);
    let _ = writeln!(
        output,
        "- {}: {}",
        labels.academic_year, bulletin.trimester.academic_year
    );
    let _ = writeln!(output, "- {}: {}", labels.trimester, bulletin.trimester.name);

    let _ = writeln!(output);
    let _ = writeln!(output, "## {}", labels.results);
    let overall = bulletin
        .overall_average
        .map(|average| format!("{average:.2}/20"))
        .unwrap_or_else(|| labels.missing.to_string());
    let _ = writeln!(output, "- {}: {}", labels.overall, overall);
    let _ = writeln!(
        output,
        "- {}: {}",
        labels.class_rank,
        format_rank(bulletin.class_rank.as_ref(), labels.missing)
    );
    let _ = writeln!(
        output,
        "- {}: {}",
        labels.level_rank,
        format_rank(bulletin.level_rank.as_ref(), labels.missing)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## {}", labels.grades);

    if bulletin.subjects.is_empty() {
        let _ = writeln!(output, "{}", labels.no_grades);
    } else {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} |",
            labels.subject, labels.coefficient, labels.average, labels.teacher, labels.remarks
        );
        let _ = writeln!(output, "|---|---|---|---|---|");
        for subject in &bulletin.subjects {
            let _ = writeln!(
                output,
                "| {} | {} | {:.2} | {} | {} |",
                subject.display_name(language),
                subject.coefficient,
                subject.average,
                subject.teacher_name,
                truncate_note(&subject.teacher_notes)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## {}", labels.attendance);
    let summary = &bulletin.attendance;
    let _ = writeln!(output, "- {}: {}", labels.total_days, summary.total_days);
    let _ = writeln!(output, "- {}: {}", labels.present_days, summary.present_days);
    let _ = writeln!(output, "- {}: {}", labels.absent_days, summary.absent_days);
    let rate = summary
        .attendance_rate
        .map(|rate| format!("{rate:.1}%"))
        .unwrap_or_else(|| labels.missing.to_string());
    let _ = writeln!(output, "- {}: {}", labels.rate, rate);

    for (heading, notes) in [
        (labels.teacher_notes, &bulletin.teacher_notes),
        (labels.principal_notes, &bulletin.principal_notes),
    ] {
        if !notes.trim().is_empty() {
            let _ = writeln!(output);
            let _ = writeln!(output, "## {heading}");
            let _ = writeln!(output, "{}", notes.trim());
        }
    }

    output
}

fn format_rank(rank: Option<&Rank>, missing: &str) -> String {
    match rank {
        Some(rank) => format!("{} / {}", rank.rank, rank.cohort_size),
        None => missing.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn bulletin(overall: Option<Decimal>) -> Bulletin {
        Bulletin {
            student: StudentPlacement {
                student_id: Uuid::new_v4(),
                full_name: "Yasmine Ben Ali".to_string(),
                class_id: Uuid::new_v4(),
                class_name: "3ème Maths 1".to_string(),
                level_id: Uuid::new_v4(),
            },
            trimester: Trimester {
                trimester_id: Uuid::new_v4(),
                name: "Trimestre 1".to_string(),
                academic_year: "2025-2026".to_string(),
                start_date: NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2025, 12, 20).unwrap(),
            },
            subjects: overall
                .map(|_| {
                    vec![BulletinSubject {
                        subject_name: "Mathématiques".to_string(),
                        subject_name_ar: "الرياضيات".to_string(),
                        coefficient: dec!(4.0),
                        average: dec!(13.1),
                        teacher_name: "Mme Jaziri".to_string(),
                        teacher_notes: "Bon travail".to_string(),
                    }]
                })
                .unwrap_or_default(),
            overall_average: overall,
            class_rank: overall.map(|_| Rank {
                rank: 2,
                cohort_size: 28,
            }),
            level_rank: None,
            attendance: AttendanceSummary {
                total_days: 0,
                present_days: 0,
                absent_days: 0,
                attendance_rate: None,
            },
            teacher_notes: String::new(),
            principal_notes: String::new(),
        }
    }

    #[test]
    fn renders_averages_and_ranks() {
        let report = render_markdown(&bulletin(Some(dec!(13.1))), Language::Fr);
        assert!(report.contains("- Moyenne générale: 13.10/20"));
        assert!(report.contains("- Rang dans la classe: 2 / 28"));
        assert!(report.contains("- Rang dans le niveau: N/A"));
        assert!(report.contains("| Mathématiques | 4.0 | 13.10 | Mme Jaziri | Bon travail |"));
        assert!(!report.contains("Observations"));
    }

    #[test]
    fn arabic_bulletin_uses_arabic_subject_names() {
        let report = render_markdown(&bulletin(Some(dec!(13.1))), Language::Ar);
        assert!(report.contains("| المادة | المعامل | المعدل | المعلم | ملاحظات |"));
        assert!(report.contains("| الرياضيات | 4.0 | 13.10 |"));
        assert!(!report.contains("Mathématiques"));
    }

    #[test]
    fn arabic_falls_back_to_french_name_when_missing() {
        let mut assembled = bulletin(Some(dec!(13.1)));
        assembled.subjects[0].subject_name_ar.clear();
        let report = render_markdown(&assembled, Language::Ar);
        assert!(report.contains("| Mathématiques | 4.0 | 13.10 |"));
    }

    #[test]
    fn long_subject_remarks_are_truncated() {
        let mut assembled = bulletin(Some(dec!(13.1)));
        assembled.subjects[0].teacher_notes = "é".repeat(60);
        let report = render_markdown(&assembled, Language::Fr);
        assert!(report.contains(&format!("| {}... |", "é".repeat(50))));
        assert!(!report.contains(&"é".repeat(51)));
    }

    #[test]
    fn general_remarks_get_their_own_sections() {
        let mut assembled = bulletin(Some(dec!(13.1)));
        assembled.teacher_notes = "Élève sérieuse.".to_string();
        assembled.principal_notes = "Félicitations.".to_string();
        let report = render_markdown(&assembled, Language::Fr);
        assert!(report.contains("## Observations de l'enseignant\nÉlève sérieuse.\n"));
        assert!(report.contains("## Observations du directeur\nFélicitations.\n"));
    }

    #[test]
    fn missing_grades_render_as_not_available() {
        let report = render_markdown(&bulletin(None), Language::Fr);
        assert!(report.contains("- Moyenne générale: N/A"));
        assert!(!report.contains("0/20"));
        assert!(report.contains("Aucune note enregistrée"));
    }

    #[test]
    fn arabic_labels() {
        let report = render_markdown(&bulletin(None), Language::Ar);
        assert!(report.contains("المعدل العام: غير متوفر"));
    }
}
