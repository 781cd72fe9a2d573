use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::averages;
use crate::models::{
    AttendanceRecord, AttendanceStatus, BulletinAnnotations, ClassId, ExamTypeId, ExamTypeWeight, GradeEntry, RankScope,
    StudentId, StudentPlacement, SubjectCoefficient, SubjectId, Trimester, TrimesterId,
};
use crate::store::{CohortSnapshot, GradeStore};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const GRADE_COLUMNS: &str = "g.student_id, g.subject_id, g.exam_type_id, g.trimester_id, \
     g.score, g.max_score, g.updated_at";

const PLACEMENT_COLUMNS: &str = "st.id AS student_id, st.full_name, st.class_id, \
     c.name AS class_name, c.level_id";

fn grade_from_row(row: &PgRow) -> GradeEntry {
    GradeEntry {
        student_id: row.get("student_id"),
        subject_id: row.get("subject_id"),
        exam_type_id: row.get("exam_type_id"),
        trimester_id: row.get("trimester_id"),
        score: row.get("score"),
        max_score: row.get("max_score"),
        updated_at: row.get("updated_at"),
    }
}

fn placement_from_row(row: &PgRow) -> StudentPlacement {
    StudentPlacement {
        student_id: row.get("student_id"),
        full_name: row.get("full_name"),
        class_id: row.get("class_id"),
        class_name: row.get("class_name"),
        level_id: row.get("level_id"),
    }
}

fn parse_status(value: &str) -> anyhow::Result<AttendanceStatus> {
    match value {
        "present" => Ok(AttendanceStatus::Present),
        "absent" => Ok(AttendanceStatus::Absent),
        "late" => Ok(AttendanceStatus::Late),
        "excused" => Ok(AttendanceStatus::Excused),
        other => anyhow::bail!("unknown attendance status: {other}"),
    }
}

fn status_name(status: AttendanceStatus) -> &'static str {
    match status {
        AttendanceStatus::Present => "present",
        AttendanceStatus::Absent => "absent",
        AttendanceStatus::Late => "late",
        AttendanceStatus::Excused => "excused",
    }
}

async fn exam_weights<'e, E>(executor: E) -> anyhow::Result<HashMap<ExamTypeId, ExamTypeWeight>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows = sqlx::query("SELECT id, name, percentage FROM grade_bulletin.exam_types")
        .fetch_all(executor)
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let weight = ExamTypeWeight {
                exam_type_id: row.get("id"),
                name: row.get("name"),
                percentage: row.get("percentage"),
            };
            (weight.exam_type_id, weight)
        })
        .collect())
}

async fn subject_coefficients<'e, E>(
    executor: E,
) -> anyhow::Result<HashMap<SubjectId, SubjectCoefficient>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows = sqlx::query("SELECT id, name, name_ar, coefficient FROM grade_bulletin.subjects")
        .fetch_all(executor)
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let coefficient = SubjectCoefficient {
                subject_id: row.get("id"),
                name: row.get("name"),
                name_ar: row.get("name_ar"),
                coefficient: row.get("coefficient"),
            };
            (coefficient.subject_id, coefficient)
        })
        .collect())
}

/// `GradeStore` backed by the `grade_bulletin` Postgres schema.
#[derive(Clone)]
pub struct PgGradeStore {
    pool: PgPool,
}

impl PgGradeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GradeStore for PgGradeStore {
    async fn fetch_grades(
        &self,
        student_id: StudentId,
        trimester_id: TrimesterId,
    ) -> anyhow::Result<Vec<GradeEntry>> {
        let query = format!(
            "SELECT {GRADE_COLUMNS} FROM grade_bulletin.grades g \
             WHERE g.student_id = $1 AND g.trimester_id = $2 \
             ORDER BY g.subject_id, g.exam_type_id"
        );
        let rows = sqlx::query(&query)
            .bind(student_id)
            .bind(trimester_id)
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch grades")?;

        Ok(rows.iter().map(grade_from_row).collect())
    }

    async fn fetch_exam_weights(&self) -> anyhow::Result<HashMap<ExamTypeId, ExamTypeWeight>> {
        exam_weights(&self.pool).await
    }

    async fn fetch_subject_coefficients(
        &self,
    ) -> anyhow::Result<HashMap<SubjectId, SubjectCoefficient>> {
        subject_coefficients(&self.pool).await
    }

    async fn fetch_student(&self, student_id: StudentId) -> anyhow::Result<Option<StudentPlacement>> {
        let query = format!(
            "SELECT {PLACEMENT_COLUMNS} FROM grade_bulletin.students st \
             JOIN grade_bulletin.classes c ON c.id = st.class_id \
             WHERE st.id = $1"
        );
        let row = sqlx::query(&query)
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(placement_from_row))
    }

    async fn fetch_trimester(&self, trimester_id: TrimesterId) -> anyhow::Result<Option<Trimester>> {
        let row = sqlx::query(
            "SELECT id, name, academic_year, start_date, end_date \
             FROM grade_bulletin.trimesters WHERE id = $1",
        )
        .bind(trimester_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Trimester {
            trimester_id: row.get("id"),
            name: row.get("name"),
            academic_year: row.get("academic_year"),
            start_date: row.get("start_date"),
            end_date: row.get("end_date"),
        }))
    }

    async fn fetch_cohort_snapshot(
        &self,
        scope: RankScope,
        trimester_id: TrimesterId,
    ) -> anyhow::Result<CohortSnapshot> {
        let (scope_filter, scope_id) = match scope {
            RankScope::Class(id) => ("c.id = $1", id),
            RankScope::Level(id) => ("c.level_id = $1", id),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let roster_query = format!(
            "SELECT {PLACEMENT_COLUMNS} FROM grade_bulletin.students st \
             JOIN grade_bulletin.classes c ON c.id = st.class_id \
             WHERE {scope_filter} ORDER BY st.id"
        );
        let roster: Vec<StudentPlacement> = sqlx::query(&roster_query)
            .bind(scope_id)
            .fetch_all(&mut *tx)
            .await
            .context("failed to fetch cohort roster")?
            .iter()
            .map(placement_from_row)
            .collect();

        let grades_query = format!(
            "SELECT {GRADE_COLUMNS} FROM grade_bulletin.grades g \
             JOIN grade_bulletin.students st ON st.id = g.student_id \
             JOIN grade_bulletin.classes c ON c.id = st.class_id \
             WHERE {scope_filter} AND g.trimester_id = $2 \
             ORDER BY g.student_id, g.subject_id, g.exam_type_id"
        );
        let grades: Vec<GradeEntry> = sqlx::query(&grades_query)
            .bind(scope_id)
            .bind(trimester_id)
            .fetch_all(&mut *tx)
            .await
            .context("failed to fetch cohort grades")?
            .iter()
            .map(grade_from_row)
            .collect();

        let exam_weights = exam_weights(&mut *tx).await?;
        let coefficients = subject_coefficients(&mut *tx).await?;
        tx.commit().await?;

        debug!(
            %scope,
            students = roster.len(),
            grades = grades.len(),
            "cohort snapshot read"
        );

        Ok(CohortSnapshot {
            scope,
            trimester_id,
            roster,
            grades,
            exam_weights,
            coefficients,
        })
    }

    async fn fetch_attendance(
        &self,
        student_id: StudentId,
        trimester_id: TrimesterId,
    ) -> anyhow::Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query(
            "SELECT a.student_id, a.date, a.status \
             FROM grade_bulletin.attendance a \
             JOIN grade_bulletin.trimesters t ON t.id = $2 \
             WHERE a.student_id = $1 AND a.date BETWEEN t.start_date AND t.end_date \
             ORDER BY a.date",
        )
        .bind(student_id)
        .bind(trimester_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.get("status");
            records.push(AttendanceRecord {
                student_id: row.get("student_id"),
                date: row.get("date"),
                status: parse_status(&status)?,
            });
        }
        Ok(records)
    }

    async fn fetch_annotations(
        &self,
        student_id: StudentId,
        class_id: ClassId,
        trimester_id: TrimesterId,
    ) -> anyhow::Result<BulletinAnnotations> {
        let subject_teachers: HashMap<SubjectId, String> = sqlx::query(
            "SELECT subject_id, teacher_name FROM grade_bulletin.class_subjects WHERE class_id = $1",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch subject teachers")?
        .iter()
        .map(|row| (row.get("subject_id"), row.get("teacher_name")))
        .collect();

        let subject_notes: HashMap<SubjectId, String> = sqlx::query(
            "SELECT subject_id, notes FROM grade_bulletin.subject_remarks \
             WHERE student_id = $1 AND trimester_id = $2",
        )
        .bind(student_id)
        .bind(trimester_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch subject remarks")?
        .iter()
        .map(|row| (row.get("subject_id"), row.get("notes")))
        .collect();

        let general = sqlx::query(
            "SELECT teacher_notes, principal_notes FROM grade_bulletin.bulletin_remarks \
             WHERE student_id = $1 AND trimester_id = $2",
        )
        .bind(student_id)
        .bind(trimester_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch bulletin remarks")?;
        let (teacher_notes, principal_notes): (String, String) = general
            .map(|row| (row.get("teacher_notes"), row.get("principal_notes")))
            .unwrap_or_default();

        Ok(BulletinAnnotations {
            subject_teachers,
            subject_notes,
            teacher_notes,
            principal_notes,
        })
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let level_id = Uuid::parse_str("6b0f7c1e-3a55-4a8e-9a0f-0d7b5f1c2a11")?;
    let class_id = Uuid::parse_str("a3c5e2d4-8f11-4b6a-b0e2-5d9f3e7a1c22")?;
    let trimester_id = Uuid::parse_str("f1e2d3c4-b5a6-4798-8a9b-0c1d2e3f4a33")?;

    sqlx::query(
        r#"
        INSERT INTO grade_bulletin.levels (id, name, sort_order)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
        "#,
    )
    .bind(level_id)
    .bind("3ème année secondaire")
    .bind(3)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO grade_bulletin.classes (id, name, level_id, academic_year)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, level_id = EXCLUDED.level_id
        "#,
    )
    .bind(class_id)
    .bind("3ème Maths 1")
    .bind(level_id)
    .bind("2025-2026")
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO grade_bulletin.trimesters (id, name, academic_year, start_date, end_date)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(trimester_id)
    .bind("Trimestre 1")
    .bind("2025-2026")
    .bind(NaiveDate::from_ymd_opt(2025, 9, 15).context("invalid date")?)
    .bind(NaiveDate::from_ymd_opt(2025, 12, 20).context("invalid date")?)
    .execute(pool)
    .await?;

    let subjects = vec![
        ("MATH", "Mathématiques", "الرياضيات", Decimal::new(40, 1), "Mme Jaziri"),
        ("PHYS", "Sciences physiques", "العلوم الفيزيائية", Decimal::new(30, 1), "M. Bouazizi"),
        ("FR", "Français", "الفرنسية", Decimal::new(20, 1), "Mme Ferchichi"),
    ];
    for (code, name, name_ar, coefficient, teacher) in &subjects {
        sqlx::query(
            r#"
            INSERT INTO grade_bulletin.subjects (id, name, name_ar, code, coefficient)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (code) DO UPDATE
            SET name = EXCLUDED.name, name_ar = EXCLUDED.name_ar,
                coefficient = EXCLUDED.coefficient
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(*name)
        .bind(*name_ar)
        .bind(*code)
        .bind(*coefficient)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO grade_bulletin.class_subjects (class_id, subject_id, teacher_name)
            SELECT $1, s.id, $2 FROM grade_bulletin.subjects s WHERE s.code = $3
            ON CONFLICT (class_id, subject_id) DO UPDATE SET teacher_name = EXCLUDED.teacher_name
            "#,
        )
        .bind(class_id)
        .bind(*teacher)
        .bind(*code)
        .execute(pool)
        .await?;
    }

    let exam_types = vec![
        ("Contrôle", Decimal::new(30, 0)),
        ("Devoir", Decimal::new(25, 0)),
        ("Oral", Decimal::new(20, 0)),
        ("Examen Final", Decimal::new(25, 0)),
    ];
    for (name, percentage) in &exam_types {
        sqlx::query(
            r#"
            INSERT INTO grade_bulletin.exam_types (id, name, percentage)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET percentage = EXCLUDED.percentage
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(*name)
        .bind(*percentage)
        .execute(pool)
        .await?;
    }

    let students = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Yasmine Ben Ali",
            "yasmine.benali@school.tn",
            [12, 14, 10, 16],
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Karim Trabelsi",
            "karim.trabelsi@school.tn",
            [15, 15, 15, 15],
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Salma Gharbi",
            "salma.gharbi@school.tn",
            [9, 11, 13, 10],
        ),
    ];

    for (student_id, name, email, scores) in &students {
        sqlx::query(
            r#"
            INSERT INTO grade_bulletin.students (id, full_name, email, class_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name, class_id = EXCLUDED.class_id
            "#,
        )
        .bind(*student_id)
        .bind(*name)
        .bind(*email)
        .bind(class_id)
        .execute(pool)
        .await?;

        for (code, ..) in &subjects {
            for ((exam_name, _), score) in exam_types.iter().zip(scores) {
                let source_key = format!("seed-{email}-{code}-{exam_name}");
                sqlx::query(
                    r#"
                    INSERT INTO grade_bulletin.grades
                    (id, student_id, subject_id, exam_type_id, trimester_id, score, max_score, source_key)
                    SELECT $1, $2, s.id, e.id, $3, $4, 20, $5
                    FROM grade_bulletin.subjects s, grade_bulletin.exam_types e
                    WHERE s.code = $6 AND e.name = $7
                    ON CONFLICT (source_key) DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(*student_id)
                .bind(trimester_id)
                .bind(Decimal::from(*score))
                .bind(&source_key)
                .bind(*code)
                .bind(*exam_name)
                .execute(pool)
                .await?;
            }
        }

        let first_day = NaiveDate::from_ymd_opt(2025, 10, 6).context("invalid date")?;
        let statuses = [
            AttendanceStatus::Present,
            AttendanceStatus::Present,
            AttendanceStatus::Late,
            AttendanceStatus::Absent,
            AttendanceStatus::Present,
        ];
        for (offset, status) in statuses.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO grade_bulletin.attendance (id, student_id, date, status)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (student_id, date) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(*student_id)
            .bind(first_day + chrono::Duration::days(offset as i64))
            .bind(status_name(*status))
            .execute(pool)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO grade_bulletin.bulletin_remarks
            (student_id, trimester_id, teacher_notes, principal_notes)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (student_id, trimester_id) DO NOTHING
            "#,
        )
        .bind(*student_id)
        .bind(trimester_id)
        .bind("Travail régulier, participation à encourager.")
        .bind("Trimestre satisfaisant.")
        .execute(pool)
        .await?;
    }

    info!(students = students.len(), "seed data written");
    Ok(())
}

/// Imports grades from CSV. A row matching an existing
/// (student, subject, exam type, trimester) is a correction and replaces it.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_email: String,
        subject_code: String,
        exam_type: String,
        trimester: String,
        academic_year: String,
        score: Decimal,
        max_score: Option<Decimal>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut written = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed row {}", line + 1))?;

        let ids = sqlx::query(
            r#"
            SELECT st.id AS student_id, s.id AS subject_id, e.id AS exam_type_id, t.id AS trimester_id
            FROM grade_bulletin.students st,
                 grade_bulletin.subjects s,
                 grade_bulletin.exam_types e,
                 grade_bulletin.trimesters t
            WHERE st.email = $1 AND s.code = $2 AND e.name = $3
              AND t.name = $4 AND t.academic_year = $5
            "#,
        )
        .bind(&row.student_email)
        .bind(&row.subject_code)
        .bind(&row.exam_type)
        .bind(&row.trimester)
        .bind(&row.academic_year)
        .fetch_optional(pool)
        .await?;

        let Some(ids) = ids else {
            warn!(
                line = line + 1,
                email = %row.student_email,
                subject = %row.subject_code,
                "row references unknown student, subject, exam type or trimester; skipped"
            );
            continue;
        };

        let entry = GradeEntry {
            student_id: ids.get("student_id"),
            subject_id: ids.get("subject_id"),
            exam_type_id: ids.get("exam_type_id"),
            trimester_id: ids.get("trimester_id"),
            score: row.score,
            max_score: row.max_score.unwrap_or(Decimal::new(20, 0)),
            updated_at: Utc::now(),
        };
        averages::validate_score(&entry).with_context(|| format!("row {}", line + 1))?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO grade_bulletin.grades
            (id, student_id, subject_id, exam_type_id, trimester_id, score, max_score, source_key, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (student_id, subject_id, exam_type_id, trimester_id) DO UPDATE
            SET score = EXCLUDED.score, max_score = EXCLUDED.max_score, updated_at = EXCLUDED.updated_at
            WHERE grade_bulletin.grades.score <> EXCLUDED.score
               OR grade_bulletin.grades.max_score <> EXCLUDED.max_score
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.student_id)
        .bind(entry.subject_id)
        .bind(entry.exam_type_id)
        .bind(entry.trimester_id)
        .bind(entry.score)
        .bind(entry.max_score)
        .bind(source_key)
        .bind(entry.updated_at)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            written += 1;
        }
    }

    Ok(written)
}
