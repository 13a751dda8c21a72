use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};

use super::{attendance_scope, grade_scope, RecordStore};
use crate::error::{Error, Result};
use crate::models::{
    Attendance, AttendanceCounts, AttendanceFilter, AttendanceStatus, AttendanceSummary, Grade,
    GradeFilter, GradePatch, NewAttendance, NewGrade, Snapshot, SummaryUpsert, Transcript,
    TranscriptStatus, TranscriptUpsert, VerificationMethod,
};

const GRADE_COLUMNS: &str = "id, student_id, course_id, course_name, score, grade_letter, \
    credits, semester, academic_year, professor_name, remarks, created_at, updated_at";

const ATTENDANCE_COLUMNS: &str = "id, student_id, course_id, schedule_id, date, status, \
    check_in_time, check_out_time, verification_method, verified_by, remarks, created_at, \
    updated_at";

const TRANSCRIPT_COLUMNS: &str = "student_id, student_name, cumulative_gpa, total_credits, \
    total_courses, status, source_revision, generated_at, updated_at";

const SUMMARY_COLUMNS: &str = "student_id, course_id, semester, total_classes, classes_present, \
    classes_attended, classes_absent, classes_late, classes_excused, attendance_percentage, \
    source_revision, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

fn grade_from_row(row: &PgRow) -> std::result::Result<Grade, sqlx::Error> {
    Ok(Grade {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        course_id: row.try_get("course_id")?,
        course_name: row.try_get("course_name")?,
        score: row.try_get("score")?,
        grade_letter: row.try_get("grade_letter")?,
        credits: row.try_get("credits")?,
        semester: row.try_get("semester")?,
        academic_year: row.try_get("academic_year")?,
        professor_name: row.try_get("professor_name")?,
        remarks: row.try_get("remarks")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn attendance_from_row(row: &PgRow) -> std::result::Result<Attendance, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let method: Option<String> = row.try_get("verification_method")?;
    Ok(Attendance {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        course_id: row.try_get("course_id")?,
        schedule_id: row.try_get("schedule_id")?,
        date: row.try_get("date")?,
        status: status.parse::<AttendanceStatus>().map_err(decode_error)?,
        check_in_time: row.try_get("check_in_time")?,
        check_out_time: row.try_get("check_out_time")?,
        verification_method: method
            .map(|value| value.parse::<VerificationMethod>())
            .transpose()
            .map_err(decode_error)?,
        verified_by: row.try_get("verified_by")?,
        remarks: row.try_get("remarks")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transcript_from_row(row: &PgRow) -> std::result::Result<Transcript, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Transcript {
        student_id: row.try_get("student_id")?,
        student_name: row.try_get("student_name")?,
        cumulative_gpa: row.try_get("cumulative_gpa")?,
        total_credits: row.try_get("total_credits")?,
        total_courses: row.try_get("total_courses")?,
        status: status.parse::<TranscriptStatus>().map_err(decode_error)?,
        source_revision: row.try_get("source_revision")?,
        generated_at: row.try_get("generated_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn summary_from_row(row: &PgRow) -> std::result::Result<AttendanceSummary, sqlx::Error> {
    Ok(AttendanceSummary {
        student_id: row.try_get("student_id")?,
        course_id: row.try_get("course_id")?,
        semester: row.try_get("semester")?,
        counts: AttendanceCounts {
            total_classes: row.try_get("total_classes")?,
            classes_present: row.try_get("classes_present")?,
            classes_attended: row.try_get("classes_attended")?,
            classes_absent: row.try_get("classes_absent")?,
            classes_late: row.try_get("classes_late")?,
            classes_excused: row.try_get("classes_excused")?,
            attendance_percentage: row.try_get("attendance_percentage")?,
        },
        source_revision: row.try_get("source_revision")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn bump_revision(
    tx: &mut Transaction<'_, Postgres>,
    scope: &str,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO academic_records.record_revisions (scope, revision)
        VALUES ($1, 1)
        ON CONFLICT (scope) DO UPDATE
        SET revision = academic_records.record_revisions.revision + 1
        "#,
    )
    .bind(scope)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn begin_snapshot(pool: &PgPool) -> std::result::Result<Transaction<'_, Postgres>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

async fn read_revision(
    tx: &mut Transaction<'_, Postgres>,
    scope: &str,
) -> std::result::Result<i64, sqlx::Error> {
    let revision: Option<i64> =
        sqlx::query_scalar("SELECT revision FROM academic_records.record_revisions WHERE scope = $1")
            .bind(scope)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(revision.unwrap_or(0))
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert_grade(&self, grade: NewGrade) -> Result<Grade> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO academic_records.grades
            (student_id, course_id, course_name, score, grade_letter, credits,
             semester, academic_year, professor_name, remarks)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {GRADE_COLUMNS}
            "#
        ))
        .bind(&grade.student_id)
        .bind(&grade.course_id)
        .bind(&grade.course_name)
        .bind(grade.score)
        .bind(&grade.grade_letter)
        .bind(grade.credits)
        .bind(&grade.semester)
        .bind(&grade.academic_year)
        .bind(&grade.professor_name)
        .bind(&grade.remarks)
        .fetch_one(&mut *tx)
        .await?;
        let stored = grade_from_row(&row)?;

        bump_revision(&mut tx, &grade_scope(&stored.student_id)).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn get_grade(&self, id: i64) -> Result<Option<Grade>> {
        let row = sqlx::query(&format!(
            "SELECT {GRADE_COLUMNS} FROM academic_records.grades WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(grade_from_row).transpose()?)
    }

    async fn update_grade(&self, id: i64, patch: GradePatch) -> Result<Option<Grade>> {
        let (score, letter) = patch.score.unzip();
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE academic_records.grades
            SET score = COALESCE($2, score),
                grade_letter = COALESCE($3, grade_letter),
                remarks = COALESCE($4, remarks),
                updated_at = now()
            WHERE id = $1
            RETURNING {GRADE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(score)
        .bind(letter)
        .bind(patch.remarks)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let updated = grade_from_row(&row)?;
        bump_revision(&mut tx, &grade_scope(&updated.student_id)).await?;
        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete_grade(&self, id: i64) -> Result<Option<Grade>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "DELETE FROM academic_records.grades WHERE id = $1 RETURNING {GRADE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let removed = grade_from_row(&row)?;
        bump_revision(&mut tx, &grade_scope(&removed.student_id)).await?;
        tx.commit().await?;
        Ok(Some(removed))
    }

    async fn list_grades(&self, filter: &GradeFilter) -> Result<Vec<Grade>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {GRADE_COLUMNS} FROM academic_records.grades WHERE TRUE"
        ));

        if let Some(value) = &filter.student_id {
            query.push(" AND student_id = ").push_bind(value.clone());
        }
        if let Some(value) = &filter.course_id {
            query.push(" AND course_id = ").push_bind(value.clone());
        }
        if let Some(value) = &filter.semester {
            query.push(" AND semester = ").push_bind(value.clone());
        }
        if let Some(value) = &filter.academic_year {
            query.push(" AND academic_year = ").push_bind(value.clone());
        }
        query.push(" ORDER BY created_at, id");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit.max(0));
        }
        if let Some(skip) = filter.skip {
            query.push(" OFFSET ").push_bind(skip.max(0));
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut grades = Vec::with_capacity(rows.len());
        for row in rows {
            grades.push(grade_from_row(&row)?);
        }
        Ok(grades)
    }

    async fn grade_students(&self) -> Result<Vec<String>> {
        let students = sqlx::query_scalar(
            r#"
            SELECT student_id FROM academic_records.grades
            UNION
            SELECT student_id FROM academic_records.transcripts
            ORDER BY student_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(students)
    }

    async fn insert_attendance(&self, record: NewAttendance) -> Result<Attendance> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO academic_records.attendance
            (student_id, course_id, schedule_id, date, status, check_in_time,
             check_out_time, verification_method, verified_by, remarks)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ATTENDANCE_COLUMNS}
            "#
        ))
        .bind(&record.student_id)
        .bind(&record.course_id)
        .bind(&record.schedule_id)
        .bind(record.date)
        .bind(record.status.as_str())
        .bind(record.check_in_time)
        .bind(record.check_out_time)
        .bind(record.verification_method.map(|method| method.as_str()))
        .bind(&record.verified_by)
        .bind(&record.remarks)
        .fetch_one(&mut *tx)
        .await?;
        let stored = attendance_from_row(&row)?;

        bump_revision(&mut tx, &attendance_scope(&stored.student_id, &stored.course_id)).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn get_attendance(&self, id: i64) -> Result<Option<Attendance>> {
        let row = sqlx::query(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM academic_records.attendance WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(attendance_from_row).transpose()?)
    }

    async fn update_attendance(
        &self,
        id: i64,
        status: AttendanceStatus,
        remarks: Option<String>,
    ) -> Result<Option<Attendance>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE academic_records.attendance
            SET status = $2, remarks = COALESCE($3, remarks), updated_at = now()
            WHERE id = $1
            RETURNING {ATTENDANCE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(remarks)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let updated = attendance_from_row(&row)?;
        bump_revision(&mut tx, &attendance_scope(&updated.student_id, &updated.course_id)).await?;
        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn list_attendance(&self, filter: &AttendanceFilter) -> Result<Vec<Attendance>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM academic_records.attendance WHERE TRUE"
        ));

        if let Some(value) = &filter.student_id {
            query.push(" AND student_id = ").push_bind(value.clone());
        }
        if let Some(value) = &filter.course_id {
            query.push(" AND course_id = ").push_bind(value.clone());
        }
        if let Some(value) = filter.date {
            query.push(" AND date = ").push_bind(value);
        }
        query.push(" ORDER BY date DESC, id");

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(attendance_from_row(&row)?);
        }
        Ok(records)
    }

    async fn attendance_pairs(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT student_id, course_id
            FROM academic_records.attendance
            ORDER BY student_id, course_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            pairs.push((row.try_get("student_id")?, row.try_get("course_id")?));
        }
        Ok(pairs)
    }

    async fn grade_snapshot(&self, student_id: &str) -> Result<Snapshot<Grade>> {
        let mut tx = begin_snapshot(&self.pool).await?;
        let revision = read_revision(&mut tx, &grade_scope(student_id)).await?;
        let rows = sqlx::query(&format!(
            "SELECT {GRADE_COLUMNS} FROM academic_records.grades \
             WHERE student_id = $1 ORDER BY created_at, id"
        ))
        .bind(student_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(grade_from_row(&row)?);
        }
        Ok(Snapshot { revision, records })
    }

    async fn attendance_snapshot(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Snapshot<Attendance>> {
        let mut tx = begin_snapshot(&self.pool).await?;
        let revision = read_revision(&mut tx, &attendance_scope(student_id, course_id)).await?;
        let rows = sqlx::query(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM academic_records.attendance \
             WHERE student_id = $1 AND course_id = $2 ORDER BY date, id"
        ))
        .bind(student_id)
        .bind(course_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(attendance_from_row(&row)?);
        }
        Ok(Snapshot { revision, records })
    }

    async fn upsert_transcript(&self, upsert: TranscriptUpsert) -> Result<Transcript> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO academic_records.transcripts
            (student_id, student_name, cumulative_gpa, total_credits, total_courses,
             source_revision, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            ON CONFLICT (student_id) DO UPDATE
            SET cumulative_gpa = EXCLUDED.cumulative_gpa,
                total_credits = EXCLUDED.total_credits,
                total_courses = EXCLUDED.total_courses,
                source_revision = EXCLUDED.source_revision,
                updated_at = now()
            WHERE academic_records.transcripts.source_revision <= EXCLUDED.source_revision
            RETURNING {TRANSCRIPT_COLUMNS}
            "#
        ))
        .bind(&upsert.student_id)
        .bind(&upsert.default_name)
        .bind(upsert.summary.gpa)
        .bind(upsert.summary.total_credits)
        .bind(upsert.summary.total_courses)
        .bind(upsert.revision)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(transcript_from_row(&row)?),
            None => self.get_transcript(&upsert.student_id).await?.ok_or_else(|| {
                Error::Internal(format!(
                    "transcript for {} vanished during upsert",
                    upsert.student_id
                ))
            }),
        }
    }

    async fn get_transcript(&self, student_id: &str) -> Result<Option<Transcript>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSCRIPT_COLUMNS} FROM academic_records.transcripts WHERE student_id = $1"
        ))
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(transcript_from_row).transpose()?)
    }

    async fn upsert_attendance_summary(&self, upsert: SummaryUpsert) -> Result<AttendanceSummary> {
        let counts = upsert.counts;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO academic_records.attendance_summaries
            (student_id, course_id, semester, total_classes, classes_present,
             classes_attended, classes_absent, classes_late, classes_excused,
             attendance_percentage, source_revision, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())
            ON CONFLICT (student_id, course_id) DO UPDATE
            SET total_classes = EXCLUDED.total_classes,
                classes_present = EXCLUDED.classes_present,
                classes_attended = EXCLUDED.classes_attended,
                classes_absent = EXCLUDED.classes_absent,
                classes_late = EXCLUDED.classes_late,
                classes_excused = EXCLUDED.classes_excused,
                attendance_percentage = EXCLUDED.attendance_percentage,
                source_revision = EXCLUDED.source_revision,
                updated_at = now()
            WHERE academic_records.attendance_summaries.source_revision <= EXCLUDED.source_revision
            RETURNING {SUMMARY_COLUMNS}
            "#
        ))
        .bind(&upsert.student_id)
        .bind(&upsert.course_id)
        .bind(&upsert.semester)
        .bind(counts.total_classes)
        .bind(counts.classes_present)
        .bind(counts.classes_attended)
        .bind(counts.classes_absent)
        .bind(counts.classes_late)
        .bind(counts.classes_excused)
        .bind(counts.attendance_percentage)
        .bind(upsert.revision)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(summary_from_row(&row)?);
        }

        let row = sqlx::query(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM academic_records.attendance_summaries \
             WHERE student_id = $1 AND course_id = $2"
        ))
        .bind(&upsert.student_id)
        .bind(&upsert.course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(summary_from_row(&row)?)
    }

    async fn list_attendance_summaries(&self, student_id: &str) -> Result<Vec<AttendanceSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM academic_records.attendance_summaries \
             WHERE student_id = $1 ORDER BY course_id"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            summaries.push(summary_from_row(&row)?);
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GpaSummary;

    fn new_grade(student_id: &str, score: f64) -> NewGrade {
        NewGrade {
            student_id: student_id.to_string(),
            course_id: "C1".to_string(),
            course_name: "Algebra".to_string(),
            score,
            grade_letter: "B".to_string(),
            credits: 3,
            semester: "2025-S1".to_string(),
            academic_year: "2024-2025".to_string(),
            professor_name: None,
            remarks: None,
        }
    }

    fn transcript_upsert(revision: i64, gpa: f64) -> TranscriptUpsert {
        TranscriptUpsert {
            student_id: "S1".to_string(),
            default_name: "Student".to_string(),
            summary: GpaSummary {
                gpa,
                total_credits: 3,
                total_courses: 1,
                distribution: Default::default(),
            },
            revision,
        }
    }

    fn summary_upsert(semester: &str, revision: i64, attended: i32) -> SummaryUpsert {
        SummaryUpsert {
            student_id: "S1".to_string(),
            course_id: "C1".to_string(),
            semester: semester.to_string(),
            counts: AttendanceCounts {
                total_classes: 2,
                classes_present: attended,
                classes_attended: attended,
                classes_absent: 2 - attended,
                attendance_percentage: f64::from(attended) * 50.0,
                ..AttendanceCounts::default()
            },
            revision,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn stale_transcript_upsert_returns_newer_row(pool: PgPool) {
        let store = PgStore::new(pool);
        store.upsert_transcript(transcript_upsert(5, 3.5)).await.unwrap();

        let kept = store.upsert_transcript(transcript_upsert(4, 1.0)).await.unwrap();
        assert_eq!(kept.cumulative_gpa, 3.5);
        assert_eq!(kept.source_revision, 5);

        let replaced = store.upsert_transcript(transcript_upsert(6, 2.0)).await.unwrap();
        assert_eq!(replaced.cumulative_gpa, 2.0);
        assert_eq!(replaced.source_revision, 6);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn summary_row_is_per_pair_and_keeps_first_semester(pool: PgPool) {
        let store = PgStore::new(pool);
        store
            .upsert_attendance_summary(summary_upsert("2024-2025", 1, 0))
            .await
            .unwrap();
        let updated = store
            .upsert_attendance_summary(summary_upsert("2025-2026", 2, 1))
            .await
            .unwrap();
        assert_eq!(updated.semester, "2024-2025");
        assert_eq!(updated.counts.classes_attended, 1);

        let stale = store
            .upsert_attendance_summary(summary_upsert("2025-2026", 1, 2))
            .await
            .unwrap();
        assert_eq!(stale.counts.classes_attended, 1);
        assert_eq!(store.list_attendance_summaries("S1").await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn snapshot_ignores_writes_committed_after_it_began(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        store.insert_grade(new_grade("S1", 78.0)).await.unwrap();

        let mut tx = begin_snapshot(&pool).await.unwrap();
        assert_eq!(read_revision(&mut tx, &grade_scope("S1")).await.unwrap(), 1);

        store.insert_grade(new_grade("S1", 64.0)).await.unwrap();
        assert_eq!(read_revision(&mut tx, &grade_scope("S1")).await.unwrap(), 1);
        let visible: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM academic_records.grades WHERE student_id = $1",
        )
        .bind("S1")
        .fetch_one(&mut *tx)
        .await
        .unwrap();
        assert_eq!(visible, 1);
        tx.commit().await.unwrap();

        let snapshot = store.grade_snapshot("S1").await.unwrap();
        assert_eq!(snapshot.revision, 2);
        assert_eq!(snapshot.records.len(), 2);
    }
}
