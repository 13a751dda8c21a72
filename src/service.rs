//! Write path that keeps aggregates fresh, and the read path over them.
//!
//! Each mutation commits its raw row first, then recomputes the affected
//! aggregate before returning. A failed recompute is logged and reported
//! back as a warning; the raw write stands.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::engine::{self, AggregateDefaults, Engine};
use crate::error::{Error, Result};
use crate::models::{
    Attendance, AttendanceFilter, AttendanceInput, AttendanceStatus, AttendanceSummary,
    AttendanceUpdate, CourseAttendanceDay, CourseStatistics, DailyAttendanceStats, GpaReport,
    Grade, GradeFilter, GradeInput, GradePatch, GradeUpdate, NewAttendance, NewGrade,
    StudentAverage, StudentGrades, TranscriptView,
};
use crate::store::RecordStore;
use crate::valuation::GradingScale;

const MAX_ID_LEN: usize = 50;
const MAX_NAME_LEN: usize = 200;
const MAX_REMARKS_LEN: usize = 500;
const CREDIT_RANGE: std::ops::RangeInclusive<i32> = 1..=6;

/// A committed write plus the outcome of the recompute it triggered.
#[derive(Debug)]
pub struct Mutation<T> {
    pub record: T,
    pub warning: Option<Error>,
}

#[derive(Debug, Default)]
pub struct RecomputeReport {
    pub transcripts: usize,
    pub attendance_summaries: usize,
    pub failures: usize,
}

#[derive(Clone)]
pub struct RecordService {
    store: Arc<dyn RecordStore>,
    engine: Engine,
    scale: GradingScale,
}

fn required(field: &str, value: &str, max_len: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{field} is required")));
    }
    if value.len() > max_len {
        return Err(Error::validation(format!("{field} exceeds {max_len} characters")));
    }
    Ok(())
}

fn optional(field: &str, value: Option<&str>, max_len: usize) -> Result<()> {
    match value {
        Some(value) if value.len() > max_len => Err(Error::validation(format!(
            "{field} exceeds {max_len} characters"
        ))),
        _ => Ok(()),
    }
}

fn recompute_warning(key: &str, err: Error) -> Error {
    warn!(key, error = %err, "aggregate recompute failed; raw write kept");
    Error::RecomputeFailure(format!("{key}: {err}"))
}

impl RecordService {
    pub fn new(store: Arc<dyn RecordStore>, scale: GradingScale, defaults: AggregateDefaults) -> Self {
        let engine = Engine::new(Arc::clone(&store), defaults);
        Self {
            store,
            engine,
            scale,
        }
    }

    pub fn scale(&self) -> GradingScale {
        self.scale
    }

    async fn refresh_transcript(&self, student_id: &str) -> Option<Error> {
        self.engine
            .recompute_transcript(student_id)
            .await
            .err()
            .map(|err| recompute_warning(student_id, err))
    }

    async fn refresh_attendance(&self, student_id: &str, course_id: &str) -> Option<Error> {
        self.engine
            .recompute_attendance_summary(student_id, course_id)
            .await
            .err()
            .map(|err| recompute_warning(&format!("{student_id}/{course_id}"), err))
    }

    pub async fn create_grade(&self, input: GradeInput) -> Result<Mutation<Grade>> {
        required("student_id", &input.student_id, MAX_ID_LEN)?;
        required("course_id", &input.course_id, MAX_ID_LEN)?;
        required("course_name", &input.course_name, MAX_NAME_LEN)?;
        required("semester", &input.semester, MAX_ID_LEN)?;
        required("academic_year", &input.academic_year, MAX_ID_LEN)?;
        optional("professor_name", input.professor_name.as_deref(), MAX_NAME_LEN)?;
        optional("remarks", input.remarks.as_deref(), MAX_REMARKS_LEN)?;
        let score = self.scale.validate(input.score)?;
        if !CREDIT_RANGE.contains(&input.credits) {
            return Err(Error::validation(format!(
                "credits {} outside {}..={}",
                input.credits,
                CREDIT_RANGE.start(),
                CREDIT_RANGE.end()
            )));
        }

        let grade = self
            .store
            .insert_grade(NewGrade {
                student_id: input.student_id,
                course_id: input.course_id,
                course_name: input.course_name,
                score,
                grade_letter: self.scale.letter_for(score).to_string(),
                credits: input.credits,
                semester: input.semester,
                academic_year: input.academic_year,
                professor_name: input.professor_name,
                remarks: input.remarks,
            })
            .await?;
        info!(grade_id = grade.id, student_id = %grade.student_id, letter = %grade.grade_letter, "grade recorded");

        let warning = self.refresh_transcript(&grade.student_id).await;
        Ok(Mutation {
            record: grade,
            warning,
        })
    }

    pub async fn update_grade(&self, id: i64, update: GradeUpdate) -> Result<Mutation<Grade>> {
        optional("remarks", update.remarks.as_deref(), MAX_REMARKS_LEN)?;
        let score = update
            .score
            .map(|score| self.scale.validate(score))
            .transpose()?;

        let patch = GradePatch {
            score: score.map(|score| (score, self.scale.letter_for(score).to_string())),
            remarks: update.remarks,
        };
        let grade = self
            .store
            .update_grade(id, patch)
            .await?
            .ok_or_else(|| Error::not_found(format!("grade {id}")))?;
        info!(grade_id = id, student_id = %grade.student_id, "grade updated");

        let warning = self.refresh_transcript(&grade.student_id).await;
        Ok(Mutation {
            record: grade,
            warning,
        })
    }

    pub async fn delete_grade(&self, id: i64) -> Result<Mutation<Grade>> {
        let removed = self
            .store
            .delete_grade(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("grade {id}")))?;
        info!(grade_id = id, student_id = %removed.student_id, "grade removed");

        let warning = self.refresh_transcript(&removed.student_id).await;
        Ok(Mutation {
            record: removed,
            warning,
        })
    }

    pub async fn record_attendance(&self, input: AttendanceInput) -> Result<Mutation<Attendance>> {
        required("student_id", &input.student_id, MAX_ID_LEN)?;
        required("course_id", &input.course_id, MAX_ID_LEN)?;
        optional("schedule_id", input.schedule_id.as_deref(), MAX_ID_LEN)?;
        optional("verified_by", input.verified_by.as_deref(), 100)?;
        optional("remarks", input.remarks.as_deref(), MAX_REMARKS_LEN)?;

        let now = Utc::now();
        if let Some(check_out) = input.check_out_time {
            if check_out.date_naive() < input.date {
                return Err(Error::validation("check_out_time precedes the session date"));
            }
        }

        let record = self
            .store
            .insert_attendance(NewAttendance {
                check_in_time: (input.status == AttendanceStatus::Present).then_some(now),
                student_id: input.student_id,
                course_id: input.course_id,
                schedule_id: input.schedule_id,
                date: input.date,
                status: input.status,
                check_out_time: input.check_out_time,
                verification_method: input.verification_method,
                verified_by: input.verified_by,
                remarks: input.remarks,
            })
            .await?;
        info!(
            attendance_id = record.id,
            student_id = %record.student_id,
            course_id = %record.course_id,
            status = %record.status,
            "attendance recorded"
        );

        let warning = self.refresh_attendance(&record.student_id, &record.course_id).await;
        Ok(Mutation { record, warning })
    }

    pub async fn update_attendance(
        &self,
        id: i64,
        update: AttendanceUpdate,
    ) -> Result<Mutation<Attendance>> {
        optional("remarks", update.remarks.as_deref(), MAX_REMARKS_LEN)?;
        let record = self
            .store
            .update_attendance(id, update.status, update.remarks)
            .await?
            .ok_or_else(|| Error::not_found(format!("attendance record {id}")))?;
        info!(attendance_id = id, status = %record.status, "attendance updated");

        let warning = self.refresh_attendance(&record.student_id, &record.course_id).await;
        Ok(Mutation { record, warning })
    }

    /// Rebuilds every aggregate from raw rows.
    pub async fn recompute_all(&self) -> Result<RecomputeReport> {
        let mut report = RecomputeReport::default();
        for student_id in self.store.grade_students().await? {
            match self.refresh_transcript(&student_id).await {
                None => report.transcripts += 1,
                Some(_) => report.failures += 1,
            }
        }
        for (student_id, course_id) in self.store.attendance_pairs().await? {
            match self.refresh_attendance(&student_id, &course_id).await {
                None => report.attendance_summaries += 1,
                Some(_) => report.failures += 1,
            }
        }
        Ok(report)
    }

    pub async fn recompute_student(&self, student_id: &str) -> Result<RecomputeReport> {
        let mut report = RecomputeReport::default();
        match self.refresh_transcript(student_id).await {
            None => report.transcripts += 1,
            Some(_) => report.failures += 1,
        }
        for (pair_student, course_id) in self.store.attendance_pairs().await? {
            if pair_student != student_id {
                continue;
            }
            match self.refresh_attendance(student_id, &course_id).await {
                None => report.attendance_summaries += 1,
                Some(_) => report.failures += 1,
            }
        }
        info!(
            student_id,
            transcripts = report.transcripts,
            summaries = report.attendance_summaries,
            failures = report.failures,
            "student aggregates rebuilt"
        );
        Ok(report)
    }

    pub async fn grade(&self, id: i64) -> Result<Grade> {
        self.store
            .get_grade(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("grade {id}")))
    }

    pub async fn list_grades(&self, filter: &GradeFilter) -> Result<Vec<Grade>> {
        let mut filter = filter.clone();
        filter.skip = Some(filter.skip.unwrap_or(0).max(0));
        filter.limit = Some(filter.limit.unwrap_or(100).clamp(1, 500));
        self.store.list_grades(&filter).await
    }

    pub async fn student_grades(&self, student_id: &str) -> Result<StudentGrades> {
        let grades = self.store.list_grades(&GradeFilter::student(student_id)).await?;
        let summary = engine::recompute_gpa(&grades);
        Ok(StudentGrades {
            student_id: student_id.to_string(),
            grades,
            cumulative_gpa: summary.gpa,
            total_credits: summary.total_credits,
        })
    }

    pub async fn gpa(&self, student_id: &str, semester: Option<&str>) -> Result<GpaReport> {
        let grades = self.store.list_grades(&GradeFilter::student(student_id)).await?;
        if grades.is_empty() {
            return Err(Error::not_found(format!("no grades for student {student_id}")));
        }

        let overall = engine::recompute_gpa(&grades);
        let semester_gpa = semester.and_then(|semester| {
            let term: Vec<Grade> = grades
                .iter()
                .filter(|grade| grade.semester == semester)
                .cloned()
                .collect();
            (!term.is_empty()).then(|| engine::recompute_gpa(&term).gpa)
        });

        Ok(GpaReport {
            student_id: student_id.to_string(),
            cumulative_gpa: overall.gpa,
            semester_gpa,
            total_credits: overall.total_credits,
            total_courses: overall.total_courses,
            grade_distribution: overall.distribution,
        })
    }

    pub async fn transcript(&self, student_id: &str) -> Result<TranscriptView> {
        let grades = self.store.list_grades(&GradeFilter::student(student_id)).await?;
        if grades.is_empty() {
            return Err(Error::not_found(format!("no grades for student {student_id}")));
        }

        let transcript = match self.store.get_transcript(student_id).await? {
            Some(transcript) => transcript,
            None => self.engine.recompute_transcript(student_id).await?,
        };

        Ok(TranscriptView {
            transcript,
            courses: engine::group_by_course(&grades, &self.scale),
        })
    }

    pub async fn course_statistics(&self, course_id: &str) -> Result<CourseStatistics> {
        let grades = self.store.list_grades(&GradeFilter::course(course_id)).await?;
        Ok(engine::course_statistics(
            course_id,
            &grades,
            &self.scale,
        ))
    }

    pub async fn student_average(
        &self,
        student_id: &str,
        course_id: Option<&str>,
    ) -> Result<StudentAverage> {
        let filter = GradeFilter {
            course_id: course_id.map(str::to_string),
            ..GradeFilter::student(student_id)
        };
        let grades = self.store.list_grades(&filter).await?;
        Ok(engine::student_course_average(student_id, course_id, &grades))
    }

    pub async fn attendance_summaries(&self, student_id: &str) -> Result<Vec<AttendanceSummary>> {
        self.store.list_attendance_summaries(student_id).await
    }

    pub async fn student_course_attendance(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Vec<Attendance>> {
        self.store
            .list_attendance(&AttendanceFilter::pair(student_id, course_id))
            .await
    }

    pub async fn attendance(&self, id: i64) -> Result<Attendance> {
        self.store
            .get_attendance(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("attendance record {id}")))
    }

    pub async fn course_attendance_for_date(
        &self,
        course_id: &str,
        date: NaiveDate,
    ) -> Result<CourseAttendanceDay> {
        let records = self
            .store
            .list_attendance(&AttendanceFilter::course_on(course_id, date))
            .await?;

        let counts = engine::summarize_attendance(&records);
        Ok(CourseAttendanceDay {
            course_id: course_id.to_string(),
            date,
            total_students: records.len(),
            stats: DailyAttendanceStats::from(&counts),
            records,
        })
    }
}
