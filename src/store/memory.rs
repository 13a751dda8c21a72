use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{attendance_scope, grade_scope, RecordStore};
use crate::error::Result;
use crate::models::{
    Attendance, AttendanceFilter, AttendanceStatus, AttendanceSummary, Grade, GradeFilter,
    GradePatch, NewAttendance, NewGrade, Snapshot, SummaryUpsert, Transcript, TranscriptStatus,
    TranscriptUpsert,
};

#[derive(Default)]
struct Tables {
    next_grade_id: i64,
    next_attendance_id: i64,
    grades: BTreeMap<i64, Grade>,
    attendance: BTreeMap<i64, Attendance>,
    transcripts: HashMap<String, Transcript>,
    summaries: BTreeMap<(String, String), AttendanceSummary>,
    revisions: HashMap<String, i64>,
}

impl Tables {
    fn bump(&mut self, scope: String) {
        *self.revisions.entry(scope).or_insert(0) += 1;
    }

    fn revision(&self, scope: &str) -> i64 {
        self.revisions.get(scope).copied().unwrap_or(0)
    }
}

/// Process-local store. One lock covers every table, so each call sees
/// and leaves a consistent state.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_grade(&self, grade: NewGrade) -> Result<Grade> {
        let mut tables = self.tables.lock().await;
        tables.next_grade_id += 1;
        let stored = Grade {
            id: tables.next_grade_id,
            student_id: grade.student_id,
            course_id: grade.course_id,
            course_name: grade.course_name,
            score: grade.score,
            grade_letter: grade.grade_letter,
            credits: grade.credits,
            semester: grade.semester,
            academic_year: grade.academic_year,
            professor_name: grade.professor_name,
            remarks: grade.remarks,
            created_at: Utc::now(),
            updated_at: None,
        };
        tables.bump(grade_scope(&stored.student_id));
        tables.grades.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_grade(&self, id: i64) -> Result<Option<Grade>> {
        Ok(self.tables.lock().await.grades.get(&id).cloned())
    }

    async fn update_grade(&self, id: i64, patch: GradePatch) -> Result<Option<Grade>> {
        let mut tables = self.tables.lock().await;
        let Some(grade) = tables.grades.get_mut(&id) else {
            return Ok(None);
        };
        if let Some((score, letter)) = patch.score {
            grade.score = score;
            grade.grade_letter = letter;
        }
        if let Some(remarks) = patch.remarks {
            grade.remarks = Some(remarks);
        }
        grade.updated_at = Some(Utc::now());
        let updated = grade.clone();
        tables.bump(grade_scope(&updated.student_id));
        Ok(Some(updated))
    }

    async fn delete_grade(&self, id: i64) -> Result<Option<Grade>> {
        let mut tables = self.tables.lock().await;
        let removed = tables.grades.remove(&id);
        if let Some(grade) = &removed {
            tables.bump(grade_scope(&grade.student_id));
        }
        Ok(removed)
    }

    async fn list_grades(&self, filter: &GradeFilter) -> Result<Vec<Grade>> {
        let tables = self.tables.lock().await;
        let skip = filter.skip.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |limit| limit.max(0) as usize);
        Ok(tables
            .grades
            .values()
            .filter(|grade| filter.matches(grade))
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn grade_students(&self) -> Result<Vec<String>> {
        let tables = self.tables.lock().await;
        let students: BTreeSet<String> = tables
            .grades
            .values()
            .map(|grade| grade.student_id.clone())
            .chain(tables.transcripts.keys().cloned())
            .collect();
        Ok(students.into_iter().collect())
    }

    async fn insert_attendance(&self, record: NewAttendance) -> Result<Attendance> {
        let mut tables = self.tables.lock().await;
        tables.next_attendance_id += 1;
        let stored = Attendance {
            id: tables.next_attendance_id,
            student_id: record.student_id,
            course_id: record.course_id,
            schedule_id: record.schedule_id,
            date: record.date,
            status: record.status,
            check_in_time: record.check_in_time,
            check_out_time: record.check_out_time,
            verification_method: record.verification_method,
            verified_by: record.verified_by,
            remarks: record.remarks,
            created_at: Utc::now(),
            updated_at: None,
        };
        tables.bump(attendance_scope(&stored.student_id, &stored.course_id));
        tables.attendance.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_attendance(&self, id: i64) -> Result<Option<Attendance>> {
        Ok(self.tables.lock().await.attendance.get(&id).cloned())
    }

    async fn update_attendance(
        &self,
        id: i64,
        status: AttendanceStatus,
        remarks: Option<String>,
    ) -> Result<Option<Attendance>> {
        let mut tables = self.tables.lock().await;
        let Some(record) = tables.attendance.get_mut(&id) else {
            return Ok(None);
        };
        record.status = status;
        if let Some(remarks) = remarks {
            record.remarks = Some(remarks);
        }
        record.updated_at = Some(Utc::now());
        let updated = record.clone();
        tables.bump(attendance_scope(&updated.student_id, &updated.course_id));
        Ok(Some(updated))
    }

    async fn list_attendance(&self, filter: &AttendanceFilter) -> Result<Vec<Attendance>> {
        let tables = self.tables.lock().await;
        let mut records: Vec<Attendance> = tables
            .attendance
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.date.cmp(&a.date).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn attendance_pairs(&self) -> Result<Vec<(String, String)>> {
        let tables = self.tables.lock().await;
        let pairs: BTreeSet<(String, String)> = tables
            .attendance
            .values()
            .map(|record| (record.student_id.clone(), record.course_id.clone()))
            .collect();
        Ok(pairs.into_iter().collect())
    }

    async fn grade_snapshot(&self, student_id: &str) -> Result<Snapshot<Grade>> {
        let tables = self.tables.lock().await;
        Ok(Snapshot {
            revision: tables.revision(&grade_scope(student_id)),
            records: tables
                .grades
                .values()
                .filter(|grade| grade.student_id == student_id)
                .cloned()
                .collect(),
        })
    }

    async fn attendance_snapshot(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Snapshot<Attendance>> {
        let tables = self.tables.lock().await;
        Ok(Snapshot {
            revision: tables.revision(&attendance_scope(student_id, course_id)),
            records: tables
                .attendance
                .values()
                .filter(|record| record.student_id == student_id && record.course_id == course_id)
                .cloned()
                .collect(),
        })
    }

    async fn upsert_transcript(&self, upsert: TranscriptUpsert) -> Result<Transcript> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let transcript = tables
            .transcripts
            .entry(upsert.student_id.clone())
            .or_insert_with(|| Transcript {
                student_id: upsert.student_id.clone(),
                student_name: upsert.default_name.clone(),
                cumulative_gpa: 0.0,
                total_credits: 0,
                total_courses: 0,
                status: TranscriptStatus::Active,
                source_revision: i64::MIN,
                generated_at: now,
                updated_at: None,
            });

        if transcript.source_revision <= upsert.revision {
            transcript.cumulative_gpa = upsert.summary.gpa;
            transcript.total_credits = upsert.summary.total_credits;
            transcript.total_courses = upsert.summary.total_courses;
            transcript.source_revision = upsert.revision;
            transcript.updated_at = Some(now);
        }
        Ok(transcript.clone())
    }

    async fn get_transcript(&self, student_id: &str) -> Result<Option<Transcript>> {
        Ok(self.tables.lock().await.transcripts.get(student_id).cloned())
    }

    async fn upsert_attendance_summary(&self, upsert: SummaryUpsert) -> Result<AttendanceSummary> {
        let mut tables = self.tables.lock().await;
        let key = (upsert.student_id.clone(), upsert.course_id.clone());
        let now = Utc::now();
        let summary = tables.summaries.entry(key).or_insert_with(|| AttendanceSummary {
            student_id: upsert.student_id.clone(),
            course_id: upsert.course_id.clone(),
            semester: upsert.semester.clone(),
            counts: Default::default(),
            source_revision: i64::MIN,
            updated_at: now,
        });

        if summary.source_revision <= upsert.revision {
            summary.counts = upsert.counts;
            summary.source_revision = upsert.revision;
            summary.updated_at = now;
        }
        Ok(summary.clone())
    }

    async fn list_attendance_summaries(&self, student_id: &str) -> Result<Vec<AttendanceSummary>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .summaries
            .values()
            .filter(|summary| summary.student_id == student_id)
            .cloned()
            .collect())
    }
}
