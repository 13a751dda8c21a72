//! Persistence seam for raw records and their derived aggregates.
//!
//! Every raw mutation bumps a per-key revision in the same write as the
//! row change: `student:{id}` for grades, `attendance:{student}:{course}`
//! for attendance. Snapshots return that revision alongside the rows, and
//! aggregate upserts are dropped when the stored aggregate already
//! reflects a newer revision.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Attendance, AttendanceFilter, AttendanceStatus, AttendanceSummary, Grade, GradeFilter,
    GradePatch, NewAttendance, NewGrade, Snapshot, SummaryUpsert, Transcript, TranscriptUpsert,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub fn grade_scope(student_id: &str) -> String {
    format!("student:{student_id}")
}

pub fn attendance_scope(student_id: &str, course_id: &str) -> String {
    format!("attendance:{student_id}:{course_id}")
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_grade(&self, grade: NewGrade) -> Result<Grade>;
    async fn get_grade(&self, id: i64) -> Result<Option<Grade>>;
    async fn update_grade(&self, id: i64, patch: GradePatch) -> Result<Option<Grade>>;
    /// Removes the row and hands it back so callers keep its key.
    async fn delete_grade(&self, id: i64) -> Result<Option<Grade>>;
    /// Matching grades, oldest first.
    async fn list_grades(&self, filter: &GradeFilter) -> Result<Vec<Grade>>;
    async fn grade_students(&self) -> Result<Vec<String>>;

    async fn insert_attendance(&self, record: NewAttendance) -> Result<Attendance>;
    async fn get_attendance(&self, id: i64) -> Result<Option<Attendance>>;
    async fn update_attendance(
        &self,
        id: i64,
        status: AttendanceStatus,
        remarks: Option<String>,
    ) -> Result<Option<Attendance>>;
    /// Matching rows, newest date first.
    async fn list_attendance(&self, filter: &AttendanceFilter) -> Result<Vec<Attendance>>;
    async fn attendance_pairs(&self) -> Result<Vec<(String, String)>>;

    async fn grade_snapshot(&self, student_id: &str) -> Result<Snapshot<Grade>>;
    async fn attendance_snapshot(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Snapshot<Attendance>>;

    /// Returns the stored row, which is the newer one when `upsert` lost.
    async fn upsert_transcript(&self, upsert: TranscriptUpsert) -> Result<Transcript>;
    async fn get_transcript(&self, student_id: &str) -> Result<Option<Transcript>>;

    async fn upsert_attendance_summary(&self, upsert: SummaryUpsert) -> Result<AttendanceSummary>;
    async fn list_attendance_summaries(&self, student_id: &str) -> Result<Vec<AttendanceSummary>>;
}
