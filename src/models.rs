use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub id: i64,
    pub student_id: String,
    pub course_id: String,
    pub course_name: String,
    pub score: f64,
    pub grade_letter: String,
    pub credits: i32,
    pub semester: String,
    pub academic_year: String,
    pub professor_name: Option<String>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Grade submission as received from a client.
#[derive(Debug, Clone, Deserialize)]
pub struct GradeInput {
    pub student_id: String,
    pub course_id: String,
    pub course_name: String,
    pub score: f64,
    #[serde(default = "default_credits")]
    pub credits: i32,
    pub semester: String,
    pub academic_year: String,
    pub professor_name: Option<String>,
    pub remarks: Option<String>,
}

fn default_credits() -> i32 {
    3
}

/// Validated grade ready for insertion, letter already derived.
#[derive(Debug, Clone)]
pub struct NewGrade {
    pub student_id: String,
    pub course_id: String,
    pub course_name: String,
    pub score: f64,
    pub grade_letter: String,
    pub credits: i32,
    pub semester: String,
    pub academic_year: String,
    pub professor_name: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GradeUpdate {
    pub score: Option<f64>,
    pub remarks: Option<String>,
}

/// Store-level change set; `score` and `grade_letter` travel together.
#[derive(Debug, Clone, Default)]
pub struct GradePatch {
    pub score: Option<(f64, String)>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GradeFilter {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub semester: Option<String>,
    pub academic_year: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl GradeFilter {
    pub fn student(student_id: &str) -> Self {
        Self {
            student_id: Some(student_id.to_string()),
            ..Self::default()
        }
    }

    pub fn course(course_id: &str) -> Self {
        Self {
            course_id: Some(course_id.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, grade: &Grade) -> bool {
        fn eq(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().map_or(true, |wanted| wanted == value)
        }

        eq(&self.student_id, &grade.student_id)
            && eq(&self.course_id, &grade.course_id)
            && eq(&self.semester, &grade.semester)
            && eq(&self.academic_year, &grade.academic_year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TranscriptStatus {
    Active,
    Graduated,
    Suspended,
}

impl TranscriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptStatus::Active => "ACTIVE",
            TranscriptStatus::Graduated => "GRADUATED",
            TranscriptStatus::Suspended => "SUSPENDED",
        }
    }
}

impl FromStr for TranscriptStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ACTIVE" => Ok(TranscriptStatus::Active),
            "GRADUATED" => Ok(TranscriptStatus::Graduated),
            "SUSPENDED" => Ok(TranscriptStatus::Suspended),
            other => Err(format!("unknown transcript status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub student_id: String,
    pub student_name: String,
    pub cumulative_gpa: f64,
    pub total_credits: i32,
    pub total_courses: i32,
    pub status: TranscriptStatus,
    pub source_revision: i64,
    pub generated_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            "excused" => Ok(AttendanceStatus::Excused),
            other => Err(format!("unknown attendance status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    QrCode,
    Manual,
    Biometric,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::QrCode => "qr_code",
            VerificationMethod::Manual => "manual",
            VerificationMethod::Biometric => "biometric",
        }
    }
}

impl FromStr for VerificationMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "qr_code" => Ok(VerificationMethod::QrCode),
            "manual" => Ok(VerificationMethod::Manual),
            "biometric" => Ok(VerificationMethod::Biometric),
            other => Err(format!("unknown verification method '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attendance {
    pub id: i64,
    pub student_id: String,
    pub course_id: String,
    pub schedule_id: Option<String>,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub verification_method: Option<VerificationMethod>,
    pub verified_by: Option<String>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceInput {
    pub student_id: String,
    pub course_id: String,
    pub schedule_id: Option<String>,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub check_out_time: Option<DateTime<Utc>>,
    pub verification_method: Option<VerificationMethod>,
    pub verified_by: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub student_id: String,
    pub course_id: String,
    pub schedule_id: Option<String>,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub verification_method: Option<VerificationMethod>,
    pub verified_by: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceUpdate {
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub date: Option<NaiveDate>,
}

impl AttendanceFilter {
    pub fn pair(student_id: &str, course_id: &str) -> Self {
        Self {
            student_id: Some(student_id.to_string()),
            course_id: Some(course_id.to_string()),
            date: None,
        }
    }

    pub fn course_on(course_id: &str, date: NaiveDate) -> Self {
        Self {
            student_id: None,
            course_id: Some(course_id.to_string()),
            date: Some(date),
        }
    }

    pub fn matches(&self, record: &Attendance) -> bool {
        self.student_id
            .as_deref()
            .map_or(true, |id| id == record.student_id)
            && self
                .course_id
                .as_deref()
                .map_or(true, |id| id == record.course_id)
            && self.date.map_or(true, |date| date == record.date)
    }
}

/// Per-status tallies for a set of attendance rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AttendanceCounts {
    pub total_classes: i32,
    pub classes_present: i32,
    pub classes_attended: i32,
    pub classes_absent: i32,
    pub classes_late: i32,
    pub classes_excused: i32,
    pub attendance_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub student_id: String,
    pub course_id: String,
    pub semester: String,
    #[serde(flatten)]
    pub counts: AttendanceCounts,
    pub source_revision: i64,
    pub updated_at: DateTime<Utc>,
}

/// Raw rows read together with the revision of their key.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub revision: i64,
    pub records: Vec<T>,
}

#[derive(Debug, Clone)]
pub struct TranscriptUpsert {
    pub student_id: String,
    pub default_name: String,
    pub summary: GpaSummary,
    pub revision: i64,
}

#[derive(Debug, Clone)]
pub struct SummaryUpsert {
    pub student_id: String,
    pub course_id: String,
    pub semester: String,
    pub counts: AttendanceCounts,
    pub revision: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpaSummary {
    pub gpa: f64,
    pub total_credits: i32,
    pub total_courses: i32,
    pub distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpaReport {
    pub student_id: String,
    pub cumulative_gpa: f64,
    pub semester_gpa: Option<f64>,
    pub total_credits: i32,
    pub total_courses: i32,
    pub grade_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentGrades {
    pub student_id: String,
    pub grades: Vec<Grade>,
    pub cumulative_gpa: f64,
    pub total_credits: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseStatistics {
    pub course_id: String,
    pub average: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub student_count: usize,
    pub pass_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAverage {
    pub student_id: String,
    pub course_id: Option<String>,
    pub average: f64,
    pub total_credits: i32,
    pub grades_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CourseOutcome {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptGrade {
    pub grade_id: i64,
    pub score: f64,
    pub grade_letter: String,
    pub credits: i32,
    pub semester: String,
    pub academic_year: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseRecord {
    pub course_id: String,
    pub course_name: String,
    pub average: f64,
    pub outcome: CourseOutcome,
    pub grades: Vec<TranscriptGrade>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptView {
    #[serde(flatten)]
    pub transcript: Transcript,
    pub courses: Vec<CourseRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyAttendanceStats {
    pub present: i32,
    pub absent: i32,
    pub late: i32,
    pub excused: i32,
}

impl From<&AttendanceCounts> for DailyAttendanceStats {
    fn from(counts: &AttendanceCounts) -> Self {
        DailyAttendanceStats {
            present: counts.classes_present,
            absent: counts.classes_absent,
            late: counts.classes_late,
            excused: counts.classes_excused,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseAttendanceDay {
    pub course_id: String,
    pub date: NaiveDate,
    pub total_students: usize,
    pub stats: DailyAttendanceStats,
    pub records: Vec<Attendance>,
}
