//! Bulk loading through the record service, so aggregates stay current.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use crate::models::{AttendanceInput, AttendanceStatus, GradeInput};
use crate::service::RecordService;

#[derive(Debug, Deserialize)]
struct GradeRow {
    student_id: String,
    course_id: String,
    course_name: String,
    score: f64,
    credits: Option<i32>,
    semester: String,
    academic_year: String,
    professor_name: Option<String>,
    remarks: Option<String>,
}

impl From<GradeRow> for GradeInput {
    fn from(row: GradeRow) -> Self {
        GradeInput {
            student_id: row.student_id,
            course_id: row.course_id,
            course_name: row.course_name,
            score: row.score,
            credits: row.credits.unwrap_or(3),
            semester: row.semester,
            academic_year: row.academic_year,
            professor_name: row.professor_name.filter(|name| !name.is_empty()),
            remarks: row.remarks.filter(|remarks| !remarks.is_empty()),
        }
    }
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub inserted: usize,
    pub warnings: usize,
}

pub async fn import_grades_csv(service: &RecordService, csv_path: &Path) -> anyhow::Result<ImportSummary> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    import_grades(service, file).await
}

pub async fn import_grades<R: Read>(service: &RecordService, source: R) -> anyhow::Result<ImportSummary> {
    let mut reader = csv::Reader::from_reader(source);
    let mut summary = ImportSummary::default();

    for (index, result) in reader.deserialize::<GradeRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed grade row on line {line}"))?;
        let mutation = service
            .create_grade(row.into())
            .await
            .with_context(|| format!("grade on line {line} rejected"))?;
        if let Some(warning) = mutation.warning {
            warn!(line, error = %warning, "grade imported without a fresh transcript");
            summary.warnings += 1;
        }
        summary.inserted += 1;
    }

    Ok(summary)
}

/// Loads a small, realistic term of grades and attendance.
pub async fn seed(service: &RecordService) -> anyhow::Result<usize> {
    let scale_max = service.scale().max_score();
    let grades = [
        ("STU-1001", "MATH101", "Calculus I", 0.93, 4, "Dr. Okafor"),
        ("STU-1001", "PHYS110", "Mechanics", 0.78, 3, "Dr. Lindqvist"),
        ("STU-1001", "HIST120", "Modern History", 0.66, 2, "Prof. Haddad"),
        ("STU-1002", "MATH101", "Calculus I", 0.57, 4, "Dr. Okafor"),
        ("STU-1002", "CHEM105", "General Chemistry", 0.84, 3, "Dr. Mensah"),
        ("STU-1003", "PHYS110", "Mechanics", 0.97, 3, "Dr. Lindqvist"),
        ("STU-1003", "HIST120", "Modern History", 0.45, 2, "Prof. Haddad"),
    ];

    let mut inserted = 0usize;
    for (student_id, course_id, course_name, fraction, credits, professor) in grades {
        service
            .create_grade(GradeInput {
                student_id: student_id.to_string(),
                course_id: course_id.to_string(),
                course_name: course_name.to_string(),
                score: fraction * scale_max,
                credits,
                semester: "2025-S1".to_string(),
                academic_year: "2024-2025".to_string(),
                professor_name: Some(professor.to_string()),
                remarks: None,
            })
            .await
            .with_context(|| format!("failed to seed grade {student_id}/{course_id}"))?;
        inserted += 1;
    }

    let sessions = [
        (3, AttendanceStatus::Present),
        (5, AttendanceStatus::Present),
        (10, AttendanceStatus::Late),
        (12, AttendanceStatus::Absent),
        (17, AttendanceStatus::Excused),
    ];
    for student_id in ["STU-1001", "STU-1002"] {
        for (day, status) in sessions {
            let date = NaiveDate::from_ymd_opt(2025, 3, day)
                .context("seed session date out of range")?;
            service
                .record_attendance(AttendanceInput {
                    student_id: student_id.to_string(),
                    course_id: "MATH101".to_string(),
                    schedule_id: None,
                    date,
                    status,
                    check_out_time: None,
                    verification_method: None,
                    verified_by: None,
                    remarks: None,
                })
                .await
                .with_context(|| format!("failed to seed attendance for {student_id}"))?;
            inserted += 1;
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::service;

    #[tokio::test]
    async fn csv_rows_flow_through_the_coordinator() {
        let service = service();
        let csv = "\
student_id,course_id,course_name,score,credits,semester,academic_year,professor_name,remarks
S1,C1,Algebra,92,3,2025-S1,2024-2025,,
S1,C2,Biology,70,4,2025-S1,2024-2025,Dr. Ito,retake
";
        let summary = import_grades(&service, csv.as_bytes()).await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.warnings, 0);

        let report = service.gpa("S1", None).await.unwrap();
        assert_eq!(report.cumulative_gpa, 3.26);
    }

    #[tokio::test]
    async fn bad_row_stops_the_import() {
        let service = service();
        let csv = "\
student_id,course_id,course_name,score,credits,semester,academic_year,professor_name,remarks
S1,C1,Algebra,92,,2025-S1,2024-2025,,
S1,C2,Biology,140,3,2025-S1,2024-2025,,
";
        let err = import_grades(&service, csv.as_bytes()).await.unwrap_err();
        assert!(err.to_string().contains("line 3"));
        assert_eq!(service.student_grades("S1").await.unwrap().grades.len(), 1);
        assert_eq!(service.student_grades("S1").await.unwrap().grades[0].credits, 3);
    }

    #[tokio::test]
    async fn seed_builds_aggregates() {
        let service = service();
        let inserted = seed(&service).await.unwrap();
        assert_eq!(inserted, 17);
        let report = service.recompute_all().await.unwrap();
        assert_eq!(report.transcripts, 3);
        assert_eq!(report.attendance_summaries, 2);

        let summaries = service.attendance_summaries("STU-1001").await.unwrap();
        assert_eq!(summaries[0].counts.attendance_percentage, 60.0);
    }
}
