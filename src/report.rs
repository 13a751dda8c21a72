use std::fmt::Write;

use crate::models::{AttendanceSummary, CourseOutcome, TranscriptView};

pub fn build_transcript_report(view: &TranscriptView, summaries: &[AttendanceSummary]) -> String {
    let transcript = &view.transcript;
    let mut output = String::new();

    let _ = writeln!(output, "# Academic Transcript");
    let _ = writeln!(
        output,
        "{} ({}), status {}",
        transcript.student_name,
        transcript.student_id,
        transcript.status.as_str()
    );
    let _ = writeln!(
        output,
        "Cumulative GPA {:.2} across {} courses, {} credits",
        transcript.cumulative_gpa, transcript.total_courses, transcript.total_credits
    );
    let _ = writeln!(output, "Generated {}", transcript.generated_at.format("%Y-%m-%d"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Courses");

    if view.courses.is_empty() {
        let _ = writeln!(output, "No grades recorded for this student.");
    } else {
        for course in &view.courses {
            let outcome = match course.outcome {
                CourseOutcome::Pass => "pass",
                CourseOutcome::Fail => "fail",
            };
            let _ = writeln!(
                output,
                "- {} {}: average {:.2} ({})",
                course.course_id, course.course_name, course.average, outcome
            );
            for grade in &course.grades {
                let _ = writeln!(
                    output,
                    "  - {} {}: {:.2} {} ({} credits)",
                    grade.academic_year, grade.semester, grade.score, grade.grade_letter, grade.credits
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance");

    if summaries.is_empty() {
        let _ = writeln!(output, "No attendance recorded for this student.");
    } else {
        for summary in summaries {
            let counts = &summary.counts;
            let _ = writeln!(
                output,
                "- {} ({}): {:.2}% attended, {} of {} sessions ({} late, {} absent, {} excused)",
                summary.course_id,
                summary.semester,
                counts.attendance_percentage,
                counts.classes_attended,
                counts.total_classes,
                counts.classes_late,
                counts.classes_absent,
                counts.classes_excused
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttendanceStatus;
    use crate::service::tests::{attendance_input, grade_input, service};

    #[tokio::test]
    async fn renders_courses_and_attendance() {
        let service = service();
        service.create_grade(grade_input("S1", "MATH", 92.0, 3)).await.unwrap();
        service.create_grade(grade_input("S1", "HIST", 40.0, 2)).await.unwrap();
        service
            .record_attendance(attendance_input(AttendanceStatus::Late))
            .await
            .unwrap();

        let view = service.transcript("S1").await.unwrap();
        let summaries = service.attendance_summaries("S1").await.unwrap();
        let report = build_transcript_report(&view, &summaries);

        assert!(report.starts_with("# Academic Transcript"));
        assert!(report.contains("Student (S1), status ACTIVE"));
        assert!(report.contains("- MATH Course MATH: average 92.00 (pass)"));
        assert!(report.contains("- HIST Course HIST: average 40.00 (fail)"));
        assert!(report.contains("- C1 (2024-2025): 100.00% attended, 1 of 1 sessions (1 late"));
    }

    #[tokio::test]
    async fn empty_attendance_has_placeholder() {
        let service = service();
        service.create_grade(grade_input("S1", "MATH", 80.0, 3)).await.unwrap();
        let view = service.transcript("S1").await.unwrap();
        let report = build_transcript_report(&view, &[]);
        assert!(report.contains("No attendance recorded for this student."));
    }
}
