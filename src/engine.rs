use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::models::{
    Attendance, AttendanceCounts, AttendanceStatus, AttendanceSummary, CourseOutcome,
    CourseRecord, CourseStatistics, GpaSummary, Grade, StudentAverage, SummaryUpsert, Transcript,
    TranscriptGrade, TranscriptUpsert,
};
use crate::store::RecordStore;
use crate::valuation::{grade_points, round2, GradingScale};

/// Row counts are stored as INTEGER; saturate instead of wrapping.
fn saturating_count(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

pub fn recompute_gpa(records: &[Grade]) -> GpaSummary {
    let mut weighted_sum = 0.0;
    let mut total_credits = 0i32;
    let mut distribution: BTreeMap<String, usize> = BTreeMap::new();

    for grade in records {
        weighted_sum += grade_points(&grade.grade_letter) * f64::from(grade.credits);
        total_credits += grade.credits;
        *distribution.entry(grade.grade_letter.clone()).or_insert(0) += 1;
    }

    let gpa = if total_credits > 0 {
        round2(weighted_sum / f64::from(total_credits))
    } else {
        0.0
    };

    GpaSummary {
        gpa,
        total_credits,
        total_courses: saturating_count(records.len()),
        distribution,
    }
}

pub fn summarize_attendance(records: &[Attendance]) -> AttendanceCounts {
    let mut counts = AttendanceCounts::default();

    for record in records {
        counts.total_classes += 1;
        match record.status {
            AttendanceStatus::Present => counts.classes_present += 1,
            AttendanceStatus::Absent => counts.classes_absent += 1,
            AttendanceStatus::Late => counts.classes_late += 1,
            AttendanceStatus::Excused => counts.classes_excused += 1,
        }
    }

    counts.classes_attended = counts.classes_present + counts.classes_late;
    counts.attendance_percentage = if counts.total_classes > 0 {
        round2(f64::from(counts.classes_attended) / f64::from(counts.total_classes) * 100.0)
    } else {
        0.0
    };
    counts
}

pub fn course_statistics(course_id: &str, records: &[Grade], scale: &GradingScale) -> CourseStatistics {
    if records.is_empty() {
        return CourseStatistics {
            course_id: course_id.to_string(),
            average: 0.0,
            min_score: 0.0,
            max_score: 0.0,
            student_count: 0,
            pass_rate: 0.0,
        };
    }

    let count = records.len() as f64;
    let total: f64 = records.iter().map(|grade| grade.score).sum();
    let min_score = records.iter().map(|grade| grade.score).fold(f64::INFINITY, f64::min);
    let max_score = records
        .iter()
        .map(|grade| grade.score)
        .fold(f64::NEG_INFINITY, f64::max);
    let passed = records
        .iter()
        .filter(|grade| scale.passes(grade.score))
        .count() as f64;

    CourseStatistics {
        course_id: course_id.to_string(),
        average: round2(total / count),
        min_score,
        max_score,
        student_count: records.len(),
        pass_rate: round2(passed / count * 100.0),
    }
}

/// Credit-weighted raw score mean. Callers narrow `records` to one course
/// when `course_id` is set.
pub fn student_course_average(
    student_id: &str,
    course_id: Option<&str>,
    records: &[Grade],
) -> StudentAverage {
    let weighted_sum: f64 = records
        .iter()
        .map(|grade| grade.score * f64::from(grade.credits))
        .sum();
    let total_credits: i32 = records.iter().map(|grade| grade.credits).sum();

    StudentAverage {
        student_id: student_id.to_string(),
        course_id: course_id.map(str::to_string),
        average: if total_credits > 0 {
            round2(weighted_sum / f64::from(total_credits))
        } else {
            0.0
        },
        total_credits,
        grades_count: records.len(),
    }
}

/// Groups grades by course in order of first appearance. Grades inside a
/// course are listed oldest first.
pub fn group_by_course(records: &[Grade], scale: &GradingScale) -> Vec<CourseRecord> {
    let mut order: Vec<&str> = Vec::new();
    let mut buckets: HashMap<&str, Vec<&Grade>> = HashMap::new();

    for grade in records {
        let bucket = buckets.entry(grade.course_id.as_str()).or_insert_with(|| {
            order.push(grade.course_id.as_str());
            Vec::new()
        });
        bucket.push(grade);
    }

    order
        .into_iter()
        .filter_map(|course_id| buckets.remove(course_id))
        .map(|mut grades| {
            grades.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            let weighted: f64 = grades
                .iter()
                .map(|grade| grade.score * f64::from(grade.credits))
                .sum();
            let credits: i32 = grades.iter().map(|grade| grade.credits).sum();
            let average = if credits > 0 {
                round2(weighted / f64::from(credits))
            } else {
                0.0
            };
            let first = grades[0];

            CourseRecord {
                course_id: first.course_id.clone(),
                course_name: first.course_name.clone(),
                average,
                outcome: if scale.passes(average) {
                    CourseOutcome::Pass
                } else {
                    CourseOutcome::Fail
                },
                grades: grades
                    .iter()
                    .map(|grade| TranscriptGrade {
                        grade_id: grade.id,
                        score: grade.score,
                        grade_letter: grade.grade_letter.clone(),
                        credits: grade.credits,
                        semester: grade.semester.clone(),
                        academic_year: grade.academic_year.clone(),
                        recorded_at: grade.created_at,
                    })
                    .collect(),
            }
        })
        .collect()
}

/// Placeholder values for fields the engine does not own.
#[derive(Debug, Clone)]
pub struct AggregateDefaults {
    pub student_name: String,
    pub semester: String,
}

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn RecordStore>,
    defaults: AggregateDefaults,
}

impl Engine {
    pub fn new(store: Arc<dyn RecordStore>, defaults: AggregateDefaults) -> Self {
        Self { store, defaults }
    }

    pub async fn recompute_transcript(&self, student_id: &str) -> Result<Transcript> {
        let snapshot = self.store.grade_snapshot(student_id).await?;
        let summary = recompute_gpa(&snapshot.records);
        debug!(
            student_id,
            revision = snapshot.revision,
            gpa = summary.gpa,
            credits = summary.total_credits,
            "recomputed transcript"
        );

        self.store
            .upsert_transcript(TranscriptUpsert {
                student_id: student_id.to_string(),
                default_name: self.defaults.student_name.clone(),
                summary,
                revision: snapshot.revision,
            })
            .await
    }

    pub async fn recompute_attendance_summary(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<AttendanceSummary> {
        let snapshot = self.store.attendance_snapshot(student_id, course_id).await?;
        let counts = summarize_attendance(&snapshot.records);
        debug!(
            student_id,
            course_id,
            revision = snapshot.revision,
            percentage = counts.attendance_percentage,
            "recomputed attendance summary"
        );

        self.store
            .upsert_attendance_summary(SummaryUpsert {
                student_id: student_id.to_string(),
                course_id: course_id.to_string(),
                semester: self.defaults.semester.clone(),
                counts,
                revision: snapshot.revision,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn grade(id: i64, course_id: &str, score: f64, credits: i32) -> Grade {
        let scale = GradingScale::percent();
        Grade {
            id,
            student_id: "S1".to_string(),
            course_id: course_id.to_string(),
            course_name: format!("Course {course_id}"),
            score,
            grade_letter: scale.letter_for(score).to_string(),
            credits,
            semester: "2025-S1".to_string(),
            academic_year: "2024-2025".to_string(),
            professor_name: None,
            remarks: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap() + Duration::minutes(id),
            updated_at: None,
        }
    }

    fn attendance(status: AttendanceStatus) -> Attendance {
        Attendance {
            id: 1,
            student_id: "S1".to_string(),
            course_id: "C1".to_string(),
            schedule_id: None,
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            status,
            check_in_time: None,
            check_out_time: None,
            verification_method: None,
            verified_by: None,
            remarks: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn course_count_saturates_instead_of_wrapping() {
        assert_eq!(saturating_count(3), 3);
        assert_eq!(saturating_count(usize::MAX), i32::MAX);
    }

    #[test]
    fn empty_grade_set_yields_zeroes() {
        let summary = recompute_gpa(&[]);
        assert_eq!(summary.gpa, 0.0);
        assert_eq!(summary.total_credits, 0);
        assert_eq!(summary.total_courses, 0);
        assert!(summary.distribution.is_empty());
    }

    #[test]
    fn gpa_is_credit_weighted_and_rounded() {
        let records = vec![grade(1, "C1", 92.0, 3), grade(2, "C2", 70.0, 4)];
        assert_eq!(records[0].grade_letter, "A");
        assert_eq!(records[1].grade_letter, "B-");

        let summary = recompute_gpa(&records);
        assert_eq!(summary.gpa, 3.26);
        assert_eq!(summary.total_credits, 7);
        assert_eq!(summary.total_courses, 2);
        assert_eq!(summary.distribution.get("A"), Some(&1));
        assert_eq!(summary.distribution.get("B-"), Some(&1));
    }

    #[test]
    fn gpa_ignores_record_order() {
        let mut records = vec![
            grade(1, "C1", 97.0, 2),
            grade(2, "C2", 41.0, 3),
            grade(3, "C3", 83.5, 4),
            grade(4, "C1", 66.0, 1),
        ];
        let forward = recompute_gpa(&records);
        records.reverse();
        assert_eq!(recompute_gpa(&records), forward);
        records.swap(0, 2);
        assert_eq!(recompute_gpa(&records), forward);
    }

    #[test]
    fn unrecognised_letters_count_as_zero_points() {
        let mut odd = grade(1, "C1", 92.0, 2);
        odd.grade_letter = "Q".to_string();
        let summary = recompute_gpa(&[odd, grade(2, "C2", 92.0, 2)]);
        assert_eq!(summary.gpa, 2.0);
        assert_eq!(summary.distribution.get("Q"), Some(&1));
    }

    #[test]
    fn attendance_counts_treat_late_as_attended() {
        let mut records: Vec<Attendance> =
            (0..8).map(|_| attendance(AttendanceStatus::Present)).collect();
        records.push(attendance(AttendanceStatus::Late));
        records.push(attendance(AttendanceStatus::Absent));

        let counts = summarize_attendance(&records);
        assert_eq!(counts.total_classes, 10);
        assert_eq!(counts.classes_attended, 9);
        assert_eq!(counts.attendance_percentage, 90.0);
        assert_eq!(
            counts.classes_present + counts.classes_absent + counts.classes_late + counts.classes_excused,
            counts.total_classes
        );
    }

    #[test]
    fn attendance_percentage_is_zero_without_sessions() {
        let counts = summarize_attendance(&[]);
        assert_eq!(counts, AttendanceCounts::default());
    }

    #[test]
    fn attendance_percentage_rounds_to_two_places() {
        let records = vec![
            attendance(AttendanceStatus::Present),
            attendance(AttendanceStatus::Excused),
            attendance(AttendanceStatus::Absent),
        ];
        let counts = summarize_attendance(&records);
        assert_eq!(counts.attendance_percentage, 33.33);
        assert_eq!(counts.classes_excused, 1);
    }

    #[test]
    fn course_statistics_on_twenty_scale() {
        let records = vec![grade(1, "C1", 5.0, 1), grade(2, "C1", 12.0, 1), grade(3, "C1", 18.0, 1)];
        let stats = course_statistics("C1", &records, &GradingScale::twenty());
        assert_eq!(stats.average, 11.67);
        assert_eq!(stats.min_score, 5.0);
        assert_eq!(stats.max_score, 18.0);
        assert_eq!(stats.student_count, 3);
        assert_eq!(stats.pass_rate, 66.67);
    }

    #[test]
    fn course_statistics_on_empty_course_are_zeroed() {
        let stats = course_statistics("C9", &[], &GradingScale::twenty());
        assert_eq!(stats.average, 0.0);
        assert_eq!(stats.student_count, 0);
        assert_eq!(stats.pass_rate, 0.0);
    }

    #[test]
    fn student_average_weights_by_credits() {
        let records = vec![grade(1, "C1", 80.0, 1), grade(2, "C1", 50.0, 2)];
        let average = student_course_average("S1", Some("C1"), &records);
        assert_eq!(average.average, 60.0);
        assert_eq!(average.total_credits, 3);
        assert_eq!(average.grades_count, 2);

        let empty = student_course_average("S1", None, &[]);
        assert_eq!(empty.average, 0.0);
        assert_eq!(empty.grades_count, 0);
    }

    #[test]
    fn courses_keep_first_encounter_order() {
        let records = vec![
            grade(3, "MATH", 40.0, 2),
            grade(1, "HIST", 88.0, 3),
            grade(2, "MATH", 90.0, 2),
        ];
        let courses = group_by_course(&records, &GradingScale::percent());
        let ids: Vec<&str> = courses.iter().map(|c| c.course_id.as_str()).collect();
        assert_eq!(ids, vec!["MATH", "HIST"]);

        let math = &courses[0];
        let ordered: Vec<i64> = math.grades.iter().map(|g| g.grade_id).collect();
        assert_eq!(ordered, vec![2, 3]);
        assert_eq!(math.average, 65.0);
        assert_eq!(math.outcome, CourseOutcome::Pass);
    }
}
