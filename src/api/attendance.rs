use axum::{
    extract::State,
    http::StatusCode,
    response::Response,
    Json,
};
use chrono::NaiveDate;

use super::extract::{ApiJson, ApiPath};
use super::grades::mutation_response;
use super::{AppState, CurrentUser};
use crate::error::Result;
use crate::models::{Attendance, AttendanceInput, AttendanceSummary, AttendanceUpdate, CourseAttendanceDay};

/// POST /attendance
pub async fn record_attendance(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiJson(input): ApiJson<AttendanceInput>,
) -> Result<Response> {
    let mutation = state.records.record_attendance(input).await?;
    Ok(mutation_response(StatusCode::CREATED, mutation))
}

/// GET /attendance/:id
pub async fn get_attendance(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Attendance>> {
    Ok(Json(state.records.attendance(id).await?))
}

/// PUT /attendance/:id
pub async fn update_attendance(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<AttendanceUpdate>,
) -> Result<Response> {
    let mutation = state.records.update_attendance(id, update).await?;
    Ok(mutation_response(StatusCode::OK, mutation))
}

/// GET /attendance/student/:student_id/summary
pub async fn student_summary(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiPath(student_id): ApiPath<String>,
) -> Result<Json<Vec<AttendanceSummary>>> {
    Ok(Json(state.records.attendance_summaries(&student_id).await?))
}

/// GET /attendance/student/:student_id/course/:course_id
pub async fn student_course_records(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiPath((student_id, course_id)): ApiPath<(String, String)>,
) -> Result<Json<Vec<Attendance>>> {
    Ok(Json(
        state
            .records
            .student_course_attendance(&student_id, &course_id)
            .await?,
    ))
}

/// GET /attendance/course/:course_id/date/:date
pub async fn course_day(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiPath((course_id, date)): ApiPath<(String, NaiveDate)>,
) -> Result<Json<CourseAttendanceDay>> {
    Ok(Json(
        state
            .records
            .course_attendance_for_date(&course_id, date)
            .await?,
    ))
}
