use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::warning_header;
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::{AppState, CurrentUser};
use crate::error::Result;
use crate::models::{
    CourseStatistics, GpaReport, Grade, GradeFilter, GradeInput, GradeUpdate, StudentAverage,
    StudentGrades, TranscriptView,
};
use crate::service::Mutation;

#[derive(Debug, Deserialize)]
pub struct GpaQuery {
    pub semester: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AverageQuery {
    pub course_id: Option<String>,
}

/// Serialises the record and attaches a `Warning` header when the
/// aggregate refresh failed.
pub(super) fn mutation_response<T: Serialize>(status: StatusCode, mutation: Mutation<T>) -> Response {
    let mut response = if status == StatusCode::NO_CONTENT {
        status.into_response()
    } else {
        (status, Json(mutation.record)).into_response()
    };
    if let Some(value) = mutation.warning.as_ref().and_then(warning_header) {
        response.headers_mut().insert(header::WARNING, value);
    }
    response
}

/// POST /grades
pub async fn create_grade(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(input): ApiJson<GradeInput>,
) -> Result<Response> {
    user.require_admin()?;
    let mutation = state.records.create_grade(input).await?;
    Ok(mutation_response(StatusCode::CREATED, mutation))
}

/// GET /grades
pub async fn list_grades(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiQuery(filter): ApiQuery<GradeFilter>,
) -> Result<Json<Vec<Grade>>> {
    Ok(Json(state.records.list_grades(&filter).await?))
}

/// GET /grades/:id
pub async fn get_grade(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Grade>> {
    Ok(Json(state.records.grade(id).await?))
}

/// PUT /grades/:id
pub async fn update_grade(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<GradeUpdate>,
) -> Result<Response> {
    user.require_admin()?;
    let mutation = state.records.update_grade(id, update).await?;
    Ok(mutation_response(StatusCode::OK, mutation))
}

/// DELETE /grades/:id
pub async fn delete_grade(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Response> {
    user.require_admin()?;
    let mutation = state.records.delete_grade(id).await?;
    debug!(grade_id = id, by = %user.id, "grade deleted via api");
    Ok(mutation_response(StatusCode::NO_CONTENT, mutation))
}

/// GET /grades/student/:student_id
pub async fn student_grades(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiPath(student_id): ApiPath<String>,
) -> Result<Json<StudentGrades>> {
    Ok(Json(state.records.student_grades(&student_id).await?))
}

/// GET /grades/student/:student_id/gpa
pub async fn student_gpa(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiPath(student_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<GpaQuery>,
) -> Result<Json<GpaReport>> {
    Ok(Json(
        state
            .records
            .gpa(&student_id, query.semester.as_deref())
            .await?,
    ))
}

/// GET /grades/student/:student_id/transcript
pub async fn student_transcript(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiPath(student_id): ApiPath<String>,
) -> Result<Json<TranscriptView>> {
    Ok(Json(state.records.transcript(&student_id).await?))
}

/// GET /grades/student/:student_id/average
pub async fn student_average(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiPath(student_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<AverageQuery>,
) -> Result<Json<StudentAverage>> {
    Ok(Json(
        state
            .records
            .student_average(&student_id, query.course_id.as_deref())
            .await?,
    ))
}

/// GET /grades/course/:course_id/stats
pub async fn course_statistics(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiPath(course_id): ApiPath<String>,
) -> Result<Json<CourseStatistics>> {
    Ok(Json(state.records.course_statistics(&course_id).await?))
}
