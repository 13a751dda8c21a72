//! HTTP surface over the record service.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::identity::IdentityProvider;
use crate::service::RecordService;

mod attendance;
pub mod auth;
pub mod error;
mod extract;
mod grades;
mod health;
mod payments;

pub use auth::CurrentUser;

#[derive(Clone)]
pub struct AppState {
    pub records: RecordService,
    pub identity: Arc<dyn IdentityProvider>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/grades", post(grades::create_grade).get(grades::list_grades))
        .route(
            "/grades/:id",
            get(grades::get_grade)
                .put(grades::update_grade)
                .delete(grades::delete_grade),
        )
        .route("/grades/student/:student_id", get(grades::student_grades))
        .route("/grades/student/:student_id/gpa", get(grades::student_gpa))
        .route(
            "/grades/student/:student_id/transcript",
            get(grades::student_transcript),
        )
        .route(
            "/grades/student/:student_id/average",
            get(grades::student_average),
        )
        .route(
            "/grades/course/:course_id/stats",
            get(grades::course_statistics),
        )
        .route("/attendance", post(attendance::record_attendance))
        .route(
            "/attendance/:id",
            get(attendance::get_attendance).put(attendance::update_attendance),
        )
        .route(
            "/attendance/student/:student_id/summary",
            get(attendance::student_summary),
        )
        .route(
            "/attendance/student/:student_id/course/:course_id",
            get(attendance::student_course_records),
        )
        .route(
            "/attendance/course/:course_id/date/:date",
            get(attendance::course_day),
        )
        .route("/payments", post(payments::initiate))
        .route("/payments/:provider/:reference", get(payments::verify))
        .route(
            "/payments/:provider/:reference/refund",
            post(payments::refund),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
