use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Routes for any caller that passed the authentication layer. Role checks that depend
/// on the target record (student self-enrollment, module staff) happen in the handlers.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        .route("/me", get(handlers::get_me))
        // GET /me/enrollments
        // Active and completed enrollments of the caller.
        .route("/me/enrollments", get(handlers::get_my_enrollments))
        // GET /modules
        .route("/modules", get(handlers::list_modules))
        // POST /modules/{id}/enroll
        // Admission control runs here. Students only.
        .route("/modules/{id}/enroll", post(handlers::enroll))
        // GET /modules/{id}/enrollments
        // Module staff view of who is currently studying.
        .route("/modules/{id}/enrollments", get(handlers::get_module_enrollments))
        // PUT /enrollments/{id}/status
        // PASS or FAIL. Triggers role reconciliation for the student.
        .route("/enrollments/{id}/status", put(handlers::complete_enrollment))
        // POST /enrollments/{id}/reset
        // Teacher override back to IN_PROGRESS.
        .route("/enrollments/{id}/reset", post(handlers::reset_enrollment))
}
