use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Admin Router Module
///
/// Nested under `/admin`. Every handler resolves `AuthUser` and calls
/// `require_admin` before touching the store.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        .route("/stats", get(handlers::get_admin_stats))
        // GET /admin/enrollments
        // All IN_PROGRESS enrollments.
        .route("/enrollments", get(handlers::get_active_enrollments))
        // DELETE /admin/enrollments/{id}
        .route("/enrollments/{id}", delete(handlers::withdraw_enrollment))
        // POST /admin/enrollments/{id}/reconcile
        // Backfill / repair for the role engine.
        .route(
            "/enrollments/{id}/reconcile",
            post(handlers::reconcile_enrollment_role),
        )
        // POST /admin/users
        .route("/users", post(handlers::create_user))
        // PUT /admin/users/{id}/role
        .route("/users/{id}/role", put(handlers::assign_role))
        // POST /admin/modules
        .route("/modules", post(handlers::create_module))
        // PUT /admin/modules/{id}/active
        .route("/modules/{id}/active", put(handlers::set_module_active))
        // PUT /admin/modules/{id}/teacher
        .route("/modules/{id}/teacher", put(handlers::assign_module_teacher))
}
