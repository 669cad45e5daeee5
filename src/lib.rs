use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Enrollment core.
pub mod admission;
pub mod enrollment;
pub mod roles;

// Records, errors and stores.
pub mod error;
pub mod memory;
pub mod models;
pub mod repository;

// Presentation layer.
pub mod auth;
pub mod config;
pub mod handlers;
pub mod routes;

use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use admission::{AdmissionLimits, MAX_ENROLLMENTS_PER_STUDENT, MAX_STUDENTS_PER_MODULE};
pub use config::AppConfig;
pub use enrollment::EnrollmentService;
pub use error::{AppError, Rejection, StoreError};
pub use memory::InMemoryRepository;
pub use repository::{PostgresRepository, Repository, RepositoryState, UnitOfWork};

/// ApiDoc
///
/// OpenAPI document for every handler decorated with `#[utoipa::path]`, served at
/// `/api-docs/openapi.json` and browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_me, handlers::get_my_enrollments, handlers::list_modules,
        handlers::enroll, handlers::get_module_enrollments, handlers::complete_enrollment,
        handlers::reset_enrollment, handlers::get_admin_stats, handlers::get_active_enrollments,
        handlers::withdraw_enrollment, handlers::reconcile_enrollment_role, handlers::create_user,
        handlers::assign_role, handlers::create_module, handlers::set_module_active,
        handlers::assign_module_teacher
    ),
    components(
        schemas(
            models::User, models::Role, models::Module, models::Enrollment,
            models::EnrollmentStatus, models::CompleteEnrollmentRequest,
            models::CreateUserRequest, models::AssignRoleRequest, models::CreateModuleRequest,
            models::AssignTeacherRequest, models::StudentEnrollments,
            models::AdminDashboardStats, error::Rejection, error::ErrorResponse, error::ErrorBody,
        )
    ),
    tags(
        (name = "eduhub", description = "EduHub enrollment API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container of services and configuration, cloned into every
/// request.
#[derive(Clone)]
pub struct AppState {
    /// Record stores (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// The enrollment core, sharing `repo`.
    pub enrollments: EnrollmentService,
    pub config: AppConfig,
}

impl AppState {
    /// Wires the enrollment core to `repo` with the configured admission limits.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        let enrollments = EnrollmentService::new(repo.clone(), config.limits);
        Self {
            repo,
            enrollments,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for `authenticated_routes`: if `AuthUser` cannot be
/// extracted the request is rejected with 401 before reaching the handler.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routers, the observability layers and the shared state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Role checks for /admin happen inside the handlers.
        .nest("/admin", admin::admin_routes())
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer` carrying method, URI and the `x-request-id`, so every log
/// line of one request correlates.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
