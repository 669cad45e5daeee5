use async_trait::async_trait;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use eduhub::{
    AppState, InMemoryRepository, StoreError,
    auth::AuthUser,
    config::AppConfig,
    error::{AppError, ErrorResponse},
    handlers,
    models::{
        AdminDashboardStats, AssignRoleRequest, AssignTeacherRequest, CompleteEnrollmentRequest,
        CreateModuleRequest, CreateUserRequest, Enrollment, EnrollmentFilter, Module, Role,
        StudentEnrollments, User,
    },
    repository::{Repository, UnitOfWork},
};
use std::sync::Arc;
use tokio::test;
use uuid::Uuid;

// --- FAILING REPOSITORY ---

// Every call fails, to drive the 500 path of the handlers.
struct FailingRepo;

#[async_trait]
impl Repository for FailingRepo {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Err(StoreError::Closed)
    }
    async fn get_user(&self, _id: Uuid) -> Result<Option<User>, StoreError> {
        Err(StoreError::Closed)
    }
    async fn create_user(&self, _req: CreateUserRequest) -> Result<User, StoreError> {
        Err(StoreError::Closed)
    }
    async fn get_module(&self, _id: Uuid) -> Result<Option<Module>, StoreError> {
        Err(StoreError::Closed)
    }
    async fn list_modules(&self) -> Result<Vec<Module>, StoreError> {
        Err(StoreError::Closed)
    }
    async fn create_module(&self, _req: CreateModuleRequest) -> Result<Module, StoreError> {
        Err(StoreError::Closed)
    }
    async fn set_module_active(&self, _id: Uuid, _active: bool) -> Result<Option<Module>, StoreError> {
        Err(StoreError::Closed)
    }
    async fn set_module_teacher(
        &self,
        _id: Uuid,
        _teacher_id: Option<Uuid>,
    ) -> Result<Option<Module>, StoreError> {
        Err(StoreError::Closed)
    }
    async fn get_enrollment(&self, _id: Uuid) -> Result<Option<Enrollment>, StoreError> {
        Err(StoreError::Closed)
    }
    async fn list_enrollments(&self, _filter: EnrollmentFilter) -> Result<Vec<Enrollment>, StoreError> {
        Err(StoreError::Closed)
    }
    async fn delete_enrollment(&self, _id: Uuid) -> Result<bool, StoreError> {
        Err(StoreError::Closed)
    }
    async fn get_stats(&self) -> Result<AdminDashboardStats, StoreError> {
        Err(StoreError::Closed)
    }
}

// --- TEST UTILITIES ---

const TEST_ID: Uuid = Uuid::from_u128(123);
const TEST_ADMIN_ID: Uuid = Uuid::from_u128(456);
const TEST_TEACHER_ID: Uuid = Uuid::from_u128(789);

struct HandlerTestContext {
    repo: Arc<InMemoryRepository>,
    state: AppState,
}

impl HandlerTestContext {
    /// Store seeded with one student, one admin and one teacher.
    async fn setup() -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_user(TEST_ID, Role::Student).await;
        repo.insert_user(TEST_ADMIN_ID, Role::Admin).await;
        repo.insert_user(TEST_TEACHER_ID, Role::Teacher).await;
        let state = AppState::new(repo.clone(), AppConfig::default());
        Self { repo, state }
    }

    fn state(&self) -> State<AppState> {
        State(self.state.clone())
    }

    /// Active module owned by the seeded teacher.
    async fn owned_module(&self) -> Module {
        self.repo
            .insert_module(Uuid::new_v4(), true, Some(TEST_TEACHER_ID))
            .await
    }

    async fn enrolled(&self, module: &Module) -> Enrollment {
        self.state
            .enrollments
            .enroll(TEST_ID, module.id)
            .await
            .unwrap()
    }
}

fn admin_user() -> AuthUser {
    AuthUser {
        id: TEST_ADMIN_ID,
        role: Role::Admin,
    }
}
fn student_user() -> AuthUser {
    AuthUser {
        id: TEST_ID,
        role: Role::Student,
    }
}
fn teacher_user() -> AuthUser {
    AuthUser {
        id: TEST_TEACHER_ID,
        role: Role::Teacher,
    }
}

async fn error_body(err: AppError) -> (StatusCode, ErrorResponse) {
    let response = err.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn status_body(status: &str) -> Json<CompleteEnrollmentRequest> {
    Json(CompleteEnrollmentRequest {
        status: status.to_string(),
    })
}

// --- ENROLLMENT HANDLER TESTS ---

#[test]
async fn test_enroll_success() {
    let ctx = HandlerTestContext::setup().await;
    let module = ctx.owned_module().await;

    let result = handlers::enroll(student_user(), ctx.state(), Path(module.id)).await;

    let (status, Json(enrollment)) = result.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(enrollment.student_id, TEST_ID);
    assert_eq!(enrollment.module_id, module.id);
}

#[test]
async fn test_enroll_forbidden_for_non_students() {
    let ctx = HandlerTestContext::setup().await;
    let module = ctx.owned_module().await;

    let result = handlers::enroll(teacher_user(), ctx.state(), Path(module.id)).await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[test]
async fn test_enroll_archived_module_returns_conflict_with_reason() {
    let ctx = HandlerTestContext::setup().await;
    let module = ctx.repo.insert_module(Uuid::new_v4(), false, None).await;

    let err = handlers::enroll(student_user(), ctx.state(), Path(module.id))
        .await
        .unwrap_err();
    let (status, body) = error_body(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.error.code, "MODULE_ARCHIVED");
    assert_eq!(body.error.message, "module archived");
}

#[test]
async fn test_get_my_enrollments_partitions_active_and_completed() {
    let ctx = HandlerTestContext::setup().await;
    let (m1, m2) = (ctx.owned_module().await, ctx.owned_module().await);
    let done = ctx.enrolled(&m1).await;
    ctx.enrolled(&m2).await;
    handlers::complete_enrollment(teacher_user(), ctx.state(), Path(done.id), status_body("FAIL"))
        .await
        .unwrap();

    let Json(StudentEnrollments { active, completed }) =
        handlers::get_my_enrollments(student_user(), ctx.state()).await.unwrap();

    assert_eq!(active.len(), 1);
    assert_eq!(active[0].module_id, m2.id);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, done.id);
}

// --- STATUS HANDLER TESTS ---

#[test]
async fn test_complete_by_owning_teacher_promotes_student() {
    let ctx = HandlerTestContext::setup().await;
    let module = ctx.owned_module().await;
    let enrollment = ctx.enrolled(&module).await;

    let Json(updated) =
        handlers::complete_enrollment(teacher_user(), ctx.state(), Path(enrollment.id), status_body("PASS"))
            .await
            .unwrap();
    assert!(updated.completed_at.is_some());

    let Json(me) = handlers::get_me(student_user(), ctx.state()).await.unwrap();
    assert_eq!(me.role, Role::OldStudent);
}

#[test]
async fn test_complete_forbidden_for_other_teacher() {
    let ctx = HandlerTestContext::setup().await;
    let other_teacher = ctx.repo.insert_user(Uuid::new_v4(), Role::Teacher).await;
    let module = ctx.owned_module().await;
    let enrollment = ctx.enrolled(&module).await;

    let outsider = AuthUser {
        id: other_teacher.id,
        role: Role::Teacher,
    };
    let result =
        handlers::complete_enrollment(outsider, ctx.state(), Path(enrollment.id), status_body("PASS")).await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[test]
async fn test_complete_with_invalid_status_is_unprocessable() {
    let ctx = HandlerTestContext::setup().await;
    let module = ctx.owned_module().await;
    let enrollment = ctx.enrolled(&module).await;

    let err =
        handlers::complete_enrollment(admin_user(), ctx.state(), Path(enrollment.id), status_body("INVALID"))
            .await
            .unwrap_err();
    let (status, body) = error_body(err).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body.error.code, "INVALID_ARGUMENT");
}

#[test]
async fn test_reset_by_admin() {
    let ctx = HandlerTestContext::setup().await;
    let module = ctx.owned_module().await;
    let enrollment = ctx.enrolled(&module).await;
    handlers::complete_enrollment(admin_user(), ctx.state(), Path(enrollment.id), status_body("FAIL"))
        .await
        .unwrap();

    let Json(reset) = handlers::reset_enrollment(admin_user(), ctx.state(), Path(enrollment.id))
        .await
        .unwrap();

    assert!(reset.completed_at.is_none());
}

#[test]
async fn test_module_enrollments_forbidden_for_students() {
    let ctx = HandlerTestContext::setup().await;
    let module = ctx.owned_module().await;

    let result = handlers::get_module_enrollments(student_user(), ctx.state(), Path(module.id)).await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

// --- ADMIN HANDLER TESTS ---

#[test]
async fn test_get_admin_stats_forbidden() {
    let ctx = HandlerTestContext::setup().await;

    let result = handlers::get_admin_stats(student_user(), ctx.state()).await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[test]
async fn test_get_admin_stats_success() {
    let ctx = HandlerTestContext::setup().await;
    let module = ctx.owned_module().await;
    ctx.enrolled(&module).await;

    let Json(stats) = handlers::get_admin_stats(admin_user(), ctx.state()).await.unwrap();

    assert_eq!(stats.total_users, 3);
    assert_eq!(stats.students, 1);
    assert_eq!(stats.teachers, 1);
    assert_eq!(stats.total_modules, 1);
    assert_eq!(stats.active_enrollments, 1);
}

#[test]
async fn test_withdraw_enrollment() {
    let ctx = HandlerTestContext::setup().await;
    let module = ctx.owned_module().await;
    let enrollment = ctx.enrolled(&module).await;

    let first = handlers::withdraw_enrollment(admin_user(), ctx.state(), Path(enrollment.id)).await;
    assert_eq!(first.unwrap(), StatusCode::NO_CONTENT);

    let second = handlers::withdraw_enrollment(admin_user(), ctx.state(), Path(enrollment.id)).await;
    assert!(matches!(second, Err(AppError::NotFound("enrollment"))));
}

#[test]
async fn test_create_user_rejects_blank_email() {
    let ctx = HandlerTestContext::setup().await;

    let payload = CreateUserRequest {
        email: "   ".to_string(),
        name: "Blank".to_string(),
        role: Role::Student,
    };
    let result = handlers::create_user(admin_user(), ctx.state(), Json(payload)).await;

    assert!(matches!(result, Err(AppError::InvalidArgument(_))));
}

#[test]
async fn test_sole_admin_cannot_demote_self() {
    let ctx = HandlerTestContext::setup().await;

    let payload = AssignRoleRequest { role: Role::Teacher };
    let result = handlers::assign_role(admin_user(), ctx.state(), Path(TEST_ADMIN_ID), Json(payload)).await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
    let Json(me) = handlers::get_me(admin_user(), ctx.state()).await.unwrap();
    assert_eq!(me.role, Role::Admin);
}

#[test]
async fn test_admin_can_demote_self_when_another_admin_exists() {
    let ctx = HandlerTestContext::setup().await;
    ctx.repo.insert_user(Uuid::new_v4(), Role::Admin).await;

    let payload = AssignRoleRequest { role: Role::Teacher };
    let Json(updated) = handlers::assign_role(admin_user(), ctx.state(), Path(TEST_ADMIN_ID), Json(payload))
        .await
        .unwrap();

    assert_eq!(updated.role, Role::Teacher);
}

#[test]
async fn test_create_module_requires_teacher_role_for_owner() {
    let ctx = HandlerTestContext::setup().await;

    let payload = CreateModuleRequest {
        code: "CS101".to_string(),
        title: "Intro".to_string(),
        teacher_id: Some(TEST_ID),
    };
    let result = handlers::create_module(admin_user(), ctx.state(), Json(payload)).await;
    assert!(matches!(result, Err(AppError::InvalidArgument(_))));

    let payload = CreateModuleRequest {
        code: "CS101".to_string(),
        title: "Intro".to_string(),
        teacher_id: Some(TEST_TEACHER_ID),
    };
    let (status, Json(module)) = handlers::create_module(admin_user(), ctx.state(), Json(payload))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert!(module.active);
    assert_eq!(module.teacher_id, Some(TEST_TEACHER_ID));
}

#[test]
async fn test_archive_then_reassign_module() {
    let ctx = HandlerTestContext::setup().await;
    let module = ctx.owned_module().await;

    let Json(archived) = handlers::set_module_active(admin_user(), ctx.state(), Path(module.id), Json(false))
        .await
        .unwrap();
    assert!(!archived.active);

    let payload = AssignTeacherRequest { teacher_id: None };
    let Json(unowned) = handlers::assign_module_teacher(admin_user(), ctx.state(), Path(module.id), Json(payload))
        .await
        .unwrap();
    assert_eq!(unowned.teacher_id, None);
}

#[test]
async fn test_reconcile_returns_student_record() {
    let ctx = HandlerTestContext::setup().await;
    let module = ctx.owned_module().await;
    let enrollment = ctx.enrolled(&module).await;

    let Json(student) = handlers::reconcile_enrollment_role(admin_user(), ctx.state(), Path(enrollment.id))
        .await
        .unwrap();

    assert_eq!(student.id, TEST_ID);
    assert_eq!(student.role, Role::Student);
}

// --- STORE FAILURE ---

#[test]
async fn test_store_failure_is_internal_error_without_details() {
    let state = AppState::new(Arc::new(FailingRepo), AppConfig::default());

    let err = handlers::list_modules(student_user(), State(state))
        .await
        .unwrap_err();
    let (status, body) = error_body(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body.error.code, "STORE_ERROR");
    assert_eq!(body.error.message, "A storage error occurred");
}

#[test]
async fn test_store_failure_surfaces_from_enroll() {
    let state = AppState::new(Arc::new(FailingRepo), AppConfig::default());

    let result = handlers::enroll(student_user(), State(state), Path(Uuid::new_v4())).await;

    assert!(matches!(result, Err(AppError::Store(_))));
}
