use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    models::{
        AdminDashboardStats, AssignRoleRequest, AssignTeacherRequest, CompleteEnrollmentRequest,
        CreateModuleRequest, CreateUserRequest, Enrollment, Module, Role, StudentEnrollments, User,
    },
    roles,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

// --- Helpers ---

/// Loads the enrollment's module and checks the actor may act on it.
async fn authorize_enrollment_staff(
    state: &AppState,
    user: &AuthUser,
    enrollment_id: Uuid,
) -> Result<Enrollment, AppError> {
    let enrollment = state.enrollments.enrollment(enrollment_id).await?;
    let module = state
        .repo
        .get_module(enrollment.module_id)
        .await?
        .ok_or(AppError::NotFound("module"))?;
    user.require_module_staff(&module)?;
    Ok(enrollment)
}

fn non_blank(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(())
}

// --- Authenticated Handlers ---

/// get_me
///
/// [Authenticated Route] The caller's own user record, including the current role.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = User))
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    let user = state.repo.get_user(id).await?.ok_or(AppError::NotFound("user"))?;
    Ok(Json(user))
}

/// get_my_enrollments
///
/// [Authenticated Route] The caller's active and completed enrollments.
#[utoipa::path(
    get,
    path = "/me/enrollments",
    responses((status = 200, description = "My Enrollments", body = StudentEnrollments))
)]
pub async fn get_my_enrollments(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<StudentEnrollments>, AppError> {
    let active = state.enrollments.list_active(id).await?;
    let completed = state.enrollments.list_completed(id).await?;
    Ok(Json(StudentEnrollments { active, completed }))
}

/// list_modules
///
/// [Authenticated Route] Every module, archived ones included.
#[utoipa::path(
    get,
    path = "/modules",
    responses((status = 200, description = "Modules", body = [Module]))
)]
pub async fn list_modules(
    _user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Module>>, AppError> {
    Ok(Json(state.repo.list_modules().await?))
}

/// enroll
///
/// [Authenticated Route] A STUDENT enrolls themselves. Admission rejections come back
/// as 409 with the reason as the message.
#[utoipa::path(
    post,
    path = "/modules/{id}/enroll",
    params(("id" = Uuid, Path, description = "Module ID")),
    responses(
        (status = 201, description = "Enrolled", body = Enrollment),
        (status = 403, description = "Not a student"),
        (status = 409, description = "Rejected by admission control")
    )
)]
pub async fn enroll(
    user: AuthUser,
    State(state): State<AppState>,
    Path(module_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Enrollment>), AppError> {
    if user.role != Role::Student {
        return Err(AppError::Forbidden("only students may enroll"));
    }
    let enrollment = state.enrollments.enroll(user.id, module_id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// get_module_enrollments
///
/// [Authenticated Route] IN_PROGRESS enrollments of one module. Module staff only.
#[utoipa::path(
    get,
    path = "/modules/{id}/enrollments",
    params(("id" = Uuid, Path, description = "Module ID")),
    responses((status = 200, description = "Active enrollments", body = [Enrollment]))
)]
pub async fn get_module_enrollments(
    user: AuthUser,
    State(state): State<AppState>,
    Path(module_id): Path<Uuid>,
) -> Result<Json<Vec<Enrollment>>, AppError> {
    let module = state
        .repo
        .get_module(module_id)
        .await?
        .ok_or(AppError::NotFound("module"))?;
    user.require_module_staff(&module)?;
    Ok(Json(state.enrollments.list_module_active(module_id).await?))
}

/// complete_enrollment
///
/// [Authenticated Route] Resolves an enrollment to PASS or FAIL. Module staff only.
/// Any other status value is a 422.
#[utoipa::path(
    put,
    path = "/enrollments/{id}/status",
    params(("id" = Uuid, Path, description = "Enrollment ID")),
    request_body = CompleteEnrollmentRequest,
    responses(
        (status = 200, description = "Updated", body = Enrollment),
        (status = 422, description = "Status is not PASS or FAIL")
    )
)]
pub async fn complete_enrollment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteEnrollmentRequest>,
) -> Result<Json<Enrollment>, AppError> {
    authorize_enrollment_staff(&state, &user, id).await?;
    let enrollment = state.enrollments.complete_str(id, &payload.status).await?;
    Ok(Json(enrollment))
}

/// reset_enrollment
///
/// [Authenticated Route] Moves a resolved enrollment back to IN_PROGRESS. Module staff only.
#[utoipa::path(
    post,
    path = "/enrollments/{id}/reset",
    params(("id" = Uuid, Path, description = "Enrollment ID")),
    responses((status = 200, description = "Reset", body = Enrollment))
)]
pub async fn reset_enrollment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Enrollment>, AppError> {
    authorize_enrollment_staff(&state, &user, id).await?;
    Ok(Json(state.enrollments.reset(id).await?))
}

// --- Admin Handlers ---

/// get_admin_stats
///
/// [Admin Route] Dashboard counters.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses((status = 200, description = "Stats", body = AdminDashboardStats))
)]
pub async fn get_admin_stats(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<AdminDashboardStats>, AppError> {
    user.require_admin()?;
    Ok(Json(state.repo.get_stats().await?))
}

/// get_active_enrollments
///
/// [Admin Route] Every IN_PROGRESS enrollment in the system.
#[utoipa::path(
    get,
    path = "/admin/enrollments",
    responses((status = 200, description = "Active enrollments", body = [Enrollment]))
)]
pub async fn get_active_enrollments(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Enrollment>>, AppError> {
    user.require_admin()?;
    Ok(Json(state.enrollments.list_all_active().await?))
}

/// withdraw_enrollment
///
/// [Admin Route] Deletes an enrollment. Roles are not re-evaluated.
#[utoipa::path(
    delete,
    path = "/admin/enrollments/{id}",
    params(("id" = Uuid, Path, description = "Enrollment ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn withdraw_enrollment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require_admin()?;
    if state.enrollments.withdraw(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("enrollment"))
    }
}

/// reconcile_enrollment_role
///
/// [Admin Route] Re-runs the role engine for the enrollment's student and returns the
/// student's record afterwards.
#[utoipa::path(
    post,
    path = "/admin/enrollments/{id}/reconcile",
    params(("id" = Uuid, Path, description = "Enrollment ID")),
    responses((status = 200, description = "Student after reconciliation", body = User))
)]
pub async fn reconcile_enrollment_role(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    user.require_admin()?;
    let enrollment = state.enrollments.enrollment(id).await?;
    state.enrollments.reconcile_role(id).await?;
    let student = state
        .repo
        .get_user(enrollment.student_id)
        .await?
        .ok_or(AppError::NotFound("student"))?;
    Ok(Json(student))
}

/// create_user
///
/// [Admin Route] Creates an account record.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateUserRequest,
    responses((status = 201, description = "Created", body = User))
)]
pub async fn create_user(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    user.require_admin()?;
    non_blank("email", &payload.email)?;
    non_blank("name", &payload.name)?;
    let created = state.repo.create_user(payload).await?;
    tracing::info!(user_id = %created.id, role = %created.role, "user created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// assign_role
///
/// [Admin Route] Changes a user's role. The only admin cannot demote themselves.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 403, description = "Not allowed")
    )
)]
pub async fn assign_role(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRoleRequest>,
) -> Result<Json<User>, AppError> {
    user.require_admin()?;
    let updated = roles::assign_role(state.repo.as_ref(), user.id, id, payload.role).await?;
    Ok(Json(updated))
}

/// create_module
///
/// [Admin Route] Creates an active module, optionally with an owning teacher.
#[utoipa::path(
    post,
    path = "/admin/modules",
    request_body = CreateModuleRequest,
    responses((status = 201, description = "Created", body = Module))
)]
pub async fn create_module(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateModuleRequest>,
) -> Result<(StatusCode, Json<Module>), AppError> {
    user.require_admin()?;
    non_blank("code", &payload.code)?;
    non_blank("title", &payload.title)?;
    if let Some(teacher_id) = payload.teacher_id {
        ensure_teacher(&state, teacher_id).await?;
    }
    let module = state.repo.create_module(payload).await?;
    tracing::info!(module_id = %module.id, code = %module.code, "module created");
    Ok((StatusCode::CREATED, Json(module)))
}

/// set_module_active
///
/// [Admin Route] Archives (`false`) or re-opens (`true`) a module.
#[utoipa::path(
    put,
    path = "/admin/modules/{id}/active",
    params(("id" = Uuid, Path, description = "Module ID")),
    request_body = bool,
    responses((status = 200, description = "Updated", body = Module))
)]
pub async fn set_module_active(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(active): Json<bool>,
) -> Result<Json<Module>, AppError> {
    user.require_admin()?;
    let module = state
        .repo
        .set_module_active(id, active)
        .await?
        .ok_or(AppError::NotFound("module"))?;
    Ok(Json(module))
}

/// assign_module_teacher
///
/// [Admin Route] Sets or clears a module's owning teacher.
#[utoipa::path(
    put,
    path = "/admin/modules/{id}/teacher",
    params(("id" = Uuid, Path, description = "Module ID")),
    request_body = AssignTeacherRequest,
    responses((status = 200, description = "Updated", body = Module))
)]
pub async fn assign_module_teacher(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignTeacherRequest>,
) -> Result<Json<Module>, AppError> {
    user.require_admin()?;
    if let Some(teacher_id) = payload.teacher_id {
        ensure_teacher(&state, teacher_id).await?;
    }
    let module = state
        .repo
        .set_module_teacher(id, payload.teacher_id)
        .await?
        .ok_or(AppError::NotFound("module"))?;
    Ok(Json(module))
}

async fn ensure_teacher(state: &AppState, teacher_id: Uuid) -> Result<(), AppError> {
    let teacher = state
        .repo
        .get_user(teacher_id)
        .await?
        .ok_or(AppError::NotFound("teacher"))?;
    if teacher.role != Role::Teacher {
        return Err(AppError::InvalidArgument(format!(
            "user {teacher_id} is {}, not TEACHER",
            teacher.role
        )));
    }
    Ok(())
}
