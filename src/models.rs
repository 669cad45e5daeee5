use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

// --- Closed Enumerations (Mapped to Postgres enum types) ---

/// Role
///
/// The single active role of an account. Stored as the `user_role` Postgres enum and
/// serialized as `"ADMIN" | "TEACHER" | "STUDENT" | "OLD_STUDENT"`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Teacher,
    #[default]
    Student,
    /// Alumni. Only reachable from `Student` through the role engine, or by an admin.
    OldStudent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
            Role::Student => "STUDENT",
            Role::OldStudent => "OLD_STUDENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// EnrollmentStatus
///
/// Stored as the `enrollment_status` Postgres enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "enrollment_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    #[default]
    InProgress,
    Pass,
    Fail,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::InProgress => "IN_PROGRESS",
            EnrollmentStatus::Pass => "PASS",
            EnrollmentStatus::Fail => "FAIL",
        }
    }

    /// PASS and FAIL are terminal in the normal flow.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, EnrollmentStatus::InProgress)
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrollmentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(EnrollmentStatus::InProgress),
            "PASS" => Ok(EnrollmentStatus::Pass),
            "FAIL" => Ok(EnrollmentStatus::Fail),
            other => Err(AppError::InvalidArgument(format!(
                "unknown enrollment status '{other}'"
            ))),
        }
    }
}

// --- Core Records ---

/// User
///
/// Canonical account record from the `users` table. Accounts are created by an
/// external registration flow or by an admin and are never deleted by this service.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Module
///
/// A course unit students enroll in. `active = false` archives the module: existing
/// enrollments are kept, new ones are refused.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Module {
    pub id: Uuid,
    // Unique short code, e.g. "CS101".
    pub code: String,
    pub title: String,
    pub active: bool,
    // FK to users.id. Zero or one owning teacher.
    pub teacher_id: Option<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Enrollment
///
/// One student's participation in one module. `(student_id, module_id)` is unique.
/// `completed_at` is set exactly while the status is resolved.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub module_id: Uuid,
    pub status: EnrollmentStatus,
    #[ts(type = "string")]
    pub started_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,
}

// --- Request Payloads (Input Schemas) ---

/// CompleteEnrollmentRequest
///
/// Body of `PUT /enrollments/{id}/status`. The status is kept as a raw string so that
/// unknown values reach the core and are refused as an invalid argument.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CompleteEnrollmentRequest {
    #[schema(example = "PASS")]
    pub status: String,
}

/// CreateUserRequest
///
/// Admin-side creation of an account record (POST /admin/users). Credentials are owned
/// by the external identity provider and never pass through here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// AssignRoleRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AssignRoleRequest {
    pub role: Role,
}

/// CreateModuleRequest
///
/// Input payload for POST /admin/modules. New modules start active.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateModuleRequest {
    #[schema(example = "CS101")]
    pub code: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<Uuid>,
}

/// AssignTeacherRequest
///
/// `teacher_id: null` clears the owner.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssignTeacherRequest {
    pub teacher_id: Option<Uuid>,
}

// --- Dashboard Schemas (Output) ---

/// StudentEnrollments
///
/// Output schema for GET /me/enrollments.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct StudentEnrollments {
    pub active: Vec<Enrollment>,
    /// PASS and FAIL enrollments.
    pub completed: Vec<Enrollment>,
}

/// AdminDashboardStats
///
/// Output schema for GET /admin/stats.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_users: i64,
    pub students: i64,
    pub alumni: i64,
    pub teachers: i64,
    pub total_modules: i64,
    pub archived_modules: i64,
    pub active_enrollments: i64,
    pub passed_enrollments: i64,
    pub failed_enrollments: i64,
}

// --- Store Aggregates (Internal) ---

/// AdmissionSnapshot
///
/// The live counts Admission Control decides on, read inside the enrolling transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Default)]
pub struct AdmissionSnapshot {
    pub already_enrolled: bool,
    /// The student's IN_PROGRESS enrollments across all modules.
    pub student_active: i64,
    /// Distinct students with an IN_PROGRESS enrollment in the module.
    pub module_active_students: i64,
}

/// EnrollmentTally
///
/// Per-student counts by status, read by the role engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Default)]
pub struct EnrollmentTally {
    pub total: i64,
    pub in_progress: i64,
    pub passed: i64,
    pub failed: i64,
}

/// StatusScope
///
/// Which slice of enrollments a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusScope {
    #[default]
    All,
    /// IN_PROGRESS only.
    Active,
    /// PASS or FAIL.
    Resolved,
}

impl StatusScope {
    pub fn admits(&self, status: EnrollmentStatus) -> bool {
        match self {
            StatusScope::All => true,
            StatusScope::Active => !status.is_resolved(),
            StatusScope::Resolved => status.is_resolved(),
        }
    }
}

/// EnrollmentFilter
///
/// Filter for `Repository::list_enrollments`. `None` fields do not constrain.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrollmentFilter {
    pub student_id: Option<Uuid>,
    pub module_id: Option<Uuid>,
    pub scope: StatusScope,
}

impl EnrollmentFilter {
    pub fn student(student_id: Uuid, scope: StatusScope) -> Self {
        Self { student_id: Some(student_id), module_id: None, scope }
    }

    pub fn module(module_id: Uuid, scope: StatusScope) -> Self {
        Self { student_id: None, module_id: Some(module_id), scope }
    }

    pub fn everywhere(scope: StatusScope) -> Self {
        Self { student_id: None, module_id: None, scope }
    }

    pub fn matches(&self, enrollment: &Enrollment) -> bool {
        self.student_id.is_none_or(|id| id == enrollment.student_id)
            && self.module_id.is_none_or(|id| id == enrollment.module_id)
            && self.scope.admits(enrollment.status)
    }
}
