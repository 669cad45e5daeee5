use crate::{
    error::StoreError,
    models::{
        AdminDashboardStats, AdmissionSnapshot, CreateModuleRequest, CreateUserRequest,
        Enrollment, EnrollmentFilter, EnrollmentStatus, EnrollmentTally, Module, Role, StatusScope,
        User,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction, query_builder::QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Abstract contract for the record stores the enrollment core consumes: user lookup,
/// module administration and enrollment queries. Every write that must be checked
/// against live counts goes through a [`UnitOfWork`] obtained from [`Repository::begin`].
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across Axum's
/// task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Opens an atomic unit of work. Dropping it without `commit` discards its writes.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    // --- Users ---
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn create_user(&self, req: CreateUserRequest) -> Result<User, StoreError>;

    // --- Modules ---
    async fn get_module(&self, id: Uuid) -> Result<Option<Module>, StoreError>;
    async fn list_modules(&self) -> Result<Vec<Module>, StoreError>;
    async fn create_module(&self, req: CreateModuleRequest) -> Result<Module, StoreError>;
    async fn set_module_active(&self, id: Uuid, active: bool) -> Result<Option<Module>, StoreError>;
    async fn set_module_teacher(
        &self,
        id: Uuid,
        teacher_id: Option<Uuid>,
    ) -> Result<Option<Module>, StoreError>;

    // --- Enrollments ---
    async fn get_enrollment(&self, id: Uuid) -> Result<Option<Enrollment>, StoreError>;
    async fn list_enrollments(&self, filter: EnrollmentFilter) -> Result<Vec<Enrollment>, StoreError>;
    /// Hard delete. Returns false when no row matched.
    async fn delete_enrollment(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn get_stats(&self) -> Result<AdminDashboardStats, StoreError>;
}

/// UnitOfWork Trait
///
/// One atomic transaction. `lock_*` reads hold the row until commit or drop, so
/// concurrent units of work touching the same student, module or enrollment serialize.
/// Enrollment locks the student, then the module. Status changes lock the enrollment,
/// then its student. Role changes lock all admins, then the target.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn lock_user(&mut self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn lock_module(&mut self, id: Uuid) -> Result<Option<Module>, StoreError>;
    async fn lock_enrollment(&mut self, id: Uuid) -> Result<Option<Enrollment>, StoreError>;
    /// Locks every ADMIN account and returns their ids.
    async fn lock_admins(&mut self) -> Result<Vec<Uuid>, StoreError>;

    async fn admission_snapshot(
        &mut self,
        student_id: Uuid,
        module_id: Uuid,
    ) -> Result<AdmissionSnapshot, StoreError>;
    async fn enrollment_tally(&mut self, student_id: Uuid) -> Result<EnrollmentTally, StoreError>;

    async fn insert_enrollment(
        &mut self,
        student_id: Uuid,
        module_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<Enrollment, StoreError>;
    async fn update_enrollment_status(
        &mut self,
        id: Uuid,
        status: EnrollmentStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Enrollment, StoreError>;
    async fn set_user_role(&mut self, id: Uuid, role: Role) -> Result<User, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, email, name, role, created_at";
const MODULE_COLUMNS: &str = "id, code, title, active, teacher_id, created_at";
const ENROLLMENT_COLUMNS: &str = "id, student_id, module_id, status, started_at, completed_at";

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx: Some(tx) }))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// create_user
    ///
    /// Mirrors an account created by the external identity provider.
    async fn create_user(&self, req: CreateUserRequest) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email, name, role, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(req.email)
        .bind(req.name)
        .bind(req.role)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_module(&self, id: Uuid) -> Result<Option<Module>, StoreError> {
        let module = sqlx::query_as::<_, Module>(&format!(
            "SELECT {MODULE_COLUMNS} FROM modules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(module)
    }

    async fn list_modules(&self) -> Result<Vec<Module>, StoreError> {
        let modules = sqlx::query_as::<_, Module>(&format!(
            "SELECT {MODULE_COLUMNS} FROM modules ORDER BY code ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(modules)
    }

    async fn create_module(&self, req: CreateModuleRequest) -> Result<Module, StoreError> {
        let module = sqlx::query_as::<_, Module>(&format!(
            "INSERT INTO modules (id, code, title, active, teacher_id, created_at) \
             VALUES ($1, $2, $3, true, $4, NOW()) RETURNING {MODULE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(req.code)
        .bind(req.title)
        .bind(req.teacher_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(module)
    }

    async fn set_module_active(&self, id: Uuid, active: bool) -> Result<Option<Module>, StoreError> {
        let module = sqlx::query_as::<_, Module>(&format!(
            "UPDATE modules SET active = $2 WHERE id = $1 RETURNING {MODULE_COLUMNS}"
        ))
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(module)
    }

    async fn set_module_teacher(
        &self,
        id: Uuid,
        teacher_id: Option<Uuid>,
    ) -> Result<Option<Module>, StoreError> {
        let module = sqlx::query_as::<_, Module>(&format!(
            "UPDATE modules SET teacher_id = $2 WHERE id = $1 RETURNING {MODULE_COLUMNS}"
        ))
        .bind(id)
        .bind(teacher_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(module)
    }

    async fn get_enrollment(&self, id: Uuid) -> Result<Option<Enrollment>, StoreError> {
        let enrollment = sqlx::query_as::<_, Enrollment>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(enrollment)
    }

    /// list_enrollments
    ///
    /// Builds the filter with QueryBuilder so every value is bound, never interpolated.
    async fn list_enrollments(&self, filter: EnrollmentFilter) -> Result<Vec<Enrollment>, StoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE TRUE"
        ));

        if let Some(student_id) = filter.student_id {
            builder.push(" AND student_id = ");
            builder.push_bind(student_id);
        }
        if let Some(module_id) = filter.module_id {
            builder.push(" AND module_id = ");
            builder.push_bind(module_id);
        }
        match filter.scope {
            StatusScope::All => {}
            StatusScope::Active => {
                builder.push(" AND status = ");
                builder.push_bind(EnrollmentStatus::InProgress);
            }
            StatusScope::Resolved => {
                builder.push(" AND status <> ");
                builder.push_bind(EnrollmentStatus::InProgress);
            }
        }

        builder.push(" ORDER BY started_at DESC, id ASC");

        let enrollments = builder
            .build_query_as::<Enrollment>()
            .fetch_all(&self.pool)
            .await?;
        Ok(enrollments)
    }

    async fn delete_enrollment(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM enrollments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// get_stats
    ///
    /// Compiles all dashboard counters in a single round trip.
    async fn get_stats(&self) -> Result<AdminDashboardStats, StoreError> {
        let stats = sqlx::query_as::<_, AdminDashboardStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS total_users,
                (SELECT COUNT(*) FROM users WHERE role = 'STUDENT') AS students,
                (SELECT COUNT(*) FROM users WHERE role = 'OLD_STUDENT') AS alumni,
                (SELECT COUNT(*) FROM users WHERE role = 'TEACHER') AS teachers,
                (SELECT COUNT(*) FROM modules) AS total_modules,
                (SELECT COUNT(*) FROM modules WHERE active = false) AS archived_modules,
                (SELECT COUNT(*) FROM enrollments WHERE status = 'IN_PROGRESS') AS active_enrollments,
                (SELECT COUNT(*) FROM enrollments WHERE status = 'PASS') AS passed_enrollments,
                (SELECT COUNT(*) FROM enrollments WHERE status = 'FAIL') AS failed_enrollments
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}

/// PgUnitOfWork
///
/// A Postgres transaction. Row locks are taken with `SELECT ... FOR UPDATE`; counts
/// run after the locks so they observe every competing transaction that committed first.
pub struct PgUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnitOfWork {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(StoreError::Closed),
        }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_user(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(user)
    }

    async fn lock_module(&mut self, id: Uuid) -> Result<Option<Module>, StoreError> {
        let module = sqlx::query_as::<_, Module>(&format!(
            "SELECT {MODULE_COLUMNS} FROM modules WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(module)
    }

    async fn lock_enrollment(&mut self, id: Uuid) -> Result<Option<Enrollment>, StoreError> {
        let enrollment = sqlx::query_as::<_, Enrollment>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(enrollment)
    }

    async fn lock_admins(&mut self) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM users WHERE role = 'ADMIN' ORDER BY id FOR UPDATE",
        )
        .fetch_all(self.conn()?)
        .await?;
        Ok(ids)
    }

    async fn admission_snapshot(
        &mut self,
        student_id: Uuid,
        module_id: Uuid,
    ) -> Result<AdmissionSnapshot, StoreError> {
        let snapshot = sqlx::query_as::<_, AdmissionSnapshot>(
            r#"
            SELECT
                EXISTS (
                    SELECT 1 FROM enrollments WHERE student_id = $1 AND module_id = $2
                ) AS already_enrolled,
                (SELECT COUNT(*) FROM enrollments
                    WHERE student_id = $1 AND status = 'IN_PROGRESS') AS student_active,
                (SELECT COUNT(DISTINCT student_id) FROM enrollments
                    WHERE module_id = $2 AND status = 'IN_PROGRESS') AS module_active_students
            "#,
        )
        .bind(student_id)
        .bind(module_id)
        .fetch_one(self.conn()?)
        .await?;
        Ok(snapshot)
    }

    async fn enrollment_tally(&mut self, student_id: Uuid) -> Result<EnrollmentTally, StoreError> {
        let tally = sqlx::query_as::<_, EnrollmentTally>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'IN_PROGRESS') AS in_progress,
                COUNT(*) FILTER (WHERE status = 'PASS') AS passed,
                COUNT(*) FILTER (WHERE status = 'FAIL') AS failed
            FROM enrollments
            WHERE student_id = $1
            "#,
        )
        .bind(student_id)
        .fetch_one(self.conn()?)
        .await?;
        Ok(tally)
    }

    async fn insert_enrollment(
        &mut self,
        student_id: Uuid,
        module_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<Enrollment, StoreError> {
        let enrollment = sqlx::query_as::<_, Enrollment>(&format!(
            "INSERT INTO enrollments (id, student_id, module_id, status, started_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, NULL) RETURNING {ENROLLMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(module_id)
        .bind(EnrollmentStatus::InProgress)
        .bind(started_at)
        .fetch_one(self.conn()?)
        .await?;
        Ok(enrollment)
    }

    async fn update_enrollment_status(
        &mut self,
        id: Uuid,
        status: EnrollmentStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Enrollment, StoreError> {
        let enrollment = sqlx::query_as::<_, Enrollment>(&format!(
            "UPDATE enrollments SET status = $2, completed_at = $3 \
             WHERE id = $1 RETURNING {ENROLLMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(completed_at)
        .fetch_one(self.conn()?)
        .await?;
        Ok(enrollment)
    }

    async fn set_user_role(&mut self, id: Uuid, role: Role) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role)
        .fetch_one(self.conn()?)
        .await?;
        Ok(user)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.commit().await?;
        Ok(())
    }
}
