use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{
        AdminDashboardStats, AdmissionSnapshot, CreateModuleRequest, CreateUserRequest,
        Enrollment, EnrollmentFilter, EnrollmentStatus, EnrollmentTally, Module, Role, User,
    },
    repository::{Repository, UnitOfWork},
};

/// Tables
///
/// The whole in-memory dataset. Cloned into each unit of work as its staging copy.
#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    modules: HashMap<Uuid, Module>,
    // Insertion order.
    enrollments: Vec<Enrollment>,
}

impl Tables {
    fn admission_snapshot(&self, student_id: Uuid, module_id: Uuid) -> AdmissionSnapshot {
        let mut snapshot = AdmissionSnapshot::default();
        let mut module_students = Vec::new();
        for e in &self.enrollments {
            if e.student_id == student_id && e.module_id == module_id {
                snapshot.already_enrolled = true;
            }
            if e.status != EnrollmentStatus::InProgress {
                continue;
            }
            if e.student_id == student_id {
                snapshot.student_active += 1;
            }
            if e.module_id == module_id && !module_students.contains(&e.student_id) {
                module_students.push(e.student_id);
            }
        }
        snapshot.module_active_students = module_students.len() as i64;
        snapshot
    }

    fn tally(&self, student_id: Uuid) -> EnrollmentTally {
        let mut tally = EnrollmentTally::default();
        for e in self.enrollments.iter().filter(|e| e.student_id == student_id) {
            tally.total += 1;
            match e.status {
                EnrollmentStatus::InProgress => tally.in_progress += 1,
                EnrollmentStatus::Pass => tally.passed += 1,
                EnrollmentStatus::Fail => tally.failed += 1,
            }
        }
        tally
    }

    fn stats(&self) -> AdminDashboardStats {
        let users_with = |role: Role| self.users.values().filter(|u| u.role == role).count() as i64;
        let enrollments_with = |status: EnrollmentStatus| {
            self.enrollments.iter().filter(|e| e.status == status).count() as i64
        };
        AdminDashboardStats {
            total_users: self.users.len() as i64,
            students: users_with(Role::Student),
            alumni: users_with(Role::OldStudent),
            teachers: users_with(Role::Teacher),
            total_modules: self.modules.len() as i64,
            archived_modules: self.modules.values().filter(|m| !m.active).count() as i64,
            active_enrollments: enrollments_with(EnrollmentStatus::InProgress),
            passed_enrollments: enrollments_with(EnrollmentStatus::Pass),
            failed_enrollments: enrollments_with(EnrollmentStatus::Fail),
        }
    }
}

/// InMemoryRepository
///
/// A process-local implementation of `Repository` used by the test suites and by
/// demos that run without Postgres. Units of work hold one global async lock for their
/// whole lifetime, which makes them fully serializable; writes are staged on a copy and
/// only published by `commit`.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a user with a caller-chosen id. Test fixture helper.
    pub async fn insert_user(&self, id: Uuid, role: Role) -> User {
        let user = User {
            id,
            email: format!("{}@eduhub.test", id.simple()),
            name: format!("user-{}", id.simple()),
            role,
            created_at: Utc::now(),
        };
        self.tables.lock().await.users.insert(id, user.clone());
        user
    }

    /// Inserts a module with a caller-chosen id. Test fixture helper.
    pub async fn insert_module(&self, id: Uuid, active: bool, teacher_id: Option<Uuid>) -> Module {
        let module = Module {
            id,
            code: format!("M-{}", &id.simple().to_string()[..6]),
            title: "Fixture module".to_string(),
            active,
            teacher_id,
            created_at: Utc::now(),
        };
        self.tables.lock().await.modules.insert(id, module.clone());
        module
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork {
            guard: Some(guard),
            staged,
        }))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn create_user(&self, req: CreateUserRequest) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            email: req.email,
            name: req.name,
            role: req.role,
            created_at: Utc::now(),
        };
        self.tables.lock().await.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_module(&self, id: Uuid) -> Result<Option<Module>, StoreError> {
        Ok(self.tables.lock().await.modules.get(&id).cloned())
    }

    async fn list_modules(&self) -> Result<Vec<Module>, StoreError> {
        let mut modules: Vec<Module> = self.tables.lock().await.modules.values().cloned().collect();
        modules.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(modules)
    }

    async fn create_module(&self, req: CreateModuleRequest) -> Result<Module, StoreError> {
        let module = Module {
            id: Uuid::new_v4(),
            code: req.code,
            title: req.title,
            active: true,
            teacher_id: req.teacher_id,
            created_at: Utc::now(),
        };
        self.tables.lock().await.modules.insert(module.id, module.clone());
        Ok(module)
    }

    async fn set_module_active(&self, id: Uuid, active: bool) -> Result<Option<Module>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.modules.get_mut(&id).map(|m| {
            m.active = active;
            m.clone()
        }))
    }

    async fn set_module_teacher(
        &self,
        id: Uuid,
        teacher_id: Option<Uuid>,
    ) -> Result<Option<Module>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.modules.get_mut(&id).map(|m| {
            m.teacher_id = teacher_id;
            m.clone()
        }))
    }

    async fn get_enrollment(&self, id: Uuid) -> Result<Option<Enrollment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.enrollments.iter().find(|e| e.id == id).cloned())
    }

    async fn list_enrollments(&self, filter: EnrollmentFilter) -> Result<Vec<Enrollment>, StoreError> {
        let tables = self.tables.lock().await;
        // Newest first, matching the Postgres ordering.
        Ok(tables
            .enrollments
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn delete_enrollment(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.enrollments.len();
        tables.enrollments.retain(|e| e.id != id);
        Ok(tables.enrollments.len() < before)
    }

    async fn get_stats(&self) -> Result<AdminDashboardStats, StoreError> {
        Ok(self.tables.lock().await.stats())
    }
}

/// InMemoryUnitOfWork
///
/// Holds the store lock until dropped. `staged` replaces the shared tables on commit.
pub struct InMemoryUnitOfWork {
    guard: Option<OwnedMutexGuard<Tables>>,
    staged: Tables,
}

impl InMemoryUnitOfWork {
    fn tables(&mut self) -> Result<&mut Tables, StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(&mut self.staged)
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_user(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn lock_module(&mut self, id: Uuid) -> Result<Option<Module>, StoreError> {
        Ok(self.tables()?.modules.get(&id).cloned())
    }

    async fn lock_enrollment(&mut self, id: Uuid) -> Result<Option<Enrollment>, StoreError> {
        Ok(self.tables()?.enrollments.iter().find(|e| e.id == id).cloned())
    }

    async fn lock_admins(&mut self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .tables()?
            .users
            .values()
            .filter(|u| u.role == Role::Admin)
            .map(|u| u.id)
            .collect())
    }

    async fn admission_snapshot(
        &mut self,
        student_id: Uuid,
        module_id: Uuid,
    ) -> Result<AdmissionSnapshot, StoreError> {
        Ok(self.tables()?.admission_snapshot(student_id, module_id))
    }

    async fn enrollment_tally(&mut self, student_id: Uuid) -> Result<EnrollmentTally, StoreError> {
        Ok(self.tables()?.tally(student_id))
    }

    async fn insert_enrollment(
        &mut self,
        student_id: Uuid,
        module_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<Enrollment, StoreError> {
        let tables = self.tables()?;
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            student_id,
            module_id,
            status: EnrollmentStatus::InProgress,
            started_at,
            completed_at: None,
        };
        tables.enrollments.push(enrollment.clone());
        Ok(enrollment)
    }

    async fn update_enrollment_status(
        &mut self,
        id: Uuid,
        status: EnrollmentStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Enrollment, StoreError> {
        let tables = self.tables()?;
        let enrollment = tables
            .enrollments
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        enrollment.status = status;
        enrollment.completed_at = completed_at;
        Ok(enrollment.clone())
    }

    async fn set_user_role(&mut self, id: Uuid, role: Role) -> Result<User, StoreError> {
        let tables = self.tables()?;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        user.role = role;
        Ok(user.clone())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut guard = self.guard.take().ok_or(StoreError::Closed)?;
        *guard = std::mem::take(&mut self.staged);
        Ok(())
    }
}
