use chrono::Utc;
use uuid::Uuid;

use crate::{
    admission::{self, AdmissionLimits},
    error::AppError,
    models::{Enrollment, EnrollmentFilter, EnrollmentStatus, Role, StatusScope},
    repository::{RepositoryState, UnitOfWork},
    roles,
};

/// EnrollmentService
///
/// The enrollment core: admission control on `enroll`, status writes on
/// `complete`/`reset`, and the read-only listings. Every status write reconciles the
/// owning student's role inside the same unit of work, so a caller reading the user
/// right after a successful call sees the final role.
///
/// Authorization is the caller's job: `complete`, `reset` and `withdraw` trust that
/// the actor is the module's teacher or an admin.
#[derive(Clone)]
pub struct EnrollmentService {
    repo: RepositoryState,
    limits: AdmissionLimits,
}

impl EnrollmentService {
    pub fn new(repo: RepositoryState, limits: AdmissionLimits) -> Self {
        Self { repo, limits }
    }

    /// enroll
    ///
    /// Creates an IN_PROGRESS enrollment when every admission rule passes. The student
    /// and module rows stay locked from the count to the insert.
    pub async fn enroll(&self, student_id: Uuid, module_id: Uuid) -> Result<Enrollment, AppError> {
        let mut uow = self.repo.begin().await?;

        uow.lock_user(student_id)
            .await?
            .ok_or(AppError::NotFound("student"))?;
        let module = uow
            .lock_module(module_id)
            .await?
            .ok_or(AppError::NotFound("module"))?;

        let snapshot = uow.admission_snapshot(student_id, module_id).await?;
        if let Err(reason) = admission::check(&module, &snapshot, &self.limits) {
            tracing::warn!(%student_id, %module_id, %reason, "enrollment rejected");
            return Err(reason.into());
        }

        let enrollment = uow.insert_enrollment(student_id, module_id, Utc::now()).await?;
        uow.commit().await?;

        tracing::info!(enrollment_id = %enrollment.id, %student_id, %module_id, "student enrolled");
        Ok(enrollment)
    }

    /// complete
    ///
    /// Resolves an IN_PROGRESS enrollment to PASS or FAIL and stamps the completion
    /// time. IN_PROGRESS as the target, or an enrollment that is already resolved, is
    /// refused as an invalid argument and nothing is written. `reset` is the only way
    /// out of PASS or FAIL.
    pub async fn complete(
        &self,
        enrollment_id: Uuid,
        status: EnrollmentStatus,
    ) -> Result<Enrollment, AppError> {
        if !status.is_resolved() {
            return Err(AppError::InvalidArgument(format!(
                "completion status must be PASS or FAIL, got {status}"
            )));
        }
        self.write_status(enrollment_id, status).await
    }

    /// complete_str
    ///
    /// `complete` for raw caller input, e.g. a JSON body. Unknown strings are an
    /// invalid argument.
    pub async fn complete_str(&self, enrollment_id: Uuid, status: &str) -> Result<Enrollment, AppError> {
        let status: EnrollmentStatus = status.parse()?;
        self.complete(enrollment_id, status).await
    }

    /// reset
    ///
    /// The teacher override: back to IN_PROGRESS with the completion time cleared.
    /// Promotion is one-way, so an OLD_STUDENT stays OLD_STUDENT.
    pub async fn reset(&self, enrollment_id: Uuid) -> Result<Enrollment, AppError> {
        self.write_status(enrollment_id, EnrollmentStatus::InProgress).await
    }

    /// withdraw
    ///
    /// Deletes an enrollment. Deletion is not a status change and does not touch roles.
    pub async fn withdraw(&self, enrollment_id: Uuid) -> Result<bool, AppError> {
        let deleted = self.repo.delete_enrollment(enrollment_id).await?;
        if deleted {
            tracing::info!(%enrollment_id, "enrollment withdrawn");
        }
        Ok(deleted)
    }

    /// reconcile_role
    ///
    /// Re-evaluates the role of the enrollment's student. Status writes call this
    /// implicitly; exposed for backfill and repair.
    pub async fn reconcile_role(&self, enrollment_id: Uuid) -> Result<Option<Role>, AppError> {
        let mut uow = self.repo.begin().await?;
        let enrollment = uow
            .lock_enrollment(enrollment_id)
            .await?
            .ok_or(AppError::NotFound("enrollment"))?;
        let changed = roles::reconcile(uow.as_mut(), enrollment.student_id).await?;
        uow.commit().await?;
        Ok(changed)
    }

    pub async fn enrollment(&self, enrollment_id: Uuid) -> Result<Enrollment, AppError> {
        self.repo
            .get_enrollment(enrollment_id)
            .await?
            .ok_or(AppError::NotFound("enrollment"))
    }

    // --- Queries ---

    pub async fn list_active(&self, student_id: Uuid) -> Result<Vec<Enrollment>, AppError> {
        let filter = EnrollmentFilter::student(student_id, StatusScope::Active);
        Ok(self.repo.list_enrollments(filter).await?)
    }

    /// PASS and FAIL enrollments of one student.
    pub async fn list_completed(&self, student_id: Uuid) -> Result<Vec<Enrollment>, AppError> {
        let filter = EnrollmentFilter::student(student_id, StatusScope::Resolved);
        Ok(self.repo.list_enrollments(filter).await?)
    }

    pub async fn list_all_active(&self) -> Result<Vec<Enrollment>, AppError> {
        let filter = EnrollmentFilter::everywhere(StatusScope::Active);
        Ok(self.repo.list_enrollments(filter).await?)
    }

    pub async fn list_module_active(&self, module_id: Uuid) -> Result<Vec<Enrollment>, AppError> {
        let filter = EnrollmentFilter::module(module_id, StatusScope::Active);
        Ok(self.repo.list_enrollments(filter).await?)
    }

    /// write_status
    ///
    /// Shared by `complete` and `reset`. A resolved enrollment cannot be resolved
    /// again. The role engine runs only when the status value actually changes.
    async fn write_status(
        &self,
        enrollment_id: Uuid,
        status: EnrollmentStatus,
    ) -> Result<Enrollment, AppError> {
        let mut uow = self.repo.begin().await?;
        let current = uow
            .lock_enrollment(enrollment_id)
            .await?
            .ok_or(AppError::NotFound("enrollment"))?;

        if status.is_resolved() && current.status.is_resolved() {
            tracing::warn!(%enrollment_id, current = %current.status, requested = %status, "completion refused");
            return Err(AppError::InvalidArgument(format!(
                "enrollment is already {}, reset it first",
                current.status
            )));
        }

        let completed_at = status.is_resolved().then(Utc::now);
        let updated = uow
            .update_enrollment_status(enrollment_id, status, completed_at)
            .await?;

        if current.status != updated.status {
            on_status_changed(uow.as_mut(), &updated).await?;
        }
        uow.commit().await?;

        tracing::info!(%enrollment_id, from = %current.status, to = %updated.status, "enrollment status written");
        Ok(updated)
    }
}

/// Post-update hook for status changes, run before the unit of work commits.
async fn on_status_changed(uow: &mut dyn UnitOfWork, enrollment: &Enrollment) -> Result<(), AppError> {
    roles::reconcile(uow, enrollment.student_id).await?;
    Ok(())
}
