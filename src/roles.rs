//! Role Transition Engine and administrative role changes.
//!
//! The engine only ever promotes STUDENT to OLD_STUDENT. It is a pure function of the
//! stored enrollments and is safe to re-run.

use uuid::Uuid;

use crate::{
    error::AppError,
    models::{EnrollmentTally, Role, User},
    repository::{Repository, UnitOfWork},
};

/// promotion
///
/// Returns the role a student should move to, or `None` to leave it unchanged.
/// Promotion needs at least one enrollment, none in progress, and every one passed:
/// a single FAIL blocks it for good.
pub fn promotion(current: Role, tally: &EnrollmentTally) -> Option<Role> {
    if current != Role::Student {
        return None;
    }
    if tally.in_progress > 0 || tally.total == 0 {
        return None;
    }
    (tally.passed == tally.total).then_some(Role::OldStudent)
}

/// reconcile
///
/// Applies [`promotion`] to `student_id` inside an open unit of work. The student row
/// is locked before the tally is read. Returns the new role when one was written.
pub async fn reconcile(uow: &mut dyn UnitOfWork, student_id: Uuid) -> Result<Option<Role>, AppError> {
    let Some(student) = uow.lock_user(student_id).await? else {
        return Err(AppError::NotFound("student"));
    };
    if student.role != Role::Student {
        return Ok(None);
    }

    let tally = uow.enrollment_tally(student_id).await?;
    let Some(next) = promotion(student.role, &tally) else {
        tracing::debug!(%student_id, ?tally, "role unchanged");
        return Ok(None);
    };

    uow.set_user_role(student_id, next).await?;
    tracing::info!(%student_id, from = %student.role, to = %next, "student promoted");
    Ok(Some(next))
}

/// assign_role
///
/// Administrative role change. Any ADMIN may move any account to any role, except
/// that the last remaining ADMIN cannot demote themselves.
pub async fn assign_role(
    repo: &dyn Repository,
    actor_id: Uuid,
    target_id: Uuid,
    role: Role,
) -> Result<User, AppError> {
    let mut uow = repo.begin().await?;

    // Admin rows first, in id order, so concurrent role changes cannot deadlock.
    let admins = uow.lock_admins().await?;
    if !admins.contains(&actor_id) {
        tracing::warn!(%actor_id, "role change refused: actor is not an admin");
        return Err(AppError::Forbidden("only admins may change roles"));
    }

    let target = uow.lock_user(target_id).await?.ok_or(AppError::NotFound("user"))?;

    let self_demotion = actor_id == target_id && role != Role::Admin;
    if self_demotion && admins.len() <= 1 {
        tracing::warn!(%actor_id, "role change refused: sole admin self-demotion");
        return Err(AppError::Forbidden("the only admin cannot demote themselves"));
    }

    let updated = uow.set_user_role(target.id, role).await?;
    uow.commit().await?;

    tracing::info!(%actor_id, %target_id, from = %target.role, to = %role, "role assigned");
    Ok(updated)
}
