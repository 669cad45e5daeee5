//! Enrollment Admission Control.
//!
//! The four rules are evaluated in a fixed order against counts read inside the
//! enrolling transaction; the first failing rule decides the rejection.

use crate::{
    error::Rejection,
    models::{AdmissionSnapshot, Module},
};

/// A student may hold at most this many IN_PROGRESS enrollments.
pub const MAX_ENROLLMENTS_PER_STUDENT: i64 = 4;

/// A module may hold at most this many distinct IN_PROGRESS students.
pub const MAX_STUDENTS_PER_MODULE: i64 = 10;

/// AdmissionLimits
///
/// Capacity limits applied by [`check`]. Defaults to the two constants above; the
/// deployment may override them through `AppConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionLimits {
    pub max_enrollments_per_student: i64,
    pub max_students_per_module: i64,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            max_enrollments_per_student: MAX_ENROLLMENTS_PER_STUDENT,
            max_students_per_module: MAX_STUDENTS_PER_MODULE,
        }
    }
}

/// check
///
/// Decides whether a new enrollment may be created. Pure: all inputs come from the
/// caller's locked reads. Limits are reached, not exceeded: `count < limit` admits.
pub fn check(
    module: &Module,
    snapshot: &AdmissionSnapshot,
    limits: &AdmissionLimits,
) -> Result<(), Rejection> {
    if !module.active {
        return Err(Rejection::ModuleArchived);
    }
    if snapshot.already_enrolled {
        return Err(Rejection::AlreadyEnrolled);
    }
    if snapshot.student_active >= limits.max_enrollments_per_student {
        return Err(Rejection::StudentAtCapacity);
    }
    if snapshot.module_active_students >= limits.max_students_per_module {
        return Err(Rejection::ModuleAtCapacity);
    }
    Ok(())
}
