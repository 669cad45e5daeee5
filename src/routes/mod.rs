//! Router Module Index
//!
//! Routing is split by access level so that authentication is applied once, at the
//! router layer, rather than remembered per handler.

/// Routes accessible to anyone.
pub mod public;

/// Routes protected by the `AuthUser` middleware. Handlers still check roles
/// (students enroll, module staff resolve enrollments).
pub mod authenticated;

/// Routes restricted to the ADMIN role, nested under `/admin`.
pub mod admin;
