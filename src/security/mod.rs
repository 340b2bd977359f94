//! Access control
//!
//! - Role-based permission table with default-deny lookups
//! - Authorization gate consulted before every step
//! - Identity resolution from credentials to users

pub mod identity;
pub mod rbac;

pub use identity::{IdentityResolver, StaticTokenResolver, TokenEntry, User};
pub use rbac::{AccessTarget, Action, AuthorizationGate, PermissionRule, PermissionTable, ResourceKind, Role};
