//! Static role → permission table and scoped role assignment checks.

use chrono::{DateTime, Utc};

use crate::models::{Role, UserRole};

pub const CLIENTS_READ: &str = "clients:read";
pub const CLIENTS_WRITE: &str = "clients:write";
pub const CLIENTS_DELETE: &str = "clients:delete";
pub const CLIENTS_APPROVE: &str = "clients:approve";
pub const INVOICES_READ: &str = "invoices:read";
pub const INVOICES_WRITE: &str = "invoices:write";
pub const INVOICES_SEND: &str = "invoices:send";
pub const INVOICES_DELETE: &str = "invoices:delete";
pub const DOCUMENTS_READ: &str = "documents:read";
pub const DOCUMENTS_WRITE: &str = "documents:write";
pub const VALIDATION_RUN: &str = "validation:run";
pub const DASHBOARD_READ: &str = "dashboard:read";
pub const USERS_MANAGE: &str = "users:manage";

pub const ALL_PERMISSIONS: &[&str] = &[
    CLIENTS_READ,
    CLIENTS_WRITE,
    CLIENTS_DELETE,
    CLIENTS_APPROVE,
    INVOICES_READ,
    INVOICES_WRITE,
    INVOICES_SEND,
    INVOICES_DELETE,
    DOCUMENTS_READ,
    DOCUMENTS_WRITE,
    VALIDATION_RUN,
    DASHBOARD_READ,
    USERS_MANAGE,
];

const ADMIN: &[&str] = &[
    CLIENTS_READ,
    CLIENTS_WRITE,
    CLIENTS_DELETE,
    CLIENTS_APPROVE,
    INVOICES_READ,
    INVOICES_WRITE,
    INVOICES_SEND,
    INVOICES_DELETE,
    DOCUMENTS_READ,
    DOCUMENTS_WRITE,
    VALIDATION_RUN,
    DASHBOARD_READ,
];

const ACCOUNTANT: &[&str] = &[
    CLIENTS_READ,
    INVOICES_READ,
    INVOICES_WRITE,
    INVOICES_SEND,
    DOCUMENTS_READ,
    VALIDATION_RUN,
    DASHBOARD_READ,
];

const FREELANCER: &[&str] = &[
    CLIENTS_READ,
    CLIENTS_WRITE,
    CLIENTS_DELETE,
    INVOICES_READ,
    INVOICES_WRITE,
    INVOICES_SEND,
    INVOICES_DELETE,
    DOCUMENTS_READ,
    DOCUMENTS_WRITE,
    VALIDATION_RUN,
];

const VIEWER: &[&str] = &[CLIENTS_READ, INVOICES_READ, DOCUMENTS_READ];

pub fn permissions_for(role: Role) -> &'static [&'static str] {
    match role {
        Role::SuperAdmin => ALL_PERMISSIONS,
        Role::Admin => ADMIN,
        Role::Accountant => ACCOUNTANT,
        Role::Freelancer => FREELANCER,
        Role::Viewer => VIEWER,
    }
}

pub fn role_grants(role: Role, permission: &str) -> bool {
    permissions_for(role).iter().any(|p| *p == permission)
}

impl UserRole {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires| expires > now)
    }

    /// An unscoped assignment covers every profile.
    pub fn covers(&self, profile_id: Option<i32>) -> bool {
        match (self.profile_id, profile_id) {
            (None, _) => true,
            (Some(scope), Some(requested)) => scope == requested,
            (Some(_), None) => false,
        }
    }
}

/// Whether any active assignment grants `permission` for `profile_id`.
///
/// `profile_id: None` asks for the permission across all profiles, which
/// only an unscoped assignment satisfies.
pub fn has_permission(assignments: &[UserRole], permission: &str, profile_id: Option<i32>, now: DateTime<Utc>) -> bool {
    assignments
        .iter()
        .any(|a| a.is_active(now) && a.covers(profile_id) && role_grants(a.role, permission))
}

/// Profiles on which the holder has `permission`, or `None` when an
/// unscoped assignment grants it everywhere.
pub fn permitted_profiles(assignments: &[UserRole], permission: &str, now: DateTime<Utc>) -> Option<Vec<i32>> {
    let mut scoped = Vec::new();
    for a in assignments {
        if !a.is_active(now) || !role_grants(a.role, permission) {
            continue;
        }
        match a.profile_id {
            None => return None,
            Some(id) if !scoped.contains(&id) => scoped.push(id),
            Some(_) => {}
        }
    }
    Some(scoped)
}
