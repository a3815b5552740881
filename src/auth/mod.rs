//! Passwords, opaque tokens and the authenticated caller.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{User, UserRole};
use crate::permissions;

pub const SESSION_COOKIE: &str = "zzp_session";

pub fn hash_password(password: &str) -> Result<String> {
    if password.len() < 8 {
        return Err(Error::validation("password must be at least 8 characters"));
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| Error::validation(format!("could not hash password: {err}")))
}

/// A malformed stored hash verifies as false.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// A random 256-bit token, hex encoded. Only its hash is persisted.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Reads a session token from `Authorization: Bearer` or the session cookie.
pub fn token_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    use axum::http::header::{AUTHORIZATION, COOKIE};

    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// The user behind a request, with the role assignments loaded for it.
#[derive(Debug, Clone, Serialize)]
pub struct Caller {
    pub user: User,
    pub roles: Vec<UserRole>,
    #[serde(skip)]
    pub now: DateTime<Utc>,
}

impl Caller {
    pub fn new(user: User, roles: Vec<UserRole>) -> Self {
        Self {
            user,
            roles,
            now: Utc::now(),
        }
    }

    pub fn id(&self) -> i32 {
        self.user.id
    }

    pub fn can(&self, permission: &str, profile_id: Option<i32>) -> bool {
        permissions::has_permission(&self.roles, permission, profile_id, self.now)
    }

    /// Fails with `Forbidden` unless the caller holds `permission` for the profile.
    pub fn require(&self, permission: &str, profile_id: Option<i32>) -> Result<()> {
        if self.can(permission, profile_id) {
            Ok(())
        } else {
            tracing::debug!(user_id = self.user.id, permission, ?profile_id, "permission denied");
            Err(Error::Forbidden(permission.to_string()))
        }
    }

    /// Profiles whose data the caller may see with `permission`; `None` means all.
    pub fn profile_scope(&self, permission: &str) -> Result<Option<Vec<i32>>> {
        match permissions::permitted_profiles(&self.roles, permission, self.now) {
            Some(ids) if ids.is_empty() => Err(Error::Forbidden(permission.to_string())),
            scope => Ok(scope),
        }
    }

    /// Names of every permission the caller holds somewhere.
    pub fn permission_names(&self) -> Vec<&'static str> {
        permissions::ALL_PERMISSIONS
            .iter()
            .copied()
            .filter(|p| permissions::permitted_profiles(&self.roles, p, self.now).is_none_or(|ids| !ids.is_empty()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    use crate::models::Role;

    fn caller(roles: Vec<(Role, Option<i32>)>) -> Caller {
        let user = User {
            id: 11,
            email: "anna@example.nl".into(),
            display_name: "Anna".into(),
            password_hash: String::new(),
            created_at: Utc::now(),
        };
        let roles = roles
            .into_iter()
            .enumerate()
            .map(|(i, (role, profile_id))| UserRole {
                id: i as i32 + 1,
                user_id: 11,
                role,
                profile_id,
                expires_at: None,
                created_at: Utc::now(),
            })
            .collect();
        Caller::new(user, roles)
    }

    #[test]
    fn passwords_verify_against_their_hash() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[test]
    fn short_passwords_are_refused() {
        assert!(hash_password("short").is_err());
    }

    #[test]
    fn tokens_are_random_and_hash_deterministically() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(hash_token(&a), hash_token(&a));
        assert_ne!(hash_token(&a), a);
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("theme=dark; zzp_session=fromcookie"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("fromcookie"));

        headers.insert("authorization", HeaderValue::from_static("Bearer fromheader"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("fromheader"));

        assert_eq!(token_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn require_reports_the_missing_permission() {
        let c = caller(vec![(Role::Viewer, Some(2))]);
        assert!(c.require(permissions::CLIENTS_READ, Some(2)).is_ok());
        match c.require(permissions::CLIENTS_WRITE, Some(2)) {
            Err(Error::Forbidden(p)) => assert_eq!(p, permissions::CLIENTS_WRITE),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn profile_scope_follows_assignments() {
        let scoped = caller(vec![(Role::Freelancer, Some(4))]);
        assert_eq!(scoped.profile_scope(permissions::CLIENTS_READ).unwrap(), Some(vec![4]));
        assert!(scoped.profile_scope(permissions::DASHBOARD_READ).is_err());

        let admin = caller(vec![(Role::Admin, None)]);
        assert_eq!(admin.profile_scope(permissions::CLIENTS_READ).unwrap(), None);
        assert!(!admin.permission_names().contains(&permissions::USERS_MANAGE));
    }
}
