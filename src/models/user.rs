use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Admin,
    Accountant,
    Freelancer,
    Viewer,
}

status_labels!(Role {
    SuperAdmin => "SUPER_ADMIN",
    Admin => "ADMIN",
    Accountant => "ACCOUNTANT",
    Freelancer => "FREELANCER",
    Viewer => "VIEWER",
});

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub display_name: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Role assignment, optionally limited to one profile and a point in time.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct UserRole {
    pub id: i32,
    pub user_id: i32,
    pub role: Role,
    pub profile_id: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Session {
    pub id: i32,
    pub user_id: i32,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
