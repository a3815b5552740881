use thiserror::Error;

use crate::models::{ApprovalStatus, OnboardingStatus};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the domain and persistence layers.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("cannot apply {event} while client is {onboarding}/{approval}")]
    InvalidTransition {
        event: &'static str,
        onboarding: OnboardingStatus,
        approval: ApprovalStatus,
    },

    #[error("{0} has expired")]
    Expired(String),

    #[error("missing permission {0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("registry lookup failed: {0}")]
    Registry(String),

    #[error("mail delivery failed: {0}")]
    Mail(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Database(sqlx::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("record".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Self::Conflict(format!("already exists: {}", db.message()))
            }
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                Self::Conflict(format!("still referenced: {}", db.message()))
            }
            other => Self::Database(other),
        }
    }
}
