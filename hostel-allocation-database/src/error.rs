use core::fmt;
use std::env::VarError;

use diesel::result::DatabaseErrorKind;
use diesel_async::pooled_connection::deadpool;
use thiserror::Error;

#[allow(clippy::module_name_repetitions)]
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database url not set in env variable DATABASE_URL")]
    DatabaseEnvUrl(#[from] VarError),
    #[error("Failed to create database pool {0}")]
    PoolBuild(#[from] deadpool::BuildError),
    #[error("Database pool failed {0}")]
    Pool(#[from] deadpool::PoolError),
    #[error("Database query failed {0}")]
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Bed,
    Student,
    Request,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bed => "bed",
            Self::Student => "student",
            Self::Request => "bed change request",
        })
    }
}

/// Everything a store operation can reject with. The first three are
/// rejected preconditions and are never retried.
#[derive(Error, Debug)]
pub enum HostelError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i32 },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl HostelError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    #[must_use]
    pub const fn not_found(entity: Entity, id: i32) -> Self {
        Self::NotFound { entity, id }
    }
}

impl From<diesel::result::Error> for HostelError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            // the unique indexes back up the checks done inside the transactions
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::Conflict(info.message().to_owned())
            }
            diesel::result::Error::DatabaseError(DatabaseErrorKind::CheckViolation, info) => {
                Self::Validation(info.message().to_owned())
            }
            other => Self::Database(other.into()),
        }
    }
}

impl From<deadpool::PoolError> for HostelError {
    fn from(value: deadpool::PoolError) -> Self {
        Self::Database(value.into())
    }
}
