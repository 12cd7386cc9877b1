use thiserror::Error;

use crate::models::MovieId;

/// Construction-time validation failures of the domain model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("runtime must be a positive number of minutes, got {0}")]
    InvalidRuntime(i32),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A mutation would break the review/user/movie linkage.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid stored timestamp: {0}")]
    Timestamp(#[from] jiff::Error),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl RepositoryError {
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound { entity, key: key.to_string() }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("movie {0} does not exist")]
    NonExistentMovie(MovieId),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("username already taken: {0}")]
    NameNotUnique(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
