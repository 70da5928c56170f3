use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Corrupt row: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
