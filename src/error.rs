pub type Result<T> = std::result::Result<T, RankError>;

#[derive(Debug, thiserror::Error)]
pub enum RankError {
    #[error("note store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("snapshot cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for RankError {
    fn from(err: sqlx::Error) -> Self {
        RankError::StoreUnavailable(err.to_string())
    }
}
