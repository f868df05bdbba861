#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },
    #[error("{column} value {value} does not fit a sqlite integer")]
    OutOfRange { column: &'static str, value: u64 },
}

pub type Result<T> = std::result::Result<T, DbError>;
