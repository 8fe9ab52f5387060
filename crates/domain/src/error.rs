/// Shared error type used across all pointmine crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("insufficient balance: {balance} available, {amount} requested")]
    InsufficientBalance { balance: i64, amount: i64 },

    #[error("store: {0}")]
    Store(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
