use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required algorithm implementation was not provided at construction time.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Budget exceeded: estimated ${estimated:.6} declined by guard")]
    BudgetExceeded { estimated: f64 },

    /// `status` is `None` for transport failures (connect, timeout, decode).
    #[error("Provider error ({}): {message}", status.map_or_else(|| "network".to_string(), |s| s.to_string()))]
    Provider { status: Option<u16>, message: String },

    #[error("Hashed id {hashed} already maps to '{existing}', cannot assign '{incoming}'")]
    IdCollision { hashed: i64, existing: String, incoming: String },

    #[error("Malformed data: {0}")]
    Format(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Encode(#[from] bincode::Error),
}

impl Error {
    /// Transport failures, rate limiting and server errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { status: None, .. } => true,
            Self::Provider { status: Some(s), .. } => *s == 429 || (500..600).contains(s),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
