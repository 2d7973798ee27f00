pub type ReclockResult<T> = Result<T, ReclockError>;

#[derive(thiserror::Error, Debug)]
pub enum ReclockError {
    #[error("validation error: {0}")]
    Validation(String),

    /// Environment problems detected before any job starts (missing encoder
    /// binary, unreachable renderer, empty scene set). Messages carry a
    /// remediation hint.
    #[error("setup error: {0}")]
    Setup(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReclockError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}
