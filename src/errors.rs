/// Domain-specific error types for the pricing desk.
/// Pricing and curve lookups fail fast with a typed error. The IV solver
/// never returns an error for non-convergence; that is a field of its result.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("domain error: {0}")]
    Domain(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("missing data: {0}")]
    MissingData(String),

    #[error("forecast error: {0}")]
    Forecast(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<csv::Error> for EngineError {
    fn from(e: csv::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<chrono::ParseError> for EngineError {
    fn from(e: chrono::ParseError) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
