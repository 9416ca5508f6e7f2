use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid tree uri: {0}")]
    InvalidUri(String),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("tree root not found: {0}")]
    NotFound(String),
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("not writable: {0}")]
    NotWritable(String),
    #[error("grant failed: {0}")]
    Grant(String),
    #[error("requires api level {required}, running {actual}")]
    PlatformVersion { required: u32, actual: u32 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("provider error: {0}")]
    Provider(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl TreeError {
    pub fn code(&self) -> &'static str {
        match self {
            TreeError::InvalidPath(_) => "InvalidPath",
            TreeError::InvalidUri(_) => "InvalidUri",
            TreeError::NotAuthorized(_) => "NotAuthorized",
            TreeError::NotFound(_) => "NotFound",
            TreeError::NodeNotFound(_) => "NodeNotFound",
            TreeError::NotADirectory(_) => "NotADirectory",
            TreeError::NotWritable(_) => "NotWritable",
            TreeError::Grant(_) => "Grant",
            TreeError::PlatformVersion { .. } => "PlatformVersion",
            TreeError::Io(_) => "Io",
            TreeError::Provider(_) => "Provider",
        }
    }

    /// True for the failures that mean "nothing usable lives at this path".
    pub fn is_not_found(&self) -> bool {
        matches!(self, TreeError::NotFound(_) | TreeError::NodeNotFound(_))
    }
}

pub type TreeResult<T> = Result<T, TreeError>;

pub fn into_body(err: &TreeError) -> ErrorBody {
    ErrorBody {
        code: err.code(),
        message: err.to_string(),
    }
}
