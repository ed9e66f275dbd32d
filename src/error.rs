use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    Io,
    Network,
    Backend,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneError {
    pub code: ErrorCode,
    pub message: String,
}

impl CloneError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

impl fmt::Display for CloneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Error for CloneError {}

impl From<std::io::Error> for CloneError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, err.to_string())
    }
}

impl From<serde_json::Error> for CloneError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::InvalidInput, format!("Invalid JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_code() {
        let err = CloneError::not_found("Sequence '4' not found");
        assert_eq!(err.to_string(), "NotFound: Sequence '4' not found");
    }

    #[test]
    fn json_errors_are_invalid_input() {
        let err: CloneError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }
}
