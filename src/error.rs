use axum::http::StatusCode;
use std::fmt;

/// Failures that map to a client-facing status, anything else is a 500.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
}

impl ApiError {
    pub fn missing(field: &str) -> anyhow::Error {
        ApiError::BadRequest(format!("Missing required field: {field}")).into()
    }

    pub fn invalid(field: &str) -> anyhow::Error {
        ApiError::BadRequest(format!("Invalid field: {field}")).into()
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => f.write_str(msg),
            ApiError::NotFound => f.write_str("Not found"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Returns the trimmed value of a required text field.
pub fn required(value: Option<String>, field: &str) -> anyhow::Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::missing(field)),
    }
}

/// Like [`required`] but absent is fine, present-and-blank is not.
pub fn optional(value: Option<String>, field: &str) -> anyhow::Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(v) => required(Some(v), field).map(Some),
    }
}
