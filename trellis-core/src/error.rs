// Error types for the Trellis routing core

use thiserror::Error;

/// Errors raised while compiling a route pattern.
///
/// These are registration-time failures: `Router::add_route` returns them
/// synchronously and they never surface while serving requests.
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("invalid constraint for parameter `{name}` in `{pattern}`: {source}")]
    InvalidConstraint {
        pattern: String,
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("unterminated constraint in `{0}`")]
    UnterminatedConstraint(String),

    #[error("empty parameter name in `{0}`")]
    EmptyParameterName(String),

    #[error("invalid parameter name `{name}` in `{pattern}`")]
    InvalidParameterName { pattern: String, name: String },

    #[error("duplicate parameter `{name}` in `{pattern}`")]
    DuplicateParameter { pattern: String, name: String },

    #[error("only one wildcard is allowed in `{0}`")]
    MultipleWildcards(String),

    #[error("wildcard must be the last segment in `{0}`")]
    WildcardNotLast(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid route pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound(_) | Error::NotFound(_) => 404,
            Error::MethodNotAllowed(_) => 405,
            Error::BadRequest(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            _ => 500,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::RouteNotFound("GET /".into()).status_code(), 404);
        assert_eq!(Error::MethodNotAllowed("POST /".into()).status_code(), 405);
        assert_eq!(Error::Forbidden("nope".into()).status_code(), 403);
        assert_eq!(Error::Internal("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_pattern_error_is_server_side() {
        let err: Error = PatternError::MultipleWildcards("/a/*/*".into()).into();
        assert!(err.is_server_error());
        assert!(err.to_string().contains("/a/*/*"));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(Error::BadRequest("x".into()).is_client_error());
        assert!(!Error::BadRequest("x".into()).is_server_error());
    }
}
