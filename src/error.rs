use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// Seconds a caller is asked to wait before retrying a retryable failure.
pub const RETRY_AFTER_SECS: u64 = 1;

/// Failures reported by a [`TileBackend`](crate::backend::TileBackend).
#[derive(Clone, Debug, thiserror::Error)]
pub enum BackendError {
    #[error("query timed out: {0}")]
    Timeout(String),
    #[error("malformed query: {0}")]
    QueryConstruction(String),
    #[error("database error: {0}")]
    Other(String),
}

impl BackendError {
    /// Sorts a database failure by its SQLSTATE code.
    pub fn classify(code: Option<&str>, message: String) -> BackendError {
        match code {
            // query_canceled, raised when statement_timeout fires
            Some("57014") => BackendError::Timeout(message),
            // syntax_error_or_access_rule_violation and data_exception
            Some(code) if code.starts_with("42") || code.starts_with("22") => {
                BackendError::QueryConstruction(message)
            }
            _ => BackendError::Other(message),
        }
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => BackendError::Timeout(err.to_string()),
            sqlx::Error::Database(db) => BackendError::classify(db.code().as_deref(), err.to_string()),
            _ => BackendError::Other(err.to_string()),
        }
    }
}

/// Request-level failures of the tile pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),
    #[error("Unknown format: {0}")]
    UnknownFormat(String),
    #[error("Malformed tile coordinate: {0}")]
    MalformedCoordinate(String),
    #[error("Zoom level {zoom} out of range [{min}, {max})")]
    ZoomOutOfRange { zoom: i64, min: u8, max: u8 },
    #[error("{axis} coordinate {value} out of range [0, {limit}]")]
    CoordinateOutOfRange {
        axis: &'static str,
        value: i64,
        limit: u64,
    },
    #[error("Service temporarily unavailable")]
    ServiceUnavailable,
    #[error("Internal query error")]
    InternalQueryError,
    #[error("Internal server error")]
    InternalError,
}

impl TileError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TileError::MalformedCoordinate(_) => StatusCode::BAD_REQUEST,
            TileError::UnknownLayer(_)
            | TileError::UnknownFormat(_)
            | TileError::ZoomOutOfRange { .. }
            | TileError::CoordinateOutOfRange { .. } => StatusCode::NOT_FOUND,
            TileError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            TileError::InternalQueryError | TileError::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether a caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TileError::ServiceUnavailable)
    }
}

impl From<BackendError> for TileError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Timeout(_) => TileError::ServiceUnavailable,
            BackendError::QueryConstruction(_) => TileError::InternalQueryError,
            BackendError::Other(_) => TileError::InternalError,
        }
    }
}

impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), self.to_string()).into_response();
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, header::HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}

/// Errors raised while loading a layer document.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("Invalid YAML in layer document.")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Unable to read layer document: {0}")]
    Io(#[from] std::io::Error),
    #[error("Layer name {0:?} may only contain ASCII letters, digits, '_' and '-'")]
    InvalidName(String),
    #[error("Layer {0:?} is defined more than once")]
    Duplicate(String),
    #[error("Layer {0:?} query must reference !bbox!")]
    MissingEnvelope(String),
    #[error("Layer {0:?} query may not contain positional parameters")]
    PositionalParameter(String),
    #[error("Layer {0:?} bounds must be [west, south, east, north] in degrees")]
    InvalidBounds(String),
    #[error("Layer document defines no layers")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            StatusCode::BAD_REQUEST,
            TileError::MalformedCoordinate("x".into()).status_code()
        );
        assert_eq!(
            StatusCode::NOT_FOUND,
            TileError::UnknownLayer("nonexistent".into()).status_code()
        );
        assert_eq!(
            StatusCode::NOT_FOUND,
            TileError::ZoomOutOfRange {
                zoom: 15,
                min: 16,
                max: 22
            }
            .status_code()
        );
        assert_eq!(
            StatusCode::SERVICE_UNAVAILABLE,
            TileError::ServiceUnavailable.status_code()
        );
        assert!(TileError::ServiceUnavailable.is_retryable());
        assert!(!TileError::InternalQueryError.is_retryable());
    }

    #[test]
    fn test_backend_error_mapping() {
        assert!(matches!(
            TileError::from(BackendError::Timeout("slow".into())),
            TileError::ServiceUnavailable
        ));
        assert!(matches!(
            TileError::from(BackendError::QueryConstruction("bad".into())),
            TileError::InternalQueryError
        ));
        assert!(matches!(
            TileError::from(BackendError::Other("gone".into())),
            TileError::InternalError
        ));
        assert!(matches!(
            BackendError::from(sqlx::Error::PoolTimedOut),
            BackendError::Timeout(_)
        ));
    }

    #[test]
    fn test_sqlstate_classes() {
        let classify = |code: Option<&str>| BackendError::classify(code, "failed".into());

        assert!(matches!(classify(Some("57014")), BackendError::Timeout(_)));
        for code in ["42601", "42P01", "42703", "22012", "22P02"] {
            assert!(
                matches!(classify(Some(code)), BackendError::QueryConstruction(_)),
                "{}",
                code
            );
        }
        for code in [Some("XX000"), Some("08006"), Some("57P01"), None] {
            assert!(matches!(classify(code), BackendError::Other(_)), "{:?}", code);
        }

        assert!(matches!(
            TileError::from(classify(Some("57014"))),
            TileError::ServiceUnavailable
        ));
        assert!(matches!(
            TileError::from(classify(Some("42P01"))),
            TileError::InternalQueryError
        ));
    }

    #[test]
    fn test_retry_after_only_when_retryable() {
        let response = TileError::ServiceUnavailable.into_response();
        assert_eq!(StatusCode::SERVICE_UNAVAILABLE, response.status());
        assert_eq!(
            Some("1"),
            response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
        );

        for err in [TileError::InternalQueryError, TileError::UnknownLayer("x".into())] {
            assert!(err.into_response().headers().get(header::RETRY_AFTER).is_none());
        }
    }

    #[test]
    fn test_internal_messages_hide_query() {
        let err = TileError::from(BackendError::QueryConstruction(
            "syntax error at or near SELECT".into(),
        ));
        assert!(!err.to_string().contains("SELECT"));
    }
}
