//! Error types and result definitions for mirror operations.
//!
//! Provides a classified error type with captured diagnostic metadata for
//! every fallible operation in the mirror. [`EtlError`] carries a static
//! description, an optional dynamic detail, an optional source error, and the
//! callsite location, so console logs stay useful without structured error
//! returns.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for mirror operations using [`EtlError`] as the
/// error type.
pub type EtlResult<T> = Result<T, EtlError>;

/// Specific categories of errors that can occur during mirror operations.
///
/// The classification follows the run-level policy: connection and catalog
/// errors are fatal, per-table and per-row errors are caught by their phase,
/// and external collaborator failures degrade rather than crash.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection errors
    SourceConnectionFailed,
    DestinationConnectionFailed,

    // Query and execution errors
    QueryFailed,

    // Schema and mapping errors
    SourceSchemaError,

    // Data and transformation errors
    ConversionError,
    InvalidData,

    // Configuration errors
    ConfigError,

    // IO and serialization errors
    IoError,
    SerializationError,
    DeserializationError,

    // External collaborator errors
    AuthenticationError,
    ApiRequestFailed,
    DocumentStoreError,

    // Unknown / uncategorized
    Unknown,
}

/// Detailed payload stored inside an [`EtlError`].
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
}

/// Main error type for mirror operations.
#[derive(Debug, Clone)]
pub struct EtlError {
    payload: ErrorPayload,
}

impl EtlError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches an originating [`error::Error`] to this error and returns the
    /// modified instance.
    ///
    /// The stored source is preserved across clones and exposed via
    /// [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    /// Creates an [`EtlError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            payload: ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
            },
        }
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let location = self.payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.payload.kind,
            self.payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        if let Some(detail) = self.payload.detail.as_deref() {
            write!(f, "\n  Detail: {detail}")?;
        }

        Ok(())
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

/// Creates an [`EtlError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`EtlError`] from an error kind, static description, and
/// dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts [`std::io::Error`] to [`EtlError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`serde_json::Error`] to [`EtlError`] with the appropriate kind.
impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let kind = match err.classify() {
            serde_json::error::Category::Io => ErrorKind::IoError,
            _ => ErrorKind::DeserializationError,
        };

        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed("JSON processing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`tokio_postgres::Error`] to [`EtlError`] with
/// [`ErrorKind::QueryFailed`].
impl From<tokio_postgres::Error> for EtlError {
    #[track_caller]
    fn from(err: tokio_postgres::Error) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::QueryFailed,
            Cow::Borrowed("Postgres query failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`sqlx::Error`] to [`EtlError`] with [`ErrorKind::QueryFailed`].
impl From<sqlx::Error> for EtlError {
    #[track_caller]
    fn from(err: sqlx::Error) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::QueryFailed,
            Cow::Borrowed("Postgres query failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`mongodb::error::Error`] to [`EtlError`] with
/// [`ErrorKind::DocumentStoreError`].
impl From<mongodb::error::Error> for EtlError {
    #[track_caller]
    fn from(err: mongodb::error::Error) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::DocumentStoreError,
            Cow::Borrowed("Document store operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`reqwest::Error`] to [`EtlError`].
///
/// Unauthorized and forbidden responses map to
/// [`ErrorKind::AuthenticationError`]; everything else maps to
/// [`ErrorKind::ApiRequestFailed`].
impl From<reqwest::Error> for EtlError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EtlError {
        let kind = match err.status() {
            Some(status) if status == reqwest::StatusCode::UNAUTHORIZED => {
                ErrorKind::AuthenticationError
            }
            Some(status) if status == reqwest::StatusCode::FORBIDDEN => {
                ErrorKind::AuthenticationError
            }
            _ => ErrorKind::ApiRequestFailed,
        };

        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed("HTTP request failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl_error;

    #[test]
    fn error_carries_kind_and_detail() {
        let err = etl_error!(
            ErrorKind::ConversionError,
            "Malformed price text",
            "could not parse 'abc'"
        );

        assert_eq!(err.kind(), ErrorKind::ConversionError);
        assert_eq!(err.detail(), Some("could not parse 'abc'"));
        assert!(err.to_string().contains("Malformed price text"));
    }

    #[test]
    fn error_exposes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = EtlError::from(io);

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(std::error::Error::source(&err).is_some());
    }
}
