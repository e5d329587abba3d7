//! Error types and result definitions for warehouse population.
//!
//! [`EtlError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source error and the location where it was created. Several
//! errors can be aggregated into one, which is how a population run reports every failed
//! table at once.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type used throughout the crate.
pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for population operations.
#[derive(Debug, Clone)]
pub struct EtlError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Aggregated errors, one per failed table.
    Many {
        errors: Vec<EtlError>,
        location: &'static Location<'static>,
    },
}

/// Classification of population failures.
///
/// Every kind is handled the same way at the table boundary: the table is reported as
/// failed and the run moves on. The kind exists so logs and callers can tell failures apart.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The snapshot could not be read from object storage (missing bucket or key).
    FetchError,
    /// The snapshot could not be written to object storage.
    UploadError,
    /// The credentials secret could not be read or does not describe a connection.
    CredentialsError,
    /// The warehouse connection could not be established or was lost.
    ConnectionError,
    /// The snapshot and the warehouse table cannot be compared.
    DataShapeError,
    /// A statement failed in the warehouse.
    QueryError,
    /// A table did not finish within its time budget.
    TimeoutError,
    /// A single value could not be converted.
    InvalidData,
    ConfigError,
    Unknown,
}

impl EtlError {
    /// Returns the [`ErrorKind`] of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => &payload.description,
            ErrorRepr::Many { .. } => "multiple errors",
        }
    }

    /// Returns the dynamic detail, or the first one found among aggregated errors.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error. Has no effect on aggregated errors.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Re-classifies this error, keeping everything else.
    ///
    /// Conversions such as `From<tokio_postgres::Error>` can only guess the kind; the call
    /// site knows whether it was connecting or querying.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.kind = kind;
        }
        self
    }

    /// One line summary without location or backtrace, suitable for structured log fields.
    pub fn summary(&self) -> String {
        match &self.repr {
            ErrorRepr::Single(payload) => match &payload.detail {
                Some(detail) => format!("[{:?}] {}: {}", payload.kind, payload.description, detail),
                None => format!("[{:?}] {}", payload.kind, payload.description),
            },
            ErrorRepr::Many { errors, .. } => errors
                .iter()
                .map(EtlError::summary)
                .collect::<Vec<_>>()
                .join("; "),
        }
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = &payload.detail {
                    write!(f, "\n  Detail:")?;
                    for line in detail.lines() {
                        write!(f, "\n    {line}")?;
                    }
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write!(f, "\n  Backtrace:")?;
                    for line in backtrace.lines() {
                        write!(f, "\n    {line}")?;
                    }
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                write!(
                    f,
                    "[Many] {} errors aggregated @ {}:{}:{}",
                    errors.len(),
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for EtlError
where
    E: Into<EtlError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> EtlError {
        let location = Location::caller();
        let mut errors: Vec<EtlError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        EtlError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::FetchError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::InvalidData,
            Cow::Borrowed("JSON deserialization failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<parquet::errors::ParquetError> for EtlError {
    #[track_caller]
    fn from(err: parquet::errors::ParquetError) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::DataShapeError,
            Cow::Borrowed("Parquet snapshot could not be decoded"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<arrow::error::ArrowError> for EtlError {
    #[track_caller]
    fn from(err: arrow::error::ArrowError) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::DataShapeError,
            Cow::Borrowed("Arrow record batch could not be read"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<tokio::time::error::Elapsed> for EtlError {
    #[track_caller]
    fn from(err: tokio::time::error::Elapsed) -> EtlError {
        EtlError::from_components(
            ErrorKind::TimeoutError,
            Cow::Borrowed("Operation timed out"),
            None,
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`tokio_postgres::Error`] into an [`EtlError`].
///
/// Failures without a SQLSTATE happen on the client side (closed socket, I/O) and are
/// connection errors, as are the connection, authentication and resource classes. Every other
/// SQLSTATE is a failed statement.
impl From<tokio_postgres::Error> for EtlError {
    #[track_caller]
    fn from(err: tokio_postgres::Error) -> EtlError {
        let (kind, description) = match err.code().map(|code| code.code()) {
            None => (ErrorKind::ConnectionError, "PostgreSQL connection failed"),
            Some(code) if code.starts_with("08") => {
                (ErrorKind::ConnectionError, "PostgreSQL connection failed")
            }
            Some(code) if code.starts_with("28") => (
                ErrorKind::ConnectionError,
                "PostgreSQL authentication failed",
            ),
            Some(code) if code.starts_with("53") || code.starts_with("57P") => (
                ErrorKind::ConnectionError,
                "PostgreSQL server unavailable",
            ),
            Some(code) if code.starts_with("22") => {
                (ErrorKind::QueryError, "PostgreSQL data conversion failed")
            }
            Some(code) if code.starts_with("23") => {
                (ErrorKind::QueryError, "PostgreSQL constraint violation")
            }
            Some(code) if code.starts_with("42") => {
                (ErrorKind::QueryError, "PostgreSQL syntax or access error")
            }
            Some(_) => (ErrorKind::QueryError, "PostgreSQL query failed"),
        };

        let detail = match err.as_db_error() {
            Some(db_error) => format!("{}: {}", db_error.code().code(), db_error.message()),
            None => err.to_string(),
        };

        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
