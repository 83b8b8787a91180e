use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use tracing_error::SpanTrace;

/// Categorizes store errors by their semantic meaning, independent of
/// the underlying key-value backend implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The requested table or item was not found.
    ///
    /// **Retryable:** No - the resource doesn't exist.
    NotFound,

    /// The operation failed due to I/O errors (network, disk, etc.).
    ///
    /// **Retryable:** Maybe - depends on whether the I/O issue is transient.
    Io,

    /// The backing store service is temporarily unavailable.
    ///
    /// **Retryable:** Yes - the service should recover.
    ServiceUnavailable,

    /// The request was invalid (bad key, malformed attributes, etc.).
    ///
    /// **Retryable:** No - the request itself is invalid.
    InvalidRequest,

    /// Attribute serialization or deserialization failed.
    ///
    /// **Retryable:** No - indicates a data format mismatch.
    SerializationError,

    /// An unexpected or uncategorized error occurred.
    Other,
}

impl StoreErrorKind {
    /// Returns whether this error kind typically indicates a retryable condition.
    ///
    /// Advisory only; callers should consider how many retries have already
    /// occurred and whether retry logic exists at a higher level.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreErrorKind::ServiceUnavailable | StoreErrorKind::Io
        )
    }

    /// Returns whether this error indicates a client-side fault (bad request, invalid params).
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            StoreErrorKind::InvalidRequest | StoreErrorKind::SerializationError
        )
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErrorKind::NotFound => write!(f, "not found"),
            StoreErrorKind::Io => write!(f, "I/O error"),
            StoreErrorKind::ServiceUnavailable => write!(f, "service unavailable"),
            StoreErrorKind::InvalidRequest => write!(f, "invalid request"),
            StoreErrorKind::SerializationError => write!(f, "serialization error"),
            StoreErrorKind::Other => write!(f, "other error"),
        }
    }
}

#[derive(Debug)]
struct ErrorTrace {
    /// Captured backtrace, controlled by the RUST_BACKTRACE environment variable.
    backtrace: Backtrace,

    /// Captured span trace from tracing for async context.
    span_trace: SpanTrace,
}

impl ErrorTrace {
    #[track_caller]
    fn capture() -> Self {
        ErrorTrace {
            backtrace: Backtrace::capture(),
            span_trace: SpanTrace::capture(),
        }
    }
}

/// Key-value store error with semantic categorization and operation context.
///
/// Carries the engine name, the table and key involved (when applicable), the
/// underlying error chain, and captured backtrace / span trace for debugging.
///
/// # Example
///
/// ```rust
/// use kvstore::{StoreError, StoreErrorKind};
///
/// fn lookup() -> Result<(), StoreError> {
///     let result = std::fs::File::open("missing.db");
///
///     match result {
///         Err(err) => Err(StoreError::builder("memory", StoreErrorKind::NotFound, err)
///             .table("tokens")
///             .key("abc123")
///             .build()),
///         Ok(_) => Ok(()),
///     }
/// }
/// ```
#[derive(Debug)]
pub struct StoreError {
    /// The semantic category of this error.
    kind: StoreErrorKind,

    /// The name of the store engine that produced this error.
    engine: &'static str,

    /// The table name, if applicable.
    table: Option<String>,

    /// The item key, if applicable.
    key: Option<String>,

    /// Additional context about the error.
    context: Option<String>,

    /// The underlying error.
    source: Box<dyn StdError + Send + Sync + 'static>,

    /// Traces
    traces: Box<ErrorTrace>,
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

impl StoreError {
    /// Create a new store error with the minimum required information.
    ///
    /// For more control, use `StoreError::builder()`.
    pub fn new<E>(engine: &'static str, kind: StoreErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            kind,
            engine,
            table: None,
            key: None,
            context: None,
            source: error.into(),
            traces: Box::new(ErrorTrace::capture()),
        }
    }

    /// Create a builder for constructing a store error with full context.
    ///
    /// The builder requires the engine name, error kind, and underlying error
    /// upfront; table, key, and context can be added via builder methods.
    pub fn builder<E>(engine: &'static str, kind: StoreErrorKind, error: E) -> StoreErrorBuilder
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        StoreErrorBuilder {
            engine,
            kind,
            source: error.into(),
            table: None,
            key: None,
            context: None,
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    /// Returns the store engine name.
    pub fn engine(&self) -> &'static str {
        self.engine
    }

    /// Returns the table name, if available.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Returns the item key, if available.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns additional context, if available.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns whether this error is likely retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns whether this error indicates a client-side fault.
    pub fn is_client_fault(&self) -> bool {
        self.kind.is_client_fault()
    }

    /// Returns a reference to the captured backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        &self.traces.backtrace
    }

    /// Returns a reference to the captured span trace.
    ///
    /// The span trace provides the tracing span context at the point where
    /// this error was created, showing the logical async call stack.
    pub fn span_trace(&self) -> &SpanTrace {
        &self.traces.span_trace
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Store error [{}] from {}", self.kind, self.engine)?;

        if let Some(table) = &self.table {
            write!(f, " (table: {})", table)?;
        }

        if let Some(key) = &self.key {
            write!(f, " (key: {})", key)?;
        }

        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }

        write!(f, ": {}", self.source)
    }
}

/// Builder for constructing `StoreError` with optional context fields.
#[derive(Debug)]
pub struct StoreErrorBuilder {
    kind: StoreErrorKind,
    engine: &'static str,
    source: Box<dyn StdError + Send + Sync + 'static>,
    table: Option<String>,
    key: Option<String>,
    context: Option<String>,
}

impl StoreErrorBuilder {
    /// Set the table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Set the item key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set additional context.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Build the `StoreError`.
    ///
    /// This never panics as all required fields are guaranteed to be present.
    pub fn build(self) -> StoreError {
        StoreError {
            kind: self.kind,
            engine: self.engine,
            table: self.table,
            key: self.key,
            context: self.context,
            source: self.source,
            traces: Box::new(ErrorTrace::capture()),
        }
    }
}
