//! Error types for increx
//!
//! Provides granular error classification so the calling pipeline can decide
//! on retry policy. The engine itself performs no retries: only the caller
//! knows whether a given cursor state is safe to re-apply.

use std::fmt;
use thiserror::Error;

/// Result type for increx operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection-related errors (retriable by the caller)
    Connection,
    /// Query execution errors
    Query,
    /// Configuration error (bad cursor column, invalid chunk size)
    Configuration,
    /// Schema-related errors (table not found, reflection failure)
    Schema,
    /// Type conversion errors (not retriable)
    TypeConversion,
    /// Operation unsupported for the selected backend (not retriable)
    Unsupported,
    /// A required backend library/reader is not available
    MissingDependency,
    /// Pool exhausted (retriable with backoff)
    PoolExhausted,
    /// Chunk encoding errors
    Encoding,
    /// Unknown/other errors
    Other,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable by the caller
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection | Self::PoolExhausted)
    }
}

/// Main error type for increx
#[derive(Error, Debug)]
pub enum Error {
    /// Connection failed
    #[error("connection error: {message}")]
    Connection {
        /// Human-readable description
        message: String,
        /// Underlying driver error, when available
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution failed
    #[error("query error: {message}")]
    Query {
        /// Human-readable description
        message: String,
        /// The SQL that failed, when available
        sql: Option<String>,
        /// Underlying driver error, when available
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration {
        /// Human-readable description
        message: String,
    },

    /// Configured cursor column does not exist in the table
    #[error("cursor column '{column}' does not exist in table '{table}'")]
    CursorColumnMissing {
        /// The missing column name
        column: String,
        /// The table that was inspected
        table: String,
    },

    /// Table not found during reflection
    #[error("table not found: {table}")]
    TableNotFound {
        /// The requested table
        table: String,
    },

    /// A backend was selected whose driver/reader is not available
    #[error("missing dependency for {backend} backend: {hint}")]
    MissingDependency {
        /// The backend that was requested
        backend: String,
        /// Installation/configuration instructions
        hint: String,
    },

    /// Unsupported operation (e.g. a value that cannot be rendered to SQL)
    #[error("unsupported: {message}")]
    Unsupported {
        /// Human-readable description
        message: String,
        /// Underlying cause, surfaced verbatim for diagnosis
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Schema error (reflection produced unusable metadata)
    #[error("schema error: {message}")]
    Schema {
        /// Human-readable description
        message: String,
    },

    /// Type conversion failed
    #[error("type conversion error: {message}")]
    TypeConversion {
        /// Human-readable description
        message: String,
    },

    /// Connection pool exhausted
    #[error("pool exhausted: {message}")]
    PoolExhausted {
        /// Human-readable description
        message: String,
    },

    /// Columnar batch construction failed
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Query { .. } => ErrorCategory::Query,
            Self::Configuration { .. } | Self::CursorColumnMissing { .. } => {
                ErrorCategory::Configuration
            }
            Self::TableNotFound { .. } | Self::Schema { .. } => ErrorCategory::Schema,
            Self::MissingDependency { .. } => ErrorCategory::MissingDependency,
            Self::Unsupported { .. } => ErrorCategory::Unsupported,
            Self::TypeConversion { .. } => ErrorCategory::TypeConversion,
            Self::PoolExhausted { .. } => ErrorCategory::PoolExhausted,
            Self::Arrow(_) => ErrorCategory::Encoding,
        }
    }

    /// Whether this error is retriable by the caller
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Create a query error with SQL
    pub fn query_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a missing-dependency error
    pub fn missing_dependency(backend: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingDependency {
            backend: backend.into(),
            hint: hint.into(),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
            source: None,
        }
    }

    /// Create an unsupported-operation error carrying the underlying cause
    pub fn unsupported_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unsupported {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a type conversion error
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Create a pool exhausted error
    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::PoolExhausted {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Query => write!(f, "query"),
            Self::Configuration => write!(f, "configuration"),
            Self::Schema => write!(f, "schema"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::MissingDependency => write!(f, "missing_dependency"),
            Self::PoolExhausted => write!(f, "pool_exhausted"),
            Self::Encoding => write!(f, "encoding"),
            Self::Other => write!(f, "other"),
        }
    }
}
