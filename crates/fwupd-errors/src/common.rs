//! Top-level error type, kind/category classification and context helpers.

use core::fmt;

/// Top-level error type for every fwupd core crate.
///
/// The variant is the error kind; the payload is a human readable message
/// that is surfaced verbatim by the outermost caller.
#[derive(Debug, thiserror::Error)]
pub enum FwupdError {
    /// A required object, file, image or device does not exist
    #[error("{0}")]
    NotFound(String),

    /// Data has an invalid value, e.g. a checksum or constant mismatch
    #[error("{0}")]
    InvalidData(String),

    /// A container or file is malformed, e.g. a bad magic or header length
    #[error("{0}")]
    InvalidFile(String),

    /// An index, offset or length lies outside the declared bounds
    #[error("{0}")]
    OutOfRange(String),

    /// Reading from a stream or device failed
    #[error("{0}")]
    Read(String),

    /// Writing to a stream or device failed, or the device reported failure
    #[error("{0}")]
    Write(String),

    /// The device or resource is temporarily busy
    #[error("{0}")]
    Busy(String),

    /// An operation did not complete before its timeout
    #[error("{0}")]
    TimedOut(String),

    /// The operation or value is not supported
    #[error("{0}")]
    NotSupported(String),

    /// Access to the device or resource was refused
    #[error("{0}")]
    PermissionDenied(String),

    /// A peer violated the wire protocol, e.g. a sequence id mismatch
    #[error("{0}")]
    Protocol(String),

    /// A size or count limit was exceeded before any allocation was attempted
    #[error("{0}")]
    ResourceLimit(String),

    /// The operation was cancelled by the caller
    #[error("{0}")]
    Cancelled(String),

    /// An internal invariant did not hold
    #[error("{0}")]
    Internal(String),

    /// I/O errors from the standard library that have no closer kind
    #[error("{0}")]
    Io(#[source] std::io::Error),
}

/// The kind of a [`FwupdError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorKind {
    /// See [`FwupdError::NotFound`]
    NotFound = 0,
    /// See [`FwupdError::InvalidData`]
    InvalidData = 1,
    /// See [`FwupdError::InvalidFile`]
    InvalidFile = 2,
    /// See [`FwupdError::OutOfRange`]
    OutOfRange = 3,
    /// See [`FwupdError::Read`]
    Read = 4,
    /// See [`FwupdError::Write`]
    Write = 5,
    /// See [`FwupdError::Busy`]
    Busy = 6,
    /// See [`FwupdError::TimedOut`]
    TimedOut = 7,
    /// See [`FwupdError::NotSupported`]
    NotSupported = 8,
    /// See [`FwupdError::PermissionDenied`]
    PermissionDenied = 9,
    /// See [`FwupdError::Protocol`]
    Protocol = 10,
    /// See [`FwupdError::ResourceLimit`]
    ResourceLimit = 11,
    /// See [`FwupdError::Cancelled`]
    Cancelled = 12,
    /// See [`FwupdError::Internal`]
    Internal = 13,
    /// See [`FwupdError::Io`]
    Io = 14,
}

impl ErrorKind {
    /// Stable lowercase name, used in tool output.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::InvalidData => "invalid-data",
            ErrorKind::InvalidFile => "invalid-file",
            ErrorKind::OutOfRange => "out-of-range",
            ErrorKind::Read => "read",
            ErrorKind::Write => "write",
            ErrorKind::Busy => "busy",
            ErrorKind::TimedOut => "timed-out",
            ErrorKind::NotSupported => "not-supported",
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::Protocol => "protocol",
            ErrorKind::ResourceLimit => "resource-limit",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
            ErrorKind::Io => "io",
        }
    }

    /// Get the category this kind belongs to.
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::InvalidData | ErrorKind::InvalidFile => ErrorCategory::MalformedInput,
            ErrorKind::OutOfRange => ErrorCategory::Bounds,
            ErrorKind::Protocol => ErrorCategory::Protocol,
            ErrorKind::NotFound
            | ErrorKind::Read
            | ErrorKind::Write
            | ErrorKind::Busy
            | ErrorKind::TimedOut
            | ErrorKind::PermissionDenied
            | ErrorKind::Io => ErrorCategory::Transport,
            ErrorKind::ResourceLimit => ErrorCategory::Resource,
            ErrorKind::NotSupported | ErrorKind::Cancelled | ErrorKind::Internal => {
                ErrorCategory::Internal
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error category for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Invalid schema text, bad magic, checksum or constant mismatch
    MalformedInput = 0,
    /// Access outside a buffer, stream or chunk array
    Bounds = 1,
    /// Sequence or command mismatch, unexpected duplicate message
    Protocol = 2,
    /// Timeout, busy, missing device, refused access
    Transport = 3,
    /// Oversized file or allocation request
    Resource = 4,
    /// Everything else
    Internal = 255,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::MalformedInput => write!(f, "MalformedInput"),
            ErrorCategory::Bounds => write!(f, "Bounds"),
            ErrorCategory::Protocol => write!(f, "Protocol"),
            ErrorCategory::Transport => write!(f, "Transport"),
            ErrorCategory::Resource => write!(f, "Resource"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

impl FwupdError {
    /// Create an error of a given kind with a message.
    ///
    /// `ErrorKind::Io` produces an [`std::io::ErrorKind::Other`] I/O error.
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match kind {
            ErrorKind::NotFound => FwupdError::NotFound(msg),
            ErrorKind::InvalidData => FwupdError::InvalidData(msg),
            ErrorKind::InvalidFile => FwupdError::InvalidFile(msg),
            ErrorKind::OutOfRange => FwupdError::OutOfRange(msg),
            ErrorKind::Read => FwupdError::Read(msg),
            ErrorKind::Write => FwupdError::Write(msg),
            ErrorKind::Busy => FwupdError::Busy(msg),
            ErrorKind::TimedOut => FwupdError::TimedOut(msg),
            ErrorKind::NotSupported => FwupdError::NotSupported(msg),
            ErrorKind::PermissionDenied => FwupdError::PermissionDenied(msg),
            ErrorKind::Protocol => FwupdError::Protocol(msg),
            ErrorKind::ResourceLimit => FwupdError::ResourceLimit(msg),
            ErrorKind::Cancelled => FwupdError::Cancelled(msg),
            ErrorKind::Internal => FwupdError::Internal(msg),
            ErrorKind::Io => FwupdError::Io(std::io::Error::other(msg)),
        }
    }

    /// Get the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FwupdError::NotFound(_) => ErrorKind::NotFound,
            FwupdError::InvalidData(_) => ErrorKind::InvalidData,
            FwupdError::InvalidFile(_) => ErrorKind::InvalidFile,
            FwupdError::OutOfRange(_) => ErrorKind::OutOfRange,
            FwupdError::Read(_) => ErrorKind::Read,
            FwupdError::Write(_) => ErrorKind::Write,
            FwupdError::Busy(_) => ErrorKind::Busy,
            FwupdError::TimedOut(_) => ErrorKind::TimedOut,
            FwupdError::NotSupported(_) => ErrorKind::NotSupported,
            FwupdError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            FwupdError::Protocol(_) => ErrorKind::Protocol,
            FwupdError::ResourceLimit(_) => ErrorKind::ResourceLimit,
            FwupdError::Cancelled(_) => ErrorKind::Cancelled,
            FwupdError::Internal(_) => ErrorKind::Internal,
            FwupdError::Io(_) => ErrorKind::Io,
        }
    }

    /// Get the error category for classification.
    pub fn category(&self) -> ErrorCategory {
        self.kind().category()
    }

    /// Check if this error is transient and worth retrying after a delay.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Busy | ErrorKind::TimedOut)
    }

    /// Check if this error must stop every retry loop immediately.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::Cancelled
        )
    }

    /// Prepend context to the message, keeping the kind.
    #[must_use]
    pub fn prefixed(self, prefix: impl fmt::Display) -> Self {
        match self {
            FwupdError::Io(e) => FwupdError::Io(std::io::Error::new(e.kind(), format!("{prefix}: {e}"))),
            other => {
                let kind = other.kind();
                FwupdError::new(kind, format!("{prefix}: {other}"))
            }
        }
    }

    /// Create a not-found error with a message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        FwupdError::NotFound(msg.into())
    }

    /// Create an invalid-data error with a message.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        FwupdError::InvalidData(msg.into())
    }

    /// Create an invalid-file error with a message.
    pub fn invalid_file(msg: impl Into<String>) -> Self {
        FwupdError::InvalidFile(msg.into())
    }

    /// Create an out-of-range error with a message.
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        FwupdError::OutOfRange(msg.into())
    }

    /// Create a read error with a message.
    pub fn read(msg: impl Into<String>) -> Self {
        FwupdError::Read(msg.into())
    }

    /// Create a write error with a message.
    pub fn write(msg: impl Into<String>) -> Self {
        FwupdError::Write(msg.into())
    }

    /// Create a busy error with a message.
    pub fn busy(msg: impl Into<String>) -> Self {
        FwupdError::Busy(msg.into())
    }

    /// Create a timed-out error with a message.
    pub fn timed_out(msg: impl Into<String>) -> Self {
        FwupdError::TimedOut(msg.into())
    }

    /// Create a not-supported error with a message.
    pub fn not_supported(msg: impl Into<String>) -> Self {
        FwupdError::NotSupported(msg.into())
    }

    /// Create a permission-denied error with a message.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        FwupdError::PermissionDenied(msg.into())
    }

    /// Create a protocol error with a message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        FwupdError::Protocol(msg.into())
    }

    /// Create a resource-limit error with a message.
    pub fn resource_limit(msg: impl Into<String>) -> Self {
        FwupdError::ResourceLimit(msg.into())
    }

    /// Create a cancelled error with a message.
    pub fn cancelled(msg: impl Into<String>) -> Self {
        FwupdError::Cancelled(msg.into())
    }

    /// Create an internal error with a message.
    pub fn internal(msg: impl Into<String>) -> Self {
        FwupdError::Internal(msg.into())
    }
}

impl From<std::io::Error> for FwupdError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        match e.kind() {
            Io::NotFound => FwupdError::NotFound(e.to_string()),
            Io::PermissionDenied => FwupdError::PermissionDenied(e.to_string()),
            Io::TimedOut => FwupdError::TimedOut(e.to_string()),
            Io::WouldBlock => FwupdError::Busy(e.to_string()),
            Io::UnexpectedEof => FwupdError::Read(e.to_string()),
            Io::InvalidInput => FwupdError::OutOfRange(e.to_string()),
            _ => FwupdError::Io(e),
        }
    }
}

/// Context information for errors.
///
/// Renders as `operation (key=value, ...)` and is prepended to the message
/// by [`ResultExt::context`].
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// The operation that was being performed
    pub operation: String,
    /// Additional context key-value pairs
    pub context: Vec<(String, String)>,
}

impl ErrorContext {
    /// Create a new error context for an operation.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            context: Vec::new(),
        }
    }

    /// Add a context key-value pair.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.push((key.into(), value.to_string()));
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        if !self.context.is_empty() {
            write!(f, " (")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Extension trait for adding context to errors without losing their kind.
pub trait ResultExt<T> {
    /// Prefix the error message with a fixed string.
    fn prefix(self, prefix: &str) -> Result<T, FwupdError>;

    /// Prefix the error message with a lazily built string.
    fn with_prefix<F, D>(self, f: F) -> Result<T, FwupdError>
    where
        F: FnOnce() -> D,
        D: fmt::Display;

    /// Prefix the error message with a structured context.
    fn context(self, ctx: ErrorContext) -> Result<T, FwupdError>;
}

impl<T, E: Into<FwupdError>> ResultExt<T> for Result<T, E> {
    fn prefix(self, prefix: &str) -> Result<T, FwupdError> {
        self.map_err(|e| e.into().prefixed(prefix))
    }

    fn with_prefix<F, D>(self, f: F) -> Result<T, FwupdError>
    where
        F: FnOnce() -> D,
        D: fmt::Display,
    {
        self.map_err(|e| e.into().prefixed(f()))
    }

    fn context(self, ctx: ErrorContext) -> Result<T, FwupdError> {
        self.map_err(|e| e.into().prefixed(ctx))
    }
}
