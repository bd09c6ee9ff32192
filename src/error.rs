//! Error types for the blackhole server.
//!
//! Each concern gets its own enum so callers can decide which failures are
//! reported to the peer and which end the connection.

use std::{io, path::PathBuf, sync::PoisonError};

use thiserror::Error;

/// Errors raised while locating, reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Unable to read configuration from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid TOML for the expected shape.
    #[error("Unable to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A configuration value failed validation.
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// None of the candidate locations held a configuration file.
    #[error("No configuration file found (tried {})", display_paths(.0))]
    NotFound(Vec<PathBuf>),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur during connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// I/O error during connection operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ConnectionError {
    /// Whether the peer went away mid-conversation.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
        }
    }
}

/// Reasons a command line could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The verb is not one the server knows.
    #[error("Unrecognised command: {0}")]
    Unrecognised(String),

    /// The verb is known but its arguments are malformed.
    #[error("Syntax error in {verb}: {reason}")]
    Syntax { verb: &'static str, reason: String },

    /// The line is not valid UTF-8.
    #[error("Unable to interpret command")]
    NotUtf8,
}

/// Errors that can occur during TLS operations.
#[derive(Debug, Error)]
pub enum TlsError {
    /// I/O error during the handshake.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to load TLS certificate.
    #[error("Failed to load TLS certificate from {path}: {source}")]
    CertificateLoad {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to load TLS private key.
    #[error("Failed to load TLS private key from {path}: {reason}")]
    KeyLoad { path: String, reason: String },

    /// The negotiated session is missing details that should always be present.
    #[error("TLS session is missing {0}")]
    ProtocolInfoMissing(&'static str),

    /// The connection has already been upgraded.
    #[error("Connection is already encrypted")]
    AlreadyEncrypted,

    /// Rustls library error.
    #[error("TLS error: {0}")]
    Rustls(String),
}

impl From<tokio_rustls::rustls::Error> for TlsError {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::Rustls(err.to_string())
    }
}

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport failed.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The encryption upgrade failed.
    #[error("STARTTLS failed: {0}")]
    Tls(#[from] TlsError),

    /// The peer sent a line longer than allowed.
    #[error("Line exceeds {0} bytes")]
    LineTooLong(usize),

    /// Session timed out.
    #[error("Session timed out after {0} seconds")]
    Timeout(u64),
}

impl SessionError {
    /// Returns `true` if the peer caused the session to end.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::LineTooLong(_) | Self::Timeout(_) => true,
            Self::Connection(err) => err.is_disconnect(),
            Self::Tls(_) => false,
        }
    }
}

/// Errors reported by a [`crate::store::MessageStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No message exists with this identifier.
    #[error("Message {0} not found")]
    NotFound(u64),

    /// The store is full.
    #[error("Message store capacity exceeded: {len}/{capacity} messages")]
    CapacityExceeded { len: usize, capacity: usize },

    /// The store refused the record outright.
    #[error("Message rejected by store: {0}")]
    Rejected(String),

    /// Internal failure, such as a poisoned lock or an unavailable backend.
    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether the same write could succeed if the peer tries again later.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. } | Self::Internal(_))
    }
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(err: PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {err}"))
    }
}

/// Rejections from the envelope state machine.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Policy requires authentication and none has succeeded.
    #[error("Authentication required")]
    AuthRequired,

    /// No sender has been declared.
    #[error("No sender declared")]
    NoSender,

    /// No recipients have been declared.
    #[error("No recipients declared")]
    NoRecipients,

    /// The recipient ceiling has been reached.
    #[error("Too many recipients (limit {0})")]
    TooManyRecipients(usize),

    /// The completed message could not be stored.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of an authentication exchange.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The mechanism is not one the server offers.
    #[error("Unsupported authentication mechanism: {0}")]
    UnsupportedMechanism(String),

    /// The peer cancelled the exchange with `*`.
    #[error("Authentication cancelled")]
    Cancelled,

    /// The response could not be decoded.
    #[error("Malformed authentication response: {0}")]
    Malformed(&'static str),

    /// The credentials did not match.
    #[error("Invalid credentials")]
    InvalidCredentials,
}

/// Specialized `Result` type for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Specialized `Result` type for TLS operations.
pub type TlsResult<T> = std::result::Result<T, TlsError>;

/// Specialized `Result` type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
