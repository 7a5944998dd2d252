use std::{
    error::Error,
    fmt::{self, Display},
    net::SocketAddr,
    path::PathBuf,
};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a kraken-related operation.
pub type KrakenResult<T> = Result<T, KrakenError>;

/// An error that occurred while managing servers, mounts or file server backends.
#[derive(Debug, Error)]
pub enum KrakenError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// The mount target is not `/` and either lacks a leading `/` or has a trailing one.
    #[error("invalid mount target value: {0:?}")]
    InvalidMountTarget(String),

    /// The mount source is not an absolute path.
    #[error("invalid mount source value: {0:?}")]
    InvalidMountSource(String),

    /// The mount source does not exist or is not a directory.
    #[error("{}: {source}", .source_path.display())]
    SourceUnavailable {
        /// The mount source that was checked.
        source_path: PathBuf,

        /// The underlying cause.
        #[source]
        source: std::io::Error,
    },

    /// The address could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// The address that was requested.
        addr: String,

        /// The underlying cause.
        #[source]
        source: std::io::Error,
    },

    /// The address could not be parsed or resolved.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A registered server already owns the port.
    #[error("a server is already registered on port {0}")]
    PortAlreadyRegistered(u16),

    /// Closing a server or one of its connections failed.
    #[error("error shutting down server on {addr}: {reason}")]
    InstanceClose {
        /// The address of the server being closed.
        addr: String,

        /// What went wrong.
        reason: String,
    },

    /// Several independent operations failed.
    #[error("{}", format_bulk(.0))]
    BulkOperation(Vec<KrakenError>),

    /// The file server factory does not know the backend type.
    #[error("unknown file server type: {0:?}")]
    UnknownBackendType(String),

    /// A backend parameter is unknown or has a malformed value.
    #[error("invalid file server parameter {name:?}: {reason}")]
    InvalidBackendParam {
        /// The parameter name.
        name: String,

        /// Why it was rejected.
        reason: String,
    },

    /// The server did not report a bound address in time.
    #[error("server {0} did not start in time")]
    StartTimeout(String),

    /// The server has not been started, or was stopped before it could bind.
    #[error("server {0} is not started")]
    NotStarted(String),

    /// The pool run loop was already started.
    #[error("server pool is already running")]
    PoolAlreadyRunning,

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl KrakenError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> KrakenError {
        KrakenError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Wraps an I/O error raised while binding `addr`.
    pub fn bind(addr: impl Display, source: std::io::Error) -> KrakenError {
        KrakenError::Bind {
            addr: addr.to_string(),
            source,
        }
    }

    /// Builds an [`KrakenError::InstanceClose`] for the server on `addr`.
    pub fn instance_close(addr: Option<SocketAddr>, reason: impl Into<String>) -> KrakenError {
        KrakenError::InstanceClose {
            addr: addr.map_or_else(|| "<unbound>".to_string(), |a| a.to_string()),
            reason: reason.into(),
        }
    }

    /// Returns true if the error was caused by the caller's input rather than by the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            KrakenError::InvalidMountTarget(_)
                | KrakenError::InvalidMountSource(_)
                | KrakenError::SourceUnavailable { .. }
                | KrakenError::Bind { .. }
                | KrakenError::InvalidAddress(_)
                | KrakenError::PortAlreadyRegistered(_)
                | KrakenError::UnknownBackendType(_)
                | KrakenError::InvalidBackendParam { .. }
        )
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn format_bulk(errors: &[KrakenError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
