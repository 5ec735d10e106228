use std::fmt;
use std::io;

/// An error that can occur when trying to resolve a question.
///
/// Transport trouble is deliberately not here: timeouts, socket
/// failures, and malformed responses are swallowed by the lookup
/// machinery, and a caller observes them as an absence of records.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ResolutionError {
    /// Hit the indirection budget while following CNAMEs.
    IndirectionLimit,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResolutionError::IndirectionLimit => write!(f, "CNAME chain too long"),
        }
    }
}

impl std::error::Error for ResolutionError {}

/// An error creating a resolver or re-pointing it at a new initial
/// server.
#[derive(Debug)]
pub enum SetupError {
    /// The local socket could not be bound.
    Socket(io::Error),

    /// The initial-server string is neither an IPv4 literal nor a name
    /// the OS can resolve to an IPv4 address.
    UnknownHost { server: String },

    /// The cache has no root hint to fall back to.
    NoRootHint,
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SetupError::Socket(error) => write!(f, "could not bind a local socket: {error}"),
            SetupError::UnknownHost { server } => write!(f, "unknown host '{server}'"),
            SetupError::NoRootHint => write!(f, "no root hint with a known address"),
        }
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SetupError::Socket(error) => Some(error),
            _ => None,
        }
    }
}
