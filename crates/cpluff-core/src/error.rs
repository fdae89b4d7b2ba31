//! The closed status taxonomy and the richer error type built on top of it.

use std::fmt;

/// The closed status enum hosts can switch on. Ordering is not significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Resource,
    Unknown,
    Io,
    Malformed,
    Conflict,
    Dependency,
    Runtime,
    Deadlock,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ok => "ok",
            Status::Resource => "resource",
            Status::Unknown => "unknown",
            Status::Io => "io",
            Status::Malformed => "malformed",
            Status::Conflict => "conflict",
            Status::Dependency => "dependency",
            Status::Runtime => "runtime",
            Status::Deadlock => "deadlock",
        };
        f.write_str(s)
    }
}

/// Recoverable error returned by public operations. Carries enough context
/// to log usefully while still collapsing to a single [`Status`] for hosts
/// that just want to branch on outcome.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("resource allocation failed: {0}")]
    Resource(String),

    #[error("unknown plug-in identifier: {0}")]
    Unknown(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed descriptor: {0}")]
    Malformed(String),

    #[error("identifier already installed: {0}")]
    Conflict(String),

    #[error("dependency error: {0}")]
    Dependency(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("deadlock: re-entrant transition on plug-in {0}")]
    Deadlock(String),
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::Resource(_) => Status::Resource,
            Error::Unknown(_) => Status::Unknown,
            Error::Io(_) => Status::Io,
            Error::Malformed(_) => Status::Malformed,
            Error::Conflict(_) => Status::Conflict,
            Error::Dependency(_) => Status::Dependency,
            Error::Runtime(_) => Status::Runtime,
            Error::Deadlock(_) => Status::Deadlock,
        }
    }
}

/// A condition that invokes the process-wide fatal handler and does not
/// return to the caller through the normal `Result` channel. Kept as a
/// distinct type so call sites that construct one are visibly different
/// from ordinary recoverable errors.
#[derive(Debug, Clone)]
pub struct FatalError(pub String);

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fatal: {}", self.0)
    }
}

impl std::error::Error for FatalError {}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_stable() {
        assert_eq!(Error::Conflict("x".into()).status(), Status::Conflict);
        assert_eq!(Error::Deadlock("x".into()).status(), Status::Deadlock);
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert_eq!(err.status(), Status::Io);
    }
}
