//! ttyring error types.
//!
//! Construction-time failures (device open, line-discipline setup, ring
//! init) are returned as `Error`. Runtime I/O failures never travel this
//! path — they are delivered to the error callback as the kernel's negative
//! errno and the engine keeps running.

use std::fmt;

/// The failure class, one tag per construction-time error source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Opening the device path failed.
    SocketCreate,
    /// Reserved: interface index resolution (unused on the serial path).
    InterfaceIndex,
    /// Getting or applying line-discipline attributes failed, or the
    /// requested baud is not in the POSIX speed table.
    SocketBind,
    /// Operation attempted on a device without a valid descriptor.
    InvalidSocket,
    /// tcflush on the device failed.
    SocketFlush,
    /// io_uring setup failed; the engine refuses to construct.
    UringInit,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::SocketCreate => "device open",
            Self::InterfaceIndex => "interface index",
            Self::SocketBind => "device configure",
            Self::InvalidSocket => "invalid descriptor",
            Self::SocketFlush => "device flush",
            Self::UringInit => "ring init",
        }
    }
}

/// A tagged error with a human-readable message.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_kind_and_message() {
        let err = Error::new(ErrorKind::SocketBind, "unsupported baud rate 12345");
        let s = format!("{}", err);
        assert!(s.contains("device configure"));
        assert!(s.contains("12345"));
    }

    #[test]
    fn test_kind_accessor() {
        let err = Error::new(ErrorKind::UringInit, "io_uring setup failed");
        assert_eq!(err.kind(), ErrorKind::UringInit);
        assert_eq!(err.message(), "io_uring setup failed");
    }

    #[test]
    fn test_is_std_error() {
        fn assert_err<E: std::error::Error>() {}
        assert_err::<Error>();
    }
}
