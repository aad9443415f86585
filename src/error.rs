//! Library-wide error and result types.

use std::fmt;
use std::io;

/// Result alias used throughout cskit.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Error messages are kept intentionally terse; callers that need richer
/// context should wrap `Error` in their own type. None of the variants ever
/// carry key material.
#[derive(Debug)]
pub enum Error {
    /// A magic/signature field did not match the expected value.
    BadMagic,
    /// A block header carried a type the caller cannot dispatch.
    UnknownBlockType(u16),
    /// The device or stream ended before all expected bytes could be read.
    UnexpectedEof,
    /// An offset or size field would read outside the valid region.
    InvalidRange,
    /// The sector-size query failed or reported zero.
    SectorSize,
    /// A key had a length the cipher does not support.
    KeySize(usize),
    /// The RFC 3394 unwrap integrity check failed.
    KeyUnwrap,
    /// No supplied passphrase unlocked any crypto user.
    WrongPassphrase,
    /// A structural constraint was violated (message describes which one).
    Parse(&'static str),
    /// An underlying I/O operation failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadMagic => write!(f, "bad magic value"),
            Error::UnknownBlockType(t) => write!(f, "unknown block type: {t:#06x}"),
            Error::UnexpectedEof => write!(f, "unexpected end of device"),
            Error::InvalidRange => write!(f, "invalid offset or size"),
            Error::SectorSize => write!(f, "sector size query failed"),
            Error::KeySize(n) => write!(f, "unsupported key size: {n}"),
            Error::KeyUnwrap => write!(f, "key unwrap integrity check failed"),
            Error::WrongPassphrase => write!(f, "wrong passphrase"),
            Error::Parse(s) => write!(f, "parse error: {s}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Error::Io(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
