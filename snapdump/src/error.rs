use std::fmt;

use tracing::error;

#[cfg(test)]
use test_log::test;

/// Structural error kinds, per the failure-semantics table: `Io`,
/// `MagicMismatch`, `UnexpectedEof`, and `BadLzf` are fatal at the top
/// level; `BadLengthPrefix` and `BadEncoding` abort only the enclosing
/// container; `SizeCeilingExceeded` truncates a single value.
/// `UnsupportedVersion` never aborts anything, it's carried as a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    MagicMismatch,
    UnsupportedVersion,
    BadLengthPrefix,
    BadEncoding,
    BadLzf,
    SizeCeilingExceeded,
    UnexpectedEof,
}

impl ErrorKind {
    /// Whether this kind aborts the whole pass rather than just the
    /// value or container currently being decoded.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::Io | ErrorKind::MagicMismatch | ErrorKind::UnexpectedEof | ErrorKind::BadLzf
        )
    }

    fn label(self) -> &'static str {
        match self {
            ErrorKind::Io => "io error",
            ErrorKind::MagicMismatch => "magic mismatch",
            ErrorKind::UnsupportedVersion => "unsupported version",
            ErrorKind::BadLengthPrefix => "bad length prefix",
            ErrorKind::BadEncoding => "bad encoding",
            ErrorKind::BadLzf => "bad lzf stream",
            ErrorKind::SizeCeilingExceeded => "size ceiling exceeded",
            ErrorKind::UnexpectedEof => "unexpected eof",
        }
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    inner: snapdump_base::Error,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Error {
        let msg = msg.into();
        let inner = snapdump_base::err(msg.clone());
        error!(target: "snapdump", kind = kind.label(), "{}", msg);
        Error { kind, inner }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.kind.label(), self.inner)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::new(ErrorKind::Io, format!("{e}"))
    }
}

#[test]
fn test_error_kind_fatality() {
    assert!(ErrorKind::MagicMismatch.is_fatal());
    assert!(!ErrorKind::BadEncoding.is_fatal());
    assert!(!ErrorKind::UnsupportedVersion.is_fatal());
}

#[test]
fn test_error_display() {
    let e = Error::new(ErrorKind::BadLengthPrefix, "top bits 10000010 unused");
    assert_eq!(e.kind(), ErrorKind::BadLengthPrefix);
    assert!(format!("{e}").contains("bad length prefix"));
}
