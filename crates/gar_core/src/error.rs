//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// A range does not fit inside its container
    #[error("range {offset}+{length} is out of bounds for {container} ({size} bytes)")]
    #[diagnostic(help("the archive directory points past the end of the file, it may be truncated"))]
    Bounds {
        container: String,
        offset: u64,
        length: u64,
        size: u64,
    },

    /// The parallel arrays of a block table disagree in length
    #[error("block table arrays disagree: {0}")]
    TableLengthMismatch(TableLengths),

    /// A codec failed while producing a block
    #[error("decoding block at {container}:{offset:#x} failed: {reason}")]
    Decode {
        container: String,
        offset: u64,
        reason: String,
    },

    /// Every block was exhausted before the declared length was produced
    #[error("stream ended after {actual} of {expected} bytes")]
    Underrun { expected: u64, actual: u64 },

    /// Compressed and decompressed lengths differ but nothing can decode the range
    #[error("{name} declares {compressed} compressed and {decompressed} decompressed bytes without a decoder")]
    MissingDecoder {
        name: String,
        compressed: u64,
        decompressed: u64,
    },

    /// The on-disk compression identifier is not known
    #[error("unsupported compression method {0}")]
    UnsupportedCodec(u32),

    /// A second directory pass referenced a key the first pass never produced
    #[error("no resource registered under key {0}")]
    UnresolvedKey(String),

    /// Every candidate strategy failed
    #[error("no candidate succeeded: {}", .0.join("; "))]
    NoCandidate(Vec<String>),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Lengths of each parallel array of a block table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLengths {
    pub offsets: usize,
    pub compressed: usize,
    pub decompressed: usize,
    /// Codec array, for tables that select a codec per block
    pub codecs: Option<usize>,
    /// Container array, for tables that span multiple containers
    pub containers: Option<usize>,
}

impl std::fmt::Display for TableLengths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "offsets={} compressed={} decompressed={}",
            self.offsets, self.compressed, self.decompressed
        )?;
        if let Some(codecs) = self.codecs {
            write!(f, " codecs={codecs}")?;
        }
        if let Some(containers) = self.containers {
            write!(f, " containers={containers}")?;
        }
        Ok(())
    }
}

impl TableLengths {
    pub(crate) fn is_consistent(&self) -> bool {
        let n = self.offsets;
        self.compressed == n
            && self.decompressed == n
            && self.codecs.map_or(true, |c| c == n)
            && self.containers.map_or(true, |c| c == n)
    }
}

impl Error {
    /// Whether the error only means the output was shorter than declared
    pub fn is_underrun(&self) -> bool {
        matches!(self, Error::Underrun { .. })
    }

    pub(crate) fn into_io(self) -> std::io::Error {
        match self {
            Error::IOError(e) => e,
            other => std::io::Error::other(other),
        }
    }

    /// Recover a library error that was carried through [`std::io::Read`]
    pub fn from_io(err: std::io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::IOError(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(e)) => *e,
            _ => Error::CustomError("io error lost its payload".into()),
        }
    }
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
