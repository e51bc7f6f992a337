//! Error types for the protodig-core library.
//!
//! Almost every failure inside a scan is local to one anchor or one
//! candidate. Those variants are reported through [`Error::is_recoverable`]
//! and the scan simply moves on to the next anchor.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for protodig operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all protodig operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A read or varint decode ran past the available bytes
    #[error("truncated input at offset {offset}")]
    Truncated {
        /// Offset (relative to the window being read) where data ran out
        offset: usize,
    },

    /// A varint does not fit in 64 bits
    #[error("varint at offset {offset} overflows 64 bits")]
    VarintOverflow {
        /// Offset of the byte that overflowed
        offset: usize,
    },

    /// No backward offset produced a plausible `name` field for an anchor
    #[error("no descriptor start found within {window} bytes before anchor at {anchor:#x}")]
    BoundaryNotFound {
        /// Address of the anchor match
        anchor: u64,
        /// Size of the backward search window
        window: usize,
    },

    /// Authoritative decode of a trial prefix failed
    #[error("failed to parse FileDescriptorProto: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Every trial prefix of a candidate failed to decode
    #[error("no prefix of candidate at {start:#x} (upper bound {upper_bound} bytes) decodes as a named descriptor")]
    DecodeExhausted {
        /// Candidate start address
        start: u64,
        /// Heuristic upper bound that was tried first
        upper_bound: usize,
    },

    /// A descriptor with the same name was already reconstructed in this scan
    #[error("descriptor '{name}' was already reconstructed")]
    DuplicateDescriptor {
        /// The descriptor file name
        name: String,
    },
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new truncation error
    pub fn truncated(offset: usize) -> Self {
        Self::Truncated { offset }
    }

    /// Creates a new boundary error
    pub fn boundary_not_found(anchor: u64, window: usize) -> Self {
        Self::BoundaryNotFound { anchor, window }
    }

    /// Creates a new duplicate descriptor error
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateDescriptor { name: name.into() }
    }

    /// Returns true if this is a per-candidate error that should be skipped
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. }
                | Self::VarintOverflow { .. }
                | Self::BoundaryNotFound { .. }
                | Self::Decode(_)
                | Self::DecodeExhausted { .. }
                | Self::DuplicateDescriptor { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::boundary_not_found(0x1000, 64);
        assert!(err.to_string().contains("0x1000"));
        assert!(err.to_string().contains("64 bytes"));

        let err = Error::duplicate("foo.proto");
        assert!(err.to_string().contains("foo.proto"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::truncated(3).is_recoverable());
        assert!(Error::duplicate("a.proto").is_recoverable());
        assert!(!Error::file_read(
            "/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone")
        )
        .is_recoverable());
    }
}
