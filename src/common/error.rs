//! Error types for artdb.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in artdb.
///
/// This enum represents every error that can occur in the index engine.
/// By having a single error type, we make error handling consistent
/// across the storage and index layers.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    ///
    /// This wraps `std::io::Error` from file read/write operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested block does not exist on disk.
    #[error("Block {0} not found")]
    BlockNotFound(u32),

    /// A block failed checksum verification on read.
    #[error("Block {0} is corrupt (checksum mismatch)")]
    CorruptBlock(u32),

    /// A persisted node or prefix could not be decoded.
    ///
    /// This is fatal and never retried: the on-disk index is damaged.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// A node variant would exceed its theoretical maximum fan-out.
    ///
    /// This cannot occur by construction (nodes grow before they fill);
    /// if it triggers, it indicates a logic bug.
    #[error("Node capacity exceeded: {0}")]
    CapacityExceeded(&'static str),

    /// An insert or merge encountered an existing exact key.
    ///
    /// Overwrite semantics are not engine-defined; the caller decides
    /// the conflict policy.
    #[error("Duplicate key")]
    DuplicateKey,

    /// A delete targeted a key that is not in the index.
    #[error("Key not found")]
    KeyNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::BlockNotFound(42);
        assert_eq!(format!("{}", err), "Block 42 not found");

        let err = Error::CorruptBlock(7);
        assert_eq!(format!("{}", err), "Block 7 is corrupt (checksum mismatch)");

        let err = Error::DuplicateKey;
        assert_eq!(format!("{}", err), "Duplicate key");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {} // Success
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_result_type_alias() {
        // This function returns our Result type
        fn might_fail() -> Result<u32> {
            Ok(42)
        }

        assert_eq!(might_fail().unwrap(), 42);
    }
}
