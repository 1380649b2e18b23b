//! Transfer error types.

use thiserror::Error;

/// Errors that can occur while decoding packs or talking to a remote.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Pack stream does not start with a valid header.
    #[error("invalid pack header: {0}")]
    InvalidPackHeader(String),

    /// Recovered side-band payload does not start with the PACK magic.
    #[error("fetched stream is missing the PACK magic")]
    MissingPackMagic,

    /// The pack produced a different number of objects than declared.
    #[error("pack declared {declared} objects but {decoded} were decoded")]
    ObjectCountMismatch { declared: u32, decoded: u32 },

    /// Trailing SHA-1 does not match the pack contents.
    #[error("pack checksum mismatch")]
    PackChecksumMismatch,

    /// A single entry failed to decode (truncation or bad zlib stream).
    #[error("corrupt pack entry: {0}")]
    CorruptEntry(String),

    /// Entry type tag outside the valid set.
    #[error("unsupported pack object type: {0}")]
    UnsupportedObjectType(u8),

    /// A delta's base could not be found in the pack or the store.
    #[error("unresolved delta: {0}")]
    UnresolvedDelta(String),

    /// Malformed delta payload (sizes or instructions).
    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    /// Invalid pkt-line framing.
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    /// HTTP failure: non-200 status, remote error channel, or I/O.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] grit_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        TransferError::Transport(err.to_string())
    }
}
