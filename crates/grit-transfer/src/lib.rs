//! Object transfer for grit.
//!
//! This crate implements the pack file decoder with delta resolution and
//! the smart HTTP protocol-v2 client used to clone a remote repository.

mod client;
mod clone;
mod delta;
mod error;
mod pack;
mod pktline;

pub use client::{choose_head, HttpClient, RefRecord};
pub use clone::clone_repository;
pub use error::TransferError;
pub use pack::{PackEntryType, PackParser};
pub use pktline::{PktLine, PktLineReader, PktLineWriter};

/// Result type for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;
