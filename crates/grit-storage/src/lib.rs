//! Content-addressed loose object storage for grit.
//!
//! This crate provides the git object model (blobs, trees, commits, tags),
//! the on-disk loose object store, and working-tree materialization.

mod commit;
mod error;
mod object;
mod store;
pub mod tree;
mod worktree;

pub use commit::{CommitRecord, Signature};
pub use error::StorageError;
pub use object::{GitObject, ObjectId, ObjectType};
pub use store::ObjectStore;
pub use tree::{TreeEntry, MODE_DIR, MODE_FILE};
pub use worktree::checkout_commit;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
