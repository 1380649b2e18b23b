//! Working-tree materialization.
//!
//! Walks commit -> root tree -> nested trees/blobs, writing directories and
//! files that reconstruct the committed tree on disk.

use crate::{tree, CommitRecord, ObjectId, ObjectStore, ObjectType, Result, StorageError};
use std::fs;
use std::path::Path;

/// Materializes the tree of `commit_id` into `target` (created if absent).
pub fn checkout_commit(store: &ObjectStore, commit_id: &ObjectId, target: &Path) -> Result<()> {
    let obj = store.read(commit_id)?;
    if obj.kind != ObjectType::Commit {
        return Err(StorageError::InvalidObject(format!(
            "{} is a {}, expected commit",
            commit_id, obj.kind
        )));
    }
    let commit = CommitRecord::parse(&obj.data)?;
    tracing::info!(commit = %commit_id, tree = %commit.tree, dir = %target.display(), "checking out");
    checkout_tree(store, &commit.tree, target)
}

fn checkout_tree(store: &ObjectStore, tree_id: &ObjectId, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let obj = store.read(tree_id)?;
    if obj.kind != ObjectType::Tree {
        return Err(StorageError::InvalidObject(format!(
            "{} is a {}, expected tree",
            tree_id, obj.kind
        )));
    }

    for entry in tree::parse(&obj.data)? {
        let path = dir.join(&entry.name);
        match entry.mode.as_str() {
            tree::MODE_DIR => checkout_tree(store, &entry.id, &path)?,
            tree::MODE_FILE => {
                let blob = store.read(&entry.id)?;
                if blob.kind != ObjectType::Blob {
                    return Err(StorageError::InvalidObject(format!(
                        "{} is a {}, expected blob",
                        entry.id, blob.kind
                    )));
                }
                fs::write(&path, &blob.data)?;
                tracing::debug!(path = %path.display(), bytes = blob.size(), "wrote file");
            }
            other => return Err(StorageError::UnsupportedMode(other.to_string())),
        }
    }
    Ok(())
}
