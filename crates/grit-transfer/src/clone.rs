//! Clone orchestration: transport -> pack decoder -> working tree.

use crate::client::{choose_head, HttpClient};
use crate::pack::PackParser;
use crate::{Result, TransferError};
use grit_storage::{checkout_commit, ObjectId, ObjectStore};
use std::fs;
use std::path::Path;

/// Clones `url` into `dir`: discovers heads, fetches one pack wanting all
/// of them, decodes it into `dir/.git`, and materializes the selected head.
///
/// Returns the checked-out commit id. Failure aborts the clone; objects
/// already written stay behind, which is harmless since writes are
/// idempotent and content-addressed.
pub fn clone_repository(url: &str, dir: &Path) -> Result<ObjectId> {
    tracing::info!(%url, dir = %dir.display(), "cloning");
    fs::create_dir_all(dir)?;
    let store = ObjectStore::init(dir.join(".git"))?;

    let client = HttpClient::new(url)?;
    let refs = client.ls_refs()?;
    let head = choose_head(&refs)
        .ok_or_else(|| TransferError::Transport(format!("{} advertised no refs", url)))?
        .clone();

    let wants: Vec<ObjectId> = refs.iter().map(|r| r.id).collect();
    let pack = client.fetch_pack(&wants)?;

    let ids = PackParser::new(&pack).parse(&store)?;
    tracing::info!(objects = ids.len(), head = %head.id, branch = %head.name, "pack decoded");

    checkout_commit(&store, &head.id, dir)?;
    Ok(head.id)
}
