//! Subcommand implementations.
//!
//! Every command takes the repository root explicitly so tests can run
//! against a temporary directory instead of the process working directory.

use anyhow::{bail, Context};
use grit_storage::{
    tree, CommitRecord, ObjectId, ObjectStore, ObjectType, Signature, TreeEntry,
};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Identity used for commits; there is no config file to read it from.
const DEFAULT_NAME: &str = "dev";
const DEFAULT_EMAIL: &str = "dev@noreply.example.com";

fn open_store(root: &Path) -> ObjectStore {
    ObjectStore::open(root.join(".git"))
}

/// `grit init`
pub fn init(root: &Path) -> anyhow::Result<()> {
    tracing::info!(path = %root.display(), "Initializing repository");
    ObjectStore::init(root.join(".git"))?;
    println!("Initialized git directory");
    Ok(())
}

/// `grit hash-object [-w] <path>`
pub fn hash_object(root: &Path, path: &Path, write: bool) -> anyhow::Result<()> {
    let content =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let id = if write {
        open_store(root).write(ObjectType::Blob, &content)?
    } else {
        ObjectId::for_object(ObjectType::Blob, &content)
    };
    println!("{id}");
    Ok(())
}

/// `grit cat-file -p <sha>`
pub fn cat_file(root: &Path, sha: &str) -> anyhow::Result<()> {
    let id = ObjectId::from_hex(sha)?;
    let object = open_store(root).read(&id)?;
    // Payloads are arbitrary bytes; no trailing newline is added.
    std::io::stdout().write_all(&object.data)?;
    Ok(())
}

/// `grit ls-tree [--name-only] <sha>`
pub fn ls_tree(root: &Path, sha: &str, name_only: bool) -> anyhow::Result<()> {
    let id = ObjectId::from_hex(sha)?;
    for line in tree_lines(&open_store(root), &id, name_only)? {
        println!("{line}");
    }
    Ok(())
}

/// Renders a tree object one entry per line, in stored (canonical) order.
fn tree_lines(store: &ObjectStore, id: &ObjectId, name_only: bool) -> anyhow::Result<Vec<String>> {
    let object = store.read(id)?;
    if object.kind != ObjectType::Tree {
        bail!("{} is a {}, not a tree", id, object.kind);
    }
    let entries = tree::parse(&object.data)?;
    Ok(entries
        .into_iter()
        .map(|e| {
            if name_only {
                e.name
            } else {
                format!("{} {} {}", e.mode, e.name, e.id)
            }
        })
        .collect())
}

/// `grit write-tree`
pub fn write_tree(root: &Path) -> anyhow::Result<()> {
    let store = open_store(root);
    let id = write_tree_at(&store, root)?;
    println!("{id}");
    Ok(())
}

/// Snapshots `dir` as a tree object, writing every blob and subtree.
fn write_tree_at(store: &ObjectStore, dir: &Path) -> anyhow::Result<ObjectId> {
    let mut entries = Vec::new();
    for dirent in fs::read_dir(dir)? {
        let dirent = dirent?;
        let name = dirent.file_name();
        let Some(name) = name.to_str() else {
            bail!("non-utf8 file name in {}", dir.display());
        };
        if name == ".git" {
            continue;
        }
        let file_type = dirent.file_type()?;
        if file_type.is_dir() {
            let id = write_tree_at(store, &dirent.path())?;
            entries.push(TreeEntry::dir(name, id));
        } else if file_type.is_file() {
            let content = fs::read(dirent.path())?;
            let id = store.write(ObjectType::Blob, &content)?;
            entries.push(TreeEntry::file(name, id));
        }
        // Symlinks and other special files are ignored.
    }
    let payload = tree::serialize(&entries);
    Ok(store.write(ObjectType::Tree, &payload)?)
}

/// `grit commit-tree <tree> [-p <parent>] -m <message>`
pub fn commit_tree(
    root: &Path,
    tree: &str,
    parent: Option<&str>,
    message: &str,
) -> anyhow::Result<()> {
    let store = open_store(root);
    let tree = ObjectId::from_hex(tree)?;
    let parent = parent.map(ObjectId::from_hex).transpose()?;

    let signature = Signature::now(DEFAULT_NAME, DEFAULT_EMAIL);
    let record = CommitRecord {
        tree,
        parent,
        author: signature.clone(),
        committer: signature,
        message: message.to_string(),
    };
    let id = store.write(ObjectType::Commit, &record.to_bytes())?;
    println!("{id}");
    Ok(())
}

/// `grit clone <url> <dir>`
pub fn clone(url: &str, dir: &Path) -> anyhow::Result<()> {
    tracing::info!(url = %url, "Cloning repository");
    let head = grit_transfer::clone_repository(url, dir)?;
    println!("Cloned {} at {}", url, head);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_storage::GitObject;
    use tempfile::TempDir;

    fn repo() -> (TempDir, ObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::init(dir.path().join(".git")).unwrap();
        (dir, store)
    }

    #[test]
    fn init_creates_repository_layout() {
        let dir = TempDir::new().unwrap();
        init(dir.path()).unwrap();
        assert!(dir.path().join(".git/objects").is_dir());
        assert!(dir.path().join(".git/refs").is_dir());
        assert_eq!(
            fs::read_to_string(dir.path().join(".git/HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
    }

    #[test]
    fn hash_object_write_stores_blob() {
        let (dir, store) = repo();
        let file = dir.path().join("x.txt");
        fs::write(&file, "x").unwrap();

        hash_object(dir.path(), &file, true).unwrap();

        // git hash-object of a file containing "x"
        let id = ObjectId::from_hex("c1b0730e0133447badcfd47fd144e254807b06e1").unwrap();
        assert!(store.contains(&id));
        assert_eq!(store.read(&id).unwrap().data.as_ref(), b"x");
    }

    #[test]
    fn hash_object_without_write_leaves_store_empty() {
        let (dir, store) = repo();
        let file = dir.path().join("x.txt");
        fs::write(&file, "x").unwrap();

        hash_object(dir.path(), &file, false).unwrap();

        let id = ObjectId::from_hex("c1b0730e0133447badcfd47fd144e254807b06e1").unwrap();
        assert!(!store.contains(&id));
    }

    #[test]
    fn hash_object_missing_file_fails() {
        let (dir, _store) = repo();
        assert!(hash_object(dir.path(), &dir.path().join("absent"), true).is_err());
    }

    #[test]
    fn cat_file_rejects_unknown_object() {
        let (dir, _store) = repo();
        assert!(cat_file(dir.path(), &"ab".repeat(20)).is_err());
    }

    #[test]
    fn cat_file_rejects_malformed_sha() {
        let (dir, _store) = repo();
        assert!(cat_file(dir.path(), "not-a-sha").is_err());
    }

    #[test]
    fn tree_lines_renders_mode_name_sha() {
        let (_dir, store) = repo();
        let blob = store.write(ObjectType::Blob, b"x").unwrap();
        let sub = store.write(ObjectType::Tree, &tree::serialize(&[])).unwrap();
        let entries = vec![TreeEntry::file("a.txt", blob), TreeEntry::dir("src", sub)];
        let id = store
            .write(ObjectType::Tree, &tree::serialize(&entries))
            .unwrap();

        let lines = tree_lines(&store, &id, false).unwrap();
        assert_eq!(
            lines,
            vec![
                format!("100644 a.txt {}", blob),
                format!("40000 src {}", sub),
            ]
        );
    }

    #[test]
    fn tree_lines_name_only() {
        let (_dir, store) = repo();
        let blob = store.write(ObjectType::Blob, b"x").unwrap();
        let entries = vec![
            TreeEntry::file("b.txt", blob),
            TreeEntry::file("a.txt", blob),
        ];
        let id = store
            .write(ObjectType::Tree, &tree::serialize(&entries))
            .unwrap();

        assert_eq!(tree_lines(&store, &id, true).unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn tree_lines_rejects_non_tree() {
        let (_dir, store) = repo();
        let blob = store.write(ObjectType::Blob, b"x").unwrap();
        assert!(tree_lines(&store, &blob, false).is_err());
    }

    #[test]
    fn write_tree_matches_git_for_single_file() {
        let (dir, store) = repo();
        fs::write(dir.path().join("a.txt"), "x").unwrap();

        let id = write_tree_at(&store, dir.path()).unwrap();

        // git write-tree over {a.txt: "x"}
        assert_eq!(id.to_hex(), "9375a50d54bf5374615a3378349e298761a4b116");
    }

    #[test]
    fn write_tree_skips_git_dir_and_recurses() {
        let (dir, store) = repo();
        fs::write(dir.path().join("top.txt"), "top").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/inner.txt"), "inner").unwrap();

        let id = write_tree_at(&store, dir.path()).unwrap();
        let entries = tree::parse(&store.read(&id).unwrap().data).unwrap();

        // Canonical order compares "sub" as "sub/", which sorts before "top.txt".
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "sub");
        assert!(entries[0].is_dir());
        assert_eq!(entries[1].name, "top.txt");

        let sub = tree::parse(&store.read(&entries[0].id).unwrap().data).unwrap();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub[0].name, "inner.txt");
        assert_eq!(
            store.read(&sub[0].id).unwrap().data.as_ref(),
            b"inner"
        );
    }

    #[test]
    fn write_tree_is_deterministic() {
        let (dir, store) = repo();
        fs::write(dir.path().join("a"), "1").unwrap();
        fs::write(dir.path().join("b"), "2").unwrap();
        let first = write_tree_at(&store, dir.path()).unwrap();
        let second = write_tree_at(&store, dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn commit_tree_writes_parseable_commit() {
        let (dir, store) = repo();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let tree_id = write_tree_at(&store, dir.path()).unwrap();

        commit_tree(dir.path(), &tree_id.to_hex(), None, "Initial commit").unwrap();

        // The commit id depends on the timestamp, so find it in the store.
        let commit = find_only_commit(&store, dir.path());
        let record = CommitRecord::parse(&commit.data).unwrap();
        assert_eq!(record.tree, tree_id);
        assert_eq!(record.parent, None);
        assert_eq!(record.author.name, "dev");
        assert_eq!(record.message, "Initial commit");
    }

    #[test]
    fn commit_tree_records_parent() {
        let (dir, store) = repo();
        let tree_id = store.write(ObjectType::Tree, &tree::serialize(&[])).unwrap();
        let parent_hex = "ce013625030ba8dba906f756967f9e9ca394464a";

        commit_tree(dir.path(), &tree_id.to_hex(), Some(parent_hex), "second").unwrap();

        let commit = find_only_commit(&store, dir.path());
        let record = CommitRecord::parse(&commit.data).unwrap();
        assert_eq!(record.parent, Some(ObjectId::from_hex(parent_hex).unwrap()));
    }

    #[test]
    fn commit_tree_rejects_bad_tree_sha() {
        let (dir, _store) = repo();
        assert!(commit_tree(dir.path(), "zz", None, "msg").is_err());
    }

    /// Scans the loose object fanout for the single commit object.
    fn find_only_commit(store: &ObjectStore, root: &Path) -> GitObject {
        let objects = root.join(".git/objects");
        let mut found = Vec::new();
        for fan in fs::read_dir(&objects).unwrap() {
            let fan = fan.unwrap();
            for file in fs::read_dir(fan.path()).unwrap() {
                let file = file.unwrap();
                let hex = format!(
                    "{}{}",
                    fan.file_name().to_string_lossy(),
                    file.file_name().to_string_lossy()
                );
                let id = ObjectId::from_hex(&hex).unwrap();
                let obj = store.read(&id).unwrap();
                if obj.kind == ObjectType::Commit {
                    found.push(obj);
                }
            }
        }
        assert_eq!(found.len(), 1, "expected exactly one commit object");
        found.remove(0)
    }
}
