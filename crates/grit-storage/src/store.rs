//! Loose object store.
//!
//! Objects live at `<git-dir>/objects/<2-hex>/<38-hex>`, zlib-compressed,
//! each containing `"<kind> <len>\0" + payload`. The 40-hex id is the only
//! addressing mechanism; there is no separate index.

use crate::{GitObject, ObjectId, ObjectType, Result, StorageError};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;

/// Content of HEAD: the single supported branch.
const HEAD_CONTENT: &str = "ref: refs/heads/main\n";

/// Filesystem-backed content-addressed object store.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    git_dir: PathBuf,
}

impl ObjectStore {
    /// Attaches to an existing git directory without touching disk.
    pub fn open(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
        }
    }

    /// Creates the git directory layout (`objects/`, `refs/`, `HEAD`).
    ///
    /// Idempotent: re-initializing an existing directory is harmless.
    pub fn init(git_dir: impl Into<PathBuf>) -> Result<Self> {
        let git_dir = git_dir.into();
        fs::create_dir_all(git_dir.join("objects"))?;
        fs::create_dir_all(git_dir.join("refs"))?;
        fs::write(git_dir.join("HEAD"), HEAD_CONTENT)?;
        tracing::info!(dir = %git_dir.display(), "initialized git directory");
        Ok(Self { git_dir })
    }

    /// Returns the git directory this store is rooted at.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Derives the loose object path for an id. Pure: no existence check.
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.git_dir.join("objects").join(&hex[..2]).join(&hex[2..])
    }

    /// Checks whether a loose object exists.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.object_path(id).exists()
    }

    /// Writes an object, returning its content-derived id.
    ///
    /// Writing content that is already present is a no-op returning the same
    /// id. The compressed bytes land in a temporary file first and are
    /// renamed into place, so a concurrent reader never observes a partial
    /// object.
    pub fn write(&self, kind: ObjectType, payload: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::for_object(kind, payload);
        let path = self.object_path(&id);
        if path.exists() {
            tracing::trace!(id = %id, "object already present");
            return Ok(id);
        }

        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidObject("object path has no parent".into()))?;
        fs::create_dir_all(parent)?;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(format!("{} {}\0", kind.as_str(), payload.len()).as_bytes())?;
        encoder.write_all(payload)?;
        let compressed = encoder.finish()?;

        let tmp = parent.join(format!(".tmp-{}-{}", id.to_hex(), process::id()));
        fs::write(&tmp, &compressed)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!(id = %id, kind = %kind, size = payload.len(), "wrote loose object");
        Ok(id)
    }

    /// Reads an object by id, validating its header and declared size.
    pub fn read(&self, id: &ObjectId) -> Result<GitObject> {
        let path = self.object_path(id);
        let file = fs::File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::ObjectNotFound(id.to_hex())
            } else {
                StorageError::Io(e)
            }
        })?;

        let mut decoder = ZlibDecoder::new(file);
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| StorageError::CorruptObject(format!("{}: {}", id, e)))?;

        let nul = raw
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| StorageError::CorruptObject(format!("{}: missing header NUL", id)))?;
        let header = std::str::from_utf8(&raw[..nul])
            .map_err(|_| StorageError::CorruptObject(format!("{}: non-utf8 header", id)))?;
        let (kind_str, size_str) = header
            .split_once(' ')
            .ok_or_else(|| StorageError::CorruptObject(format!("{}: malformed header", id)))?;
        let kind = ObjectType::parse(kind_str)
            .map_err(|_| StorageError::CorruptObject(format!("{}: bad kind {:?}", id, kind_str)))?;
        let size: usize = size_str
            .parse()
            .map_err(|_| StorageError::CorruptObject(format!("{}: bad size {:?}", id, size_str)))?;

        let payload = &raw[nul + 1..];
        if payload.len() != size {
            return Err(StorageError::CorruptObject(format!(
                "{}: declared size {} but payload is {} bytes",
                id,
                size,
                payload.len()
            )));
        }

        Ok(GitObject {
            id: *id,
            kind,
            data: Bytes::from(payload.to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::init(dir.path().join(".git")).unwrap();
        (dir, store)
    }

    #[test]
    fn init_creates_layout() {
        let (_dir, store) = store();
        assert!(store.git_dir().join("objects").is_dir());
        assert!(store.git_dir().join("refs").is_dir());
        let head = fs::read_to_string(store.git_dir().join("HEAD")).unwrap();
        assert_eq!(head, "ref: refs/heads/main\n");
    }

    #[test]
    fn write_read_roundtrip() {
        let (_dir, store) = store();
        let id = store.write(ObjectType::Blob, b"Hello, World!").unwrap();
        let obj = store.read(&id).unwrap();
        assert_eq!(obj.kind, ObjectType::Blob);
        assert_eq!(obj.size(), 13);
        assert_eq!(obj.data.as_ref(), b"Hello, World!");
    }

    #[test]
    fn write_is_idempotent() {
        let (_dir, store) = store();
        let first = store.write(ObjectType::Blob, b"same content").unwrap();
        let second = store.write(ObjectType::Blob, b"same content").unwrap();
        assert_eq!(first, second);
        assert!(store.contains(&first));
    }

    #[test]
    fn object_path_two_level_fanout() {
        let (_dir, store) = store();
        let id = ObjectId::from_hex("ce013625030ba8dba906f756967f9e9ca394464a").unwrap();
        let path = store.object_path(&id);
        assert!(path.ends_with("objects/ce/013625030ba8dba906f756967f9e9ca394464a"));
    }

    #[test]
    fn read_missing_object() {
        let (_dir, store) = store();
        let id = ObjectId::from_hex(&"ab".repeat(20)).unwrap();
        match store.read(&id) {
            Err(StorageError::ObjectNotFound(hex)) => assert_eq!(hex, id.to_hex()),
            other => panic!("expected ObjectNotFound, got {:?}", other),
        }
    }

    #[test]
    fn read_detects_size_mismatch() {
        let (_dir, store) = store();
        let id = ObjectId::from_hex(&"cd".repeat(20)).unwrap();
        let path = store.object_path(&id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        // Header declares 10 bytes but carries 4.
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"blob 10\0true").unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        assert!(matches!(
            store.read(&id),
            Err(StorageError::CorruptObject(_))
        ));
    }

    #[test]
    fn read_detects_missing_header() {
        let (_dir, store) = store();
        let id = ObjectId::from_hex(&"ef".repeat(20)).unwrap();
        let path = store.object_path(&id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"no nul in here").unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        assert!(matches!(
            store.read(&id),
            Err(StorageError::CorruptObject(_))
        ));
    }

    #[test]
    fn binary_payload_survives() {
        let (_dir, store) = store();
        let payload: Vec<u8> = (0..=255).collect();
        let id = store.write(ObjectType::Blob, &payload).unwrap();
        let obj = store.read(&id).unwrap();
        assert_eq!(obj.data.as_ref(), payload.as_slice());
    }
}
