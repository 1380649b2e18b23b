//! Tree object records.
//!
//! Serialized form per entry: `<mode> <name>\0<20-byte sha>`, repeated.

use crate::{ObjectId, Result, StorageError};

/// Mode string for a subdirectory entry.
pub const MODE_DIR: &str = "40000";
/// Mode string for a regular file entry.
pub const MODE_FILE: &str = "100644";

/// One entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Octal mode string as stored, e.g. "100644" or "40000".
    pub mode: String,
    /// Entry name (file or directory basename).
    pub name: String,
    /// Object the entry points at.
    pub id: ObjectId,
}

impl TreeEntry {
    /// Creates a file entry.
    pub fn file(name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            mode: MODE_FILE.to_string(),
            name: name.into(),
            id,
        }
    }

    /// Creates a directory entry.
    pub fn dir(name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            mode: MODE_DIR.to_string(),
            name: name.into(),
            id,
        }
    }

    /// True if this entry names a subtree.
    pub fn is_dir(&self) -> bool {
        self.mode == MODE_DIR
    }

    /// Canonical sort key: directory names compare as if suffixed by '/'.
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.is_dir() {
            key.push(b'/');
        }
        key
    }
}

/// Parses a tree payload into entries, in stream order.
pub fn parse(payload: &[u8]) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut rest = payload;
    while !rest.is_empty() {
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| StorageError::InvalidObject("tree entry missing NUL".into()))?;
        let head = std::str::from_utf8(&rest[..nul])
            .map_err(|_| StorageError::InvalidObject("tree entry not utf-8".into()))?;
        let (mode, name) = head
            .split_once(' ')
            .ok_or_else(|| StorageError::InvalidObject(format!("bad tree entry: {:?}", head)))?;

        let sha_start = nul + 1;
        let sha_end = sha_start + 20;
        if rest.len() < sha_end {
            return Err(StorageError::InvalidObject(
                "tree entry truncated before sha".into(),
            ));
        }
        let mut sha = [0u8; 20];
        sha.copy_from_slice(&rest[sha_start..sha_end]);

        entries.push(TreeEntry {
            mode: mode.to_string(),
            name: name.to_string(),
            id: ObjectId::from_bytes(sha),
        });
        rest = &rest[sha_end..];
    }
    Ok(entries)
}

/// Serializes entries into a tree payload, sorting canonically first.
pub fn serialize(entries: &[TreeEntry]) -> Vec<u8> {
    let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let mut out = Vec::new();
    for entry in sorted {
        out.extend_from_slice(entry.mode.as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.id.as_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_bytes([byte; 20])
    }

    #[test]
    fn parse_serialize_roundtrip() {
        let entries = vec![
            TreeEntry::file("a.txt", id(1)),
            TreeEntry::dir("src", id(2)),
        ];
        let payload = serialize(&entries);
        let parsed = parse(&payload).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn serialize_sorts_by_name() {
        let entries = vec![
            TreeEntry::file("zebra", id(1)),
            TreeEntry::file("apple", id(2)),
        ];
        let parsed = parse(&serialize(&entries)).unwrap();
        assert_eq!(parsed[0].name, "apple");
        assert_eq!(parsed[1].name, "zebra");
    }

    #[test]
    fn serialize_sorts_dirs_with_slash_suffix() {
        // "foo" as a directory sorts as "foo/", which lands after "foo.txt"
        // ('/' is 0x2f, '.' is 0x2e).
        let entries = vec![
            TreeEntry::dir("foo", id(1)),
            TreeEntry::file("foo.txt", id(2)),
        ];
        let parsed = parse(&serialize(&entries)).unwrap();
        assert_eq!(parsed[0].name, "foo.txt");
        assert_eq!(parsed[1].name, "foo");
    }

    #[test]
    fn serialize_is_order_independent() {
        let forward = vec![
            TreeEntry::file("a", id(1)),
            TreeEntry::file("b", id(2)),
            TreeEntry::dir("c", id(3)),
        ];
        let mut backward = forward.clone();
        backward.reverse();
        assert_eq!(serialize(&forward), serialize(&backward));
    }

    #[test]
    fn parse_rejects_truncated_sha() {
        let mut payload = b"100644 a.txt\0".to_vec();
        payload.extend_from_slice(&[0u8; 10]);
        assert!(parse(&payload).is_err());
    }

    #[test]
    fn parse_rejects_missing_nul() {
        assert!(parse(b"100644 a.txt").is_err());
    }

    #[test]
    fn empty_tree_is_empty() {
        assert!(parse(b"").unwrap().is_empty());
        assert!(serialize(&[]).is_empty());
    }
}
