//! Commit object records.
//!
//! Serialized form is newline-delimited text:
//! `tree <sha>`, optional `parent <sha>`, `author ...`, `committer ...`,
//! blank line, message.

use crate::{ObjectId, Result, StorageError};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Author or committer identity with a UTC timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch. Rendered with a fixed +0000 zone.
    pub timestamp: u64,
}

impl Signature {
    /// Creates a signature stamped with the current time.
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            name: name.into(),
            email: email.into(),
            timestamp,
        }
    }

    fn parse(line: &str) -> Result<Self> {
        // "Name <email> 1234567890 +0000"
        let open = line
            .find(" <")
            .ok_or_else(|| StorageError::InvalidObject(format!("bad signature: {:?}", line)))?;
        let close = line
            .find('>')
            .ok_or_else(|| StorageError::InvalidObject(format!("bad signature: {:?}", line)))?;
        let name = line[..open].to_string();
        let email = line[open + 2..close].to_string();
        let timestamp = line[close + 1..]
            .split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                StorageError::InvalidObject(format!("bad signature timestamp: {:?}", line))
            })?;
        Ok(Self {
            name,
            email,
            timestamp,
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {} +0000", self.name, self.email, self.timestamp)
    }
}

/// A parsed commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub tree: ObjectId,
    pub parent: Option<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl CommitRecord {
    /// Renders the commit body (the object payload, header excluded).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = format!("tree {}\n", self.tree);
        if let Some(parent) = &self.parent {
            body.push_str(&format!("parent {}\n", parent));
        }
        body.push_str(&format!("author {}\n", self.author));
        body.push_str(&format!("committer {}\n", self.committer));
        body.push('\n');
        body.push_str(&self.message);
        if !self.message.ends_with('\n') {
            body.push('\n');
        }
        body.into_bytes()
    }

    /// Parses a commit payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| StorageError::InvalidObject("commit is not utf-8".into()))?;

        let mut tree = None;
        let mut parent = None;
        let mut author = None;
        let mut committer = None;

        let mut lines = text.lines();
        for line in lines.by_ref() {
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix("tree ") {
                tree = Some(ObjectId::from_hex(rest)?);
            } else if let Some(rest) = line.strip_prefix("parent ") {
                parent = Some(ObjectId::from_hex(rest)?);
            } else if let Some(rest) = line.strip_prefix("author ") {
                author = Some(Signature::parse(rest)?);
            } else if let Some(rest) = line.strip_prefix("committer ") {
                committer = Some(Signature::parse(rest)?);
            }
            // Unknown headers (gpgsig etc.) are skipped.
        }
        let message: String = lines.collect::<Vec<_>>().join("\n");

        Ok(Self {
            tree: tree
                .ok_or_else(|| StorageError::InvalidObject("commit missing tree header".into()))?,
            parent,
            author: author
                .ok_or_else(|| StorageError::InvalidObject("commit missing author".into()))?,
            committer: committer
                .ok_or_else(|| StorageError::InvalidObject("commit missing committer".into()))?,
            message,
        })
    }
}
