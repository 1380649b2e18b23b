//! Smart HTTP protocol-v2 client.
//!
//! Talks to `<remote>/git-upload-pack` with `Git-Protocol: version=2`,
//! framing requests as pkt-lines: an `ls-refs` round to discover heads and
//! a `fetch` round that returns a side-band multiplexed pack stream.
//!
//! See: https://git-scm.com/docs/protocol-v2

use crate::pktline::{PktLineReader, PktLineWriter};
use crate::{Result, TransferError};
use grit_storage::ObjectId;
use std::time::Duration;

/// Agent string advertised to the remote.
const AGENT: &str = "agent=grit/0.1.0";
/// Network operations are synchronous; cap them instead of hanging.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Side-band channel carrying pack data.
const BAND_PACK: u8 = 1;
/// Side-band channel carrying progress text.
const BAND_PROGRESS: u8 = 2;
/// Side-band channel carrying a fatal remote error.
const BAND_ERROR: u8 = 3;

/// One advertised ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefRecord {
    /// Object the ref points at.
    pub id: ObjectId,
    /// Full ref name, e.g. "refs/heads/main".
    pub name: String,
}

/// Selects the checkout target among advertised heads: `refs/heads/main`
/// when present, otherwise the first ref encountered.
pub fn choose_head(refs: &[RefRecord]) -> Option<&RefRecord> {
    refs.iter()
        .find(|r| r.name == "refs/heads/main")
        .or_else(|| refs.first())
}

/// Blocking protocol-v2 client for one remote.
pub struct HttpClient {
    base: String,
    http: reqwest::blocking::Client,
}

impl HttpClient {
    /// Creates a client for a remote repository URL.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            base: url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn upload_pack(&self, body: Vec<u8>) -> Result<Vec<u8>> {
        let url = format!("{}/git-upload-pack", self.base);
        tracing::debug!(%url, bytes = body.len(), "POST git-upload-pack");
        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/x-git-upload-pack-request")
            .header("Accept", "application/x-git-upload-pack-result")
            .header("Git-Protocol", "version=2")
            .header("Cache-Control", "no-cache")
            .body(body)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Transport(format!(
                "{} returned {}",
                url, status
            )));
        }
        Ok(response.bytes()?.to_vec())
    }

    /// Discovers the remote's heads via `command=ls-refs`.
    pub fn ls_refs(&self) -> Result<Vec<RefRecord>> {
        let body = ls_refs_request()?;
        let response = self.upload_pack(body)?;
        let refs = parse_ref_advertisement(&response)?;
        tracing::info!(count = refs.len(), "discovered refs");
        Ok(refs)
    }

    /// Fetches one pack containing every wanted object, demultiplexing the
    /// side-band response down to raw pack bytes.
    pub fn fetch_pack(&self, wants: &[ObjectId]) -> Result<Vec<u8>> {
        let body = fetch_request(wants)?;
        let response = self.upload_pack(body)?;
        let pack = extract_pack(&response)?;
        tracing::info!(bytes = pack.len(), "fetched pack");
        Ok(pack)
    }
}

/// Builds the `ls-refs` request body.
fn ls_refs_request() -> Result<Vec<u8>> {
    let mut writer = PktLineWriter::new(Vec::new());
    writer.write_text("command=ls-refs")?;
    writer.write_text(AGENT)?;
    writer.delim()?;
    writer.write_text("peel")?;
    writer.write_text("ref-prefix refs/heads/")?;
    writer.flush_pkt()?;
    Ok(writer.into_inner())
}

/// Builds the `fetch` request body: one `want` per head, then `done`.
fn fetch_request(wants: &[ObjectId]) -> Result<Vec<u8>> {
    let mut writer = PktLineWriter::new(Vec::new());
    writer.write_text("command=fetch")?;
    writer.write_text(AGENT)?;
    writer.write_text("object-format=sha1")?;
    writer.delim()?;
    writer.write_text("thin-pack")?;
    for want in wants {
        writer.write_text(&format!("want {}", want))?;
    }
    writer.write_text("done")?;
    writer.flush_pkt()?;
    Ok(writer.into_inner())
}

/// Parses an ls-refs response: `<40-hex> <name>[ symref-target:...]` lines.
fn parse_ref_advertisement(body: &[u8]) -> Result<Vec<RefRecord>> {
    let mut reader = PktLineReader::new(body);
    let mut refs = Vec::new();
    while let Some(pkt) = reader.read()? {
        let Some(line) = pkt.as_text() else { continue };
        let mut parts = line.split(' ');
        let (Some(hex), Some(name)) = (parts.next(), parts.next()) else {
            continue;
        };
        let id = ObjectId::from_hex(hex).map_err(|_| {
            TransferError::InvalidPktLine(format!("ref line without valid id: {:?}", line))
        })?;
        refs.push(RefRecord {
            id,
            name: name.to_string(),
        });
    }
    Ok(refs)
}

/// Strips pkt-line and side-band framing from a fetch response, returning
/// the concatenated pack-channel bytes.
///
/// Section header lines (`acknowledgments`, `NAK`, `packfile`) carry no
/// channel byte and are skipped; progress is logged and discarded; the
/// error channel aborts the fetch.
fn extract_pack(body: &[u8]) -> Result<Vec<u8>> {
    let mut reader = PktLineReader::new(body);
    let mut pack = Vec::new();
    while let Some(pkt) = reader.read()? {
        let Some(data) = pkt.data() else { continue };
        match data.first() {
            Some(&BAND_PACK) => pack.extend_from_slice(&data[1..]),
            Some(&BAND_PROGRESS) => {
                let text = String::from_utf8_lossy(&data[1..]);
                tracing::debug!(progress = %text.trim_end(), "remote");
            }
            Some(&BAND_ERROR) => {
                let text = String::from_utf8_lossy(&data[1..]);
                return Err(TransferError::Transport(format!(
                    "remote error: {}",
                    text.trim_end()
                )));
            }
            // Section headers and acknowledgment lines.
            _ => tracing::trace!(line = %String::from_utf8_lossy(data).trim_end(), "section"),
        }
    }
    if !pack.starts_with(b"PACK") {
        return Err(TransferError::MissingPackMagic);
    }
    Ok(pack)
}
