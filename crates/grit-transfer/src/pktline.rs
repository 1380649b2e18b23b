//! pkt-line framing.
//!
//! Every protocol line is prefixed with a 4-hex-digit length that counts the
//! prefix itself; `0000` flushes a section, `0001` delimits capability and
//! argument blocks, `0002` ends a stateless response.

use crate::{Result, TransferError};
use std::io::{Read, Write};

/// A single pkt-line packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data line with content.
    Data(Vec<u8>),
    /// Flush packet (0000).
    Flush,
    /// Delimiter packet (0001).
    Delimiter,
    /// Response-end packet (0002).
    ResponseEnd,
}

impl PktLine {
    /// Creates a data packet from text.
    pub fn text(s: &str) -> Self {
        Self::Data(s.as_bytes().to_vec())
    }

    /// Encodes the packet, length prefix included.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Data(data) => {
                let mut out = format!("{:04x}", data.len() + 4).into_bytes();
                out.extend_from_slice(data);
                out
            }
            Self::Flush => b"0000".to_vec(),
            Self::Delimiter => b"0001".to_vec(),
            Self::ResponseEnd => b"0002".to_vec(),
        }
    }

    /// Returns the data content, or None for special packets.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the content as text with any trailing newline trimmed.
    pub fn as_text(&self) -> Option<&str> {
        self.data()
            .and_then(|d| std::str::from_utf8(d).ok())
            .map(|s| s.trim_end_matches('\n'))
    }
}

/// Reads pkt-line packets from a byte stream.
pub struct PktLineReader<R> {
    reader: R,
}

impl<R: Read> PktLineReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next packet; `Ok(None)` at clean end of stream.
    pub fn read(&mut self) -> Result<Option<PktLine>> {
        let mut prefix = [0u8; 4];
        match self.reader.read_exact(&mut prefix) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let prefix = std::str::from_utf8(&prefix)
            .map_err(|_| TransferError::InvalidPktLine("non-hex length prefix".into()))?;
        match prefix {
            "0000" => Ok(Some(PktLine::Flush)),
            "0001" => Ok(Some(PktLine::Delimiter)),
            "0002" => Ok(Some(PktLine::ResponseEnd)),
            _ => {
                let len = usize::from_str_radix(prefix, 16).map_err(|_| {
                    TransferError::InvalidPktLine(format!("bad length prefix: {:?}", prefix))
                })?;
                if len < 4 {
                    return Err(TransferError::InvalidPktLine(format!(
                        "length {} below minimum",
                        len
                    )));
                }
                let mut data = vec![0u8; len - 4];
                self.reader.read_exact(&mut data).map_err(|_| {
                    TransferError::InvalidPktLine("truncated packet payload".into())
                })?;
                Ok(Some(PktLine::Data(data)))
            }
        }
    }

    /// Reads packets until a flush (or end of stream).
    pub fn read_until_flush(&mut self) -> Result<Vec<PktLine>> {
        let mut packets = Vec::new();
        loop {
            match self.read()? {
                Some(PktLine::Flush) | None => break,
                Some(pkt) => packets.push(pkt),
            }
        }
        Ok(packets)
    }
}

/// Writes pkt-line packets to a byte stream.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one packet.
    pub fn write(&mut self, pkt: &PktLine) -> Result<()> {
        self.writer.write_all(&pkt.encode())?;
        Ok(())
    }

    /// Writes a text line, appending a newline if missing.
    pub fn write_text(&mut self, s: &str) -> Result<()> {
        let mut data = s.as_bytes().to_vec();
        if !s.ends_with('\n') {
            data.push(b'\n');
        }
        self.write(&PktLine::Data(data))
    }

    /// Writes a delimiter packet.
    pub fn delim(&mut self) -> Result<()> {
        self.write(&PktLine::Delimiter)
    }

    /// Writes a flush packet.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.write(&PktLine::Flush)
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn encode_counts_prefix() {
        assert_eq!(PktLine::text("hello\n").encode(), b"000ahello\n");
        assert_eq!(PktLine::Flush.encode(), b"0000");
        assert_eq!(PktLine::Delimiter.encode(), b"0001");
        assert_eq!(PktLine::ResponseEnd.encode(), b"0002");
    }

    #[test]
    fn roundtrip() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_text("command=ls-refs").unwrap();
            writer.delim().unwrap();
            writer.write_text("ref-prefix refs/heads/").unwrap();
            writer.flush_pkt().unwrap();
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert_eq!(
            reader.read().unwrap(),
            Some(PktLine::text("command=ls-refs\n"))
        );
        assert_eq!(reader.read().unwrap(), Some(PktLine::Delimiter));
        assert_eq!(
            reader.read().unwrap(),
            Some(PktLine::text("ref-prefix refs/heads/\n"))
        );
        assert_eq!(reader.read().unwrap(), Some(PktLine::Flush));
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn read_until_flush_stops() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_text("one").unwrap();
            writer.write_text("two").unwrap();
            writer.flush_pkt().unwrap();
            writer.write_text("after").unwrap();
        }
        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert_eq!(reader.read_until_flush().unwrap().len(), 2);
    }

    #[test]
    fn rejects_undersized_length() {
        let mut reader = PktLineReader::new(Cursor::new(b"0003".to_vec()));
        assert!(matches!(
            reader.read(),
            Err(TransferError::InvalidPktLine(_))
        ));
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut reader = PktLineReader::new(Cursor::new(b"0009hi".to_vec()));
        assert!(matches!(
            reader.read(),
            Err(TransferError::InvalidPktLine(_))
        ));
    }

    #[test]
    fn as_text_trims_newline() {
        assert_eq!(PktLine::text("want abc\n").as_text(), Some("want abc"));
        assert_eq!(PktLine::Flush.as_text(), None);
    }

    #[test]
    fn binary_payload_preserved() {
        let pkt = PktLine::Data(vec![1, 0x50, 0x41, 0x43, 0x4b, 0x00]);
        let mut reader = PktLineReader::new(Cursor::new(pkt.encode()));
        assert_eq!(reader.read().unwrap(), Some(pkt));
    }
}
