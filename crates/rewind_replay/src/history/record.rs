//! Raw recording records and readers.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, Result};

/// One undecoded entry of a recording.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Record kind, e.g. `updateLocation`.
    pub kind: String,
    /// Timeline coordinate of the record, in seconds.
    pub event_time: f64,
    /// The full record object.
    pub payload: serde_json::Value,
}

impl RawRecord {
    pub fn new(kind: impl Into<String>, event_time: f64, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            event_time,
            payload,
        }
    }
}

/// A pre-positioned, sequential source of raw records.
pub trait RecordReader {
    /// Whether another record can be read.
    fn has_next(&mut self) -> bool;

    /// Read the next record.
    fn read_next(&mut self) -> Result<RawRecord>;
}

impl<R: RecordReader + ?Sized> RecordReader for Box<R> {
    fn has_next(&mut self) -> bool {
        (**self).has_next()
    }

    fn read_next(&mut self) -> Result<RawRecord> {
        (**self).read_next()
    }
}

#[derive(Deserialize)]
struct RecordHeader {
    kind: String,
    #[serde(alias = "eventTimestamp")]
    event_time: f64,
}

/// Reads a recording stored as one JSON object per line.
///
/// Each object needs a `kind` string and an `event_time` number; everything
/// else is kept as payload. Blank lines are skipped.
pub struct JsonLinesReader<R> {
    input: R,
    /// 1-based number of the last line read from `input`.
    line: usize,
    peeked: Option<std::io::Result<(usize, String)>>,
}

impl<R: BufRead> JsonLinesReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: 0,
            peeked: None,
        }
    }

    fn peek(&mut self) -> bool {
        if self.peeked.is_some() {
            return true;
        }

        loop {
            let mut buf = String::new();
            match self.input.read_line(&mut buf) {
                Ok(0) => return false,
                Ok(_) => {
                    self.line += 1;
                    if buf.trim().is_empty() {
                        continue;
                    }
                    self.peeked = Some(Ok((self.line, buf)));
                    return true;
                }
                Err(err) => {
                    // The failed line's bytes are consumed all the same
                    self.line += 1;
                    self.peeked = Some(Err(err));
                    return true;
                }
            }
        }
    }
}

impl JsonLinesReader<BufReader<File>> {
    /// Open a recording file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> RecordReader for JsonLinesReader<R> {
    fn has_next(&mut self) -> bool {
        self.peek()
    }

    fn read_next(&mut self) -> Result<RawRecord> {
        if !self.peek() {
            return Err(ReplayError::IteratorExhausted);
        }
        let Some(peeked) = self.peeked.take() else {
            return Err(ReplayError::IteratorExhausted);
        };
        let (line, text) = peeked?;

        let payload: serde_json::Value = serde_json::from_str(text.trim())
            .map_err(|source| ReplayError::Decode { line, source })?;
        let header = RecordHeader::deserialize(&payload)
            .map_err(|source| ReplayError::Decode { line, source })?;

        Ok(RawRecord {
            kind: header.kind,
            event_time: header.event_time,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str) -> JsonLinesReader<Cursor<Vec<u8>>> {
        JsonLinesReader::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_reads_records_in_order() {
        let mut reader = reader(
            "{\"kind\":\"getStatus\",\"event_time\":1.0}\n\n{\"kind\":\"updateLocation\",\"event_time\":1.89,\"lat\":1.0,\"lon\":2.0}\n",
        );

        assert!(reader.has_next());
        let first = reader.read_next().unwrap();
        assert_eq!(first.kind, "getStatus");
        assert_eq!(first.event_time, 1.0);

        let second = reader.read_next().unwrap();
        assert_eq!(second.kind, "updateLocation");
        assert_eq!(second.payload["lat"], 1.0);

        assert!(!reader.has_next());
        assert!(matches!(reader.read_next(), Err(ReplayError::IteratorExhausted)));
    }

    #[test]
    fn test_event_timestamp_alias() {
        let mut reader = reader("{\"kind\":\"getStatus\",\"eventTimestamp\":12.5}");
        assert_eq!(reader.read_next().unwrap().event_time, 12.5);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let mut reader = reader("{\"kind\":\"getStatus\",\"event_time\":1.0}\nnot json\n{\"kind\":\"x\"}\n");

        reader.read_next().unwrap();
        match reader.read_next() {
            Err(ReplayError::Decode { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected decode error, got {other:?}"),
        }
        // Missing event_time
        match reader.read_next() {
            Err(ReplayError::Decode { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected decode error, got {other:?}"),
        }
        assert!(!reader.has_next());
    }

    #[test]
    fn test_unreadable_line_still_counts() {
        let mut bytes = b"{\"kind\":\"getStatus\",\"event_time\":1.0}\n".to_vec();
        bytes.extend_from_slice(b"\xff\xfe\n");
        bytes.extend_from_slice(b"{\"kind\":\"x\"}\n");
        let mut reader = JsonLinesReader::new(Cursor::new(bytes));

        reader.read_next().unwrap();
        assert!(matches!(reader.read_next(), Err(ReplayError::Io(_))));
        match reader.read_next() {
            Err(ReplayError::Decode { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected decode error, got {other:?}"),
        }
    }
}
