use super::QueueError;
use crate::event::ScanEvent;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// A scan event as persisted in the store, one JSON object per line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedEvent {
    #[serde(flatten)]
    pub event: ScanEvent,

    /// Uptime in milliseconds when the event was queued. Ordering hint only.
    pub saved_at_uptime: u64,

    /// Store-local sequence number, strictly increasing across appends.
    pub seq: u64,
}

pub(crate) fn encode_line(record: &QueuedEvent) -> Result<Vec<u8>, QueueError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(line)
}

pub(crate) fn encode_lines(records: &[QueuedEvent]) -> Result<Vec<u8>, QueueError> {
    let mut buf = Vec::new();
    for record in records {
        buf.extend(encode_line(record)?);
    }
    Ok(buf)
}

/// Length of the prefix of `bytes` made of complete, newline-terminated lines.
pub(crate) fn committed_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// Decodes every complete line. A trailing segment without a newline is the
/// remains of an interrupted append and is ignored.
pub(crate) fn decode_lines(path: &Path, bytes: &[u8]) -> Result<Vec<QueuedEvent>, QueueError> {
    let committed = committed_len(bytes);
    if committed < bytes.len() {
        warn!(
            "Ignoring {} bytes of torn trailing record in {:?}",
            bytes.len() - committed,
            path
        );
    }

    let mut records = Vec::new();
    for (index, line) in bytes[..committed].split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let record = serde_json::from_slice(line).map_err(|source| QueueError::Corrupt {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}
