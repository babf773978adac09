use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors raised by the durable queue. Every variant means the backing store
/// could not be trusted for this operation.
#[derive(Debug)]
pub enum QueueError {
    /// The store file could not be read, written, synced or renamed
    Unavailable {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    /// A complete line in the store is not a valid record
    Corrupt {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    /// A record could not be encoded
    Encode(serde_json::Error),
}

impl QueueError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        QueueError::Unavailable {
            op,
            path: path.into(),
            source,
        }
    }

    /// Short category used as a structured log field
    pub fn category(&self) -> &'static str {
        match self {
            QueueError::Unavailable { .. } => "store_unavailable",
            QueueError::Corrupt { .. } => "store_corrupt",
            QueueError::Encode(_) => "encode_failure",
        }
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Unavailable { op, path, source } => {
                write!(f, "store unavailable: failed to {} {:?}: {}", op, path, source)
            }
            QueueError::Corrupt { path, line, source } => {
                write!(f, "store corrupt: {:?} line {}: {}", path, line, source)
            }
            QueueError::Encode(e) => write!(f, "failed to encode queued event: {}", e),
        }
    }
}

impl std::error::Error for QueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueueError::Unavailable { source, .. } => Some(source),
            QueueError::Corrupt { source, .. } => Some(source),
            QueueError::Encode(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Encode(err)
    }
}
