use crate::event::CardUid;
use std::fmt;
use std::io;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum SourceError {
    /// The reader device could not be opened
    Open { path: PathBuf, source: io::Error },

    /// Reading from an open device failed
    Read(io::Error),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Open { path, source } => {
                write!(f, "failed to open card reader {:?}: {}", path, source)
            }
            SourceError::Read(e) => write!(f, "failed to read from card reader: {}", e),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Open { source, .. } => Some(source),
            SourceError::Read(e) => Some(e),
        }
    }
}

/// Producer of card reads. `Ok(None)` means the source is exhausted.
///
/// Implementations must be cancel safe: the control loop races
/// `next_scan` against timers and link changes.
#[allow(async_fn_in_trait)]
pub trait EventSource {
    async fn next_scan(&mut self) -> Result<Option<CardUid>, SourceError>;
}

impl EventSource for mpsc::Receiver<CardUid> {
    async fn next_scan(&mut self) -> Result<Option<CardUid>, SourceError> {
        Ok(self.recv().await)
    }
}

/// Reads one card identifier per line, e.g. from a reader daemon's FIFO.
pub struct LineSource<R> {
    lines: Lines<R>,
}

pub type ReaderSource = LineSource<BufReader<Box<dyn AsyncRead + Unpin + Send>>>;

impl<R: tokio::io::AsyncBufRead + Unpin> LineSource<R> {
    pub fn new(reader: R) -> Self {
        LineSource {
            lines: reader.lines(),
        }
    }
}

impl ReaderSource {
    /// Opens the reader at `path`; `-` reads standard input.
    pub async fn open(path: &str) -> Result<Self, SourceError> {
        let reader: Box<dyn AsyncRead + Unpin + Send> = if path == "-" {
            Box::new(tokio::io::stdin())
        } else {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|source| SourceError::Open {
                    path: PathBuf::from(path),
                    source,
                })?;
            Box::new(file)
        };
        debug!("Card reader opened at {}", path);
        Ok(LineSource::new(BufReader::new(reader)))
    }
}

impl<R: tokio::io::AsyncBufRead + Unpin> EventSource for LineSource<R> {
    async fn next_scan(&mut self) -> Result<Option<CardUid>, SourceError> {
        loop {
            let Some(line) = self.lines.next_line().await.map_err(SourceError::Read)? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<CardUid>() {
                Ok(uid) => return Ok(Some(uid)),
                Err(e) => warn!("Ignoring unreadable card id {:?}: {}", line.trim(), e),
            }
        }
    }
}
