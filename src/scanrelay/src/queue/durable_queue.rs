use super::record::{committed_len, decode_lines, encode_line, encode_lines, QueuedEvent};
use super::QueueError;
use crate::event::{LocalClock, ScanEvent};
use std::collections::HashSet;
use std::ffi::OsString;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const COMPACTION_SUFFIX: &str = ".compact";

/// What an append did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    pub seq: u64,
    /// Oldest records dropped to stay within capacity
    pub evicted: Vec<QueuedEvent>,
}

/// The stored entries as of one point in time. `horizon` is the sequence
/// number the next append will receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backlog {
    pub entries: Vec<QueuedEvent>,
    pub horizon: u64,
}

impl Backlog {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
struct QueueState {
    len: usize,
    next_seq: u64,
}

/// Crash-tolerant FIFO of undelivered events, stored as newline-delimited JSON.
///
/// All mutations are serialized behind one async mutex. Appends are flushed
/// to stable storage before returning; rewrites go through a temp file and a
/// rename so a reader only ever sees the old or the new contents.
#[derive(Debug)]
pub struct DurableQueue {
    path: PathBuf,
    compaction_path: PathBuf,
    capacity: usize,
    clock: LocalClock,
    state: Mutex<QueueState>,
}

impl DurableQueue {
    /// Opens (or lazily creates) the store at `path`, recovering from an
    /// interrupted append or compaction.
    pub async fn open(
        path: impl Into<PathBuf>,
        capacity: usize,
        clock: LocalClock,
    ) -> Result<Self, QueueError> {
        let path = path.into();
        let mut compaction_path = OsString::from(path.as_os_str());
        compaction_path.push(COMPACTION_SUFFIX);
        let compaction_path = PathBuf::from(compaction_path);

        let dir = parent_dir(&path);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| QueueError::io("create directory", &dir, e))?;

        // a leftover temp file is a rewrite that never reached its rename
        match fs::remove_file(&compaction_path).await {
            Ok(()) => warn!(
                "Discarded uncommitted compaction file {:?}",
                compaction_path
            ),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(QueueError::io("remove", &compaction_path, e)),
        }

        let bytes = read_or_empty(&path).await?;
        let committed = committed_len(&bytes);
        if committed < bytes.len() {
            warn!(
                "Truncating {} bytes of torn trailing record in {:?}",
                bytes.len() - committed,
                path
            );
            truncate(&path, committed as u64).await?;
        }

        let state = match decode_lines(&path, &bytes[..committed]) {
            Ok(records) => QueueState {
                len: records.len(),
                next_seq: records.iter().map(|r| r.seq + 1).max().unwrap_or(0),
            },
            Err(e) => {
                error!(
                    category = e.category(),
                    "Offline store is unreadable, backlog will not be drained until repaired: {}", e
                );
                recover_state(&bytes[..committed])
            }
        };

        info!(
            "Opened offline store {:?} with {} pending events",
            path, state.len
        );

        Ok(DurableQueue {
            path,
            compaction_path,
            capacity: capacity.max(1),
            clock,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.len
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Adds `event` at the tail. Returns only after the record is on stable
    /// storage. At capacity the oldest records are evicted in the same
    /// atomic rewrite that adds the new one.
    pub async fn append(&self, event: ScanEvent) -> Result<AppendReceipt, QueueError> {
        let mut state = self.state.lock().await;
        let record = QueuedEvent {
            event,
            saved_at_uptime: self.clock.ticks(),
            seq: state.next_seq,
        };

        let evicted = if state.len >= self.capacity {
            let mut records = self.read_records().await?;
            let overflow = (records.len() + 1)
                .saturating_sub(self.capacity)
                .min(records.len());
            let evicted: Vec<QueuedEvent> = records.drain(..overflow).collect();
            records.push(record.clone());
            self.replace_with(&records).await?;
            state.len = records.len();
            evicted
        } else {
            self.append_line(&record).await?;
            state.len += 1;
            Vec::new()
        };
        state.next_seq = record.seq + 1;

        debug!(
            seq = record.seq,
            card_id = %record.event.card_id,
            "Queued event, {} pending",
            state.len
        );

        Ok(AppendReceipt {
            seq: record.seq,
            evicted,
        })
    }

    /// Every stored event in append order.
    pub async fn load_all(&self) -> Result<Vec<QueuedEvent>, QueueError> {
        let _state = self.state.lock().await;
        self.read_records().await
    }

    /// Stored events plus the horizon that separates them from later appends.
    pub async fn snapshot(&self) -> Result<Backlog, QueueError> {
        let state = self.state.lock().await;
        let entries = self.read_records().await?;
        Ok(Backlog {
            entries,
            horizon: state.next_seq,
        })
    }

    /// Atomically replaces the whole store with exactly `survivors`.
    /// An empty set removes the file.
    pub async fn compact_to(&self, survivors: &[QueuedEvent]) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        self.replace_with(survivors).await?;
        state.len = survivors.len();
        if let Some(max) = survivors.iter().map(|r| r.seq + 1).max() {
            state.next_seq = state.next_seq.max(max);
        }
        Ok(())
    }

    /// Ends a reconciliation pass over a backlog taken at `horizon`: keeps the
    /// `survivors` that are still stored plus everything appended since the
    /// snapshot. Returns the number of records left. Skips the rewrite when
    /// nothing would change.
    pub async fn commit_pass(
        &self,
        horizon: u64,
        survivors: &[QueuedEvent],
    ) -> Result<usize, QueueError> {
        let mut state = self.state.lock().await;
        let current = self.read_records().await?;

        let keep: HashSet<u64> = survivors.iter().map(|r| r.seq).collect();
        let next: Vec<QueuedEvent> = current
            .iter()
            .filter(|r| r.seq >= horizon || keep.contains(&r.seq))
            .cloned()
            .collect();

        if next.len() != current.len() {
            self.replace_with(&next).await?;
        }
        state.len = next.len();
        Ok(next.len())
    }

    async fn read_records(&self) -> Result<Vec<QueuedEvent>, QueueError> {
        let bytes = read_or_empty(&self.path).await?;
        decode_lines(&self.path, &bytes)
    }

    async fn append_line(&self, record: &QueuedEvent) -> Result<(), QueueError> {
        let line = encode_line(record)?;
        let existed = fs::try_exists(&self.path).await.unwrap_or(false);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| QueueError::io("open", &self.path, e))?;
        let mut prev_len = file
            .metadata()
            .await
            .map_err(|e| QueueError::io("stat", &self.path, e))?
            .len();

        // the new line must not be glued onto a fragment left by a failed append
        if prev_len > 0 && !self.ends_with_newline(&mut file, prev_len).await? {
            prev_len = self.trim_torn_tail(&file).await?;
        }

        if let Err((op, e)) = write_synced(&mut file, &line).await {
            if let Err(rollback) = truncate_open(&file, prev_len).await {
                error!(
                    "Failed to roll back partial append in {:?}: {}",
                    self.path, rollback
                );
            }
            return Err(QueueError::io(op, &self.path, e));
        }

        if !existed {
            sync_dir(&self.path).await?;
        }
        Ok(())
    }

    async fn ends_with_newline(&self, file: &mut File, len: u64) -> Result<bool, QueueError> {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))
            .await
            .map_err(|e| QueueError::io("seek", &self.path, e))?;
        file.read_exact(&mut last)
            .await
            .map_err(|e| QueueError::io("read", &self.path, e))?;
        Ok(last[0] == b'\n')
    }

    /// Cuts the store back to its last complete line and returns the new length.
    async fn trim_torn_tail(&self, file: &File) -> Result<u64, QueueError> {
        let bytes = read_or_empty(&self.path).await?;
        let committed = committed_len(&bytes) as u64;
        warn!(
            "Truncating {} bytes of torn trailing record in {:?} before append",
            bytes.len() as u64 - committed,
            self.path
        );
        truncate_open(file, committed)
            .await
            .map_err(|e| QueueError::io("truncate", &self.path, e))?;
        Ok(committed)
    }

    async fn replace_with(&self, records: &[QueuedEvent]) -> Result<(), QueueError> {
        if records.is_empty() {
            match fs::remove_file(&self.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(QueueError::io("remove", &self.path, e)),
            }
            return sync_dir(&self.path).await;
        }

        let bytes = encode_lines(records)?;
        let tmp = &self.compaction_path;

        let mut file = File::create(tmp)
            .await
            .map_err(|e| QueueError::io("create", tmp, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| QueueError::io("write", tmp, e))?;
        file.flush()
            .await
            .map_err(|e| QueueError::io("flush", tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| QueueError::io("sync", tmp, e))?;
        drop(file);

        fs::rename(tmp, &self.path)
            .await
            .map_err(|e| QueueError::io("rename", &self.path, e))?;
        sync_dir(&self.path).await
    }
}

async fn write_synced(file: &mut File, bytes: &[u8]) -> Result<(), (&'static str, io::Error)> {
    file.write_all(bytes).await.map_err(|e| ("append to", e))?;
    file.flush().await.map_err(|e| ("flush", e))?;
    file.sync_data().await.map_err(|e| ("sync", e))
}

async fn truncate_open(file: &File, len: u64) -> io::Result<()> {
    file.set_len(len).await?;
    file.sync_data().await
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn read_or_empty(path: &Path) -> Result<Vec<u8>, QueueError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(QueueError::io("read", path, e)),
    }
}

async fn truncate(path: &Path, len: u64) -> Result<(), QueueError> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|e| QueueError::io("open", path, e))?;
    file.set_len(len)
        .await
        .map_err(|e| QueueError::io("truncate", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| QueueError::io("sync", path, e))
}

#[cfg(unix)]
async fn sync_dir(path: &Path) -> Result<(), QueueError> {
    let dir = parent_dir(path);
    let handle = File::open(&dir)
        .await
        .map_err(|e| QueueError::io("open directory", &dir, e))?;
    handle
        .sync_all()
        .await
        .map_err(|e| QueueError::io("sync directory", &dir, e))
}

#[cfg(not(unix))]
async fn sync_dir(_path: &Path) -> Result<(), QueueError> {
    Ok(())
}

/// Best-effort counters for a store that failed to decode, so appends can
/// continue without reusing a sequence number.
fn recover_state(bytes: &[u8]) -> QueueState {
    let mut len = 0;
    let mut next_seq = 0;
    for line in bytes.split(|b| *b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        len += 1;
        if let Ok(record) = serde_json::from_slice::<QueuedEvent>(line) {
            next_seq = next_seq.max(record.seq + 1);
        }
    }
    QueueState { len, next_seq }
}
