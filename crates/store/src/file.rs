//! Append-only JSON Lines store

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use pricecast_core::{PersistedObservation, PriceObservation, StoreResult};

use crate::memory::select_since;
use crate::HistoricalStore;

/// One record per line in `<dir>/<db_name>.jsonl`
///
/// The whole log is loaded into an index on open; appends go to disk first
/// and are indexed only once the write succeeded.
pub struct FileStore {
    path: PathBuf,
    writer: Mutex<LogWriter<File>>,
    index: RwLock<Vec<PersistedObservation>>,
}

/// Line appender that remembers when the log may end mid-line
struct LogWriter<W> {
    inner: W,
    /// Set while the tail may hold an unterminated fragment, either found on
    /// open or left by a failed append
    torn: bool,
}

impl<W: AsyncWrite + Unpin> LogWriter<W> {
    fn new(inner: W, torn: bool) -> Self {
        Self { inner, torn }
    }

    /// Write one newline-terminated record, starting a fresh line first if
    /// an earlier write stopped partway
    async fn append(&mut self, line: &[u8]) -> std::io::Result<()> {
        if self.torn {
            self.inner.write_all(b"\n").await?;
        }

        self.torn = true;
        self.inner.write_all(line).await?;
        self.inner.flush().await?;
        self.torn = false;
        Ok(())
    }
}

impl FileStore {
    pub async fn open(dir: impl AsRef<Path>, db_name: &str) -> StoreResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{db_name}.jsonl"));

        let (index, torn) = match fs::read_to_string(&path).await {
            Ok(contents) => (
                parse_log(&path, &contents),
                !contents.is_empty() && !contents.ends_with('\n'),
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Vec::new(), false),
            Err(e) => return Err(e.into()),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(path = %path.display(), records = index.len(), torn, "Opened file store");

        Ok(Self {
            path,
            writer: Mutex::new(LogWriter::new(file, torn)),
            index: RwLock::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }
}

fn parse_log(path: &Path, contents: &str) -> Vec<PersistedObservation> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(e) => {
                // A torn final line after a crash lands here
                warn!(path = %path.display(), line = n + 1, error = %e, "Skipping unreadable record");
                None
            }
        })
        .collect()
}

#[async_trait]
impl HistoricalStore for FileStore {
    async fn create(&self, observation: &PriceObservation) -> StoreResult<()> {
        let record = PersistedObservation::from(observation);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        if let Err(e) = self.writer.lock().await.append(line.as_bytes()).await {
            warn!(path = %self.path.display(), error = %e, "Append failed");
            return Err(e.into());
        }

        debug!(created_at = record.created_at, "Persisted observation");
        self.index.write().push(record);
        Ok(())
    }

    async fn get_since(&self, since: i64) -> StoreResult<Vec<PriceObservation>> {
        Ok(select_since(&self.index.read(), since))
    }
}
