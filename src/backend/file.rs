//! File backend
//!
//! Append-only local journal file, one text record per line.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{KvError, Result};
use crate::journal::Event;

use super::codec::{decode_record, encode_record};
use super::{EventStream, LogBackend};

/// Write side of the journal file
trait LogFile: Send {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn sync_data(&mut self) -> io::Result<()>;
    fn sync_all(&mut self) -> io::Result<()>;
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(self, buf)
    }

    fn sync_data(&mut self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn sync_all(&mut self) -> io::Result<()> {
        File::sync_all(self)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// Journal stored as a line-oriented local file
pub struct FileBackend {
    /// Journal file path (replay opens its own read handle)
    path: PathBuf,

    /// Append handle; `None` once closed
    file: Option<Box<dyn LogFile>>,

    /// Set when a failed record could not be cut off the end of the file;
    /// the next sequence number would then be written twice
    poisoned: bool,

    sync_strategy: WalSyncStrategy,

    /// Appends since the last fsync
    uncommitted: usize,

    /// File length after the last successful append
    committed_len: u64,
}

impl FileBackend {
    /// Open or create a journal file
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let committed_len = file.metadata()?.len();

        tracing::debug!(path = %path.display(), bytes = committed_len, "journal file opened");

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(Box::new(file)),
            poisoned: false,
            sync_strategy,
            uncommitted: 0,
            committed_len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends written but not yet fsynced
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    fn file_mut(&mut self) -> Result<&mut Box<dyn LogFile>> {
        self.file.as_mut().ok_or(KvError::TransactorClosed)
    }

    /// Cut the file back to its last good length after a failed append
    fn rollback_to(&mut self, len: u64) {
        let truncated = match self.file.as_mut() {
            Some(file) => file.set_len(len),
            None => return,
        };
        if let Err(e) = truncated {
            tracing::error!(path = %self.path.display(), error = %e, "failed to truncate failed journal record");
            self.poisoned = true;
        }
    }

    fn should_sync(&self) -> bool {
        match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted >= count,
        }
    }
}

impl LogBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn append(&mut self, event: &Event) -> Result<()> {
        if self.poisoned {
            return Err(KvError::Io(io::Error::new(
                io::ErrorKind::Other,
                "journal file holds a record that could not be removed",
            )));
        }

        let record = encode_record(event);
        let committed_len = self.committed_len;

        if let Err(e) = self.file_mut()?.write_all(record.as_bytes()) {
            // Drop any torn tail so the next record starts on a clean line
            self.rollback_to(committed_len);
            return Err(e.into());
        }

        self.uncommitted += 1;
        if self.should_sync() {
            if let Err(e) = self.sync() {
                // A failed append leaves no record; its sequence is reused
                self.uncommitted -= 1;
                self.rollback_to(committed_len);
                return Err(e);
            }
        }

        self.committed_len += record.len() as u64;
        Ok(())
    }

    fn replay(&mut self) -> Result<Option<EventStream<'_>>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "journal file is missing");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let records = BufReader::new(file)
            .lines()
            .enumerate()
            .map(|(index, line)| {
                let line = line?;
                decode_record(&line, index + 1)
            });

        Ok(Some(Box::new(records)))
    }

    fn sync(&mut self) -> Result<()> {
        let file = self.file_mut()?;
        file.sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut file = self.file.take().ok_or(KvError::TransactorClosed)?;
        file.sync_all()?;
        self.uncommitted = 0;
        tracing::debug!(path = %self.path.display(), "journal file closed");
        Ok(())
    }
}
