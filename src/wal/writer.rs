//! Log Writer
//!
//! Handles appending records to the transaction log file. Owned by the
//! pipeline's worker thread; nothing else writes to the file.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::event::RECORD_TERMINATOR;
use super::Event;
use crate::config::WalSyncStrategy;
use crate::error::Result;

/// Chunk size used when scanning backwards for the last complete record
const TAIL_SCAN_CHUNK: u64 = 4096;

/// Appends encoded events to the log file
pub struct LogWriter {
    file: File,
    path: PathBuf,

    /// End of the last complete record
    offset: u64,

    sync_strategy: WalSyncStrategy,

    /// Records written since the last fsync
    uncommitted: usize,
}

impl LogWriter {
    /// Open or create a log file for appending.
    ///
    /// A partial trailing record left by a crash is cut off so new records
    /// always start on a fresh line.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        let offset = repair_tail(&mut file, path)?;

        tracing::debug!(path = %path.display(), offset, "opened transaction log for append");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            offset,
            sync_strategy,
            uncommitted: 0,
        })
    }

    /// Append an event and sync according to the strategy.
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.write_event(event)?;
        self.sync_if_due()
    }

    /// Write one record without syncing.
    ///
    /// A failed write is rolled back to the previous record boundary and
    /// attempted exactly once more. On error nothing of the record remains
    /// in the file, unless the rollback itself failed.
    pub fn write_event(&mut self, event: &Event) -> io::Result<()> {
        let line = event.encode();
        let bytes = line.as_bytes();

        if let Err(first) = self.file.write_all(bytes) {
            tracing::warn!(
                sequence = event.sequence,
                error = %first,
                "log write failed, retrying once"
            );
            self.file.set_len(self.offset)?;
            self.file.write_all(bytes)?;
        }

        self.offset += bytes.len() as u64;
        self.uncommitted += 1;
        Ok(())
    }

    /// Sync if the strategy says the unsynced records are due.
    ///
    /// A failure here means the records are in the file but may not
    /// survive a power loss.
    pub fn sync_if_due(&mut self) -> io::Result<()> {
        match self.sync_strategy {
            WalSyncStrategy::EveryWrite => self.sync(),
            WalSyncStrategy::EveryNEntries { count } if self.uncommitted >= count => self.sync(),
            WalSyncStrategy::EveryNEntries { .. } => Ok(()),
        }
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> io::Result<()> {
        if self.uncommitted == 0 {
            return Ok(());
        }
        self.file.flush()?;
        self.file.sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Records appended but not yet fsynced
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    /// Current length of the log in bytes
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Truncate the file to the end of its last complete record and return
/// that length.
fn repair_tail(file: &mut File, path: &Path) -> io::Result<u64> {
    let len = file.metadata()?.len();
    let mut end = len;
    let mut chunk = vec![0u8; TAIL_SCAN_CHUNK as usize];

    while end > 0 {
        let start = end.saturating_sub(TAIL_SCAN_CHUNK);
        let window = &mut chunk[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(window)?;

        if let Some(pos) = window.iter().rposition(|&b| b == RECORD_TERMINATOR as u8) {
            let keep = start + pos as u64 + 1;
            if keep != len {
                truncate(file, path, len, keep)?;
            }
            return Ok(keep);
        }
        end = start;
    }

    if len != 0 {
        truncate(file, path, len, 0)?;
    }
    Ok(0)
}

fn truncate(file: &mut File, path: &Path, len: u64, keep: u64) -> io::Result<()> {
    tracing::warn!(
        path = %path.display(),
        dropped_bytes = len - keep,
        "truncating partial trailing record"
    );
    file.set_len(keep)?;
    file.sync_all()
}
