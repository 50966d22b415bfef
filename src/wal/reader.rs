//! Log Reader
//!
//! Reads records back from the transaction log, front to back.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::event::RECORD_TERMINATOR;
use super::Event;
use crate::error::{KvError, Result};

/// Summary of a pass over the log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Number of records decoded successfully
    pub events_read: u64,

    /// Sequence of the last decoded record (0 for an empty log)
    pub last_sequence: u64,

    /// Whether the file ended in a record without its terminator
    /// (a crash mid-write). That record is ignored.
    pub truncated_tail: bool,
}

/// Reads events from the log file.
///
/// The first error ends the stream for good; a partial trailing record is
/// end-of-stream, not an error.
pub struct LogReader {
    reader: BufReader<File>,
    line_no: u64,
    stats: ReplayStats,
    finished: bool,
    buf: Vec<u8>,
}

impl LogReader {
    /// Open a log file for reading
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_file(File::open(path)?))
    }

    pub(crate) fn from_file(file: File) -> Self {
        Self {
            reader: BufReader::new(file),
            line_no: 0,
            stats: ReplayStats::default(),
            finished: false,
            buf: Vec::with_capacity(256),
        }
    }

    /// Read the next event from the log
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        if self.finished {
            return Ok(None);
        }

        match self.read_record() {
            Ok(Some(event)) => Ok(Some(event)),
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    fn read_record(&mut self) -> Result<Option<Event>> {
        self.buf.clear();
        let read = self.reader.read_until(RECORD_TERMINATOR as u8, &mut self.buf)?;
        if read == 0 {
            return Ok(None);
        }
        self.line_no += 1;

        if self.buf.last() != Some(&(RECORD_TERMINATOR as u8)) {
            tracing::warn!(
                line = self.line_no,
                bytes = read,
                "ignoring partial trailing record in transaction log"
            );
            self.stats.truncated_tail = true;
            return Ok(None);
        }
        self.buf.pop();

        let line = std::str::from_utf8(&self.buf).map_err(|e| KvError::MalformedRecord {
            line: self.line_no,
            reason: format!("invalid UTF-8: {}", e),
        })?;
        let event = Event::decode(line, self.line_no)?;

        if event.sequence <= self.stats.last_sequence {
            return Err(KvError::MalformedRecord {
                line: self.line_no,
                reason: format!(
                    "sequence {} does not follow {}",
                    event.sequence, self.stats.last_sequence
                ),
            });
        }

        self.stats.events_read += 1;
        self.stats.last_sequence = event.sequence;
        Ok(Some(event))
    }

    /// Statistics for the records consumed so far
    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    /// Whether the stream has ended (cleanly or on error)
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Iterator for LogReader {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

/// Verify integrity of a log file without modifying it.
///
/// Fails with the first decode or I/O error.
pub fn verify(path: &Path) -> Result<ReplayStats> {
    let mut reader = LogReader::open(path)?;
    while reader.next_event()?.is_some() {}
    Ok(reader.stats)
}
