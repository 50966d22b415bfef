//! Engine Module
//!
//! Ties the transaction log to the in-memory store.
//!
//! ## Responsibilities
//! - Rebuild the store from the log on startup
//! - Log every mutation before it becomes visible in the store
//! - Shut the log down cleanly

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::store::Store;
use crate::wal::{ReplayStats, TransactionLogger};

/// The main storage engine
///
/// ## Mutation order: log first, then map
///
/// `put`/`delete` hand the event to the transaction logger and only touch
/// the store once the logger has accepted it. A refused event (closed or
/// failed logger) leaves the store unchanged.
///
/// `write_lock` spans "assign sequence" and "update store" so the store
/// always reflects the same order as the log. Neither step waits on disk.
pub struct Engine {
    config: Config,

    log_path: PathBuf,

    logger: TransactionLogger,

    store: Store,

    /// Serializes write operations (put/delete)
    write_lock: Mutex<()>,

    /// What startup replay found
    recovery: ReplayStats,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Open the transaction log
    /// 3. Replay it into the store, aborting on any error
    /// 4. Start the append pipeline
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let log_path = config.log_path();
        let logger = TransactionLogger::open(&log_path, config.wal_sync_strategy)?;
        let store = Store::new();

        let mut replay = logger.replay()?;
        for event in replay.by_ref() {
            store.apply(&event?);
        }
        let recovery = replay.stats().clone();

        if recovery.events_read > 0 || recovery.truncated_tail {
            tracing::info!(
                events = recovery.events_read,
                last_sequence = recovery.last_sequence,
                truncated_tail = recovery.truncated_tail,
                keys = store.len(),
                "recovered state from transaction log"
            );
        }

        logger.start()?;

        Ok(Self::from_parts(config, logger, store, recovery))
    }

    /// Assemble an engine around a logger that is already running
    pub(crate) fn from_parts(
        config: Config,
        logger: TransactionLogger,
        store: Store,
        recovery: ReplayStats,
    ) -> Self {
        Self {
            config,
            log_path: logger.path().to_path_buf(),
            logger,
            store,
            write_lock: Mutex::new(()),
            recovery,
        }
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Result<String> {
        self.store.get(key)
    }

    /// Put a key-value pair. Returns the event's sequence number.
    pub fn put(&self, key: &str, value: &str) -> Result<u64> {
        let _write_guard = self.write_lock.lock();

        let sequence = self.logger.record_put(key, value)?;
        self.store.put(key, value);

        Ok(sequence)
    }

    /// Delete a key. Returns the event's sequence number.
    pub fn delete(&self, key: &str) -> Result<u64> {
        let _write_guard = self.write_lock.lock();

        let sequence = self.logger.record_delete(key)?;
        self.store.delete(key);

        Ok(sequence)
    }

    /// Wait until every mutation so far is durable
    pub fn flush(&self) -> Result<()> {
        self.logger.flush()
    }

    /// Fails once the log can no longer guarantee durability
    pub fn health(&self) -> Result<()> {
        if self.logger.has_failed() {
            return Err(KvError::LoggerFailed);
        }
        Ok(())
    }

    /// Close the engine gracefully
    ///
    /// Drains and syncs the transaction log. Later writes are refused.
    pub fn close(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.logger.close()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the transaction log path
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Highest sequence number assigned so far
    pub fn last_sequence(&self) -> u64 {
        self.logger.last_sequence()
    }

    /// Statistics from the startup replay
    pub fn recovery(&self) -> &ReplayStats {
        &self.recovery
    }

    pub fn logger(&self) -> &TransactionLogger {
        &self.logger
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
