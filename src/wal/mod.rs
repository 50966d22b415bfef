//! Transaction Log Module
//!
//! Provides durability through an append-only, line-oriented log.
//!
//! ## Responsibilities
//! - Assign sequence numbers at acceptance time
//! - Persist events in acceptance order from a single writer thread
//! - Replay the log on startup, in order, exactly once
//! - Tolerate a partial trailing record left by a crash
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ 1 \t 1 \t key \t value \n      (PUT)         │
//! │ 2 \t 2 \t key \t \n            (DELETE)      │
//! │ ...                                          │
//! └──────────────────────────────────────────────┘
//!  sequence, type (1 = PUT, 2 = DELETE), key, value
//! ```
//! Tabs, newlines, carriage returns and backslashes inside keys and values
//! are backslash-escaped.

mod event;
mod logger;
mod reader;
mod writer;

pub use event::{Event, EventType, FIELD_DELIMITER, RECORD_TERMINATOR};
pub use logger::{Replay, TransactionLogger};
pub use reader::{verify, LogReader, ReplayStats};
pub use writer::LogWriter;
