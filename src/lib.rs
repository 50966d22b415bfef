//! # durakv
//!
//! A minimal durable key-value store with:
//! - An ordered, append-only transaction log (WAL)
//! - Crash recovery by replaying the log on startup
//! - A single background writer fed by a lock-light MPSC queue
//! - An HTTP front end
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Server                             │
//! │                  (many concurrent requests)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Engine                                 │
//! │               (log first, then store)                        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌──────────────┐          ┌─────────────┐
//!   │ Transaction  │          │    Store    │
//!   │   Logger     │          │  (RwLock)   │
//!   └──────┬───────┘          └─────────────┘
//!          │ queue
//!          ▼
//!   ┌──────────────┐
//!   │ writer thread│──► transaction.log
//!   └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod engine;
pub mod http;
pub mod store;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use engine::Engine;
pub use error::{KvError, Result};
pub use wal::{Event, EventType, TransactionLogger};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of durakv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
