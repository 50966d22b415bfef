//! Store Module
//!
//! The in-memory key-value map that the transaction log rebuilds on startup.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Many concurrent readers, writes serialized by an RwLock
//! - Apply replayed log events in order

mod table;

pub use table::Store;
