//! HTTP Module
//!
//! REST front end for the engine.
//!
//! ## Routes
//! - `GET    /v1/keys/{key}` → 200 + value, 404 if absent
//! - `PUT    /v1/keys/{key}` → 201, body is the value
//! - `DELETE /v1/keys/{key}` → 200
//! - anything else under `/v1` → 405
//!
//! A mutation that the transaction log refuses answers 5xx and, if the
//! failure is fatal, asks the server to shut down.

mod router;
mod server;

pub use router::{router, AppState};
pub use server::serve;
