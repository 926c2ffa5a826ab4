//! # recflow Protocol
//!
//! Record, query and write-request types for recflow.
//!
//! This crate provides:
//! - Identity types (`AppId`, `RecordId`, `Revision`)
//! - `Record` with its `$id` / `$revision` markers
//! - `RecordQuery` and `RecordPage` for multi-record reads
//! - `WriteRequest` shaped to the backing store's bulk-write contract
//! - JSON encoding/decoding of write requests
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod ids;
mod query;
mod record;
mod request;

pub use error::{ProtocolError, ProtocolResult};
pub use ids::{AppId, RecordId, Revision};
pub use query::RecordQuery;
pub use record::{Created, Record, RecordPage, ID_MARKER, REVISION_MARKER};
pub use request::{
    DeleteTarget, HttpMethod, RecordKey, UpdateKey, UpdateTarget, WriteRequest, RECORDS_API,
    RECORD_API,
};
