//! # recflow Store
//!
//! Backing stores for recflow programs.
//!
//! This crate provides:
//! - `MemoryStore`, an in-process store with numeric ids and revisions,
//!   revision preconditions, field projection, a small query language and
//!   all-or-nothing bulk requests
//! - `RestStore`, which maps the store contract onto JSON REST calls through
//!   a pluggable `HttpClient`
//!
//! Both implement `recflow_core::RecordStore` and can back either
//! interpreter.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod config;
mod memory;
mod query;
mod rest;

pub use config::{
    RestConfig, DEFAULT_API_PREFIX, DEFAULT_API_SUFFIX, DEFAULT_CONFLICT_CODE,
    DEFAULT_NOT_FOUND_CODE,
};
pub use memory::{MemoryStore, MemoryStoreStats, AMBIGUOUS_KEY_CODE, QUERY_ERROR_CODE};
pub use query::{Filter, QueryError};
pub use rest::{HttpClient, HttpRequest, HttpResponse, RestStore, BULK_API};
