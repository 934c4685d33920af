//! JSON-file persistence for kino download state.
//!
//! Implements `DownloadStoragePort` over a directory of per-partition JSON
//! files. This is the only crate that touches the state directory; the
//! coordinator stays storage-agnostic behind the port.

#![deny(unsafe_code)]

mod json_state_store;

pub use json_state_store::JsonStateStore;
