//! Domain types and external-collaborator seams for the lookbook
//! product-photo enrichment pipeline.
//!
//! Everything in this crate is free of network I/O. The traits in
//! [`storage`], [`gateway`] and [`ledger`] describe the blob store, the
//! generative model gateway and the progress ledger; concrete backends live
//! in `lookbook-cloud`, `lookbook-gateway` and `lookbook-db`. The
//! [`memory`] module provides in-process implementations of the blob store
//! and ledger.

pub mod error;
pub mod gateway;
pub mod job;
pub mod ledger;
pub mod memory;
pub mod patch;
pub mod storage;
pub mod types;
