//! Stage worker for the lookbook enrichment pipeline.
//!
//! The external orchestrator invokes the `lookbook-worker` binary once per
//! stage with a JSON event; this library holds the pieces the binary wires
//! together so they can be tested without a process boundary.

pub mod config;
pub mod event;
pub mod run;
