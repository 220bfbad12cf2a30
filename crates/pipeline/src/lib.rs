//! Product-photo enrichment stages.
//!
//! - [`classifier`]: garment classification with a fixed fallback class.
//! - [`model_images`]: resolves the model images to dress (captured or
//!   generated) and records them in the ledger.
//! - [`executor`]: the bounded, failure-isolating try-on fan-out.
//! - [`try_on`]: the try-on stage entry point tying the three together.
//! - [`attribution`]: use-case template attribution over product images.
//! - [`product_attribution`]: label-driven attribution that opens the
//!   catalog workflow ahead of try-on.
//!
//! All stages borrow a [`PipelineContext`] built once at process start.

pub mod attribution;
pub mod classifier;
pub mod completion;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod images;
pub mod labels;
pub mod model_images;
pub mod product_attribution;
pub mod try_on;

mod calls;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::PipelineError;
pub use executor::{BatchOutcome, TaskFailure, TaskSuccess};
pub use lookbook_core::patch::build_attribute_patch;
pub use try_on::{TryOnStage, TryOnStageRequest};
