//! HTTP client for the generative model gateway.
//!
//! Speaks the invoke / converse JSON protocol of a hosted inference
//! runtime: text-to-image and virtual try-on go through `invoke` on the
//! image model, classification and attribution through `converse` on the
//! text models. [`HttpModelGateway`] implements
//! [`lookbook_core::gateway::ModelGateway`].

pub mod api;
pub mod payload;

pub use api::{GatewayConfig, HttpModelGateway};
