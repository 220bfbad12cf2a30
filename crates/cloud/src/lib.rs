//! Blob store backends.
//!
//! - [`S3BlobStore`]: one S3 bucket, via `aws-sdk-s3`.
//! - [`LocalBlobStore`]: a directory tree on the local filesystem, for
//!   development and single-host deployments.

pub mod local;
pub mod s3;

pub use local::LocalBlobStore;
pub use s3::S3BlobStore;
