//! Object store abstraction.
//!
//! A pure content-addressed key -> bytes map with no awareness of ownership.
//! Keys are 64-character hex block digests. Backed by:
//! - S3-compatible object storage (AWS S3, MinIO, QNAP appliances)
//! - Local filesystem (tests and single-node deployments)

mod backend;
mod local;
mod s3;

pub use backend::{BoxReader, ObjectStore, StorageError, StorageResult};
pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;
