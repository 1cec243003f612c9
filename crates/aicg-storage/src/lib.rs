//! Blob store gateway over any S3-compatible object store.
//!
//! This crate provides:
//! - Put/get/exists/delete by key with content-SHA256 side metadata
//! - Idempotent same-key puts (identical content skips the upload)
//! - Presigned-URL issuance
//! - The flat key namespace `{project_id}/{artifact_type}/{uuid}.{ext}`

pub mod client;
pub mod error;
pub mod keys;

pub use client::{BlobConfig, BlobStore, PutOutcome};
pub use error::{StorageError, StorageResult};
pub use keys::{object_key, ArtifactType};
