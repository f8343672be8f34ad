#![allow(unused)]

//! # contract: Universal interface to the remote object store
//!
//! This module defines a single trait ([`ObjectStore`]) and the plain data types
//! flowing across it. Everything the publisher does to a bucket goes through
//! these five calls, so the core never depends on a vendor SDK.
//!
//! ## Interface & Extensibility
//! - Implement [`ObjectStore`] to publish somewhere new (S3 lives in the CLI crate,
//!   an in-memory store lives in [`crate::memory`]).
//! - All methods are async and return [`StoreError`]; map "access denied" style
//!   responses to [`StoreError::Forbidden`] so callers can point the user at
//!   their credentials.
//! - Implementations must be safe to call concurrently: the commit phase issues
//!   several requests at once through one shared reference.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockObjectStore` is exported when the
//!   `test-export-mocks` feature is on (the default).

use std::path::Path;

use async_trait::async_trait;
use mockall::{automock, predicate::*};
use serde::Serialize;

use crate::error::StoreError;

/// S3 refuses bulk-delete requests with more keys than this.
pub const MAX_DELETE_BATCH: usize = 1000;

/// One entry of a remote key listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteObject {
    pub key: String,
    /// Object size in bytes; zero-length objects are redirect markers.
    pub size: u64,
    /// Opaque content identity, possibly surrounded by double quotes.
    pub etag: String,
}

impl RemoteObject {
    pub fn new(key: impl Into<String>, size: u64, etag: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size,
            etag: etag.into(),
        }
    }

    /// Zero-length objects encode a redirect rather than content.
    pub fn is_redirect_marker(&self) -> bool {
        self.size == 0
    }

    /// The ETag with surrounding quotes removed.
    pub fn bare_etag(&self) -> &str {
        self.etag.trim_matches('"')
    }
}

/// Headers attached to an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadOptions {
    pub content_type: String,
    pub cache_control: String,
}

/// A key the store failed to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub key: String,
    pub message: String,
}

/// Result of one bulk-delete request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub errors: Vec<DeleteFailure>,
}

/// Trait for reading and mutating the remote object store.
///
/// The trait is `Send` + `Sync` and intended for async/await usage.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object whose key starts with `prefix`.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObject>, StoreError>;

    /// Upload the file at `local_path` to `key`.
    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        options: &UploadOptions,
    ) -> Result<(), StoreError>;

    /// Fetch the destination of the redirect stored at `key`, if there is one.
    async fn get_redirect(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a redirect marker at `key` pointing at `destination`.
    async fn set_redirect(&self, key: &str, destination: &str) -> Result<(), StoreError>;

    /// Delete up to [`MAX_DELETE_BATCH`] keys in one request.
    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteResult, StoreError>;
}
