//! Object store contract and the local filesystem implementation.
//!
//! A bucket maps to `<root>/<bucket>/`; keys map to relative paths below it.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::ValidationError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    InvalidKey(#[from] ValidationError),
    #[error("failed to store '{key}' in bucket '{bucket}': {source}")]
    Io {
        bucket: String,
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Address of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl Display for ObjectLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "local://{}/{}", self.bucket, self.key)
    }
}

pub trait ObjectStore {
    /// Uploads `local` under `key`, replacing any existing object.
    fn put_file(&self, bucket: &str, key: &str, local: &Path) -> Result<ObjectLocation, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bucket_root(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        validate_segment(bucket)?;
        Ok(self.root.join(bucket))
    }

    /// Filesystem path backing `bucket`/`key`.
    pub fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.bucket_root(bucket)?.join(key))
    }
}

impl ObjectStore for LocalObjectStore {
    fn put_file(&self, bucket: &str, key: &str, local: &Path) -> Result<ObjectLocation, StoreError> {
        let target = self.resolve(bucket, key)?;
        let io_err = |source| StoreError::Io {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            source,
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::copy(local, &target).map_err(io_err)?;

        tracing::debug!(bucket, key, path = %target.display(), "object stored");
        Ok(ObjectLocation {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        })
    }
}

/// Rejects keys that would escape the bucket directory.
pub fn validate_key(key: &str) -> Result<(), ValidationError> {
    if key.trim().is_empty() {
        return Err(ValidationError::EmptyKey);
    }
    let invalid = |reason| ValidationError::InvalidKey {
        key: key.to_owned(),
        reason,
    };
    if key.starts_with('/') {
        return Err(invalid("must not start with '/'"));
    }
    if key.contains('\\') {
        return Err(invalid("must not contain '\\'"));
    }
    if key.split('/').any(|segment| segment == "..") {
        return Err(invalid("must not contain '..' segments"));
    }
    Ok(())
}

fn validate_segment(bucket: &str) -> Result<(), ValidationError> {
    validate_key(bucket)?;
    if bucket.contains('/') || bucket == "." {
        return Err(ValidationError::InvalidKey {
            key: bucket.to_owned(),
            reason: "bucket must be a single path segment",
        });
    }
    Ok(())
}
