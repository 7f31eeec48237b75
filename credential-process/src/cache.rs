// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! On-disk cache of temporary credentials.
//!
//! One JSON document per [`CredentialKey`], stored in the shared state
//! directory. Reads fail open: a missing, unreadable, malformed or expired
//! entry is reported as a miss and never stops the caller from fetching fresh
//! credentials. Writes replace the whole file through a rename, so a crashed
//! writer leaves either the previous document or the new one.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use crate::errors::AppError;
use crate::models::{CredentialKey, SessionCredentials};
use crate::paths::StatePaths;

#[derive(Debug, Clone)]
pub struct CacheStore {
    paths: StatePaths,
}

impl CacheStore {
    pub fn new(paths: StatePaths) -> Self {
        Self { paths }
    }

    pub fn path_for(&self, key: &CredentialKey) -> PathBuf {
        self.paths.cache_file(key)
    }

    /// Returns the cached credentials for `key` when they have not expired yet.
    pub fn read(&self, key: &CredentialKey) -> Option<SessionCredentials> {
        self.read_at(key, Utc::now())
    }

    /// Same as [`read`](Self::read) with an explicit clock.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub fn read_at(&self, key: &CredentialKey, now: DateTime<Utc>) -> Option<SessionCredentials> {
        let path = self.path_for(key);

        let credentials = match load(&path) {
            Ok(Some(credentials)) => credentials,
            Ok(None) => {
                tracing::debug!(path = %path.display(), "no cached credentials");
                return None;
            }
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unusable cache entry");
                return None;
            }
        };

        if credentials.is_expired_at(now) {
            tracing::debug!(
                expiration = %credentials.expiration(),
                "cached credentials have expired"
            );
            return None;
        }

        tracing::debug!(
            expiration = %credentials.expiration(),
            "found valid cached credentials"
        );
        Some(credentials)
    }

    /// Stores `credentials` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created, written, or
    /// renamed over the cache entry. The previous entry is left untouched in
    /// that case.
    #[tracing::instrument(skip(self, credentials), fields(key = %key))]
    pub fn write(
        &self,
        key: &CredentialKey,
        credentials: &SessionCredentials,
    ) -> Result<(), AppError> {
        let path = self.path_for(key);
        let body = serde_json::to_vec_pretty(credentials)?;

        // created with mode 0600 on unix
        let mut file = NamedTempFile::new_in(self.paths.root())?;
        file.write_all(&body)?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|err| AppError::from(err.error))?;

        tracing::debug!(path = %path.display(), "cached credentials");
        Ok(())
    }
}

/// `Ok(None)` when there is no entry, [`AppError::CacheReadInvalid`] when the
/// entry exists but cannot be used.
fn load(path: &Path) -> Result<Option<SessionCredentials>, AppError> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(AppError::CacheReadInvalid {
                path: path.to_path_buf(),
                reason: err.to_string(),
            });
        }
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|err| AppError::CacheReadInvalid {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
}
