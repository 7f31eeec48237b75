// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Layout of the shared state directory.
//!
//! Every invocation of the binary shares one directory (the OS temporary
//! directory unless overridden) holding:
//!
//! ```text
//! op-credential-process.lock                            lock token, zero length
//! op-credential-process-cache-<key>.json                one per credential key
//! op-credential-process-log-<YYYYmmddTHHMMSS>-<pid>.log one per invocation
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::constants::{
    CACHE_FILE_EXTENSION, CACHE_FILE_PREFIX, LOCK_FILE_NAME, LOG_FILE_EXTENSION, LOG_FILE_PREFIX,
};
use crate::errors::AppError;
use crate::models::CredentialKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Uses `dir` when given, otherwise the OS temporary directory.
    pub fn resolve(dir: Option<PathBuf>) -> Self {
        Self::new(dir.unwrap_or_else(std::env::temp_dir))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the state directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ConfigError`] when the path exists but is not a
    /// directory, or an I/O error when it cannot be created.
    pub fn ensure(&self) -> Result<(), AppError> {
        if self.root.exists() && !self.root.is_dir() {
            return Err(AppError::ConfigError(format!(
                "state directory {} is not a directory",
                self.root.display()
            )));
        }
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    pub fn cache_file(&self, key: &CredentialKey) -> PathBuf {
        self.root
            .join(format!("{CACHE_FILE_PREFIX}{key}.{CACHE_FILE_EXTENSION}"))
    }

    pub fn log_file_name(started_at: DateTime<Utc>, pid: u32) -> String {
        format!(
            "{LOG_FILE_PREFIX}{}-{pid}.{LOG_FILE_EXTENSION}",
            started_at.format("%Y%m%dT%H%M%S")
        )
    }
}
