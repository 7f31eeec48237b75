// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Machine-wide mutual exclusion between concurrent invocations.
//!
//! The AWS CLI and SDKs may start one credential process per profile at the
//! same time. They must not consume the same one-time code or raise parallel
//! 1Password authorization prompts, so the whole acquisition sequence runs
//! under a single advisory lock on a well-known token file.
//!
//! Every attempt is preceded by a random delay of up to [`LOCK_MAX_JITTER`].
//! Near-simultaneous starters can otherwise both observe a free lock on some
//! platforms; the jitter makes that unlikely but does not rule it out.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use tokio::time::Instant;

use crate::constants::{LOCK_MAX_JITTER, LOCK_RETRY_INTERVAL, LOCK_TIMEOUT};
use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct ProcessLock {
    path: PathBuf,
    timeout: Duration,
    max_jitter: Duration,
}

impl ProcessLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: LOCK_TIMEOUT,
            max_jitter: LOCK_MAX_JITTER,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until the lock is held or the timeout elapses.
    ///
    /// The token file is created (empty) if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::LockTimeout`] when another process keeps the lock
    /// for longer than the configured timeout, or an I/O error when the token
    /// file cannot be opened or locked.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn acquire(&self) -> Result<LockHandle, AppError> {
        let file = ensure_token(&self.path)?;
        let deadline = Instant::now() + self.timeout;
        let mut attempts: u32 = 0;

        loop {
            tokio::time::sleep(self.jitter()).await;
            attempts += 1;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!(attempts, "acquired process lock");
                    return Ok(LockHandle {
                        file,
                        path: self.path.clone(),
                    });
                }
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    tracing::trace!(attempts, "process lock is held elsewhere");
                }
                Err(err) => return Err(err.into()),
            }

            if Instant::now() >= deadline {
                tracing::error!(attempts, "gave up waiting for the process lock");
                return Err(AppError::LockTimeout(self.timeout));
            }

            tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
        }
    }

    fn jitter(&self) -> Duration {
        let max = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(fastrand::u64(..=max))
    }
}

fn ensure_token(path: &Path) -> Result<File, AppError> {
    // append keeps an existing token untouched; a new one stays zero-length
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(file)
}

/// Exclusive ownership of the process lock. Released on drop.
#[derive(Debug)]
pub struct LockHandle {
    file: File,
    path: PathBuf,
}

impl LockHandle {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        match FileExt::unlock(&self.file) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "released process lock"),
            Err(err) => tracing::warn!(error = %err, "failed to release process lock"),
        }
    }
}
