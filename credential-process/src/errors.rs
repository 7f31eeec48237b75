// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::path::PathBuf;
use std::time::Duration;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum AppError {
    #[error("1Password item not found: {0}")]
    SecretNotFound(String),
    #[error("more than one 1Password item matches: {0}")]
    SecretAmbiguous(String),
    #[error("invalid secret schema: {0}")]
    InvalidSecretSchema(String),
    #[error("STS rejected the MFA one-time code")]
    InvalidMfaCode,
    #[error("session exchange failed: {0}")]
    SessionExchangeFailed(String),
    #[error("timed out after {0:?} waiting for the process lock")]
    LockTimeout(Duration),
    #[error("invalid cache entry {path:?}: {reason}")]
    CacheReadInvalid { path: PathBuf, reason: String },
    #[error("error running command: {0:?} {1}")]
    RunError(Option<i32>, String),
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("i/o error: {0}")]
    IoError(String),
    #[error("json error: {0}")]
    JsonError(String),
}

impl AppError {
    /// Whether the single wait-and-retry cycle applies to this failure.
    pub fn is_retryable_mfa(&self) -> bool {
        matches!(self, Self::InvalidMfaCode)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(source: serde_json::Error) -> Self {
        tracing::error!("{:?}", source);
        AppError::JsonError(source.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(source: std::io::Error) -> Self {
        tracing::error!("{:?}", source);
        AppError::IoError(source.to_string())
    }
}
