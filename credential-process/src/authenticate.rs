// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! The credential acquisition sequence.
//!
//! ```text
//! acquire lock ─┬─ cache hit ──────────────────────────────────────────┐
//!               └─ resolve ─ exchange ─┬─ ok ─ write cache ────────────┤
//!                                      └─ invalid MFA code (1st time)  │
//!                                         wait for next TOTP window    │
//!                                         resolve ─ exchange ─ ...     │
//! release lock <───────────────────────────────────────────────────────┘
//! ```
//!
//! The lock handle lives for the whole of [`Authenticator::authenticate`], so
//! it is released on every return path, including errors.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::CacheStore;
use crate::configuration::AuthenticateOptions;
use crate::constants::{MAX_EXCHANGE_ATTEMPTS, MFA_RETRY_MARGIN, TOTP_PERIOD_SECS};
use crate::errors::AppError;
use crate::lock::ProcessLock;
use crate::models::SessionCredentials;
use crate::secrets::{SecretResolver, SecretSource};
use crate::sts::{SessionExchanger, TokenService};

pub struct Authenticator<S, T> {
    resolver: SecretResolver<S>,
    exchanger: SessionExchanger<T>,
    cache: CacheStore,
    lock: ProcessLock,
}

impl<S: SecretSource, T: TokenService> Authenticator<S, T> {
    pub fn new(
        resolver: SecretResolver<S>,
        exchanger: SessionExchanger<T>,
        cache: CacheStore,
        lock: ProcessLock,
    ) -> Self {
        Self {
            resolver,
            exchanger,
            cache,
            lock,
        }
    }

    /// Returns credentials for `options`, from the cache or from STS.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the process lock cannot be obtained in time
    /// - the 1Password item cannot be resolved or is malformed
    /// - STS rejects the request (an invalid MFA code only after one retry)
    #[tracing::instrument(skip_all, fields(item = %options.op_item, key = %options.credential_key()))]
    pub async fn authenticate(
        &self,
        options: &AuthenticateOptions,
    ) -> Result<SessionCredentials, AppError> {
        let key = options.credential_key();
        let _lock = self.lock.acquire().await?;

        if options.use_cache() {
            if let Some(credentials) = self.cache.read(&key) {
                tracing::info!(
                    expiration = %credentials.expiration(),
                    "using cached credentials"
                );
                return Ok(credentials);
            }
        } else {
            tracing::debug!("cache read skipped");
        }

        let credentials = self.exchange_with_retry(options).await?;

        if let Err(err) = self.cache.write(&key, &credentials) {
            tracing::warn!(error = %err, "failed to cache credentials");
        }

        Ok(credentials)
    }

    async fn exchange_with_retry(
        &self,
        options: &AuthenticateOptions,
    ) -> Result<SessionCredentials, AppError> {
        let mut attempt = 1;
        loop {
            match self.resolve_and_exchange(options).await {
                Err(err) if err.is_retryable_mfa() && attempt < MAX_EXCHANGE_ATTEMPTS => {
                    let wait = mfa_retry_delay(SystemTime::now());
                    tracing::warn!(
                        attempt,
                        wait_secs = wait.as_secs(),
                        "MFA code was rejected, retrying with the next code"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn resolve_and_exchange(
        &self,
        options: &AuthenticateOptions,
    ) -> Result<SessionCredentials, AppError> {
        let secret = self
            .resolver
            .resolve(
                &options.op_item,
                options.op_vault.as_deref(),
                options.op_account.as_deref(),
            )
            .await?;

        self.exchanger
            .exchange(
                &secret,
                options.role_arn.as_deref(),
                options.role_session_name.as_deref(),
                options.duration_seconds,
            )
            .await
    }
}

/// Time until the next TOTP window opens, plus a safety margin.
pub fn mfa_retry_delay(now: SystemTime) -> Duration {
    let unix_secs = now
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    let remaining = TOTP_PERIOD_SECS - unix_secs % TOTP_PERIOD_SECS;
    Duration::from_secs(remaining) + MFA_RETRY_MARGIN
}
