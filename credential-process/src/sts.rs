// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Exchange of long-lived keys for temporary STS credentials.
//!
//! [`TokenService`] is the seam to AWS STS and reports raw upstream failures;
//! [`SessionExchanger`] chooses between `GetSessionToken` and `AssumeRole`,
//! fills in defaults and classifies failures. Only an MFA code rejection is
//! reported as [`AppError::InvalidMfaCode`], which the orchestrator may retry.

use std::fmt::Debug;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use chrono::{DateTime, Utc};

use crate::constants::{
    DEFAULT_STS_REGION, INVALID_MFA_ERROR_CODE, INVALID_MFA_ERROR_MESSAGE,
    ROLE_SESSION_NAME_PREFIX, STATIC_CREDENTIALS_PROVIDER,
};
use crate::errors::AppError;
use crate::models::{SecretRecord, SessionCredentials};

/// The STS call to make. MFA parameters come from the secret record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRequest {
    Session {
        duration_seconds: Option<i32>,
    },
    AssumeRole {
        role_arn: String,
        role_session_name: String,
        duration_seconds: Option<i32>,
    },
}

/// Failure reported by the token issuance service, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    pub code: Option<String>,
    pub message: Option<String>,
    /// Full rendering of the error, surfaced verbatim to the user.
    pub detail: String,
}

impl UpstreamError {
    pub fn from_sdk<E, R>(err: &SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: Debug,
    {
        Self {
            code: err.code().map(str::to_string),
            message: err.message().map(str::to_string),
            detail: DisplayErrorContext(err).to_string(),
        }
    }

    /// STS answers a stale or reused one-time code with this exact error.
    pub fn is_invalid_mfa_code(&self) -> bool {
        self.code.as_deref() == Some(INVALID_MFA_ERROR_CODE)
            && self
                .message
                .as_deref()
                .is_some_and(|message| message.trim() == INVALID_MFA_ERROR_MESSAGE)
    }
}

/// Issues temporary credentials. `Ok(None)` means the call succeeded without
/// a credentials payload.
#[async_trait]
pub trait TokenService: Send + Sync {
    async fn issue(
        &self,
        secret: &SecretRecord,
        request: &TokenRequest,
    ) -> Result<Option<SessionCredentials>, UpstreamError>;
}

/// [`TokenService`] backed by `aws-sdk-sts`.
#[derive(Debug, Clone)]
pub struct StsTokenService {
    config: aws_sdk_sts::config::Builder,
}

impl StsTokenService {
    /// Loads region and endpoint settings from the ambient AWS configuration.
    ///
    /// The ambient credentials chain is never used: every call signs with the
    /// key material from the secret record.
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self::new(&sdk_config)
    }

    pub fn new(sdk_config: &SdkConfig) -> Self {
        let region = sdk_config
            .region()
            .cloned()
            .unwrap_or_else(|| Region::new(DEFAULT_STS_REGION));

        let config = aws_sdk_sts::config::Builder::from(sdk_config).region(region);

        Self { config }
    }

    fn client(&self, secret: &SecretRecord) -> aws_sdk_sts::Client {
        let credentials = Credentials::new(
            secret.access_key_id(),
            secret.secret_access_key(),
            None,
            None,
            STATIC_CREDENTIALS_PROVIDER,
        );

        let config = self.config.clone().credentials_provider(credentials).build();
        aws_sdk_sts::Client::from_conf(config)
    }
}

#[async_trait]
impl TokenService for StsTokenService {
    #[tracing::instrument(skip(self, secret))]
    async fn issue(
        &self,
        secret: &SecretRecord,
        request: &TokenRequest,
    ) -> Result<Option<SessionCredentials>, UpstreamError> {
        let client = self.client(secret);
        let serial_number = secret.mfa().map(|mfa| mfa.serial().to_string());
        let token_code = secret.mfa().map(|mfa| mfa.totp().to_string());

        let credentials = match request {
            TokenRequest::Session { duration_seconds } => client
                .get_session_token()
                .set_duration_seconds(*duration_seconds)
                .set_serial_number(serial_number)
                .set_token_code(token_code)
                .send()
                .await
                .map_err(|err| UpstreamError::from_sdk(&err))?
                .credentials,
            TokenRequest::AssumeRole {
                role_arn,
                role_session_name,
                duration_seconds,
            } => client
                .assume_role()
                .role_arn(role_arn)
                .role_session_name(role_session_name)
                .set_duration_seconds(*duration_seconds)
                .set_serial_number(serial_number)
                .set_token_code(token_code)
                .send()
                .await
                .map_err(|err| UpstreamError::from_sdk(&err))?
                .credentials,
        };

        credentials.as_ref().map(convert_credentials).transpose()
    }
}

fn convert_credentials(
    credentials: &aws_sdk_sts::types::Credentials,
) -> Result<SessionCredentials, UpstreamError> {
    let expiration = credentials.expiration();
    let expiration = DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos())
        .ok_or_else(|| UpstreamError {
            code: None,
            message: None,
            detail: format!("expiration out of range: {expiration}"),
        })?;

    Ok(SessionCredentials::new(
        credentials.access_key_id(),
        credentials.secret_access_key(),
        credentials.session_token(),
        expiration,
    ))
}

/// Default `RoleSessionName` when the caller does not supply one.
pub fn default_role_session_name(now: DateTime<Utc>) -> String {
    format!("{ROLE_SESSION_NAME_PREFIX}-{}", now.timestamp())
}

pub struct SessionExchanger<T> {
    service: T,
}

impl<T: TokenService> SessionExchanger<T> {
    pub fn new(service: T) -> Self {
        Self { service }
    }

    /// Requests temporary credentials for `secret`.
    ///
    /// Without `role_arn` this is a plain session token request; with it, a
    /// role assumption under `role_session_name` (or a generated name).
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidMfaCode`] when STS rejects the one-time code
    /// - [`AppError::SessionExchangeFailed`] for every other failure, and when
    ///   STS returns no credentials
    #[tracing::instrument(skip(self, secret))]
    pub async fn exchange(
        &self,
        secret: &SecretRecord,
        role_arn: Option<&str>,
        role_session_name: Option<&str>,
        duration_seconds: Option<i32>,
    ) -> Result<SessionCredentials, AppError> {
        let request = match role_arn {
            None => TokenRequest::Session { duration_seconds },
            Some(role_arn) => TokenRequest::AssumeRole {
                role_arn: role_arn.to_string(),
                role_session_name: role_session_name
                    .map(str::to_string)
                    .unwrap_or_else(|| default_role_session_name(Utc::now())),
                duration_seconds,
            },
        };

        match self.service.issue(secret, &request).await {
            Ok(Some(credentials)) => {
                tracing::info!(
                    expiration = %credentials.expiration(),
                    "obtained temporary credentials"
                );
                Ok(credentials)
            }
            Ok(None) => Err(AppError::SessionExchangeFailed(
                "no credentials returned".to_string(),
            )),
            Err(err) if err.is_invalid_mfa_code() => {
                tracing::warn!(detail = %err.detail, "STS rejected the MFA code");
                Err(AppError::InvalidMfaCode)
            }
            Err(err) => {
                tracing::error!(detail = %err.detail, "STS request failed");
                Err(AppError::SessionExchangeFailed(err.detail))
            }
        }
    }
}
