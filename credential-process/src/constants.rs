// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::time::Duration;

/// `Version` value required by the AWS `credential_process` protocol.
pub const CREDENTIAL_PROCESS_VERSION: u8 = 1;

// Files kept in the shared state directory
pub const CACHE_FILE_PREFIX: &str = "op-credential-process-cache-";
pub const CACHE_FILE_EXTENSION: &str = "json";
pub const LOG_FILE_PREFIX: &str = "op-credential-process-log-";
pub const LOG_FILE_EXTENSION: &str = "log";
pub const LOCK_FILE_NAME: &str = "op-credential-process.lock";

pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound of the random delay taken before every lock attempt.
pub const LOCK_MAX_JITTER: Duration = Duration::from_millis(500);
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

pub const TOTP_PERIOD_SECS: u64 = 30;
pub const MFA_RETRY_MARGIN: Duration = Duration::from_secs(3);
/// The first exchange plus a single retry after an invalid one-time code.
pub const MAX_EXCHANGE_ATTEMPTS: u32 = 2;

pub const ROLE_SESSION_NAME_PREFIX: &str = "op-credential-process";
pub const DEFAULT_STS_REGION: &str = "us-east-1";
pub const STATIC_CREDENTIALS_PROVIDER: &str = "op-credential-process";

// STS rejection of a reused or stale one-time code
pub const INVALID_MFA_ERROR_CODE: &str = "AccessDenied";
pub const INVALID_MFA_ERROR_MESSAGE: &str =
    "MultiFactorAuthentication failed with invalid MFA one time pass code.";

pub const DEFAULT_OP_CLI: &str = "op";

// 1Password field labels understood by the secret resolver
pub const FIELD_ACCESS_KEY_ID: &str = "accessKeyId";
pub const FIELD_SECRET_ACCESS_KEY: &str = "secretAccessKey";
pub const FIELD_MFA_SERIAL: &str = "mfaSerial";
pub const FIELD_TOTP: &str = "totp";
pub const OP_FIELD_TYPE_OTP: &str = "OTP";

/// Stands in for an absent component of a credential key.
pub const KEY_PLACEHOLDER: &str = "_";
pub const KEY_SEPARATOR: char = '.';
