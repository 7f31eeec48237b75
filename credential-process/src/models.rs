// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::fmt;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{CREDENTIAL_PROCESS_VERSION, KEY_PLACEHOLDER, KEY_SEPARATOR};

/// Identifies one logical credential request.
///
/// Used as the stem of the cache file name, so the value is restricted to
/// `[A-Za-z0-9%._-]`. Each present component keeps ASCII alphanumerics and `-`
/// and escapes every other byte as `%XX`; an absent component is written as
/// [`KEY_PLACEHOLDER`]. Components are joined with [`KEY_SEPARATOR`]. Neither
/// the placeholder nor the separator can appear inside an escaped component,
/// so two different requests never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey(String);

impl CredentialKey {
    pub fn new(
        account: Option<&str>,
        vault: Option<&str>,
        item: &str,
        role_arn: Option<&str>,
        role_session_name: Option<&str>,
    ) -> Self {
        let components = [account, vault, Some(item), role_arn, role_session_name];

        let mut key = String::new();
        for (index, component) in components.iter().enumerate() {
            if index > 0 {
                key.push(KEY_SEPARATOR);
            }
            match component {
                Some(value) => escape_component(&mut key, value),
                None => key.push_str(KEY_PLACEHOLDER),
            }
        }

        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_component(out: &mut String, value: &str) {
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(char::from(byte));
        } else {
            // writing to a String cannot fail
            let _ = write!(out, "%{byte:02X}");
        }
    }
}

/// MFA device registered for the IAM user, paired with its current code.
#[derive(Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct MfaDevice {
    serial: String,
    totp: String,
}

impl MfaDevice {
    pub fn new(serial: impl Into<String>, totp: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            totp: totp.into(),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn totp(&self) -> &str {
        &self.totp
    }
}

impl fmt::Debug for MfaDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MfaDevice")
            .field("serial", &self.serial)
            .field("totp", &"[REDACTED]")
            .finish()
    }
}

/// Long-lived key material resolved from 1Password.
///
/// The MFA capability is all-or-nothing: either no device, or a serial
/// together with a code.
#[derive(Clone, PartialEq, ZeroizeOnDrop)]
pub struct SecretRecord {
    access_key_id: String,
    secret_access_key: String,
    mfa: Option<MfaDevice>,
}

impl SecretRecord {
    pub fn plain(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            mfa: None,
        }
    }

    pub fn with_mfa(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        mfa: MfaDevice,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            mfa: Some(mfa),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn mfa(&self) -> Option<&MfaDevice> {
        self.mfa.as_ref()
    }
}

// Custom Debug implementation to prevent accidental logging of sensitive data
impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("mfa", &self.mfa)
            .finish()
    }
}

/// Temporary credentials issued by STS, as cached on disk.
#[derive(Clone, PartialEq, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct SessionCredentials {
    #[serde(rename = "AccessKeyId")]
    access_key_id: String,

    #[serde(rename = "SecretAccessKey")]
    secret_access_key: String,

    #[serde(rename = "SessionToken")]
    session_token: String,

    #[serde(rename = "Expiration")]
    #[zeroize(skip)]
    expiration: DateTime<Utc>,
}

impl SessionCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expiration: DateTime<Utc>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
            expiration,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    /// Credentials expiring exactly at `now` are already expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// The document printed on stdout for the AWS CLI/SDK.
#[derive(Serialize)]
pub struct CredentialProcessOutput<'a> {
    #[serde(rename = "Version")]
    version: u8,

    #[serde(flatten)]
    credentials: &'a SessionCredentials,
}

impl<'a> From<&'a SessionCredentials> for CredentialProcessOutput<'a> {
    fn from(credentials: &'a SessionCredentials) -> Self {
        Self {
            version: CREDENTIAL_PROCESS_VERSION,
            credentials,
        }
    }
}
