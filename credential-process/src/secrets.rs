// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Resolution of long-lived AWS key material from 1Password.
//!
//! A [`SecretSource`] returns the named fields of an item; [`SecretResolver`]
//! validates them into a [`SecretRecord`]. The production source is
//! [`OpCli`], which shells out to the 1Password CLI.
//!
//! # Item layout
//!
//! | Label | Required | Meaning |
//! |-------|----------|---------|
//! | `accessKeyId` | yes | IAM access key ID |
//! | `secretAccessKey` | yes | IAM secret access key |
//! | `mfaSerial` | with an OTP field | ARN of the IAM MFA device |
//! | any field of type OTP | with `mfaSerial` | TOTP seed; 1Password returns the current code |

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use crate::constants::{
    DEFAULT_OP_CLI, FIELD_ACCESS_KEY_ID, FIELD_MFA_SERIAL, FIELD_SECRET_ACCESS_KEY, FIELD_TOTP,
    OP_FIELD_TYPE_OTP,
};
use crate::errors::AppError;
use crate::models::{MfaDevice, SecretRecord};

/// Field name to value, as returned by a [`SecretSource`].
pub type SecretFields = BTreeMap<String, Value>;

/// Looks up a secrets-manager item and returns its named fields.
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn fetch_fields(
        &self,
        item: &str,
        vault: Option<&str>,
        account: Option<&str>,
    ) -> Result<SecretFields, AppError>;
}

/// [`SecretSource`] backed by the `op` command line tool.
#[derive(Debug, Clone)]
pub struct OpCli {
    program: String,
}

impl Default for OpCli {
    fn default() -> Self {
        Self::new(DEFAULT_OP_CLI)
    }
}

impl OpCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpItem {
    #[serde(default)]
    fields: Vec<OpField>,
}

#[derive(Debug, Deserialize)]
struct OpField {
    #[serde(rename = "type", default)]
    field_type: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    totp: Option<Value>,
}

#[async_trait]
impl SecretSource for OpCli {
    /// Runs `op item get <item> --format json` and extracts the known fields.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the item does not exist ([`AppError::SecretNotFound`])
    /// - the name matches several items ([`AppError::SecretAmbiguous`])
    /// - `op` fails for any other reason ([`AppError::RunError`])
    /// - the output is not the expected JSON
    #[tracing::instrument(skip(self))]
    async fn fetch_fields(
        &self,
        item: &str,
        vault: Option<&str>,
        account: Option<&str>,
    ) -> Result<SecretFields, AppError> {
        let mut command = Command::new(&self.program);
        command.args(["item", "get", item, "--format", "json"]);
        if let Some(vault) = vault {
            command.args(["--vault", vault]);
        }
        if let Some(account) = account {
            command.args(["--account", account]);
        }

        let output = command.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(output.stderr.as_slice()).to_string();
            return Err(classify_op_failure(item, output.status.code(), stderr));
        }

        let parsed: OpItem = serde_json::from_slice(output.stdout.as_slice())?;
        let fields = extract_fields(parsed);

        tracing::debug!(fields = ?fields.keys().collect::<Vec<_>>(), "fetched 1Password item");

        Ok(fields)
    }
}

fn classify_op_failure(item: &str, code: Option<i32>, stderr: String) -> AppError {
    if stderr.contains("isn't an item") {
        AppError::SecretNotFound(item.to_string())
    } else if stderr.contains("More than one item matches") {
        AppError::SecretAmbiguous(item.to_string())
    } else {
        AppError::RunError(code, stderr.trim().to_string())
    }
}

fn extract_fields(item: OpItem) -> SecretFields {
    let mut fields = SecretFields::new();
    for field in item.fields {
        if field.field_type == OP_FIELD_TYPE_OTP {
            if let Some(code) = field.totp {
                fields.insert(FIELD_TOTP.to_string(), code);
            }
            continue;
        }

        let Some(label) = field.label else { continue };
        if matches!(
            label.as_str(),
            FIELD_ACCESS_KEY_ID | FIELD_SECRET_ACCESS_KEY | FIELD_MFA_SERIAL
        ) {
            if let Some(value) = field.value {
                fields.insert(label, value);
            }
        }
    }
    fields
}

/// Resolves and validates secret records.
#[derive(Debug, Clone)]
pub struct SecretResolver<S> {
    source: S,
}

impl<S: SecretSource> SecretResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    #[tracing::instrument(skip(self))]
    pub async fn resolve(
        &self,
        item: &str,
        vault: Option<&str>,
        account: Option<&str>,
    ) -> Result<SecretRecord, AppError> {
        let fields = self.source.fetch_fields(item, vault, account).await?;
        let record = validate_fields(&fields)?;

        tracing::debug!(mfa = record.mfa().is_some(), "resolved secret record");

        Ok(record)
    }
}

/// Converts a field map into a [`SecretRecord`], reporting every problem at
/// once.
pub fn validate_fields(fields: &SecretFields) -> Result<SecretRecord, AppError> {
    let mut problems = Vec::new();

    for name in fields.keys() {
        if !matches!(
            name.as_str(),
            FIELD_ACCESS_KEY_ID | FIELD_SECRET_ACCESS_KEY | FIELD_MFA_SERIAL | FIELD_TOTP
        ) {
            problems.push(format!("unexpected field `{name}`"));
        }
    }

    let access_key_id = required_string(fields, FIELD_ACCESS_KEY_ID, &mut problems);
    let secret_access_key = required_string(fields, FIELD_SECRET_ACCESS_KEY, &mut problems);

    let mfa = match (fields.get(FIELD_MFA_SERIAL), fields.get(FIELD_TOTP)) {
        (None, None) => None,
        (Some(_), None) => {
            problems.push(format!("`{FIELD_MFA_SERIAL}` is set but `{FIELD_TOTP}` is missing"));
            None
        }
        (None, Some(_)) => {
            problems.push(format!("`{FIELD_TOTP}` is set but `{FIELD_MFA_SERIAL}` is missing"));
            None
        }
        (Some(_), Some(_)) => {
            let serial = required_string(fields, FIELD_MFA_SERIAL, &mut problems);
            let totp = required_string(fields, FIELD_TOTP, &mut problems);
            if let Some(code) = &totp
                && !code.chars().all(|c| c.is_ascii_digit())
            {
                problems.push(format!("`{FIELD_TOTP}` must contain only digits"));
            }
            serial.zip(totp)
        }
    };

    if !problems.is_empty() {
        return Err(AppError::InvalidSecretSchema(problems.join("; ")));
    }

    // every branch that leaves a value unset also records a problem
    match (access_key_id, secret_access_key, mfa) {
        (Some(access_key_id), Some(secret_access_key), None) => {
            Ok(SecretRecord::plain(access_key_id, secret_access_key))
        }
        (Some(access_key_id), Some(secret_access_key), Some((serial, totp))) => Ok(
            SecretRecord::with_mfa(access_key_id, secret_access_key, MfaDevice::new(serial, totp)),
        ),
        _ => Err(AppError::InvalidSecretSchema(
            "incomplete secret record".to_string(),
        )),
    }
}

fn required_string(fields: &SecretFields, name: &str, problems: &mut Vec<String>) -> Option<String> {
    match fields.get(name) {
        None => {
            problems.push(format!("missing field `{name}`"));
            None
        }
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Some(Value::String(_)) => {
            problems.push(format!("field `{name}` is empty"));
            None
        }
        Some(other) => {
            problems.push(format!("field `{name}` must be a string, got {}", type_name(other)));
            None
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
