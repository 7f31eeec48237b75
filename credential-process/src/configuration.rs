// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::constants::DEFAULT_OP_CLI;
use crate::models::CredentialKey;

const STATE_DIR_FLAG: &str = "--state-dir";
const DEFAULT_COMMAND: &str = "authenticate";
const PASSTHROUGH_ARGS: [&str; 7] = [
    "authenticate",
    "purge",
    "help",
    "-h",
    "--help",
    "-V",
    "--version",
];

/// AWS `credential_process` provider backed by 1Password.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the lock, cache and log files (defaults to the OS temp dir)
    #[arg(long, global = true, env("OP_CREDENTIAL_PROCESS_STATE_DIR"))]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Print temporary AWS credentials for the AWS CLI/SDK (default command)
    Authenticate(AuthenticateOptions),
    /// Remove log files, cached credentials and/or the lock file
    Purge(PurgeOptions),
}

#[derive(Debug, Clone, Args)]
pub struct AuthenticateOptions {
    /// Name or ID of the 1Password item holding the AWS keys
    #[arg(long)]
    pub op_item: String,
    /// 1Password vault to look the item up in
    #[arg(long)]
    pub op_vault: Option<String>,
    /// 1Password account (sign-in address or ID)
    #[arg(long)]
    pub op_account: Option<String>,
    /// Assume this role instead of requesting a plain session token
    #[arg(long)]
    pub role_arn: Option<String>,
    /// Session name for the assumed role
    #[arg(long)]
    pub role_session_name: Option<String>,
    /// Requested session duration, in seconds or as e.g. "1h", "90m"
    #[arg(long = "duration", value_name = "DURATION", value_parser = parse_duration_seconds)]
    pub duration_seconds: Option<i32>,
    /// Log debug output to stderr
    #[arg(long, default_value = "false", action = ArgAction::SetTrue)]
    pub debug: bool,
    /// Skip the cached credentials and always call STS
    #[arg(long, default_value = "false", action = ArgAction::SetTrue)]
    pub no_cache: bool,
    /// Path of the 1Password CLI
    #[arg(long, default_value = DEFAULT_OP_CLI, env("OP_CLI"))]
    pub op_cli: String,
}

impl Default for AuthenticateOptions {
    fn default() -> Self {
        AuthenticateOptions {
            op_item: String::new(),
            op_vault: None,
            op_account: None,
            role_arn: None,
            role_session_name: None,
            duration_seconds: None,
            debug: false,
            no_cache: false,
            op_cli: DEFAULT_OP_CLI.to_string(),
        }
    }
}

impl AuthenticateOptions {
    pub fn credential_key(&self) -> CredentialKey {
        CredentialKey::new(
            self.op_account.as_deref(),
            self.op_vault.as_deref(),
            &self.op_item,
            self.role_arn.as_deref(),
            self.role_session_name.as_deref(),
        )
    }

    pub fn use_cache(&self) -> bool {
        !self.no_cache
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct PurgeOptions {
    /// Remove log files
    #[arg(long, default_value = "false", action = ArgAction::SetTrue)]
    pub logs: bool,
    /// Remove cached credentials
    #[arg(long, default_value = "false", action = ArgAction::SetTrue)]
    pub cache: bool,
    /// Remove the lock file
    #[arg(long, default_value = "false", action = ArgAction::SetTrue)]
    pub lock: bool,
}

impl PurgeOptions {
    /// No flag at all means everything.
    pub fn everything(&self) -> bool {
        !(self.logs || self.cache || self.lock)
    }
}

/// Parses a duration given as whole seconds or as a humantime string.
pub fn parse_duration_seconds(value: &str) -> Result<i32, String> {
    let value = value.trim();
    let seconds = match value.parse::<u64>() {
        Ok(seconds) => seconds,
        Err(_) => humantime::parse_duration(value)
            .map_err(|err| format!("invalid duration `{value}`: {err}"))?
            .as_secs(),
    };

    if seconds == 0 {
        return Err(format!("duration `{value}` must be at least one second"));
    }

    i32::try_from(seconds).map_err(|_| format!("duration `{value}` is too long"))
}

/// Inserts the `authenticate` subcommand when the arguments do not name one,
/// so the AWS config can use `credential_process = op-credential-process --op-item ...`.
pub fn with_default_command<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();

    // skip the program name and any leading --state-dir
    let mut index = 1;
    while let Some(arg) = args.get(index).and_then(|arg| arg.to_str()) {
        if arg == STATE_DIR_FLAG {
            index += 2;
        } else if arg.starts_with("--state-dir=") {
            index += 1;
        } else {
            break;
        }
    }

    let named = args
        .get(index)
        .and_then(|arg| arg.to_str())
        .is_some_and(|arg| PASSTHROUGH_ARGS.contains(&arg));

    if !named && index <= args.len() {
        args.insert(index, OsString::from(DEFAULT_COMMAND));
    }

    args
}
