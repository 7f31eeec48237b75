// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! # op-credential-process
//!
//! An AWS `credential_process` provider that keeps long-lived IAM keys in
//! 1Password and hands out temporary STS credentials.
//!
//! ## Architecture
//!
//! ```text
//! AWS CLI/SDK -> op-credential-process -> process lock
//!                        |                   |
//!                        |                   +-> cache (valid entry? done)
//!                        |                   +-> `op item get` (keys, MFA serial, TOTP)
//!                        |                   +-> STS GetSessionToken / AssumeRole
//!                        |                   +-> cache write
//!                        +-> stdout: {"Version": 1, "AccessKeyId": ..., ...}
//! ```
//!
//! Invocations for several profiles often start at the same moment. They run
//! one at a time under a machine-wide file lock, because a TOTP code is only
//! valid for 30 seconds and STS rejects a code that was already used. When
//! that happens anyway, the request is retried once with the next code.
//!
//! ## Modules
//!
//! - [`authenticate`]: the acquisition sequence and MFA retry policy
//! - [`cache`]: on-disk cache of temporary credentials
//! - [`configuration`]: CLI argument parsing with clap
//! - [`constants`]: file names, timeouts and matching strings
//! - [`errors`]: application error type
//! - [`lock`]: cross-process advisory lock
//! - [`logging`]: stderr and per-invocation log file
//! - [`models`]: credential key, secret record and session credentials
//! - [`notify`]: desktop notification on failure
//! - [`paths`]: layout of the shared state directory
//! - [`purge`]: removal of log, cache and lock files
//! - [`secrets`]: 1Password lookup and validation
//! - [`sts`]: STS exchange and error classification
//!
//! ## Usage
//!
//! ```ini
//! [profile prod]
//! credential_process = op-credential-process --op-item "AWS prod" --role-arn arn:aws:iam::123456789012:role/Admin
//! ```
//!
//! ## Security Considerations
//!
//! - Key material and session credentials are zeroized on drop and redacted
//!   from `Debug` output
//! - Cache files are created with mode 0600 and replaced atomically
//! - Nothing but the credential document is ever written to stdout

pub mod authenticate;
pub mod cache;
pub mod configuration;
pub mod constants;
pub mod errors;
pub mod lock;
pub mod logging;
pub mod models;
pub mod notify;
pub mod paths;
pub mod purge;
pub mod secrets;
pub mod sts;
