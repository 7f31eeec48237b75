// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Desktop notification for failures nobody sees on a terminal.
//!
//! When the AWS CLI or an SDK runs the credential process, stderr is usually
//! captured and never shown. The user is told through the desktop instead:
//! an `osascript` dialog with an "Open Log" button on macOS, `notify-send`
//! elsewhere.

use std::path::Path;

use anyhow::{Result, bail};
use tokio::process::Command;

use crate::errors::AppError;

const TITLE: &str = "AWS credentials from 1Password";
const MAX_MESSAGE_CHARS: usize = 400;
#[cfg(target_os = "macos")]
const DIALOG_TIMEOUT_SECS: u32 = 60;
#[cfg(target_os = "macos")]
const OPEN_LOG_BUTTON: &str = "Open Log";

fn summary(error: &AppError) -> String {
    let message = error.to_string();
    if message.chars().count() <= MAX_MESSAGE_CHARS {
        return message;
    }
    let truncated: String = message.chars().take(MAX_MESSAGE_CHARS).collect();
    format!("{truncated}…")
}

/// Tells the user about `error` and offers to open `log_file`.
#[tracing::instrument(skip(error))]
pub async fn notify_failure(error: &AppError, log_file: &Path) -> Result<()> {
    let message = summary(error);
    show(&message, log_file).await
}

#[cfg(target_os = "macos")]
async fn show(message: &str, log_file: &Path) -> Result<()> {
    let script = format!(
        "display dialog \"{}\" with title \"{}\" buttons {{\"Dismiss\", \"{OPEN_LOG_BUTTON}\"}} \
         default button \"{OPEN_LOG_BUTTON}\" with icon caution giving up after {DIALOG_TIMEOUT_SECS}",
        applescript_escape(message),
        applescript_escape(TITLE),
    );

    let output = Command::new("osascript").args(["-e", &script]).output().await?;
    if !output.status.success() {
        bail!(
            "osascript failed: {}",
            String::from_utf8_lossy(output.stderr.as_slice()).trim()
        );
    }

    let answer = String::from_utf8_lossy(output.stdout.as_slice());
    if answer.contains(&format!("button returned:{OPEN_LOG_BUTTON}")) {
        Command::new("open").arg(log_file).status().await?;
    }

    Ok(())
}

#[cfg(not(target_os = "macos"))]
async fn show(message: &str, log_file: &Path) -> Result<()> {
    let body = format!("{message}\n\nLog file: {}", log_file.display());

    let output = Command::new("notify-send")
        .args(["--urgency=critical", "--app-name=op-credential-process", TITLE])
        .arg(body)
        .output()
        .await?;

    if !output.status.success() {
        bail!(
            "notify-send failed: {}",
            String::from_utf8_lossy(output.stderr.as_slice()).trim()
        );
    }

    Ok(())
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn applescript_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
