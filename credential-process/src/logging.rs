// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Tracing setup.
//!
//! stdout is reserved for the credential document, so console output goes to
//! stderr. Each `authenticate` invocation also writes a JSON log at debug
//! level to its own file in the state directory, whatever the console
//! verbosity.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::paths::StatePaths;

const CONSOLE_DEFAULT_FILTER: &str = "warn";
const DEBUG_FILTER: &str = "info,op_credential_process=debug";

/// The per-invocation log file. Pending lines are flushed when it is dropped.
pub struct LogFile {
    path: PathBuf,
    _guard: WorkerGuard,
}

impl LogFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn console_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new(DEBUG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(CONSOLE_DEFAULT_FILTER))
    }
}

/// Installs the stderr and log file layers and returns the log file.
pub fn init(paths: &StatePaths, debug: bool) -> Result<LogFile> {
    let file_name = StatePaths::log_file_name(Utc::now(), std::process::id());
    let path = paths.root().join(&file_name);

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(&file_name)
        .build(paths.root())
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(appender);

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter(debug));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_ansi(false)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::new(DEBUG_FILTER));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LogFile {
        path,
        _guard: guard,
    })
}

/// Console-only logging for the administrative commands.
pub fn init_console(debug: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(console_filter(debug))
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}
