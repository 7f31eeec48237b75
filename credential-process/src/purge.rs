// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::fmt;
use std::io::ErrorKind;

use crate::configuration::PurgeOptions;
use crate::constants::{
    CACHE_FILE_EXTENSION, CACHE_FILE_PREFIX, LOG_FILE_EXTENSION, LOG_FILE_PREFIX,
};
use crate::errors::AppError;
use crate::paths::StatePaths;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub logs: usize,
    pub cache_entries: usize,
    pub lock: bool,
}

impl fmt::Display for PurgeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "removed {} log file(s), {} cache file(s){}",
            self.logs,
            self.cache_entries,
            if self.lock { " and the lock file" } else { "" }
        )
    }
}

fn has_prefix_and_extension(name: &str, prefix: &str, extension: &str) -> bool {
    name.starts_with(prefix)
        && name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext == extension)
}

/// Deletes this tool's files from the state directory. Only names carrying
/// the tool's prefixes are touched.
///
/// Removing the lock file while another invocation holds it breaks mutual
/// exclusion for that invocation; run this when no credential process is
/// active.
#[tracing::instrument]
pub fn purge(paths: &StatePaths, options: &PurgeOptions) -> Result<PurgeReport, AppError> {
    let everything = options.everything();
    let mut report = PurgeReport::default();

    for entry in std::fs::read_dir(paths.root())? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };

        if (everything || options.logs)
            && has_prefix_and_extension(name, LOG_FILE_PREFIX, LOG_FILE_EXTENSION)
        {
            std::fs::remove_file(entry.path())?;
            tracing::debug!(name, "removed log file");
            report.logs += 1;
        } else if (everything || options.cache)
            && has_prefix_and_extension(name, CACHE_FILE_PREFIX, CACHE_FILE_EXTENSION)
        {
            std::fs::remove_file(entry.path())?;
            tracing::debug!(name, "removed cache file");
            report.cache_entries += 1;
        }
    }

    if everything || options.lock {
        match std::fs::remove_file(paths.lock_file()) {
            Ok(()) => report.lock = true,
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }

    tracing::info!(%report, "purge finished");
    Ok(report)
}
