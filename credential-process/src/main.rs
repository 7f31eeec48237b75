// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::io::{IsTerminal, Write};
use std::process::ExitCode;

use clap::Parser;
use op_credential_process::authenticate::Authenticator;
use op_credential_process::cache::CacheStore;
use op_credential_process::configuration::{
    AuthenticateOptions, Cli, Commands, PurgeOptions, with_default_command,
};
use op_credential_process::errors::AppError;
use op_credential_process::lock::ProcessLock;
use op_credential_process::models::{CredentialProcessOutput, SessionCredentials};
use op_credential_process::paths::StatePaths;
use op_credential_process::secrets::{OpCli, SecretResolver};
use op_credential_process::sts::{SessionExchanger, StsTokenService};
use op_credential_process::{logging, notify, purge};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_from(with_default_command(std::env::args_os()));
    let paths = StatePaths::resolve(cli.state_dir);

    match cli.command {
        Commands::Authenticate(options) => authenticate(&options, paths).await,
        Commands::Purge(options) => run_purge(&options, &paths),
    }
}

async fn authenticate(options: &AuthenticateOptions, paths: StatePaths) -> ExitCode {
    if let Err(err) = paths.ensure() {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    // dropped at the end of this function, which flushes the log file
    let log_file = match logging::init(&paths, options.debug) {
        Ok(log_file) => log_file,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    tracing::debug!(?options, log_file = %log_file.path().display(), "starting");

    let authenticator = Authenticator::new(
        SecretResolver::new(OpCli::new(&options.op_cli)),
        SessionExchanger::new(StsTokenService::from_env().await),
        CacheStore::new(paths.clone()),
        ProcessLock::new(paths.lock_file()),
    );

    let result = authenticator
        .authenticate(options)
        .await
        .and_then(|credentials| print_credentials(&credentials));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "failed to obtain credentials");
            eprintln!("error: {err}");
            eprintln!("log file: {}", log_file.path().display());

            if !std::io::stderr().is_terminal()
                && let Err(notify_err) = notify::notify_failure(&err, log_file.path()).await
            {
                tracing::warn!(error = %notify_err, "failed to show desktop notification");
            }

            ExitCode::FAILURE
        }
    }
}

fn print_credentials(credentials: &SessionCredentials) -> Result<(), AppError> {
    let body = serde_json::to_string_pretty(&CredentialProcessOutput::from(credentials))?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{body}")?;
    stdout.flush()?;

    Ok(())
}

fn run_purge(options: &PurgeOptions, paths: &StatePaths) -> ExitCode {
    if let Err(err) = logging::init_console(false) {
        eprintln!("error: {err:#}");
    }

    match paths.ensure().and_then(|()| purge::purge(paths, options)) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
