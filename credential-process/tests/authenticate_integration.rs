// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! End-to-end tests of the acquisition sequence.
//!
//! 1Password and STS are replaced by scripted fakes; the cache and the lock
//! use real files in a temporary state directory.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use op_credential_process::authenticate::Authenticator;
use op_credential_process::cache::CacheStore;
use op_credential_process::configuration::AuthenticateOptions;
use op_credential_process::constants::{INVALID_MFA_ERROR_CODE, INVALID_MFA_ERROR_MESSAGE};
use op_credential_process::errors::AppError;
use op_credential_process::lock::ProcessLock;
use op_credential_process::models::{CredentialProcessOutput, SecretRecord, SessionCredentials};
use op_credential_process::paths::StatePaths;
use op_credential_process::secrets::{SecretFields, SecretResolver, SecretSource};
use op_credential_process::sts::{SessionExchanger, TokenRequest, TokenService, UpstreamError};
use serde_json::json;
use tempfile::TempDir;

type StsResponse = Result<Option<SessionCredentials>, UpstreamError>;

/// Returns scripted field maps and counts lookups. Each lookup holds for
/// `hold`, so overlapping lookups can be detected.
#[derive(Clone, Default)]
struct FakeOnePassword {
    responses: Arc<Mutex<VecDeque<Result<SecretFields, AppError>>>>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    hold: Duration,
}

impl FakeOnePassword {
    fn new(responses: Vec<Result<SecretFields, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretSource for FakeOnePassword {
    async fn fetch_fields(
        &self,
        _item: &str,
        _vault: Option<&str>,
        _account: Option<&str>,
    ) -> Result<SecretFields, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        tokio::time::sleep(self.hold).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected 1Password lookup")
    }
}

/// Returns scripted STS answers and records every request with the code used.
#[derive(Clone, Default)]
struct FakeSts {
    responses: Arc<Mutex<VecDeque<StsResponse>>>,
    requests: Arc<Mutex<Vec<(Option<String>, TokenRequest)>>>,
}

impl FakeSts {
    fn new(responses: Vec<StsResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            ..Self::default()
        }
    }

    fn requests(&self) -> Vec<(Option<String>, TokenRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenService for FakeSts {
    async fn issue(&self, secret: &SecretRecord, request: &TokenRequest) -> StsResponse {
        let code = secret.mfa().map(|mfa| mfa.totp().to_string());
        self.requests.lock().unwrap().push((code, request.clone()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected STS request")
    }
}

fn plain_fields() -> SecretFields {
    serde_json::from_value(json!({
        "accessKeyId": "AKIAEXAMPLE",
        "secretAccessKey": "secret"
    }))
    .unwrap()
}

fn mfa_fields(totp: &str) -> SecretFields {
    serde_json::from_value(json!({
        "accessKeyId": "AKIAEXAMPLE",
        "secretAccessKey": "secret",
        "mfaSerial": "arn:aws:iam::123456789012:mfa/me",
        "totp": totp
    }))
    .unwrap()
}

fn session(name: &str, expiration: DateTime<Utc>) -> SessionCredentials {
    SessionCredentials::new(
        format!("ASIA{name}"),
        format!("secret-{name}"),
        format!("token-{name}"),
        expiration,
    )
}

fn in_one_hour() -> DateTime<Utc> {
    Utc::now() + chrono::Duration::seconds(3600)
}

fn invalid_mfa() -> UpstreamError {
    UpstreamError {
        code: Some(INVALID_MFA_ERROR_CODE.to_string()),
        message: Some(INVALID_MFA_ERROR_MESSAGE.to_string()),
        detail: "AccessDenied: MultiFactorAuthentication failed".to_string(),
    }
}

fn options() -> AuthenticateOptions {
    AuthenticateOptions {
        op_item: "aws-prod".to_string(),
        op_vault: Some("Private".to_string()),
        ..AuthenticateOptions::default()
    }
}

fn authenticator(
    dir: &TempDir,
    secrets: &FakeOnePassword,
    sts: &FakeSts,
) -> Authenticator<FakeOnePassword, FakeSts> {
    let paths = StatePaths::new(dir.path());
    Authenticator::new(
        SecretResolver::new(secrets.clone()),
        SessionExchanger::new(sts.clone()),
        CacheStore::new(paths.clone()),
        ProcessLock::new(paths.lock_file()),
    )
}

fn cache(dir: &TempDir) -> CacheStore {
    CacheStore::new(StatePaths::new(dir.path()))
}

#[tokio::test(start_paused = true)]
async fn test_cold_start_without_mfa() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = FakeOnePassword::new(vec![Ok(plain_fields())]);
    let expected = session("COLD", in_one_hour());
    let sts = FakeSts::new(vec![Ok(Some(expected.clone()))]);

    let credentials = authenticator(&dir, &secrets, &sts)
        .authenticate(&options())
        .await
        .unwrap();

    assert_eq!(credentials, expected);
    assert_eq!(
        sts.requests(),
        vec![(
            None,
            TokenRequest::Session {
                duration_seconds: None
            }
        )]
    );

    let output = serde_json::to_value(CredentialProcessOutput::from(&credentials)).unwrap();
    assert_eq!(output["Version"], 1);
    assert_eq!(output["AccessKeyId"], "ASIACOLD");
    assert_eq!(output["SecretAccessKey"], "secret-COLD");
    assert_eq!(output["SessionToken"], "token-COLD");
    assert!(output["Expiration"].is_string());

    let key = options().credential_key();
    assert!(cache(&dir).path_for(&key).exists());
    assert_eq!(cache(&dir).read(&key), Some(expected));
}

#[tokio::test(start_paused = true)]
async fn test_warm_cache_skips_1password_and_sts() {
    let dir = tempfile::tempdir().unwrap();
    let cached = session("CACHED", Utc::now() + chrono::Duration::minutes(10));
    cache(&dir)
        .write(&options().credential_key(), &cached)
        .unwrap();

    let secrets = FakeOnePassword::new(vec![]);
    let sts = FakeSts::new(vec![]);

    let credentials = authenticator(&dir, &secrets, &sts)
        .authenticate(&options())
        .await
        .unwrap();

    assert_eq!(credentials, cached);
    assert_eq!(secrets.calls(), 0);
    assert!(sts.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_expired_cache_entry_triggers_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let stale = session("STALE", Utc::now() - chrono::Duration::minutes(1));
    cache(&dir).write(&options().credential_key(), &stale).unwrap();

    let fresh = session("FRESH", in_one_hour());
    let secrets = FakeOnePassword::new(vec![Ok(plain_fields())]);
    let sts = FakeSts::new(vec![Ok(Some(fresh.clone()))]);

    let credentials = authenticator(&dir, &secrets, &sts)
        .authenticate(&options())
        .await
        .unwrap();

    assert_eq!(credentials, fresh);
    assert_eq!(cache(&dir).read(&options().credential_key()), Some(fresh));
}

#[tokio::test(start_paused = true)]
async fn test_no_cache_bypasses_valid_entry_and_still_writes() {
    let dir = tempfile::tempdir().unwrap();
    let cached = session("CACHED", in_one_hour());
    cache(&dir)
        .write(&options().credential_key(), &cached)
        .unwrap();

    let fresh = session("FRESH", in_one_hour());
    let secrets = FakeOnePassword::new(vec![Ok(plain_fields())]);
    let sts = FakeSts::new(vec![Ok(Some(fresh.clone()))]);
    let options = AuthenticateOptions {
        no_cache: true,
        ..options()
    };

    let credentials = authenticator(&dir, &secrets, &sts)
        .authenticate(&options)
        .await
        .unwrap();

    assert_eq!(credentials, fresh);
    assert_eq!(secrets.calls(), 1);
    assert_eq!(cache(&dir).read(&options.credential_key()), Some(fresh));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_mfa_code_is_retried_with_next_code() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = FakeOnePassword::new(vec![Ok(mfa_fields("111111")), Ok(mfa_fields("222222"))]);
    let second = session("SECOND", in_one_hour());
    let sts = FakeSts::new(vec![Err(invalid_mfa()), Ok(Some(second.clone()))]);

    let started = tokio::time::Instant::now();
    let credentials = authenticator(&dir, &secrets, &sts)
        .authenticate(&options())
        .await
        .unwrap();

    assert_eq!(credentials, second);
    assert_eq!(secrets.calls(), 2);
    let codes: Vec<_> = sts.requests().into_iter().map(|(code, _)| code).collect();
    assert_eq!(
        codes,
        vec![Some("111111".to_string()), Some("222222".to_string())]
    );
    // waited for the next 30 s window plus the 3 s margin
    assert!(started.elapsed() >= Duration::from_secs(4));
    assert_eq!(cache(&dir).read(&options().credential_key()), Some(second));
}

#[tokio::test(start_paused = true)]
async fn test_second_invalid_mfa_code_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = FakeOnePassword::new(vec![
        Ok(mfa_fields("111111")),
        Ok(mfa_fields("222222")),
        Ok(mfa_fields("333333")),
    ]);
    let sts = FakeSts::new(vec![
        Err(invalid_mfa()),
        Err(invalid_mfa()),
        Ok(Some(session("NEVER", in_one_hour()))),
    ]);

    let result = authenticator(&dir, &secrets, &sts)
        .authenticate(&options())
        .await;

    assert_eq!(result.unwrap_err(), AppError::InvalidMfaCode);
    assert_eq!(sts.requests().len(), 2);
    assert_eq!(secrets.calls(), 2);
    assert!(!cache(&dir).path_for(&options().credential_key()).exists());
}

#[tokio::test(start_paused = true)]
async fn test_other_sts_failures_are_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = FakeOnePassword::new(vec![Ok(plain_fields())]);
    let sts = FakeSts::new(vec![Err(UpstreamError {
        code: Some("AccessDenied".to_string()),
        message: Some("User is not authorized to perform: sts:AssumeRole".to_string()),
        detail: "AccessDenied: User is not authorized".to_string(),
    })]);

    let result = authenticator(&dir, &secrets, &sts)
        .authenticate(&options())
        .await;

    assert_eq!(
        result.unwrap_err(),
        AppError::SessionExchangeFailed("AccessDenied: User is not authorized".to_string())
    );
    assert_eq!(sts.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_role_assumption_generates_session_name() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = FakeOnePassword::new(vec![Ok(plain_fields())]);
    let sts = FakeSts::new(vec![Ok(Some(session("ROLE", in_one_hour())))]);
    let options = AuthenticateOptions {
        role_arn: Some("arn:aws:iam::123456789012:role/Admin".to_string()),
        duration_seconds: Some(900),
        ..options()
    };

    authenticator(&dir, &secrets, &sts)
        .authenticate(&options)
        .await
        .unwrap();

    let requests = sts.requests();
    assert_eq!(requests.len(), 1);
    let TokenRequest::AssumeRole {
        role_arn,
        role_session_name,
        duration_seconds,
    } = &requests[0].1
    else {
        panic!("expected an AssumeRole request");
    };
    assert_eq!(role_arn, "arn:aws:iam::123456789012:role/Admin");
    assert_eq!(*duration_seconds, Some(900));
    let suffix = role_session_name
        .strip_prefix("op-credential-process-")
        .expect("generated session name prefix");
    assert!(!suffix.is_empty());
    assert!(suffix.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_schema_fails_and_releases_lock() {
    let dir = tempfile::tempdir().unwrap();
    let mut fields = plain_fields();
    fields.insert("mfaSerial".to_string(), json!("arn:aws:iam::1:mfa/me"));
    let secrets = FakeOnePassword::new(vec![Ok(fields)]);
    let sts = FakeSts::new(vec![]);

    let result = authenticator(&dir, &secrets, &sts)
        .authenticate(&options())
        .await;

    assert!(matches!(result, Err(AppError::InvalidSecretSchema(_))));
    assert!(sts.requests().is_empty());

    let lock = ProcessLock::new(StatePaths::new(dir.path()).lock_file())
        .with_timeout(Duration::from_secs(1));
    assert!(lock.acquire().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_secret_not_found_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = FakeOnePassword::new(vec![Err(AppError::SecretNotFound("aws-prod".into()))]);
    let sts = FakeSts::new(vec![]);

    let result = authenticator(&dir, &secrets, &sts)
        .authenticate(&options())
        .await;

    assert_eq!(
        result.unwrap_err(),
        AppError::SecretNotFound("aws-prod".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_invocations_do_not_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let mut secrets = FakeOnePassword::new(vec![Ok(plain_fields()), Ok(plain_fields())]);
    secrets.hold = Duration::from_secs(2);
    let sts = FakeSts::new(vec![
        Ok(Some(session("ONE", in_one_hour()))),
        Ok(Some(session("TWO", in_one_hour()))),
    ]);
    let options = AuthenticateOptions {
        no_cache: true,
        ..options()
    };

    let first = authenticator(&dir, &secrets, &sts);
    let second = authenticator(&dir, &secrets, &sts);
    let (a, b) = tokio::join!(first.authenticate(&options), second.authenticate(&options));

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(secrets.calls(), 2);
    assert_eq!(secrets.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waiter_times_out_while_lock_is_held() {
    let dir = tempfile::tempdir().unwrap();
    let holder = ProcessLock::new(StatePaths::new(dir.path()).lock_file());
    let _held = holder.acquire().await.unwrap();

    let secrets = FakeOnePassword::new(vec![]);
    let sts = FakeSts::new(vec![]);

    let result = authenticator(&dir, &secrets, &sts)
        .authenticate(&options())
        .await;

    assert_eq!(
        result.unwrap_err(),
        AppError::LockTimeout(Duration::from_secs(30))
    );
    assert_eq!(secrets.calls(), 0);
}
