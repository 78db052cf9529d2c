//! Command-level tests of `sign` and `get-key` against the in-memory token.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tkey_sign_cli::commands::get_key::{self, GetKeyArgs};
use tkey_sign_cli::commands::sign::{self, SignArgs};
use tkey_sign_cli::commands::DeviceArgs;
use tkey_sign_cli::reporter::ConsoleReporter;
use tkey_sign_lib::digest::Framing;
use tkey_sign_lib::envelope;
use tkey_sign_lib::record::{PublicKey, Signature};
use tkey_sign_lib::signing::public_key_comment;
use tkey_sign_lib::test_utils::{test_public_key, write_file, MockToken, TEST_APP_IMAGE};
use tkey_sign_lib::verify::OfflineVerifier;
use tkey_sign_lib::SignError;
use tokio_util::sync::CancellationToken;

fn sign_args(file: PathBuf, app: Option<PathBuf>) -> SignArgs {
    SignArgs {
        file,
        device: DeviceArgs {
            app,
            speed: 62_500,
            ..DeviceArgs::default()
        },
        framing: Framing::Digest,
        public: None,
        signature: None,
        force: true,
    }
}

#[tokio::test]
async fn test_sign_writes_verifiable_envelope() {
    let dir = TempDir::new().unwrap();
    let message = write_file(dir.path(), "release.tar", "payload");
    let app = write_file(dir.path(), "signer.bin", TEST_APP_IMAGE);
    let token = MockToken::in_firmware_mode();
    let reporter = Arc::new(ConsoleReporter::new());

    let args = sign_args(message.clone(), Some(app));
    sign::run(
        &token.connector(),
        &args,
        reporter.clone(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let sig_path = dir.path().join("release.tar.sig");
    let loaded = envelope::read::<Signature>(&sig_path).unwrap();
    assert!(loaded.comment.contains("framing=sha512-v1"));
    assert_eq!(token.load_calls(), 1);
    assert_eq!(token.close_calls(), 1);

    let key_path = dir.path().join("key.pub");
    envelope::write(&key_path, &test_public_key(), &public_key_comment(), false).unwrap();
    OfflineVerifier::new(reporter, Framing::Digest)
        .verify_files(&message, &sig_path, &key_path)
        .unwrap();
}

#[tokio::test]
async fn test_sign_with_wrong_expected_key() {
    let dir = TempDir::new().unwrap();
    let message = write_file(dir.path(), "m", "m");
    let mut other = test_public_key();
    other.key[0] ^= 0x80;
    let key_path = write_file(dir.path(), "other.pub", format!("{}\n", other.to_hex()));
    let token = MockToken::running_app();

    let mut args = sign_args(message, None);
    args.public = Some(key_path);
    let err = sign::run(
        &token.connector(),
        &args,
        Arc::new(ConsoleReporter::new()),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SignError>(),
        Some(SignError::IdentityMismatch { .. })
    ));
    assert_eq!(token.sign_calls(), 0);
    assert!(!dir.path().join("m.sig").exists());
}

#[tokio::test]
async fn test_self_verification_failure_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let message = write_file(dir.path(), "m", "m");
    let token = MockToken::running_app().tampering();

    let err = sign::run(
        &token.connector(),
        &sign_args(message, None),
        Arc::new(ConsoleReporter::new()),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SignError>(),
        Some(SignError::SelfVerificationFailed)
    ));
    assert!(!dir.path().join("m.sig").exists());
}

#[tokio::test]
async fn test_interrupt_while_waiting_for_touch() {
    let dir = TempDir::new().unwrap();
    let message = write_file(dir.path(), "m", "m");
    let token = MockToken::running_app().blocking_sign();
    let cancel = CancellationToken::new();

    let waiter = token.clone();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        waiter.wait_for_sign().await;
        trigger.cancel();
    });

    let args = sign_args(message, None);
    let reporter = Arc::new(ConsoleReporter::new());
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        sign::run(&token.connector(), &args, reporter, cancel),
    )
    .await
    .expect("interrupt did not end the command")
    .unwrap_err();

    let sign_err = err.downcast_ref::<SignError>().unwrap();
    assert!(matches!(sign_err, SignError::Interrupted));
    assert_eq!(sign_err.exit_code(), 1);
    assert_eq!(token.close_calls(), 1);
    assert!(!dir.path().join("m.sig").exists());
}

#[tokio::test]
async fn test_get_key_writes_envelope() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("tkey.pub");
    let token = MockToken::running_app();

    let args = GetKeyArgs {
        device: DeviceArgs::default(),
        output: Some(out.clone()),
        force: false,
    };
    get_key::run(
        &token.connector(),
        &args,
        Arc::new(ConsoleReporter::new()),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let loaded = envelope::read::<PublicKey>(&out).unwrap();
    assert_eq!(loaded.record, test_public_key());
    assert_eq!(token.sign_calls(), 0);
}
