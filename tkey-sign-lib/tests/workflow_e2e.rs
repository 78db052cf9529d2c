//! End-to-end signing and verification against the in-memory token.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tkey_sign_lib::prelude::*;
use tkey_sign_lib::record::RAW_SIG_LEN;
use tkey_sign_lib::signing::public_key_comment;
use tkey_sign_lib::test_utils::{
    test_public_key, write_file, CapturingReporter, MockConnector, MockDevice, MockToken,
    TEST_APP_IMAGE,
};
use tokio_util::sync::CancellationToken;

fn open(
    connector: &MockConnector,
    reporter: &Arc<CapturingReporter>,
) -> Result<DeviceSession<MockDevice>> {
    DeviceSession::connect(
        connector,
        SessionConfig::default(),
        reporter.clone(),
        CancellationToken::new(),
    )
}

async fn ready_session(
    token: &MockToken,
    reporter: &Arc<CapturingReporter>,
) -> DeviceSession<MockDevice> {
    let mut session = open(&token.connector(), reporter).unwrap();
    session
        .ensure_app(Some(TEST_APP_IMAGE), &NoSecret)
        .await
        .unwrap();
    session
}

// ============================================================================
// Sign then verify
// ============================================================================

#[tokio::test]
async fn test_sign_then_verify_offline() {
    let dir = TempDir::new().unwrap();
    let message = write_file(dir.path(), "hello.txt", "hello");
    let token = MockToken::in_firmware_mode();
    let reporter = CapturingReporter::shared();

    let mut session = ready_session(&token, &reporter).await;
    assert_eq!(session.state(), SessionState::Ready);

    let request = SignRequest::from_file(&message, Framing::Digest).unwrap();
    let signed = SigningOrchestrator::new(reporter.clone())
        .sign(&mut session, None, &request)
        .await
        .unwrap();
    session.close();

    let sig_path = SignRequest::default_signature_path(&message);
    let key_path = dir.path().join("key.pub");
    let comment = signed.signature_comment();
    envelope::write(&sig_path, &signed.signature, &comment, false).unwrap();
    envelope::write(&key_path, &signed.public_key, &public_key_comment(), false).unwrap();

    let verified = OfflineVerifier::new(reporter.clone(), Framing::Message)
        .verify_files(&message, &sig_path, &key_path)
        .unwrap();
    assert_eq!(verified.framing, Framing::Digest);
    assert_eq!(verified.public_key, test_public_key());

    assert!(reporter.contains("Signer app loaded."));
    assert!(reporter.contains("SHA512 hash: "));
    assert!(reporter.contains("Public Key from TKey: "));
    assert!(reporter.contains("Signature verified."));
    assert_eq!(token.close_calls(), 1);
}

#[tokio::test]
async fn test_each_framing_verifies() {
    let dir = TempDir::new().unwrap();
    let message = write_file(dir.path(), "notes.md", "# release notes\n");
    let token = MockToken::running_app();
    let reporter = CapturingReporter::shared();
    let mut session = ready_session(&token, &reporter).await;

    for (i, framing) in [Framing::Message, Framing::Digest, Framing::DigestFile]
        .into_iter()
        .enumerate()
    {
        let request = SignRequest::from_file(&message, framing).unwrap();
        let signed = SigningOrchestrator::new(reporter.clone())
            .sign(&mut session, None, &request)
            .await
            .unwrap();
        assert_eq!(token.last_payload().unwrap(), request.payload);

        let sig_path = dir.path().join(format!("notes.{}.sig", i));
        let key_path = dir.path().join(format!("key.{}.pub", i));
        let comment = signed.signature_comment();
        envelope::write(&sig_path, &signed.signature, &comment, false).unwrap();
        envelope::write(&key_path, &signed.public_key, &public_key_comment(), false).unwrap();

        let verified = OfflineVerifier::new(reporter.clone(), Framing::default())
            .verify_files(&message, &sig_path, &key_path)
            .unwrap();
        assert_eq!(verified.framing, framing);
    }
}

#[tokio::test]
async fn test_hex_files_use_default_framing() {
    let dir = TempDir::new().unwrap();
    let message = write_file(dir.path(), "m.bin", [1u8, 2, 3]);
    let token = MockToken::running_app();
    let reporter = CapturingReporter::shared();
    let mut session = ready_session(&token, &reporter).await;

    let request = SignRequest::from_file(&message, Framing::Message).unwrap();
    let signed = SigningOrchestrator::new(reporter.clone())
        .sign(&mut session, None, &request)
        .await
        .unwrap();

    let sig_hex = format!("{}\n", signed.signature.to_hex());
    let key_hex = format!("{}\r\n", signed.public_key.to_hex());
    let sig_path = write_file(dir.path(), "m.sig.hex", sig_hex);
    let key_path = write_file(dir.path(), "k.hex", key_hex);

    let verifier = OfflineVerifier::new(reporter.clone(), Framing::Message);
    let result = verifier.verify_files(&message, &sig_path, &key_path);
    assert!(result.is_ok());

    let err = OfflineVerifier::new(reporter, Framing::Digest)
        .verify_files(&message, &sig_path, &key_path)
        .unwrap_err();
    assert!(matches!(err, SignError::VerificationFailed(_)));
}

#[tokio::test]
async fn test_modified_message_fails_verification() {
    let dir = TempDir::new().unwrap();
    let message = write_file(dir.path(), "hello.txt", "hello");
    let token = MockToken::running_app();
    let reporter = CapturingReporter::shared();
    let mut session = ready_session(&token, &reporter).await;

    let request = SignRequest::from_file(&message, Framing::Digest).unwrap();
    let signed = SigningOrchestrator::new(reporter.clone())
        .sign(&mut session, None, &request)
        .await
        .unwrap();
    let sig_path = dir.path().join("hello.txt.sig");
    let key_path = dir.path().join("key.pub");
    let comment = signed.signature_comment();
    envelope::write(&sig_path, &signed.signature, &comment, false).unwrap();
    envelope::write(&key_path, &signed.public_key, &public_key_comment(), false).unwrap();

    std::fs::write(&message, "hellO").unwrap();
    let err = OfflineVerifier::new(reporter, Framing::Digest)
        .verify_files(&message, &sig_path, &key_path)
        .unwrap_err();
    assert!(matches!(err, SignError::VerificationFailed(_)));
    assert!(!err.is_corruption());
}

// ============================================================================
// Corrupt input files
// ============================================================================

#[tokio::test]
async fn test_truncated_signature_is_decode_error() {
    let dir = TempDir::new().unwrap();
    let message = write_file(dir.path(), "hello.txt", "hello");
    let token = MockToken::running_app();
    let reporter = CapturingReporter::shared();
    let mut session = ready_session(&token, &reporter).await;

    let request = SignRequest::from_file(&message, Framing::Digest).unwrap();
    let signed = SigningOrchestrator::new(reporter.clone())
        .sign(&mut session, None, &request)
        .await
        .unwrap();

    let text = envelope::encode(&signed.signature, &signed.signature_comment());
    let mut lines: Vec<&str> = text.lines().collect();
    let short = &lines[1][..lines[1].len() - 1];
    lines[1] = short;
    let sig_path = write_file(dir.path(), "hello.txt.sig", lines.join("\n"));
    let key_path = dir.path().join("key.pub");
    envelope::write(&key_path, &signed.public_key, &public_key_comment(), false).unwrap();

    let err = OfflineVerifier::new(reporter, Framing::Digest)
        .verify_files(&message, &sig_path, &key_path)
        .unwrap_err();
    assert!(err.is_corruption(), "unexpected error: {}", err);
    assert!(!matches!(err, SignError::VerificationFailed(_)));
}

#[test]
fn test_unknown_framing_tag_is_decode_error() {
    let dir = TempDir::new().unwrap();
    let message = write_file(dir.path(), "m", "m");
    let sig = Signature::new([0u8; RAW_SIG_LEN]);
    let sig_path = dir.path().join("m.sig");
    envelope::write(&sig_path, &sig, "framing=sha3-v9", false).unwrap();
    let key_path = dir.path().join("k.pub");
    envelope::write(&key_path, &test_public_key(), "k", false).unwrap();

    let err = OfflineVerifier::new(CapturingReporter::shared(), Framing::Digest)
        .verify_files(&message, &sig_path, &key_path)
        .unwrap_err();
    assert!(matches!(err, SignError::Decode { .. }));
}

#[test]
fn test_foreign_algorithm_is_decode_error() {
    let dir = TempDir::new().unwrap();
    let message = write_file(dir.path(), "m", "m");
    let mut key = test_public_key();
    key.alg = *b"Xx";
    let key_path = dir.path().join("k.pub");
    envelope::write(&key_path, &key, "k", false).unwrap();
    let sig_path = dir.path().join("m.sig");
    envelope::write(&sig_path, &Signature::new([0u8; 64]), "s", false).unwrap();

    let err = OfflineVerifier::new(CapturingReporter::shared(), Framing::Digest)
        .verify_files(&message, &sig_path, &key_path)
        .unwrap_err();
    assert!(matches!(err, SignError::Decode { .. }));
}

// ============================================================================
// Identity guard and self-verification
// ============================================================================

#[tokio::test]
async fn test_identity_mismatch_aborts_before_signing() {
    let token = MockToken::running_app();
    let reporter = CapturingReporter::shared();
    let mut session = ready_session(&token, &reporter).await;

    let mut other = test_public_key();
    other.key[31] ^= 0x01;

    let request = SignRequest::from_message(b"hello", "hello", Framing::Digest).unwrap();
    let err = SigningOrchestrator::new(reporter)
        .sign(&mut session, Some(&other), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, SignError::IdentityMismatch { .. }));
    assert_eq!(token.sign_calls(), 0);
}

#[tokio::test]
async fn test_matching_identity_signs() {
    let token = MockToken::running_app();
    let reporter = CapturingReporter::shared();
    let mut session = ready_session(&token, &reporter).await;

    let request = SignRequest::from_message(b"hello", "hello", Framing::Digest).unwrap();
    SigningOrchestrator::new(reporter)
        .sign(&mut session, Some(&test_public_key()), &request)
        .await
        .unwrap();
    assert_eq!(token.sign_calls(), 1);
}

#[tokio::test]
async fn test_tampered_signature_is_never_returned() {
    let token = MockToken::running_app().tampering();
    let reporter = CapturingReporter::shared();
    let mut session = ready_session(&token, &reporter).await;

    let request = SignRequest::from_message(b"hello", "hello", Framing::Digest).unwrap();
    let err = SigningOrchestrator::new(reporter.clone())
        .sign(&mut session, None, &request)
        .await
        .unwrap_err();

    assert!(matches!(err, SignError::SelfVerificationFailed));
    assert!(!reporter.contains("Signature verified."));
}

#[test]
fn test_oversized_message_never_contacts_device() {
    let token = MockToken::running_app();
    let big = vec![b'a'; 4097];

    let err = SignRequest::from_message(&big, "big", Framing::Message).unwrap_err();
    assert!(matches!(err, SignError::MessageTooLarge { size: 4097, .. }));
    assert_eq!(token.connected_path(), None);
    assert_eq!(token.sign_calls(), 0);
}

// ============================================================================
// App loading and identity
// ============================================================================

#[tokio::test]
async fn test_uss_changes_key() {
    let dir = TempDir::new().unwrap();
    let uss = write_file(dir.path(), "uss", "correct horse\n");
    let token = MockToken::in_firmware_mode();
    let reporter = CapturingReporter::shared();

    let mut session = open(&token.connector(), &reporter).unwrap();
    session
        .ensure_app(Some(TEST_APP_IMAGE), &SecretFile(uss))
        .await
        .unwrap();
    let key = session.public_key().await.unwrap();

    assert_eq!(key, MockToken::public_key_for(Some(b"correct horse\n")));
    assert_ne!(key, test_public_key());
    assert_eq!(token.load_calls(), 1);
}

#[tokio::test]
async fn test_app_already_loaded_skips_load() {
    let dir = TempDir::new().unwrap();
    let uss = write_file(dir.path(), "uss", "secret");
    let token = MockToken::running_app();
    let reporter = CapturingReporter::shared();

    let mut session = open(&token.connector(), &reporter).unwrap();
    session
        .ensure_app(Some(TEST_APP_IMAGE), &SecretFile(uss))
        .await
        .unwrap();

    assert_eq!(token.load_calls(), 0);
    assert_eq!(
        reporter.warnings(),
        vec!["App already loaded, your USS won't be used.".to_string()]
    );
    assert_eq!(session.public_key().await.unwrap(), test_public_key());
}

#[tokio::test]
async fn test_uss_not_read_when_app_running() {
    let token = MockToken::running_app();
    let reporter = CapturingReporter::shared();

    let mut session = open(&token.connector(), &reporter).unwrap();
    let missing = SecretFile("/nonexistent/uss".into());
    assert!(session.ensure_app(None, &missing).await.is_ok());
}

#[tokio::test]
async fn test_wrong_application() {
    let token = MockToken::running_app().with_app_name("tk1 ", "ssh ");
    let reporter = CapturingReporter::shared();

    let mut session = open(&token.connector(), &reporter).unwrap();
    let err = session
        .ensure_app(Some(TEST_APP_IMAGE), &NoSecret)
        .await
        .unwrap_err();
    assert!(matches!(err, SignError::WrongApplication));
    assert_ne!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_firmware_mode_without_image() {
    let token = MockToken::in_firmware_mode();
    let reporter = CapturingReporter::shared();

    let mut session = open(&token.connector(), &reporter).unwrap();
    let err = session.ensure_app(None, &NoSecret).await.unwrap_err();
    assert!(matches!(err, SignError::LoadFailed(_)));
    assert_eq!(token.load_calls(), 0);
}

#[tokio::test]
async fn test_load_failure_is_not_retried() {
    let token = MockToken::in_firmware_mode().failing_load();
    let reporter = CapturingReporter::shared();

    let mut session = open(&token.connector(), &reporter).unwrap();
    let err = session
        .ensure_app(Some(TEST_APP_IMAGE), &NoSecret)
        .await
        .unwrap_err();
    assert!(matches!(err, SignError::LoadFailed(_)));
    assert_eq!(token.load_calls(), 1);
}

#[tokio::test]
async fn test_operations_require_ready_state() {
    let token = MockToken::running_app();
    let reporter = CapturingReporter::shared();

    let mut session = open(&token.connector(), &reporter).unwrap();
    let err = session.request_signature(b"x").await.unwrap_err();
    assert!(matches!(err, SignError::InvalidState { .. }));
    assert_eq!(token.sign_calls(), 0);
}

// ============================================================================
// Port selection
// ============================================================================

#[test]
fn test_no_device_found() {
    let token = MockToken::running_app().with_ports(Vec::<String>::new());
    let err = open(&token.connector(), &CapturingReporter::shared())
        .err()
        .unwrap();
    assert!(matches!(err, SignError::DeviceNotFound(_)));
}

#[test]
fn test_several_devices_need_explicit_port() {
    let token = MockToken::running_app().with_ports(["/dev/ttyACM0", "/dev/ttyACM1"]);
    let reporter = CapturingReporter::shared();

    let err = open(&token.connector(), &reporter).err().unwrap();
    assert!(err.to_string().contains("/dev/ttyACM1"));

    let session = DeviceSession::connect(
        &token.connector(),
        SessionConfig::with_port("/dev/ttyACM1"),
        reporter.clone(),
        CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(session.port(), "/dev/ttyACM1");
    assert_eq!(token.connected_path().as_deref(), Some("/dev/ttyACM1"));
    assert!(reporter.contains("Connecting to TKey on serial port /dev/ttyACM1 ..."));
}

#[test]
fn test_connect_failure_is_transport_error() {
    let token = MockToken::running_app().failing_connect();
    let err = open(&token.connector(), &CapturingReporter::shared())
        .err()
        .unwrap();
    assert!(matches!(err, SignError::Transport { .. }));
}

// ============================================================================
// Interrupts and teardown
// ============================================================================

#[tokio::test]
async fn test_interrupt_during_sign_closes_once() {
    let token = MockToken::running_app().blocking_sign();
    let reporter = CapturingReporter::shared();
    let cancel = CancellationToken::new();

    let mut session = DeviceSession::connect(
        &token.connector(),
        SessionConfig::default(),
        reporter.clone(),
        cancel.clone(),
    )
    .unwrap();
    session.ensure_app(None, &NoSecret).await.unwrap();

    let waiter = token.clone();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        waiter.wait_for_sign().await;
        trigger.cancel();
    });

    let request = SignRequest::from_message(b"hello", "hello", Framing::Digest).unwrap();
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        SigningOrchestrator::new(reporter.clone()).sign(&mut session, None, &request),
    )
    .await
    .expect("cancellation did not end the signing wait")
    .unwrap_err();

    assert!(matches!(err, SignError::Interrupted));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(token.close_calls(), 1);

    session.close();
    drop(session);
    assert_eq!(token.close_calls(), 1);
}

#[tokio::test]
async fn test_cancelled_before_connect() {
    let token = MockToken::running_app();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = DeviceSession::connect(
        &token.connector(),
        SessionConfig::default(),
        CapturingReporter::shared(),
        cancel,
    )
    .err()
    .unwrap();
    assert!(matches!(err, SignError::Interrupted));
    assert_eq!(token.connected_path(), None);
}

#[tokio::test]
async fn test_drop_closes_device() {
    let token = MockToken::running_app();
    {
        let _session = open(&token.connector(), &CapturingReporter::shared()).unwrap();
    }
    assert_eq!(token.close_calls(), 1);
}

#[tokio::test]
async fn test_no_touch_warning() {
    let token = MockToken::running_app();
    let reporter = CapturingReporter::shared();
    let config = SessionConfig {
        no_touch: true,
        ..SessionConfig::default()
    };

    let mut session = DeviceSession::connect(
        &token.connector(),
        config,
        reporter.clone(),
        CancellationToken::new(),
    )
    .unwrap();
    session.ensure_app(None, &NoSecret).await.unwrap();
    session.request_signature(b"x").await.unwrap();

    assert!(reporter.contains("touch requirement removed"));
    assert!(!reporter.contains("flash green"));
}
