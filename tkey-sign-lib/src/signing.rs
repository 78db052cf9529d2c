//! Signing orchestrator.
//!
//! Reads the message, derives the payload, has the token sign it and checks
//! the result locally before handing it out. A signature that does not
//! verify against the token's own key is never returned.

use std::path::{Path, PathBuf};

use crate::device::{DeviceClient, MAX_SIGN_SIZE};
use crate::digest::{self, Digest, Framing, FRAMING_TOKEN};
use crate::record::{PublicKey, Signature};
use crate::report::SharedReporter;
use crate::session::DeviceSession;
use crate::{Result, SignError};

/// A message prepared for signing.
#[derive(Clone, Debug)]
pub struct SignRequest {
    /// File name used in the `digest-file` framing and in comments.
    pub file_name: String,
    /// Payload framing.
    pub framing: Framing,
    /// SHA-512 of the message.
    pub digest: Digest,
    /// Bytes sent to the token.
    pub payload: Vec<u8>,
}

impl SignRequest {
    /// Read `path` and build the payload.
    ///
    /// Fails with [`SignError::MessageTooLarge`] before any device is
    /// contacted if the payload exceeds the signer app's limit.
    pub fn from_file(path: &Path, framing: Framing) -> Result<Self> {
        let message = std::fs::read(path).map_err(|e| SignError::io(path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_message(&message, &file_name, framing)
    }

    /// Build the payload for an in-memory message.
    pub fn from_message(message: &[u8], file_name: &str, framing: Framing) -> Result<Self> {
        let digest = digest::digest(message);
        let payload = framing.payload(message, &digest, file_name);

        if payload.len() > MAX_SIGN_SIZE {
            return Err(SignError::MessageTooLarge {
                size: payload.len(),
                max: MAX_SIGN_SIZE,
            });
        }

        Ok(Self {
            file_name: file_name.to_string(),
            framing,
            digest,
            payload,
        })
    }

    /// Default signature file for a message: `<message>.sig`.
    pub fn default_signature_path(message: &Path) -> PathBuf {
        let mut name = message.as_os_str().to_owned();
        name.push(".sig");
        PathBuf::from(name)
    }
}

/// A verified signature together with the key it verifies under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedMessage {
    pub public_key: PublicKey,
    pub signature: Signature,
    pub framing: Framing,
    pub file_name: String,
}

impl SignedMessage {
    /// Envelope comment for the signature file. Carries the framing tag.
    pub fn signature_comment(&self) -> String {
        signature_comment(self.framing, &self.file_name)
    }
}

/// Envelope comment for a signature made with `framing`.
pub fn signature_comment(framing: Framing, file_name: &str) -> String {
    format!(
        "{}{}, signature of {} by tkey-sign",
        FRAMING_TOKEN,
        framing.tag(),
        file_name
    )
}

/// Envelope comment for a public key file.
pub fn public_key_comment() -> String {
    "tkey-sign public key".to_string()
}

/// Drives a [`DeviceSession`] through one signature.
pub struct SigningOrchestrator {
    reporter: SharedReporter,
}

impl SigningOrchestrator {
    /// Create an orchestrator reporting to `reporter`.
    pub fn new(reporter: SharedReporter) -> Self {
        Self { reporter }
    }

    /// Sign `request` with the token behind `session`.
    ///
    /// If `expected_key` is given it must equal the token's key byte for
    /// byte; otherwise the operation stops before the token is asked to
    /// sign anything.
    pub async fn sign<C: DeviceClient>(
        &self,
        session: &mut DeviceSession<C>,
        expected_key: Option<&PublicKey>,
        request: &SignRequest,
    ) -> Result<SignedMessage> {
        if request.payload.len() > MAX_SIGN_SIZE {
            return Err(SignError::MessageTooLarge {
                size: request.payload.len(),
                max: MAX_SIGN_SIZE,
            });
        }

        self.reporter
            .info(&format!("SHA512 hash: {}", hex::encode(request.digest)));

        let public_key = session.public_key().await?;
        self.reporter
            .info(&format!("Public Key from TKey: {}", public_key.to_hex()));

        if let Some(expected) = expected_key {
            if expected.key != public_key.key {
                tracing::warn!("supplied public key differs from the TKey's key");
                return Err(SignError::IdentityMismatch {
                    expected: expected.to_hex(),
                    actual: public_key.to_hex(),
                });
            }
        }

        self.reporter.info(&format!(
            "Sending a {} bytes payload ({}) for signing.",
            request.payload.len(),
            request.framing
        ));
        let raw = session.request_signature(&request.payload).await?;
        let signature = Signature::new(raw);

        if !digest::verify(&public_key, &request.payload, &signature) {
            tracing::error!(signature = %signature.to_hex(), "token returned an invalid signature");
            return Err(SignError::SelfVerificationFailed);
        }
        self.reporter.info("Signature verified.");

        Ok(SignedMessage {
            public_key,
            signature,
            framing: request.framing,
            file_name: request.file_name.clone(),
        })
    }
}
