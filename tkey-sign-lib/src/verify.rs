//! Offline verification.
//!
//! Needs no token: message, signature and public key are read from files,
//! the payload is rebuilt with the framing the signer used and checked with
//! Ed25519. Malformed input files are reported as decode or length errors,
//! never as a failed verification.

use std::path::Path;

use crate::digest::{self, Framing};
use crate::envelope::{self, Loaded};
use crate::record::{PublicKey, Record, Signature, ALG_ED25519};
use crate::report::SharedReporter;
use crate::{Result, SignError};

/// Result of a successful verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verified {
    pub public_key: PublicKey,
    pub signature: Signature,
    pub framing: Framing,
}

/// Verifies detached signatures from files.
pub struct OfflineVerifier {
    reporter: SharedReporter,
    default_framing: Framing,
}

impl OfflineVerifier {
    /// Create a verifier. `default_framing` applies to signatures that do
    /// not name their framing (hex files, untagged comments).
    pub fn new(reporter: SharedReporter, default_framing: Framing) -> Self {
        Self {
            reporter,
            default_framing,
        }
    }

    /// Verify `signature_path` over `message_path` with `key_path`.
    ///
    /// Signature and key may each be an envelope or a single hex line.
    pub fn verify_files(
        &self,
        message_path: &Path,
        signature_path: &Path,
        key_path: &Path,
    ) -> Result<Verified> {
        let signature = envelope::read_any::<Signature>(signature_path)?;
        check_alg(&signature.record, signature_path)?;

        let key = envelope::read_any::<PublicKey>(key_path)?;
        check_alg(&key.record, key_path)?;

        let framing = self.framing_of(&signature, signature_path)?;

        self.reporter
            .info(&format!("Public key: {}", key.record.to_hex()));
        self.reporter
            .info(&format!("Signature: {}", signature.record.to_hex()));

        if key.record.key_num != signature.record.key_num {
            return Err(SignError::VerificationFailed(format!(
                "signature was made with key number {}, public key is number {}",
                hex::encode(signature.record.key_num),
                hex::encode(key.record.key_num)
            )));
        }

        let message = std::fs::read(message_path).map_err(|e| SignError::io(message_path, e))?;
        let file_name = message_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| message_path.display().to_string());

        let digest = digest::digest(&message);
        self.reporter
            .info(&format!("SHA512 hash: {}", hex::encode(digest)));

        let payload = framing.payload(&message, &digest, &file_name);
        if !digest::verify(&key.record, &payload, &signature.record) {
            tracing::debug!(%framing, "verification failed");
            return Err(SignError::VerificationFailed(format!(
                "signature does not match message and public key ({} framing)",
                framing
            )));
        }

        Ok(Verified {
            public_key: key.record,
            signature: signature.record,
            framing,
        })
    }

    fn framing_of(&self, signature: &Loaded<Signature>, path: &Path) -> Result<Framing> {
        match signature.comment.as_deref().and_then(Framing::from_comment) {
            Some(Ok(framing)) => Ok(framing),
            Some(Err(tag)) => Err(SignError::decode(
                path.display().to_string(),
                format!("unknown framing '{}'", tag),
            )),
            None => Ok(self.default_framing),
        }
    }
}

fn check_alg<R: Record>(record: &R, path: &Path) -> Result<()> {
    if record.alg() == ALG_ED25519 {
        Ok(())
    } else {
        Err(SignError::decode(
            path.display().to_string(),
            format!(
                "unsupported algorithm {:?} in {}",
                String::from_utf8_lossy(&record.alg()),
                R::WHAT
            ),
        ))
    }
}
