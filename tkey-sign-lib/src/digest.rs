//! Message digest, payload framing and local Ed25519 verification.
//!
//! The payload handed to the token and the payload checked by the verifier
//! must be built the same way, otherwise every signature fails even though
//! nothing is corrupt. The framing therefore travels with the signature, as a
//! `framing=<tag>` token in the envelope comment.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signature as DalekSig, Verifier, VerifyingKey};
use sha2::{Digest as _, Sha512};

use crate::record::{PublicKey, Signature};

/// Size of the SHA-512 digest.
pub const DIGEST_LEN: usize = 64;

/// SHA-512 digest of a message.
pub type Digest = [u8; DIGEST_LEN];

/// Comment token announcing the framing.
pub const FRAMING_TOKEN: &str = "framing=";

/// Compute the SHA-512 digest of `message`.
pub fn digest(message: &[u8]) -> Digest {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&Sha512::digest(message));
    out
}

/// How the signed payload is derived from the message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Framing {
    /// The message itself is signed. Limited by the signer app's maximum
    /// payload size.
    Message,
    /// The 64 raw SHA-512 bytes are signed.
    #[default]
    Digest,
    /// The text `"{hex digest}  {file name}\n"` is signed, as printed by
    /// `sha512sum`.
    DigestFile,
}

impl Framing {
    /// Versioned tag stored in envelope comments.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Message => "message-v1",
            Self::Digest => "sha512-v1",
            Self::DigestFile => "sha512-file-v1",
        }
    }

    /// Parse a versioned tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "message-v1" => Some(Self::Message),
            "sha512-v1" => Some(Self::Digest),
            "sha512-file-v1" => Some(Self::DigestFile),
            _ => None,
        }
    }

    /// Find the framing tag in an envelope comment.
    ///
    /// Returns `None` when the comment carries no tag at all and
    /// `Some(Err(tag))` for a tag this version does not know.
    pub fn from_comment(comment: &str) -> Option<std::result::Result<Self, String>> {
        let tag = comment
            .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .find_map(|word| word.strip_prefix(FRAMING_TOKEN))?;
        Some(Self::from_tag(tag).ok_or_else(|| tag.to_string()))
    }

    /// Build the signed payload.
    ///
    /// `file_name` is only used by [`Framing::DigestFile`].
    pub fn payload(&self, message: &[u8], digest: &Digest, file_name: &str) -> Vec<u8> {
        match self {
            Self::Message => message.to_vec(),
            Self::Digest => digest.to_vec(),
            Self::DigestFile => format!("{}  {}\n", hex::encode(digest), file_name).into_bytes(),
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Message => "message",
            Self::Digest => "digest",
            Self::DigestFile => "digest-file",
        };
        f.write_str(name)
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "digest" => Ok(Self::Digest),
            "digest-file" => Ok(Self::DigestFile),
            other => Self::from_tag(other).ok_or_else(|| {
                format!("unknown framing '{}' (message, digest, digest-file)", other)
            }),
        }
    }
}

/// Verify a raw Ed25519 signature over `payload`.
///
/// Malformed keys verify as `false`.
pub fn verify_raw(key: &[u8; 32], payload: &[u8], sig: &[u8; 64]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(key) else {
        return false;
    };
    let sig = DalekSig::from_bytes(sig);
    verifying_key.verify(payload, &sig).is_ok()
}

/// Verify a signature record against a key record.
pub fn verify(key: &PublicKey, payload: &[u8], signature: &Signature) -> bool {
    verify_raw(&key.key, payload, &signature.sig)
}
