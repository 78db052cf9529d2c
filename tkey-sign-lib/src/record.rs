//! Fixed-size key and signature records.
//!
//! Both records start with a 2-byte algorithm tag and an 8-byte key slot
//! id, followed by the raw Ed25519 material. The serialization is the plain
//! concatenation of the fields in that order.

use std::fmt;

/// Algorithm tag for Ed25519.
pub const ALG_ED25519: [u8; 2] = *b"Ed";

/// Key slot id written into every record produced by this tool.
pub const DEFAULT_KEY_NUM: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

/// Size of a raw Ed25519 public key.
pub const RAW_KEY_LEN: usize = 32;

/// Size of a raw Ed25519 signature.
pub const RAW_SIG_LEN: usize = 64;

/// A record with a fixed binary layout.
pub trait Record: Sized {
    /// Serialized size in bytes.
    const SIZE: usize;

    /// Human readable name used in error messages.
    const WHAT: &'static str;

    /// Size of the raw Ed25519 part, used by the plain hex form.
    const RAW_LEN: usize;

    /// Serialize to exactly [`Self::SIZE`] bytes.
    fn to_bytes(&self) -> Vec<u8>;

    /// Parse from exactly [`Self::SIZE`] bytes.
    fn from_bytes(bytes: &[u8]) -> Option<Self>;

    /// Wrap raw Ed25519 material with the default tags.
    fn from_raw(raw: &[u8]) -> Option<Self>;

    /// Algorithm tag of this record.
    fn alg(&self) -> [u8; 2];

    /// Key slot id of this record.
    fn key_num(&self) -> [u8; 8];
}

/// An Ed25519 public key with its algorithm and slot tag.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    pub alg: [u8; 2],
    pub key_num: [u8; 8],
    pub key: [u8; RAW_KEY_LEN],
}

impl PublicKey {
    /// Wrap a raw key with the default algorithm and slot tag.
    pub fn new(key: [u8; RAW_KEY_LEN]) -> Self {
        Self {
            alg: ALG_ED25519,
            key_num: DEFAULT_KEY_NUM,
            key,
        }
    }

    /// Hex of the raw key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.key)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("alg", &String::from_utf8_lossy(&self.alg))
            .field("key_num", &hex::encode(self.key_num))
            .field("key", &hex::encode(self.key))
            .finish()
    }
}

impl Record for PublicKey {
    const SIZE: usize = 2 + 8 + RAW_KEY_LEN;
    const WHAT: &'static str = "public key";
    const RAW_LEN: usize = RAW_KEY_LEN;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.alg);
        out.extend_from_slice(&self.key_num);
        out.extend_from_slice(&self.key);
        out
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            alg: bytes[0..2].try_into().ok()?,
            key_num: bytes[2..10].try_into().ok()?,
            key: bytes[10..].try_into().ok()?,
        })
    }

    fn from_raw(raw: &[u8]) -> Option<Self> {
        Some(Self::new(raw.try_into().ok()?))
    }

    fn alg(&self) -> [u8; 2] {
        self.alg
    }

    fn key_num(&self) -> [u8; 8] {
        self.key_num
    }
}

/// An Ed25519 signature with its algorithm and slot tag.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub alg: [u8; 2],
    pub key_num: [u8; 8],
    pub sig: [u8; RAW_SIG_LEN],
}

impl Signature {
    /// Wrap a raw signature with the default algorithm and slot tag.
    pub fn new(sig: [u8; RAW_SIG_LEN]) -> Self {
        Self {
            alg: ALG_ED25519,
            key_num: DEFAULT_KEY_NUM,
            sig,
        }
    }

    /// Hex of the raw signature.
    pub fn to_hex(&self) -> String {
        hex::encode(self.sig)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("alg", &String::from_utf8_lossy(&self.alg))
            .field("key_num", &hex::encode(self.key_num))
            .field("sig", &hex::encode(self.sig))
            .finish()
    }
}

impl Record for Signature {
    const SIZE: usize = 2 + 8 + RAW_SIG_LEN;
    const WHAT: &'static str = "signature";
    const RAW_LEN: usize = RAW_SIG_LEN;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.alg);
        out.extend_from_slice(&self.key_num);
        out.extend_from_slice(&self.sig);
        out
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            alg: bytes[0..2].try_into().ok()?,
            key_num: bytes[2..10].try_into().ok()?,
            sig: bytes[10..].try_into().ok()?,
        })
    }

    fn from_raw(raw: &[u8]) -> Option<Self> {
        Some(Self::new(raw.try_into().ok()?))
    }

    fn alg(&self) -> [u8; 2] {
        self.alg
    }

    fn key_num(&self) -> [u8; 8] {
        self.key_num
    }
}
