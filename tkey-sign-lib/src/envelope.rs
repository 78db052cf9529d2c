//! Text envelope for keys and signatures.
//!
//! An envelope is two lines:
//!
//! ```text
//! untrusted comment: <free text>
//! <base64 of the fixed-size record>
//! ```
//!
//! The comment is not covered by any signature and must never be trusted
//! for anything but display and the framing hint (see [`crate::digest::Framing`]).
//! Files are created exclusively; an existing file is only replaced with
//! explicit consent.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::record::Record;
use crate::report::Reporter;
use crate::{Result, SignError};

/// Prefix of the first envelope line.
pub const COMMENT_PREFIX: &str = "untrusted comment: ";

/// A decoded envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope<R> {
    /// Comment line with the prefix stripped.
    pub comment: String,
    /// The decoded record.
    pub record: R,
}

/// A record loaded from either an envelope or a plain hex file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Loaded<R> {
    /// Envelope comment, `None` for the hex form.
    pub comment: Option<String>,
    /// The decoded record.
    pub record: R,
}

/// Render a record as envelope text.
///
/// Newlines in `comment` are replaced by spaces so the comment always stays
/// on the first line.
pub fn encode<R: Record>(record: &R, comment: &str) -> String {
    let comment = comment.replace(['\r', '\n'], " ");
    format!(
        "{}{}\n{}\n",
        COMMENT_PREFIX,
        comment,
        STANDARD.encode(record.to_bytes())
    )
}

/// Decode envelope text into a record.
pub fn decode<R: Record>(text: &str) -> Result<R> {
    Ok(parse::<R>(text, "<input>")?.record)
}

/// Decode envelope text, keeping the comment. `source` names the input in
/// error messages.
pub fn parse<R: Record>(text: &str, source: &str) -> Result<Envelope<R>> {
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() < 2 {
        return Err(SignError::decode(source, "too few lines"));
    }

    let first = lines[0].trim_end_matches('\r');
    let comment = first.strip_prefix(COMMENT_PREFIX).unwrap_or(first);

    let payload = lines[1].trim_end_matches('\r');
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| SignError::decode(source, format!("invalid base64: {}", e)))?;

    if bytes.len() != R::SIZE {
        return Err(SignError::LengthMismatch {
            what: R::WHAT,
            file: source.to_string(),
            expected: R::SIZE,
            actual: bytes.len(),
        });
    }

    let record = R::from_bytes(&bytes)
        .ok_or_else(|| SignError::decode(source, format!("malformed {}", R::WHAT)))?;

    Ok(Envelope {
        comment: comment.to_string(),
        record,
    })
}

/// Read an envelope file.
pub fn read<R: Record>(path: &Path) -> Result<Envelope<R>> {
    let text = std::fs::read_to_string(path).map_err(|e| SignError::io(path, e))?;
    parse(&text, &path.display().to_string())
}

/// Decode the single-line hex form holding only the raw Ed25519 material.
///
/// Surrounding whitespace (including Windows line endings) is ignored.
pub fn parse_hex<R: Record>(text: &str, source: &str) -> Result<R> {
    let raw = hex::decode(text.trim())
        .map_err(|e| SignError::decode(source, format!("invalid hex: {}", e)))?;

    if raw.len() != R::RAW_LEN {
        return Err(SignError::LengthMismatch {
            what: R::WHAT,
            file: source.to_string(),
            expected: R::RAW_LEN,
            actual: raw.len(),
        });
    }

    R::from_raw(&raw).ok_or_else(|| SignError::decode(source, format!("malformed {}", R::WHAT)))
}

/// Read a record from either form, detected from the first line.
pub fn read_any<R: Record>(path: &Path) -> Result<Loaded<R>> {
    let text = std::fs::read_to_string(path).map_err(|e| SignError::io(path, e))?;
    let source = path.display().to_string();

    if text.starts_with(COMMENT_PREFIX.trim_end()) {
        let envelope = parse::<R>(&text, &source)?;
        Ok(Loaded {
            comment: Some(envelope.comment),
            record: envelope.record,
        })
    } else {
        Ok(Loaded {
            comment: None,
            record: parse_hex(&text, &source)?,
        })
    }
}

/// Write a record as an envelope.
///
/// With `overwrite` false the file is created exclusively and an existing
/// file yields [`SignError::FileExists`] without being touched. With
/// `overwrite` true an existing file is truncated and rewritten. Both lines
/// go out in a single write; if it fails the file contents are unspecified.
pub fn write<R: Record>(path: &Path, record: &R, comment: &str, overwrite: bool) -> Result<()> {
    let text = encode(record, comment);

    let file = OpenOptions::new().write(true).create_new(true).open(path);
    let mut file = match file {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            if !overwrite {
                return Err(SignError::FileExists(path.to_path_buf()));
            }
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .map_err(|e| SignError::io(path, e))?
        }
        Err(e) => return Err(SignError::io(path, e)),
    };

    file.write_all(text.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| SignError::io(path, e))?;

    tracing::debug!(path = %path.display(), what = R::WHAT, "wrote envelope");
    Ok(())
}

/// Write a record, asking the operator before replacing an existing file.
///
/// Only an answer of exactly `y` (surrounding whitespace ignored) replaces
/// the file. Any other answer returns [`SignError::Aborted`], which callers
/// turn into a non-zero exit.
pub fn write_interactive<R: Record>(
    path: &Path,
    record: &R,
    comment: &str,
    reporter: &dyn Reporter,
) -> Result<()> {
    match write(path, record, comment, false) {
        Err(SignError::FileExists(_)) => {
            let answer = reporter
                .prompt(&format!("File {} exists. Overwrite [y/n]?", path.display()))
                .map_err(|e| SignError::io(path, e))?;

            if answer.trim() == "y" {
                write(path, record, comment, true)
            } else {
                reporter.info("Aborted");
                Err(SignError::Aborted)
            }
        }
        other => other,
    }
}
