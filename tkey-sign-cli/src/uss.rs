//! USS sources selected on the command line.

use std::path::PathBuf;

use tkey_sign_lib::secret::{NoSecret, Secret, SecretFile, SecretSource};
use tkey_sign_lib::{Result, SignError};

/// A phrase typed by the operator with hidden input, asked for twice.
#[derive(Clone, Copy, Debug, Default)]
pub struct TypedSecret;

impl SecretSource for TypedSecret {
    fn is_requested(&self) -> bool {
        true
    }

    fn obtain(&self) -> Result<Option<Secret>> {
        let phrase = rpassword::prompt_password("Enter phrase for the USS: ")
            .map_err(|e| SignError::Secret(e.to_string()))?;
        if phrase.is_empty() {
            return Err(SignError::Secret("phrase cannot be empty".to_string()));
        }

        let secret = Secret::new(phrase);
        let repeat = rpassword::prompt_password("Repeat the phrase: ")
            .map(Secret::new)
            .map_err(|e| SignError::Secret(e.to_string()))?;

        if secret.as_bytes() != repeat.as_bytes() {
            return Err(SignError::Secret("phrases did not match".to_string()));
        }
        Ok(Some(secret))
    }
}

/// Pick the USS source for the given flags. The flags are mutually
/// exclusive; clap enforces that.
pub fn source(typed: bool, file: Option<PathBuf>) -> Box<dyn SecretSource> {
    match (typed, file) {
        (true, _) => Box::new(TypedSecret),
        (false, Some(path)) => Box::new(SecretFile(path)),
        (false, None) => Box::new(NoSecret),
    }
}
