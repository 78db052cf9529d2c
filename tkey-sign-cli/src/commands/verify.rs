//! Verify command - check a detached signature without a TKey

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tkey_sign_lib::digest::Framing;
use tkey_sign_lib::report::SharedReporter;
use tkey_sign_lib::verify::OfflineVerifier;

use crate::ui;

#[derive(Args, Clone, Debug)]
pub struct VerifyArgs {
    /// Message FILE
    pub file: PathBuf,

    /// Signature file: an envelope or 64 bytes in hex
    #[arg(value_name = "SIG-FILE")]
    pub signature: PathBuf,

    /// Public key file: an envelope or 32 bytes in hex
    #[arg(value_name = "PUBKEY-FILE")]
    pub public: PathBuf,

    /// Framing to assume when the signature file does not name one
    #[arg(long, default_value_t = Framing::Digest)]
    pub framing: Framing,
}

pub fn run(args: &VerifyArgs, reporter: SharedReporter) -> Result<()> {
    let verified = OfflineVerifier::new(reporter, args.framing).verify_files(
        &args.file,
        &args.signature,
        &args.public,
    )?;

    ui::key_value("Framing", verified.framing.tag());
    ui::success("Signature verified.");
    Ok(())
}
