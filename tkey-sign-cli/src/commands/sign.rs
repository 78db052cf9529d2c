//! Sign command - sign a file with the TKey

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tkey_sign_lib::device::Connector;
use tkey_sign_lib::digest::Framing;
use tkey_sign_lib::envelope;
use tkey_sign_lib::record::PublicKey;
use tkey_sign_lib::report::Reporter;
use tkey_sign_lib::signing::{SignRequest, SigningOrchestrator};
use tkey_sign_lib::SignError;
use tokio_util::sync::CancellationToken;

use super::DeviceArgs;
use crate::reporter::ConsoleReporter;
use crate::ui;

#[derive(Args, Clone, Debug)]
pub struct SignArgs {
    /// Message FILE to sign
    pub file: PathBuf,

    #[command(flatten)]
    pub device: DeviceArgs,

    /// How the signed payload is derived from the message
    /// (digest, digest-file or message)
    #[arg(long, default_value_t = Framing::Digest)]
    pub framing: Framing,

    /// Refuse to sign unless the TKey's public key equals the one in FILE
    #[arg(long, value_name = "FILE")]
    pub public: Option<PathBuf>,

    /// Write the signature to FILE instead of <FILE>.sig
    #[arg(short = 'o', long, value_name = "FILE")]
    pub signature: Option<PathBuf>,

    /// Overwrite an existing signature file without asking
    #[arg(short, long)]
    pub force: bool,
}

pub async fn run<K: Connector>(
    connector: &K,
    args: &SignArgs,
    reporter: Arc<ConsoleReporter>,
    cancel: CancellationToken,
) -> Result<()> {
    // Size and readability are checked before the token is touched.
    let request = SignRequest::from_file(&args.file, args.framing)?;
    let expected = args
        .public
        .as_deref()
        .map(|path| envelope::read_any::<PublicKey>(path).map(|loaded| loaded.record))
        .transpose()
        .context("could not load the expected public key")?;
    let sig_path = args
        .signature
        .clone()
        .unwrap_or_else(|| SignRequest::default_signature_path(&args.file));

    let mut session =
        super::open_session(connector, &args.device, &reporter, cancel.clone()).await?;
    let signed = SigningOrchestrator::new(reporter.clone())
        .sign(&mut session, expected.as_ref(), &request)
        .await?;
    session.close();

    // A signal that arrived after the token answered still discards the result.
    if cancel.is_cancelled() {
        return Err(SignError::Interrupted.into());
    }

    let comment = signed.signature_comment();
    if args.force {
        envelope::write(&sig_path, &signed.signature, &comment, true)?;
    } else {
        envelope::write_interactive(&sig_path, &signed.signature, &comment, reporter.as_ref())?;
    }
    ui::success(&format!("Signature written to {}", sig_path.display()));

    reporter.info("Signature over message by TKey (on stdout):");
    ui::output(&signed.signature.to_hex());
    Ok(())
}
