//! Get-key command - output the TKey's public key without signing

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tkey_sign_lib::device::Connector;
use tkey_sign_lib::envelope;
use tkey_sign_lib::signing::public_key_comment;
use tokio_util::sync::CancellationToken;

use super::DeviceArgs;
use crate::reporter::ConsoleReporter;
use crate::ui;

#[derive(Args, Clone, Debug)]
pub struct GetKeyArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Also write the public key envelope to FILE
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Overwrite an existing key file without asking
    #[arg(short, long)]
    pub force: bool,
}

pub async fn run<K: Connector>(
    connector: &K,
    args: &GetKeyArgs,
    reporter: Arc<ConsoleReporter>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut session = super::open_session(connector, &args.device, &reporter, cancel).await?;
    let key = session.public_key().await?;
    session.close();

    if let Some(path) = &args.output {
        if args.force {
            envelope::write(path, &key, &public_key_comment(), true)?;
        } else {
            envelope::write_interactive(path, &key, &public_key_comment(), reporter.as_ref())?;
        }
        ui::success(&format!("Public key written to {}", path.display()));
    }

    ui::output(&key.to_hex());
    Ok(())
}
