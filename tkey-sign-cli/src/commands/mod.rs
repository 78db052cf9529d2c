//! CLI command implementations

pub mod get_key;
pub mod sign;
pub mod verify;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tkey_sign_lib::config::SessionConfig;
use tkey_sign_lib::device::{Connector, DEFAULT_SPEED};
use tkey_sign_lib::secret::{Secret, SecretSource};
use tkey_sign_lib::session::DeviceSession;
use tokio_util::sync::CancellationToken;

use crate::reporter::ConsoleReporter;
use crate::uss;

/// Options for talking to the token.
#[derive(Args, Clone, Debug, Default)]
pub struct DeviceArgs {
    /// Serial port device PATH. Auto-detected if not given
    #[arg(long, value_name = "PATH", env = "TKEY_SIGN_PORT")]
    pub port: Option<String>,

    /// Serial port speed in bits per second
    #[arg(long, value_name = "BPS", env = "TKEY_SIGN_SPEED", default_value_t = DEFAULT_SPEED)]
    pub speed: u32,

    /// Signer app binary to load when the TKey is in firmware mode
    #[arg(long, value_name = "FILE", env = "TKEY_SIGN_APP")]
    pub app: Option<PathBuf>,

    /// Type a phrase to use as the User Supplied Secret. A different USS gives
    /// a different key pair
    #[arg(long, conflicts_with = "uss_file")]
    pub uss: bool,

    /// Read the USS from FILE, '-' for stdin. The contents are used unmodified
    #[arg(long, value_name = "FILE")]
    pub uss_file: Option<PathBuf>,
}

impl DeviceArgs {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            port: self.port.clone(),
            speed: self.speed,
            no_touch: option_env!("TKEY_SIGN_NO_TOUCH").is_some_and(|v| !v.is_empty()),
        }
    }
}

fn read_app_image(path: Option<&Path>) -> Result<Option<Vec<u8>>> {
    path.map(|p| {
        std::fs::read(p).with_context(|| format!("could not read signer app {}", p.display()))
    })
    .transpose()
}

/// Stops the spinner while the USS is read, so prompts stay readable.
struct QuietSecret<'a> {
    inner: Box<dyn SecretSource>,
    reporter: &'a ConsoleReporter,
}

impl SecretSource for QuietSecret<'_> {
    fn is_requested(&self) -> bool {
        self.inner.is_requested()
    }

    fn obtain(&self) -> tkey_sign_lib::Result<Option<Secret>> {
        self.reporter.finish();
        let secret = self.inner.obtain();
        self.reporter.start("Loading signer app ...");
        secret
    }
}

/// Connect to the token and bring the signer app up.
pub async fn open_session<K: Connector>(
    connector: &K,
    args: &DeviceArgs,
    reporter: &Arc<ConsoleReporter>,
    cancel: CancellationToken,
) -> Result<DeviceSession<K::Client>> {
    let image = read_app_image(args.app.as_deref())?;
    let secret = QuietSecret {
        inner: uss::source(args.uss, args.uss_file.clone()),
        reporter: reporter.as_ref(),
    };

    let mut session =
        DeviceSession::connect(connector, args.session_config(), reporter.clone(), cancel)?;

    reporter.start("Talking to TKey ...");
    let result = session.ensure_app(image.as_deref(), &secret).await;
    reporter.finish();

    let app = result?;
    tracing::debug!(
        version = app.version,
        port = session.port(),
        "signer app ready"
    );
    Ok(session)
}
