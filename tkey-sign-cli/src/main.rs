//! tkey-sign
//!
//! Signs the data in FILE (the "message") with the Ed25519 private key held
//! by a Tillitis TKey, and verifies detached signatures without a TKey.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tkey_sign_cli::commands::{self, get_key::GetKeyArgs, sign::SignArgs, verify::VerifyArgs};
use tkey_sign_cli::reporter::ConsoleReporter;
use tkey_sign_cli::{shutdown, ui};
use tkey_sign_device::SerialConnector;
use tkey_sign_lib::{SignError, FAILURE_EXIT_CODE};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "tkey-sign")]
#[command(about = "Sign files with a TKey and verify Ed25519 signatures", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output, including device protocol traffic
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign FILE with the TKey. The signature is written to FILE.sig and
    /// printed in hex on stdout
    Sign(SignArgs),

    /// Only output the TKey's public key
    #[command(visible_alias = "show-pubkey")]
    GetKey(GetKeyArgs),

    /// Verify a signature over FILE. Does not need a TKey
    Verify(VerifyArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "tkey_sign_cli=debug,tkey_sign_lib=debug,tkey_sign_device=debug"
    } else {
        "tkey_sign_cli=info,tkey_sign_lib=warn,tkey_sign_device=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    let supervisor = match shutdown::install(cancel.clone()) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            ui::error(&format!("could not install signal handlers: {}", e));
            return ExitCode::from(FAILURE_EXIT_CODE as u8);
        }
    };
    let reporter = Arc::new(ConsoleReporter::new());

    let result = match &cli.command {
        Commands::Sign(args) => {
            commands::sign::run(&SerialConnector, args, reporter.clone(), cancel.clone())
                .await
        }
        Commands::GetKey(args) => {
            commands::get_key::run(&SerialConnector, args, reporter.clone(), cancel.clone())
                .await
        }
        Commands::Verify(args) => commands::verify::run(args, reporter.clone()),
    };
    supervisor.abort();
    reporter.finish();

    // A signal never ends in success, even if the command ran to completion.
    let result = match result {
        Ok(()) if cancel.is_cancelled() => Err(SignError::Interrupted.into()),
        other => other,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui::error(&format!("{:#}", err));
            let code = err
                .downcast_ref::<SignError>()
                .map_or(FAILURE_EXIT_CODE, SignError::exit_code);
            ExitCode::from(code as u8)
        }
    }
}
