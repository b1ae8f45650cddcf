//! macvnet CNI plugin binary
//!
//! stdout carries exactly one JSON document: the result, the version answer
//! or the error. Logs go to stderr or to `MACVNET_LOG_FILE`.

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::process;
use std::sync::Mutex;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use macvnet_cli::{Cli, CniCommand, dispatch};
use macvnet_cli::commands::config_version;
use macvnet_core::CniError;
use macvnet_core::config::DEFAULT_CNI_VERSION;

/// CNI code for failures that are not a plugin error kind
const GENERIC_ERROR_CODE: u32 = 999;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let rendered = e.render().to_string();
            let err = macvnet_core::Error::InvalidArgs {
                message: rendered
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .trim_start_matches("error: ")
                    .to_string(),
            };
            fail(CniError::new(DEFAULT_CNI_VERSION, &err).with_details(rendered.trim()));
        }
    };

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("macvnet: {e:#}");
    }

    debug!(
        command = ?cli.command,
        container_id = %cli.container_id,
        cni_path = ?cli.path,
        "Invoked"
    );

    let config = match read_config(cli.command) {
        Ok(config) => config,
        Err(e) => fail(error_document(DEFAULT_CNI_VERSION, &e)),
    };

    match dispatch(&cli, &config).await {
        Ok(reply) => {
            if let Err(e) = reply.write_to(io::stdout().lock()) {
                error!(error = %e, "Failed to write result");
                process::exit(1);
            }
        }
        Err(e) => {
            error!(command = ?cli.command, error = %format!("{e:#}"), "Command failed");
            fail(error_document(&config_version(&config), &e));
        }
    }
}

/// Network configuration from stdin; VERSION does not read any
fn read_config(command: CniCommand) -> Result<Vec<u8>> {
    let mut config = Vec::new();
    if command != CniCommand::Version {
        io::stdin()
            .read_to_end(&mut config)
            .context("failed to read network configuration from stdin")?;
    }
    Ok(config)
}

fn error_document(cni_version: &str, err: &anyhow::Error) -> CniError {
    let code = err
        .downcast_ref::<macvnet_core::Error>()
        .map_or(GENERIC_ERROR_CODE, macvnet_core::Error::cni_code);

    CniError {
        cni_version: cni_version.to_string(),
        code,
        msg: format!("{err:#}"),
        details: None,
    }
}

fn fail(document: CniError) -> ! {
    let mut stdout = io::stdout().lock();
    if document.write_to(&mut stdout).is_err() {
        eprintln!("macvnet: {}", document.msg);
    }
    let _ = stdout.flush();
    process::exit(1);
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("MACVNET_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match std::env::var_os("MACVNET_LOG_FILE") {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.to_string_lossy()))?;
            subscriber.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => subscriber.with_writer(io::stderr).init(),
    }

    Ok(())
}
