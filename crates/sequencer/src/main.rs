//! usb-seq
//!
//! Sends and reads bytes one by one to and from a USB device.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use sequencer::cli::{Invocation, USAGE};
use sequencer::config::{Overrides, SeqConfig, expand_path};
use sequencer::usb::NativeTransport;
use std::io;
use std::process::ExitCode;
use tracing::{debug, error};

/// Exit status for a missing device or a device that cannot be opened
const EXIT_DEVICE_UNAVAILABLE: u8 = 255;

#[derive(Parser, Debug)]
#[command(name = "usb-seq")]
#[command(
    author,
    version,
    about = "Send and read bytes one by one to a USB device"
)]
#[command(long_about = "
Send and read bytes one by one to a USB device over bulk endpoint 1.

ARGUMENTS:
    vendor:product   USB vendor and product ID, in hexadecimal
    q                (optional, second position) quiet: no diagnostics
    X                write the byte X
    r, rX            read 1 (or X) bytes and print each one on its own line

All numbers are in hexadecimal. Options go before vendor:product; everything
after it is taken as a command, including tokens such as -1.

EXAMPLES:
    # Connect to 1234:0001, send 1 2 3a, read up to 10 bytes, send 3b
    usb-seq 1234:1 1 2 3a ra 3b

    # Same, without diagnostics on stderr
    usb-seq 1234:1 q 1 2 3a ra 3b
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Reject command tokens that are not clean hex numbers
    #[arg(long)]
    strict: bool,

    /// vendor:product, optional q, then commands
    #[arg(value_name = "ARGS", allow_hyphen_values = true, trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let invocation = match Invocation::parse(&args.args) {
        Ok(invocation) => invocation,
        Err(_) => {
            println!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };

    match run(&args, &invocation) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, invocation: &Invocation) -> Result<ExitCode> {
    let config = match &args.config {
        Some(path) => SeqConfig::load(&expand_path(path)).context("Failed to load configuration")?,
        None => SeqConfig::default(),
    };

    let overrides = Overrides {
        quiet: invocation.quiet,
        log_level: args.log_level.clone(),
        strict: args.strict,
    };
    let settings = config.session_settings(invocation.target, &overrides);

    setup_logging(&settings.verbosity).context("Failed to setup logging")?;
    debug!("usb-seq v{}", env!("CARGO_PKG_VERSION"));

    let transport = match NativeTransport::new() {
        Ok(transport) => transport,
        Err(e) => {
            error!("Failed to initialize USB: {}", e);
            return Ok(ExitCode::from(EXIT_DEVICE_UNAVAILABLE));
        }
    };

    let mut stdout = io::stdout().lock();
    match sequencer::run(&transport, &settings, &invocation.commands, &mut stdout) {
        Ok(report) => {
            debug!(
                "Processed {} commands on {}",
                report.commands.len(),
                settings.target
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_fatal_acquisition() => Ok(ExitCode::from(EXIT_DEVICE_UNAVAILABLE)),
        Err(e) => Err(e.into()),
    }
}
