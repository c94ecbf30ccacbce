//! Positional argument handling
//!
//! `usb-seq <vendor>:<product> [q] <command>...`

use crate::hex::scan_hex;
use common::DeviceIds;
use thiserror::Error;

/// Text printed to stdout when the arguments are unusable
pub const USAGE: &str = "\
Send and read bytes to the usb device. Syntax: usb-seq vendor:product commands...
Commands available:
 q for quiet.
 r (or rX) read 1 (or X) unique bytes and prints them.
 X write the byte to the usb.
All numbers are in hexadecimal
E.g:  1234:1 1 2 3a ra 3b. connect to 0x1234:01 send 1 2 3a, read 10 bytes, send 3b";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("expected vendor:product and at least one command")]
    MissingArguments,

    #[error("invalid vendor:product '{0}'")]
    InvalidTarget(String),
}

/// Parsed positional arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub target: DeviceIds,
    /// Diagnostics suppressed for the whole run
    pub quiet: bool,
    /// Command tokens, in execution order
    pub commands: Vec<String>,
}

impl Invocation {
    /// Parse the positional arguments (program name excluded)
    pub fn parse(args: &[String]) -> Result<Self, UsageError> {
        let [target, rest @ ..] = args else {
            return Err(UsageError::MissingArguments);
        };
        if rest.is_empty() {
            return Err(UsageError::MissingArguments);
        }

        let target = parse_target(target)?;
        let quiet = rest[0].starts_with('q');
        let commands = if quiet { &rest[1..] } else { rest };

        Ok(Self {
            target,
            quiet,
            commands: commands.to_vec(),
        })
    }
}

/// Parse `vendor:product`, both in hex
pub fn parse_target(arg: &str) -> Result<DeviceIds, UsageError> {
    let invalid = || UsageError::InvalidTarget(arg.to_string());

    let (vendor, rest) = scan_hex(arg).ok_or_else(invalid)?;
    let rest = rest.strip_prefix(':').ok_or_else(invalid)?;
    let (product, _) = scan_hex(rest).ok_or_else(invalid)?;

    Ok(DeviceIds::new(
        u16::try_from(vendor).map_err(|_| invalid())?,
        u16::try_from(product).map_err(|_| invalid())?,
    ))
}
