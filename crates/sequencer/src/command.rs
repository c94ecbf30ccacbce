//! Command parsing and execution
//!
//! A command is a single token: `rX` reads `X` bytes (hex, default 1), anything
//! else writes one byte. Each byte travels in its own bulk transfer.

use crate::hex::{parse_hex_strict, scan_hex};
use common::{TransferHandle, TransportError};
use std::io::{self, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Endpoint number used for every transfer
pub const DEFAULT_ENDPOINT: u8 = 1;

/// Per-byte transfer timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

const ENDPOINT_DIR_IN: u8 = 0x80;

/// A parsed command token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Write one byte
    Write(u8),
    /// Read up to this many bytes, one transfer each
    Read(u32),
}

/// How tokens that are not clean hex numbers are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Malformed digits read as 0, trailing garbage is ignored
    #[default]
    Permissive,
    /// Malformed tokens are rejected
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid read count in '{0}'")]
    InvalidCount(String),

    #[error("read count must be at least 1 in '{0}'")]
    ZeroCount(String),

    #[error("invalid byte value '{0}'")]
    InvalidByte(String),
}

impl Command {
    /// Parse a token leniently; never fails
    pub fn parse(token: &str) -> Command {
        match token.strip_prefix('r') {
            Some(count) => Command::Read(scan_hex(count).map_or(1, |(n, _)| n)),
            // only the low byte is sent
            None => Command::Write(scan_hex(token).map_or(0, |(n, _)| n as u8)),
        }
    }

    /// Parse a token, rejecting anything that is not entirely hex digits
    pub fn parse_strict(token: &str) -> Result<Command, ParseError> {
        match token.strip_prefix('r') {
            Some("") => Ok(Command::Read(1)),
            Some(count) => match parse_hex_strict(count) {
                Some(0) => Err(ParseError::ZeroCount(token.to_string())),
                Some(n) => Ok(Command::Read(n)),
                None => Err(ParseError::InvalidCount(token.to_string())),
            },
            None => parse_hex_strict(token)
                .map(|n| Command::Write(n as u8))
                .ok_or_else(|| ParseError::InvalidByte(token.to_string())),
        }
    }

    pub fn parse_with(token: &str, mode: ParseMode) -> Result<Command, ParseError> {
        match mode {
            ParseMode::Permissive => Ok(Command::parse(token)),
            ParseMode::Strict => Command::parse_strict(token),
        }
    }
}

/// Endpoint and timeout applied to every transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    pub endpoint: u8,
    pub timeout: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TransferSettings {
    pub fn in_address(&self) -> u8 {
        self.endpoint | ENDPOINT_DIR_IN
    }

    pub fn out_address(&self) -> u8 {
        self.endpoint & !ENDPOINT_DIR_IN
    }
}

/// What a command did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Written {
        byte: u8,
        /// Transport result, kept for diagnostics only
        result: Result<usize, TransportError>,
    },
    Read {
        requested: u32,
        received: Vec<u8>,
        /// Error that ended the read before `requested` attempts
        stopped_by: Option<TransportError>,
    },
}

/// Execute one command against an open device
///
/// Bytes read are written to `out` as two lowercase hex digits and a newline.
/// Transport failures never surface as errors; only failures writing to
/// `out` do.
pub fn execute<H, W>(
    command: &Command,
    handle: &mut H,
    settings: &TransferSettings,
    out: &mut W,
) -> io::Result<CommandOutcome>
where
    H: TransferHandle + ?Sized,
    W: Write + ?Sized,
{
    match *command {
        Command::Write(byte) => Ok(write_byte(byte, handle, settings)),
        Command::Read(count) => read_bytes(count, handle, settings, out),
    }
}

fn write_byte<H>(byte: u8, handle: &mut H, settings: &TransferSettings) -> CommandOutcome
where
    H: TransferHandle + ?Sized,
{
    let result = handle.write_bulk(settings.out_address(), &[byte], settings.timeout);
    match &result {
        Ok(len) => debug!("{} bytes written", len),
        Err(e) => debug!("write of {:#04x} failed: {}", byte, e),
    }

    CommandOutcome::Written { byte, result }
}

fn read_bytes<H, W>(
    count: u32,
    handle: &mut H,
    settings: &TransferSettings,
    out: &mut W,
) -> io::Result<CommandOutcome>
where
    H: TransferHandle + ?Sized,
    W: Write + ?Sized,
{
    let mut received = Vec::new();
    let mut stopped_by = None;
    let mut buf = [0u8; 1];

    for i in 0..count {
        let result = handle.read_bulk(settings.in_address(), &mut buf, settings.timeout);
        match result {
            Ok(1) => {
                debug!("{}: 1 byte read {:02x}", i, buf[0]);
                writeln!(out, "{:02x}", buf[0])?;
                received.push(buf[0]);
            }
            Ok(len) => debug!("{}: {} bytes read", i, len),
            Err(ref e) => debug!("{}: read failed: {}", i, e),
        }
        out.flush()?;

        if let Err(e) = result {
            if e.is_timeout() {
                debug!("timeout");
            } else {
                warn!("read aborted: {}", e);
            }
            stopped_by = Some(e);
            break;
        }
    }

    Ok(CommandOutcome::Read {
        requested: count,
        received,
        stopped_by,
    })
}
