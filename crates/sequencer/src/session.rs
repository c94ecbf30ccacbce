//! Session lifecycle
//!
//! Locate the device, initialize it, run every command token in order and
//! release the device. Only a missing device or a failed open stop the run;
//! everything after that is handled per command.

use crate::command::{self, Command, CommandOutcome, ParseMode, TransferSettings};
use crate::usb::initializer::{self, InitStatus, OpenFailed};
use crate::usb::locator::{self, LocateError};
use common::{DeviceIds, Transport, TransportError, Verbosity};
use std::io::{self, Write};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Everything a run needs besides the transport and the command tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub target: DeviceIds,
    pub transfer: TransferSettings,
    pub parse_mode: ParseMode,
    pub verbosity: Verbosity,
}

impl SessionSettings {
    pub fn new(target: DeviceIds) -> Self {
        Self {
            target,
            transfer: TransferSettings::default(),
            parse_mode: ParseMode::default(),
            verbosity: Verbosity::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("device {0} not found")]
    DeviceNotFound(DeviceIds),

    #[error(transparent)]
    OpenFailed(#[from] OpenFailed),

    #[error("failed to enumerate USB devices: {0}")]
    Enumeration(#[source] TransportError),

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl SessionError {
    /// Whether the run ended before a session was formed
    pub fn is_fatal_acquisition(&self) -> bool {
        !matches!(self, SessionError::Output(_))
    }
}

impl From<LocateError> for SessionError {
    fn from(err: LocateError) -> Self {
        match err {
            LocateError::NotFound(ids) => SessionError::DeviceNotFound(ids),
            LocateError::Enumeration(e) => SessionError::Enumeration(e),
        }
    }
}

/// Outcome of a single command token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenReport {
    pub token: String,
    /// `None` when the token was rejected by strict parsing
    pub command: Option<Command>,
    pub outcome: Option<CommandOutcome>,
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub init: InitStatus,
    pub commands: Vec<TokenReport>,
    pub release: Result<(), TransportError>,
}

/// Run a full session against `transport`
///
/// Bytes read from the device are written to `out`.
pub fn run<T, W>(
    transport: &T,
    settings: &SessionSettings,
    tokens: &[String],
    out: &mut W,
) -> Result<SessionReport, SessionError>
where
    T: Transport,
    W: Write + ?Sized,
{
    let located = locator::find(transport, settings.target).inspect_err(|e| error!("{}", e))?;
    let mut session = initializer::open(transport, &located).inspect_err(|e| error!("{}", e))?;

    let mut commands = Vec::with_capacity(tokens.len());
    let mut output_error = None;

    for token in tokens {
        debug!("command: {}", token);

        let command = match Command::parse_with(token, settings.parse_mode) {
            Ok(command) => command,
            Err(e) => {
                warn!("Skipping command: {}", e);
                commands.push(TokenReport {
                    token: token.clone(),
                    command: None,
                    outcome: None,
                });
                continue;
            }
        };

        let Some(handle) = session.handle_mut() else {
            break;
        };

        match command::execute(&command, handle, &settings.transfer, out) {
            Ok(outcome) => commands.push(TokenReport {
                token: token.clone(),
                command: Some(command),
                outcome: Some(outcome),
            }),
            Err(e) => {
                error!("Output failed, stopping: {}", e);
                output_error = Some(e);
                break;
            }
        }
    }

    let init = session.status().clone();
    let release = session.release();

    if let Some(e) = output_error {
        return Err(SessionError::Output(e));
    }

    Ok(SessionReport {
        init,
        commands,
        release,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{MockDevice, MockTransport};

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_output_failure_still_releases() {
        let mock = MockTransport::new()
            .with_device(MockDevice::new(1, 1, 0x1234, 0x0001))
            .with_read_bytes(&[1, 2]);
        let settings = SessionSettings::new(DeviceIds::new(0x1234, 0x0001));

        let err = run(&mock, &settings, &tokens(&["r2", "3b"]), &mut FailingWriter).unwrap_err();

        assert!(matches!(err, SessionError::Output(_)));
        assert!(!err.is_fatal_acquisition());
        assert_eq!(mock.close_count(), 1);
        assert!(mock.written_bytes().is_empty());
    }

    #[test]
    fn test_strict_mode_skips_bad_tokens() {
        let mock = MockTransport::new().with_device(MockDevice::new(1, 1, 0x1234, 0x0001));
        let mut settings = SessionSettings::new(DeviceIds::new(0x1234, 0x0001));
        settings.parse_mode = ParseMode::Strict;
        let mut out = Vec::new();

        let report = run(&mock, &settings, &tokens(&["zz", "3a"]), &mut out).unwrap();

        assert_eq!(report.commands[0].command, None);
        assert_eq!(report.commands[1].command, Some(Command::Write(0x3a)));
        assert_eq!(mock.written_bytes(), vec![0x3a]);
    }

    #[test]
    fn test_enumeration_error_maps() {
        let err: SessionError = LocateError::Enumeration(TransportError::Io).into();
        assert!(matches!(err, SessionError::Enumeration(TransportError::Io)));
        assert!(err.is_fatal_acquisition());
    }
}
