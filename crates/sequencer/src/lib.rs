//! usb-seq
//!
//! Sends and reads single bytes to and from a USB device over bulk endpoint 1.
//! The device is found by vendor/product ID, claimed on interface 0, and then
//! driven by a list of command tokens: `X` writes byte `X`, `rX` reads up to
//! `X` bytes (all numbers in hexadecimal).

pub mod cli;
pub mod command;
pub mod config;
pub mod hex;
pub mod session;
pub mod usb;

pub use command::{Command, CommandOutcome, ParseMode, TransferSettings};
pub use session::{SessionError, SessionReport, SessionSettings, run};
