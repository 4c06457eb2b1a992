//! Operator-facing messages.
//!
//! Everything here goes to standard error; standard output carries the
//! remote-helper protocol.

use console::style;
use permagit_sync::{ProgressUpdate, SyncPhase};
use std::fmt::Display;

/// Prefix of every operator message.
pub const PREFIX: &str = " [permagit] ";

fn emit(line: impl Display) {
    eprintln!("{PREFIX}{line}");
}

/// Plain informational message.
pub fn info(message: impl Display) {
    emit(message);
}

/// Green success message.
pub fn success(message: impl Display) {
    emit(style(message).for_stderr().green());
}

/// Yellow warning.
pub fn warn(message: impl Display) {
    emit(style(message).for_stderr().yellow());
}

/// Red error.
pub fn error(message: impl Display) {
    emit(style(message).for_stderr().red());
}

/// Renders a sync progress update.
pub fn progress(update: &ProgressUpdate) {
    let line = match &update.message {
        Some(message) => format!("{}: {message}", update.phase),
        None => format!("{} ...", update.phase),
    };
    match update.phase {
        SyncPhase::ProviderFailed => warn(line),
        SyncPhase::Complete => {}
        _ => info(line),
    }
}
