//! Cost consent prompt on the controlling terminal.

use permagit_sync::{Consent, ConsentPrompt};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// Asks on the controlling terminal, never on standard input.
#[derive(Debug, Clone)]
pub struct TtyPrompt {
    device: PathBuf,
}

impl Default for TtyPrompt {
    fn default() -> Self {
        Self::new("/dev/tty")
    }
}

impl TtyPrompt {
    /// Create a prompt on `device`.
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl ConsentPrompt for TtyPrompt {
    fn ask(&self, question: &str) -> Consent {
        let tty = match std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device)
        {
            Ok(tty) => tty,
            Err(e) => {
                tracing::debug!(device = %self.device.display(), error = %e, "No terminal for consent prompt");
                return Consent::Unavailable;
            }
        };

        let mut writer = &tty;
        if write!(writer, "{}{question}", crate::ui::PREFIX)
            .and_then(|()| writer.flush())
            .is_err()
        {
            return Consent::Unavailable;
        }

        let mut answer = String::new();
        match BufReader::new(&tty).read_line(&mut answer) {
            Ok(_) => parse_answer(&answer),
            Err(_) => Consent::Declined,
        }
    }
}

/// Only an explicit yes grants consent.
pub fn parse_answer(answer: &str) -> Consent {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Consent::Granted,
        _ => Consent::Declined,
    }
}
