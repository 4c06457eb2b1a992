//! Publication cost estimates.

use serde::{Deserialize, Serialize};

/// Estimated cost of publishing an archive of a given size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Size rendered for humans, e.g. `1.5 KB`.
    pub human_size: String,
    /// Cost in the storage network's native unit.
    pub cost_native: f64,
    /// Cost in fiat; `None` when no quote was available.
    pub cost_fiat: Option<f64>,
}

impl Estimate {
    /// Fiat cost for display; an unknown quote renders as zero.
    pub fn fiat_or_zero(&self) -> f64 {
        self.cost_fiat.unwrap_or(0.0)
    }
}

const SIZES: [&str; 9] = ["Bytes", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Renders a byte count with 1024-based units and at most two decimals.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZES.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", SIZES[unit])
}
