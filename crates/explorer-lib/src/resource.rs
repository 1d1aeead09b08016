//! Resource quantity value types
//!
//! Normalized integer magnitudes with a human-readable rendering:
//! memory in bytes (binary SI suffixes), CPU in millicores (decimal cores).
//!
//! Both types are signed. CPU rates derived across a counter reset are
//! negative and are kept as such, so negative magnitudes are accepted and
//! rendered with a leading `-` rather than rejected.

use serde::{Deserialize, Serialize};
use std::fmt;

const BINARY_SUFFIXES: &[(&str, i64)] = &[
    ("Ei", 1 << 60),
    ("Pi", 1 << 50),
    ("Ti", 1 << 40),
    ("Gi", 1 << 30),
    ("Mi", 1 << 20),
    ("Ki", 1 << 10),
];

const MILLIS_PER_CORE: i64 = 1000;

/// Memory quantity in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryResource(i64);

impl MemoryResource {
    pub fn new(bytes: i64) -> Self {
        Self(bytes)
    }

    /// Canonical magnitude in bytes
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn to_mebibytes(&self) -> f64 {
        self.0 as f64 / (1 << 20) as f64
    }

    /// Render with the largest binary suffix not exceeding the magnitude.
    ///
    /// Exact multiples print as integers (`2Mi`), everything else with two
    /// decimals (`1.50Gi`). Values below 1Ki print as plain bytes.
    pub fn display(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();

        for (suffix, unit) in BINARY_SUFFIXES {
            let unit = *unit as u64;
            if magnitude >= unit {
                return if magnitude % unit == 0 {
                    format!("{}{}{}", sign, magnitude / unit, suffix)
                } else {
                    format!("{}{:.2}{}", sign, magnitude as f64 / unit as f64, suffix)
                };
            }
        }

        format!("{}{}", sign, magnitude)
    }
}

impl fmt::Display for MemoryResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// CPU quantity in millicores
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CpuResource(i64);

impl CpuResource {
    pub fn new(millicores: i64) -> Self {
        Self(millicores)
    }

    /// Canonical magnitude in millicores
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn to_cores(&self) -> f64 {
        self.0 as f64 / MILLIS_PER_CORE as f64
    }

    /// Whole cores print without a suffix (`2`), anything else in millicores (`833m`).
    pub fn display(&self) -> String {
        if self.0 != 0 && self.0 % MILLIS_PER_CORE == 0 {
            format!("{}", self.0 / MILLIS_PER_CORE)
        } else {
            format!("{}m", self.0)
        }
    }
}

impl fmt::Display for CpuResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}
