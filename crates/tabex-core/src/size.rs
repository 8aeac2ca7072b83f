/// Size formatting — human-readable byte counts for the size column.
///
/// All internal sizes are `u64` bytes. Floating point is only used
/// at the display-formatting boundary.
use std::fmt;

const UNITS: [&str; 6] = ["kB", "MB", "GB", "TB", "PB", "EB"];

/// A byte count split into a display number and a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanReadableSize {
    pub size: String,
    pub unit: &'static str,
}

impl HumanReadableSize {
    /// Placeholder for entries whose size is not known (yet).
    pub const UNKNOWN: HumanReadableSize = HumanReadableSize {
        size: String::new(),
        unit: "",
    };

    /// Binary units (1 kB = 1024 B). Bytes are shown as an integer,
    /// everything larger with two decimals.
    pub fn from_bytes(bytes: u64) -> Self {
        let mut value = bytes as f64;
        let mut order = 0;
        while value >= 1024.0 && order < UNITS.len() {
            value /= 1024.0;
            order += 1;
        }

        if order == 0 {
            Self {
                size: bytes.to_string(),
                unit: "B",
            }
        } else {
            Self {
                size: format!("{value:.2}"),
                unit: UNITS[order - 1],
            }
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.unit.is_empty()
    }
}

impl fmt::Display for HumanReadableSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return Ok(());
        }
        write!(f, "{} {}", self.size, self.unit)
    }
}

/// Shorthand for `HumanReadableSize::from_bytes(bytes).to_string()`.
pub fn format_size(bytes: u64) -> String {
    HumanReadableSize::from_bytes(bytes).to_string()
}
