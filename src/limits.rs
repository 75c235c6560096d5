//! Row/byte ceilings for a run (or per source) and the governor that enforces them.

use serde::{Deserialize, Serialize};

/// Whether limit counters span the whole run or restart for each source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    #[default]
    Global,
    PerSource,
}

/// Two independent, optional caps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Limits {
    pub max_rows: Option<u64>,
    pub max_bytes: Option<u64>,
}

impl Limits {
    pub fn new(max_rows: Option<u64>, max_bytes: Option<u64>) -> Self {
        Self { max_rows, max_bytes }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_rows.is_none() && self.max_bytes.is_none()
    }

    /// False as soon as either configured cap has been reached.
    pub fn should_continue(&self, rows_emitted: u64, bytes_emitted: u64) -> bool {
        self.max_rows.map_or(true, |m| rows_emitted < m) && self.max_bytes.map_or(true, |m| bytes_emitted < m)
    }
}

/// Tracks emitted rows/bytes against [`Limits`].
///
/// The byte size of a record is only known after serialization, so the record that crosses the
/// byte cap is still admitted; it is the last one.
#[derive(Debug, Default)]
pub struct LimitGovernor {
    limits: Limits,
    rows: u64,
    bytes: u64,
}

impl LimitGovernor {
    pub fn new(limits: Limits) -> Self {
        Self { limits, rows: 0, bytes: 0 }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn should_continue(&self) -> bool {
        self.limits.should_continue(self.rows, self.bytes)
    }

    /// Count one serialized record of `line_bytes` if the caps still allow it.
    /// Check and count happen together so a shared governor never overshoots.
    pub fn admit(&mut self, line_bytes: u64) -> bool {
        if !self.should_continue() {
            return false;
        }
        self.rows += 1;
        self.bytes += line_bytes;
        true
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}
