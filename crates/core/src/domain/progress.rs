// Progress & Result value objects shared by worker and registry

use serde::{Deserialize, Serialize};

/// Counters reported by the pipeline routine while a playlist is imported.
///
/// `total` may stay 0 until the playlist has been enumerated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub total: u32,
    pub processed: u32,
    pub imported: u32,
    pub errors: u32,
}

impl ProgressUpdate {
    pub fn new(total: u32, processed: u32, imported: u32, errors: u32) -> Self {
        Self {
            total,
            processed,
            imported,
            errors,
        }
    }

    /// `imported + errors <= processed`, and `processed <= total` once total is known
    pub fn is_consistent(&self) -> bool {
        let settled = u64::from(self.imported) + u64::from(self.errors);
        if settled > u64::from(self.processed) {
            return false;
        }
        self.total == 0 || self.processed <= self.total
    }

    /// True if any counter is lower than in `previous`
    pub fn regresses_from(&self, previous: &ProgressUpdate) -> bool {
        self.total < previous.total
            || self.processed < previous.processed
            || self.imported < previous.imported
            || self.errors < previous.errors
    }
}

/// Opaque success payload returned by the pipeline routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImportResult(serde_json::Value);

impl ImportResult {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}
