use serde::{Deserialize, Serialize};

/// Record of a single stream open for audit purposes
///
/// Captures the label and derived sub-seed so a replay run can verify
/// that the narrator opened the same streams in the same order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOpenRecord {
    /// The free-form label the stream was opened under
    pub label: String,
    /// The derived 64-bit sub-seed
    pub sub_seed: u64,
}

/// Audit log of every stream opened from the root seed
///
/// Maintains a complete in-memory record of stream opens for
/// deterministic replay and verification purposes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedAuditLog {
    records: Vec<StreamOpenRecord>,
}

impl SeedAuditLog {
    /// Create a new empty audit log
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Record a stream open
    pub fn record_open(&mut self, label: &str, sub_seed: u64) {
        self.records.push(StreamOpenRecord {
            label: label.to_string(),
            sub_seed,
        });
    }

    /// Get all records in open order
    pub fn records(&self) -> &[StreamOpenRecord] {
        &self.records
    }

    /// Get all labels in open order
    pub fn labels(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.label.as_str()).collect()
    }

    /// Clear all records
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Number of recorded opens
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_log_ordering() {
        let mut log = SeedAuditLog::new();
        log.record_open("tick:1:char:a:intent", 10);
        log.record_open("tick:1:char:b:intent", 20);
        log.record_open("tick:2:char:a:intent", 30);

        assert_eq!(log.len(), 3);
        assert_eq!(
            log.labels(),
            vec![
                "tick:1:char:a:intent",
                "tick:1:char:b:intent",
                "tick:2:char:a:intent"
            ]
        );
    }

    #[test]
    fn test_audit_log_clear() {
        let mut log = SeedAuditLog::new();
        log.record_open("tick:1:char:a:intent", 10);
        assert!(!log.is_empty());

        log.clear();
        assert!(log.is_empty());
    }
}
