use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use super::record::{EventLogError, EventRecord};

/// Append-only destination for event records
///
/// Implementations must treat every append as final: once a record is
/// accepted it is never rewritten. Appends are serialized by the
/// narrator, so sinks need no internal locking.
pub trait EventSink: Send {
    /// Append one record; exactly once per (tick, character)
    fn append(&mut self, record: &EventRecord) -> Result<(), EventLogError>;

    /// Flush buffered records to durable storage
    fn flush(&mut self) -> Result<(), EventLogError>;
}

/// One-JSON-line-per-event file sink
///
/// The on-disk format is the wire format of [`EventRecord`]: one JSON
/// object per line, appended in commit order. IO failures are fatal to
/// the run and surface immediately.
pub struct JsonlEventSink {
    writer: BufWriter<File>,
    last_tick: Option<u64>,
    appended: u64,
}

impl JsonlEventSink {
    /// Open (or create) a log file for appending
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EventLogError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "event log opened");

        Ok(Self {
            writer: BufWriter::new(file),
            last_tick: None,
            appended: 0,
        })
    }

    /// Number of records appended through this handle
    pub fn appended(&self) -> u64 {
        self.appended
    }
}

impl EventSink for JsonlEventSink {
    fn append(&mut self, record: &EventRecord) -> Result<(), EventLogError> {
        record.validate()?;

        if let Some(last) = self.last_tick {
            if record.tick < last {
                return Err(EventLogError::NonMonotonicTick {
                    last,
                    got: record.tick,
                });
            }
        }

        let line = serde_json::to_string(record)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        // Durability before the next tick may start
        self.writer.flush()?;

        self.last_tick = Some(record.tick);
        self.appended += 1;
        debug!(
            tick = record.tick,
            character = %record.character_id,
            "event appended"
        );
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EventLogError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// In-memory sink for tests and replay harnesses
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    records: Vec<EventRecord>,
    last_tick: Option<u64>,
}

impl MemoryEventSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All appended records in commit order
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Take the records out, leaving the sink empty
    pub fn into_records(self) -> Vec<EventRecord> {
        self.records
    }
}

impl EventSink for MemoryEventSink {
    fn append(&mut self, record: &EventRecord) -> Result<(), EventLogError> {
        record.validate()?;

        if let Some(last) = self.last_tick {
            if record.tick < last {
                return Err(EventLogError::NonMonotonicTick {
                    last,
                    got: record.tick,
                });
            }
        }

        self.last_tick = Some(record.tick);
        self.records.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EventLogError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FinalRecord, TokenTotals};
    use vellum_world::{CharacterId, Intent, Outcome, Verdict, VerdictRecord};

    fn record_at(tick: u64, character: &str) -> EventRecord {
        let intent = Intent::new("wait", CharacterId::from(character), 0);
        EventRecord {
            tick,
            character_id: CharacterId::from(character),
            attempts: vec![VerdictRecord {
                intent: intent.clone(),
                verdict: Verdict::Approved,
                note: None,
            }],
            final_record: FinalRecord {
                intent,
                outcome: Outcome::approved(serde_json::json!({})),
                fallback: false,
                fallback_reason: None,
            },
            seed_labels: Vec::new(),
            token_usage: TokenTotals::default(),
            aborted: false,
        }
    }

    #[test]
    fn test_memory_sink_keeps_commit_order() {
        let mut sink = MemoryEventSink::new();
        sink.append(&record_at(1, "a")).unwrap();
        sink.append(&record_at(1, "b")).unwrap();
        sink.append(&record_at(2, "a")).unwrap();

        let ticks: Vec<u64> = sink.records().iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![1, 1, 2]);
    }

    #[test]
    fn test_monotone_tick_enforced() {
        let mut sink = MemoryEventSink::new();
        sink.append(&record_at(5, "a")).unwrap();

        assert!(matches!(
            sink.append(&record_at(4, "a")),
            Err(EventLogError::NonMonotonicTick { last: 5, got: 4 })
        ));
    }

    #[test]
    fn test_jsonl_sink_writes_one_line_per_event() {
        let path = std::env::temp_dir().join(format!(
            "vellum-events-test-{}.jsonl",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        {
            let mut sink = JsonlEventSink::open(&path).unwrap();
            sink.append(&record_at(1, "a")).unwrap();
            sink.append(&record_at(2, "a")).unwrap();
            sink.flush().unwrap();
            assert_eq!(sink.appended(), 2);
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: EventRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.tick, 1);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_record_rejected_before_write() {
        let mut sink = MemoryEventSink::new();
        let mut record = record_at(1, "a");
        record.attempts.clear();

        assert!(sink.append(&record).is_err());
        assert!(sink.records().is_empty());
    }
}
