//! JSON-lines trace recordings
//!
//! One [`TraceEvent`] per line, `kind`-tagged. Blank lines are ignored so
//! recordings can be concatenated or edited by hand.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::domain::ReplayError;
use crate::events::TraceEvent;

/// Read a whole recording into memory
///
/// # Errors
///
/// Returns [`ReplayError::Io`] if the file cannot be read, or
/// [`ReplayError::MalformedRecord`] naming the first bad line.
pub fn read_recording(path: impl AsRef<Path>) -> Result<Vec<TraceEvent>, ReplayError> {
    let file = File::open(path)?;
    parse_recording(BufReader::new(file))
}

/// Parse recording lines from any reader
///
/// # Errors
///
/// Same as [`read_recording`].
pub fn parse_recording(reader: impl BufRead) -> Result<Vec<TraceEvent>, ReplayError> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line)
            .map_err(|source| ReplayError::MalformedRecord { line: index + 1, source })?;
        events.push(event);
    }
    Ok(events)
}

/// Appends records to a recording file
pub struct TraceRecorder {
    writer: BufWriter<File>,
    records: u64,
}

impl TraceRecorder {
    /// # Errors
    ///
    /// Returns [`ReplayError::Io`] if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let file = File::create(path)?;
        Ok(Self { writer: BufWriter::new(file), records: 0 })
    }

    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub fn record(&mut self, event: &TraceEvent) -> Result<(), ReplayError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flush buffered records to disk
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Io`] if the flush fails.
    pub fn finish(mut self) -> Result<u64, ReplayError> {
        self.writer.flush()?;
        Ok(self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Pid, Timestamp};
    use crate::events::{GcStopEvent, Provider};
    use std::io::Cursor;

    #[test]
    fn test_blank_lines_are_skipped() {
        let input = "\n{\"kind\":\"gc_stop\",\"pid\":3,\"count\":1}\n\n";
        let events = parse_recording(Cursor::new(input)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pid(), Pid(3));
    }

    #[test]
    fn test_malformed_line_is_reported() {
        let input = "{\"kind\":\"gc_stop\",\"pid\":3,\"count\":1}\n{\"kind\":\"bogus\"}\n";
        let err = parse_recording(Cursor::new(input)).unwrap_err();
        assert!(matches!(err, ReplayError::MalformedRecord { line: 2, .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_recorder_output_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        let event = TraceEvent::GcStop(GcStopEvent {
            pid: Pid(9),
            timestamp: Timestamp(77),
            provider: Provider::Rundown,
            count: 4,
        });

        let mut recorder = TraceRecorder::create(&path).unwrap();
        recorder.record(&event).unwrap();
        assert_eq!(recorder.finish().unwrap(), 1);

        assert_eq!(read_recording(&path).unwrap(), vec![event]);
    }
}
