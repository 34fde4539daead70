use anyhow::{Context, Result};
use log::info;
use std::path::Path;

use super::recording::read_recording;
use crate::capture::{HeapDumpReader, ProcessSelector};
use crate::graph::GraphSink;

/// Build a heap graph from a recording, offline.
///
/// The whole recording is scanned before the graph is built, so there is no
/// grace window or ceiling.
///
/// # Errors
///
/// Returns an error if the recording cannot be read, contains no complete
/// heap dump for `selector`, or is internally inconsistent.
pub fn read_heap_dump_file<G: GraphSink>(
    path: impl AsRef<Path>,
    selector: ProcessSelector,
    graph: G,
) -> Result<HeapDumpReader<G>> {
    let path = path.as_ref();
    let events =
        read_recording(path)
            .with_context(|| format!("Failed to read recording {}", path.display()))?;
    info!("Replaying {} records from {}", events.len(), path.display());

    let mut reader = HeapDumpReader::new(selector, graph).with_heap_layout();
    for event in &events {
        reader.process_event(event);
    }
    reader
        .finalize()
        .with_context(|| format!("Failed to build heap graph from {}", path.display()))?;
    Ok(reader)
}
