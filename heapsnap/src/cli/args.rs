//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::capture::{CaptureConfig, ProcessSelector};

#[derive(Parser, Debug)]
#[command(
    name = "heapsnap",
    about = "Capture a snapshot of a .NET process's GC heap from a trace",
    after_help = "\
EXAMPLES:
    heapsnap MyServer --replay trace.jsonl            Replay through a capture session
    heapsnap --pid 1234 --replay trace.jsonl          Explicit PID
    heapsnap '*' --replay trace.jsonl --offline       First process with a dump, offline scan
    heapsnap MyServer --replay in.jsonl --output out.jsonl   Keep the delivered records"
)]
pub struct Args {
    /// Process to capture: image name, numeric PID, or '*' for the first one with a dump
    #[arg(value_name = "PROCESS")]
    pub process: Option<String>,

    /// Process ID to capture
    #[arg(short, long)]
    pub pid: Option<u32>,

    /// Recorded trace (JSON lines) to capture from
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Scan the whole recording, then build (no session, no timeouts)
    #[arg(long, requires = "replay")]
    pub offline: bool,

    /// Persist the raw records delivered during the capture
    #[arg(short, long, value_name = "FILE", conflicts_with = "offline")]
    pub output: Option<PathBuf>,

    /// Seconds to wait for the heap dump to start
    #[arg(long, default_value = "5")]
    pub grace: u64,

    /// Upper bound in seconds for the whole capture
    #[arg(long, default_value = "100")]
    pub timeout: u64,

    /// Number of types to list in the summary
    #[arg(long, default_value = "20")]
    pub top: usize,

    /// Also collect GC generation ranges
    #[arg(long)]
    pub generations: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Process selection from `PROCESS` or `--pid`
    ///
    /// # Errors
    ///
    /// Returns an error if neither or both are given.
    pub fn selector(&self) -> anyhow::Result<ProcessSelector> {
        match (&self.process, self.pid) {
            (Some(_), Some(_)) => anyhow::bail!(
                "Cannot use PROCESS argument with --pid.\n\n\
                 Use either:\n  \
                 heapsnap MyServer       (by name)\n  \
                 heapsnap --pid 1234     (explicit PID)"
            ),
            (Some(process), None) => Ok(ProcessSelector::parse(process)),
            (None, Some(pid)) => Ok(ProcessSelector::Pid(pid.into())),
            (None, None) => anyhow::bail!(
                "Missing required argument: PROCESS or --pid\n\n\
                 Usage:\n  \
                 heapsnap MyServer --replay trace.jsonl\n  \
                 heapsnap --pid 1234 --replay trace.jsonl\n\n\
                 Run 'heapsnap --help' for more options"
            ),
        }
    }

    #[must_use]
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig::default()
            .with_grace_window(Duration::from_secs(self.grace))
            .with_ceiling(Duration::from_secs(self.timeout))
    }
}
