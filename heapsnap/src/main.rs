//! # heapsnap - Main Entry Point
//!
//! Supports two operational modes:
//! - **Session** (`heapsnap <PROCESS> --replay trace.jsonl`): full capture
//!   orchestration over a session, with grace window, ceiling and Ctrl+C
//! - **Offline** (`--offline`): scan a whole recording, then build the graph

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::sync::atomic::Ordering;
use std::time::Instant;

use heapsnap::capture::{CaptureRequest, HeapDumpCapture, HeapLayout, ProcessSelector};
use heapsnap::cli::Args;
use heapsnap::domain::Pid;
use heapsnap::graph::{GraphSummary, HeapGraph};
use heapsnap::replay::{read_heap_dump_file, ReplayFactory};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NO_DUMP: i32 = 3;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("missing required argument") || msg.contains("cannot use process argument") {
        EXIT_USAGE
    } else if msg.contains("no heap dump found") {
        EXIT_NO_DUMP
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let selector = args.selector()?;
    let Some(recording) = args.replay.clone() else {
        anyhow::bail!(
            "Missing required argument: --replay FILE\n\n\
             No OS tracing backend is built into this binary; capture from a recording:\n  \
             heapsnap MyServer --replay trace.jsonl"
        );
    };
    let started = Instant::now();

    if args.offline {
        let offline_selector = selector.clone();
        let reader = tokio::task::spawn_blocking(move || {
            read_heap_dump_file(&recording, offline_selector, HeapGraph::new())
        })
        .await
        .context("Capture task failed")??;

        let pid = reader.target();
        let (graph, layout) = reader.into_parts();
        print_summary(&args, pid, &graph, layout.as_ref(), started);
        return Ok(());
    }

    let factory = ReplayFactory::from_file(&recording)
        .with_context(|| format!("Failed to load recording {}", recording.display()))?;
    let capture = HeapDumpCapture::new(factory, args.capture_config());
    let cancel = capture.cancel_flag();

    let mut request = CaptureRequest::new(selector.clone()).with_graph(HeapGraph::new());
    if let Some(output) = &args.output {
        request = request.with_output(output);
    }
    if args.generations {
        request = request.with_heap_layout();
    }

    let mut task = tokio::task::spawn_blocking(move || capture.capture(request));

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    let result = loop {
        tokio::select! {
            joined = &mut task => break joined.context("Capture task failed")??,
            _ = &mut ctrl_c, if !interrupted => {
                info!("Interrupted, stopping capture");
                interrupted = true;
                cancel.store(true, Ordering::Relaxed);
            }
        }
    };

    if !result.success {
        return Err(unsuccessful_capture(&selector, interrupted));
    }
    let graph = result.graph.unwrap_or_default();
    print_summary(&args, result.pid, &graph, result.heap_layout.as_ref(), started);

    if let (Some(output), false) = (&args.output, args.quiet) {
        println!("saved: {}", output.display());
    }
    Ok(())
}

fn unsuccessful_capture(selector: &ProcessSelector, interrupted: bool) -> anyhow::Error {
    if interrupted {
        anyhow::anyhow!("Capture cancelled before a heap dump of {selector} completed")
    } else {
        anyhow::anyhow!("No heap dump found for {selector}")
    }
}

fn print_summary(
    args: &Args,
    pid: Option<Pid>,
    graph: &HeapGraph,
    layout: Option<&HeapLayout>,
    started: Instant,
) {
    let summary = GraphSummary::from_graph(graph, args.top);
    if args.quiet {
        println!("{} objects, {} bytes", summary.defined_nodes, summary.total_bytes);
        return;
    }

    let target = pid.map_or_else(|| "unknown process".to_string(), |pid| pid.to_string());
    println!("Heap snapshot of {target} in {:.1}s", started.elapsed().as_secs_f64());
    print!("{summary}");

    if let Some(layout) = layout {
        for (generation, used) in layout.used_by_generation() {
            println!("  gen{generation}: {used} bytes in use");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let selector = ProcessSelector::Name("MyServer".to_string());
        assert_eq!(exit_code_for(&unsuccessful_capture(&selector, false)), EXIT_NO_DUMP);
        assert_eq!(exit_code_for(&unsuccessful_capture(&selector, true)), EXIT_ERROR);
        let usage = anyhow::anyhow!("Missing required argument: --replay FILE");
        assert_eq!(exit_code_for(&usage), EXIT_USAGE);
    }
}
