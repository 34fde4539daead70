//! # Capture Orchestration
//!
//! Drives one tracing session from creation to disposal and hands the
//! recorded queues to the graph builder.
//!
//! ## Sequence
//!
//! ```text
//! controller thread                      listener thread
//! ─────────────────                      ───────────────
//! create session
//! spawn listener  ─────────────────────▶ mark started, EventSource::process
//! wait for "started"                       │ HeapDumpReader::process_event
//! kernel process + image load              │        ...
//! runtime @ GC only, informational         │
//! settle                                   │
//! rundown @ loader + start enumeration     │
//! runtime + native runtime @ heap dump     │
//! poll progress until complete / grace     │
//!   window / ceiling / cancel              │
//! dispose session  ─────────────────────▶ process returns
//! bounded wait on listener ◀───────────── (reader, result)
//! finalize
//! ```
//!
//! The runtime only drops its cached type names when the GC provider is
//! enabled without the type keywords, which is why it is enabled twice.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use heapsnap_common::{
    KERNEL_KEYWORD_IMAGE_LOAD, KERNEL_KEYWORD_PROCESS, KEYWORD_GC, KEYWORD_LOADER,
    KEYWORD_RUNDOWN_START, LEVEL_INFORMATIONAL, LEVEL_VERBOSE,
};

use super::config::CaptureConfig;
use super::demux::HeapDumpReader;
use super::heap_layout::HeapLayout;
use super::progress::CaptureProgress;
use super::selector::ProcessSelector;
use super::session::{EventSource, SessionFactory, TraceSession};
use crate::domain::{CaptureError, Pid, SessionError};
use crate::events::Provider;
use crate::graph::GraphSink;

/// What to capture and where the results go
#[derive(Debug)]
pub struct CaptureRequest<G> {
    pub selector: ProcessSelector,
    /// Persist the raw record stream here
    pub output: Option<PathBuf>,
    /// Graph to fill; returned in the result when supplied
    pub graph: Option<G>,
    pub collect_heap_layout: bool,
}

impl<G> CaptureRequest<G> {
    #[must_use]
    pub fn new(selector: ProcessSelector) -> Self {
        Self { selector, output: None, graph: None, collect_heap_layout: false }
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    #[must_use]
    pub fn with_graph(mut self, graph: G) -> Self {
        self.graph = Some(graph);
        self
    }

    #[must_use]
    pub fn with_heap_layout(mut self) -> Self {
        self.collect_heap_layout = true;
        self
    }
}

#[derive(Debug)]
pub struct CaptureResult<G> {
    /// A complete heap dump was captured and built
    pub success: bool,
    pub graph: Option<G>,
    pub heap_layout: Option<HeapLayout>,
    /// Process the dump came from
    pub pid: Option<Pid>,
}

impl<G> CaptureResult<G> {
    fn unsuccessful(pid: Option<Pid>) -> Self {
        Self { success: false, graph: None, heap_layout: None, pid }
    }
}

/// Why the main wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    /// Nothing qualifying within the grace window
    NoDump,
    /// Absolute ceiling; `started` if an anchor had been seen
    Ceiling { started: bool },
    Cancelled,
    /// Listener returned on its own before completion
    StreamEnded { started: bool },
}

type ListenerOutput<G> = (HeapDumpReader<G>, Result<(), SessionError>);

pub struct HeapDumpCapture<F> {
    factory: F,
    config: CaptureConfig,
    cancel: Arc<AtomicBool>,
}

impl<F: SessionFactory> HeapDumpCapture<F> {
    #[must_use]
    pub fn new(factory: F, config: CaptureConfig) -> Self {
        Self { factory, config, cancel: Arc::new(AtomicBool::new(false)) }
    }

    /// Setting the returned flag makes a running capture stop waiting
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Capture one heap dump.
    ///
    /// "No dump observed" is an `Ok` result with `success == false`.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::Session`] if the session cannot be created, enabled
    ///   or disposed, or if record delivery fails
    /// - any graph construction error from
    ///   [`HeapDumpReader::finalize`], including a dump that started but
    ///   never completed before the ceiling
    pub fn capture<G>(&self, request: CaptureRequest<G>) -> Result<CaptureResult<G>, CaptureError>
    where
        G: GraphSink + Default + Send + 'static,
    {
        let CaptureRequest { selector, output, graph, collect_heap_layout } = request;
        let keep_graph = graph.is_some();
        let pid_filter = selector.pid();

        info!("Creating trace session '{}' for {selector}", self.config.session_name);
        let mut session = self.factory.create(&self.config.session_name, output.as_deref())?;

        let progress = Arc::new(CaptureProgress::new());
        let mut reader = HeapDumpReader::new(selector, graph.unwrap_or_default())
            .with_progress(Arc::clone(&progress));
        if collect_heap_layout {
            reader = reader.with_heap_layout();
        }

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let listener =
            session.take_source().and_then(|source| spawn_listener(source, reader, done_tx));
        let listener = match listener {
            Ok(listener) => listener,
            Err(e) => {
                if let Err(dispose_err) = session.dispose() {
                    warn!("Failed to dispose session after setup error: {dispose_err}");
                }
                return Err(e.into());
            }
        };

        let mut listener_done = false;
        let waited =
            self.drive(session.as_mut(), &progress, &done_rx, pid_filter, &mut listener_done);

        // Disposal is what makes the listener's blocking call return
        let disposed = session.dispose();
        info!("Trace session disposed");

        let joined = self.join_listener(listener, &done_rx, listener_done);
        let outcome = waited?;
        disposed?;

        let Some((mut reader, delivery)) = joined else {
            return Ok(CaptureResult::unsuccessful(None));
        };
        delivery?;

        let pid = reader.target();
        match outcome {
            WaitOutcome::NoDump
            | WaitOutcome::Ceiling { started: false }
            | WaitOutcome::StreamEnded { started: false } => {
                info!("No heap dump observed for {}", reader.describe_target());
                return Ok(CaptureResult::unsuccessful(pid));
            }
            WaitOutcome::Cancelled => {
                info!("Capture cancelled");
                return Ok(CaptureResult::unsuccessful(pid));
            }
            WaitOutcome::Completed
            | WaitOutcome::Ceiling { started: true }
            | WaitOutcome::StreamEnded { started: true } => {}
        }

        reader.finalize()?;
        let (graph, heap_layout) = reader.into_parts();
        Ok(CaptureResult { success: true, graph: keep_graph.then_some(graph), heap_layout, pid })
    }

    /// Enable providers, then wait until one of the exit conditions holds
    fn drive(
        &self,
        session: &mut dyn TraceSession,
        progress: &CaptureProgress,
        done_rx: &Receiver<()>,
        pid_filter: Option<Pid>,
        listener_done: &mut bool,
    ) -> Result<WaitOutcome, SessionError> {
        let started = Instant::now();
        while !progress.listener_started() {
            if started.elapsed() >= self.config.ceiling {
                warn!("Listener thread never started");
                return Ok(WaitOutcome::Ceiling { started: false });
            }
            thread::sleep(self.config.startup_poll);
        }

        self.enable_providers(session, pid_filter)?;

        let wait_start = Instant::now();
        loop {
            if progress.dump_complete() {
                return Ok(WaitOutcome::Completed);
            }
            if self.cancel.load(Ordering::Relaxed) {
                return Ok(WaitOutcome::Cancelled);
            }
            if done_rx.try_recv().is_ok() {
                *listener_done = true;
                warn!("Event stream ended before the heap dump completed");
                return Ok(WaitOutcome::StreamEnded { started: progress.dump_started() });
            }

            let elapsed = wait_start.elapsed();
            if !progress.dump_started() && elapsed >= self.config.grace_window {
                info!(
                    "No anchor GC within {:?} ({} events seen)",
                    self.config.grace_window,
                    progress.events()
                );
                return Ok(WaitOutcome::NoDump);
            }
            if elapsed >= self.config.ceiling {
                warn!(
                    "Gave up after {:?}: dump started={}, {} node blocks",
                    self.config.ceiling,
                    progress.dump_started(),
                    progress.node_blocks()
                );
                return Ok(WaitOutcome::Ceiling { started: progress.dump_started() });
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    fn enable_providers(
        &self,
        session: &mut dyn TraceSession,
        pid: Option<Pid>,
    ) -> Result<(), SessionError> {
        session.enable_kernel(KERNEL_KEYWORD_PROCESS | KERNEL_KEYWORD_IMAGE_LOAD)?;
        info!("✓ Enabled kernel process and image load events");

        // GC alone first: this flushes the runtime's type name cache
        session.enable_provider(Provider::Runtime, LEVEL_INFORMATIONAL, KEYWORD_GC, pid)?;
        info!("✓ Enabled {} provider (GC only)", Provider::Runtime);
        thread::sleep(self.config.provider_settle);

        let rundown_keywords = KEYWORD_LOADER | KEYWORD_RUNDOWN_START;
        session.enable_provider(Provider::Rundown, LEVEL_VERBOSE, rundown_keywords, pid)?;
        info!("✓ Enabled {} provider", Provider::Rundown);

        for provider in [Provider::Runtime, Provider::NativeRuntime] {
            session.enable_provider(provider, LEVEL_VERBOSE, self.config.heap_dump_keywords, pid)?;
            info!("✓ Enabled {provider} provider (heap dump)");
        }
        Ok(())
    }

    fn join_listener<G: GraphSink>(
        &self,
        listener: JoinHandle<ListenerOutput<G>>,
        done_rx: &Receiver<()>,
        already_done: bool,
    ) -> Option<ListenerOutput<G>> {
        if !already_done {
            match done_rx.recv_timeout(self.config.listener_join_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "Listener thread did not finish within {:?}; reader state is lost",
                        self.config.listener_join_timeout
                    );
                    return None;
                }
            }
        }
        match listener.join() {
            Ok(output) => Some(output),
            Err(_) => {
                warn!("Listener thread panicked");
                None
            }
        }
    }
}

fn spawn_listener<G>(
    mut source: Box<dyn EventSource>,
    mut reader: HeapDumpReader<G>,
    done_tx: Sender<()>,
) -> Result<JoinHandle<ListenerOutput<G>>, SessionError>
where
    G: GraphSink + Send + 'static,
{
    let handle = thread::Builder::new().name("heapsnap-listener".to_string()).spawn(move || {
        reader.progress().mark_listener_started();
        let result = source.process(&mut |event| reader.process_event(event));
        if let Err(e) = &result {
            warn!("Event delivery stopped with an error: {e}");
        }
        // The controller may have stopped waiting already
        let _ = done_tx.send(());
        (reader, result)
    })?;
    Ok(handle)
}
