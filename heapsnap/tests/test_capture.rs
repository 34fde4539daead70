mod common;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use heapsnap::capture::{
    CaptureRequest, EventSource, HeapDumpCapture, ProcessSelector, SessionFactory, TraceSession,
};
use heapsnap::domain::{Address, CaptureError, Pid, SessionError};
use heapsnap::events::{Provider, TraceEvent};
use heapsnap::graph::HeapGraph;
use heapsnap::replay::{read_recording, ReplayFactory};
use heapsnap_common::{KEYWORD_GC, LEVEL_INFORMATIONAL, LEVEL_VERBOSE};

use common::{fast_config, server_trace, TraceBuilder, OTHER_PID, SERVER_PID};

/// Session calls, in order
type CallLog = Arc<Mutex<Vec<String>>>;

/// A session that records what the controller asked for and delivers a
/// fixed list of records as soon as the listener starts
struct ScriptedFactory {
    calls: CallLog,
    fail_provider: Option<Provider>,
    /// Keep the listener busy this long after disposal
    linger: Duration,
    events: Vec<TraceEvent>,
    /// Stop delivering after `events` instead of waiting for disposal
    ends_early: bool,
}

impl ScriptedFactory {
    fn new() -> Self {
        Self {
            calls: Arc::default(),
            fail_provider: None,
            linger: Duration::ZERO,
            events: Vec::new(),
            ends_early: false,
        }
    }
}

impl SessionFactory for ScriptedFactory {
    fn create(
        &self,
        name: &str,
        _output: Option<&Path>,
    ) -> Result<Box<dyn TraceSession>, SessionError> {
        self.calls.lock().unwrap().push(format!("create {name}"));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        Ok(Box::new(ScriptedSession {
            calls: Arc::clone(&self.calls),
            fail_provider: self.fail_provider,
            source: Some(ScriptedSource {
                stop_rx,
                linger: self.linger,
                events: self.events.clone(),
                ends_early: self.ends_early,
            }),
            stop_tx: Some(stop_tx),
        }))
    }
}

struct ScriptedSession {
    calls: CallLog,
    fail_provider: Option<Provider>,
    source: Option<ScriptedSource>,
    stop_tx: Option<crossbeam_channel::Sender<()>>,
}

impl TraceSession for ScriptedSession {
    fn enable_kernel(&mut self, keywords: u64) -> Result<(), SessionError> {
        self.calls.lock().unwrap().push(format!("kernel 0x{keywords:x}"));
        Ok(())
    }

    fn enable_provider(
        &mut self,
        provider: Provider,
        level: u8,
        keywords: u64,
        pid_filter: Option<Pid>,
    ) -> Result<(), SessionError> {
        if self.fail_provider == Some(provider) {
            return Err(SessionError::EnableFailed {
                provider: provider.to_string(),
                reason: "denied".to_string(),
            });
        }
        let filter = pid_filter.map_or_else(|| "none".to_string(), |pid| pid.0.to_string());
        let call = format!("{provider} level={level} keywords=0x{keywords:x} pid={filter}");
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    fn take_source(&mut self) -> Result<Box<dyn EventSource>, SessionError> {
        Ok(Box::new(self.source.take().expect("source taken twice")))
    }

    fn dispose(&mut self) -> Result<(), SessionError> {
        self.calls.lock().unwrap().push("dispose".to_string());
        self.stop_tx.take();
        Ok(())
    }
}

struct ScriptedSource {
    stop_rx: crossbeam_channel::Receiver<()>,
    linger: Duration,
    events: Vec<TraceEvent>,
    ends_early: bool,
}

impl EventSource for ScriptedSource {
    fn process(&mut self, handler: &mut dyn FnMut(&TraceEvent)) -> Result<(), SessionError> {
        for event in &self.events {
            handler(event);
        }
        if self.ends_early {
            return Ok(());
        }
        let _ = self.stop_rx.recv();
        std::thread::sleep(self.linger);
        Ok(())
    }
}

fn count(calls: &[String], call: &str) -> usize {
    calls.iter().filter(|c| c.as_str() == call).count()
}

#[test]
fn test_providers_enabled_in_order() {
    let factory = ScriptedFactory::new();
    let calls = Arc::clone(&factory.calls);
    let config = fast_config().with_grace_window(Duration::from_millis(20));
    let capture = HeapDumpCapture::new(factory, config);

    let request: CaptureRequest<HeapGraph> = CaptureRequest::new(ProcessSelector::Pid(Pid(42)));
    let result = capture.capture(request).expect("capture failed");
    assert!(!result.success);

    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls[0], "create heapsnap-gc-dump");
    assert!(calls[1].starts_with("kernel"));
    let gc_only = format!("Runtime level={LEVEL_INFORMATIONAL} keywords=0x{KEYWORD_GC:x} pid=42");
    assert_eq!(calls[2], gc_only);
    assert!(calls[3].starts_with("Rundown level=5"));
    assert!(calls[4].starts_with(&format!("Runtime level={LEVEL_VERBOSE}")));
    assert!(calls[5].starts_with("NativeRuntime level=5"));
    assert!(calls[5].ends_with("pid=42"));
    assert_eq!(calls.last().map(String::as_str), Some("dispose"));
}

#[test]
fn test_grace_window_expires_without_dump() {
    let factory = ScriptedFactory::new();
    let calls = Arc::clone(&factory.calls);
    let config = fast_config().with_grace_window(Duration::from_millis(50));
    let capture = HeapDumpCapture::new(factory, config);

    let selector = ProcessSelector::Name("MyServer".to_string());
    let request = CaptureRequest::new(selector).with_graph(HeapGraph::new());
    let result = capture.capture(request).expect("capture failed");

    assert!(!result.success);
    assert!(result.graph.is_none());
    assert_eq!(count(&calls.lock().unwrap(), "dispose"), 1);
}

#[test]
fn test_enable_failure_still_disposes() {
    let mut factory = ScriptedFactory::new();
    factory.fail_provider = Some(Provider::Rundown);
    let calls = Arc::clone(&factory.calls);
    let capture = HeapDumpCapture::new(factory, fast_config());

    let request: CaptureRequest<HeapGraph> = CaptureRequest::new(ProcessSelector::Any);
    let err = capture.capture(request).unwrap_err();

    assert!(matches!(err, CaptureError::Session(SessionError::EnableFailed { .. })));
    assert!(err.to_string().contains("Rundown"));
    assert_eq!(count(&calls.lock().unwrap(), "dispose"), 1);
}

#[test]
fn test_listener_join_is_bounded() {
    let mut factory = ScriptedFactory::new();
    factory.linger = Duration::from_secs(2);
    let config = fast_config()
        .with_grace_window(Duration::from_millis(20))
        .with_listener_join_timeout(Duration::from_millis(50));
    let capture = HeapDumpCapture::new(factory, config);

    let started = std::time::Instant::now();
    let request: CaptureRequest<HeapGraph> = CaptureRequest::new(ProcessSelector::Any);
    let result = capture.capture(request).expect("capture failed");

    assert!(!result.success);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_cancel_stops_waiting() {
    let factory = ScriptedFactory::new();
    let capture = HeapDumpCapture::new(factory, fast_config());
    capture.cancel_flag().store(true, Ordering::Relaxed);

    let request: CaptureRequest<HeapGraph> = CaptureRequest::new(ProcessSelector::Any);
    let result = capture.capture(request).expect("capture failed");
    assert!(!result.success);
}

#[test]
fn test_replay_capture_by_name() {
    let capture = HeapDumpCapture::new(ReplayFactory::new(server_trace()), fast_config());
    let request =
        CaptureRequest::new(ProcessSelector::parse("MyServer")).with_graph(HeapGraph::new());
    let result = capture.capture(request).expect("capture failed");

    assert!(result.success);
    assert_eq!(result.pid, Some(SERVER_PID));
    let graph = result.graph.expect("graph requested");

    let cache = graph.node_for_address(Address(0x1000)).expect("cache node");
    assert_eq!(graph.node_type_name(cache).as_deref(), Some("App.Cache"));
    assert_eq!(graph.node(cache).children.len(), 2);
    // The other process's dump never reaches this graph
    assert!(graph.node_for_address(Address(0x9000)).is_none());
    assert_eq!(graph.total_size(), 118);

    let root = graph.root().expect("root set");
    assert_eq!(graph.node_type_name(root).as_deref(), Some("[.NET Roots]"));
}

#[test]
fn test_replay_capture_any_takes_first_dump() {
    let capture = HeapDumpCapture::new(ReplayFactory::new(server_trace()), fast_config());
    let request = CaptureRequest::new(ProcessSelector::Any).with_graph(HeapGraph::new());
    let result = capture.capture(request).expect("capture failed");

    assert!(result.success);
    assert_eq!(result.pid, Some(OTHER_PID));
    let graph = result.graph.expect("graph requested");
    let node = graph.node_for_address(Address(0x9000)).expect("other node");
    assert_eq!(graph.node_type_name(node).as_deref(), Some("Other.Thing"));
}

#[test]
fn test_replay_capture_without_graph_request() {
    let capture = HeapDumpCapture::new(ReplayFactory::new(server_trace()), fast_config());
    let request: CaptureRequest<HeapGraph> = CaptureRequest::new(ProcessSelector::Pid(SERVER_PID));
    let result = capture.capture(request).expect("capture failed");

    assert!(result.success);
    assert!(result.graph.is_none());
}

#[test]
fn test_replay_capture_records_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("captured.jsonl");
    let events = server_trace();

    let capture = HeapDumpCapture::new(ReplayFactory::new(events.clone()), fast_config());
    let request: CaptureRequest<HeapGraph> =
        CaptureRequest::new(ProcessSelector::parse("MyServer")).with_output(&output);
    let result = capture.capture(request).expect("capture failed");
    assert!(result.success);

    // No pid filter for a name selector: every record was delivered
    let recorded = read_recording(&output).expect("recording readable");
    assert_eq!(recorded, events);
}

#[test]
fn test_pid_filter_drops_other_processes() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("filtered.jsonl");

    let capture = HeapDumpCapture::new(ReplayFactory::new(server_trace()), fast_config());
    let request: CaptureRequest<HeapGraph> =
        CaptureRequest::new(ProcessSelector::Pid(SERVER_PID)).with_output(&output);
    assert!(capture.capture(request).expect("capture failed").success);

    let recorded = read_recording(&output).expect("recording readable");
    assert!(!recorded.is_empty());
    // Kernel records bypass the provider filter; runtime records do not
    assert!(recorded
        .iter()
        .filter(|e| e.provider() != Provider::Kernel)
        .all(|e| e.pid() == SERVER_PID));
}

/// Anchor start and some node data, but the collection never ends
fn unfinished_dump() -> Vec<TraceEvent> {
    TraceBuilder::new()
        .types(SERVER_PID, 0, &[(1, "App.Item")])
        .dump_gc_start(SERVER_PID, 3)
        .nodes(SERVER_PID, 0, &[(0x1000, 24, 1, 0)])
        .build()
}

#[test]
fn test_ceiling_after_dump_started_reports_incomplete() {
    let config = fast_config().with_ceiling(Duration::from_millis(200));
    let capture = HeapDumpCapture::new(ReplayFactory::new(unfinished_dump()), config);

    let request =
        CaptureRequest::new(ProcessSelector::Pid(SERVER_PID)).with_graph(HeapGraph::new());
    let err = capture.capture(request).unwrap_err();

    assert!(matches!(err, CaptureError::DumpIncomplete(ref who) if who == "process PID:100"));
}

#[test]
fn test_stream_end_after_dump_started_reports_incomplete() {
    let mut factory = ScriptedFactory::new();
    factory.events = unfinished_dump();
    factory.ends_early = true;
    let calls = Arc::clone(&factory.calls);
    let capture = HeapDumpCapture::new(factory, fast_config());

    let request =
        CaptureRequest::new(ProcessSelector::Pid(SERVER_PID)).with_graph(HeapGraph::new());
    let err = capture.capture(request).unwrap_err();

    assert!(matches!(err, CaptureError::DumpIncomplete(_)));
    assert_eq!(count(&calls.lock().unwrap(), "dispose"), 1);
}
