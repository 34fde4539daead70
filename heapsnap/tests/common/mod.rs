//! Trace fixtures shared by the integration tests
#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use heapsnap::capture::CaptureConfig;
use heapsnap::domain::{Address, Pid, Timestamp};
use heapsnap::events::{
    BulkEdgeBlock, BulkEdgeValue, BulkNodeBlock, BulkNodeValue, BulkRootEdgeBlock, BulkTypeBlock,
    BulkTypeValue, GcStartEvent, GcStopEvent, ProcessStartEvent, Provider, RootEdgeValue,
    TraceEvent,
};
use heapsnap::replay::TraceRecorder;
use heapsnap_common::{
    GC_REASON_ALLOC_SMALL, GC_REASON_INDUCED, GC_TYPE_BACKGROUND, GC_TYPE_NON_CONCURRENT,
};

pub const SERVER_PID: Pid = Pid(100);
pub const OTHER_PID: Pid = Pid(200);

/// Timeouts short enough for tests
pub fn fast_config() -> CaptureConfig {
    CaptureConfig::default()
        .with_grace_window(Duration::from_secs(5))
        .with_ceiling(Duration::from_secs(20))
        .with_poll_interval(Duration::from_millis(5))
        .with_provider_settle(Duration::from_millis(1))
        .with_listener_join_timeout(Duration::from_secs(5))
}

/// Builds a record sequence one event at a time
#[derive(Default)]
pub struct TraceBuilder {
    events: Vec<TraceEvent>,
    clock: u64,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&mut self) -> Timestamp {
        self.clock += 10;
        Timestamp(self.clock)
    }

    pub fn process(mut self, pid: Pid, image_name: &str) -> Self {
        let timestamp = self.tick();
        self.events.push(TraceEvent::ProcessStart(ProcessStartEvent {
            pid,
            timestamp,
            image_name: image_name.to_string(),
        }));
        self
    }

    /// A background gen0 collection, never an anchor
    pub fn background_gc(mut self, pid: Pid, count: u32) -> Self {
        let timestamp = self.tick();
        self.events.push(TraceEvent::GcStart(GcStartEvent {
            pid,
            timestamp,
            provider: Provider::Runtime,
            count,
            depth: 0,
            gc_type: GC_TYPE_BACKGROUND,
            reason: GC_REASON_ALLOC_SMALL,
        }));
        self.gc_stop(pid, count)
    }

    /// Start of the induced blocking gen2 collection the runtime uses for a dump
    pub fn dump_gc_start(mut self, pid: Pid, count: u32) -> Self {
        let timestamp = self.tick();
        self.events.push(TraceEvent::GcStart(GcStartEvent {
            pid,
            timestamp,
            provider: Provider::Runtime,
            count,
            depth: 2,
            gc_type: GC_TYPE_NON_CONCURRENT,
            reason: GC_REASON_INDUCED,
        }));
        self
    }

    pub fn gc_stop(mut self, pid: Pid, count: u32) -> Self {
        let timestamp = self.tick();
        self.events.push(TraceEvent::GcStop(GcStopEvent {
            pid,
            timestamp,
            provider: Provider::Runtime,
            count,
        }));
        self
    }

    pub fn types(mut self, pid: Pid, index: u32, types: &[(u64, &str)]) -> Self {
        let timestamp = self.tick();
        self.events.push(TraceEvent::BulkType(BulkTypeBlock {
            pid,
            timestamp,
            provider: Provider::Runtime,
            index,
            types: types
                .iter()
                .map(|&(type_id, name)| BulkTypeValue {
                    type_id,
                    module_id: 0,
                    type_name_id: 0,
                    flags: 0,
                    name: name.to_string(),
                    type_parameters: Vec::new(),
                })
                .collect(),
        }));
        self
    }

    /// `(address, size, type_id, edge_count)` per node
    pub fn nodes(mut self, pid: Pid, index: u32, nodes: &[(u64, u64, u64, u32)]) -> Self {
        let timestamp = self.tick();
        self.events.push(TraceEvent::BulkNode(BulkNodeBlock {
            pid,
            timestamp,
            provider: Provider::Runtime,
            index,
            nodes: nodes
                .iter()
                .map(|&(address, size, type_id, edge_count)| BulkNodeValue {
                    address: Address(address),
                    size,
                    type_id,
                    edge_count,
                })
                .collect(),
        }));
        self
    }

    pub fn edges(mut self, pid: Pid, index: u32, targets: &[u64]) -> Self {
        let timestamp = self.tick();
        self.events.push(TraceEvent::BulkEdge(BulkEdgeBlock {
            pid,
            timestamp,
            provider: Provider::Runtime,
            index,
            edges: targets
                .iter()
                .map(|&t| BulkEdgeValue { target: Address(t), field_id: 0 })
                .collect(),
        }));
        self
    }

    /// `(object, kind, flags)` per root
    pub fn roots(mut self, pid: Pid, index: u32, roots: &[(u64, u32, u32)]) -> Self {
        let timestamp = self.tick();
        self.events.push(TraceEvent::BulkRootEdge(BulkRootEdgeBlock {
            pid,
            timestamp,
            provider: Provider::Runtime,
            index,
            roots: roots
                .iter()
                .map(|&(object, kind, flags)| RootEdgeValue {
                    object: Address(object),
                    kind,
                    flags,
                    root_id: Address(0),
                })
                .collect(),
        }));
        self
    }

    pub fn build(self) -> Vec<TraceEvent> {
        self.events
    }
}

/// A small server heap: a cache holding two strings, surrounded by noise
/// from an unrelated process and an ordinary background collection.
pub fn server_trace() -> Vec<TraceEvent> {
    TraceBuilder::new()
        .process(OTHER_PID, "C:\\tools\\Other.exe")
        .process(SERVER_PID, "C:\\apps\\MyServer.exe")
        .background_gc(SERVER_PID, 1)
        .types(SERVER_PID, 0, &[(1, "App.Cache"), (2, "System.String")])
        .types(OTHER_PID, 0, &[(1, "Other.Thing")])
        .dump_gc_start(OTHER_PID, 7)
        .nodes(OTHER_PID, 0, &[(0x9000, 64, 1, 0)])
        .gc_stop(OTHER_PID, 7)
        .dump_gc_start(SERVER_PID, 2)
        .nodes(SERVER_PID, 0, &[(0x1000, 48, 1, 2), (0x2000, 30, 2, 0)])
        .nodes(SERVER_PID, 1, &[(0x3000, 40, 2, 0)])
        .edges(SERVER_PID, 0, &[0x2000, 0x3000])
        .roots(SERVER_PID, 0, &[(0x1000, heapsnap_common::ROOT_KIND_STACK, 0)])
        .gc_stop(SERVER_PID, 2)
        .build()
}

pub fn write_recording(path: &Path, events: &[TraceEvent]) {
    let mut recorder = TraceRecorder::create(path).expect("Failed to create recording");
    for event in events {
        recorder.record(event).expect("Failed to record event");
    }
    recorder.finish().expect("Failed to finish recording");
}
