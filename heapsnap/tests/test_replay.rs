mod common;

use heapsnap::capture::ProcessSelector;
use heapsnap::domain::{Address, NodeIndex, Pid, Timestamp};
use heapsnap::events::{
    BulkWeakTableEdgeBlock, GenerationRangeEvent, Provider, TraceEvent, WeakTableEdgeValue,
};
use heapsnap::graph::{GraphSummary, HeapGraph};
use heapsnap::replay::{read_heap_dump_file, read_recording};
use heapsnap_common::{
    ROOT_FLAG_PINNING, ROOT_FLAG_WEAK_REF, ROOT_KIND_FINALIZER, ROOT_KIND_HANDLE, ROOT_KIND_STACK,
};

use common::{server_trace, write_recording, TraceBuilder, SERVER_PID};

/// Child of `parent` whose type is `name`
fn child_named(graph: &HeapGraph, parent: NodeIndex, name: &str) -> Option<NodeIndex> {
    graph
        .node(parent)
        .children
        .iter()
        .copied()
        .find(|&child| graph.node_type_name(child).as_deref() == Some(name))
}

#[test]
fn test_offline_build_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.jsonl");
    write_recording(&path, &server_trace());

    let reader = read_heap_dump_file(&path, ProcessSelector::parse("myserver"), HeapGraph::new())
        .expect("offline build failed");
    assert_eq!(reader.target(), Some(SERVER_PID));
    assert_eq!(reader.stats().node_blocks, 2);

    let (graph, _) = reader.into_parts();
    let summary = GraphSummary::from_graph(&graph, 10);
    assert_eq!(summary.defined_nodes, 3);
    assert_eq!(summary.top_types[0].name, "System.String");
    assert_eq!(summary.top_types[0].count, 2);
    assert_eq!(summary.top_types[0].bytes, 70);
}

#[test]
fn test_offline_without_dump_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quiet.jsonl");
    let events = TraceBuilder::new()
        .process(SERVER_PID, "MyServer.exe")
        .background_gc(SERVER_PID, 1)
        .build();
    write_recording(&path, &events);

    let err = read_heap_dump_file(&path, ProcessSelector::Pid(SERVER_PID), HeapGraph::new())
        .err()
        .expect("recording has no dump");
    assert!(format!("{err:#}").contains("No heap dump found for process PID:100"));
}

#[test]
fn test_malformed_recording_reports_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.jsonl");
    std::fs::write(
        &path,
        "{\"kind\":\"gc_stop\",\"pid\":1,\"count\":3}\n\n{\"kind\":\"gc_stop\",\"pid\":\"x\"}\n",
    )
    .unwrap();

    let err = read_recording(&path).unwrap_err();
    assert!(err.to_string().contains("line 3"));
}

#[test]
fn test_root_buckets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roots.jsonl");

    let mut events = TraceBuilder::new()
        .types(SERVER_PID, 0, &[(1, "App.Item")])
        .dump_gc_start(SERVER_PID, 5)
        .nodes(
            SERVER_PID,
            0,
            &[
                (0x100, 24, 1, 0),
                (0x200, 24, 1, 0),
                (0x300, 24, 1, 0),
                (0x400, 24, 1, 0),
                (0x500, 24, 1, 0),
            ],
        )
        .roots(
            SERVER_PID,
            0,
            &[
                (0x100, ROOT_KIND_STACK, 0),
                (0x200, ROOT_KIND_HANDLE, ROOT_FLAG_PINNING),
                (0x300, ROOT_KIND_HANDLE, 0),
                (0x400, ROOT_KIND_FINALIZER, 0),
                (0x500, ROOT_KIND_HANDLE, ROOT_FLAG_WEAK_REF),
            ],
        )
        .build();
    events.push(TraceEvent::BulkWeakTableEdge(BulkWeakTableEdgeBlock {
        pid: SERVER_PID,
        timestamp: Timestamp(500),
        provider: Provider::Runtime,
        index: 0,
        entries: vec![
            WeakTableEdgeValue {
                key: Address(0x100),
                value: Address(0x500),
                root_id: Address(0x77),
            },
            WeakTableEdgeValue { key: Address(0), value: Address(0x400), root_id: Address(0x78) },
        ],
    }));
    events.extend(TraceBuilder::new().gc_stop(SERVER_PID, 5).build());
    write_recording(&path, &events);

    let reader = read_heap_dump_file(&path, ProcessSelector::Pid(SERVER_PID), HeapGraph::new())
        .expect("offline build failed");
    assert_eq!(reader.stats().weak_roots_skipped, 1);
    let (graph, _) = reader.into_parts();
    let node = |address| graph.node_for_address(Address(address)).expect("object node");

    let root = graph.root().expect("root set");
    let locals = child_named(&graph, root, "[local vars]").expect("local vars bucket");
    assert_eq!(graph.node(locals).children, vec![node(0x100)]);

    let other = child_named(&graph, root, "[other roots]").expect("other roots bucket");
    let pinning = child_named(&graph, other, "[pinning Handles]").expect("pinning bucket");
    assert_eq!(graph.node(pinning).children, vec![node(0x200)]);
    let strong = child_named(&graph, other, "[strong Handles]").expect("strong bucket");
    assert_eq!(graph.node(strong).children, vec![node(0x300)]);
    let finalizer = child_named(&graph, other, "[finalizer Handles]").expect("finalizer bucket");
    assert_eq!(graph.node(finalizer).children, vec![node(0x400)]);

    // The weak handle roots nothing; only the keyed dependent handle does
    let dependent = child_named(&graph, other, "[Dependent Handles]").expect("dependent bucket");
    assert_eq!(graph.node(dependent).children, vec![node(0x500)]);
}

#[test]
fn test_generation_ranges_after_node_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layout.jsonl");
    let range = |generation, start, used| {
        TraceEvent::GenerationRange(GenerationRangeEvent {
            pid: SERVER_PID,
            timestamp: Timestamp(0),
            provider: Provider::Runtime,
            generation,
            range_start: Address(start),
            used_length: used,
            reserved_length: used * 2,
        })
    };

    let mut events = TraceBuilder::new()
        .types(SERVER_PID, 0, &[(1, "App.Item")])
        .dump_gc_start(SERVER_PID, 5)
        .build();
    // Before any node data: the pre-collection layout, ignored
    events.push(range(0, 0x1_0000, 0x9999));
    events.extend(TraceBuilder::new().nodes(SERVER_PID, 0, &[(0x1_0010, 24, 1, 0)]).build());
    events.push(range(0, 0x1_0000, 0x100));
    events.push(range(2, 0x8_0000, 0x4000));
    events.extend(TraceBuilder::new().gc_stop(SERVER_PID, 5).build());
    write_recording(&path, &events);

    let reader = read_heap_dump_file(&path, ProcessSelector::Pid(SERVER_PID), HeapGraph::new())
        .expect("offline build failed");
    let layout = reader.heap_layout().expect("layout collected");
    assert_eq!(layout.len(), 2);
    assert_eq!(layout.generation_of(Address(0x1_0010)), Some(0));
    assert_eq!(layout.generation_of(Address(0x8_0010)), Some(2));
    assert_eq!(layout.used_by_generation().get(&0), Some(&0x100));
}

#[test]
fn test_first_anchor_without_payload_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("retry.jsonl");
    let events = TraceBuilder::new()
        // Induced gen2 with nothing in it
        .dump_gc_start(SERVER_PID, 1)
        .roots(SERVER_PID, 0, &[(0x100, ROOT_KIND_STACK, 0)])
        .gc_stop(SERVER_PID, 1)
        .types(SERVER_PID, 0, &[(1, "App.Item")])
        .dump_gc_start(SERVER_PID, 2)
        .nodes(SERVER_PID, 0, &[(0x200, 24, 1, 0)])
        .roots(SERVER_PID, 0, &[(0x200, ROOT_KIND_STACK, 0)])
        .gc_stop(SERVER_PID, 2)
        .build();
    write_recording(&path, &events);

    let reader = read_heap_dump_file(&path, ProcessSelector::Pid(Pid(100)), HeapGraph::new())
        .expect("offline build failed");
    let (graph, _) = reader.into_parts();
    let root = graph.root().expect("root set");
    let locals = child_named(&graph, root, "[local vars]").expect("local vars bucket");
    let item = graph.node_for_address(Address(0x200)).expect("item node");
    assert_eq!(graph.node(locals).children, vec![item]);
}
