mod common;

use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use common::context;
use dhtbench::stub::{spawn_cluster, StubStore};
use dhtbench::workload::{random_keys, value_for};
use dhtbench::{
    HttpNodeClient, NodeAddress, NodeApi, NodeSet, OperationError, SampleLogger, TimedRunner,
    WorkloadBenchmark,
};

fn client() -> HttpNodeClient {
    HttpNodeClient::new(Some(Duration::from_secs(5))).unwrap()
}

/// an address nothing listens on
fn dead_address() -> NodeAddress {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr.parse().unwrap()
}

#[test]
fn put_then_get_round_trips() {
    let store = StubStore::new();
    let nodes = spawn_cluster(1, &store).unwrap();
    let client = client();
    let node = nodes.bootstrap();

    client.put(node, "k1", "v1").unwrap();
    let reply = client.get(node, "k1").unwrap();

    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, "v1");
}

#[test]
fn unknown_keys_are_application_failures() {
    let nodes = spawn_cluster(1, &StubStore::new()).unwrap();

    let err = client().get(nodes.bootstrap(), "missing").unwrap_err();

    assert!(matches!(err, OperationError::Application { status: 404, .. }));
}

#[test]
fn unreachable_nodes_are_transport_failures() {
    let err = client().leave(&dead_address()).unwrap_err();
    assert!(matches!(err, OperationError::Transport(_)));
}

#[test]
fn helloworld_and_node_info_describe_the_node() {
    let nodes = spawn_cluster(2, &StubStore::new()).unwrap();
    let client = client();
    let (first, second) = (nodes.bootstrap(), &nodes.others()[0]);

    assert_eq!(client.hello_world(first).unwrap().body, first.as_str());
    client.join(second, first).unwrap();
    let info: serde_json::Value =
        serde_json::from_str(&client.node_info(second).unwrap().body).unwrap();
    assert_eq!(info["address"], second.as_str());
    assert_eq!(info["joined"], true);
}

#[test]
fn liveness_check_flags_dead_nodes_but_visits_all() {
    let live = spawn_cluster(2, &StubStore::new()).unwrap();
    let nodes = NodeSet::new(vec![
        live.bootstrap().clone(),
        dead_address(),
        live.others()[0].clone(),
    ])
    .unwrap();
    let (ctx, _dir) = context(nodes);

    let report = WorkloadBenchmark::new(client()).check_liveness(&ctx);

    assert_eq!(report.alive.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert!(!report.all_alive());
}

#[test]
fn workload_logs_one_sample_per_request() {
    let store = StubStore::new();
    let nodes = spawn_cluster(3, &store).unwrap();
    let (ctx, dir) = context(nodes);
    let keys = random_keys(10);
    let mut logger = SampleLogger::new(ctx.output.clone());

    let report = WorkloadBenchmark::new(client())
        .run(&ctx, &keys, 2, &mut logger)
        .unwrap();

    assert!(!report.failed());
    assert!(!report.correctness_failed());
    assert_eq!(report.put_passes.len(), 2);
    assert_eq!(report.get_passes.len(), 2);
    assert_eq!(store.len(), 10);
    assert_eq!(store.get(&keys[3]), Some(value_for(3)));

    let put_log = fs::read_to_string(dir.path().join("PUT_log.txt")).unwrap();
    let get_log = fs::read_to_string(dir.path().join("GET_log.txt")).unwrap();
    let put_all = fs::read_to_string(dir.path().join("PUT_ALL_log.txt")).unwrap();
    assert_eq!(put_log.lines().count(), 20);
    assert_eq!(get_log.lines().count(), 20);
    assert_eq!(put_all.lines().count(), 2);
    assert!(put_log.lines().all(|l| l.starts_with("3 ")));
}

#[test]
fn workload_detects_wrong_values() {
    let store = StubStore::new();
    let nodes = spawn_cluster(2, &store).unwrap();
    let (ctx, _dir) = context(nodes);
    let keys = random_keys(4);
    let mut logger = SampleLogger::new(ctx.output.clone());
    let bench = WorkloadBenchmark::new(client());

    bench.put_pass(&ctx, &keys, &mut logger).unwrap();
    store.insert(keys[1].clone(), "tampered".to_string());
    let pass = bench.get_pass(&ctx, &keys, &mut logger).unwrap();

    assert_eq!(pass.correctness_failures, 1);
    assert_eq!(pass.http_failures, 0);
    assert_eq!(ctx.counters.snapshot().correctness_failures, 1);
}

#[test]
fn failed_requests_are_logged_too() {
    let nodes = NodeSet::new(vec![dead_address()]).unwrap();
    let (ctx, dir) = context(nodes);
    let keys = random_keys(3);
    let mut logger = SampleLogger::new(ctx.output.clone());

    let pass = WorkloadBenchmark::new(client())
        .put_pass(&ctx, &keys, &mut logger)
        .unwrap();

    assert_eq!(pass.http_failures, 3);
    let log = fs::read_to_string(dir.path().join("PUT_log.txt")).unwrap();
    assert_eq!(log.lines().count(), 3);
}

#[test]
fn probe_passes_against_a_healthy_ring() {
    let nodes = spawn_cluster(3, &StubStore::new()).unwrap();
    let (ctx, _dir) = context(nodes);

    let report = TimedRunner::new(client()).probe(&ctx, false).unwrap();

    assert!(report.passed(), "{:?}", report);
    assert_eq!(report.checks.len(), 4);
}

#[test]
fn probe_survives_a_simulated_crash() {
    let nodes = spawn_cluster(3, &StubStore::new()).unwrap();
    let second = nodes.others()[0].clone();
    let (ctx, _dir) = context(nodes);
    let client = client();

    let report = TimedRunner::new(&client).probe(&ctx, true).unwrap();

    assert!(report.passed(), "{:?}", report);
    assert!(report.checks.iter().any(|c| c.stage == "after crash"));
    // the crashed node was recovered afterwards
    assert_eq!(client.hello_world(&second).unwrap().body, second.as_str());
}

#[test]
fn crashed_stub_only_answers_recover() {
    let nodes = spawn_cluster(1, &StubStore::new()).unwrap();
    let node = nodes.bootstrap();
    let client = client();

    client.sim_crash(node).unwrap();
    assert!(matches!(
        client.hello_world(node),
        Err(OperationError::Application { status: 503, .. })
    ));
    client.sim_recover(node).unwrap();
    assert!(client.hello_world(node).is_ok());
}

#[test]
fn growth_mode_runs_over_http() {
    let nodes = spawn_cluster(4, &StubStore::new()).unwrap();
    let (ctx, _dir) = context(nodes);

    let report = TimedRunner::new(client()).growth_and_measure(&ctx, 4, 2);

    assert_eq!(report.iterations.len(), 2);
    assert_eq!(ctx.counters.snapshot().application_failures, 0);
    assert_eq!(ctx.counters.snapshot().transport_failures, 0);
}

#[test]
fn silent_nodes_time_out_after_the_configured_limit() {
    // connections complete through the backlog but nothing ever answers
    let silent = TcpListener::bind("127.0.0.1:0").unwrap();
    let node: NodeAddress = silent.local_addr().unwrap().to_string().parse().unwrap();
    let client = HttpNodeClient::new(Some(Duration::from_secs(1))).unwrap();

    let start = Instant::now();
    let err = client.leave(&node).unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, OperationError::Transport(_)), "{:?}", err);
    assert!(elapsed >= Duration::from_millis(900), "gave up after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(10), "gave up after {:?}", elapsed);
}

#[test]
fn unusual_keys_are_stored_verbatim() {
    let store = StubStore::new();
    let nodes = spawn_cluster(1, &store).unwrap();
    let client = client();
    let node = nodes.bootstrap();

    let keys = ["a b/c?d#e", "...", ".hidden", "%2e%2e", "ключ"];
    for (i, key) in keys.iter().enumerate() {
        let value = value_for(i);
        client.put(node, key, &value).unwrap();
        assert_eq!(client.get(node, key).unwrap().body, value);
        assert_eq!(store.get(key), Some(value));
    }
    assert_eq!(store.len(), keys.len());
}

#[test]
fn dot_segment_keys_are_refused_before_sending() {
    let store = StubStore::new();
    let nodes = spawn_cluster(1, &store).unwrap();
    let client = client();
    let node = nodes.bootstrap();

    for key in &["", ".", ".."] {
        let put = client.put(node, key, "v");
        assert!(matches!(put, Err(OperationError::InvalidRequest(_))), "{:?}", put);
        let get = client.get(node, key);
        assert!(matches!(get, Err(OperationError::InvalidRequest(_))), "{:?}", get);
    }
    assert!(store.is_empty());
}

/// sends `request` on a fresh connection and returns the whole reply
fn raw_exchange(node: &NodeAddress, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(node.as_str()).unwrap();
    stream.write_all(request).unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).unwrap();
    reply
}

#[test]
fn chunked_bodies_are_read_in_full() {
    let store = StubStore::new();
    let nodes = spawn_cluster(1, &store).unwrap();

    let reply = raw_exchange(
        nodes.bootstrap(),
        b"PUT /storage/k HTTP/1.1\r\nHost: stub\r\nTransfer-Encoding: chunked\r\n\
          Connection: close\r\n\r\n5\r\nHello\r\n6\r\n World\r\n0\r\n\r\n",
    );

    assert!(reply.starts_with("HTTP/1.1 200"), "{}", reply);
    assert_eq!(store.get("k"), Some("Hello World".to_string()));
}

#[test]
fn non_utf8_bodies_are_rejected() {
    let store = StubStore::new();
    let nodes = spawn_cluster(1, &store).unwrap();

    let reply = raw_exchange(
        nodes.bootstrap(),
        b"PUT /storage/k HTTP/1.1\r\nHost: stub\r\nContent-Length: 2\r\n\
          Connection: close\r\n\r\n\xff\xfe",
    );

    assert!(reply.starts_with("HTTP/1.1 400"), "{}", reply);
    assert!(store.is_empty());
}
