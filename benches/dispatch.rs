//! Event dispatch benchmark suite.
//!
//! Benchmarks the two hot paths of the reader task:
//! - Emitter fan-out: listeners per topic 1, 8, 64
//! - Connection dispatch: frames routed from the transport to a session
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::{Value, json};
use tokio::runtime::Runtime;

use cdp_session::transport::channel_pair;
use cdp_session::{ConnectOptions, Connection, EventEmitter, SessionId};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const LISTENER_COUNTS: &[usize] = &[1, 8, 64];
const FRAMES_PER_ITER: u64 = 1_000;

// ============================================================================
// Benchmark: Emitter Fan-out
// ============================================================================

fn bench_emitter_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("emitter_fan_out");
    let event = json!({ "frameId": "M", "loaderId": "L1", "name": "load" });

    for &count in LISTENER_COUNTS {
        let emitter = EventEmitter::<Value>::new();
        let hits = Arc::new(AtomicU64::new(0));
        for _ in 0..count {
            let hits = Arc::clone(&hits);
            emitter.on("Page.lifecycleEvent", move |_| {
                hits.fetch_add(1, Ordering::Relaxed);
            });
        }

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("emit", count), &count, |b, _| {
            b.iter(|| emitter.emit("Page.lifecycleEvent", &event));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Connection Dispatch
// ============================================================================

fn bench_connection_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let mut group = c.benchmark_group("connection_dispatch");
    group.throughput(Throughput::Elements(FRAMES_PER_ITER));

    group.bench_function("session_events", |b| {
        let (connection, remote) = rt.block_on(async {
            let (transport, remote) = channel_pair();
            let connection =
                Connection::with_transport(transport, ConnectOptions::default()).expect("connection");

            let mut attached = connection.root().events("Target.attachedToTarget");
            remote
                .event(
                    "Target.attachedToTarget",
                    json!({ "sessionId": "S1", "targetInfo": { "targetId": "T1", "type": "page" } }),
                    None,
                )
                .expect("attach");
            attached.next_event().await.expect("attached");
            (connection, remote)
        });
        let session = connection.session(&SessionId::from("S1")).expect("session");
        let session_id = SessionId::from("S1");

        b.to_async(&rt).iter(|| {
            let mut stream = session.events("Network.loadingFinished");
            let remote = &remote;
            let session_id = &session_id;
            async move {
                for n in 0..FRAMES_PER_ITER {
                    remote
                        .event(
                            "Network.loadingFinished",
                            json!({ "requestId": n.to_string() }),
                            Some(session_id),
                        )
                        .expect("event");
                }
                for _ in 0..FRAMES_PER_ITER {
                    stream.next_event().await.expect("event");
                }
            }
        });

        connection.close();
    });

    group.finish();
}

criterion_group!(benches, bench_emitter_fan_out, bench_connection_dispatch);
criterion_main!(benches);
