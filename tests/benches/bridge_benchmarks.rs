//! # Wallet Bridge Benchmarks
//!
//! | Path | Target |
//! |------|--------|
//! | Client round trip (in-memory service) | < 50µs |
//! | Relay round trip (client → relay → engine) | < 100µs |
//! | Engine message decode | < 5µs |

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use tokio::runtime::Runtime;

use wallet_backend::engine::channel::channel_engine;
use wallet_backend::ipc::channel::channel_connector;
use wallet_backend::{BackendService, BridgeConfig, EngineConfig, EngineMessage, WalletBackendApi};
use wallet_bus::InMemoryEventBus;

// ============================================================================
// Client: request router and transport against an echoing service end
// ============================================================================

fn bench_client_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("client");
    group.measurement_time(Duration::from_secs(5));

    let api = rt.block_on(async {
        let (connector, mut links) = channel_connector();
        let api = WalletBackendApi::start(
            Arc::new(connector),
            Arc::new(InMemoryEventBus::new()),
            BridgeConfig::default(),
        );
        let mut peer = links.recv().await.expect("link");
        tokio::spawn(async move {
            while let Some(command) = peer.next_command().await {
                peer.reply(command.id, &command.operation, command.args);
            }
        });
        api
    });

    for batch in [1usize, 16, 128] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("round_trip", batch), &batch, |b, &batch| {
            b.iter(|| {
                rt.block_on(async {
                    let calls: Vec<_> = (0..batch)
                        .map(|i| api.send_request("getBalances", Some(json!({"i": i}))))
                        .collect();
                    for call in calls {
                        black_box(call.await.expect("reply"));
                    }
                })
            })
        });
    }
    group.finish();
}

// ============================================================================
// Relay: client frames renumbered into the engine's ID space and back
// ============================================================================

fn bench_relay_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("relay");
    group.measurement_time(Duration::from_secs(5));

    let api = rt.block_on(async {
        let (engine, mut instances) = channel_engine();
        tokio::spawn(async move {
            while let Some(mut end) = instances.recv().await {
                tokio::spawn(async move {
                    while let Some(request) = end.next_request().await {
                        end.respond(&request, json!({}));
                    }
                });
            }
        });
        let bus = Arc::new(InMemoryEventBus::new());
        let service = BackendService::spawn(Arc::new(engine), &EngineConfig::default(), Arc::clone(&bus))
            .await
            .expect("relay");
        WalletBackendApi::start(Arc::new(service), bus, BridgeConfig::default())
    });

    group.bench_function("round_trip", |b| {
        b.iter(|| rt.block_on(async { black_box(api.request("getPendingOperations", None).await) }))
    });
    group.finish();
}

// ============================================================================
// Engine protocol decoding
// ============================================================================

fn bench_engine_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine-protocol");
    let response = json!({
        "type": "response",
        "operation": "getBalances",
        "id": 42,
        "result": {"byCurrency": {"KUDOS": {"available": "KUDOS:10", "pendingIncoming": "KUDOS:0"}}}
    })
    .to_string();
    let tunnel = json!({"type": "tunnelHttp", "url": "https://ex.test/keys", "method": "GET"}).to_string();

    group.bench_function("decode_response", |b| {
        b.iter(|| black_box(serde_json::from_str::<EngineMessage>(black_box(&response))))
    });
    group.bench_function("decode_tunnel", |b| {
        b.iter(|| black_box(serde_json::from_str::<EngineMessage>(black_box(&tunnel))))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_client_round_trip,
    bench_relay_round_trip,
    bench_engine_decode
);
criterion_main!(benches);
