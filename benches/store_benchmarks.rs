use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sensor_host::SnapshotStore;
use serde_json::json;

/// Benchmark a single atomic publish
fn bench_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");
    let base = tempfile::tempdir().expect("Should create temp dir");
    let store = rt.block_on(async {
        SnapshotStore::init(base.path().join("bench"), &["sensor"])
            .await
            .expect("Should init store")
    });
    let readings = json!({
        "celsius": 42.5,
        "humidity": 31.0,
        "zones": {"zone0": 42.5, "zone1": 40.0}
    });

    c.bench_function("snapshot_publish", |b| {
        b.to_async(&rt).iter(|| async {
            store
                .publish("sensor", &readings)
                .await
                .expect("Should publish")
        })
    });
}

/// Benchmark publishing while readers hammer current.json
fn bench_publish_under_readers(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");
    let base = tempfile::tempdir().expect("Should create temp dir");
    let store = rt.block_on(async {
        let store = SnapshotStore::init(base.path().join("bench"), &["sensor"])
            .await
            .expect("Should init store");
        store
            .publish("sensor", &json!({"seq": 0}))
            .await
            .expect("Should publish");
        store
    });

    for readers in [1, 4, 8].iter() {
        c.bench_with_input(
            BenchmarkId::new("publish_with_readers", readers),
            readers,
            |b, &readers| {
                b.to_async(&rt).iter(|| {
                    let store = store.clone();
                    async move {
                        let mut handles = Vec::new();
                        for _ in 0..readers {
                            let path = store.current_path("sensor");
                            handles.push(tokio::spawn(async move {
                                tokio::fs::read(path).await.expect("Should read snapshot")
                            }));
                        }
                        store
                            .publish("sensor", &json!({"seq": 1}))
                            .await
                            .expect("Should publish");
                        futures_util::future::join_all(handles).await
                    }
                })
            },
        );
    }
}

criterion_group!(benches, bench_publish, bench_publish_under_readers);
criterion_main!(benches);
