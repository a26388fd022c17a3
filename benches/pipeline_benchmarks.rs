use criterion::{criterion_group, criterion_main, Criterion};
use streamfeed::prelude::*;

fn bench_pipelines(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("drive_10k_elements", |b| {
        b.iter(|| {
            rt.block_on(async {
                let runtime = Runtime::new();
                let done = IterSource::new(0..10_000u32).run_into(Ignore::new(), &runtime);
                done.wait().await;
                runtime.shutdown().await;
            })
        })
    });

    c.bench_function("drive_10k_through_filter_map", |b| {
        b.iter(|| {
            rt.block_on(async {
                let runtime = Runtime::new();
                let done = IterSource::new(0..10_000u32)
                    .through(Pipe::filter(|n: &u32| n % 2 == 0))
                    .through(Pipe::map(|n| n * 2))
                    .run_into(Ignore::new(), &runtime);
                done.wait().await;
                runtime.shutdown().await;
            })
        })
    });

    c.bench_function("hub_fan_out_1k_to_4", |b| {
        b.iter(|| {
            rt.block_on(async {
                let runtime = Runtime::new();
                let feed: PushSource<u32> = PushSource::new();
                let hub = Hub::started(feed.clone(), &runtime);
                let mut dones = Vec::new();
                for _ in 0..4 {
                    dones.push(hub.add(Ignore::new()).await);
                }
                for n in 0..1_000u32 {
                    feed.push(n);
                }
                feed.stop();
                for done in dones {
                    done.wait().await;
                }
                runtime.shutdown().await;
            })
        })
    });
}

criterion_group!(benches, bench_pipelines);
criterion_main!(benches);
