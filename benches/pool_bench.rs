use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use peer_link::{BufferPool, Connection, DataHandler, PipePeerConnection};
use std::sync::Arc;

#[allow(clippy::unwrap_used)]
fn bench_pool_take_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool");

    let pool = BufferPool::new(1300, 100, 5000).unwrap();
    group.bench_function("take_release_warm", |b| {
        b.iter(|| {
            let buffer = pool.take();
            black_box(buffer.len());
            buffer.release();
        })
    });

    group.bench_function("take_release_burst_64", |b| {
        b.iter_batched(
            || BufferPool::new(1300, 16, 64).unwrap(),
            |pool| {
                let held: Vec<_> = (0..64).map(|_| pool.take()).collect();
                drop(held);
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_pipe_send(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipe_send");
    let sizes = [16usize, 256, 1200];

    let sink: Arc<dyn DataHandler> = Arc::new(|_: &Arc<dyn Connection>, msg: &[u8]| {
        black_box(msg.len());
    });
    let (client, _server) = PipePeerConnection::create(sink.clone(), sink, None, None);

    for &size in &sizes {
        let payload = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("reliable_{size}b"), |b| {
            b.iter(|| client.send_reliable(black_box(&payload)))
        });
        group.bench_function(format!("notify_{size}b"), |b| {
            b.iter(|| black_box(client.send_notify(&payload)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pool_take_release, bench_pipe_send);
criterion_main!(benches);
