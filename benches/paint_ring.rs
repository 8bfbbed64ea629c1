use criterion::{criterion_group, criterion_main, Criterion};
use engine_bridge::pipeline::coalesce::drain_and_coalesce;
use engine_bridge::pipeline::messages::FramePainted;
use engine_bridge::pipeline::paint::{byte_len, PaintRing};
use engine_bridge::pipeline::queue::CommandQueue;
use engine_bridge::pipeline::{BufferPool, CommandKind, DirtyRegion, SurfaceHandle};

fn bench_apply_paint(c: &mut Criterion) {
    let (width, height) = (1280, 720);
    let frame = vec![0x7f; byte_len(width, height)];
    let mut ring = PaintRing::new(3, width, height);

    c.bench_function("apply_paint_full_frame", |b| {
        b.iter(|| {
            ring.apply_paint(&[DirtyRegion::full(width, height)], &frame, width, height)
                .expect("paint");
            if let Some(flip) = ring.flip() {
                ring.ack(flip.slot);
            }
        })
    });

    let rects: Vec<DirtyRegion> = (0..16)
        .map(|i| DirtyRegion::from_rect(i * 40, i * 20, 64, 32))
        .collect();
    c.bench_function("apply_paint_small_rects", |b| {
        b.iter(|| {
            ring.apply_paint(&rects, &frame, width, height)
                .expect("paint");
            if let Some(flip) = ring.flip() {
                ring.ack(flip.slot);
            }
        })
    });
}

fn bench_coalesce(c: &mut Criterion) {
    let pool = BufferPool::new();
    let from_engine = CommandQueue::new("engine-to-host");
    let to_engine = CommandQueue::new("host-to-engine");
    let surfaces: Vec<SurfaceHandle> = (0..8)
        .map(|index| SurfaceHandle {
            index,
            generation: 1,
        })
        .collect();

    c.bench_function("coalesce_64_frames_8_surfaces", |b| {
        b.iter(|| {
            for slot in 0..8u32 {
                for surface in &surfaces {
                    let mut buf = pool.acquire(CommandKind::FramePainted, *surface);
                    buf.write_payload(&FramePainted {
                        slot,
                        region: DirtyRegion::from_rect(slot as i32, 0, 8, 8),
                        width: 640,
                        height: 480,
                    })
                    .expect("encode");
                    from_engine.push(buf);
                }
            }
            let batch = drain_and_coalesce(&from_engine, &to_engine, &pool);
            for (_, buf) in batch.painted {
                pool.release(buf);
            }
            while let Some(ack) = to_engine.pop() {
                pool.release(ack);
            }
        })
    });
}

criterion_group!(benches, bench_apply_paint, bench_coalesce);
criterion_main!(benches);
