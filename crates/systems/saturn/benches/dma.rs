use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emu_core::{FlatMemory, MemoryBus};
use emu_saturn::scu::dma::{DmaEngine, DmaTransfer, DESCRIPTOR_END, DESCRIPTOR_SIZE};

fn bench_memory() -> FlatMemory {
    let mut mem = FlatMemory::new(0x10_0000);
    let data: Vec<u8> = (0..0x4000u32).map(|i| i as u8).collect();
    mem.load(0x1000, &data);
    mem
}

fn bench_direct(c: &mut Criterion) {
    let mut group = c.benchmark_group("dma_direct");

    for length in [16u32, 1024, 16384].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(length), length, |b, &len| {
            let mut mem = bench_memory();
            let mut dma = DmaEngine::new(1024);
            b.iter(|| {
                let _ = dma.start(0, DmaTransfer::direct(0x1000, 0x8_0000, len));
                black_box(dma.run_to_completion(&mut mem));
            });
        });
    }

    group.finish();
}

fn bench_indirect(c: &mut Criterion) {
    let mut group = c.benchmark_group("dma_indirect");

    for descriptors in [4u32, 64, 256].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(descriptors),
            descriptors,
            |b, &count| {
                let mut mem = bench_memory();
                // 32-byte entries, the last one flagged
                let table = 0x6_0000;
                for i in 0..count {
                    let entry = table + i * DESCRIPTOR_SIZE;
                    let mut source = 0x1000 + i * 32;
                    if i + 1 == count {
                        source |= DESCRIPTOR_END;
                    }
                    mem.write_long(entry, 32);
                    mem.write_long(entry + 4, 0x8_0000 + i * 32);
                    mem.write_long(entry + 8, source);
                }
                let mut dma = DmaEngine::new(1024);
                b.iter(|| {
                    let _ = dma.start(1, DmaTransfer::indirect(table));
                    black_box(dma.run_to_completion(&mut mem));
                });
            },
        );
    }

    group.finish();
}

fn bench_preemption(c: &mut Criterion) {
    c.bench_function("dma_preempted_by_level0", |b| {
        let mut mem = bench_memory();
        let mut dma = DmaEngine::new(1024);
        b.iter(|| {
            let _ = dma.start(2, DmaTransfer::direct(0x1000, 0x8_0000, 1024));
            dma.run(&mut mem, 100);
            let _ = dma.start(0, DmaTransfer::direct(0x2000, 0x9_0000, 64));
            black_box(dma.run_to_completion(&mut mem));
        });
    });
}

criterion_group!(benches, bench_direct, bench_indirect, bench_preemption);
criterion_main!(benches);
