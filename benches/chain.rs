use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use webdyn::effects::EffectSettings;
use webdyn::effects::chain::EffectChain;
use webdyn::sim::sine_block;

const SAMPLE_RATE: f32 = 48000.0;
const FFT_SIZE: usize = 2048;

fn build_chain(settings: &EffectSettings) -> EffectChain {
    let mut chain = EffectChain::new(settings, SAMPLE_RATE, FFT_SIZE);
    chain.connect();
    chain
}

fn bench_block_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("Effect Chain Block Size");

    for &block_size in &[128usize, 256, 512, 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(block_size),
            &block_size,
            |b, &block_size| {
                let mut chain = build_chain(&EffectSettings::default());
                let input = sine_block(440.0, 0.8, SAMPLE_RATE, 0, block_size);
                let mut block = input.clone();

                b.iter(|| {
                    block.copy_from_slice(&input);
                    chain.process_block(black_box(&mut block));
                });
            },
        );
    }

    group.finish();
}

fn bench_active_vs_bypassed(c: &mut Criterion) {
    let mut group = c.benchmark_group("Active vs Bypassed");
    let input = sine_block(440.0, 0.8, SAMPLE_RATE, 0, 512);

    for (name, settings) in [
        ("active", EffectSettings::default()),
        ("bypassed", EffectSettings::neutral()),
    ] {
        group.bench_with_input(BenchmarkId::new("process", name), &settings, |b, settings| {
            let mut chain = build_chain(settings);
            let mut block = input.clone();

            b.iter(|| {
                block.copy_from_slice(&input);
                chain.process_block(black_box(&mut block));
            });
        });
    }

    group.finish();
}

fn bench_analyser(c: &mut Criterion) {
    let mut group = c.benchmark_group("Analyser");

    for &fft_size in &[512usize, 2048, 8192] {
        let mut chain = EffectChain::new(&EffectSettings::default(), SAMPLE_RATE, fft_size);
        chain.connect();
        let mut block = sine_block(1000.0, 0.5, SAMPLE_RATE, 0, fft_size);
        chain.process_block(&mut block);

        group.bench_with_input(
            BenchmarkId::new("frequency_bytes", fft_size),
            &fft_size,
            |b, _| b.iter(|| black_box(chain.frequency_bytes())),
        );
        group.bench_with_input(
            BenchmarkId::new("time_domain_bytes", fft_size),
            &fft_size,
            |b, _| b.iter(|| black_box(chain.time_domain_bytes())),
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_block_sizes,
    bench_active_vs_bypassed,
    bench_analyser
);
criterion_main!(benches);
