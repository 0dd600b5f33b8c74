//! Criterion benchmarks for the conversion pipeline's SIMD and resampling
//! kernels.
//!
//! Run with: cargo bench -p proctap-dsp
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use proctap_core::{Format, ResampleQuality, SampleFormat};
use proctap_dsp::{convert_chunk, convert_samples, resample_interleaved};

const SAMPLE_RATE: u32 = 48_000;
const BLOCK_SIZES: &[usize] = &[128, 512, 2048, 8192];

fn generate_int16_block(frames: usize, channels: u16) -> Vec<u8> {
    (0..frames * channels as usize)
        .flat_map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
            ((sample * 32_767.0) as i16).to_le_bytes()
        })
        .collect()
}

fn generate_f32_interleaved(frames: usize, channels: u16) -> Vec<f32> {
    (0..frames * channels as usize)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
        })
        .collect()
}

fn bench_convert_samples(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_samples_i16_to_f32");

    for &block_size in BLOCK_SIZES {
        let input = generate_int16_block(block_size, 2);

        group.bench_with_input(BenchmarkId::from_parameter(block_size), &block_size, |b, _| {
            b.iter(|| black_box(convert_samples(black_box(&input), SampleFormat::Int16, SampleFormat::Float32)));
        });
    }

    group.finish();
}

fn bench_resample_interleaved(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample_interleaved_48k_to_44k1");

    for &block_size in BLOCK_SIZES {
        let input = generate_f32_interleaved(block_size, 2);

        for quality in [ResampleQuality::Fast, ResampleQuality::Medium, ResampleQuality::Best] {
            group.bench_with_input(
                BenchmarkId::new(format!("{quality:?}"), block_size),
                &block_size,
                |b, _| {
                    b.iter(|| {
                        black_box(resample_interleaved(
                            black_box(&input),
                            2,
                            SAMPLE_RATE,
                            44_100,
                            quality,
                        ))
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_convert_chunk_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_chunk_full_pipeline");

    let from = Format {
        sample_rate: SAMPLE_RATE,
        channels: 2,
        sample_format: SampleFormat::Int16,
    };
    let to = Format {
        sample_rate: 44_100,
        channels: 1,
        sample_format: SampleFormat::Float32,
    };

    for &block_size in BLOCK_SIZES {
        let input = generate_int16_block(block_size, 2);

        group.bench_with_input(BenchmarkId::from_parameter(block_size), &block_size, |b, _| {
            b.iter_batched(
                || input.clone(),
                |bytes| black_box(convert_chunk(bytes, from, to, ResampleQuality::Best).unwrap()),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_convert_samples,
    bench_resample_interleaved,
    bench_convert_chunk_full_pipeline,
);
criterion_main!(benches);
