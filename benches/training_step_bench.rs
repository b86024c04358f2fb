//! Training step benchmarks
//!
//! Measures one forward pass and one full train step (forward, backward,
//! update) for a few network widths. Skips silently without a HIP device.
//!
//! Run with: `cargo bench --bench training_step_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use neuroforge::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

const WIDTHS: &[usize] = &[16, 256, 1024];

fn build(context: &DeviceContext, width: usize) -> NeuroResult<Network> {
    NetworkBuilder::with_inputs(context, &[width])?
        .add_layer(FeedForwardOptions::new(&[width]).with_activation(Activation::Tanh))?
        .add_output_layer(FeedForwardOptions::new(&[1]).with_activation(Activation::Sigmoid))?
        .build()
}

fn bench_training(c: &mut Criterion) {
    if !neuroforge::backend::is_available() {
        eprintln!("No HIP device available, skipping training_step_bench");
        return;
    }
    let context = DeviceContext::open().expect("failed to open device");
    let mut sequence = ExecutionSequence::new(&context).expect("failed to create sequence");
    let mut rng = StdRng::seed_from_u64(42);

    let mut group = c.benchmark_group("network");
    for &width in WIDTHS {
        let network = build(&context, width).expect("failed to build network");
        network
            .randomize_parameters(&mut sequence, &mut rng, 0.1)
            .expect("failed to initialize parameters");
        let inputs = vec![0.5f32; width];

        group.bench_with_input(BenchmarkId::new("predict", width), &width, |b, _| {
            b.iter(|| {
                black_box(network.predict(&mut sequence, &inputs).expect("predict failed"))
            })
        });
        group.bench_with_input(BenchmarkId::new("train_step", width), &width, |b, _| {
            b.iter(|| {
                network
                    .train_step(&mut sequence, &inputs, &[1.0])
                    .expect("train step failed");
                sequence.finish().expect("finish failed");
            })
        });
        network.dispose();
    }
    group.finish();
}

criterion_group!(benches, bench_training);
criterion_main!(benches);
