//! Shared GPU fixture for integration tests
//!
//! The device context is opened once per test binary. When no HIP runtime or
//! device is present the fixture is `None` and GPU tests return early.
//! Tests run `#[serial]` so leak checks see only their own allocations.
//!
//! ```ignore
//! #[test]
//! #[serial]
//! fn my_gpu_test() {
//!     let Some(fixture) = gpu() else { return };
//!     let mut sequence = fixture.sequence();
//!     // ... test code ...
//!     fixture.assert_no_leak(5);
//! }
//! ```

#![allow(dead_code)]

use neuroforge::backend::{is_available, DeviceContext, ExecutionSequence};
use neuroforge::network::{FeedForwardOptions, Network, NetworkBuilder};
use neuroforge::Activation;
use once_cell::sync::Lazy;
pub use serial_test::serial;

pub static GPU_FIXTURE: Lazy<Option<GpuTestFixture>> = Lazy::new(|| {
    neuroforge::logging::init_logging_default();

    if !is_available() {
        eprintln!("WARNING: HIP runtime or device not available - skipping GPU tests");
        return None;
    }

    match GpuTestFixture::new() {
        Ok(fixture) => {
            eprintln!(
                "GPU test fixture on {} ({} MB free)",
                fixture.context.info().name,
                fixture.initial_free_mb
            );
            Some(fixture)
        }
        Err(e) => {
            eprintln!("ERROR: failed to initialize GPU test fixture: {}", e);
            None
        }
    }
});

pub fn gpu() -> Option<&'static GpuTestFixture> {
    GPU_FIXTURE.as_ref()
}

pub struct GpuTestFixture {
    context: DeviceContext,
    initial_free_mb: usize,
    initial_total_mb: usize,
}

impl GpuTestFixture {
    fn new() -> anyhow::Result<Self> {
        let context = DeviceContext::open()?;
        let (free, total) = context.memory_info()?;
        Ok(GpuTestFixture {
            context,
            initial_free_mb: free / 1024 / 1024,
            initial_total_mb: total / 1024 / 1024,
        })
    }

    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// A fresh execution sequence; every test gets its own
    pub fn sequence(&self) -> ExecutionSequence {
        ExecutionSequence::new(&self.context).expect("failed to create execution sequence")
    }

    /// Panics if free memory dropped by more than `tolerance_percent` of the total
    pub fn assert_no_leak(&self, tolerance_percent: usize) {
        let (free, _total) = self
            .context
            .memory_info()
            .expect("failed to query GPU memory");

        let free_mb = free / 1024 / 1024;
        let leaked_mb = self.initial_free_mb.saturating_sub(free_mb);
        let tolerance_mb = (self.initial_total_mb * tolerance_percent) / 100;
        assert!(
            leaked_mb <= tolerance_mb,
            "GPU memory leak: initial free {} MB, now {} MB (tolerance {} MB)",
            self.initial_free_mb,
            free_mb,
            tolerance_mb
        );
    }
}

pub fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch: {:?} vs {:?}",
        actual,
        expected
    );
    for (index, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "element {}: got {}, expected {} (actual {:?})",
            index,
            a,
            e,
            actual
        );
    }
}

/// `[2] -> [3]` ReLU output layer with learning rate 0.1
pub fn two_to_three_network(context: &DeviceContext) -> Network {
    NetworkBuilder::with_inputs(context, &[2])
        .and_then(|builder| {
            builder.add_output_layer(
                FeedForwardOptions::new(&[3])
                    .with_activation(Activation::Relu)
                    .with_learning_rate(0.1),
            )
        })
        .and_then(|builder| builder.build())
        .expect("failed to build 2->3 network")
}

/// `[1] -> [1] -> [1]` ReLU chain
pub fn deep_chain_network(context: &DeviceContext) -> Network {
    NetworkBuilder::with_inputs(context, &[1])
        .and_then(|builder| builder.add_layer(FeedForwardOptions::new(&[1])))
        .and_then(|builder| builder.add_output_layer(FeedForwardOptions::new(&[1])))
        .and_then(|builder| builder.build())
        .expect("failed to build deep chain network")
}
