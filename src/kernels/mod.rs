//! HIP kernel sources and their argument signatures
//!
//! Programs are assembled from fragments at runtime:
//! `PRELUDE + activation module + layer kernels` for feed-forward layers and
//! `PRELUDE + update kernel` for the gradient-descent strategy.
//!
//! # Kernel ABI
//!
//! Every kernel is `extern "C"`, 1-D, and guards `id >= node_count`.
//! Scalars are `unsigned int` (or `double` for the learning rate), buffers
//! are `float*`. Optional buffers arrive as `nullptr` when absent. The
//! positional order of each signature must match the C parameter list
//! exactly; `signature_matches_source` below checks that.

pub mod activation;
pub mod feed_forward;
pub mod update;

pub use activation::Activation;
pub use feed_forward::{BACKWARD_PASS, FEED_FORWARD_SOURCE, FORWARD_PASS};
pub use update::{GRADIENT_DESCENT_SOURCE, UPDATE};

/// Helpers shared by every program
pub const PRELUDE: &str = r#"
#include <hip/hip_runtime.h>

__device__ __forceinline__ unsigned int nf_global_id() {
    return blockIdx.x * blockDim.x + threadIdx.x;
}

// Weights are source-major: row `source`, column `target`.
__device__ __forceinline__ unsigned int nf_weight_index(
    unsigned int source,
    unsigned int target,
    unsigned int target_count)
{
    return source * target_count + target;
}
"#;

/// Fragments for a feed-forward layer program
pub fn feed_forward_fragments(activation: Activation) -> [&'static str; 3] {
    [PRELUDE, activation.source(), FEED_FORWARD_SOURCE]
}

/// Fragments for the gradient-descent update program
pub fn gradient_descent_fragments() -> [&'static str; 2] {
    [PRELUDE, GRADIENT_DESCENT_SOURCE]
}

#[cfg(test)]
pub(crate) fn signature_matches_source(
    signature: &crate::backend::KernelSignature,
    source: &str,
) -> bool {
    let entry = format!("__global__ void {}(", signature.name);
    let Some(start) = source.find(&entry) else {
        return false;
    };
    let rest = &source[start + entry.len()..];
    let Some(end) = rest.find(')') else {
        return false;
    };
    let declared: Vec<&str> = rest[..end]
        .split(',')
        .filter_map(|param| param.split_whitespace().last())
        .map(|name| name.trim_start_matches('*'))
        .collect();
    let expected: Vec<&str> = signature.parameters.iter().map(|p| p.name).collect();
    declared == expected
}
