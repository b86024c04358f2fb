//! Feed-forward layer kernels
//!
//! `forwardPass`: `sum = bias + Σ prev[s] * w[s, n]`, `out = activate(sum)`.
//! With no predecessor bound the sum is the bias alone.
//!
//! `backwardPass`: the final layer uses `error = out - target`; hidden layers
//! use `error = Σ_j next_delta[j] * next_w[n, j]`; with neither bound the
//! error is zero. `delta = error * activate'(sum)`.

use crate::backend::{ArgKind, KernelSignature, Parameter};

pub static FORWARD_PASS: KernelSignature = KernelSignature {
    name: "forwardPass",
    parameters: &[
        Parameter::new("previous_node_count", ArgKind::U32),
        Parameter::new("node_count", ArgKind::U32),
        Parameter::new("previous_outputs", ArgKind::OptionalBuffer),
        Parameter::new("weights", ArgKind::Buffer),
        Parameter::new("biases", ArgKind::Buffer),
        Parameter::new("sums", ArgKind::Buffer),
        Parameter::new("outputs", ArgKind::Buffer),
    ],
};

pub static BACKWARD_PASS: KernelSignature = KernelSignature {
    name: "backwardPass",
    parameters: &[
        Parameter::new("previous_node_count", ArgKind::U32),
        Parameter::new("node_count", ArgKind::U32),
        Parameter::new("next_node_count", ArgKind::U32),
        Parameter::new("sums", ArgKind::Buffer),
        Parameter::new("outputs", ArgKind::Buffer),
        Parameter::new("deltas", ArgKind::Buffer),
        Parameter::new("weights", ArgKind::Buffer),
        Parameter::new("biases", ArgKind::Buffer),
        Parameter::new("previous_outputs", ArgKind::OptionalBuffer),
        Parameter::new("next_deltas", ArgKind::OptionalBuffer),
        Parameter::new("next_weights", ArgKind::OptionalBuffer),
        Parameter::new("targets", ArgKind::OptionalBuffer),
    ],
};

pub const FEED_FORWARD_SOURCE: &str = r#"
extern "C" __global__ void forwardPass(
    const unsigned int previous_node_count,
    const unsigned int node_count,
    const float* previous_outputs,
    const float* weights,
    const float* biases,
    float* sums,
    float* outputs)
{
    const unsigned int node = nf_global_id();
    if (node >= node_count) {
        return;
    }

    float sum = biases[node];
    if (previous_outputs != nullptr) {
        for (unsigned int source = 0; source < previous_node_count; ++source) {
            sum += previous_outputs[source] * weights[nf_weight_index(source, node, node_count)];
        }
    }

    sums[node] = sum;
    outputs[node] = nf_activate(sum);
}

extern "C" __global__ void backwardPass(
    const unsigned int previous_node_count,
    const unsigned int node_count,
    const unsigned int next_node_count,
    const float* sums,
    const float* outputs,
    float* deltas,
    const float* weights,
    const float* biases,
    const float* previous_outputs,
    const float* next_deltas,
    const float* next_weights,
    const float* targets)
{
    (void)previous_node_count;
    (void)weights;
    (void)biases;
    (void)previous_outputs;

    const unsigned int node = nf_global_id();
    if (node >= node_count) {
        return;
    }

    float error = 0.0f;
    if (targets != nullptr) {
        error = outputs[node] - targets[node];
    } else if (next_deltas != nullptr && next_weights != nullptr) {
        for (unsigned int next = 0; next < next_node_count; ++next) {
            error += next_deltas[next] * next_weights[nf_weight_index(node, next, next_node_count)];
        }
    }

    deltas[node] = error * nf_activate_derivative(sums[node]);
}
"#;
