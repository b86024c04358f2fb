//! Gradient-descent parameter update
//!
//! One thread per target node: it walks every source weight feeding the
//! node, then adjusts the node's bias.

use crate::backend::{ArgKind, KernelSignature, Parameter};

pub static UPDATE: KernelSignature = KernelSignature {
    name: "update",
    parameters: &[
        Parameter::new("learning_rate", ArgKind::F64),
        Parameter::new("previous_node_count", ArgKind::U32),
        Parameter::new("node_count", ArgKind::U32),
        Parameter::new("deltas", ArgKind::Buffer),
        Parameter::new("weights", ArgKind::Buffer),
        Parameter::new("biases", ArgKind::Buffer),
        Parameter::new("previous_outputs", ArgKind::Buffer),
    ],
};

pub const GRADIENT_DESCENT_SOURCE: &str = r#"
extern "C" __global__ void update(
    const double learning_rate,
    const unsigned int previous_node_count,
    const unsigned int node_count,
    const float* deltas,
    float* weights,
    float* biases,
    const float* previous_outputs)
{
    const unsigned int node = nf_global_id();
    if (node >= node_count) {
        return;
    }

    const float step = (float)learning_rate * deltas[node];
    for (unsigned int source = 0; source < previous_node_count; ++source) {
        weights[nf_weight_index(source, node, node_count)] -= step * previous_outputs[source];
    }
    biases[node] -= step;
}
"#;
