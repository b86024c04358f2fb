//! Parameter update strategies
//!
//! A strategy is wired once, when its layer is linked to a predecessor, and
//! afterwards only dispatches. Layers own their strategy as a
//! `Box<dyn ParameterUpdate>` so alternatives can be swapped in without
//! touching the layer.

use crate::backend::{
    BindingTable, DeviceContext, DevicePtr, DeviceProgram, ExecutionSequence, Kernel,
};
use crate::error::{NeuroError, NeuroResult};
use crate::kernels::{self, UPDATE};
use crate::network::layer::LayerPorts;

/// The trainable buffers of a layer, as seen by its update strategy
#[derive(Debug, Clone, Copy)]
pub struct LayerParameters {
    pub previous_node_count: usize,
    pub node_count: usize,
    pub deltas: DevicePtr,
    pub weights: DevicePtr,
    pub biases: DevicePtr,
}

pub trait ParameterUpdate: Send + std::fmt::Debug {
    /// Bind the layer's buffers and its predecessor's outputs
    fn set_up(&mut self, parameters: &LayerParameters, previous: &LayerPorts) -> NeuroResult<()>;

    /// Enqueue one update step; the backward pass must already be enqueued
    fn update(&self, sequence: &mut ExecutionSequence) -> NeuroResult<()>;
}

/// Plain gradient descent: `w -= lr * delta * input`, `b -= lr * delta`
#[derive(Debug)]
pub struct GradientDescent {
    learning_rate: f64,
    kernel: Kernel,
    arguments: BindingTable,
    node_count: usize,
}

impl GradientDescent {
    pub fn new(context: &DeviceContext, learning_rate: f64) -> NeuroResult<Self> {
        let program = DeviceProgram::compile(
            context,
            "gradient_descent",
            &kernels::gradient_descent_fragments(),
        )?;
        let kernel = program.kernel(&UPDATE)?;

        let mut arguments = BindingTable::new(&UPDATE);
        arguments.bind_f64("learning_rate", learning_rate)?;

        Ok(GradientDescent {
            learning_rate,
            kernel,
            arguments,
            node_count: 0,
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn is_set_up(&self) -> bool {
        self.arguments.is_complete()
    }
}

impl ParameterUpdate for GradientDescent {
    fn set_up(&mut self, parameters: &LayerParameters, previous: &LayerPorts) -> NeuroResult<()> {
        if previous.node_count != parameters.previous_node_count {
            return Err(NeuroError::Configuration(format!(
                "update expects {} inputs, predecessor has {} nodes",
                parameters.previous_node_count, previous.node_count
            )));
        }

        let args = &mut self.arguments;
        args.bind_u32("previous_node_count", parameters.previous_node_count)?;
        args.bind_u32("node_count", parameters.node_count)?;
        args.bind_buffer("deltas", parameters.deltas)?;
        args.bind_buffer("weights", parameters.weights)?;
        args.bind_buffer("biases", parameters.biases)?;
        args.bind_buffer("previous_outputs", previous.outputs)?;
        self.node_count = parameters.node_count;
        Ok(())
    }

    fn update(&self, sequence: &mut ExecutionSequence) -> NeuroResult<()> {
        if !self.is_set_up() {
            return Err(NeuroError::ArgumentBinding {
                kernel: UPDATE.name.to_string(),
                parameter: self.arguments.unbound().join(", "),
                reason: "update strategy used before the layer was linked".to_string(),
            });
        }
        sequence.enqueue_kernel(&self.kernel, &self.arguments, self.node_count)
    }
}
