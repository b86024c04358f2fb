//! Fully connected layer
//!
//! The layer owns every buffer its kernels write (sums, outputs, deltas,
//! weights, biases) plus the targets buffer when it is the final layer.
//! Neighbour buffers are wired into its binding tables once, at link time:
//!
//! - `link_previous` binds the predecessor's outputs (forward input and
//!   update input) and sets up the update strategy
//! - `link_next` binds the successor's deltas and weights (backward input)
//!
//! Until linked, neighbour slots hold the tagged empty value and the kernels
//! treat them as absent.

use rand::Rng;

use crate::backend::{
    BindingTable, DeviceBuffer, DeviceContext, DeviceProgram, ExecutionSequence, Kernel,
};
use crate::error::{NeuroError, NeuroResult};
use crate::kernels::{self, Activation, BACKWARD_PASS, FORWARD_PASS};
use crate::network::config::FeedForwardOptions;
use crate::network::layer::LayerPorts;
use crate::network::update::{LayerParameters, ParameterUpdate};

#[derive(Debug)]
pub struct FeedForwardLayer {
    dimensionality: Vec<usize>,
    activation: Activation,
    node_count: usize,
    previous_node_count: usize,
    is_final: bool,

    forward_kernel: Kernel,
    backward_kernel: Kernel,
    forward_args: BindingTable,
    backward_args: BindingTable,
    update: Box<dyn ParameterUpdate>,

    sums: DeviceBuffer,
    outputs: DeviceBuffer,
    deltas: DeviceBuffer,
    // width = node_count, height = previous_node_count
    weights: DeviceBuffer,
    biases: DeviceBuffer,
    targets: Option<DeviceBuffer>,
}

impl FeedForwardLayer {
    /// Allocate buffers, compile kernels and bind every self-owned argument
    pub fn new(
        context: &DeviceContext,
        options: &FeedForwardOptions,
        is_final: bool,
    ) -> NeuroResult<Self> {
        options.validate()?;
        let node_count = options.node_count();
        let previous_node_count = options.previous_node_count().ok_or_else(|| {
            NeuroError::Configuration(
                "feed-forward layer needs from_dimensionality before it can be built".to_string(),
            )
        })?;

        let sums = DeviceBuffer::named("sums", node_count, 1, context)?;
        let outputs = DeviceBuffer::named("outputs", node_count, 1, context)?;
        let deltas = DeviceBuffer::named("deltas", node_count, 1, context)?;
        let weights = DeviceBuffer::named("weights", node_count, previous_node_count, context)?;
        let biases = DeviceBuffer::named("biases", node_count, 1, context)?;
        let targets = if is_final {
            Some(DeviceBuffer::named("targets", node_count, 1, context)?)
        } else {
            None
        };

        let program = DeviceProgram::compile(
            context,
            &format!("feed_forward_{}", options.activation.name()),
            &kernels::feed_forward_fragments(options.activation),
        )?;
        let forward_kernel = program.kernel(&FORWARD_PASS)?;
        let backward_kernel = program.kernel(&BACKWARD_PASS)?;

        let mut forward_args = BindingTable::new(&FORWARD_PASS);
        forward_args.bind_u32("previous_node_count", previous_node_count)?;
        forward_args.bind_u32("node_count", node_count)?;
        forward_args.bind_absent("previous_outputs")?;
        forward_args.bind("weights", weights.binding())?;
        forward_args.bind("biases", biases.binding())?;
        forward_args.bind("sums", sums.binding())?;
        forward_args.bind("outputs", outputs.binding())?;

        let mut backward_args = BindingTable::new(&BACKWARD_PASS);
        backward_args.bind_u32("previous_node_count", previous_node_count)?;
        backward_args.bind_u32("node_count", node_count)?;
        backward_args.bind_u32("next_node_count", 0)?;
        backward_args.bind("sums", sums.binding())?;
        backward_args.bind("outputs", outputs.binding())?;
        backward_args.bind("deltas", deltas.binding())?;
        backward_args.bind("weights", weights.binding())?;
        backward_args.bind("biases", biases.binding())?;
        backward_args.bind_absent("previous_outputs")?;
        backward_args.bind_absent("next_deltas")?;
        backward_args.bind_absent("next_weights")?;
        match &targets {
            Some(targets) => backward_args.bind("targets", targets.binding())?,
            None => backward_args.bind_absent("targets")?,
        }

        let update = options.update.create(context)?;

        tracing::debug!(
            "Built feed-forward layer {:?} <- {} inputs ({}, final={})",
            options.dimensionality,
            previous_node_count,
            options.activation.name(),
            is_final
        );

        Ok(FeedForwardLayer {
            dimensionality: options.dimensionality.clone(),
            activation: options.activation,
            node_count,
            previous_node_count,
            is_final,
            forward_kernel,
            backward_kernel,
            forward_args,
            backward_args,
            update,
            sums,
            outputs,
            deltas,
            weights,
            biases,
            targets,
        })
    }

    pub fn dimensionality(&self) -> &[usize] {
        &self.dimensionality
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn previous_node_count(&self) -> usize {
        self.previous_node_count
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn ports(&self) -> LayerPorts {
        LayerPorts {
            node_count: self.node_count,
            outputs: self.outputs.device_ptr(),
            deltas: Some(self.deltas.device_ptr()),
            weights: Some(self.weights.device_ptr()),
        }
    }

    fn parameters(&self) -> LayerParameters {
        LayerParameters {
            previous_node_count: self.previous_node_count,
            node_count: self.node_count,
            deltas: self.deltas.device_ptr(),
            weights: self.weights.device_ptr(),
            biases: self.biases.device_ptr(),
        }
    }

    /// Wire the predecessor's outputs into the forward and backward tables
    pub fn link_previous(&mut self, previous: &LayerPorts) -> NeuroResult<()> {
        if previous.node_count != self.previous_node_count {
            return Err(NeuroError::Configuration(format!(
                "layer {:?} expects {} inputs but its predecessor has {} nodes",
                self.dimensionality, self.previous_node_count, previous.node_count
            )));
        }

        for table in [&mut self.forward_args, &mut self.backward_args] {
            table.bind_u32("previous_node_count", previous.node_count)?;
            table.bind_buffer("previous_outputs", previous.outputs)?;
        }
        let parameters = self.parameters();
        self.update.set_up(&parameters, previous)
    }

    /// Wire the successor's deltas and weights into the backward table
    pub fn link_next(&mut self, next: &LayerPorts) -> NeuroResult<()> {
        if self.is_final {
            return Err(NeuroError::Configuration(
                "the final layer cannot have a successor".to_string(),
            ));
        }
        let (Some(deltas), Some(weights)) = (next.deltas, next.weights) else {
            return Err(NeuroError::Configuration(
                "successor layer exposes no deltas or weights".to_string(),
            ));
        };

        self.backward_args.bind_u32("next_node_count", next.node_count)?;
        self.backward_args.bind_buffer("next_deltas", deltas)?;
        self.backward_args.bind_buffer("next_weights", weights)?;
        Ok(())
    }

    pub fn forward_pass(&self, sequence: &mut ExecutionSequence) -> NeuroResult<()> {
        sequence.enqueue_kernel(&self.forward_kernel, &self.forward_args, self.node_count)
    }

    pub fn backward_pass(&self, sequence: &mut ExecutionSequence) -> NeuroResult<()> {
        sequence.enqueue_kernel(&self.backward_kernel, &self.backward_args, self.node_count)
    }

    pub fn update_parameters(&self, sequence: &mut ExecutionSequence) -> NeuroResult<()> {
        self.update.update(sequence)
    }

    /// Overwrite the weights, source-major (`weights[source * node_count + node]`)
    pub fn set_weights(&self, sequence: &mut ExecutionSequence, data: &[f32]) -> NeuroResult<()> {
        self.weights.update(data, sequence)
    }

    pub fn set_biases(&self, sequence: &mut ExecutionSequence, data: &[f32]) -> NeuroResult<()> {
        self.biases.update(data, sequence)
    }

    pub fn set_targets(&self, sequence: &mut ExecutionSequence, data: &[f32]) -> NeuroResult<()> {
        self.target_buffer()?.update(data, sequence)
    }

    pub fn outputs(&self, sequence: &mut ExecutionSequence) -> NeuroResult<Vec<f32>> {
        self.outputs.to_vec(sequence)
    }

    pub fn sums(&self, sequence: &mut ExecutionSequence) -> NeuroResult<Vec<f32>> {
        self.sums.to_vec(sequence)
    }

    pub fn deltas(&self, sequence: &mut ExecutionSequence) -> NeuroResult<Vec<f32>> {
        self.deltas.to_vec(sequence)
    }

    pub fn weights(&self, sequence: &mut ExecutionSequence) -> NeuroResult<Vec<f32>> {
        self.weights.to_vec(sequence)
    }

    pub fn biases(&self, sequence: &mut ExecutionSequence) -> NeuroResult<Vec<f32>> {
        self.biases.to_vec(sequence)
    }

    pub fn targets(&self, sequence: &mut ExecutionSequence) -> NeuroResult<Vec<f32>> {
        self.target_buffer()?.to_vec(sequence)
    }

    pub fn output_buffer(&self) -> &DeviceBuffer {
        &self.outputs
    }

    fn target_buffer(&self) -> NeuroResult<&DeviceBuffer> {
        self.targets.as_ref().ok_or_else(|| {
            NeuroError::Configuration("targets can only be set on the final layer".to_string())
        })
    }

    /// Fill weights and biases uniformly from `[-scale, scale]`
    pub fn randomize_parameters<R: Rng + ?Sized>(
        &self,
        sequence: &mut ExecutionSequence,
        rng: &mut R,
        scale: f32,
    ) -> NeuroResult<()> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(NeuroError::Configuration(format!(
                "initialization scale must be positive, got {}",
                scale
            )));
        }
        let weights: Vec<f32> = (0..self.weights.len())
            .map(|_| rng.gen_range(-scale..=scale))
            .collect();
        let biases: Vec<f32> = (0..self.biases.len())
            .map(|_| rng.gen_range(-scale..=scale))
            .collect();
        self.set_weights(sequence, &weights)?;
        self.set_biases(sequence, &biases)
    }

    /// Release programs, kernels and buffers
    pub fn dispose(self) {
        tracing::debug!(
            "Disposing feed-forward layer {:?} (targets: {})",
            self.dimensionality,
            self.targets.is_some()
        );
    }
}
