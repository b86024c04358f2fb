//! Input layer: a single output buffer written from the host

use crate::backend::{DeviceBuffer, DeviceContext, ExecutionSequence};
use crate::error::NeuroResult;
use crate::network::config::InputOptions;
use crate::network::layer::LayerPorts;

#[derive(Debug)]
pub struct InputLayer {
    dimensionality: Vec<usize>,
    outputs: DeviceBuffer,
}

impl InputLayer {
    pub fn new(context: &DeviceContext, options: &InputOptions) -> NeuroResult<Self> {
        options.validate()?;
        let outputs = DeviceBuffer::named("input.outputs", options.node_count(), 1, context)?;
        Ok(InputLayer {
            dimensionality: options.dimensionality.clone(),
            outputs,
        })
    }

    pub fn dimensionality(&self) -> &[usize] {
        &self.dimensionality
    }

    pub fn node_count(&self) -> usize {
        self.outputs.len()
    }

    /// Write one sample; `data` must match the node count
    pub fn set_inputs(&self, sequence: &mut ExecutionSequence, data: &[f32]) -> NeuroResult<()> {
        self.outputs.update(data, sequence)
    }

    pub fn outputs(&self, sequence: &mut ExecutionSequence) -> NeuroResult<Vec<f32>> {
        self.outputs.to_vec(sequence)
    }

    pub fn output_buffer(&self) -> &DeviceBuffer {
        &self.outputs
    }

    pub fn ports(&self) -> LayerPorts {
        LayerPorts {
            node_count: self.node_count(),
            outputs: self.outputs.device_ptr(),
            deltas: None,
            weights: None,
        }
    }
}
