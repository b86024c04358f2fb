//! Layer variants and the ports they expose to neighbours

use crate::backend::{DeviceBuffer, DevicePtr, ExecutionSequence};
use crate::error::{NeuroError, NeuroResult};
use crate::network::feed_forward::FeedForwardLayer;
use crate::network::input::InputLayer;

/// Non-owning view of a layer's buffers, handed to its neighbours at link time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerPorts {
    pub node_count: usize,
    pub outputs: DevicePtr,
    /// Absent for layers without trainable parameters
    pub deltas: Option<DevicePtr>,
    pub weights: Option<DevicePtr>,
}

#[derive(Debug)]
pub enum Layer {
    Input(InputLayer),
    FeedForward(FeedForwardLayer),
}

impl Layer {
    pub fn node_count(&self) -> usize {
        match self {
            Layer::Input(layer) => layer.node_count(),
            Layer::FeedForward(layer) => layer.node_count(),
        }
    }

    pub fn dimensionality(&self) -> &[usize] {
        match self {
            Layer::Input(layer) => layer.dimensionality(),
            Layer::FeedForward(layer) => layer.dimensionality(),
        }
    }

    pub fn is_final(&self) -> bool {
        match self {
            Layer::Input(_) => false,
            Layer::FeedForward(layer) => layer.is_final(),
        }
    }

    pub fn ports(&self) -> LayerPorts {
        match self {
            Layer::Input(layer) => layer.ports(),
            Layer::FeedForward(layer) => layer.ports(),
        }
    }

    /// Device the layer's buffers live on
    pub fn ordinal(&self) -> i32 {
        self.output_buffer().ordinal()
    }

    pub fn output_buffer(&self) -> &DeviceBuffer {
        match self {
            Layer::Input(layer) => layer.output_buffer(),
            Layer::FeedForward(layer) => layer.output_buffer(),
        }
    }

    pub fn link_previous(&mut self, previous: &LayerPorts) -> NeuroResult<()> {
        match self {
            Layer::Input(_) => Err(NeuroError::Configuration(
                "an input layer cannot have a predecessor".to_string(),
            )),
            Layer::FeedForward(layer) => layer.link_previous(previous),
        }
    }

    pub fn link_next(&mut self, next: &LayerPorts) -> NeuroResult<()> {
        match self {
            // Input layers never read their successor.
            Layer::Input(_) => Ok(()),
            Layer::FeedForward(layer) => layer.link_next(next),
        }
    }

    pub fn forward_pass(&self, sequence: &mut ExecutionSequence) -> NeuroResult<()> {
        match self {
            Layer::Input(_) => Ok(()),
            Layer::FeedForward(layer) => layer.forward_pass(sequence),
        }
    }

    pub fn backward_pass(&self, sequence: &mut ExecutionSequence) -> NeuroResult<()> {
        match self {
            Layer::Input(_) => Ok(()),
            Layer::FeedForward(layer) => layer.backward_pass(sequence),
        }
    }

    pub fn update_parameters(&self, sequence: &mut ExecutionSequence) -> NeuroResult<()> {
        match self {
            Layer::Input(_) => Ok(()),
            Layer::FeedForward(layer) => layer.update_parameters(sequence),
        }
    }

    pub fn outputs(&self, sequence: &mut ExecutionSequence) -> NeuroResult<Vec<f32>> {
        match self {
            Layer::Input(layer) => layer.outputs(sequence),
            Layer::FeedForward(layer) => layer.outputs(sequence),
        }
    }

    pub fn as_input(&self) -> Option<&InputLayer> {
        match self {
            Layer::Input(layer) => Some(layer),
            Layer::FeedForward(_) => None,
        }
    }

    pub fn as_feed_forward(&self) -> Option<&FeedForwardLayer> {
        match self {
            Layer::Input(_) => None,
            Layer::FeedForward(layer) => Some(layer),
        }
    }

    pub fn dispose(self) {
        match self {
            Layer::Input(layer) => drop(layer),
            Layer::FeedForward(layer) => layer.dispose(),
        }
    }
}
