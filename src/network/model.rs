//! Network assembly and pass orchestration
//!
//! [`NetworkBuilder`] links each new layer to the current tail as it is
//! added (`tail.next = new`, `new.previous = tail`), so a built [`Network`]
//! never re-wires anything. Passes run over the chain in order:
//! forward ascending, backward descending, update ascending.

use rand::Rng;

use crate::backend::{DeviceContext, ExecutionSequence};
use crate::error::{NeuroError, NeuroResult};
use crate::network::config::{cardinality, FeedForwardOptions, InputOptions, NetworkConfig};
use crate::network::feed_forward::FeedForwardLayer;
use crate::network::input::InputLayer;
use crate::network::layer::Layer;

#[derive(Debug)]
pub struct NetworkBuilder {
    context: DeviceContext,
    layers: Vec<Layer>,
    has_output: bool,
}

impl NetworkBuilder {
    pub fn new(context: &DeviceContext) -> Self {
        NetworkBuilder {
            context: context.clone(),
            layers: Vec::new(),
            has_output: false,
        }
    }

    /// Shortcut for `new(context).input(InputOptions::new(dimensionality))`
    pub fn with_inputs(context: &DeviceContext, dimensionality: &[usize]) -> NeuroResult<Self> {
        Self::new(context).input(InputOptions::new(dimensionality))
    }

    pub fn from_config(context: &DeviceContext, config: &NetworkConfig) -> NeuroResult<Network> {
        config.validate()?;
        let mut builder = Self::new(context).input(config.inputs.clone())?;
        let last = config.layers.len().saturating_sub(1);
        for (index, options) in config.layers.iter().enumerate() {
            builder = if index == last {
                builder.add_output_layer(options.clone())?
            } else {
                builder.add_layer(options.clone())?
            };
        }
        builder.build()
    }

    pub fn input(mut self, options: InputOptions) -> NeuroResult<Self> {
        if !self.layers.is_empty() {
            return Err(NeuroError::Configuration(
                "the input layer must be the first layer".to_string(),
            ));
        }
        let layer = options.create_layer(&self.context, false)?;
        self.layers.push(layer);
        Ok(self)
    }

    /// Append a hidden layer
    pub fn add_layer(self, options: FeedForwardOptions) -> NeuroResult<Self> {
        self.add_feed_forward(options, false)
    }

    /// Append the final layer; nothing may follow it
    pub fn add_output_layer(self, options: FeedForwardOptions) -> NeuroResult<Self> {
        self.add_feed_forward(options, true)
    }

    /// Append a layer built elsewhere; it must live on the builder's device
    pub fn add_prebuilt(mut self, layer: Layer) -> NeuroResult<Self> {
        if layer.ordinal() != self.context.ordinal() {
            return Err(NeuroError::Configuration(format!(
                "layer was built on device {} but the network uses device {}",
                layer.ordinal(),
                self.context.ordinal()
            )));
        }
        if let Layer::Input(_) = layer {
            if !self.layers.is_empty() {
                return Err(NeuroError::Configuration(
                    "the input layer must be the first layer".to_string(),
                ));
            }
            self.layers.push(layer);
            return Ok(self);
        }
        self.append(layer)?;
        Ok(self)
    }

    fn add_feed_forward(
        mut self,
        mut options: FeedForwardOptions,
        is_final: bool,
    ) -> NeuroResult<Self> {
        let tail = self.tail()?;
        let tail_dimensionality = tail.dimensionality().to_vec();
        let tail_count = tail.node_count();

        match &options.from_dimensionality {
            None => options.from_dimensionality = Some(tail_dimensionality),
            Some(from) if cardinality(from) != tail_count => {
                return Err(NeuroError::Configuration(format!(
                    "layer declares {:?} inputs but the previous layer has {} nodes",
                    from, tail_count
                )));
            }
            Some(_) => {}
        }

        let layer = Layer::FeedForward(FeedForwardLayer::new(&self.context, &options, is_final)?);
        self.append(layer)?;
        Ok(self)
    }

    fn tail(&self) -> NeuroResult<&Layer> {
        if self.has_output {
            return Err(NeuroError::Configuration(
                "no layer may follow the output layer".to_string(),
            ));
        }
        self.layers.last().ok_or_else(|| {
            NeuroError::Configuration("add an input layer before any other layer".to_string())
        })
    }

    fn append(&mut self, mut layer: Layer) -> NeuroResult<()> {
        self.tail()?;
        let tail = self
            .layers
            .last_mut()
            .ok_or_else(|| NeuroError::Configuration("network has no input layer".to_string()))?;

        tail.link_next(&layer.ports())?;
        layer.link_previous(&tail.ports())?;

        self.has_output = layer.is_final();
        self.layers.push(layer);
        Ok(())
    }

    pub fn build(self) -> NeuroResult<Network> {
        match self.layers.first() {
            Some(Layer::Input(_)) => {}
            _ => {
                return Err(NeuroError::Configuration(
                    "network has no input layer".to_string(),
                ))
            }
        }
        if !self.has_output {
            return Err(NeuroError::Configuration(
                "network has no output layer".to_string(),
            ));
        }

        tracing::debug!(
            "Built network with {} layers: {:?}",
            self.layers.len(),
            self.layers.iter().map(Layer::node_count).collect::<Vec<_>>()
        );
        Ok(Network {
            context: self.context,
            layers: self.layers,
        })
    }
}

/// A linked chain of layers: one input layer, zero or more hidden layers,
/// one output layer
#[derive(Debug)]
pub struct Network {
    context: DeviceContext,
    layers: Vec<Layer>,
}

impl Network {
    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn input_layer(&self) -> NeuroResult<&InputLayer> {
        self.layers
            .first()
            .and_then(Layer::as_input)
            .ok_or_else(|| NeuroError::Configuration("network has no input layer".to_string()))
    }

    pub fn output_layer(&self) -> NeuroResult<&FeedForwardLayer> {
        self.layers
            .last()
            .and_then(Layer::as_feed_forward)
            .ok_or_else(|| NeuroError::Configuration("network has no output layer".to_string()))
    }

    pub fn execute_forward_pass(&self, sequence: &mut ExecutionSequence) -> NeuroResult<()> {
        for layer in &self.layers {
            layer.forward_pass(sequence)?;
        }
        Ok(())
    }

    pub fn execute_backward_pass(&self, sequence: &mut ExecutionSequence) -> NeuroResult<()> {
        for layer in self.layers.iter().rev() {
            layer.backward_pass(sequence)?;
        }
        Ok(())
    }

    /// Apply each layer's update strategy; run after the backward pass
    pub fn execute_update(&self, sequence: &mut ExecutionSequence) -> NeuroResult<()> {
        for layer in &self.layers {
            layer.update_parameters(sequence)?;
        }
        Ok(())
    }

    pub fn set_inputs(&self, sequence: &mut ExecutionSequence, inputs: &[f32]) -> NeuroResult<()> {
        self.input_layer()?.set_inputs(sequence, inputs)
    }

    pub fn set_targets(
        &self,
        sequence: &mut ExecutionSequence,
        targets: &[f32],
    ) -> NeuroResult<()> {
        self.output_layer()?.set_targets(sequence, targets)
    }

    pub fn outputs(&self, sequence: &mut ExecutionSequence) -> NeuroResult<Vec<f32>> {
        self.output_layer()?.outputs(sequence)
    }

    /// Forward one sample and read the output layer
    pub fn predict(
        &self,
        sequence: &mut ExecutionSequence,
        inputs: &[f32],
    ) -> NeuroResult<Vec<f32>> {
        self.set_inputs(sequence, inputs)?;
        self.execute_forward_pass(sequence)?;
        self.outputs(sequence)
    }

    /// One gradient step on a single sample
    pub fn train_step(
        &self,
        sequence: &mut ExecutionSequence,
        inputs: &[f32],
        targets: &[f32],
    ) -> NeuroResult<()> {
        self.set_inputs(sequence, inputs)?;
        self.set_targets(sequence, targets)?;
        self.execute_forward_pass(sequence)?;
        self.execute_backward_pass(sequence)?;
        self.execute_update(sequence)
    }

    /// Randomize every feed-forward layer's weights and biases
    pub fn randomize_parameters<R: Rng + ?Sized>(
        &self,
        sequence: &mut ExecutionSequence,
        rng: &mut R,
        scale: f32,
    ) -> NeuroResult<()> {
        for layer in self.layers.iter().filter_map(Layer::as_feed_forward) {
            layer.randomize_parameters(sequence, rng, scale)?;
        }
        Ok(())
    }

    pub fn dispose(self) {
        tracing::debug!("Disposing network with {} layers", self.layers.len());
        for layer in self.layers {
            layer.dispose();
        }
    }
}
