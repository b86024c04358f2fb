//! Layer and network options
//!
//! Options are plain serde structs so a topology can be written as JSON:
//!
//! ```json
//! {
//!   "inputs": { "dimensionality": [2] },
//!   "layers": [
//!     { "dimensionality": [4], "activation": "tanh" },
//!     { "dimensionality": [1], "activation": "sigmoid",
//!       "update": { "strategy": "gradient_descent", "learning_rate": 0.5 } }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::DeviceContext;
use crate::error::{NeuroError, NeuroResult};
use crate::kernels::Activation;
use crate::network::feed_forward::FeedForwardLayer;
use crate::network::input::InputLayer;
use crate::network::layer::Layer;
use crate::network::update::{GradientDescent, ParameterUpdate};

pub const DEFAULT_LEARNING_RATE: f64 = 0.1;

/// Number of nodes described by a dimensionality vector
pub fn cardinality(dimensionality: &[usize]) -> usize {
    if dimensionality.is_empty() {
        return 0;
    }
    dimensionality.iter().product()
}

fn validate_dimensionality(what: &str, dimensionality: &[usize]) -> NeuroResult<()> {
    if dimensionality.is_empty() {
        return Err(NeuroError::Configuration(format!(
            "{} dimensionality must not be empty",
            what
        )));
    }
    if dimensionality.contains(&0) {
        return Err(NeuroError::Configuration(format!(
            "{} dimensionality {:?} contains a zero extent",
            what, dimensionality
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputOptions {
    pub dimensionality: Vec<usize>,
}

impl InputOptions {
    pub fn new(dimensionality: &[usize]) -> Self {
        InputOptions {
            dimensionality: dimensionality.to_vec(),
        }
    }

    pub fn node_count(&self) -> usize {
        cardinality(&self.dimensionality)
    }

    pub fn validate(&self) -> NeuroResult<()> {
        validate_dimensionality("input", &self.dimensionality)
    }

    /// Build the layer; an input layer can never be the final layer
    pub fn create_layer(
        &self,
        context: &DeviceContext,
        is_final_layer: bool,
    ) -> NeuroResult<Layer> {
        if is_final_layer {
            return Err(NeuroError::Configuration(
                "an input layer cannot be the final layer".to_string(),
            ));
        }
        Ok(Layer::Input(InputLayer::new(context, self)?))
    }
}

/// Parameter update strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum UpdateOptions {
    GradientDescent {
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
    },
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions::GradientDescent {
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }
}

impl UpdateOptions {
    pub fn gradient_descent(learning_rate: f64) -> Self {
        UpdateOptions::GradientDescent { learning_rate }
    }

    pub fn learning_rate(&self) -> f64 {
        match self {
            UpdateOptions::GradientDescent { learning_rate } => *learning_rate,
        }
    }

    pub fn validate(&self) -> NeuroResult<()> {
        let rate = self.learning_rate();
        if !rate.is_finite() || rate <= 0.0 {
            return Err(NeuroError::Configuration(format!(
                "learning rate must be positive and finite, got {}",
                rate
            )));
        }
        Ok(())
    }

    /// Compile the strategy's program for `context`
    pub fn create(&self, context: &DeviceContext) -> NeuroResult<Box<dyn ParameterUpdate>> {
        self.validate()?;
        match self {
            UpdateOptions::GradientDescent { learning_rate } => {
                Ok(Box::new(GradientDescent::new(context, *learning_rate)?))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedForwardOptions {
    pub dimensionality: Vec<usize>,
    /// Predecessor shape; filled from the previous layer when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_dimensionality: Option<Vec<usize>>,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default)]
    pub update: UpdateOptions,
}

impl FeedForwardOptions {
    pub fn new(dimensionality: &[usize]) -> Self {
        FeedForwardOptions {
            dimensionality: dimensionality.to_vec(),
            from_dimensionality: None,
            activation: Activation::default(),
            update: UpdateOptions::default(),
        }
    }

    pub fn with_from_dimensionality(mut self, from: &[usize]) -> Self {
        self.from_dimensionality = Some(from.to_vec());
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_update(mut self, update: UpdateOptions) -> Self {
        self.update = update;
        self
    }

    pub fn with_learning_rate(self, learning_rate: f64) -> Self {
        self.with_update(UpdateOptions::gradient_descent(learning_rate))
    }

    pub fn node_count(&self) -> usize {
        cardinality(&self.dimensionality)
    }

    pub fn previous_node_count(&self) -> Option<usize> {
        self.from_dimensionality.as_deref().map(cardinality)
    }

    pub fn validate(&self) -> NeuroResult<()> {
        validate_dimensionality("layer", &self.dimensionality)?;
        if let Some(from) = &self.from_dimensionality {
            validate_dimensionality("predecessor", from)?;
        }
        self.update.validate()
    }

    /// Build the layer; `from_dimensionality` must be known by now
    pub fn create_layer(
        &self,
        context: &DeviceContext,
        is_final_layer: bool,
    ) -> NeuroResult<Layer> {
        Ok(Layer::FeedForward(FeedForwardLayer::new(context, self, is_final_layer)?))
    }
}

/// Options for any layer kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerOptions {
    Input(InputOptions),
    FeedForward(FeedForwardOptions),
}

impl LayerOptions {
    pub fn create_layer(
        &self,
        context: &DeviceContext,
        is_final_layer: bool,
    ) -> NeuroResult<Layer> {
        match self {
            LayerOptions::Input(options) => options.create_layer(context, is_final_layer),
            LayerOptions::FeedForward(options) => options.create_layer(context, is_final_layer),
        }
    }
}

impl From<InputOptions> for LayerOptions {
    fn from(options: InputOptions) -> Self {
        LayerOptions::Input(options)
    }
}

impl From<FeedForwardOptions> for LayerOptions {
    fn from(options: FeedForwardOptions) -> Self {
        LayerOptions::FeedForward(options)
    }
}

/// A complete linear topology; the last layer is the output layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub inputs: InputOptions,
    pub layers: Vec<FeedForwardOptions>,
}

impl NetworkConfig {
    pub fn from_json(text: &str) -> NeuroResult<Self> {
        let config: NetworkConfig = serde_json::from_str(text)
            .map_err(|e| NeuroError::Configuration(format!("invalid network config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> NeuroResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            NeuroError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> NeuroResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| NeuroError::Configuration(format!("cannot serialize config: {}", e)))
    }

    /// Check shapes along the chain without touching a device
    pub fn validate(&self) -> NeuroResult<()> {
        self.inputs.validate()?;
        if self.layers.is_empty() {
            return Err(NeuroError::Configuration(
                "network needs at least one feed-forward layer".to_string(),
            ));
        }

        let mut previous = self.inputs.node_count();
        for (index, layer) in self.layers.iter().enumerate() {
            layer.validate()?;
            if let Some(declared) = layer.previous_node_count() {
                if declared != previous {
                    return Err(NeuroError::Configuration(format!(
                        "layer {} expects {} inputs but its predecessor has {} nodes",
                        index + 1,
                        declared,
                        previous
                    )));
                }
            }
            previous = layer.node_count();
        }
        Ok(())
    }
}
