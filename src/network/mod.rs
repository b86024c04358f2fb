//! Layers, update strategies and network assembly

pub mod config;
pub mod feed_forward;
pub mod input;
pub mod layer;
pub mod model;
pub mod update;

pub use config::{
    cardinality, FeedForwardOptions, InputOptions, LayerOptions, NetworkConfig, UpdateOptions,
};
pub use feed_forward::FeedForwardLayer;
pub use input::InputLayer;
pub use layer::{Layer, LayerPorts};
pub use model::{Network, NetworkBuilder};
pub use update::{GradientDescent, LayerParameters, ParameterUpdate};
