//! neuroforge - feedforward neural networks executed on AMD GPUs
//!
//! A linear chain of layers runs forward inference, backward gradient
//! propagation and parameter updates entirely as HIP kernel dispatches.
//! All device work flows through one [`ExecutionSequence`], whose single
//! dependency chain makes the asynchronous device look synchronous to the
//! host.
//!
//! The HIP runtime and HIPRTC are loaded at runtime; on hosts without ROCm
//! opening a [`DeviceContext`] fails with
//! [`NeuroError::ContextCreation`](error::NeuroError::ContextCreation).
//!
//! ```ignore
//! use neuroforge::prelude::*;
//!
//! let context = DeviceContext::open()?;
//! let mut sequence = ExecutionSequence::new(&context)?;
//! let network = NetworkBuilder::with_inputs(&context, &[2])?
//!     .add_layer(FeedForwardOptions::new(&[4]).with_activation(Activation::Tanh))?
//!     .add_output_layer(FeedForwardOptions::new(&[1]).with_activation(Activation::Sigmoid))?
//!     .build()?;
//! network.randomize_parameters(&mut sequence, &mut rand::thread_rng(), 0.5)?;
//! network.train_step(&mut sequence, &[0.0, 1.0], &[1.0])?;
//! ```

#![allow(clippy::too_many_arguments)] // Kernel launch FFI takes many arguments
#![allow(clippy::missing_safety_doc)] // FFI tables documented at module level
#![allow(clippy::large_enum_variant)] // FeedForward layers are much larger than Input layers

pub mod backend;
pub mod error;
pub mod kernels;
pub mod logging;
pub mod network;

pub use backend::{BufferSnapshot, DeviceBuffer, DeviceContext, ExecutionSequence};
pub use error::{ErrorCategory, NeuroError, NeuroResult};
pub use kernels::Activation;
pub use network::{
    FeedForwardLayer, FeedForwardOptions, InputLayer, InputOptions, Layer, LayerOptions, Network,
    NetworkBuilder, NetworkConfig, UpdateOptions,
};

/// Commonly used types
pub mod prelude {
    pub use crate::backend::{DeviceBuffer, DeviceContext, ExecutionSequence};
    pub use crate::error::{NeuroError, NeuroResult};
    pub use crate::kernels::Activation;
    pub use crate::network::{
        FeedForwardOptions, InputOptions, Layer, Network, NetworkBuilder, NetworkConfig,
        ParameterUpdate, UpdateOptions,
    };
}
