//! ROCm/HIP backend: device access, ordered execution, buffers and programs

pub mod binding;
pub mod chain;
pub mod device;
pub mod event;
pub mod ffi;
pub mod memory;
pub mod program;
pub mod sequence;
pub mod stream;

pub use binding::{ArgKind, ArgValue, BindingTable, DevicePtr, KernelSignature, Parameter};
pub use chain::DependencyChain;
pub use device::{is_available, list_devices, DeviceContext, DeviceInfo};
pub use memory::{BufferSnapshot, DeviceBuffer};
pub use program::{DeviceProgram, Kernel};
pub use sequence::ExecutionSequence;
