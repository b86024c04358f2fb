//! Execution sequence: the single ordered channel to the device
//!
//! Every write, read and kernel dispatch goes through one HIP stream and one
//! [`DependencyChain`]. Each enqueue waits on the pending completion event,
//! submits, then records a fresh event that becomes the new tail. Callers
//! therefore see operations complete in the order they were issued, while
//! kernel dispatches themselves never block the host.
//!
//! Blocking points:
//! - writes return once the device has consumed the host slice
//! - reads return once the data has arrived, and leave the chain drained
//! - [`ExecutionSequence::finish`] drains the chain
//!
//! A failed submit or wait poisons the sequence; every later call returns
//! [`NeuroError::SequenceFailed`]. Nothing is retried.

use std::ffi::c_void;

use crate::backend::binding::{BindingTable, DevicePtr};
use crate::backend::chain::DependencyChain;
use crate::backend::device::{runtime, DeviceContext};
use crate::backend::event::HipEvent;
use crate::backend::ffi::{self, HipApi};
use crate::backend::program::Kernel;
use crate::backend::stream::HipStream;
use crate::error::{NeuroError, NeuroResult};

/// Threads per block for every 1-D dispatch
pub const BLOCK_SIZE: u32 = 256;

/// Grid and block size for `work_items` threads
pub fn launch_dims(work_items: usize) -> NeuroResult<(u32, u32)> {
    if work_items == 0 {
        return Err(NeuroError::Dispatch {
            operation: "launch".to_string(),
            message: "zero work items".to_string(),
        });
    }
    let blocks = work_items.div_ceil(BLOCK_SIZE as usize);
    let grid = u32::try_from(blocks).map_err(|_| NeuroError::Dispatch {
        operation: "launch".to_string(),
        message: format!("{} work items exceed the grid limit", work_items),
    })?;
    Ok((grid, BLOCK_SIZE))
}

/// Ordered command channel bound to one device context
pub struct ExecutionSequence {
    // Declared before `stream` so pending events are released first.
    chain: DependencyChain<HipEvent>,
    stream: HipStream,
    context: DeviceContext,
    operations: u64,
    failed: bool,
}

impl std::fmt::Debug for ExecutionSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSequence")
            .field("device", &self.context.ordinal())
            .field("operations", &self.operations)
            .field("idle", &self.chain.is_idle())
            .field("failed", &self.failed)
            .finish()
    }
}

impl ExecutionSequence {
    pub fn new(context: &DeviceContext) -> NeuroResult<Self> {
        context.make_current()?;
        let stream = HipStream::new()?;
        tracing::debug!("Created execution sequence on device {}", context.ordinal());
        Ok(ExecutionSequence {
            chain: DependencyChain::new(),
            stream,
            context: context.clone(),
            operations: 0,
            failed: false,
        })
    }

    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// Number of operations enqueued so far
    pub fn operations_issued(&self) -> u64 {
        self.operations
    }

    /// True when no completion event is pending
    pub fn is_idle(&self) -> bool {
        self.chain.is_idle()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Copy `src` into device memory at `dst`, blocking until it is consumed
    pub(crate) fn enqueue_write(
        &mut self,
        label: &str,
        dst: DevicePtr,
        src: &[f32],
    ) -> NeuroResult<()> {
        let bytes = std::mem::size_of_val(src);
        self.enqueue(label, |hip, stream| unsafe {
            (hip.hip_memcpy_async)(
                dst.as_ptr(),
                src.as_ptr() as *const c_void,
                bytes,
                ffi::HIP_MEMCPY_HOST_TO_DEVICE,
                stream,
            )
        })?;
        self.wait_pending()
    }

    /// Copy device memory at `src` into `dst`, blocking until it has arrived
    pub(crate) fn enqueue_read(
        &mut self,
        label: &str,
        src: DevicePtr,
        dst: &mut [f32],
    ) -> NeuroResult<()> {
        let bytes = std::mem::size_of_val(dst);
        let host = dst.as_mut_ptr() as *mut c_void;
        self.enqueue(label, |hip, stream| unsafe {
            (hip.hip_memcpy_async)(
                host,
                src.as_ptr() as *const c_void,
                bytes,
                ffi::HIP_MEMCPY_DEVICE_TO_HOST,
                stream,
            )
        })?;
        self.finish()
    }

    /// Dispatch `kernel` over `work_items` threads with the arguments in `table`
    pub fn enqueue_kernel(
        &mut self,
        kernel: &Kernel,
        table: &BindingTable,
        work_items: usize,
    ) -> NeuroResult<()> {
        self.check_alive()?;
        if table.signature().name != kernel.name() {
            return Err(NeuroError::ArgumentBinding {
                kernel: kernel.name().to_string(),
                parameter: "*".to_string(),
                reason: format!("table was built for '{}'", table.signature().name),
            });
        }
        let (grid, block) = launch_dims(work_items)?;
        let mut args = table.marshal()?;

        self.enqueue(kernel.name(), |hip, stream| unsafe {
            (hip.hip_module_launch_kernel)(
                kernel.as_ptr(),
                grid,
                1,
                1,
                block,
                1,
                1,
                0,
                stream,
                args.as_kernel_params(),
                std::ptr::null_mut(),
            )
        })
    }

    /// Block until every enqueued operation has completed
    pub fn finish(&mut self) -> NeuroResult<()> {
        self.check_alive()?;
        if let Some(event) = self.chain.drain() {
            if let Err(e) = event.synchronize() {
                self.failed = true;
                return Err(e);
            }
        }
        Ok(())
    }

    fn check_alive(&self) -> NeuroResult<()> {
        if self.failed {
            Err(NeuroError::SequenceFailed)
        } else {
            Ok(())
        }
    }

    fn enqueue<F>(&mut self, label: &str, submit: F) -> NeuroResult<()>
    where
        F: FnOnce(&HipApi, *mut c_void) -> i32,
    {
        self.check_alive()?;
        let outcome = self.link(label, submit);
        if outcome.is_err() {
            tracing::debug!("Execution sequence failed at '{}'", label);
            self.failed = true;
        }
        outcome
    }

    fn link<F>(&mut self, label: &str, submit: F) -> NeuroResult<()>
    where
        F: FnOnce(&HipApi, *mut c_void) -> i32,
    {
        let hip = runtime()?;
        if let Some(pending) = self.chain.pending() {
            self.stream.wait_event(pending)?;
        }

        let result = submit(hip, self.stream.as_ptr());
        if result != ffi::HIP_SUCCESS {
            return Err(NeuroError::Dispatch {
                operation: label.to_string(),
                message: hip.error_string(result),
            });
        }

        let event = HipEvent::record(&self.stream)?;
        // The replaced event is released here; HIP keeps it alive until it fires.
        drop(self.chain.extend(event));
        self.operations += 1;
        tracing::trace!(
            operation = label,
            sequence_position = self.operations,
            "enqueued"
        );
        Ok(())
    }

    fn wait_pending(&mut self) -> NeuroResult<()> {
        if let Some(event) = self.chain.pending() {
            if let Err(e) = event.synchronize() {
                self.failed = true;
                return Err(e);
            }
        }
        Ok(())
    }
}

impl Drop for ExecutionSequence {
    fn drop(&mut self) {
        if let Some(event) = self.chain.drain() {
            if let Err(e) = event.synchronize() {
                tracing::debug!("Dropping execution sequence with failed tail: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_dims_rounds_up() {
        assert_eq!(launch_dims(1).unwrap(), (1, 256));
        assert_eq!(launch_dims(256).unwrap(), (1, 256));
        assert_eq!(launch_dims(257).unwrap(), (2, 256));
        assert_eq!(launch_dims(1000).unwrap(), (4, 256));
    }

    #[test]
    fn test_launch_dims_rejects_empty_dispatch() {
        assert!(matches!(launch_dims(0), Err(NeuroError::Dispatch { .. })));
    }
}
