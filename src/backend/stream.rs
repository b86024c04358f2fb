//! HIP stream wrapper

use std::ptr;

use crate::backend::device::runtime;
use crate::backend::event::HipEvent;
use crate::backend::ffi;
use crate::error::{NeuroError, NeuroResult};

// SAFETY: HipStream only holds an opaque runtime handle. HIP streams may be
// used from any thread that has the owning device current.
// NOTE: HipStream is not Clone; two owners would destroy the stream twice.
unsafe impl Send for HipStream {}
unsafe impl Sync for HipStream {}

/// In-order HIP command stream
#[derive(Debug)]
pub struct HipStream {
    stream: *mut std::ffi::c_void,
}

impl HipStream {
    pub fn new() -> NeuroResult<Self> {
        let hip = runtime()?;
        let mut stream: *mut std::ffi::c_void = ptr::null_mut();

        let result = unsafe { (hip.hip_stream_create)(&mut stream) };
        tracing::debug!(
            "HipStream::new: hipStreamCreate returned result={}, stream={:?}",
            result,
            stream
        );

        if result != ffi::HIP_SUCCESS {
            return Err(NeuroError::ContextCreation(format!(
                "hipStreamCreate failed: {}",
                hip.error_string(result)
            )));
        }
        if stream.is_null() {
            return Err(NeuroError::ContextCreation(
                "hipStreamCreate returned null pointer".to_string(),
            ));
        }

        Ok(HipStream { stream })
    }

    /// Make all future work on this stream wait for `event`
    pub fn wait_event(&self, event: &HipEvent) -> NeuroResult<()> {
        let hip = runtime()?;
        let result = unsafe { (hip.hip_stream_wait_event)(self.stream, event.as_ptr(), 0) };
        if result != ffi::HIP_SUCCESS {
            return Err(NeuroError::Synchronization(format!(
                "hipStreamWaitEvent failed: {}",
                hip.error_string(result)
            )));
        }
        Ok(())
    }

    pub fn as_ptr(&self) -> *mut std::ffi::c_void {
        self.stream
    }
}

impl Drop for HipStream {
    fn drop(&mut self) {
        if self.stream.is_null() {
            return;
        }
        if let Ok(hip) = runtime() {
            unsafe {
                (hip.hip_stream_destroy)(self.stream);
            }
        }
    }
}
