//! HIP event wrapper
//!
//! Events mark completion points on a stream. They are created with timing
//! disabled; the execution sequence only ever waits on them.

use std::ptr;

use crate::backend::device::runtime;
use crate::backend::ffi;
use crate::backend::stream::HipStream;
use crate::error::{NeuroError, NeuroResult};

// SAFETY: HipEvent only holds an opaque runtime handle.
// NOTE: HipEvent is not Clone; two owners would destroy the event twice.
unsafe impl Send for HipEvent {}
unsafe impl Sync for HipEvent {}

/// Completion event recorded on a stream
#[derive(Debug)]
pub struct HipEvent {
    event: *mut std::ffi::c_void,
}

impl HipEvent {
    /// Create an event and record it on `stream` right away
    pub fn record(stream: &HipStream) -> NeuroResult<Self> {
        let hip = runtime()?;
        let mut event: *mut std::ffi::c_void = ptr::null_mut();

        let result =
            unsafe { (hip.hip_event_create_with_flags)(&mut event, ffi::HIP_EVENT_DISABLE_TIMING) };
        if result != ffi::HIP_SUCCESS || event.is_null() {
            return Err(NeuroError::Dispatch {
                operation: "hipEventCreateWithFlags".to_string(),
                message: hip.error_string(result),
            });
        }
        // From here on Drop owns the handle.
        let event = HipEvent { event };

        let result = unsafe { (hip.hip_event_record)(event.event, stream.as_ptr()) };
        if result != ffi::HIP_SUCCESS {
            return Err(NeuroError::Dispatch {
                operation: "hipEventRecord".to_string(),
                message: hip.error_string(result),
            });
        }

        tracing::trace!("HipEvent::record: event={:?}", event.event);
        Ok(event)
    }

    /// Block the host until all work before the event has completed
    pub fn synchronize(&self) -> NeuroResult<()> {
        let hip = runtime()?;
        let result = unsafe { (hip.hip_event_synchronize)(self.event) };
        if result != ffi::HIP_SUCCESS {
            return Err(NeuroError::Synchronization(format!(
                "hipEventSynchronize failed: {}",
                hip.error_string(result)
            )));
        }
        Ok(())
    }

    pub fn as_ptr(&self) -> *mut std::ffi::c_void {
        self.event
    }
}

impl Drop for HipEvent {
    fn drop(&mut self) {
        if self.event.is_null() {
            return;
        }
        if let Ok(hip) = runtime() {
            unsafe {
                (hip.hip_event_destroy)(self.event);
            }
        }
    }
}
