//! Device buffers and scoped host snapshots
//!
//! A [`DeviceBuffer`] owns one device allocation of `width * height` `f32`
//! elements, zero-filled at creation. Host access goes through
//! [`DeviceBuffer::read`], which returns a [`BufferSnapshot`] guard: element
//! access exists only while the guard lives, and edits can be pushed back
//! with [`BufferSnapshot::write_back`].

use std::ffi::c_void;
use std::ptr;

use crate::backend::binding::{ArgValue, DevicePtr};
use crate::backend::device::{runtime, DeviceContext};
use crate::backend::ffi;
use crate::backend::sequence::ExecutionSequence;
use crate::error::{NeuroError, NeuroResult};

/// Owned device allocation of `f32` elements
#[derive(Debug)]
pub struct DeviceBuffer {
    ptr: DevicePtr,
    width: usize,
    height: usize,
    ordinal: i32,
    label: String,
}

impl DeviceBuffer {
    /// Allocate a zero-filled `width x height` buffer
    pub fn create(width: usize, height: usize, context: &DeviceContext) -> NeuroResult<Self> {
        Self::named("buffer", width, height, context)
    }

    /// Allocate a zero-filled buffer labelled `label` in errors and logs
    pub fn named(
        label: &str,
        width: usize,
        height: usize,
        context: &DeviceContext,
    ) -> NeuroResult<Self> {
        let len = width.checked_mul(height).ok_or_else(|| {
            NeuroError::Configuration(format!(
                "buffer '{}' shape {}x{} overflows usize",
                label, width, height
            ))
        })?;
        if len == 0 {
            return Err(NeuroError::Configuration(format!(
                "buffer '{}' must have at least one element (got {}x{})",
                label, width, height
            )));
        }
        let bytes = len
            .checked_mul(std::mem::size_of::<f32>())
            .ok_or_else(|| NeuroError::Allocation {
                operand: label.to_string(),
                bytes: usize::MAX,
                message: "size overflows usize".to_string(),
            })?;

        context.make_current()?;
        let hip = runtime()?;
        let allocation_error = |message: String| NeuroError::Allocation {
            operand: label.to_string(),
            bytes,
            message,
        };

        let mut raw: *mut c_void = ptr::null_mut();
        let result = unsafe { (hip.hip_malloc)(&mut raw, bytes) };
        if result != ffi::HIP_SUCCESS {
            return Err(allocation_error(hip.error_string(result)));
        }
        let ptr = DevicePtr::new(raw)
            .ok_or_else(|| allocation_error("hipMalloc returned null pointer".to_string()))?;
        // From here on Drop owns the allocation.
        let buffer = DeviceBuffer {
            ptr,
            width,
            height,
            ordinal: context.ordinal(),
            label: label.to_string(),
        };

        let result = unsafe { (hip.hip_memset)(raw, 0, bytes) };
        if result != ffi::HIP_SUCCESS {
            return Err(allocation_error(format!(
                "hipMemset failed: {}",
                hip.error_string(result)
            )));
        }

        tracing::debug!(
            "Allocated '{}' ({}x{}, {} bytes) at {:?}",
            buffer.label,
            width,
            height,
            bytes,
            raw
        );
        Ok(buffer)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordinal of the device holding the allocation
    pub fn ordinal(&self) -> i32 {
        self.ordinal
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size_bytes(&self) -> usize {
        self.len() * std::mem::size_of::<f32>()
    }

    pub fn device_ptr(&self) -> DevicePtr {
        self.ptr
    }

    /// This buffer as a kernel argument
    pub fn binding(&self) -> ArgValue {
        ArgValue::Buffer(Some(self.ptr))
    }

    /// The tagged empty value for an absent buffer argument
    pub fn absent() -> ArgValue {
        ArgValue::Buffer(None)
    }

    /// Overwrite the whole buffer with `data`
    pub fn update(&self, data: &[f32], sequence: &mut ExecutionSequence) -> NeuroResult<()> {
        if data.len() != self.len() {
            return Err(NeuroError::size_mismatch(&self.label, self.len(), data.len()));
        }
        sequence.enqueue_write(&self.label, self.ptr, data)
    }

    /// Read the buffer into a host snapshot, blocking until it has arrived
    pub fn read(&self, sequence: &mut ExecutionSequence) -> NeuroResult<BufferSnapshot<'_>> {
        let mut data = vec![0.0f32; self.len()];
        sequence.enqueue_read(&self.label, self.ptr, &mut data)?;
        Ok(BufferSnapshot { buffer: self, data })
    }

    /// Read the whole buffer into a vector
    pub fn to_vec(&self, sequence: &mut ExecutionSequence) -> NeuroResult<Vec<f32>> {
        Ok(self.read(sequence)?.into_vec())
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        match runtime() {
            Ok(hip) => {
                let result = unsafe { (hip.hip_free)(self.ptr.as_ptr()) };
                if result != ffi::HIP_SUCCESS {
                    tracing::debug!(
                        "hipFree for '{}' failed: {}",
                        self.label,
                        hip.error_string(result)
                    );
                }
            }
            Err(e) => tracing::debug!("Leaking '{}': {}", self.label, e),
        }
    }
}

/// Host copy of a buffer's contents, valid for the guard's lifetime
#[derive(Debug)]
pub struct BufferSnapshot<'a> {
    buffer: &'a DeviceBuffer,
    data: Vec<f32>,
}

impl<'a> BufferSnapshot<'a> {
    fn index(&self, row: usize, col: usize) -> NeuroResult<usize> {
        let (width, height) = (self.buffer.width, self.buffer.height);
        if row >= height || col >= width {
            return Err(NeuroError::IndexOutOfRange {
                row,
                col,
                width,
                height,
            });
        }
        Ok(row * width + col)
    }

    /// Element at (`row`, `col`), row-major
    pub fn get(&self, row: usize, col: usize) -> NeuroResult<f32> {
        Ok(self.data[self.index(row, col)?])
    }

    /// Set the element at (`row`, `col`) in the snapshot only
    pub fn set(&mut self, row: usize, col: usize, value: f32) -> NeuroResult<()> {
        let index = self.index(row, col)?;
        self.data[index] = value;
        Ok(())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.data.clone()
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Push the (possibly edited) snapshot back to the device
    pub fn write_back(&self, sequence: &mut ExecutionSequence) -> NeuroResult<()> {
        self.buffer.update(&self.data, sequence)
    }

    /// End the snapshot scope explicitly
    pub fn release(self) {}
}
