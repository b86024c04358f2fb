//! Device discovery and the device context
//!
//! HIP device selection is per thread: `hipSetDevice` only affects the
//! calling thread, and device pointers allocated under one device are
//! meaningless under another. The current ordinal is cached in a
//! thread-local and re-asserted with [`ensure_device`] before any call that
//! allocates or creates a stream.

use std::cell::Cell;
use std::ffi::c_char;
use std::sync::Arc;

use crate::backend::ffi::{self, HipApi};
use crate::error::{NeuroError, NeuroResult};

thread_local! {
    static THREAD_DEVICE_ID: Cell<i32> = const { Cell::new(-1) };
}

/// Static description of a HIP device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub ordinal: i32,
    pub name: String,
    pub total_memory: usize,
}

/// A handle to one accelerator device
///
/// Created once, never mutated, cheap to clone. Buffers and execution
/// sequences created from the same context share the device.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    info: Arc<DeviceInfo>,
}

impl DeviceContext {
    /// Open the device with the most memory
    pub fn open() -> NeuroResult<Self> {
        let devices = list_devices()?;
        let best = devices
            .into_iter()
            .max_by_key(|d| d.total_memory)
            .ok_or_else(|| NeuroError::ContextCreation("no HIP devices found".to_string()))?;
        Self::activate(best)
    }

    /// Open a specific device by ordinal
    pub fn open_device(ordinal: i32) -> NeuroResult<Self> {
        let devices = list_devices()?;
        let info = devices
            .into_iter()
            .find(|d| d.ordinal == ordinal)
            .ok_or_else(|| {
                NeuroError::ContextCreation(format!("device {} does not exist", ordinal))
            })?;
        Self::activate(info)
    }

    fn activate(info: DeviceInfo) -> NeuroResult<Self> {
        ensure_device(info.ordinal)?;
        tracing::info!(
            "Opened HIP device {} ({}, {} MiB)",
            info.ordinal,
            info.name,
            info.total_memory / (1024 * 1024)
        );
        Ok(DeviceContext {
            info: Arc::new(info),
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn ordinal(&self) -> i32 {
        self.info.ordinal
    }

    /// Free and total device memory in bytes
    pub fn memory_info(&self) -> NeuroResult<(usize, usize)> {
        self.make_current()?;
        let hip = runtime()?;
        let mut free: usize = 0;
        let mut total: usize = 0;
        let result = unsafe { (hip.hip_mem_get_info)(&mut free, &mut total) };
        if result != ffi::HIP_SUCCESS {
            return Err(NeuroError::Synchronization(format!(
                "hipMemGetInfo failed: {}",
                hip.error_string(result)
            )));
        }
        Ok((free, total))
    }

    /// Make this context's device current on the calling thread
    pub fn make_current(&self) -> NeuroResult<()> {
        ensure_device(self.info.ordinal)
    }
}

/// Whether a HIP runtime and at least one device are present
pub fn is_available() -> bool {
    match list_devices() {
        Ok(devices) => !devices.is_empty(),
        Err(_) => false,
    }
}

/// Enumerate visible HIP devices
pub fn list_devices() -> NeuroResult<Vec<DeviceInfo>> {
    let hip = runtime()?;

    let result = unsafe { (hip.hip_init)(0) };
    if result != ffi::HIP_SUCCESS {
        return Err(NeuroError::ContextCreation(format!(
            "hipInit failed: {}",
            hip.error_string(result)
        )));
    }

    let mut count: i32 = 0;
    let result = unsafe { (hip.hip_get_device_count)(&mut count) };
    if result != ffi::HIP_SUCCESS {
        return Err(NeuroError::ContextCreation(format!(
            "hipGetDeviceCount failed: {}",
            hip.error_string(result)
        )));
    }

    let mut devices = Vec::with_capacity(count.max(0) as usize);
    for ordinal in 0..count {
        devices.push(query_device(hip, ordinal)?);
    }
    tracing::debug!("Found {} HIP device(s)", devices.len());
    Ok(devices)
}

fn query_device(hip: &HipApi, ordinal: i32) -> NeuroResult<DeviceInfo> {
    let mut name_buf = [0 as c_char; 256];
    let result =
        unsafe { (hip.hip_device_get_name)(name_buf.as_mut_ptr(), name_buf.len() as i32, ordinal) };
    if result != ffi::HIP_SUCCESS {
        return Err(NeuroError::ContextCreation(format!(
            "hipDeviceGetName({}) failed: {}",
            ordinal,
            hip.error_string(result)
        )));
    }
    let bytes: Vec<u8> = name_buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    let name = String::from_utf8_lossy(&bytes).into_owned();

    let mut total_memory: usize = 0;
    let result = unsafe { (hip.hip_device_total_mem)(&mut total_memory, ordinal) };
    if result != ffi::HIP_SUCCESS {
        return Err(NeuroError::ContextCreation(format!(
            "hipDeviceTotalMem({}) failed: {}",
            ordinal,
            hip.error_string(result)
        )));
    }

    Ok(DeviceInfo {
        ordinal,
        name,
        total_memory,
    })
}

/// The loaded HIP runtime, or `ContextCreation` if it cannot be loaded
pub(crate) fn runtime() -> NeuroResult<&'static HipApi> {
    ffi::hip().map_err(NeuroError::ContextCreation)
}

/// Current HIP device for this thread, cached after the first query
pub fn thread_device() -> NeuroResult<i32> {
    let hip = runtime()?;
    THREAD_DEVICE_ID.with(|cell| {
        let cached = cell.get();
        if cached >= 0 {
            return Ok(cached);
        }

        let mut device: i32 = -1;
        let result = unsafe { (hip.hip_get_device)(&mut device) };
        if result != ffi::HIP_SUCCESS {
            return Err(NeuroError::ContextCreation(format!(
                "hipGetDevice failed: {}",
                hip.error_string(result)
            )));
        }

        cell.set(device);
        Ok(device)
    })
}

/// Ensure the calling thread uses `expected_device`
pub fn ensure_device(expected_device: i32) -> NeuroResult<()> {
    let current = thread_device()?;
    if current == expected_device {
        return Ok(());
    }

    tracing::debug!(
        "Device mismatch: current={}, expected={}, calling hipSetDevice",
        current,
        expected_device
    );
    let hip = runtime()?;
    let result = unsafe { (hip.hip_set_device)(expected_device) };
    if result != ffi::HIP_SUCCESS {
        return Err(NeuroError::ContextCreation(format!(
            "hipSetDevice({}) failed: {}",
            expected_device,
            hip.error_string(result)
        )));
    }

    THREAD_DEVICE_ID.with(|cell| cell.set(expected_device));
    Ok(())
}
