//! HIP runtime and HIPRTC entry points
//!
//! Both libraries are opened with `libloading` the first time a device
//! context or program needs them, so the crate builds and links on hosts
//! without ROCm. Each API table keeps its `Library` alive for the life of the
//! process; the function pointers copied out of it stay valid for as long.
//!
//! Search order: `$ROCM_PATH/lib`, `/opt/rocm/lib`, then the platform loader
//! path with and without the ABI version suffix.

use std::ffi::{c_char, c_void, CStr};
use std::path::PathBuf;

use libloading::Library;
use once_cell::sync::OnceCell;

/// HIP success code
pub const HIP_SUCCESS: i32 = 0;

/// HIP memory copy kinds
pub const HIP_MEMCPY_HOST_TO_DEVICE: i32 = 1;
pub const HIP_MEMCPY_DEVICE_TO_HOST: i32 = 2;

/// Event flag to disable timing data collection
pub const HIP_EVENT_DISABLE_TIMING: u32 = 0x2;

/// HIPRTC success code
pub const HIPRTC_SUCCESS: i32 = 0;

pub type HiprtcProgram = *mut c_void;

type HipInitFn = unsafe extern "C" fn(flags: u32) -> i32;
type HipGetDeviceCountFn = unsafe extern "C" fn(count: *mut i32) -> i32;
type HipDeviceGetNameFn = unsafe extern "C" fn(name: *mut c_char, len: i32, device: i32) -> i32;
type HipDeviceTotalMemFn = unsafe extern "C" fn(bytes: *mut usize, device: i32) -> i32;
type HipSetDeviceFn = unsafe extern "C" fn(device: i32) -> i32;
type HipGetDeviceFn = unsafe extern "C" fn(device: *mut i32) -> i32;
type HipMallocFn = unsafe extern "C" fn(ptr: *mut *mut c_void, size: usize) -> i32;
type HipFreeFn = unsafe extern "C" fn(ptr: *mut c_void) -> i32;
type HipMemsetFn = unsafe extern "C" fn(dst: *mut c_void, value: i32, count: usize) -> i32;
type HipMemcpyAsyncFn = unsafe extern "C" fn(
    dst: *mut c_void,
    src: *const c_void,
    count: usize,
    kind: i32,
    stream: *mut c_void,
) -> i32;
type HipStreamCreateFn = unsafe extern "C" fn(stream: *mut *mut c_void) -> i32;
type HipStreamFn = unsafe extern "C" fn(stream: *mut c_void) -> i32;
type HipStreamWaitEventFn =
    unsafe extern "C" fn(stream: *mut c_void, event: *mut c_void, flags: u32) -> i32;
type HipEventCreateWithFlagsFn = unsafe extern "C" fn(event: *mut *mut c_void, flags: u32) -> i32;
type HipEventFn = unsafe extern "C" fn(event: *mut c_void) -> i32;
type HipEventRecordFn = unsafe extern "C" fn(event: *mut c_void, stream: *mut c_void) -> i32;
type HipModuleLoadDataFn =
    unsafe extern "C" fn(module: *mut *mut c_void, image: *const c_void) -> i32;
type HipModuleUnloadFn = unsafe extern "C" fn(module: *mut c_void) -> i32;
type HipModuleGetFunctionFn =
    unsafe extern "C" fn(func: *mut *mut c_void, module: *mut c_void, name: *const c_char) -> i32;
type HipModuleLaunchKernelFn = unsafe extern "C" fn(
    func: *mut c_void,
    grid_dim_x: u32,
    grid_dim_y: u32,
    grid_dim_z: u32,
    block_dim_x: u32,
    block_dim_y: u32,
    block_dim_z: u32,
    shared_mem_bytes: u32,
    stream: *mut c_void,
    kernel_params: *mut *mut c_void,
    extra: *mut *mut c_void,
) -> i32;
type HipMemGetInfoFn = unsafe extern "C" fn(free: *mut usize, total: *mut usize) -> i32;
type HipGetErrorStringFn = unsafe extern "C" fn(error: i32) -> *const c_char;

type HiprtcCreateProgramFn = unsafe extern "C" fn(
    prog: *mut HiprtcProgram,
    src: *const c_char,
    name: *const c_char,
    num_headers: i32,
    headers: *const *const c_char,
    include_names: *const *const c_char,
) -> i32;
type HiprtcCompileProgramFn = unsafe extern "C" fn(
    prog: HiprtcProgram,
    num_options: i32,
    options: *const *const c_char,
) -> i32;
type HiprtcSizeFn = unsafe extern "C" fn(prog: HiprtcProgram, size: *mut usize) -> i32;
type HiprtcCopyOutFn = unsafe extern "C" fn(prog: HiprtcProgram, out: *mut c_char) -> i32;
type HiprtcDestroyProgramFn = unsafe extern "C" fn(prog: *mut HiprtcProgram) -> i32;
type HiprtcGetErrorStringFn = unsafe extern "C" fn(result: i32) -> *const c_char;

macro_rules! load_symbol {
    ($lib:expr, $name:literal, $ty:ty) => {{
        let symbol: libloading::Symbol<$ty> = unsafe { $lib.get(concat!($name, "\0").as_bytes()) }
            .map_err(|e| format!("missing symbol {}: {}", $name, e))?;
        *symbol
    }};
}

/// Function table for the HIP runtime (`libamdhip64`)
pub struct HipApi {
    _library: Library,
    pub hip_init: HipInitFn,
    pub hip_get_device_count: HipGetDeviceCountFn,
    pub hip_device_get_name: HipDeviceGetNameFn,
    pub hip_device_total_mem: HipDeviceTotalMemFn,
    pub hip_set_device: HipSetDeviceFn,
    pub hip_get_device: HipGetDeviceFn,
    pub hip_malloc: HipMallocFn,
    pub hip_free: HipFreeFn,
    pub hip_memset: HipMemsetFn,
    pub hip_memcpy_async: HipMemcpyAsyncFn,
    pub hip_stream_create: HipStreamCreateFn,
    pub hip_stream_destroy: HipStreamFn,
    pub hip_stream_wait_event: HipStreamWaitEventFn,
    pub hip_event_create_with_flags: HipEventCreateWithFlagsFn,
    pub hip_event_destroy: HipEventFn,
    pub hip_event_record: HipEventRecordFn,
    pub hip_event_synchronize: HipEventFn,
    pub hip_module_load_data: HipModuleLoadDataFn,
    pub hip_module_unload: HipModuleUnloadFn,
    pub hip_module_get_function: HipModuleGetFunctionFn,
    pub hip_module_launch_kernel: HipModuleLaunchKernelFn,
    pub hip_mem_get_info: HipMemGetInfoFn,
    hip_get_error_string: HipGetErrorStringFn,
}

impl HipApi {
    fn load() -> Result<Self, String> {
        let library = open_first("amdhip64", &["6", "5"])?;
        Ok(HipApi {
            hip_init: load_symbol!(library, "hipInit", HipInitFn),
            hip_get_device_count: load_symbol!(library, "hipGetDeviceCount", HipGetDeviceCountFn),
            hip_device_get_name: load_symbol!(library, "hipDeviceGetName", HipDeviceGetNameFn),
            hip_device_total_mem: load_symbol!(library, "hipDeviceTotalMem", HipDeviceTotalMemFn),
            hip_set_device: load_symbol!(library, "hipSetDevice", HipSetDeviceFn),
            hip_get_device: load_symbol!(library, "hipGetDevice", HipGetDeviceFn),
            hip_malloc: load_symbol!(library, "hipMalloc", HipMallocFn),
            hip_free: load_symbol!(library, "hipFree", HipFreeFn),
            hip_memset: load_symbol!(library, "hipMemset", HipMemsetFn),
            hip_memcpy_async: load_symbol!(library, "hipMemcpyAsync", HipMemcpyAsyncFn),
            hip_stream_create: load_symbol!(library, "hipStreamCreate", HipStreamCreateFn),
            hip_stream_destroy: load_symbol!(library, "hipStreamDestroy", HipStreamFn),
            hip_stream_wait_event: load_symbol!(
                library,
                "hipStreamWaitEvent",
                HipStreamWaitEventFn
            ),
            hip_event_create_with_flags: load_symbol!(
                library,
                "hipEventCreateWithFlags",
                HipEventCreateWithFlagsFn
            ),
            hip_event_destroy: load_symbol!(library, "hipEventDestroy", HipEventFn),
            hip_event_record: load_symbol!(library, "hipEventRecord", HipEventRecordFn),
            hip_event_synchronize: load_symbol!(library, "hipEventSynchronize", HipEventFn),
            hip_module_load_data: load_symbol!(library, "hipModuleLoadData", HipModuleLoadDataFn),
            hip_module_unload: load_symbol!(library, "hipModuleUnload", HipModuleUnloadFn),
            hip_module_get_function: load_symbol!(
                library,
                "hipModuleGetFunction",
                HipModuleGetFunctionFn
            ),
            hip_module_launch_kernel: load_symbol!(
                library,
                "hipModuleLaunchKernel",
                HipModuleLaunchKernelFn
            ),
            hip_mem_get_info: load_symbol!(library, "hipMemGetInfo", HipMemGetInfoFn),
            hip_get_error_string: load_symbol!(library, "hipGetErrorString", HipGetErrorStringFn),
            _library: library,
        })
    }

    /// Human-readable description of a HIP status code
    pub fn error_string(&self, status: i32) -> String {
        let raw = unsafe { (self.hip_get_error_string)(status) };
        if raw.is_null() {
            return format!("hipError {}", status);
        }
        let text = unsafe { CStr::from_ptr(raw) }.to_string_lossy();
        format!("{} ({})", text, status)
    }
}

/// Function table for the HIP runtime compiler (`libhiprtc`)
pub struct HiprtcApi {
    _library: Library,
    pub create_program: HiprtcCreateProgramFn,
    pub compile_program: HiprtcCompileProgramFn,
    pub get_program_log_size: HiprtcSizeFn,
    pub get_program_log: HiprtcCopyOutFn,
    pub get_code_size: HiprtcSizeFn,
    pub get_code: HiprtcCopyOutFn,
    pub destroy_program: HiprtcDestroyProgramFn,
    get_error_string: HiprtcGetErrorStringFn,
}

impl HiprtcApi {
    fn load() -> Result<Self, String> {
        let library = open_first("hiprtc", &["6", "5"])?;
        Ok(HiprtcApi {
            create_program: load_symbol!(library, "hiprtcCreateProgram", HiprtcCreateProgramFn),
            compile_program: load_symbol!(library, "hiprtcCompileProgram", HiprtcCompileProgramFn),
            get_program_log_size: load_symbol!(library, "hiprtcGetProgramLogSize", HiprtcSizeFn),
            get_program_log: load_symbol!(library, "hiprtcGetProgramLog", HiprtcCopyOutFn),
            get_code_size: load_symbol!(library, "hiprtcGetCodeSize", HiprtcSizeFn),
            get_code: load_symbol!(library, "hiprtcGetCode", HiprtcCopyOutFn),
            destroy_program: load_symbol!(library, "hiprtcDestroyProgram", HiprtcDestroyProgramFn),
            get_error_string: load_symbol!(library, "hiprtcGetErrorString", HiprtcGetErrorStringFn),
            _library: library,
        })
    }

    pub fn error_string(&self, status: i32) -> String {
        let raw = unsafe { (self.get_error_string)(status) };
        if raw.is_null() {
            return format!("hiprtcResult {}", status);
        }
        let text = unsafe { CStr::from_ptr(raw) }.to_string_lossy();
        format!("{} ({})", text, status)
    }
}

static HIP_API: OnceCell<Result<HipApi, String>> = OnceCell::new();
static HIPRTC_API: OnceCell<Result<HiprtcApi, String>> = OnceCell::new();

/// Load (once) and return the HIP runtime table
pub fn hip() -> Result<&'static HipApi, String> {
    HIP_API
        .get_or_init(|| {
            let api = HipApi::load();
            match &api {
                Ok(_) => tracing::debug!("HIP runtime loaded"),
                Err(e) => tracing::debug!("HIP runtime unavailable: {}", e),
            }
            api
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// Load (once) and return the HIPRTC table
pub fn hiprtc() -> Result<&'static HiprtcApi, String> {
    HIPRTC_API
        .get_or_init(HiprtcApi::load)
        .as_ref()
        .map_err(Clone::clone)
}

fn open_first(stem: &str, versions: &[&str]) -> Result<Library, String> {
    let candidates = library_candidates(stem, versions);
    let mut failures = Vec::with_capacity(candidates.len());
    for path in &candidates {
        match unsafe { Library::new(path) } {
            Ok(library) => {
                tracing::debug!("Loaded {} from {}", stem, path.display());
                return Ok(library);
            }
            Err(e) => failures.push(format!("{}: {}", path.display(), e)),
        }
    }
    Err(format!("could not load {}: {}", stem, failures.join("; ")))
}

fn library_candidates(stem: &str, versions: &[&str]) -> Vec<PathBuf> {
    let file_name = PathBuf::from(libloading::library_filename(stem));
    let mut roots: Vec<PathBuf> = Vec::new();
    if let Ok(rocm) = std::env::var("ROCM_PATH") {
        if !rocm.trim().is_empty() {
            roots.push(PathBuf::from(rocm.trim()).join("lib"));
        }
    }
    roots.push(PathBuf::from("/opt/rocm/lib"));

    let mut names = vec![file_name.clone()];
    if cfg!(unix) {
        for version in versions {
            let mut versioned = file_name.clone().into_os_string();
            versioned.push(format!(".{}", version));
            names.push(PathBuf::from(versioned));
        }
    }

    let mut candidates = Vec::new();
    for root in &roots {
        for name in &names {
            candidates.push(root.join(name));
        }
    }
    // Bare names go through the platform loader search path.
    candidates.extend(names);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_candidates_cover_versioned_names() {
        let candidates = library_candidates("amdhip64", &["6"]);
        let rendered: Vec<String> = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect();

        assert!(rendered.iter().any(|p| p.starts_with("/opt/rocm/lib")));
        if cfg!(target_os = "linux") {
            assert!(rendered.contains(&"libamdhip64.so".to_string()));
            assert!(rendered.contains(&"libamdhip64.so.6".to_string()));
        }
    }

    #[test]
    fn test_missing_library_reports_every_attempt() {
        let err = open_first("neuroforge_no_such_library", &["1"])
            .err()
            .unwrap_or_default();
        assert!(err.contains("could not load neuroforge_no_such_library"));
        assert!(err.contains("/opt/rocm/lib"));
    }
}
