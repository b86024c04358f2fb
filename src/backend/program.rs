//! Device programs: HIPRTC compilation, module loading, kernel lookup
//!
//! A program is built from several source fragments joined with a blank
//! line (shared prelude, activation module, layer kernels). Compiled code
//! objects are cached process-wide by a hash of the joined source, the
//! compiler options and the device ordinal, so constructing many layers with
//! the same activation compiles once.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::ffi::{c_char, c_void, CString};
use std::hash::{Hash, Hasher};
use std::ptr;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::backend::binding::KernelSignature;
use crate::backend::device::{runtime, DeviceContext};
use crate::backend::ffi::{self, HiprtcApi, HiprtcProgram};
use crate::error::{NeuroError, NeuroResult};

const COMPILE_OPTIONS: &[&str] = &["--std=c++17", "-O3"];

static CODE_OBJECT_CACHE: Lazy<Mutex<HashMap<u64, Arc<Vec<u8>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Join source fragments the way programs are assembled
pub fn assemble_source(fragments: &[&str]) -> String {
    fragments.join("\n\n")
}

fn cache_key(source: &str, ordinal: i32) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    COMPILE_OPTIONS.hash(&mut hasher);
    ordinal.hash(&mut hasher);
    hasher.finish()
}

/// Number of distinct code objects compiled by this process
pub fn cached_programs() -> usize {
    CODE_OBJECT_CACHE.lock().map(|cache| cache.len()).unwrap_or(0)
}

// SAFETY: ModuleHandle only holds an opaque runtime handle.
unsafe impl Send for ModuleHandle {}
unsafe impl Sync for ModuleHandle {}

#[derive(Debug)]
struct ModuleHandle {
    module: *mut c_void,
}

impl Drop for ModuleHandle {
    fn drop(&mut self) {
        if self.module.is_null() {
            return;
        }
        if let Ok(hip) = runtime() {
            unsafe {
                (hip.hip_module_unload)(self.module);
            }
        }
    }
}

/// A compiled and loaded device program
#[derive(Debug, Clone)]
pub struct DeviceProgram {
    name: String,
    module: Arc<ModuleHandle>,
}

impl DeviceProgram {
    /// Compile `fragments` (joined with blank lines) and load the result
    pub fn compile(context: &DeviceContext, name: &str, fragments: &[&str]) -> NeuroResult<Self> {
        let source = assemble_source(fragments);
        let key = cache_key(&source, context.ordinal());

        let cached = CODE_OBJECT_CACHE.lock()?.get(&key).cloned();
        let code = match cached {
            Some(code) => {
                tracing::debug!("Program '{}' found in code object cache", name);
                code
            }
            None => {
                let code = Arc::new(compile_source(name, &source)?);
                CODE_OBJECT_CACHE.lock()?.insert(key, Arc::clone(&code));
                code
            }
        };

        context.make_current()?;
        let hip = runtime()?;
        let mut module: *mut c_void = ptr::null_mut();
        let result =
            unsafe { (hip.hip_module_load_data)(&mut module, code.as_ptr() as *const c_void) };
        if result != ffi::HIP_SUCCESS {
            return Err(NeuroError::KernelCompilation {
                program: name.to_string(),
                log: format!("hipModuleLoadData failed: {}", hip.error_string(result)),
            });
        }

        Ok(DeviceProgram {
            name: name.to_string(),
            module: Arc::new(ModuleHandle { module }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the entry point described by `signature`
    pub fn kernel(&self, signature: &'static KernelSignature) -> NeuroResult<Kernel> {
        let hip = runtime()?;
        let entry = CString::new(signature.name).map_err(|e| NeuroError::KernelCompilation {
            program: self.name.clone(),
            log: format!("invalid kernel name: {}", e),
        })?;

        let mut function: *mut c_void = ptr::null_mut();
        let result = unsafe {
            (hip.hip_module_get_function)(&mut function, self.module.module, entry.as_ptr())
        };
        if result != ffi::HIP_SUCCESS || function.is_null() {
            return Err(NeuroError::KernelCompilation {
                program: self.name.clone(),
                log: format!(
                    "kernel '{}' not found: {}",
                    signature.name,
                    hip.error_string(result)
                ),
            });
        }

        Ok(Kernel {
            function,
            signature,
            _module: Arc::clone(&self.module),
        })
    }
}

// SAFETY: Kernel only holds an opaque function handle and keeps its module alive.
unsafe impl Send for Kernel {}
unsafe impl Sync for Kernel {}

/// A kernel entry point inside a loaded program
#[derive(Debug)]
pub struct Kernel {
    function: *mut c_void,
    signature: &'static KernelSignature,
    _module: Arc<ModuleHandle>,
}

impl Kernel {
    pub fn name(&self) -> &'static str {
        self.signature.name
    }

    pub fn signature(&self) -> &'static KernelSignature {
        self.signature
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.function
    }
}

fn compile_source(name: &str, source: &str) -> NeuroResult<Vec<u8>> {
    let compile_error = |log: String| NeuroError::KernelCompilation {
        program: name.to_string(),
        log,
    };
    let rtc = ffi::hiprtc().map_err(compile_error)?;

    let name_c = CString::new(name).map_err(|e| compile_error(format!("invalid name: {}", e)))?;
    let source_c =
        CString::new(source).map_err(|e| compile_error(format!("invalid source: {}", e)))?;
    let options: Vec<CString> = COMPILE_OPTIONS
        .iter()
        .map(|option| CString::new(*option))
        .collect::<Result<_, _>>()
        .map_err(|e| compile_error(format!("invalid option: {}", e)))?;
    let option_ptrs: Vec<*const c_char> = options.iter().map(|o| o.as_ptr()).collect();

    let mut program: HiprtcProgram = ptr::null_mut();
    let result = unsafe {
        (rtc.create_program)(
            &mut program,
            source_c.as_ptr(),
            name_c.as_ptr(),
            0,
            ptr::null(),
            ptr::null(),
        )
    };
    if result != ffi::HIPRTC_SUCCESS {
        return Err(compile_error(format!(
            "hiprtcCreateProgram failed: {}",
            rtc.error_string(result)
        )));
    }

    tracing::debug!("Compiling program '{}' ({} bytes of source)", name, source.len());
    let result =
        unsafe { (rtc.compile_program)(program, option_ptrs.len() as i32, option_ptrs.as_ptr()) };
    let outcome = if result != ffi::HIPRTC_SUCCESS {
        let log = program_log(rtc, program).unwrap_or_else(|| rtc.error_string(result));
        Err(compile_error(log))
    } else {
        code_object(rtc, program).map_err(compile_error)
    };

    unsafe { (rtc.destroy_program)(&mut program) };
    outcome
}

fn code_object(rtc: &HiprtcApi, program: HiprtcProgram) -> Result<Vec<u8>, String> {
    let mut size: usize = 0;
    let result = unsafe { (rtc.get_code_size)(program, &mut size) };
    if result != ffi::HIPRTC_SUCCESS {
        return Err(format!("hiprtcGetCodeSize failed: {}", rtc.error_string(result)));
    }

    let mut code = vec![0u8; size];
    let result = unsafe { (rtc.get_code)(program, code.as_mut_ptr() as *mut c_char) };
    if result != ffi::HIPRTC_SUCCESS {
        return Err(format!("hiprtcGetCode failed: {}", rtc.error_string(result)));
    }
    Ok(code)
}

fn program_log(rtc: &HiprtcApi, program: HiprtcProgram) -> Option<String> {
    let mut size: usize = 0;
    if unsafe { (rtc.get_program_log_size)(program, &mut size) } != ffi::HIPRTC_SUCCESS
        || size == 0
    {
        return None;
    }

    let mut buffer = vec![0u8; size];
    if unsafe { (rtc.get_program_log)(program, buffer.as_mut_ptr() as *mut c_char) }
        != ffi::HIPRTC_SUCCESS
    {
        return None;
    }

    let text = String::from_utf8_lossy(&buffer);
    Some(text.trim_end_matches('\0').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_source_separates_fragments() {
        let source = assemble_source(&["int a;", "int b;", "int c;"]);
        assert_eq!(source, "int a;\n\nint b;\n\nint c;");
    }

    #[test]
    fn test_cache_key_depends_on_source_and_device() {
        let base = cache_key("kernel", 0);
        assert_eq!(base, cache_key("kernel", 0));
        assert_ne!(base, cache_key("kernel ", 0));
        assert_ne!(base, cache_key("kernel", 1));
    }
}
