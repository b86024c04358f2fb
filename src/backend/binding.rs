//! Named kernel argument binding
//!
//! Layers bind kernel arguments by parameter name: their own buffers at
//! construction, neighbour buffers at link time. Positions only matter when
//! a dispatch marshals the table into the pointer array `hipModuleLaunchKernel`
//! expects, and they come from the kernel's [`KernelSignature`].
//!
//! An absent neighbour is an explicit `ArgValue::Buffer(None)`, accepted only
//! by parameters declared `OptionalBuffer`; it reaches the device as a null
//! pointer, which the kernels test for.

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::error::{NeuroError, NeuroResult};

/// Non-owning device address
///
/// Copies of a `DevicePtr` never free anything; the owning `DeviceBuffer`
/// must outlive every table it is bound into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr(NonNull<c_void>);

// SAFETY: a device address is plain data on the host side.
unsafe impl Send for DevicePtr {}
unsafe impl Sync for DevicePtr {}

impl DevicePtr {
    pub(crate) fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(DevicePtr)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Declared type of a kernel parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    U32,
    F64,
    /// Device buffer that must be present
    Buffer,
    /// Device buffer that may be absent (null on the device)
    OptionalBuffer,
}

/// One positional kernel parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    pub name: &'static str,
    pub kind: ArgKind,
}

impl Parameter {
    pub const fn new(name: &'static str, kind: ArgKind) -> Self {
        Parameter { name, kind }
    }
}

/// Kernel entry point name and its parameters in launch order
#[derive(Debug, PartialEq, Eq)]
pub struct KernelSignature {
    pub name: &'static str,
    pub parameters: &'static [Parameter],
}

impl KernelSignature {
    pub fn position(&self, parameter: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == parameter)
    }
}

/// Value bound to a kernel parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgValue {
    U32(u32),
    F64(f64),
    Buffer(Option<DevicePtr>),
}

impl ArgValue {
    fn describe(&self) -> &'static str {
        match self {
            ArgValue::U32(_) => "u32",
            ArgValue::F64(_) => "f64",
            ArgValue::Buffer(Some(_)) => "buffer",
            ArgValue::Buffer(None) => "absent buffer",
        }
    }

    fn fits(&self, kind: ArgKind) -> bool {
        matches!(
            (self, kind),
            (ArgValue::U32(_), ArgKind::U32)
                | (ArgValue::F64(_), ArgKind::F64)
                | (ArgValue::Buffer(Some(_)), ArgKind::Buffer)
                | (ArgValue::Buffer(_), ArgKind::OptionalBuffer)
        )
    }
}

/// Argument values for one kernel, keyed by parameter name
#[derive(Debug, Clone)]
pub struct BindingTable {
    signature: &'static KernelSignature,
    values: Vec<Option<ArgValue>>,
}

impl BindingTable {
    pub fn new(signature: &'static KernelSignature) -> Self {
        BindingTable {
            signature,
            values: vec![None; signature.parameters.len()],
        }
    }

    pub fn signature(&self) -> &'static KernelSignature {
        self.signature
    }

    /// Bind `value` to `parameter`, replacing any earlier binding
    pub fn bind(&mut self, parameter: &str, value: ArgValue) -> NeuroResult<()> {
        let index = self
            .signature
            .position(parameter)
            .ok_or_else(|| self.error(parameter, "no such parameter".to_string()))?;
        let kind = self.signature.parameters[index].kind;
        if !value.fits(kind) {
            return Err(self.error(
                parameter,
                format!("cannot bind {} to a {:?} parameter", value.describe(), kind),
            ));
        }
        self.values[index] = Some(value);
        Ok(())
    }

    pub fn bind_u32(&mut self, parameter: &str, value: usize) -> NeuroResult<()> {
        let value = u32::try_from(value)
            .map_err(|_| self.error(parameter, format!("{} does not fit in u32", value)))?;
        self.bind(parameter, ArgValue::U32(value))
    }

    pub fn bind_f64(&mut self, parameter: &str, value: f64) -> NeuroResult<()> {
        self.bind(parameter, ArgValue::F64(value))
    }

    pub fn bind_buffer(&mut self, parameter: &str, ptr: DevicePtr) -> NeuroResult<()> {
        self.bind(parameter, ArgValue::Buffer(Some(ptr)))
    }

    /// Bind the tagged empty value to an optional buffer parameter
    pub fn bind_absent(&mut self, parameter: &str) -> NeuroResult<()> {
        self.bind(parameter, ArgValue::Buffer(None))
    }

    pub fn get(&self, parameter: &str) -> Option<ArgValue> {
        self.signature
            .position(parameter)
            .and_then(|index| self.values[index])
    }

    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    /// Names of parameters that have not been bound yet
    pub fn unbound(&self) -> Vec<&'static str> {
        self.signature
            .parameters
            .iter()
            .zip(&self.values)
            .filter(|(_, value)| value.is_none())
            .map(|(parameter, _)| parameter.name)
            .collect()
    }

    /// Lay the bound values out in launch order
    pub fn marshal(&self) -> NeuroResult<MarshalledArgs> {
        let mut storage = Vec::with_capacity(self.values.len());
        for (parameter, value) in self.signature.parameters.iter().zip(&self.values) {
            let raw = match value {
                Some(ArgValue::U32(v)) => RawArg { u32_value: *v },
                Some(ArgValue::F64(v)) => RawArg { f64_value: *v },
                Some(ArgValue::Buffer(ptr)) => RawArg {
                    pointer: ptr.map_or(std::ptr::null_mut(), |p| p.as_ptr()),
                },
                None => return Err(self.error(parameter.name, "unbound at dispatch".to_string())),
            };
            storage.push(raw);
        }
        Ok(MarshalledArgs::new(storage.into_boxed_slice()))
    }

    fn error(&self, parameter: &str, reason: String) -> NeuroError {
        NeuroError::ArgumentBinding {
            kernel: self.signature.name.to_string(),
            parameter: parameter.to_string(),
            reason,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
union RawArg {
    u32_value: u32,
    f64_value: f64,
    pointer: *mut c_void,
}

/// Argument storage plus the `void**` array that points into it
///
/// The storage lives on the heap, so the pointer array stays valid when the
/// struct itself moves.
pub struct MarshalledArgs {
    _storage: Box<[RawArg]>,
    pointers: Vec<*mut c_void>,
}

impl MarshalledArgs {
    fn new(mut storage: Box<[RawArg]>) -> Self {
        let pointers = storage
            .iter_mut()
            .map(|slot| slot as *mut RawArg as *mut c_void)
            .collect();
        MarshalledArgs {
            _storage: storage,
            pointers,
        }
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    /// Pointer array for `hipModuleLaunchKernel`
    pub fn as_kernel_params(&mut self) -> *mut *mut c_void {
        self.pointers.as_mut_ptr()
    }
}
