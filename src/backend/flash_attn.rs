//! Flash-attention v2 loaded from a shared library
//!
//! The library must export
//!
//! ```c
//! int flash_attn_varlen_fwd(const FlashVarlenParams *params);
//! const char *flash_attn_last_error(void);   /* optional */
//! ```
//!
//! Tensors cross the boundary as [`DeviceTensor`] descriptors: a device
//! pointer plus dtype and shape. The library owns every kernel detail.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr;

use libloading::Library;
use tracing::debug;

use super::{BackendError, BackendLoader, LoadError, VarlenAttention, VarlenFwdArgs};

/// Library names tried in order.
pub const DEFAULT_BACKEND_LIBRARIES: &[&str] = &["libflash_attn_2_cuda.so"];

/// Entry point resolved from the backend library.
pub const VARLEN_FWD_SYMBOL: &str = "flash_attn_varlen_fwd";

const LAST_ERROR_SYMBOL: &str = "flash_attn_last_error";

const MAX_DIMS: usize = 4;

/// Element type tag understood by the backend.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F16 = 0,
    BF16 = 1,
    F32 = 2,
    I32 = 3,
}

/// Device tensor descriptor. The pointed-to memory stays owned by the caller.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DeviceTensor {
    pub data: *mut c_void,
    pub dtype: DType,
    ndim: i32,
    shape: [i64; MAX_DIMS],
}

impl DeviceTensor {
    /// Describe `data` as a tensor of `shape` (at most 4 dimensions).
    pub fn new(data: *mut c_void, dtype: DType, shape: &[i64]) -> Result<Self, BackendError> {
        if shape.len() > MAX_DIMS {
            return Err(BackendError::InvalidArgument(format!(
                "tensor rank {} exceeds {}",
                shape.len(),
                MAX_DIMS
            )));
        }
        let mut dims = [0i64; MAX_DIMS];
        dims[..shape.len()].copy_from_slice(shape);
        Ok(DeviceTensor {
            data,
            dtype,
            ndim: shape.len() as i32,
            shape: dims,
        })
    }

    pub fn ndim(&self) -> usize {
        usize::try_from(self.ndim).map_or(0, |n| n.min(MAX_DIMS))
    }

    pub fn dims(&self) -> &[i64] {
        &self.shape[..self.ndim()]
    }
}

/// C view of [`VarlenFwdArgs`].
#[repr(C)]
#[derive(Debug)]
pub struct FlashVarlenParams {
    pub q: *const DeviceTensor,
    pub k: *const DeviceTensor,
    pub v: *const DeviceTensor,
    /// Null when the backend should allocate the output itself.
    pub out: *mut DeviceTensor,
    pub cu_seqlens_q: *const DeviceTensor,
    pub cu_seqlens_k: *const DeviceTensor,
    pub max_seqlen_q: c_int,
    pub max_seqlen_k: c_int,
    pub p_dropout: f32,
    pub softmax_scale: f32,
    pub zero_tensors: bool,
    pub is_causal: bool,
    pub return_softmax: bool,
}

type VarlenFwdFn = unsafe extern "C" fn(*const FlashVarlenParams) -> c_int;
type LastErrorFn = unsafe extern "C" fn() -> *const c_char;

/// Loaded flash-attention library.
pub struct DynamicFlashAttention {
    // Keeps the function pointers below valid.
    _lib: Library,
    varlen_fwd: VarlenFwdFn,
    last_error: Option<LastErrorFn>,
    path: String,
}

// SAFETY: the library stays loaded for the lifetime of this value and the
// resolved function pointers are immutable.
unsafe impl Send for DynamicFlashAttention {}
unsafe impl Sync for DynamicFlashAttention {}

impl std::fmt::Debug for DynamicFlashAttention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicFlashAttention")
            .field("path", &self.path)
            .finish()
    }
}

impl DynamicFlashAttention {
    /// Path the library was loaded from.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn error_message(&self) -> String {
        let Some(last_error) = self.last_error else {
            return "no error message exported".to_string();
        };
        // SAFETY: the exported function returns either null or a
        // NUL-terminated string owned by the library.
        unsafe {
            let msg = last_error();
            if msg.is_null() {
                "unknown error".to_string()
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        }
    }
}

fn to_c_int(name: &str, value: usize) -> Result<c_int, BackendError> {
    c_int::try_from(value).map_err(|_| {
        BackendError::InvalidArgument(format!("{} = {} does not fit in int", name, value))
    })
}

impl VarlenAttention for DynamicFlashAttention {
    type Tensor = DeviceTensor;
    type Output = ();

    fn varlen_fwd(&self, args: VarlenFwdArgs<'_, DeviceTensor>) -> Result<(), BackendError> {
        let params = FlashVarlenParams {
            q: args.q,
            k: args.k,
            v: args.v,
            out: args.out.map_or(ptr::null_mut(), |out| out as *mut DeviceTensor),
            cu_seqlens_q: args.cu_seqlens_q,
            cu_seqlens_k: args.cu_seqlens_k,
            max_seqlen_q: to_c_int("max_seqlen_q", args.max_seqlen_q)?,
            max_seqlen_k: to_c_int("max_seqlen_k", args.max_seqlen_k)?,
            p_dropout: args.dropout_p,
            softmax_scale: args.softmax_scale,
            zero_tensors: args.zero_tensors,
            is_causal: args.is_causal,
            return_softmax: args.return_softmax,
        };

        // SAFETY: every pointer in `params` comes from a reference that
        // outlives this call.
        let code = unsafe { (self.varlen_fwd)(&params) };
        if code == 0 {
            Ok(())
        } else {
            Err(BackendError::Kernel {
                code,
                message: self.error_message(),
            })
        }
    }
}

/// Loader for [`DynamicFlashAttention`].
#[derive(Debug, Clone)]
pub struct FlashAttentionLoader {
    component: String,
    libraries: Vec<String>,
}

impl Default for FlashAttentionLoader {
    fn default() -> Self {
        FlashAttentionLoader::new(
            "Flash Attention V2",
            DEFAULT_BACKEND_LIBRARIES.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl FlashAttentionLoader {
    pub fn new(component: impl Into<String>, libraries: Vec<String>) -> Self {
        FlashAttentionLoader {
            component: component.into(),
            libraries,
        }
    }

    pub fn libraries(&self) -> &[String] {
        &self.libraries
    }

    fn load_from(path: &str) -> Result<DynamicFlashAttention, String> {
        // SAFETY: loading runs the library's initializers; the library is the
        // operator-selected flash-attention build.
        let lib = unsafe { Library::new(path) }.map_err(|e| e.to_string())?;

        let varlen_fwd: VarlenFwdFn = unsafe {
            *lib.get::<VarlenFwdFn>(format!("{}\0", VARLEN_FWD_SYMBOL).as_bytes())
                .map_err(|e| format!("{}: {}", VARLEN_FWD_SYMBOL, e))?
        };
        let last_error: Option<LastErrorFn> = unsafe {
            lib.get::<LastErrorFn>(format!("{}\0", LAST_ERROR_SYMBOL).as_bytes())
                .ok()
                .map(|sym| *sym)
        };

        Ok(DynamicFlashAttention {
            _lib: lib,
            varlen_fwd,
            last_error,
            path: path.to_string(),
        })
    }
}

impl BackendLoader for FlashAttentionLoader {
    type Backend = DynamicFlashAttention;

    fn component(&self) -> &str {
        &self.component
    }

    fn load(&self) -> Result<DynamicFlashAttention, LoadError> {
        if self.libraries.is_empty() {
            return Err(LoadError::new("no backend library candidates configured"));
        }

        let mut failures = Vec::with_capacity(self.libraries.len());
        for path in &self.libraries {
            match Self::load_from(path) {
                Ok(backend) => {
                    debug!("Loaded {} from {}", self.component, path);
                    return Ok(backend);
                }
                Err(e) => failures.push(e),
            }
        }
        Err(LoadError::new(failures.join("; ")))
    }
}
