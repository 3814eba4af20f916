//! Optional accelerated attention backend
//!
//! The backend is an external collaborator that exposes a single primitive:
//! variable-length forward attention over a flattened batch addressed by a
//! cumulative sequence-length index. [`BackendLoader`] is the seam used by the
//! gate to try loading it; [`VarlenAttention`] is the primitive itself.

pub mod flash_attn;

pub use flash_attn::{
    DType, DeviceTensor, DynamicFlashAttention, FlashAttentionLoader, FlashVarlenParams,
    DEFAULT_BACKEND_LIBRARIES, VARLEN_FWD_SYMBOL,
};

use thiserror::Error;

/// Failure reported by the backend primitive
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("kernel returned error code {code}: {message}")]
    Kernel { code: i32, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failure to load the backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct LoadError {
    pub message: String,
}

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        LoadError {
            message: message.into(),
        }
    }
}

/// Arguments of the variable-length forward primitive, in backend order.
#[derive(Debug)]
pub struct VarlenFwdArgs<'a, T> {
    pub q: &'a T,
    pub k: &'a T,
    pub v: &'a T,
    pub out: Option<&'a mut T>,
    pub cu_seqlens_q: &'a T,
    pub cu_seqlens_k: &'a T,
    pub max_seqlen_q: usize,
    pub max_seqlen_k: usize,
    pub dropout_p: f32,
    pub softmax_scale: f32,
    pub zero_tensors: bool,
    pub is_causal: bool,
    pub return_softmax: bool,
}

/// Variable-length forward attention.
///
/// Implementations must be reentrant for distinct tensor arguments if the
/// gate is shared between threads.
pub trait VarlenAttention: Send + Sync {
    type Tensor;
    type Output;

    fn varlen_fwd(
        &self,
        args: VarlenFwdArgs<'_, Self::Tensor>,
    ) -> Result<Self::Output, BackendError>;
}

/// Loads the optional backend once, at gate initialization.
pub trait BackendLoader {
    type Backend: VarlenAttention;

    /// Human readable name used in error messages, e.g. `Flash Attention V2`.
    fn component(&self) -> &str;

    fn load(&self) -> Result<Self::Backend, LoadError>;
}

impl<L: BackendLoader + ?Sized> BackendLoader for &L {
    type Backend = L::Backend;

    fn component(&self) -> &str {
        (**self).component()
    }

    fn load(&self) -> Result<Self::Backend, LoadError> {
        (**self).load()
    }
}
