//! flashgate - capability-gated flash attention
//!
//! Decides once per process whether an optional accelerated attention backend
//! can be used (opt-out flag, accelerator compute capability, backend
//! installation) and then either delegates variable-length attention to it or
//! fails with the reason that was latched at startup. There is no silent slow
//! path.
//!
//! ```ignore
//! let gate = flashgate::gate::global::init()?; // fail fast at startup
//! gate.attention(AttentionRequest { q, k, v, out, cu_seqlens, max_s, softmax_scale })?;
//! ```

#![allow(clippy::neg_cmp_op_on_partial_ord)] // NaN must fail parameter validation

pub mod backend;
pub mod bench;
pub mod capability;
pub mod device;
pub mod error;
pub mod gate;
pub mod logging;
pub mod tokenizer;

pub use capability::{AllowList, HardwareProfile};
pub use error::{ErrorCategory, GateError, GateResult};
pub use gate::{
    AttentionRequest, AvailabilityState, CapabilityGate, GateCell, GateConfig, UnavailableReason,
};
