//! Shared test doubles for the gate's seams
//!
//! - [`FakeDevice`] answers the device query with a fixed pair (or no device)
//!   and counts how often it was asked
//! - [`MockLoader`] hands out a [`RecordingBackend`] or fails with a given
//!   load error, counting attempts
//! - [`RecordingBackend`] records every primitive call and returns
//!   [`BACKEND_TOKEN`] so pass-through can be checked

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use flashgate::backend::{BackendError, BackendLoader, LoadError, VarlenAttention, VarlenFwdArgs};
use flashgate::device::{DeviceError, DeviceQuery};
use flashgate::HardwareProfile;

/// Host-side stand-in for a device tensor.
pub type HostTensor = Vec<i64>;

/// Value returned by every successful [`RecordingBackend`] call.
pub const BACKEND_TOKEN: u64 = 0xF1A5_0002;

/// Value written into the output buffer by [`RecordingBackend`].
pub const OUT_FILL: i64 = 7;

pub struct FakeDevice {
    result: Result<HardwareProfile, DeviceError>,
    queries: AtomicUsize,
}

impl FakeDevice {
    pub fn with_capability(major: u32, minor: u32) -> Self {
        FakeDevice {
            result: Ok(HardwareProfile::new(major, minor)),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn absent() -> Self {
        FakeDevice {
            result: Err(DeviceError::NoDevice),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl DeviceQuery for FakeDevice {
    fn compute_capability(&self) -> Result<HardwareProfile, DeviceError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Arguments seen by the backend, copied out of one call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub q: HostTensor,
    pub k: HostTensor,
    pub v: HostTensor,
    pub had_out: bool,
    pub cu_seqlens_q: HostTensor,
    pub cu_seqlens_k: HostTensor,
    pub max_seqlen_q: usize,
    pub max_seqlen_k: usize,
    pub dropout_p: f32,
    pub softmax_scale: f32,
    pub zero_tensors: bool,
    pub is_causal: bool,
    pub return_softmax: bool,
}

pub struct RecordingBackend {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    fail_with: Option<BackendError>,
}

impl VarlenAttention for RecordingBackend {
    type Tensor = HostTensor;
    type Output = u64;

    fn varlen_fwd(&self, args: VarlenFwdArgs<'_, HostTensor>) -> Result<u64, BackendError> {
        let had_out = args.out.is_some();
        if let Some(out) = args.out {
            out.iter_mut().for_each(|x| *x = OUT_FILL);
        }
        self.calls.lock().unwrap().push(RecordedCall {
            q: args.q.clone(),
            k: args.k.clone(),
            v: args.v.clone(),
            had_out,
            cu_seqlens_q: args.cu_seqlens_q.clone(),
            cu_seqlens_k: args.cu_seqlens_k.clone(),
            max_seqlen_q: args.max_seqlen_q,
            max_seqlen_k: args.max_seqlen_k,
            dropout_p: args.dropout_p,
            softmax_scale: args.softmax_scale,
            zero_tensors: args.zero_tensors,
            is_causal: args.is_causal,
            return_softmax: args.return_softmax,
        });
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(BACKEND_TOKEN),
        }
    }
}

pub struct MockLoader {
    load_error: Option<String>,
    kernel_error: Option<BackendError>,
    loads: AtomicUsize,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockLoader {
    pub fn working() -> Self {
        MockLoader {
            load_error: None,
            kernel_error: None,
            loads: AtomicUsize::new(0),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(error: &str) -> Self {
        MockLoader {
            load_error: Some(error.to_string()),
            ..MockLoader::working()
        }
    }

    pub fn with_kernel_error(error: BackendError) -> Self {
        MockLoader {
            kernel_error: Some(error),
            ..MockLoader::working()
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl BackendLoader for MockLoader {
    type Backend = RecordingBackend;

    fn component(&self) -> &str {
        "Flash Attention V2"
    }

    fn load(&self) -> Result<RecordingBackend, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match &self.load_error {
            Some(error) => Err(LoadError::new(error.clone())),
            None => Ok(RecordingBackend {
                calls: Arc::clone(&self.calls),
                fail_with: self.kernel_error.clone(),
            }),
        }
    }
}
