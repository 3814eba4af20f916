//! The capability gate
//!
//! [`CapabilityGate::probe`] walks the initialization protocol once:
//!
//! 1. opt-out flag set to `false` → disabled-by-config, nothing else is touched
//! 2. device query fails → unsupported-hardware (no accelerator)
//! 3. capability pair outside the allow-list → unsupported-hardware
//! 4. backend fails to load → missing-dependency
//! 5. otherwise → available
//!
//! The outcome is terminal. [`CapabilityGate::attention`] only reads it.

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use super::config::GateConfig;
use super::types::{
    AttentionRequest, AvailabilityReport, AvailabilityState, HardwareIssue, UnavailableReason,
};
use crate::backend::{BackendLoader, VarlenAttention, VarlenFwdArgs};
use crate::capability::HardwareProfile;
use crate::device::DeviceQuery;
use crate::error::{GateError, GateResult};

enum GateState<B> {
    Available(B),
    Unavailable(UnavailableReason),
}

/// Probed gate in front of an optional attention backend.
pub struct CapabilityGate<B> {
    state: GateState<B>,
    hardware: Option<HardwareProfile>,
}

impl<B> std::fmt::Debug for CapabilityGate<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityGate")
            .field("state", &self.availability())
            .field("hardware", &self.hardware)
            .finish()
    }
}

impl<B> CapabilityGate<B> {
    /// Gate that is known to be available, skipping the probe.
    pub fn with_backend(backend: B, hardware: HardwareProfile) -> Self {
        CapabilityGate {
            state: GateState::Available(backend),
            hardware: Some(hardware),
        }
    }

    /// Gate that is known to be unavailable.
    pub fn unavailable(reason: UnavailableReason, hardware: Option<HardwareProfile>) -> Self {
        CapabilityGate {
            state: GateState::Unavailable(reason),
            hardware,
        }
    }

    pub fn availability(&self) -> AvailabilityState {
        match &self.state {
            GateState::Available(_) => AvailabilityState::Available,
            GateState::Unavailable(reason) => reason.state(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, GateState::Available(_))
    }

    pub fn unavailable_reason(&self) -> Option<&UnavailableReason> {
        match &self.state {
            GateState::Available(_) => None,
            GateState::Unavailable(reason) => Some(reason),
        }
    }

    /// Compute capability, when the device query got that far.
    pub fn hardware(&self) -> Option<HardwareProfile> {
        self.hardware
    }

    pub fn backend(&self) -> Option<&B> {
        match &self.state {
            GateState::Available(backend) => Some(backend),
            GateState::Unavailable(_) => None,
        }
    }

    /// Return the initialization error matching the latched reason.
    ///
    /// Call this at startup to fail fast instead of on the first request.
    pub fn ensure_available(&self) -> GateResult<()> {
        match &self.state {
            GateState::Available(_) => Ok(()),
            GateState::Unavailable(reason) => Err(GateError::from(reason.clone())),
        }
    }

    pub fn report(&self) -> AvailabilityReport {
        let reason = self.unavailable_reason();
        AvailabilityReport {
            state: self.availability(),
            hardware: self.hardware,
            reason: reason.map(|r| r.to_string()),
            remediation: reason.and_then(|r| r.remediation()),
        }
    }
}

impl<B: VarlenAttention> CapabilityGate<B> {
    /// Run the initialization protocol.
    ///
    /// Never fails: every outcome, including the unavailable ones, becomes
    /// the gate's terminal state.
    pub fn probe<D, L>(config: &GateConfig, device: &D, loader: &L) -> Self
    where
        D: DeviceQuery + ?Sized,
        L: BackendLoader<Backend = B> + ?Sized,
    {
        if let Some(value) = config.opt_out() {
            warn!(
                "{} disabled: `{}` is {}",
                config.component, config.opt_out_var, value
            );
            return Self::unavailable(
                UnavailableReason::ConfigDisabled {
                    flag: config.opt_out_var.clone(),
                    value: value.to_string(),
                },
                None,
            );
        }

        let profile = match device.compute_capability() {
            Ok(profile) => profile,
            Err(e) => {
                warn!("{} disabled: CUDA is not available: {}", config.component, e);
                return Self::unavailable(
                    UnavailableReason::UnsupportedHardware(HardwareIssue::NoAccelerator {
                        detail: e.to_string(),
                    }),
                    None,
                );
            }
        };
        debug!("Detected compute capability {}", profile.sm_tag());

        if !config.allow_list.is_supported(&profile) {
            warn!(
                "{} disabled: {} is outside the allow-list {}",
                config.component,
                profile.sm_tag(),
                config.allow_list
            );
            return Self::unavailable(
                UnavailableReason::UnsupportedHardware(HardwareIssue::Capability {
                    profile,
                    allowed: config.allow_list.to_string(),
                }),
                Some(profile),
            );
        }

        match loader.load() {
            Ok(backend) => {
                info!("{} available on {}", loader.component(), profile.sm_tag());
                Self::with_backend(backend, profile)
            }
            Err(e) => {
                warn!("{} is not installed: {}", loader.component(), e);
                Self::unavailable(
                    UnavailableReason::MissingDependency {
                        component: loader.component().to_string(),
                        error: e.to_string(),
                        remediation: config.remediation.clone(),
                    },
                    Some(profile),
                )
            }
        }
    }

    /// Variable-length forward attention through the backend.
    ///
    /// The same `cu_seqlens` and `max_s` serve the query and key/value sides;
    /// dropout is zero and masking is non-causal. The backend result is
    /// returned untouched. Fails with `BackendUnavailable` without calling
    /// the backend when the probe did not end in `available`.
    pub fn attention(&self, request: AttentionRequest<'_, B::Tensor>) -> GateResult<B::Output> {
        let backend = match &self.state {
            GateState::Available(backend) => backend,
            GateState::Unavailable(reason) => {
                return Err(GateError::BackendUnavailable(reason.clone()))
            }
        };

        backend
            .varlen_fwd(VarlenFwdArgs {
                q: request.q,
                k: request.k,
                v: request.v,
                out: Some(request.out),
                cu_seqlens_q: request.cu_seqlens,
                cu_seqlens_k: request.cu_seqlens,
                max_seqlen_q: request.max_s,
                max_seqlen_k: request.max_s,
                dropout_p: 0.0,
                softmax_scale: request.softmax_scale,
                zero_tensors: false,
                is_causal: false,
                return_softmax: false,
            })
            .map_err(GateError::KernelFailed)
    }
}

/// Compute-once holder for a [`CapabilityGate`].
///
/// The first `get_or_probe` runs the probe; concurrent first callers block
/// until it finishes and every caller sees the same gate afterwards.
pub struct GateCell<B> {
    cell: OnceCell<CapabilityGate<B>>,
}

impl<B> Default for GateCell<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> GateCell<B> {
    pub const fn new() -> Self {
        GateCell {
            cell: OnceCell::new(),
        }
    }

    pub fn get_or_probe<F>(&self, probe: F) -> &CapabilityGate<B>
    where
        F: FnOnce() -> CapabilityGate<B>,
    {
        self.cell.get_or_init(probe)
    }

    /// The gate, if it has been probed.
    pub fn get(&self) -> Option<&CapabilityGate<B>> {
        self.cell.get()
    }
}
