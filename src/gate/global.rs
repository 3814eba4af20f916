//! Process-wide gate for the dynamically loaded flash-attention backend
//!
//! The probe runs at most once per process. [`init`] is meant to be called
//! at startup so a misconfigured host fails before serving traffic; [`gate`]
//! and [`attention`] probe lazily when `init` was never called.

use tracing::debug;

use super::config::GateConfig;
use super::gate::{CapabilityGate, GateCell};
use super::types::AttentionRequest;
use crate::backend::{DeviceTensor, DynamicFlashAttention};
use crate::error::GateResult;

/// Gate type used by the process-wide helpers.
pub type FlashGate = CapabilityGate<DynamicFlashAttention>;

static FLASH_GATE: GateCell<DynamicFlashAttention> = GateCell::new();

fn probe_with(config: &GateConfig) -> FlashGate {
    CapabilityGate::probe(config, &config.device(), &config.loader())
}

/// The process-wide gate, probing from the environment on first use.
///
/// Only an invalid environment fails here; an unavailable backend is a
/// valid, probed gate.
pub fn gate() -> GateResult<&'static FlashGate> {
    if let Some(gate) = FLASH_GATE.get() {
        return Ok(gate);
    }
    let config = GateConfig::from_env()?;
    Ok(FLASH_GATE.get_or_probe(|| probe_with(&config)))
}

/// Probe from the environment and fail unless the backend is available.
pub fn init() -> GateResult<&'static FlashGate> {
    init_with_config(GateConfig::from_env()?)
}

/// Probe with `config` and fail unless the backend is available.
///
/// If the gate was already probed, the existing outcome is kept and
/// `config` is ignored.
pub fn init_with_config(config: GateConfig) -> GateResult<&'static FlashGate> {
    if FLASH_GATE.get().is_some() {
        debug!("Flash attention gate already probed; ignoring new configuration");
    }
    let gate = FLASH_GATE.get_or_probe(|| probe_with(&config));
    gate.ensure_available()?;
    Ok(gate)
}

/// Variable-length attention through the process-wide gate.
pub fn attention(request: AttentionRequest<'_, DeviceTensor>) -> GateResult<()> {
    gate()?.attention(request)
}
