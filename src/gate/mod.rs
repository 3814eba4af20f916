//! Backend capability gate
//!
//! This module defines [`CapabilityGate`], which decides once whether the
//! accelerated attention backend can be used and then either delegates
//! `attention` calls to it or fails them with the latched reason.

pub mod config;
#[allow(clippy::module_inception)]
mod gate;
pub mod global;
pub mod types;

pub use config::GateConfig;
pub use gate::{CapabilityGate, GateCell};
pub use global::FlashGate;
pub use types::{
    AttentionRequest, AvailabilityReport, AvailabilityState, HardwareIssue, UnavailableReason,
};
