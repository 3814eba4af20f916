//! Accelerator device query
//!
//! The gate only needs one fact from the device: its compute-capability pair.
//! [`DeviceQuery`] is the seam; [`CudaDriver`] answers it through the CUDA
//! driver API loaded at runtime, so the crate builds and runs on machines
//! without CUDA and simply reports no accelerator there.

mod cuda_driver;

pub use cuda_driver::{CudaDriver, DEFAULT_DRIVER_LIBRARIES};

use thiserror::Error;

use crate::capability::HardwareProfile;

/// Errors from querying the accelerator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("driver library not found (tried {tried}): {error}")]
    LibraryNotFound { tried: String, error: String },

    #[error("driver symbol {symbol} missing: {error}")]
    MissingSymbol { symbol: String, error: String },

    #[error("{call} failed with CUDA error {code}")]
    Driver { call: &'static str, code: i32 },

    #[error("no CUDA device present")]
    NoDevice,

    #[error("device ordinal {ordinal} out of range ({count} devices)")]
    OrdinalOutOfRange { ordinal: i32, count: i32 },
}

/// Source of the active accelerator's compute capability.
pub trait DeviceQuery: Send + Sync {
    /// Read the (major, minor) pair; fails when no accelerator is usable.
    fn compute_capability(&self) -> Result<HardwareProfile, DeviceError>;
}

impl<T: DeviceQuery + ?Sized> DeviceQuery for &T {
    fn compute_capability(&self) -> Result<HardwareProfile, DeviceError> {
        (**self).compute_capability()
    }
}

impl<T: DeviceQuery + ?Sized> DeviceQuery for Box<T> {
    fn compute_capability(&self) -> Result<HardwareProfile, DeviceError> {
        (**self).compute_capability()
    }
}
