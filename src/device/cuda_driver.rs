//! CUDA driver API, loaded at runtime
//!
//! Only the four entry points needed to read a device's compute capability
//! are resolved. Nothing is linked at build time.

use std::ffi::{c_int, c_uint};

use libloading::{Library, Symbol};
use tracing::debug;

use super::{DeviceError, DeviceQuery};
use crate::capability::HardwareProfile;

/// Library names tried in order.
pub const DEFAULT_DRIVER_LIBRARIES: &[&str] = &["libcuda.so.1", "libcuda.so", "nvcuda.dll"];

const CUDA_SUCCESS: c_int = 0;
const CUDA_ERROR_NO_DEVICE: c_int = 100;

// CUdevice_attribute values from cuda.h
const CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR: c_int = 75;
const CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR: c_int = 76;

type CuInitFn = unsafe extern "C" fn(c_uint) -> c_int;
type CuDeviceGetCountFn = unsafe extern "C" fn(*mut c_int) -> c_int;
type CuDeviceGetFn = unsafe extern "C" fn(*mut c_int, c_int) -> c_int;
type CuDeviceGetAttributeFn = unsafe extern "C" fn(*mut c_int, c_int, c_int) -> c_int;

/// Device query backed by the CUDA driver.
#[derive(Debug, Clone)]
pub struct CudaDriver {
    libraries: Vec<String>,
    ordinal: i32,
}

impl Default for CudaDriver {
    fn default() -> Self {
        CudaDriver::new(0)
    }
}

impl CudaDriver {
    pub fn new(ordinal: i32) -> Self {
        CudaDriver {
            libraries: DEFAULT_DRIVER_LIBRARIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ordinal,
        }
    }

    /// Replace the driver library candidates.
    pub fn with_libraries(mut self, libraries: Vec<String>) -> Self {
        self.libraries = libraries;
        self
    }

    pub fn ordinal(&self) -> i32 {
        self.ordinal
    }

    fn open_library(&self) -> Result<Library, DeviceError> {
        let mut last_error = String::from("no candidate libraries configured");
        for name in &self.libraries {
            // SAFETY: loading the vendor driver runs its initializers, which
            // have no preconditions on our side.
            match unsafe { Library::new(name) } {
                Ok(lib) => {
                    debug!("Loaded CUDA driver from {}", name);
                    return Ok(lib);
                }
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(DeviceError::LibraryNotFound {
            tried: self.libraries.join(", "),
            error: last_error,
        })
    }
}

fn symbol<'lib, T>(lib: &'lib Library, name: &'static str) -> Result<Symbol<'lib, T>, DeviceError> {
    let mut bytes = Vec::with_capacity(name.len() + 1);
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0);
    // SAFETY: the caller picks `T` to match the documented driver signature.
    unsafe { lib.get::<T>(&bytes) }.map_err(|e| DeviceError::MissingSymbol {
        symbol: name.to_string(),
        error: e.to_string(),
    })
}

fn check(call: &'static str, code: c_int) -> Result<(), DeviceError> {
    match code {
        CUDA_SUCCESS => Ok(()),
        CUDA_ERROR_NO_DEVICE => Err(DeviceError::NoDevice),
        code => Err(DeviceError::Driver { call, code }),
    }
}

impl DeviceQuery for CudaDriver {
    fn compute_capability(&self) -> Result<HardwareProfile, DeviceError> {
        let lib = self.open_library()?;

        let cu_init = symbol::<CuInitFn>(&lib, "cuInit")?;
        let cu_device_get_count = symbol::<CuDeviceGetCountFn>(&lib, "cuDeviceGetCount")?;
        let cu_device_get = symbol::<CuDeviceGetFn>(&lib, "cuDeviceGet")?;
        let cu_device_get_attribute =
            symbol::<CuDeviceGetAttributeFn>(&lib, "cuDeviceGetAttribute")?;

        // SAFETY: signatures match cuda.h and every out-pointer references a
        // live stack slot for the duration of the call.
        unsafe {
            check("cuInit", cu_init(0))?;

            let mut count: c_int = 0;
            check("cuDeviceGetCount", cu_device_get_count(&mut count))?;
            if count == 0 {
                return Err(DeviceError::NoDevice);
            }
            if self.ordinal < 0 || self.ordinal >= count {
                return Err(DeviceError::OrdinalOutOfRange {
                    ordinal: self.ordinal,
                    count,
                });
            }

            let mut device: c_int = 0;
            check("cuDeviceGet", cu_device_get(&mut device, self.ordinal))?;

            let mut major: c_int = 0;
            let mut minor: c_int = 0;
            check(
                "cuDeviceGetAttribute",
                cu_device_get_attribute(
                    &mut major,
                    CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR,
                    device,
                ),
            )?;
            check(
                "cuDeviceGetAttribute",
                cu_device_get_attribute(
                    &mut minor,
                    CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR,
                    device,
                ),
            )?;

            debug!(
                "CUDA device {} reports compute capability {}.{}",
                self.ordinal, major, minor
            );
            Ok(HardwareProfile::new(major.max(0) as u32, minor.max(0) as u32))
        }
    }
}
