//! Unified error handling for flashgate
//!
//! Capability errors come in two flavours:
//! - initialization errors (`ConfigDisabled`, `UnsupportedHardware`,
//!   `MissingDependency`) returned when a caller asks the gate to fail fast
//! - `BackendUnavailable`, returned by every `attention` call on a gate whose
//!   probe did not end in `available`; it wraps the reason latched at probe time
//!
//! None of them is retryable: the outcome only changes when the environment,
//! the hardware or the installation changes and the process restarts.

use std::fmt;

use crate::backend::BackendError;
use crate::gate::{HardwareIssue, UnavailableReason};

/// Unified error type for flashgate
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    // ========== Capability Errors ==========
    /// User opted out through the environment flag
    #[error("`{flag}` is {value}")]
    ConfigDisabled { flag: String, value: String },

    /// No usable accelerator, or one outside the allow-list
    #[error("{0}")]
    UnsupportedHardware(HardwareIssue),

    /// Accelerated backend could not be loaded
    #[error("{component} is not installed.\nError message: {error}\n{remediation}")]
    MissingDependency {
        component: String,
        error: String,
        remediation: String,
    },

    /// `attention` called on a gate whose probe did not succeed
    #[error("flash attention backend unavailable: {0}")]
    BackendUnavailable(UnavailableReason),

    // ========== Backend Errors ==========
    /// The backend primitive itself reported a failure
    #[error("attention kernel failed: {0}")]
    KernelFailed(#[from] BackendError),

    // ========== Configuration Errors ==========
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ========== Collaborator Errors ==========
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GateError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            GateError::ConfigDisabled { .. } | GateError::InvalidConfiguration(_) => {
                ErrorCategory::Configuration
            }
            GateError::UnsupportedHardware(_) => ErrorCategory::Hardware,
            GateError::MissingDependency { .. } => ErrorCategory::Installation,
            GateError::BackendUnavailable(reason) => reason.category(),
            GateError::KernelFailed(_) => ErrorCategory::Backend,
            GateError::Tokenizer(_) | GateError::Generation(_) => ErrorCategory::External,
            GateError::IoError(_) => ErrorCategory::Io,
        }
    }

    /// What the operator has to change for the error to go away, if anything.
    ///
    /// An explicit opt-out needs no remediation.
    pub fn remediation(&self) -> Option<String> {
        match self {
            GateError::BackendUnavailable(reason) => reason.remediation(),
            GateError::UnsupportedHardware(issue) => Some(issue.remediation().to_string()),
            GateError::MissingDependency { remediation, .. } => Some(remediation.clone()),
            _ => None,
        }
    }

    /// Only collaborator and I/O failures may succeed on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::External | ErrorCategory::Io
        )
    }

    /// The latched probe reason behind a capability error, if this is one.
    pub fn unavailable_reason(&self) -> Option<UnavailableReason> {
        match self {
            GateError::BackendUnavailable(reason) => Some(reason.clone()),
            GateError::ConfigDisabled { flag, value } => Some(UnavailableReason::ConfigDisabled {
                flag: flag.clone(),
                value: value.clone(),
            }),
            GateError::UnsupportedHardware(issue) => {
                Some(UnavailableReason::UnsupportedHardware(issue.clone()))
            }
            GateError::MissingDependency {
                component,
                error,
                remediation,
            } => Some(UnavailableReason::MissingDependency {
                component: component.clone(),
                error: error.clone(),
                remediation: remediation.clone(),
            }),
            _ => None,
        }
    }
}

impl From<UnavailableReason> for GateError {
    /// Initialization-time error for a latched reason.
    fn from(reason: UnavailableReason) -> Self {
        match reason {
            UnavailableReason::ConfigDisabled { flag, value } => {
                GateError::ConfigDisabled { flag, value }
            }
            UnavailableReason::UnsupportedHardware(issue) => GateError::UnsupportedHardware(issue),
            UnavailableReason::MissingDependency {
                component,
                error,
                remediation,
            } => GateError::MissingDependency {
                component,
                error,
                remediation,
            },
        }
    }
}

/// Error category for handling decisions
///
/// - Configuration: the operator asked for this, or gave bad settings
/// - Hardware: wrong or missing accelerator, fixed by moving hardware
/// - Installation: backend missing, fixed by installing it
/// - Backend: the kernel itself failed
/// - External: tokenizer hub or generation server
/// - Io: filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Hardware,
    Installation,
    Backend,
    External,
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "Configuration"),
            ErrorCategory::Hardware => write!(f, "Hardware"),
            ErrorCategory::Installation => write!(f, "Installation"),
            ErrorCategory::Backend => write!(f, "Backend"),
            ErrorCategory::External => write!(f, "External"),
            ErrorCategory::Io => write!(f, "Io"),
        }
    }
}

/// Helper type alias for Results using GateError
pub type GateResult<T> = std::result::Result<T, GateError>;

/// Build a configuration error
///
/// # Examples
/// ```ignore
/// let ordinal = raw.parse().map_err(|_| config_err("FLASHGATE_DEVICE must be an integer"))?;
/// ```
pub fn config_err(msg: &str) -> GateError {
    GateError::InvalidConfiguration(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::HardwareProfile;

    fn kernel(message: &str) -> BackendError {
        BackendError::Kernel {
            code: 2,
            message: message.to_string(),
        }
    }

    fn missing() -> UnavailableReason {
        UnavailableReason::MissingDependency {
            component: "Flash Attention V2".to_string(),
            error: "libflash_attn_2_cuda.so: cannot open shared object file".to_string(),
            remediation: "install it".to_string(),
        }
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            GateError::ConfigDisabled {
                flag: "USE_FLASH_ATTENTION".to_string(),
                value: "false".to_string()
            }
            .category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            GateError::UnsupportedHardware(HardwareIssue::Capability {
                profile: HardwareProfile::new(6, 1),
                allowed: "7.5,8.x,9.0".to_string(),
            })
            .category(),
            ErrorCategory::Hardware
        );
        assert_eq!(
            GateError::from(missing()).category(),
            ErrorCategory::Installation
        );
        assert_eq!(
            GateError::BackendUnavailable(missing()).category(),
            ErrorCategory::Installation
        );
        assert_eq!(
            GateError::KernelFailed(kernel("boom")).category(),
            ErrorCategory::Backend
        );
    }

    #[test]
    fn test_capability_errors_not_retryable() {
        assert!(!GateError::BackendUnavailable(missing()).is_retryable());
        assert!(!GateError::from(missing()).is_retryable());
        assert!(!GateError::KernelFailed(kernel("x")).is_retryable());
        assert!(GateError::Generation("timeout".to_string()).is_retryable());
    }

    #[test]
    fn test_missing_dependency_message() {
        let err = GateError::from(missing());
        let msg = err.to_string();
        assert!(msg.contains("Flash Attention V2 is not installed"));
        assert!(msg.contains("cannot open shared object file"));
        assert!(msg.contains("install it"));
        assert_eq!(err.remediation().as_deref(), Some("install it"));
    }

    #[test]
    fn test_config_disabled_has_no_remediation() {
        let err = GateError::ConfigDisabled {
            flag: "USE_FLASH_ATTENTION".to_string(),
            value: "false".to_string(),
        };
        assert_eq!(err.to_string(), "`USE_FLASH_ATTENTION` is false");
        assert!(err.remediation().is_none());
    }

    #[test]
    fn test_unavailable_reason_round_trip() {
        let reason = missing();
        let err = GateError::from(reason.clone());
        assert_eq!(err.unavailable_reason(), Some(reason.clone()));
        assert_eq!(
            GateError::BackendUnavailable(reason.clone()).unavailable_reason(),
            Some(reason)
        );
        assert!(GateError::KernelFailed(kernel("x"))
            .unavailable_reason()
            .is_none());
    }

    #[test]
    fn test_kernel_failure_keeps_backend_error() {
        let err = GateError::from(kernel("out of memory"));
        match &err {
            GateError::KernelFailed(BackendError::Kernel { code, message }) => {
                assert_eq!(*code, 2);
                assert_eq!(message, "out of memory");
            }
            other => panic!("expected KernelFailed, got {:?}", other),
        }
        assert_eq!(
            err.to_string(),
            "attention kernel failed: kernel returned error code 2: out of memory"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GateError = io_err.into();
        assert!(matches!(err, GateError::IoError(_)));
        assert_eq!(err.category(), ErrorCategory::Io);
    }

    #[test]
    fn test_config_err_helper() {
        let err = config_err("bad ordinal");
        assert!(matches!(err, GateError::InvalidConfiguration(_)));
        assert_eq!(err.to_string(), "Invalid configuration: bad ordinal");
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Configuration.to_string(), "Configuration");
        assert_eq!(ErrorCategory::Installation.to_string(), "Installation");
        assert_eq!(ErrorCategory::External.to_string(), "External");
    }
}
