//! Gate state and request types

use serde::Serialize;
use std::fmt;

use crate::capability::HardwareProfile;
use crate::error::ErrorCategory;

/// Terminal state reached by the capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AvailabilityState {
    DisabledByConfig,
    UnsupportedHardware,
    MissingDependency,
    Available,
}

impl fmt::Display for AvailabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AvailabilityState::DisabledByConfig => "disabled-by-config",
            AvailabilityState::UnsupportedHardware => "unsupported-hardware",
            AvailabilityState::MissingDependency => "missing-dependency",
            AvailabilityState::Available => "available",
        };
        f.write_str(name)
    }
}

/// Why the accelerator cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareIssue {
    /// The device query failed: no driver, no device, or a driver error.
    NoAccelerator { detail: String },
    /// The device answered with a pair outside the allow-list.
    Capability {
        profile: HardwareProfile,
        allowed: String,
    },
}

impl HardwareIssue {
    pub fn remediation(&self) -> &'static str {
        match self {
            HardwareIssue::NoAccelerator { .. } => {
                "run on a host where a CUDA device and driver are visible to this process"
            }
            HardwareIssue::Capability { .. } => {
                "run on an accelerator listed in FLASHGATE_ALLOWED_ARCHS, or extend that list if the backend was built for this architecture"
            }
        }
    }
}

impl fmt::Display for HardwareIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareIssue::NoAccelerator { detail } => {
                write!(f, "CUDA is not available: {}", detail)
            }
            HardwareIssue::Capability { profile, allowed } => write!(
                f,
                "GPU with CUDA capability {} {} is not supported (allowed: {})",
                profile.major, profile.minor, allowed
            ),
        }
    }
}

/// Reason latched by the probe when the backend cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    ConfigDisabled {
        flag: String,
        value: String,
    },
    UnsupportedHardware(HardwareIssue),
    MissingDependency {
        component: String,
        error: String,
        remediation: String,
    },
}

impl UnavailableReason {
    pub fn state(&self) -> AvailabilityState {
        match self {
            UnavailableReason::ConfigDisabled { .. } => AvailabilityState::DisabledByConfig,
            UnavailableReason::UnsupportedHardware(_) => AvailabilityState::UnsupportedHardware,
            UnavailableReason::MissingDependency { .. } => AvailabilityState::MissingDependency,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            UnavailableReason::ConfigDisabled { .. } => ErrorCategory::Configuration,
            UnavailableReason::UnsupportedHardware(_) => ErrorCategory::Hardware,
            UnavailableReason::MissingDependency { .. } => ErrorCategory::Installation,
        }
    }

    pub fn remediation(&self) -> Option<String> {
        match self {
            UnavailableReason::ConfigDisabled { .. } => None,
            UnavailableReason::UnsupportedHardware(issue) => Some(issue.remediation().to_string()),
            UnavailableReason::MissingDependency { remediation, .. } => Some(remediation.clone()),
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::ConfigDisabled { flag, value } => {
                write!(f, "disabled by `{}={}`", flag, value)
            }
            UnavailableReason::UnsupportedHardware(issue) => write!(f, "{}", issue),
            UnavailableReason::MissingDependency {
                component, error, ..
            } => write!(f, "{} is not installed: {}", component, error),
        }
    }
}

/// One variable-length attention call.
///
/// All tensors stay owned by the caller; the gate only borrows them for the
/// duration of the call. Shapes are not validated here.
#[derive(Debug)]
pub struct AttentionRequest<'a, T> {
    pub q: &'a T,
    pub k: &'a T,
    pub v: &'a T,
    pub out: &'a mut T,
    /// Offsets of each sequence in the flattened batch, shared by q and k/v.
    pub cu_seqlens: &'a T,
    pub max_s: usize,
    pub softmax_scale: f32,
}

/// Serializable summary of a probed gate.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityReport {
    pub state: AvailabilityState,
    pub hardware: Option<HardwareProfile>,
    pub reason: Option<String>,
    pub remediation: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(AvailabilityState::DisabledByConfig.to_string(), "disabled-by-config");
        assert_eq!(AvailabilityState::Available.to_string(), "available");
        assert_eq!(
            serde_json::to_string(&AvailabilityState::MissingDependency).unwrap(),
            "\"missing-dependency\""
        );
    }

    #[test]
    fn test_capability_issue_message() {
        let issue = HardwareIssue::Capability {
            profile: HardwareProfile::new(6, 1),
            allowed: "7.5,8.x,9.0".to_string(),
        };
        assert_eq!(
            issue.to_string(),
            "GPU with CUDA capability 6 1 is not supported (allowed: 7.5,8.x,9.0)"
        );
    }

    #[test]
    fn test_reason_state_mapping() {
        let reason = UnavailableReason::UnsupportedHardware(HardwareIssue::NoAccelerator {
            detail: "no CUDA device present".to_string(),
        });
        assert_eq!(reason.state(), AvailabilityState::UnsupportedHardware);
        assert_eq!(reason.category(), ErrorCategory::Hardware);
        assert!(reason.remediation().is_some());

        let reason = UnavailableReason::ConfigDisabled {
            flag: "USE_FLASH_ATTENTION".to_string(),
            value: "False".to_string(),
        };
        assert_eq!(reason.state(), AvailabilityState::DisabledByConfig);
        assert_eq!(reason.to_string(), "disabled by `USE_FLASH_ATTENTION=False`");
        assert!(reason.remediation().is_none());
    }
}
