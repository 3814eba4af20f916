//! Accelerator hardware profile and the table of supported architectures.

mod allow_list;

pub use allow_list::{AllowList, ArchRule, MinorConstraint};

use serde::Serialize;
use std::fmt;

/// Compute-capability pair of the active accelerator (`sm_<major><minor>`).
///
/// Read once from the device and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct HardwareProfile {
    pub major: u32,
    pub minor: u32,
}

impl HardwareProfile {
    pub fn new(major: u32, minor: u32) -> Self {
        HardwareProfile { major, minor }
    }

    /// Short architecture tag, e.g. `sm_86`.
    pub fn sm_tag(&self) -> String {
        format!("sm_{}{}", self.major, self.minor)
    }
}

impl fmt::Display for HardwareProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
