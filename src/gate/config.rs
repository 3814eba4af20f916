//! Configuration for the capability gate
//!
//! [`GateConfig`] carries everything the probe consults: the opt-out flag,
//! the architecture allow-list, which device to ask, where the backend
//! library lives and how to word the missing-dependency message.

use tracing::warn;

use crate::backend::{FlashAttentionLoader, DEFAULT_BACKEND_LIBRARIES};
use crate::capability::AllowList;
use crate::device::CudaDriver;
use crate::error::{config_err, GateResult};

/// Opt-out flag; `false` (any case) disables the backend.
pub const OPT_OUT_ENV: &str = "USE_FLASH_ATTENTION";

/// Comma separated allow-list, e.g. `7.5,8.x,9.0`.
pub const ALLOWED_ARCHS_ENV: &str = "FLASHGATE_ALLOWED_ARCHS";

/// Device ordinal to probe.
pub const DEVICE_ENV: &str = "FLASHGATE_DEVICE";

/// Backend library path, tried before the defaults.
pub const BACKEND_LIB_ENV: &str = "FLASHGATE_BACKEND_LIB";

pub const DEFAULT_COMPONENT: &str = "Flash Attention V2";

pub const DEFAULT_REMEDIATION: &str = "Use the official Docker image (ghcr.io/huggingface/text-generation-inference:latest) \
or install flash attention v2 with `cd server && make install install-flash-attention-v2`";

/// Configuration for the capability gate
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Name of the opt-out environment variable
    pub opt_out_var: String,

    /// Value of the opt-out variable as read at construction, if set
    pub opt_out_value: Option<String>,

    /// Accepted compute-capability pairs
    pub allow_list: AllowList,

    /// Device ordinal handed to the device query
    pub device_ordinal: i32,

    /// Backend library candidates, tried in order
    pub backend_libraries: Vec<String>,

    /// Display name of the backend
    pub component: String,

    /// Installation hint shown when the backend cannot be loaded
    pub remediation: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            opt_out_var: OPT_OUT_ENV.to_string(),
            opt_out_value: None,
            allow_list: AllowList::default(),
            device_ordinal: 0,
            backend_libraries: DEFAULT_BACKEND_LIBRARIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            component: DEFAULT_COMPONENT.to_string(),
            remediation: DEFAULT_REMEDIATION.to_string(),
        }
    }
}

impl GateConfig {
    /// Create a new gate config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the process environment.
    pub fn from_env() -> GateResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> GateResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = GateConfig::default();
        config.opt_out_value = lookup(&config.opt_out_var);

        if let Some(archs) = lookup(ALLOWED_ARCHS_ENV) {
            config.allow_list = archs.parse()?;
        }

        if let Some(device) = lookup(DEVICE_ENV) {
            config.device_ordinal = device.trim().parse().map_err(|_| {
                config_err(&format!(
                    "{} must be a device ordinal, got '{}'",
                    DEVICE_ENV, device
                ))
            })?;
            if config.device_ordinal < 0 {
                return Err(config_err(&format!(
                    "{} must not be negative, got {}",
                    DEVICE_ENV, config.device_ordinal
                )));
            }
        }

        if let Some(lib) = lookup(BACKEND_LIB_ENV) {
            if !lib.trim().is_empty() {
                config.backend_libraries.insert(0, lib.trim().to_string());
            }
        }

        Ok(config)
    }

    /// Set the opt-out flag value
    pub fn with_opt_out_value(mut self, value: impl Into<String>) -> Self {
        self.opt_out_value = Some(value.into());
        self
    }

    /// Set the allow-list
    pub fn with_allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Set the device ordinal
    pub fn with_device_ordinal(mut self, device_ordinal: i32) -> Self {
        self.device_ordinal = device_ordinal;
        self
    }

    /// Replace the backend library candidates
    pub fn with_backend_libraries(mut self, backend_libraries: Vec<String>) -> Self {
        self.backend_libraries = backend_libraries;
        self
    }

    /// Set the backend display name
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    /// Set the installation hint
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = remediation.into();
        self
    }

    /// The opt-out value when it disables the backend.
    ///
    /// Only `false` (case-insensitive) disables; `true` or an absent flag
    /// leave the backend enabled. Anything else is logged and ignored.
    pub fn opt_out(&self) -> Option<&str> {
        let value = self.opt_out_value.as_deref()?;
        match value.to_lowercase().as_str() {
            "false" => Some(value),
            "true" => None,
            _ => {
                warn!(
                    "Ignoring unrecognised {}={:?}, expected true or false",
                    self.opt_out_var, value
                );
                None
            }
        }
    }

    /// Device query for the configured ordinal.
    pub fn device(&self) -> CudaDriver {
        CudaDriver::new(self.device_ordinal)
    }

    /// Backend loader for the configured library candidates.
    pub fn loader(&self) -> FlashAttentionLoader {
        FlashAttentionLoader::new(self.component.clone(), self.backend_libraries.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = GateConfig::default();
        assert_eq!(config.opt_out_var, "USE_FLASH_ATTENTION");
        assert!(config.opt_out_value.is_none());
        assert_eq!(config.allow_list.to_string(), "7.5,8.x,9.0");
        assert_eq!(config.device_ordinal, 0);
        assert_eq!(config.component, "Flash Attention V2");
        assert!(config.remediation.contains("make install install-flash-attention-v2"));
        assert!(config.remediation.contains("ghcr.io/huggingface/text-generation-inference"));
    }

    #[test]
    fn test_opt_out_values() {
        for value in ["false", "False", "FALSE", "fAlSe"] {
            let config = GateConfig::new().with_opt_out_value(value);
            assert_eq!(config.opt_out(), Some(value));
        }
        for value in ["true", "TRUE", "1", "", "no"] {
            let config = GateConfig::new().with_opt_out_value(value);
            assert_eq!(config.opt_out(), None, "value {:?}", value);
        }
        assert_eq!(GateConfig::new().opt_out(), None);
    }

    #[test]
    fn test_from_lookup_reads_everything() {
        let config = GateConfig::from_lookup(lookup(&[
            ("USE_FLASH_ATTENTION", "False"),
            ("FLASHGATE_ALLOWED_ARCHS", "8.6+,9.0"),
            ("FLASHGATE_DEVICE", "2"),
            ("FLASHGATE_BACKEND_LIB", "/opt/fa/libflash.so"),
        ]))
        .unwrap();

        assert_eq!(config.opt_out_value.as_deref(), Some("False"));
        assert_eq!(config.allow_list.to_string(), "8.6+,9.0");
        assert_eq!(config.device_ordinal, 2);
        assert_eq!(config.backend_libraries[0], "/opt/fa/libflash.so");
        assert_eq!(config.backend_libraries[1], "libflash_attn_2_cuda.so");
    }

    #[test]
    fn test_from_lookup_empty_is_default() {
        let config = GateConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.allow_list, AllowList::default());
        assert_eq!(config.backend_libraries, vec!["libflash_attn_2_cuda.so".to_string()]);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert!(GateConfig::from_lookup(lookup(&[("FLASHGATE_DEVICE", "gpu0")])).is_err());
        assert!(GateConfig::from_lookup(lookup(&[("FLASHGATE_DEVICE", "-1")])).is_err());
        assert!(GateConfig::from_lookup(lookup(&[("FLASHGATE_ALLOWED_ARCHS", "sm_86")])).is_err());
    }

    #[test]
    fn test_loader_and_device_follow_config() {
        let config = GateConfig::new()
            .with_device_ordinal(1)
            .with_component("FA2")
            .with_backend_libraries(vec!["a.so".to_string(), "b.so".to_string()]);

        assert_eq!(config.device().ordinal(), 1);
        let loader = config.loader();
        assert_eq!(loader.libraries(), &["a.so".to_string(), "b.so".to_string()]);
    }
}
