//! Compute device selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EmbedError;

/// Requested execution device.
///
/// Parsed from `auto`, `cpu`, `cuda`, `cuda:N`, `metal` or `metal:N`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceSpec {
    /// First available accelerator, otherwise CPU.
    #[default]
    Auto,
    Cpu,
    Cuda(usize),
    Metal(usize),
}

impl DeviceSpec {
    #[must_use]
    pub fn is_explicit(self) -> bool {
        !matches!(self, Self::Auto)
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(0) => f.write_str("cuda"),
            Self::Cuda(n) => write!(f, "cuda:{n}"),
            Self::Metal(0) => f.write_str("metal"),
            Self::Metal(n) => write!(f, "metal:{n}"),
        }
    }
}

impl FromStr for DeviceSpec {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (kind, ordinal) = match s.split_once(':') {
            Some((kind, n)) => {
                let n = n
                    .parse::<usize>()
                    .map_err(|_| EmbedError::InvalidDevice(s.clone()))?;
                (kind, Some(n))
            }
            None => (s.as_str(), None),
        };
        match (kind, ordinal) {
            ("auto", None) => Ok(Self::Auto),
            ("cpu", None) => Ok(Self::Cpu),
            ("cuda" | "gpu", n) => Ok(Self::Cuda(n.unwrap_or(0))),
            ("metal", n) => Ok(Self::Metal(n.unwrap_or(0))),
            _ => Err(EmbedError::InvalidDevice(s.clone())),
        }
    }
}

impl TryFrom<String> for DeviceSpec {
    type Error = EmbedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceSpec> for String {
    fn from(value: DeviceSpec) -> Self {
        value.to_string()
    }
}

/// Resolve a [`DeviceSpec`] into a concrete candle device.
///
/// Priority is explicit device, then the first detected accelerator, then CPU.
///
/// # Errors
///
/// Returns [`EmbedError::DeviceUnavailable`] when an explicitly requested
/// accelerator cannot be opened. `Auto` never fails.
#[cfg(feature = "candle")]
pub fn resolve_device(spec: DeviceSpec) -> Result<candle_core::Device, EmbedError> {
    use candle_core::Device;
    use candle_core::utils::{cuda_is_available, metal_is_available};

    match spec {
        DeviceSpec::Cpu => Ok(Device::Cpu),
        DeviceSpec::Cuda(ordinal) => {
            if !cuda_is_available() {
                return Err(EmbedError::DeviceUnavailable {
                    device: spec.to_string(),
                    reason: "binary built without CUDA support or no CUDA runtime found".into(),
                });
            }
            Device::new_cuda(ordinal).map_err(|e| EmbedError::DeviceUnavailable {
                device: spec.to_string(),
                reason: e.to_string(),
            })
        }
        DeviceSpec::Metal(ordinal) => {
            if !metal_is_available() {
                return Err(EmbedError::DeviceUnavailable {
                    device: spec.to_string(),
                    reason: "binary built without Metal support".into(),
                });
            }
            Device::new_metal(ordinal).map_err(|e| EmbedError::DeviceUnavailable {
                device: spec.to_string(),
                reason: e.to_string(),
            })
        }
        DeviceSpec::Auto => {
            if cuda_is_available() {
                match Device::new_cuda(0) {
                    Ok(device) => return Ok(device),
                    Err(e) => tracing::warn!("CUDA detected but unusable, trying next: {e}"),
                }
            }
            if metal_is_available() {
                match Device::new_metal(0) {
                    Ok(device) => return Ok(device),
                    Err(e) => tracing::warn!("Metal detected but unusable, using CPU: {e}"),
                }
            }
            Ok(Device::Cpu)
        }
    }
}

#[cfg(feature = "candle")]
#[must_use]
pub fn device_name(device: &candle_core::Device) -> &'static str {
    match device {
        candle_core::Device::Cpu => "cpu",
        candle_core::Device::Cuda(_) => "cuda",
        candle_core::Device::Metal(_) => "metal",
    }
}
