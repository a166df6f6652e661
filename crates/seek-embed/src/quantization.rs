use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EmbedError;

/// Weight precision used when loading the model.
///
/// `Auto` keeps full precision on CPU, where half-precision kernels are slower,
/// and halves weight memory on accelerators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Quantization {
    #[default]
    Auto,
    F32,
    F16,
    Bf16,
}

impl fmt::Display for Quantization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::Bf16 => "bf16",
        })
    }
}

impl FromStr for Quantization {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "none" | "f32" | "fp32" => Ok(Self::F32),
            "f16" | "fp16" | "half" => Ok(Self::F16),
            "bf16" => Ok(Self::Bf16),
            other => Err(EmbedError::ModelLoad(format!(
                "unknown quantization mode: {other}"
            ))),
        }
    }
}

impl TryFrom<String> for Quantization {
    type Error = EmbedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quantization> for String {
    fn from(value: Quantization) -> Self {
        value.to_string()
    }
}

#[cfg(feature = "candle")]
impl Quantization {
    /// Concrete weight dtype for `device`.
    #[must_use]
    pub fn dtype(self, device: &candle_core::Device) -> candle_core::DType {
        use candle_core::DType;
        match self {
            Self::Auto if device.is_cpu() => DType::F32,
            Self::Auto | Self::F16 => DType::F16,
            Self::F32 => DType::F32,
            Self::Bf16 => DType::BF16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_aliases() {
        assert_eq!("none".parse::<Quantization>().unwrap(), Quantization::F32);
        assert_eq!("FP16".parse::<Quantization>().unwrap(), Quantization::F16);
        assert_eq!("bf16".parse::<Quantization>().unwrap(), Quantization::Bf16);
        assert!("int3".parse::<Quantization>().is_err());
    }

    #[cfg(feature = "candle")]
    #[test]
    fn auto_is_full_precision_on_cpu() {
        let dtype = Quantization::Auto.dtype(&candle_core::Device::Cpu);
        assert_eq!(dtype, candle_core::DType::F32);
        assert_eq!(
            Quantization::F16.dtype(&candle_core::Device::Cpu),
            candle_core::DType::F16
        );
    }
}
