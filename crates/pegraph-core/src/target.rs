use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Aarch64,
    Riscv64,
}

impl Architecture {
    pub fn host() -> Self {
        if cfg!(target_arch = "aarch64") {
            Architecture::Aarch64
        } else if cfg!(target_arch = "riscv64") {
            Architecture::Riscv64
        } else {
            Architecture::Amd64
        }
    }

}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Architecture::Amd64 => "amd64",
            Architecture::Aarch64 => "aarch64",
            Architecture::Riscv64 => "riscv64",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "amd64" | "x86_64" => Ok(Architecture::Amd64),
            "aarch64" | "arm64" => Ok(Architecture::Aarch64),
            "riscv64" => Ok(Architecture::Riscv64),
            other => Err(format!("unknown architecture: {}", other)),
        }
    }
}

/// Target description handed to the encoder for layout-sensitive encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetDescription {
    #[serde(default = "Architecture::host")]
    pub arch: Architecture,
    #[serde(default)]
    pub big_endian: bool,
}

impl Default for TargetDescription {
    fn default() -> Self {
        Self {
            arch: Architecture::host(),
            big_endian: false,
        }
    }
}
