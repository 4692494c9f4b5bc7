//! Target device profile, with probe and flash parameters
use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Represents a device the loader stub runs on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// nrfjprog device family code
    pub family: u32,
    #[serde(deserialize_with = "parse_address_and_offset")]
    pub flash_size: u32,
    #[serde(default = "default_swd_clock_khz")]
    pub swd_clock_khz: u32,
}

fn default_swd_clock_khz() -> u32 {
    2000
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(family {}, flash {}KiB)",
            self.name,
            self.family,
            self.flash_size / 1024
        )
    }
}

impl Target {
    pub fn builtin() -> Result<Self> {
        Self::parse(include_str!("../targets/nrf91.yaml"))
            .map_err(|e| Error::Configuration(format!("builtin target profile: {:#}", e)))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let raw = std::fs::read_to_string(p).map_err(|e| Error::io(p, e))?;
        Self::parse(&raw)
            .with_context(|| format!("invalid target profile {}", p.display()))
            .map_err(|e| Error::Configuration(format!("{:#}", e)))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let target: Target = serde_yaml::from_str(raw)?;
        log::debug!("Target: {}", target);
        Ok(target)
    }
}

fn parse_address_and_offset<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    parse_size(&s).map_err(serde::de::Error::custom)
}

fn parse_size(s: &str) -> std::result::Result<u32, String> {
    let err = |_| format!("error while parsing {:?}", s);
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(err)
    } else if let Some(k) = s
        .strip_suffix("KiB")
        .or_else(|| s.strip_suffix("KB"))
        .or_else(|| s.strip_suffix("K"))
    {
        k.parse::<u32>()
            .map_err(err)?
            .checked_mul(1024)
            .ok_or_else(|| format!("{:?} is out of range", s))
    } else {
        // parse pure digits here
        s.parse().map_err(err)
    }
}
