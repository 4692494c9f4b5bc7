//! Error kinds of a provisioning run, each with its own process exit status.
use std::path::PathBuf;

use thiserror::Error;

pub mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL: u8 = 1;
    /// -4 as seen by the shell
    pub const DEVICE_RESULT: u8 = 252;
    /// -3
    pub const PREBUILT_TOO_LARGE: u8 = 253;
    /// -2
    pub const MAGIC_MISSING: u8 = 254;
    /// -1
    pub const PROBE_SELECTION: u8 = 255;
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or contradictory inputs, detected before any image is touched.
    #[error("{0}")]
    Configuration(String),
    #[error("Prebuilt hex file is too large.")]
    PrebuiltTooLarge,
    #[error("Magic number not found in hex file.")]
    MagicMissing,
    #[error("credential block would end at 0x{end:X}, past the end of flash at 0x{limit:X}")]
    BlockOverflow { end: u64, limit: u32 },
    #[error("credential block already holds {0} records")]
    CountOverflow(u8),
    #[error("credential payload of {0} bytes does not fit the 16-bit length field")]
    PayloadOverflow(usize),
    #[error("Key material is too long ({0} bytes)")]
    CredentialTooLarge(usize),
    #[error("{0}")]
    DeviceSelection(String),
    #[error("Firmware result is 0x{0:X}")]
    DeviceExecution(u32),
    #[error("debug probe: {0:#}")]
    Transport(anyhow::Error),
    #[error("hex image: {0:#}")]
    Image(anyhow::Error),
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit status for this failure kind.
    pub fn exit_code(&self) -> u8 {
        use exit_codes::*;
        match self {
            Error::PrebuiltTooLarge => PREBUILT_TOO_LARGE,
            Error::MagicMissing => MAGIC_MISSING,
            Error::DeviceExecution(_) => DEVICE_RESULT,
            Error::DeviceSelection(_) => PROBE_SELECTION,
            Error::Configuration(_)
            | Error::BlockOverflow { .. }
            | Error::CountOverflow(_)
            | Error::PayloadOverflow(_)
            | Error::CredentialTooLarge(_)
            | Error::Transport(_)
            | Error::Image(_)
            | Error::Io { .. } => GENERAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        let codes = [
            Error::config("x").exit_code(),
            Error::PrebuiltTooLarge.exit_code(),
            Error::MagicMissing.exit_code(),
            Error::DeviceExecution(1).exit_code(),
            Error::DeviceSelection("x".into()).exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, exit_codes::SUCCESS);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn device_execution_message_shows_code_in_hex() {
        assert_eq!(
            Error::DeviceExecution(0x2a).to_string(),
            "Firmware result is 0x2A"
        );
    }
}
