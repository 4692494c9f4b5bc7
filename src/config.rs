//! Invocation options and their validation.
use std::path::PathBuf;
use std::time::Duration;

use crate::block::ImageOrigin;
use crate::constants::defaults;
use crate::credential::CredentialInputs;
use crate::error::{Error, Result};

/// Options as given by the caller, nothing checked yet.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Existing hex file to extend instead of the prebuilt loader.
    pub in_file: Option<PathBuf>,
    /// Write the hex file here instead of programming it.
    pub out_file: Option<PathBuf>,
    pub fw_delay: Option<Duration>,
    pub serial_number: Option<u32>,
    pub sec_tag: Option<u32>,
    pub credentials: CredentialInputs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub path: PathBuf,
    pub origin: ImageOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    File(PathBuf),
    Device {
        serial_number: Option<u32>,
        fw_delay: Duration,
    },
}

/// A validated provisioning job.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub image: ImageSource,
    pub output: Output,
    pub sec_tag: u32,
    pub credentials: CredentialInputs,
}

impl Request {
    /// Checks the options. Nothing is read from disk here.
    pub fn validate(self) -> Result<ProvisionConfig> {
        let sec_tag = self
            .sec_tag
            .ok_or_else(|| Error::config("sec_tag is required"))?;
        if self.credentials.is_empty() {
            return Err(Error::config("at least one credential is required"));
        }

        // a zero delay means "not given", as with an absent option
        let fw_delay = self.fw_delay.filter(|d| !d.is_zero());
        let output = match self.out_file {
            Some(_) if self.serial_number.is_some() || fw_delay.is_some() => {
                return Err(Error::config(
                    "out_file is mutually exclusive with delay or serial_number",
                ));
            }
            Some(path) => Output::File(path),
            None => Output::Device {
                serial_number: self.serial_number,
                fw_delay: fw_delay.unwrap_or(defaults::CRED_WRITE_TIME),
            },
        };

        let image = match self.in_file {
            Some(path) => ImageSource {
                path,
                origin: ImageOrigin::Supplied,
            },
            None => ImageSource {
                path: PathBuf::from(defaults::HEX_PATH),
                origin: ImageOrigin::Prebuilt,
            },
        };

        Ok(ProvisionConfig {
            image,
            output,
            sec_tag,
            credentials: self.credentials,
        })
    }
}
