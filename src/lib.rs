//! nRF91 credential provisioning via a disposable hex image.

pub mod block;
pub mod config;
pub mod constants;
pub mod credential;
pub mod error;
pub mod image;
pub mod programmer;
pub mod record;
pub mod session;
pub mod target;

pub use self::block::{CredentialBlock, ImageOrigin};
pub use self::config::{ProvisionConfig, Request};
pub use self::error::{Error, Result};
pub use self::image::{HexImage, MemoryImage};
pub use self::programmer::{NrfjprogDll, Programmer};
pub use self::record::CredentialType;
pub use self::target::Target;
