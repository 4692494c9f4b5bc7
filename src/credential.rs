//! Credential inputs and their conversion into record payloads.
use std::path::{Path, PathBuf};

use crate::constants::limits::*;
use crate::error::{Error, Result};
use crate::record::CredentialType;

/// Raw credential inputs of one invocation. Empty values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialInputs {
    /// Preshared key as hex text, optionally `0x` prefixed.
    pub psk: Option<String>,
    pub psk_ident: Option<String>,
    pub ca_cert_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
    pub client_private_key_path: Option<PathBuf>,
}

/// A credential ready to be appended to the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub kind: CredentialType,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<'a> {
    /// Used byte for byte.
    Text(&'a str),
    /// Key material, read and normalized.
    KeyFile(&'a Path),
}

pub type Extractor = for<'a> fn(&'a CredentialInputs) -> Option<Source<'a>>;

/// The order credentials are appended in, which is the order the loader
/// hands them to the modem.
pub const APPLICATION_ORDER: [(CredentialType, Extractor); 5] = [
    (CredentialType::Psk, psk_source),
    (CredentialType::PskIdentity, psk_ident_source),
    (CredentialType::RootCa, ca_cert_source),
    (CredentialType::ClientCert, client_cert_source),
    (CredentialType::ClientPrivateKey, client_private_key_source),
];

fn psk_source(inputs: &CredentialInputs) -> Option<Source<'_>> {
    inputs
        .psk
        .as_deref()
        .map(strip_hex_prefix)
        .filter(|s| !s.is_empty())
        .map(Source::Text)
}

fn psk_ident_source(inputs: &CredentialInputs) -> Option<Source<'_>> {
    inputs
        .psk_ident
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(Source::Text)
}

fn key_file(path: &Option<PathBuf>) -> Option<Source<'_>> {
    path.as_deref()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Source::KeyFile)
}

fn ca_cert_source(inputs: &CredentialInputs) -> Option<Source<'_>> {
    key_file(&inputs.ca_cert_path)
}

fn client_cert_source(inputs: &CredentialInputs) -> Option<Source<'_>> {
    key_file(&inputs.client_cert_path)
}

fn client_private_key_source(inputs: &CredentialInputs) -> Option<Source<'_>> {
    key_file(&inputs.client_private_key_path)
}

/// Drops a leading `0x`/`0X`. The rest stays hex text, which is what the
/// modem expects for a PSK.
pub fn strip_hex_prefix(s: &str) -> &str {
    match s.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("0x") => &s[2..],
        _ => s,
    }
}

/// Joins trimmed lines with `<LF>` and enforces the modem's size limit.
pub fn normalize_key_material(text: &str) -> Result<Vec<u8>> {
    let content = text.lines().map(str::trim).collect::<Vec<_>>().join("\n");
    if content.len() > MAX_KEY_MATERIAL_LEN_BYTES {
        return Err(Error::CredentialTooLarge(content.len()));
    }
    Ok(content.into_bytes())
}

pub fn read_key_material<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let p = path.as_ref();
    let text = std::fs::read_to_string(p).map_err(|e| Error::io(p, e))?;
    normalize_key_material(&text)
}

impl CredentialInputs {
    pub fn is_empty(&self) -> bool {
        APPLICATION_ORDER.iter().all(|(_, source)| source(self).is_none())
    }

    /// Resolves every present input, in application order.
    pub fn ingest(&self) -> Result<Vec<Credential>> {
        let mut credentials = vec![];
        for (kind, source) in APPLICATION_ORDER {
            let data = match source(self) {
                None => continue,
                Some(Source::Text(text)) => text.as_bytes().to_vec(),
                Some(Source::KeyFile(path)) => {
                    log::debug!("Reading {} from {}", kind, path.display());
                    read_key_material(path)?
                }
            };
            warn_on_rfc4279_limits(kind, data.len());
            credentials.push(Credential { kind, data });
        }
        Ok(credentials)
    }
}

fn warn_on_rfc4279_limits(kind: CredentialType, len: usize) {
    let max = match kind {
        CredentialType::Psk => MAX_PSK_LEN_BYTES,
        CredentialType::PskIdentity => MAX_PSK_IDENT_LEN_BYTES,
        _ => return,
    };
    if len > max {
        log::warn!("{} is {} bytes, longer than the usual {} byte limit", kind, len, max);
    }
}
