//! Credential record codec.
//!
//! One record is laid out as
//!
//! ```text
//! [SEC_TAG: u32 LE][CRED_TYPE: u8][CRED_LEN: u16 LE][CRED_DATA: CRED_LEN bytes]
//! ```
use std::fmt;

use anyhow::format_err;
use scroll::{Pread, Pwrite, LE};

use crate::constants::{MAX_RECORD_DATA_LEN, RECORD_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::image::MemoryImage;

/// `nrf_key_mgnt_cred_type_t` on the modem side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum CredentialType {
    RootCa = 0,
    ClientCert = 1,
    ClientPrivateKey = 2,
    Psk = 3,
    PskIdentity = 4,
}

impl CredentialType {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CredentialType {
    type Error = anyhow::Error;

    fn try_from(code: u8) -> anyhow::Result<Self> {
        use CredentialType::*;
        Ok(match code {
            0 => RootCa,
            1 => ClientCert,
            2 => ClientPrivateKey,
            3 => Psk,
            4 => PskIdentity,
            _ => anyhow::bail!("unknown credential type {}", code),
        })
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialType::RootCa => "root CA certificate",
            CredentialType::ClientCert => "client certificate",
            CredentialType::ClientPrivateKey => "client private key",
            CredentialType::Psk => "PSK",
            CredentialType::PskIdentity => "PSK identity",
        };
        f.write_str(name)
    }
}

/// A decoded credential record.
#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    pub tag: u32,
    pub kind: CredentialType,
    pub data: Vec<u8>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Record(tag={}, {:?}, {} bytes)",
            self.tag,
            self.kind,
            self.data.len()
        )
    }
}

/// Bytes a record with `data_len` bytes of payload occupies.
pub const fn encoded_len(data_len: usize) -> u64 {
    RECORD_HEADER_SIZE as u64 + data_len as u64
}

/// Writes one record at `start` and returns the address right after it.
pub fn encode<M: MemoryImage + ?Sized>(
    image: &mut M,
    start: u32,
    tag: u32,
    kind: CredentialType,
    data: &[u8],
) -> Result<u32> {
    if data.len() > MAX_RECORD_DATA_LEN {
        return Err(Error::PayloadOverflow(data.len()));
    }
    let end = start as u64 + encoded_len(data.len());
    if end > u32::MAX as u64 {
        return Err(Error::BlockOverflow {
            end,
            limit: u32::MAX,
        });
    }

    let header = build_header(tag, kind.code(), data.len() as u16).map_err(Error::Image)?;
    log::debug!(
        "record @0x{:05X}: {} + {} bytes",
        start,
        hex::encode(header),
        data.len()
    );

    image.write_bytes(start, &header);
    image.write_bytes(start + RECORD_HEADER_SIZE, data);
    Ok(end as u32)
}

/// Reads the record at `start`, returning it with the address right after it.
pub fn decode<M: MemoryImage + ?Sized>(image: &M, start: u32) -> Result<(Record, u32)> {
    let header = image
        .read_bytes(start, RECORD_HEADER_SIZE as usize)
        .ok_or_else(|| Error::Image(format_err!("no record header at 0x{:05X}", start)))?;
    let (tag, code, len) = parse_header(&header).map_err(Error::Image)?;
    let kind = CredentialType::try_from(code).map_err(Error::Image)?;

    let data_start = start + RECORD_HEADER_SIZE;
    let data = image.read_bytes(data_start, len as usize).ok_or_else(|| {
        Error::Image(format_err!(
            "record at 0x{:05X} is truncated, expected {} bytes",
            start,
            len
        ))
    })?;
    Ok((Record { tag, kind, data }, data_start + len as u32))
}

fn build_header(tag: u32, code: u8, len: u16) -> anyhow::Result<[u8; RECORD_HEADER_SIZE as usize]> {
    let mut buf = [0u8; RECORD_HEADER_SIZE as usize];
    buf.pwrite_with(tag, 0, LE)?;
    buf.pwrite_with(code, 4, LE)?;
    buf.pwrite_with(len, 5, LE)?;
    Ok(buf)
}

fn parse_header(raw: &[u8]) -> anyhow::Result<(u32, u8, u16)> {
    Ok((
        raw.pread_with::<u32>(0, LE)?,
        raw.pread_with::<u8>(4, LE)?,
        raw.pread_with::<u16>(5, LE)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::HexImage;

    #[test]
    fn encodes_little_endian_header_then_data() {
        let mut image = HexImage::new();
        let end = encode(&mut image, 0x100, 0x0101_0001, CredentialType::Psk, b"abc").unwrap();
        assert_eq!(end, 0x100 + 7 + 3);
        assert_eq!(
            image.read_bytes(0x100, 10).unwrap(),
            vec![0x01, 0x00, 0x01, 0x01, 0x03, 0x03, 0x00, b'a', b'b', b'c']
        );
    }

    #[test]
    fn decode_reproduces_encoded_record() {
        let mut image = HexImage::new();
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let end = encode(&mut image, 0x2B009, 42, CredentialType::ClientCert, &data).unwrap();
        let (record, decoded_end) = decode(&image, 0x2B009).unwrap();
        assert_eq!(decoded_end, end);
        assert_eq!(
            record,
            Record {
                tag: 42,
                kind: CredentialType::ClientCert,
                data
            }
        );
    }

    #[test]
    fn empty_payload_is_header_only() {
        let mut image = HexImage::new();
        let end = encode(&mut image, 0, 7, CredentialType::PskIdentity, &[]).unwrap();
        assert_eq!(end, 7);
        let (record, _) = decode(&image, 0).unwrap();
        assert!(record.data.is_empty());
    }

    #[test]
    fn largest_payload_fits_length_field() {
        let mut image = HexImage::new();
        let data = vec![0x5a; MAX_RECORD_DATA_LEN];
        let end = encode(&mut image, 0, 1, CredentialType::RootCa, &data).unwrap();
        assert_eq!(image.read_bytes(5, 2).unwrap(), vec![0xFF, 0xFF]);
        assert_eq!(decode(&image, 0).unwrap().1, end);
    }

    #[test]
    fn oversized_payload_is_rejected_without_writing() {
        let mut image = HexImage::new();
        let data = vec![0; MAX_RECORD_DATA_LEN + 1];
        let err = encode(&mut image, 0, 1, CredentialType::RootCa, &data).unwrap_err();
        assert!(matches!(err, Error::PayloadOverflow(65536)));
        assert!(image.is_empty());
    }

    #[test]
    fn decode_rejects_unknown_type_code() {
        let mut image = HexImage::new();
        image.write_bytes(0, &[0, 0, 0, 0, 9, 0, 0]);
        assert!(matches!(decode(&image, 0), Err(Error::Image(_))));
    }

    #[test]
    fn decode_rejects_truncated_data() {
        let mut image = HexImage::new();
        image.write_bytes(0, &[0, 0, 0, 0, 3, 4, 0, b'a']);
        assert!(matches!(decode(&image, 0), Err(Error::Image(_))));
    }
}
