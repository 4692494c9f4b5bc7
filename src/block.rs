//! Credential block at `CRED_PAGE_ADDR`.
//!
//! ```text
//! [MAGIC_NUMBER (4 bytes)][FW_RESULT_CODE (4 bytes)][CRED_COUNT (1 byte)]
//!     [record]...[record]
//! ```
//!
//! The result code is left unwritten; erased flash reads back as
//! `BLANK_FW_RESULT_CODE` until the loader stores its status there.
use anyhow::format_err;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::image::MemoryImage;
use crate::record::{self, CredentialType};

/// Where the image under construction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    /// The bundled loader build, which must end before the block.
    Prebuilt,
    /// A file given by the caller, possibly already carrying a block.
    Supplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Nothing written at or above the block start.
    Fresh,
    /// Magic number present, records may follow.
    Existing,
}

/// Decides whether `image` can take a credential block. Never mutates it.
pub fn classify<M: MemoryImage + ?Sized>(image: &M, origin: ImageOrigin) -> Result<BlockState> {
    let max = match image.max_address() {
        Some(max) if max >= CRED_PAGE_ADDR => max,
        _ => return Ok(BlockState::Fresh),
    };
    if origin == ImageOrigin::Prebuilt {
        return Err(Error::PrebuiltTooLarge);
    }
    if max < FW_RESULT_CODE_ADDR
        || image.read_bytes(CRED_PAGE_ADDR, MAGIC_NUMBER_BYTES.len())
            != Some(MAGIC_NUMBER_BYTES.to_vec())
    {
        return Err(Error::MagicMissing);
    }
    Ok(BlockState::Existing)
}

/// An initialized credential block inside a memory image.
pub struct CredentialBlock<'a, M: MemoryImage + ?Sized> {
    image: &'a mut M,
    /// Exclusive end of usable flash.
    limit: u32,
}

impl<'a, M: MemoryImage + ?Sized> CredentialBlock<'a, M> {
    /// Validates an existing block or writes a fresh one.
    pub fn open(image: &'a mut M, origin: ImageOrigin, limit: u32) -> Result<Self> {
        match classify(image, origin)? {
            BlockState::Fresh => {
                image.write_bytes(CRED_PAGE_ADDR, &MAGIC_NUMBER_BYTES);
                image.write_bytes(CRED_COUNT_ADDR, &[0]);
                log::debug!("Initialized credential block at 0x{:05X}", CRED_PAGE_ADDR);
            }
            BlockState::Existing => {
                log::info!(
                    "Extending existing credential block at 0x{:05X}",
                    CRED_PAGE_ADDR
                );
            }
        }
        let block = CredentialBlock { image, limit };
        log::debug!("Existing records: {}", block.count()?);
        Ok(block)
    }

    pub fn count(&self) -> Result<u8> {
        self.image.read_u8(CRED_COUNT_ADDR).ok_or_else(|| {
            Error::Image(format_err!(
                "credential count missing at 0x{:05X}",
                CRED_COUNT_ADDR
            ))
        })
    }

    /// Address the next appended record starts at.
    pub fn next_record_addr(&self) -> Result<u32> {
        // open() guarantees at least the count byte is present
        let Some(max) = self.image.max_address() else {
            return Ok(FIRST_CRED_ADDR);
        };
        max.checked_add(1).ok_or(Error::BlockOverflow {
            end: max as u64 + 1,
            limit: self.limit,
        })
    }

    /// Appends one record and bumps the count. Returns the record's start address.
    pub fn append(&mut self, tag: u32, kind: CredentialType, data: &[u8]) -> Result<u32> {
        let count = self.count()?;
        if count == MAX_RECORD_COUNT {
            return Err(Error::CountOverflow(count));
        }
        let start = self.next_record_addr()?;
        let end = start as u64 + record::encoded_len(data.len());
        if start < FIRST_CRED_ADDR || start >= self.limit || end > self.limit as u64 {
            return Err(Error::BlockOverflow {
                end,
                limit: self.limit,
            });
        }

        record::encode(&mut *self.image, start, tag, kind, data)?;
        self.image.write_bytes(CRED_COUNT_ADDR, &[count + 1]);
        log::info!(
            "Added {} ({} bytes) with sec_tag {} at 0x{:05X}",
            kind,
            data.len(),
            tag,
            start
        );
        Ok(start)
    }

    /// Block header as a hex dump, for debug logging.
    pub fn header_dump(&self) -> String {
        let len = (FIRST_CRED_ADDR - CRED_PAGE_ADDR) as usize;
        let raw: Vec<u8> = (0..len as u32)
            .map(|i| self.image.read_u8(CRED_PAGE_ADDR + i).unwrap_or(0xFF))
            .collect();
        let mut out = Vec::new();
        if hxdmp::hexdump(&raw, &mut out).is_ok() {
            String::from_utf8_lossy(&out).into_owned()
        } else {
            hex::encode(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::HexImage;
    use crate::record::decode;

    const FLASH_END: u32 = 0x10_0000;

    fn open_supplied(image: &mut HexImage) -> CredentialBlock<'_, HexImage> {
        CredentialBlock::open(image, ImageOrigin::Supplied, FLASH_END).unwrap()
    }

    fn loader_stub() -> HexImage {
        let mut image = HexImage::new();
        image.write_bytes(0x0, &[0x00, 0x10, 0x00, 0x20, 0x51, 0x02, 0x00, 0x00]);
        image.write_bytes(0x2A000, &[0xEE; 32]);
        image
    }

    #[test]
    fn fresh_image_gets_magic_and_zero_count() {
        let mut image = loader_stub();
        let block =
            CredentialBlock::open(&mut image, ImageOrigin::Prebuilt, FLASH_END).unwrap();
        assert_eq!(block.count().unwrap(), 0);
        assert_eq!(block.next_record_addr().unwrap(), CRED_PAGE_ADDR + 9);
        assert_eq!(
            image.read_bytes(CRED_PAGE_ADDR, 4).unwrap(),
            vec![0x1A, 0xAD, 0x5C, 0xCA]
        );
        assert_eq!(image.read_u8(CRED_PAGE_ADDR + 8), Some(0));
        // result code stays blank flash
        assert_eq!(image.read_bytes(FW_RESULT_CODE_ADDR, 4), None);
    }

    #[test]
    fn empty_image_is_fresh() {
        let image = HexImage::new();
        assert_eq!(
            classify(&image, ImageOrigin::Supplied).unwrap(),
            BlockState::Fresh
        );
    }

    #[test]
    fn appends_are_contiguous_and_counted() {
        let mut image = HexImage::new();
        let mut block = open_supplied(&mut image);
        let payloads: [&[u8]; 3] = [b"deadbeef", b"identity", &[0u8; 300]];
        let mut starts = vec![];
        for (i, data) in payloads.iter().enumerate() {
            starts.push(block.append(100 + i as u32, CredentialType::Psk, data).unwrap());
        }
        assert_eq!(block.count().unwrap(), 3);
        assert_eq!(starts[0], CRED_PAGE_ADDR + 9);

        let mut addr = starts[0];
        for (i, data) in payloads.iter().enumerate() {
            assert_eq!(addr, starts[i]);
            let (record, end) = decode(&image, addr).unwrap();
            assert_eq!(record.tag, 100 + i as u32);
            assert_eq!(record.data, *data);
            addr = end;
        }
        assert_eq!(image.max_address(), Some(addr - 1));
    }

    #[test]
    fn existing_block_is_extended_without_rewrite() {
        let mut image = HexImage::new();
        {
            let mut block = open_supplied(&mut image);
            block.append(1, CredentialType::RootCa, b"ca").unwrap();
        }
        // the loader may already have reported a result in a read-back image
        image.write_bytes(FW_RESULT_CODE_ADDR, &[0; 4]);
        let before = image.clone();

        assert_eq!(
            classify(&image, ImageOrigin::Supplied).unwrap(),
            BlockState::Existing
        );
        let mut block = open_supplied(&mut image);
        assert_eq!(block.count().unwrap(), 1);
        let start = block.append(1, CredentialType::ClientCert, b"cert").unwrap();
        assert_eq!(start, CRED_PAGE_ADDR + 9 + 7 + 2);
        assert_eq!(block.count().unwrap(), 2);
        assert_eq!(
            image.read_bytes(CRED_PAGE_ADDR, 8),
            before.read_bytes(CRED_PAGE_ADDR, 8)
        );
    }

    #[test]
    fn supplied_image_without_magic_is_rejected_untouched() {
        let mut image = loader_stub();
        image.write_bytes(CRED_PAGE_ADDR, &[0xFF; 16]);
        let before = image.clone();
        let err = CredentialBlock::open(&mut image, ImageOrigin::Supplied, FLASH_END)
            .err()
            .unwrap();
        assert!(matches!(err, Error::MagicMissing));
        assert_eq!(image, before);
    }

    #[test]
    fn supplied_image_ending_inside_magic_is_rejected() {
        let mut image = HexImage::new();
        image.write_bytes(CRED_PAGE_ADDR, &MAGIC_NUMBER_BYTES[..3]);
        assert!(matches!(
            classify(&image, ImageOrigin::Supplied),
            Err(Error::MagicMissing)
        ));
    }

    #[test]
    fn prebuilt_image_reaching_block_is_too_large() {
        let mut image = loader_stub();
        image.write_bytes(CRED_PAGE_ADDR, &MAGIC_NUMBER_BYTES);
        image.write_bytes(CRED_COUNT_ADDR, &[0]);
        let before = image.clone();
        let err = CredentialBlock::open(&mut image, ImageOrigin::Prebuilt, FLASH_END)
            .err()
            .unwrap();
        assert!(matches!(err, Error::PrebuiltTooLarge));
        assert_eq!(err.exit_code(), crate::error::exit_codes::PREBUILT_TOO_LARGE);
        assert_eq!(image, before);
    }

    #[test]
    fn record_past_flash_end_is_rejected_before_writing() {
        let mut image = HexImage::new();
        let limit = FIRST_CRED_ADDR + 7 + 4;
        let mut block = CredentialBlock::open(&mut image, ImageOrigin::Supplied, limit).unwrap();
        block.append(1, CredentialType::Psk, b"abcd").unwrap();
        let err = block.append(1, CredentialType::Psk, b"").unwrap_err();
        assert!(matches!(err, Error::BlockOverflow { .. }));
        assert_eq!(block.count().unwrap(), 1);
        assert_eq!(image.max_address(), Some(limit - 1));
    }

    #[test]
    fn byte_at_top_of_address_space_is_rejected() {
        let mut image = HexImage::new();
        image.write_bytes(CRED_PAGE_ADDR, &MAGIC_NUMBER_BYTES);
        image.write_bytes(CRED_COUNT_ADDR, &[0]);
        image.write_bytes(u32::MAX, &[0xAB]);
        let mut block = open_supplied(&mut image);
        let err = block.append(1, CredentialType::Psk, b"abcd").unwrap_err();
        assert!(matches!(
            err,
            Error::BlockOverflow { end: 0x1_0000_0000, limit: FLASH_END }
        ));
        assert_eq!(block.count().unwrap(), 0);
        assert_eq!(image.read_u8(0), None);
        assert_eq!(image.len(), 6);
    }

    #[test]
    fn image_data_past_flash_end_is_rejected() {
        let mut image = HexImage::new();
        image.write_bytes(CRED_PAGE_ADDR, &MAGIC_NUMBER_BYTES);
        image.write_bytes(CRED_COUNT_ADDR, &[0]);
        image.write_bytes(FLASH_END + 0x100, &[0xAB]);
        let mut block = open_supplied(&mut image);
        assert!(matches!(
            block.append(1, CredentialType::Psk, b""),
            Err(Error::BlockOverflow { .. })
        ));
        assert_eq!(block.count().unwrap(), 0);
    }

    #[test]
    fn count_saturates_at_255_records() {
        let mut image = HexImage::new();
        let mut block = open_supplied(&mut image);
        for _ in 0..255 {
            block.append(7, CredentialType::PskIdentity, b"").unwrap();
        }
        assert_eq!(block.count().unwrap(), 255);
        assert!(matches!(
            block.append(7, CredentialType::PskIdentity, b""),
            Err(Error::CountOverflow(255))
        ));
    }

    #[test]
    fn header_dump_mentions_magic_bytes() {
        let mut image = HexImage::new();
        let block = open_supplied(&mut image);
        let dump = block.header_dump().to_lowercase();
        assert!(dump.contains("1a ad 5c ca"));
    }
}
