//! Sparse memory images and the Intel HEX files they are loaded from.
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use ihex::Record;

use crate::error::{Error, Result};

/// Bytes per data record when writing, same as most vendor tools.
const DATA_RECORD_LEN: usize = 16;

/// Byte-addressable view of a firmware image.
pub trait MemoryImage {
    /// Highest address holding a byte, `None` for an empty image.
    fn max_address(&self) -> Option<u32>;
    /// `None` if any byte of the range was never written.
    fn read_bytes(&self, addr: u32, len: usize) -> Option<Vec<u8>>;
    fn write_bytes(&mut self, addr: u32, data: &[u8]);

    fn read_u8(&self, addr: u32) -> Option<u8> {
        self.read_bytes(addr, 1).map(|b| b[0])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HexImage {
    bytes: BTreeMap<u32, u8>,
    /// Start address record, carried through unchanged.
    start: Option<Record>,
}

impl HexImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let raw = std::fs::read_to_string(p).map_err(|e| Error::io(p, e))?;
        let image = Self::parse(&raw)
            .with_context(|| format!("cannot read {}", p.display()))
            .map_err(Error::Image)?;
        log::info!(
            "Read {} ({} bytes, max address {})",
            p.display(),
            image.len(),
            image
                .max_address()
                .map(|a| format!("0x{:05X}", a))
                .unwrap_or_else(|| "none".into())
        );
        Ok(image)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let p = path.as_ref();
        let text = self
            .to_ihex()
            .with_context(|| format!("cannot encode {}", p.display()))
            .map_err(Error::Image)?;
        std::fs::write(p, text).map_err(|e| Error::io(p, e))?;
        log::info!("Wrote {}", p.display());
        Ok(())
    }

    pub fn parse(data: &str) -> anyhow::Result<Self> {
        let mut image = HexImage::new();
        let mut base_address = 0;

        for record in ihex::Reader::new(data) {
            let record = record?;
            use Record::*;
            match record {
                Data { offset, value } => {
                    image.write_bytes(base_address + offset as u32, &value);
                }
                EndOfFile => (),
                ExtendedSegmentAddress(address) => {
                    base_address = (address as u32) * 16;
                }
                ExtendedLinearAddress(address) => {
                    base_address = (address as u32) << 16;
                }
                start @ (StartSegmentAddress { .. } | StartLinearAddress(_)) => {
                    image.start = Some(start);
                }
            };
        }
        Ok(image)
    }

    pub fn to_ihex(&self) -> anyhow::Result<String> {
        let mut records = vec![];
        if let Some(start) = &self.start {
            records.push(start.clone());
        }

        let mut upper = 0u16;
        for (addr, data) in self.segments() {
            let mut addr = addr;
            let mut rest = &data[..];
            while !rest.is_empty() {
                if (addr >> 16) as u16 != upper {
                    upper = (addr >> 16) as u16;
                    records.push(Record::ExtendedLinearAddress(upper));
                }
                // never let a record cross a 64K boundary
                let room = 0x1_0000 - (addr & 0xFFFF) as usize;
                let n = rest.len().min(DATA_RECORD_LEN).min(room);
                records.push(Record::Data {
                    offset: (addr & 0xFFFF) as u16,
                    value: rest[..n].to_vec(),
                });
                rest = &rest[n..];
                addr = addr.wrapping_add(n as u32);
            }
        }
        records.push(Record::EndOfFile);

        Ok(ihex::create_object_file_representation(&records)?)
    }

    /// Contiguous runs of written bytes, ordered by start address.
    pub fn segments(&self) -> Vec<(u32, Vec<u8>)> {
        let mut segments: Vec<(u32, Vec<u8>)> = vec![];
        for (&addr, &byte) in &self.bytes {
            if let Some((start, data)) = segments.last_mut() {
                if *start as u64 + data.len() as u64 == addr as u64 {
                    data.push(byte);
                    continue;
                }
            }
            segments.push((addr, vec![byte]));
        }
        segments
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl MemoryImage for HexImage {
    fn max_address(&self) -> Option<u32> {
        self.bytes.keys().next_back().copied()
    }

    fn read_bytes(&self, addr: u32, len: usize) -> Option<Vec<u8>> {
        (0..len as u32)
            .map(|i| {
                addr.checked_add(i)
                    .and_then(|a| self.bytes.get(&a).copied())
            })
            .collect()
    }

    fn write_bytes(&mut self, addr: u32, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            self.bytes.insert(addr.wrapping_add(i as u32), b);
        }
    }
}
