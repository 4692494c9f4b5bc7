//! Fixed layout of the credential block, shared with the on-device loader.

/// First flash page boundary after the loader firmware stub.
pub const CRED_PAGE_ADDR: u32 = 0x2B000;
pub const FW_RESULT_CODE_ADDR: u32 = CRED_PAGE_ADDR + 4;
pub const CRED_COUNT_ADDR: u32 = FW_RESULT_CODE_ADDR + 4;
pub const FIRST_CRED_ADDR: u32 = CRED_COUNT_ADDR + 1;

pub const MAGIC_NUMBER: u32 = 0xca5c_ad1a;
pub const MAGIC_NUMBER_BYTES: [u8; 4] = MAGIC_NUMBER.to_le_bytes();
pub const BLANK_FW_RESULT_CODE: u32 = 0xFFFF_FFFF;

/// tag(4) + type(1) + len(2)
pub const RECORD_HEADER_SIZE: u32 = 7;
pub const MAX_RECORD_DATA_LEN: usize = u16::MAX as usize;
pub const MAX_RECORD_COUNT: u8 = u8::MAX;

pub mod limits {
    // RFC 4279
    pub const MAX_PSK_IDENT_LEN_BYTES: usize = 128;
    pub const MAX_PSK_LEN_BYTES: usize = 64;
    /// As of modem firmware 1.1.0
    pub const MAX_KEY_MATERIAL_LEN_BYTES: usize = 4077;
}

pub mod defaults {
    use std::time::Duration;

    pub const CRED_WRITE_TIME: Duration = Duration::from_secs(7);
    pub const HEX_PATH: &str = "build/zephyr/merged.hex";
    pub const TMP_FILE_NAME: &str = "cred_hex.hex";
}

/// nrf_cloud relies on credentials with this sec_tag.
pub const NRF_CLOUD_SEC_TAG: u32 = 16842753;
