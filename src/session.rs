//! One provisioning run: build the credential hex image, then either write
//! it out or download it, let the loader run and check its result code.
use std::thread::sleep;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::block::CredentialBlock;
use crate::config::{Output, ProvisionConfig};
use crate::constants::{defaults, BLANK_FW_RESULT_CODE, FW_RESULT_CODE_ADDR};
use crate::error::{Error, Result};
use crate::image::{HexImage, MemoryImage};
use crate::programmer::{Connection, Programmer};
use crate::target::Target;

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub added: usize,
    pub total: u8,
}

/// Runs `config` to completion. `programmer` is only called when the image
/// goes to a device.
pub fn run<P, F>(config: &ProvisionConfig, target: &Target, programmer: F) -> Result<Summary>
where
    P: Programmer,
    F: FnOnce() -> anyhow::Result<P>,
{
    let mut image = HexImage::load(&config.image.path)?;
    let summary = build_image(&mut image, config, target)?;

    match &config.output {
        Output::File(path) => image.save(path)?,
        Output::Device {
            serial_number,
            fw_delay,
        } => {
            let programmer = programmer().map_err(Error::Transport)?;
            program(&image, programmer, *serial_number, *fw_delay)?;
        }
    }
    Ok(summary)
}

/// Validates or initializes the block in `image` and appends every credential.
pub fn build_image<M: MemoryImage>(
    image: &mut M,
    config: &ProvisionConfig,
    target: &Target,
) -> Result<Summary> {
    let mut block = CredentialBlock::open(image, config.image.origin, target.flash_size)?;
    let credentials = config.credentials.ingest()?;
    for credential in &credentials {
        block.append(config.sec_tag, credential.kind, &credential.data)?;
    }
    let total = block.count()?;
    log::debug!("Credential block header:\n{}", block.header_dump());
    Ok(Summary {
        added: credentials.len(),
        total,
    })
}

/// Downloads `image`, waits for the loader and checks what it reported.
///
/// On a non-zero result the device is left as is and the temporary hex file
/// is kept for inspection.
pub fn program<P: Programmer>(
    image: &HexImage,
    programmer: P,
    serial_number: Option<u32>,
    fw_delay: Duration,
) -> Result<()> {
    let mut conn = Connection::open(programmer, serial_number)?;

    let tmp_dir = tempfile::Builder::new()
        .prefix("nrfcred-")
        .tempdir()
        .map_err(|e| Error::io(std::env::temp_dir(), e))?;
    let tmp_file = tmp_dir.path().join(defaults::TMP_FILE_NAME);
    image.save(&tmp_file)?;

    conn.programmer()
        .write_firmware(&tmp_file)
        .map_err(Error::Transport)?;
    wait_for_loader(fw_delay);

    let result_code = conn
        .programmer()
        .read_u32(FW_RESULT_CODE_ADDR)
        .map_err(Error::Transport)?;
    log::debug!("Firmware result code: 0x{:08X}", result_code);
    if result_code != 0 {
        if result_code == BLANK_FW_RESULT_CODE {
            log::warn!("Loader did not report a result, a longer --fw-delay may help");
        }
        let kept = tmp_dir.keep();
        log::warn!(
            "Device left as is, image kept at {}",
            kept.join(defaults::TMP_FILE_NAME).display()
        );
        return Err(Error::DeviceExecution(result_code));
    }

    conn.programmer().erase_all().map_err(Error::Transport)?;
    log::info!("Credentials stored, device erased");
    remove_tmp(tmp_dir);
    Ok(())
}

/// Runs after a successful erase. Failures are logged, not returned.
fn remove_tmp(tmp_dir: tempfile::TempDir) {
    let path = tmp_dir.path().to_path_buf();
    if let Err(e) = tmp_dir.close() {
        log::warn!("Cannot remove {}: {}", path.display(), e);
    }
}

/// Plain wait for the loader to finish, not cancellable.
fn wait_for_loader(delay: Duration) {
    if delay.is_zero() {
        return;
    }
    log::info!("Waiting {:.1}s for the loader to run", delay.as_secs_f32());

    let bar = ProgressBar::new(delay.as_millis() as u64);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:40}] {elapsed}/{duration}") {
        bar.set_style(style);
    }
    let step = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < delay {
        let chunk = step.min(delay - waited);
        sleep(chunk);
        waited += chunk;
        bar.set_position(waited.as_millis() as u64);
    }
    bar.finish_and_clear();
}
