//! Abstract debug probe interface.
use std::path::Path;

use anyhow::Result;

use crate::error::Error;

pub use self::nrfjprog::NrfjprogDll;

mod nrfjprog;

/// Abstraction of the debug probe layer.
/// Might be nrfjprog over J-Link, or a fake in tests.
pub trait Programmer {
    /// Serial numbers of every attached probe.
    fn connected_probes(&mut self) -> Result<Vec<u32>>;
    fn connect(&mut self, serial_number: u32) -> Result<()>;
    fn program(&mut self, path: &Path) -> Result<()>;
    fn verify(&mut self, path: &Path) -> Result<()>;
    /// Resets the target and lets it run.
    fn reset(&mut self) -> Result<()>;
    fn read_u32(&mut self, addr: u32) -> Result<u32>;
    fn erase_all(&mut self) -> Result<()>;
    /// Releases the probe. Called once per connection, also on error paths.
    fn close(&mut self);

    /// Program and verify a hex file, then start it.
    fn write_firmware(&mut self, path: &Path) -> Result<()> {
        self.program(path)?;
        self.verify(path)?;
        self.reset()
    }
}

/// Picks the probe to use. `wanted` must be attached; without it exactly
/// one probe may be.
pub fn select_probe(connected: &[u32], wanted: Option<u32>) -> crate::Result<u32> {
    if let Some(serial_number) = wanted {
        return if connected.contains(&serial_number) {
            Ok(serial_number)
        } else {
            Err(Error::DeviceSelection(format!(
                "serial_number not found ({})",
                serial_number
            )))
        };
    }
    match connected {
        [] => Err(Error::DeviceSelection("no debug probes found".into())),
        [serial_number] => Ok(*serial_number),
        _ => Err(Error::DeviceSelection(
            "multiple debug probes found, use --serial-number".into(),
        )),
    }
}

/// An open probe connection. Closed when dropped, whatever the outcome.
pub struct Connection<P: Programmer> {
    programmer: P,
    serial_number: Option<u32>,
}

impl<P: Programmer> Connection<P> {
    pub fn open(programmer: P, wanted: Option<u32>) -> crate::Result<Self> {
        let mut conn = Connection {
            programmer,
            serial_number: None,
        };
        let probes = conn
            .programmer
            .connected_probes()
            .map_err(Error::Transport)?;
        log::debug!("Connected probes: {:?}", probes);
        let serial_number = select_probe(&probes, wanted)?;
        conn.programmer
            .connect(serial_number)
            .map_err(Error::Transport)?;
        log::info!("Connected to debug probe {}", serial_number);
        conn.serial_number = Some(serial_number);
        Ok(conn)
    }

    pub fn programmer(&mut self) -> &mut P {
        &mut self.programmer
    }
}

impl<P: Programmer> Drop for Connection<P> {
    fn drop(&mut self) {
        self.programmer.close();
        match self.serial_number {
            Some(serial_number) => log::debug!("Debug probe {} closed", serial_number),
            None => log::debug!("Debug probe library closed"),
        }
    }
}
