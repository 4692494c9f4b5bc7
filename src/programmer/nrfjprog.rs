//! nrfjprog DLL backend, J-Link probes via Nordic's nrfjprogdll.
use std::ffi::{c_char, c_int, CStr};
use std::path::Path;
use std::ptr;

use anyhow::{Context, Result};
use libloading::Library;

use super::Programmer;
use crate::image::{HexImage, MemoryImage};
use crate::target::Target;

#[cfg(target_os = "windows")]
const DEFAULT_LIBRARY: &str = "nrfjprog.dll";
#[cfg(target_os = "macos")]
const DEFAULT_LIBRARY: &str = "libnrfjprogdll.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const DEFAULT_LIBRARY: &str = "libnrfjprogdll.so";

const MAX_PROBES: usize = 64;

type MsgCallback = extern "C" fn(*const c_char);
type OpenDll = unsafe extern "C" fn(*const c_char, Option<MsgCallback>, c_int) -> c_int;
type CloseDll = unsafe extern "C" fn();
type GetConnectedEmulators = unsafe extern "C" fn(*mut u32, u32, *mut u32) -> c_int;
type ConnectToEmuWithSnr = unsafe extern "C" fn(u32, u32) -> c_int;
type Action = unsafe extern "C" fn() -> c_int;
type Write = unsafe extern "C" fn(u32, *const u8, u32, bool) -> c_int;
type Read = unsafe extern "C" fn(u32, *mut u8, u32) -> c_int;
type ReadU32 = unsafe extern "C" fn(u32, *mut u32) -> c_int;

extern "C" fn on_message(msg: *const c_char) {
    if msg.is_null() {
        return;
    }
    // SAFETY: nrfjprogdll passes a NUL terminated string valid for the call
    let msg = unsafe { CStr::from_ptr(msg) };
    log::debug!("nrfjprog: {}", msg.to_string_lossy().trim_end());
}

struct Api {
    open_dll: OpenDll,
    close_dll: CloseDll,
    get_connected_emulators: GetConnectedEmulators,
    connect_to_emu_with_snr: ConnectToEmuWithSnr,
    connect_to_device: Action,
    disconnect_from_emu: Action,
    erase_all: Action,
    sys_reset: Action,
    go: Action,
    write: Write,
    read: Read,
    read_u32: ReadU32,
}

/// Resolves one symbol, keeping `lib` loaded is the caller's job.
///
/// # Safety
/// `T` must match the exported function's signature.
unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T> {
    let sym = unsafe { lib.get::<T>(name) }.with_context(|| {
        format!(
            "missing symbol {}",
            String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name))
        )
    })?;
    Ok(*sym)
}

impl Api {
    fn resolve(lib: &Library) -> Result<Self> {
        // SAFETY: signatures follow nrfjprogdll.h
        unsafe {
            Ok(Api {
                open_dll: symbol(lib, b"NRFJPROG_open_dll\0")?,
                close_dll: symbol(lib, b"NRFJPROG_close_dll\0")?,
                get_connected_emulators: symbol(lib, b"NRFJPROG_get_connected_emulators\0")?,
                connect_to_emu_with_snr: symbol(lib, b"NRFJPROG_connect_to_emu_with_snr\0")?,
                connect_to_device: symbol(lib, b"NRFJPROG_connect_to_device\0")?,
                disconnect_from_emu: symbol(lib, b"NRFJPROG_disconnect_from_emu\0")?,
                erase_all: symbol(lib, b"NRFJPROG_erase_all\0")?,
                sys_reset: symbol(lib, b"NRFJPROG_sys_reset\0")?,
                go: symbol(lib, b"NRFJPROG_go\0")?,
                write: symbol(lib, b"NRFJPROG_write\0")?,
                read: symbol(lib, b"NRFJPROG_read\0")?,
                read_u32: symbol(lib, b"NRFJPROG_read_u32\0")?,
            })
        }
    }
}

fn check(code: c_int, what: &str) -> Result<()> {
    anyhow::ensure!(code == 0, "{} failed (nrfjprogdll error {})", what, code);
    Ok(())
}

/// J-Link probe driven through nrfjprogdll.
pub struct NrfjprogDll {
    api: Api,
    clock_khz: u32,
    opened: bool,
    connected: bool,
    // must outlive every pointer in `api`
    _lib: Library,
}

impl NrfjprogDll {
    /// Loads nrfjprogdll from `path`, or from the platform default name.
    pub fn open(path: Option<&Path>, target: &Target) -> Result<Self> {
        let name = path.map_or_else(|| DEFAULT_LIBRARY.into(), |p| p.as_os_str().to_owned());
        // SAFETY: loading runs the library's initializers, nrfjprogdll has no
        // requirements on them
        let lib = unsafe { Library::new(&name) }
            .with_context(|| format!("cannot load {}", name.to_string_lossy()))?;
        let api = Api::resolve(&lib)?;

        let family = c_int::try_from(target.family).context("device family out of range")?;
        // SAFETY: NULL lets nrfjprog locate J-Link itself
        check(
            unsafe { (api.open_dll)(ptr::null(), Some(on_message), family) },
            "open_dll",
        )?;
        log::debug!("Loaded {} for {}", name.to_string_lossy(), target);

        Ok(NrfjprogDll {
            api,
            clock_khz: target.swd_clock_khz,
            opened: true,
            connected: false,
            _lib: lib,
        })
    }

    fn segments(path: &Path) -> Result<Vec<(u32, Vec<u8>)>> {
        let image = HexImage::load(path)?;
        anyhow::ensure!(!image.is_empty(), "{} holds no data", path.display());
        log::debug!(
            "{} spans 0x{:05X}",
            path.display(),
            image.max_address().unwrap_or(0)
        );
        Ok(image.segments())
    }
}

impl Programmer for NrfjprogDll {
    fn connected_probes(&mut self) -> Result<Vec<u32>> {
        let mut serials = [0u32; MAX_PROBES];
        let mut available = 0u32;
        check(
            unsafe {
                (self.api.get_connected_emulators)(
                    serials.as_mut_ptr(),
                    MAX_PROBES as u32,
                    &mut available,
                )
            },
            "get_connected_emulators",
        )?;
        Ok(serials[..(available as usize).min(MAX_PROBES)].to_vec())
    }

    fn connect(&mut self, serial_number: u32) -> Result<()> {
        check(
            unsafe { (self.api.connect_to_emu_with_snr)(serial_number, self.clock_khz) },
            "connect_to_emu_with_snr",
        )?;
        self.connected = true;
        check(
            unsafe { (self.api.connect_to_device)() },
            "connect_to_device",
        )
    }

    fn program(&mut self, path: &Path) -> Result<()> {
        let segments = Self::segments(path)?;
        self.erase_all()?;
        for (addr, data) in &segments {
            log::debug!("Writing {} bytes at 0x{:05X}", data.len(), addr);
            check(
                unsafe { (self.api.write)(*addr, data.as_ptr(), data.len() as u32, true) },
                "write",
            )?;
        }
        log::info!("Programmed {}", path.display());
        Ok(())
    }

    fn verify(&mut self, path: &Path) -> Result<()> {
        for (addr, data) in Self::segments(path)? {
            let mut readback = vec![0u8; data.len()];
            check(
                unsafe { (self.api.read)(addr, readback.as_mut_ptr(), readback.len() as u32) },
                "read",
            )?;
            if let Some(i) = data.iter().zip(&readback).position(|(a, b)| a != b) {
                anyhow::bail!(
                    "verify failed at 0x{:05X}: expected {:02x}, read {:02x}",
                    addr as usize + i,
                    data[i],
                    readback[i]
                );
            }
        }
        log::info!("Verified {}", path.display());
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        check(unsafe { (self.api.sys_reset)() }, "sys_reset")?;
        check(unsafe { (self.api.go)() }, "go")?;
        log::info!("Device reset");
        Ok(())
    }

    fn read_u32(&mut self, addr: u32) -> Result<u32> {
        let mut value = 0u32;
        check(
            unsafe { (self.api.read_u32)(addr, &mut value) },
            "read_u32",
        )?;
        Ok(value)
    }

    fn erase_all(&mut self) -> Result<()> {
        check(unsafe { (self.api.erase_all)() }, "erase_all")
    }

    fn close(&mut self) {
        if self.connected {
            // SAFETY: connected via connect_to_emu_with_snr
            let code = unsafe { (self.api.disconnect_from_emu)() };
            if code != 0 {
                log::warn!("disconnect_from_emu failed (nrfjprogdll error {})", code);
            }
            self.connected = false;
        }
        if self.opened {
            unsafe { (self.api.close_dll)() };
            self.opened = false;
        }
    }
}

impl Drop for NrfjprogDll {
    fn drop(&mut self) {
        self.close();
    }
}
