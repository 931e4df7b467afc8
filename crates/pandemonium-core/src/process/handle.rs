use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Bitness, Module, ModuleId, Pointer, PointerPath, ProcessBackend};
use crate::error::{Error, Result};

/// Identity of an attached process, available without an open handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Executable file name as reported by the OS
    pub name: String,
    pub executable_path: PathBuf,
    /// Size of the executable image on disk (0 when unknown)
    pub executable_size: u64,
}

/// An attached process.
///
/// Attaching enumerates modules and fixes the pointer width. Reading and
/// writing additionally require [`open`](Process::open). Liveness is checked
/// before every access; once the target exits, the handle closes itself and
/// every further access fails with [`Error::ProcessTerminated`].
pub struct Process {
    info: ProcessInfo,
    bitness: Bitness,
    modules: Vec<Module>,
    backend: Box<dyn ProcessBackend>,
    open: AtomicBool,
}

impl Process {
    pub fn new(
        info: ProcessInfo,
        bitness: Bitness,
        modules: Vec<Module>,
        backend: Box<dyn ProcessBackend>,
    ) -> Self {
        debug!(
            "Attached to {} (pid {}, {}, {} modules)",
            info.name,
            info.pid,
            bitness,
            modules.len()
        );
        Self {
            info,
            bitness,
            modules,
            backend,
            open: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> &ProcessInfo {
        &self.info
    }

    pub fn pid(&self) -> u32 {
        self.info.pid
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn bitness(&self) -> Bitness {
        self.bitness
    }

    pub fn is_64_bit(&self) -> bool {
        self.bitness == Bitness::Bits64
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    /// Look up a module by name, ignoring case.
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.module_id(name).ok().and_then(|id| self.module_by_id(id))
    }

    pub fn module_id(&self, name: &str) -> Result<ModuleId> {
        self.modules
            .iter()
            .position(|m| m.name().eq_ignore_ascii_case(name))
            .map(ModuleId)
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
    }

    pub fn module_by_id(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.0)
    }

    pub fn is_alive(&self) -> bool {
        self.backend.is_alive()
    }

    /// Whether the handle is open. Closes the handle if the process died.
    pub fn is_open(&self) -> bool {
        self.ensure_open().is_ok()
    }

    pub fn open(&self) -> Result<()> {
        if self.open.load(Ordering::SeqCst) {
            return Err(Error::ProcessAlreadyOpen);
        }
        if !self.backend.is_alive() {
            return Err(Error::ProcessTerminated { pid: self.pid() });
        }

        self.backend.open()?;
        self.open.store(true, Ordering::SeqCst);
        info!("Opened {} (pid {})", self.name(), self.pid());
        Ok(())
    }

    /// Release the read/write handle.
    ///
    /// The handle is released even when the process has already exited; that
    /// case is still reported as [`Error::ProcessTerminated`].
    pub fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Err(Error::ProcessNotOpen);
        }

        let alive = self.backend.is_alive();
        self.backend.close()?;
        debug!("Closed {} (pid {})", self.name(), self.pid());

        if alive {
            Ok(())
        } else {
            Err(Error::ProcessTerminated { pid: self.pid() })
        }
    }

    /// Create a pointer at `module + offset`, followed by `extra` offsets.
    ///
    /// With any `extra` offsets the pointer is deep: all but the last offset
    /// are dereferenced while resolving.
    pub fn pointer(&self, module: &str, offset: u64, extra: &[u64]) -> Result<Pointer> {
        self.ensure_open()?;

        let id = self.module_id(module)?;
        let base = self
            .module_by_id(id)
            .map(Module::base_address)
            .ok_or_else(|| Error::ModuleNotFound(module.to_string()))?;

        let mut offsets = Vec::with_capacity(extra.len() + 1);
        offsets.push(offset);
        offsets.extend_from_slice(extra);
        Ok(Pointer::new(self.pid(), id, base, offsets))
    }

    pub fn pointer_path(&self, path: &PointerPath) -> Result<Pointer> {
        let (first, rest) = path
            .offsets()
            .split_first()
            .ok_or_else(|| Error::InvalidPointerPath(path.to_string()))?;
        self.pointer(path.module(), *first, rest)
    }

    /// Read exactly `buf.len()` bytes at `address`.
    pub fn read_memory(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        self.ensure_open()?;

        let actual = self.backend.read(address, buf)?;
        if actual < buf.len() {
            return Err(Error::ShortRead {
                address,
                expected: buf.len(),
                actual,
            });
        }
        Ok(())
    }

    /// Write all of `data` at `address`.
    pub fn write_memory(&self, address: u64, data: &[u8]) -> Result<()> {
        self.ensure_open()?;

        let actual = self.backend.write(address, data)?;
        if actual < data.len() {
            return Err(Error::ShortWrite {
                address,
                expected: data.len(),
                actual,
            });
        }
        Ok(())
    }

    /// Read a pointer-sized value (4 or 8 bytes, depending on bitness).
    pub fn read_address(&self, address: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        let width = self.bitness.pointer_width();
        self.read_memory(address, &mut buf[..width])?;
        Ok(self.bitness.decode_pointer(&buf[..width]))
    }

    /// `base + offset`, checked against the target's address space.
    pub(crate) fn offset_address(&self, base: u64, offset: u64) -> Result<u64> {
        base.checked_add(offset)
            .filter(|address| *address <= self.bitness.max_address())
            .ok_or(Error::AddressOutOfBounds { base, offset })
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::ProcessNotOpen);
        }

        if !self.backend.is_alive() {
            warn!("{} (pid {}) has terminated", self.name(), self.pid());
            self.open.store(false, Ordering::SeqCst);
            if let Err(e) = self.backend.close() {
                debug!("Failed to release handle of terminated process: {}", e);
            }
            return Err(Error::ProcessTerminated { pid: self.pid() });
        }

        Ok(())
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("info", &self.info)
            .field("bitness", &self.bitness)
            .field("modules", &self.modules.len())
            .field("open", &self.open.load(Ordering::SeqCst))
            .finish()
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.backend.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::process::MockProcessBuilder;

    #[test]
    fn test_open_close_lifecycle() {
        let (process, _memory) = MockProcessBuilder::new(1, "game.exe").build();

        assert!(!process.is_open());
        process.open().unwrap();
        assert!(process.is_open());
        assert!(matches!(process.open(), Err(Error::ProcessAlreadyOpen)));

        process.close().unwrap();
        assert!(!process.is_open());
        assert!(matches!(process.close(), Err(Error::ProcessNotOpen)));
    }

    #[test]
    fn test_open_terminated_process() {
        let (process, memory) = MockProcessBuilder::new(1, "game.exe").build();
        memory.kill();

        let err = process.open().unwrap_err();
        assert!(matches!(err, Error::ProcessTerminated { pid: 1 }));
    }

    #[test]
    fn test_access_after_termination_closes_handle() {
        let (process, memory) = MockProcessBuilder::new(7, "game.exe")
            .module("game.exe", 0x400000, 0x1000)
            .build_open();
        let pointer = process.pointer("game.exe", 0x10, &[]).unwrap();
        assert!(pointer.read_u8(&process, 0).is_ok());

        memory.kill();

        let err = pointer.read_u8(&process, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert!(!process.is_open());
        // Stays closed: the next access is a plain "not open"
        assert!(matches!(
            pointer.read_u8(&process, 0),
            Err(Error::ProcessNotOpen)
        ));
    }

    #[test]
    fn test_read_requires_open() {
        let (process, _memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", 0x400000, 0x1000)
            .build();
        let mut buf = [0u8; 4];
        assert!(matches!(
            process.read_memory(0x400000, &mut buf),
            Err(Error::ProcessNotOpen)
        ));
    }

    #[test]
    fn test_short_read_is_transfer_error() {
        let (process, memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", 0x400000, 0x1000)
            .build_open();
        memory.limit_transfers(2);

        let mut buf = [0u8; 4];
        let err = process.read_memory(0x400000, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortRead {
                address: 0x400000,
                expected: 4,
                actual: 2
            }
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_short_write_is_transfer_error() {
        let (process, memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", 0x400000, 0x1000)
            .build_open();
        memory.limit_transfers(1);

        let err = process.write_memory(0x400000, &[1, 2]).unwrap_err();
        assert!(matches!(err, Error::ShortWrite { actual: 1, .. }));
    }

    #[test]
    fn test_module_lookup_ignores_case() {
        let (process, _memory) = MockProcessBuilder::new(1, "DXHR.exe")
            .module("DXHR.exe", 0x400000, 0x1000)
            .build_open();
        assert!(process.module("dxhr.EXE").is_some());
        assert!(matches!(
            process.pointer("missing.dll", 0, &[]),
            Err(Error::ModuleNotFound(_))
        ));
    }

    #[test]
    fn test_offset_address_respects_bitness() {
        let (process, _memory) = MockProcessBuilder::new(1, "game.exe")
            .bitness(Bitness::Bits32)
            .build();
        assert_eq!(process.offset_address(0x1000, 0x10).unwrap(), 0x1010);
        assert!(matches!(
            process.offset_address(0xFFFF_FFF0, 0x20),
            Err(Error::AddressOutOfBounds { .. })
        ));
    }
}
