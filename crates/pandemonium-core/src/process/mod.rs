//! Access to another process's address space.
//!
//! A [`Process`] is produced by a [`ProcessProvider`] when attaching to a
//! running program. It owns the enumerated [`Module`]s and an OS-specific
//! [`ProcessBackend`]. [`Pointer`]s are plain data (pid, module handle, base
//! address, offsets) and are resolved against the process on every access.

mod bitness;
mod handle;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(test)]
pub mod mock;
mod module;
mod path;
mod platform;
mod pointer;
#[cfg(target_os = "windows")]
mod windows;

pub use bitness::Bitness;
pub use handle::{Process, ProcessInfo};
#[cfg(target_os = "linux")]
pub use linux::LinuxProvider;
#[cfg(test)]
pub use mock::{MockMemory, MockProcessBuilder, MockProvider};
pub use module::{Module, ModuleId};
pub use path::PointerPath;
pub use platform::Platform;
pub use pointer::Pointer;
#[cfg(target_os = "windows")]
pub use windows::WindowsProvider;

use crate::error::Result;

/// OS-level handle to a single attached process.
///
/// Implementations report how many bytes were actually transferred; turning a
/// short count into an error is the job of [`Process`].
pub trait ProcessBackend: Send + Sync {
    /// Acquire read/write access.
    fn open(&self) -> Result<()>;

    /// Release read/write access.
    fn close(&self) -> Result<()>;

    /// Whether the process is still running.
    fn is_alive(&self) -> bool;

    fn read(&self, address: u64, buf: &mut [u8]) -> Result<usize>;

    fn write(&self, address: u64, data: &[u8]) -> Result<usize>;
}

/// A running process as listed by the OS, before attaching.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ProcessEntry {
    pub pid: u32,
    /// Executable file name, e.g. `dxhr.exe`
    pub name: String,
}

/// Enumerates processes and attaches to them.
pub trait ProcessProvider {
    fn processes(&self) -> Result<Vec<ProcessEntry>>;

    /// Attach to a process, enumerating its modules. The returned process is
    /// not yet open for reading or writing.
    fn attach(&self, entry: &ProcessEntry) -> Result<Process>;

    /// Processes whose executable name matches one of `names`, ignoring case.
    fn find(&self, names: &[String]) -> Result<Vec<ProcessEntry>> {
        Ok(self
            .processes()?
            .into_iter()
            .filter(|entry| names.iter().any(|n| n.eq_ignore_ascii_case(&entry.name)))
            .collect())
    }
}

impl<P: ProcessProvider + ?Sized> ProcessProvider for Box<P> {
    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        (**self).processes()
    }

    fn attach(&self, entry: &ProcessEntry) -> Result<Process> {
        (**self).attach(entry)
    }
}

/// The provider for the platform this binary was built for.
pub fn native_provider() -> Box<dyn ProcessProvider + Send> {
    #[cfg(target_os = "windows")]
    {
        Box::new(WindowsProvider)
    }
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxProvider)
    }
    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    {
        Box::new(UnsupportedProvider)
    }
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
struct UnsupportedProvider;

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
impl ProcessProvider for UnsupportedProvider {
    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        Err(crate::Error::EnumerationFailed(format!(
            "process access is not supported on {}",
            Platform::current()
        )))
    }

    fn attach(&self, entry: &ProcessEntry) -> Result<Process> {
        Err(crate::Error::AttachFailed {
            pid: entry.pid,
            message: "process access is not supported on this platform".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_filters_by_name_ignoring_case() {
        let provider = MockProvider::new()
            .with(MockProcessBuilder::new(10, "DXHR.EXE"))
            .with(MockProcessBuilder::new(11, "notepad.exe"));

        let found = provider.find(&["dxhr.exe".to_string()]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pid, 10);
    }
}
