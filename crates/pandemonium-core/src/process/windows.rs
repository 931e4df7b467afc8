//! Windows backend built on the Win32 process and ToolHelp APIs.

use std::ffi::c_void;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, warn};
use windows::Win32::Foundation::{
    BOOL, CloseHandle, ERROR_ACCESS_DENIED, ERROR_INVALID_ADDRESS, ERROR_NOACCESS, HANDLE, HMODULE,
    STILL_ACTIVE,
};
use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::ProcessStatus::{
    EnumProcessModulesEx, GetModuleFileNameExW, GetModuleInformation, LIST_MODULES_ALL, MODULEINFO,
};
use windows::Win32::System::Threading::{
    GetCurrentProcess, GetExitCodeProcess, IsWow64Process, OpenProcess,
    PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
};

use super::module::image_size;
use super::{Bitness, Module, Process, ProcessBackend, ProcessEntry, ProcessInfo, ProcessProvider};
use crate::error::{Error, Result};

const MAX_MODULES: usize = 1024;
const MAX_PATH_CHARS: usize = 1024;

/// Process provider using ToolHelp snapshots and PSAPI.
pub struct WindowsProvider;

impl ProcessProvider for WindowsProvider {
    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        // SAFETY: the snapshot handle is closed before returning and `entry`
        // is a properly sized PROCESSENTRY32W.
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)
                .map_err(|e| Error::EnumerationFailed(e.to_string()))?;

            let mut entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };

            let mut processes = Vec::new();
            if Process32FirstW(snapshot, &mut entry).is_ok() {
                loop {
                    processes.push(ProcessEntry {
                        pid: entry.th32ProcessID,
                        name: wide_to_string(&entry.szExeFile),
                    });
                    if Process32NextW(snapshot, &mut entry).is_err() {
                        break;
                    }
                }
            }

            let _ = CloseHandle(snapshot);
            Ok(processes)
        }
    }

    fn attach(&self, entry: &ProcessEntry) -> Result<Process> {
        let pid = entry.pid;
        // SAFETY: OpenProcess has no memory preconditions.
        let query = unsafe { OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, BOOL::from(false), pid) }
            .map_err(|e| attach_error(pid, e))?;
        let backend = WindowsBackend {
            pid,
            query,
            access: Mutex::new(None),
        };

        let modules = backend.modules()?;
        let executable_path = backend
            .module_path(HMODULE::default())
            .unwrap_or_else(|| PathBuf::from(&entry.name));
        let executable_size = image_size(&executable_path, 0);

        let host_is_64_bit = cfg!(target_pointer_width = "64") || is_wow64(current_process());
        let bitness = Bitness::determine(host_is_64_bit, is_wow64(backend.query));

        let info = ProcessInfo {
            pid,
            name: entry.name.clone(),
            executable_path,
            executable_size,
        };
        Ok(Process::new(info, bitness, modules, Box::new(backend)))
    }
}

fn attach_error(pid: u32, e: windows::core::Error) -> Error {
    if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
        Error::PermissionDenied {
            pid,
            message: e.message().to_string(),
        }
    } else {
        Error::AttachFailed {
            pid,
            message: e.message().to_string(),
        }
    }
}

fn wide_to_string(wide: &[u16]) -> String {
    let end = wide.iter().position(|c| *c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..end])
}

fn current_process() -> HANDLE {
    // SAFETY: returns a pseudo handle, always valid for the calling process.
    unsafe { GetCurrentProcess() }
}

fn is_wow64(handle: HANDLE) -> bool {
    let mut wow64 = BOOL::default();
    // SAFETY: `wow64` is a valid out-pointer for the duration of the call.
    match unsafe { IsWow64Process(handle, &mut wow64) } {
        Ok(()) => wow64.as_bool(),
        Err(e) => {
            warn!("IsWow64Process failed: {}", e);
            false
        }
    }
}

struct WindowsBackend {
    pid: u32,
    /// Query/read handle held for the lifetime of the attachment
    query: HANDLE,
    /// Read/write handle, present while open
    access: Mutex<Option<HANDLE>>,
}

// SAFETY: process handles are plain kernel object references and may be used
// from any thread. The mutable handle is guarded by the mutex.
unsafe impl Send for WindowsBackend {}
unsafe impl Sync for WindowsBackend {}

impl WindowsBackend {
    fn modules(&self) -> Result<Vec<Module>> {
        let mut handles = vec![HMODULE::default(); MAX_MODULES];
        let mut needed = 0u32;

        // SAFETY: `handles` has room for `cb` bytes and `needed` is a valid
        // out-pointer.
        unsafe {
            EnumProcessModulesEx(
                self.query,
                handles.as_mut_ptr(),
                (handles.len() * std::mem::size_of::<HMODULE>()) as u32,
                &mut needed,
                LIST_MODULES_ALL,
            )
        }
        .map_err(|e| attach_error(self.pid, e))?;

        let count = (needed as usize / std::mem::size_of::<HMODULE>()).min(handles.len());
        let mut modules = Vec::with_capacity(count);
        for handle in &handles[..count] {
            let Some(path) = self.module_path(*handle) else {
                continue;
            };
            let mut info = MODULEINFO::default();
            // SAFETY: `info` is a valid MODULEINFO out-pointer of the given size.
            let queried = unsafe {
                GetModuleInformation(
                    self.query,
                    *handle,
                    &mut info,
                    std::mem::size_of::<MODULEINFO>() as u32,
                )
            };
            if let Err(e) = queried {
                debug!("Skipping module {}: {}", path.display(), e);
                continue;
            }

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let size = image_size(&path, info.SizeOfImage as u64);
            modules.push(Module::new(name, path, size, info.lpBaseOfDll as u64));
        }

        Ok(modules)
    }

    fn module_path(&self, module: HMODULE) -> Option<PathBuf> {
        let mut buf = vec![0u16; MAX_PATH_CHARS];
        // SAFETY: `buf` is a valid, writable UTF-16 buffer.
        let len = unsafe { GetModuleFileNameExW(self.query, module, &mut buf) } as usize;
        (len > 0).then(|| PathBuf::from(String::from_utf16_lossy(&buf[..len])))
    }

    fn access_handle(&self) -> Result<HANDLE> {
        (*self.access.lock()).ok_or(Error::ProcessNotOpen)
    }

    fn transfer_error(&self, address: u64, e: windows::core::Error, transferred: usize) -> Result<usize> {
        let code = e.code();
        if transferred == 0
            && (code == ERROR_NOACCESS.to_hresult() || code == ERROR_INVALID_ADDRESS.to_hresult())
        {
            return Err(Error::InvalidAddress(address));
        }
        // ERROR_PARTIAL_COPY and friends surface as a short transfer
        debug!("Transfer at {:#x} stopped after {} bytes: {}", address, transferred, e);
        Ok(transferred)
    }
}

impl ProcessBackend for WindowsBackend {
    fn open(&self) -> Result<()> {
        let mut access = self.access.lock();
        if access.is_some() {
            return Err(Error::ProcessAlreadyOpen);
        }

        let rights = PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION | PROCESS_QUERY_INFORMATION;
        // SAFETY: OpenProcess has no memory preconditions.
        let handle = unsafe { OpenProcess(rights, BOOL::from(false), self.pid) }
            .map_err(|e| attach_error(self.pid, e))?;
        *access = Some(handle);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(handle) = self.access.lock().take() {
            // SAFETY: the handle was obtained from OpenProcess and is closed once.
            unsafe { CloseHandle(handle) }.map_err(|e| Error::AttachFailed {
                pid: self.pid,
                message: e.message().to_string(),
            })?;
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        let mut code = 0u32;
        // SAFETY: `code` is a valid out-pointer.
        let queried = unsafe { GetExitCodeProcess(self.query, &mut code) };
        queried.is_ok() && code == STILL_ACTIVE.0 as u32
    }

    fn read(&self, address: u64, buf: &mut [u8]) -> Result<usize> {
        let handle = self.access_handle()?;
        let mut transferred = 0usize;
        // SAFETY: `buf` is valid for `buf.len()` bytes of writes.
        let result = unsafe {
            ReadProcessMemory(
                handle,
                address as usize as *const c_void,
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
                Some(&mut transferred),
            )
        };
        match result {
            Ok(()) => Ok(transferred),
            Err(e) => self.transfer_error(address, e, transferred),
        }
    }

    fn write(&self, address: u64, data: &[u8]) -> Result<usize> {
        let handle = self.access_handle()?;
        let mut transferred = 0usize;
        // SAFETY: `data` is valid for `data.len()` bytes of reads.
        let result = unsafe {
            WriteProcessMemory(
                handle,
                address as usize as *const c_void,
                data.as_ptr() as *const c_void,
                data.len(),
                Some(&mut transferred),
            )
        };
        match result {
            Ok(()) => Ok(transferred),
            Err(e) => self.transfer_error(address, e, transferred),
        }
    }
}

impl Drop for WindowsBackend {
    fn drop(&mut self) {
        if let Some(handle) = self.access.get_mut().take() {
            // SAFETY: handle came from OpenProcess and is not used afterwards.
            let _ = unsafe { CloseHandle(handle) };
        }
        // SAFETY: as above, for the query handle.
        let _ = unsafe { CloseHandle(self.query) };
    }
}
