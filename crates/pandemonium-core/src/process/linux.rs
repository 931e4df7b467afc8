//! Linux backend built on `process_vm_readv`/`process_vm_writev` and procfs.
//!
//! Windows games usually run under Wine here, in which case `argv[0]` holds
//! the Windows path of the game executable and the PE images show up as
//! file mappings in `/proc/<pid>/maps`.

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::module::image_size;
use super::{Bitness, Module, Process, ProcessBackend, ProcessEntry, ProcessInfo, ProcessProvider};
use crate::error::{Error, Result};

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELF_CLASS_32: u8 = 1;

/// Process provider reading `/proc`.
pub struct LinuxProvider;

impl ProcessProvider for LinuxProvider {
    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        let entries = fs::read_dir("/proc")
            .map_err(|e| Error::EnumerationFailed(format!("/proc: {}", e)))?;

        let mut processes = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            // Processes can exit while we walk the list
            if let Some(name) = process_name(pid) {
                processes.push(ProcessEntry { pid, name });
            }
        }

        Ok(processes)
    }

    fn attach(&self, entry: &ProcessEntry) -> Result<Process> {
        let pid = entry.pid;
        let exe = fs::read_link(format!("/proc/{}/exe", pid)).map_err(|e| attach_error(pid, e))?;
        let maps = fs::read_to_string(format!("/proc/{}/maps", pid)).map_err(|e| attach_error(pid, e))?;

        let modules = parse_maps(&maps);
        let executable_path = modules
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(&entry.name))
            .map(|m| m.path().to_path_buf())
            .unwrap_or_else(|| exe.clone());
        let executable_size = image_size(&executable_path, 0);

        let target_is_compat_32 = elf_class(&exe) == Some(ELF_CLASS_32);
        let bitness = Bitness::determine(cfg!(target_pointer_width = "64"), target_is_compat_32);

        let info = ProcessInfo {
            pid,
            name: entry.name.clone(),
            executable_path,
            executable_size,
        };
        let backend = LinuxBackend { pid: pid as libc::pid_t };
        Ok(Process::new(info, bitness, modules, Box::new(backend)))
    }
}

fn attach_error(pid: u32, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::PermissionDenied => Error::PermissionDenied {
            pid,
            message: e.to_string(),
        },
        _ => Error::AttachFailed {
            pid,
            message: e.to_string(),
        },
    }
}

/// Executable name: the last component of `argv[0]` (which may be a Windows
/// path under Wine), else the name of `/proc/<pid>/exe`.
fn process_name(pid: u32) -> Option<String> {
    let from_cmdline = fs::read(format!("/proc/{}/cmdline", pid)).ok().and_then(|raw| {
        let argv0 = raw.split(|b| *b == 0).next()?;
        let argv0 = String::from_utf8_lossy(argv0);
        let name = argv0.rsplit(['/', '\\']).next()?.trim().to_string();
        (!name.is_empty()).then_some(name)
    });

    from_cmdline.or_else(|| {
        fs::read_link(format!("/proc/{}/exe", pid))
            .ok()
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
    })
}

/// ELF class byte of an executable, `None` if it is not an ELF image.
fn elf_class(path: &Path) -> Option<u8> {
    let mut header = [0u8; 5];
    let read = fs::File::open(path).and_then(|mut file| file.read_exact(&mut header));
    if let Err(e) = read {
        debug!("Cannot inspect {}: {}", path.display(), e);
        return None;
    }
    (header[..4] == ELF_MAGIC).then_some(header[4])
}

/// Collapse file mappings into one module per backing file.
fn parse_maps(maps: &str) -> Vec<Module> {
    // path -> (base, end, base found at file offset 0)
    let mut images: BTreeMap<PathBuf, (u64, u64, bool)> = BTreeMap::new();

    for line in maps.lines() {
        let mut fields = line.split_whitespace();
        let (Some(range), Some(_perms), Some(offset), Some(_dev), Some(_inode)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            continue;
        };
        let path = fields.collect::<Vec<_>>().join(" ");
        if !path.starts_with('/') {
            continue;
        }

        let Some((start, end)) = range.split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end), Ok(offset)) = (
            u64::from_str_radix(start, 16),
            u64::from_str_radix(end, 16),
            u64::from_str_radix(offset, 16),
        ) else {
            trace!("Skipping malformed maps line: {}", line);
            continue;
        };

        let image = images
            .entry(PathBuf::from(path))
            .or_insert((start, end, offset == 0));
        if offset == 0 && (!image.2 || start < image.0) {
            image.0 = start;
            image.2 = true;
        } else if !image.2 && start < image.0 {
            image.0 = start;
        }
        image.1 = image.1.max(end);
    }

    let mut modules: Vec<Module> = images
        .into_iter()
        .filter_map(|(path, (base, end, _))| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            let size = image_size(&path, end - base);
            Some(Module::new(name, path, size, base))
        })
        .collect();
    modules.sort_by_key(Module::base_address);
    modules
}

struct LinuxBackend {
    pid: libc::pid_t,
}

impl LinuxBackend {
    fn transfer_error(&self, address: u64) -> Error {
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EFAULT) | Some(libc::EINVAL) => Error::InvalidAddress(address),
            Some(libc::ESRCH) => Error::ProcessTerminated {
                pid: self.pid as u32,
            },
            Some(libc::EPERM) | Some(libc::EACCES) => Error::PermissionDenied {
                pid: self.pid as u32,
                message: err.to_string(),
            },
            _ => Error::Io(err),
        }
    }
}

impl ProcessBackend for LinuxBackend {
    fn open(&self) -> Result<()> {
        // process_vm_* needs no handle; ptrace permission is checked per call
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_alive(&self) -> bool {
        let Ok(stat) = fs::read_to_string(format!("/proc/{}/stat", self.pid)) else {
            return false;
        };
        // The state field follows the parenthesised command name
        let state = stat
            .rfind(')')
            .and_then(|i| stat[i + 1..].split_whitespace().next());
        !matches!(state, None | Some("Z") | Some("X"))
    }

    fn read(&self, address: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let local = libc::iovec {
            iov_base: buf.as_mut_ptr() as *mut c_void,
            iov_len: buf.len(),
        };
        let remote = libc::iovec {
            iov_base: address as usize as *mut c_void,
            iov_len: buf.len(),
        };

        // SAFETY: `local` points to `buf`, which is valid for `buf.len()` bytes
        // of writes. The remote range is validated by the kernel.
        let count = unsafe { libc::process_vm_readv(self.pid, &local, 1, &remote, 1, 0) };
        if count < 0 {
            return Err(self.transfer_error(address));
        }
        Ok(count as usize)
    }

    fn write(&self, address: u64, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let local = libc::iovec {
            iov_base: data.as_ptr() as *mut c_void,
            iov_len: data.len(),
        };
        let remote = libc::iovec {
            iov_base: address as usize as *mut c_void,
            iov_len: data.len(),
        };

        // SAFETY: `local` points to `data`, which is valid for `data.len()`
        // bytes of reads; process_vm_writev never writes to the local side.
        let count = unsafe { libc::process_vm_writev(self.pid, &local, 1, &remote, 1, 0) };
        if count < 0 {
            return Err(self.transfer_error(address));
        }
        Ok(count as usize)
    }
}
