//! In-memory process backend for tests.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::{
    Bitness, Module, Process, ProcessBackend, ProcessEntry, ProcessInfo, ProcessProvider,
};
use crate::error::{Error, Result};

/// Sparse memory image shared between a test and its mock process.
pub struct MockMemory {
    regions: RwLock<BTreeMap<u64, Vec<u8>>>,
    alive: AtomicBool,
    /// Cap on bytes per transfer, `usize::MAX` when unlimited
    transfer_limit: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MockMemory {
    pub fn new() -> Self {
        Self {
            regions: RwLock::new(BTreeMap::new()),
            alive: AtomicBool::new(true),
            transfer_limit: AtomicUsize::new(usize::MAX),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Map a region, replacing any region starting at the same address.
    pub fn map(&self, address: u64, data: Vec<u8>) {
        self.regions.write().insert(address, data);
    }

    /// Write into mapped memory, mapping a fresh region if nothing covers it.
    pub fn write(&self, address: u64, data: &[u8]) {
        let mut regions = self.regions.write();
        if let Some((start, region)) = regions.range_mut(..=address).next_back() {
            let offset = (address - start) as usize;
            if offset + data.len() <= region.len() {
                region[offset..offset + data.len()].copy_from_slice(data);
                return;
            }
        }
        regions.insert(address, data.to_vec());
    }

    pub fn read(&self, address: u64, len: usize) -> Option<Vec<u8>> {
        let regions = self.regions.read();
        let (start, region) = regions.range(..=address).next_back()?;
        let offset = (address - start) as usize;
        region.get(offset..offset + len).map(<[u8]>::to_vec)
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Make every subsequent transfer stop after `bytes` bytes.
    pub fn limit_transfers(&self, bytes: usize) {
        self.transfer_limit.store(bytes, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn transfer<F>(&self, address: u64, len: usize, mut copy: F) -> Result<usize>
    where
        F: FnMut(&mut Vec<u8>, usize, usize),
    {
        let mut regions = self.regions.write();
        let (start, region) = regions
            .range_mut(..=address)
            .next_back()
            .ok_or(Error::InvalidAddress(address))?;

        let offset = (address - start) as usize;
        if offset >= region.len() {
            return Err(Error::InvalidAddress(address));
        }

        let available = (region.len() - offset)
            .min(len)
            .min(self.transfer_limit.load(Ordering::SeqCst));
        copy(region, offset, available);
        Ok(available)
    }
}

impl Default for MockMemory {
    fn default() -> Self {
        Self::new()
    }
}

struct MockBackend {
    memory: Arc<MockMemory>,
}

impl ProcessBackend for MockBackend {
    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.memory.alive.load(Ordering::SeqCst)
    }

    fn read(&self, address: u64, buf: &mut [u8]) -> Result<usize> {
        self.memory.reads.fetch_add(1, Ordering::SeqCst);
        self.memory.transfer(address, buf.len(), |region, offset, count| {
            buf[..count].copy_from_slice(&region[offset..offset + count]);
        })
    }

    fn write(&self, address: u64, data: &[u8]) -> Result<usize> {
        self.memory.writes.fetch_add(1, Ordering::SeqCst);
        self.memory.transfer(address, data.len(), |region, offset, count| {
            region[offset..offset + count].copy_from_slice(&data[..count]);
        })
    }
}

/// Builds a [`Process`] backed by [`MockMemory`].
///
/// Clones share the same memory, so a [`MockProvider`] can attach to the
/// same fake process several times.
#[derive(Clone)]
pub struct MockProcessBuilder {
    pid: u32,
    name: String,
    executable_size: u64,
    bitness: Bitness,
    modules: Vec<Module>,
    memory: Arc<MockMemory>,
}

impl MockProcessBuilder {
    pub fn new(pid: u32, name: &str) -> Self {
        Self {
            pid,
            name: name.to_string(),
            executable_size: 0,
            bitness: Bitness::Bits32,
            modules: Vec::new(),
            memory: Arc::new(MockMemory::new()),
        }
    }

    pub fn bitness(mut self, bitness: Bitness) -> Self {
        self.bitness = bitness;
        self
    }

    pub fn executable_size(mut self, size: u64) -> Self {
        self.executable_size = size;
        self
    }

    /// Add a module and map `size` zeroed bytes at its base.
    pub fn module(mut self, name: &str, base: u64, size: u64) -> Self {
        self.memory.map(base, vec![0; size as usize]);
        self.modules.push(Module::new(
            name,
            PathBuf::from(format!("C:/Games/{}", name)),
            size,
            base,
        ));
        self
    }

    pub fn map(self, address: u64, data: Vec<u8>) -> Self {
        self.memory.map(address, data);
        self
    }

    pub fn memory(&self) -> Arc<MockMemory> {
        Arc::clone(&self.memory)
    }

    pub fn entry(&self) -> ProcessEntry {
        ProcessEntry {
            pid: self.pid,
            name: self.name.clone(),
        }
    }

    pub fn build(self) -> (Process, Arc<MockMemory>) {
        let info = ProcessInfo {
            pid: self.pid,
            name: self.name.clone(),
            executable_path: PathBuf::from(format!("C:/Games/{}", self.name)),
            executable_size: self.executable_size,
        };
        let backend = MockBackend {
            memory: Arc::clone(&self.memory),
        };
        let process = Process::new(info, self.bitness, self.modules, Box::new(backend));
        (process, self.memory)
    }

    pub fn build_open(self) -> (Process, Arc<MockMemory>) {
        let (process, memory) = self.build();
        process.open().expect("mock process opens");
        (process, memory)
    }
}

/// A fake process list.
#[derive(Clone, Default)]
pub struct MockProvider {
    processes: Vec<MockProcessBuilder>,
    denied: HashSet<u32>,
    attach_count: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, process: MockProcessBuilder) -> Self {
        self.processes.push(process);
        self
    }

    /// Attaching to `pid` fails with a permission error.
    pub fn deny(mut self, pid: u32) -> Self {
        self.denied.insert(pid);
        self
    }

    pub fn remove(&mut self, pid: u32) {
        self.processes.retain(|p| p.pid != pid);
    }

    pub fn attach_count(&self) -> usize {
        self.attach_count.load(Ordering::SeqCst)
    }
}

impl ProcessProvider for MockProvider {
    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        Ok(self.processes.iter().map(MockProcessBuilder::entry).collect())
    }

    fn attach(&self, entry: &ProcessEntry) -> Result<Process> {
        if self.denied.contains(&entry.pid) {
            return Err(Error::PermissionDenied {
                pid: entry.pid,
                message: "access is denied".to_string(),
            });
        }

        let builder = self
            .processes
            .iter()
            .find(|p| p.pid == entry.pid)
            .ok_or_else(|| Error::AttachFailed {
                pid: entry.pid,
                message: "no such process".to_string(),
            })?;
        self.attach_count.fetch_add(1, Ordering::SeqCst);
        Ok(builder.clone().build().0)
    }
}
