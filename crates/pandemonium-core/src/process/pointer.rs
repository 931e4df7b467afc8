use encoding_rs::Encoding;

use super::{ModuleId, Process};
use crate::error::{Error, Result};

/// A typed view into another process's memory.
///
/// Stores only plain data: the owning process id, the module it was derived
/// from, a base address, and the offset chain. The chain never changes after
/// construction; [`relative`](Pointer::relative), [`resolve`](Pointer::resolve)
/// and [`read_pointer`](Pointer::read_pointer) produce new pointers.
///
/// Every accessor takes an `extra` byte offset applied to the resolved
/// address, so one pointer can serve several neighbouring fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pointer {
    pid: u32,
    module: ModuleId,
    base_address: u64,
    offsets: Vec<u64>,
}

macro_rules! primitive_accessors {
    ($($read:ident, $write:ident => $ty:ty;)*) => {
        $(
            pub fn $read(&self, process: &Process, extra: u64) -> Result<$ty> {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                self.read_into(process, extra, &mut buf)?;
                Ok(<$ty>::from_le_bytes(buf))
            }

            pub fn $write(&self, process: &Process, extra: u64, value: $ty) -> Result<()> {
                self.write_bytes(process, extra, &value.to_le_bytes())
            }
        )*
    };
}

impl Pointer {
    pub(crate) fn new(pid: u32, module: ModuleId, base_address: u64, offsets: Vec<u64>) -> Self {
        Self {
            pid,
            module,
            base_address,
            offsets,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// True when resolving dereferences at least one intermediate pointer.
    pub fn is_deep(&self) -> bool {
        self.offsets.len() > 1
    }

    /// Same chain with the final offset shifted by `delta`.
    pub fn relative(&self, delta: i64) -> Pointer {
        let mut offsets = self.offsets.clone();
        match offsets.last_mut() {
            Some(last) => *last = last.wrapping_add_signed(delta),
            None => offsets.push(0u64.wrapping_add_signed(delta)),
        }
        Pointer::new(self.pid, self.module, self.base_address, offsets)
    }

    /// Compute the final address.
    ///
    /// Starts at `base + offsets[0]`. For each further offset, a pointer-sized
    /// value is read at the current address and the offset is added to it.
    /// `extra` is added last.
    pub fn address(&self, process: &Process, extra: u64) -> Result<u64> {
        self.check_owner(process)?;

        let first = self.offsets.first().copied().unwrap_or(0);
        let mut address = process.offset_address(self.base_address, first)?;
        for offset in self.offsets.iter().skip(1) {
            let next = process.read_address(address)?;
            address = process.offset_address(next, *offset)?;
        }

        process.offset_address(address, extra)
    }

    /// Direct pointer to the address this pointer currently resolves to.
    pub fn resolve(&self, process: &Process, extra: u64) -> Result<Pointer> {
        let address = self.address(process, extra)?;
        Ok(Pointer::new(self.pid, self.module, address, vec![0]))
    }

    /// Direct pointer to the address stored at the target.
    pub fn read_pointer(&self, process: &Process, extra: u64) -> Result<Pointer> {
        let address = self.address(process, extra)?;
        let target = process.read_address(address)?;
        Ok(Pointer::new(self.pid, self.module, target, vec![0]))
    }

    /// Whether `len` bytes can currently be read at the target.
    pub fn is_readable(&self, process: &Process, len: usize) -> bool {
        self.read_bytes(process, 0, len).is_ok()
    }

    pub fn read_into(&self, process: &Process, extra: u64, buf: &mut [u8]) -> Result<()> {
        let address = self.address(process, extra)?;
        process.read_memory(address, buf)
    }

    pub fn read_bytes(&self, process: &Process, extra: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(process, extra, &mut buf)?;
        Ok(buf)
    }

    pub fn write_bytes(&self, process: &Process, extra: u64, data: &[u8]) -> Result<()> {
        let address = self.address(process, extra)?;
        process.write_memory(address, data)
    }

    primitive_accessors! {
        read_i8, write_i8 => i8;
        read_i16, write_i16 => i16;
        read_i32, write_i32 => i32;
        read_i64, write_i64 => i64;
        read_f32, write_f32 => f32;
        read_f64, write_f64 => f64;
    }

    pub fn read_u8(&self, process: &Process, extra: u64) -> Result<u8> {
        self.read_i8(process, extra).map(|v| v as u8)
    }

    pub fn read_u16(&self, process: &Process, extra: u64) -> Result<u16> {
        self.read_i16(process, extra).map(|v| v as u16)
    }

    pub fn read_u32(&self, process: &Process, extra: u64) -> Result<u32> {
        self.read_i32(process, extra).map(|v| v as u32)
    }

    pub fn read_u64(&self, process: &Process, extra: u64) -> Result<u64> {
        self.read_i64(process, extra).map(|v| v as u64)
    }

    pub fn write_u8(&self, process: &Process, extra: u64, value: u8) -> Result<()> {
        self.write_i8(process, extra, value as i8)
    }

    pub fn write_u16(&self, process: &Process, extra: u64, value: u16) -> Result<()> {
        self.write_i16(process, extra, value as i16)
    }

    pub fn write_u32(&self, process: &Process, extra: u64, value: u32) -> Result<()> {
        self.write_i32(process, extra, value as i32)
    }

    pub fn write_u64(&self, process: &Process, extra: u64, value: u64) -> Result<()> {
        self.write_i64(process, extra, value as i64)
    }

    /// Read up to `max_len` bytes and decode up to the first NUL as UTF-8.
    pub fn read_string(&self, process: &Process, extra: u64, max_len: usize) -> Result<String> {
        self.read_string_with(process, extra, max_len, encoding_rs::UTF_8)
    }

    /// Like [`read_string`](Pointer::read_string) with an explicit encoding,
    /// e.g. `encoding_rs::WINDOWS_1252` for legacy game text.
    pub fn read_string_with(
        &self,
        process: &Process,
        extra: u64,
        max_len: usize,
        encoding: &'static Encoding,
    ) -> Result<String> {
        let bytes = self.read_bytes(process, extra, max_len)?;
        let end = memchr::memchr(0, &bytes).unwrap_or(bytes.len());
        let (text, _) = encoding.decode_without_bom_handling(&bytes[..end]);
        Ok(text.into_owned())
    }

    /// Decode exactly `len` bytes, trimming trailing NUL padding.
    pub fn read_fixed_string(&self, process: &Process, extra: u64, len: usize) -> Result<String> {
        let bytes = self.read_bytes(process, extra, len)?;
        let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Write `value` as UTF-8 followed by a NUL terminator. The terminated
    /// string must fit into `max_len` bytes.
    pub fn write_string(&self, process: &Process, extra: u64, value: &str, max_len: usize) -> Result<()> {
        if value.len() + 1 > max_len {
            return Err(Error::InvalidConfig(format!(
                "string of {} bytes does not fit into {} bytes",
                value.len(),
                max_len
            )));
        }

        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        self.write_bytes(process, extra, &data)
    }

    /// Read a fixed-layout record.
    pub fn read_struct<T: bytemuck::Pod>(&self, process: &Process, extra: u64) -> Result<T> {
        let mut value = T::zeroed();
        self.read_into(process, extra, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    pub fn write_struct<T: bytemuck::Pod>(&self, process: &Process, extra: u64, value: &T) -> Result<()> {
        self.write_bytes(process, extra, bytemuck::bytes_of(value))
    }

    fn check_owner(&self, process: &Process) -> Result<()> {
        if self.pid != process.pid() {
            return Err(Error::ForeignPointer {
                expected: self.pid,
                actual: process.pid(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::process::{Bitness, MockProcessBuilder};

    const BASE: u64 = 0x0040_0000;

    #[test]
    fn test_single_offset_is_direct() {
        let (process, _memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", BASE, 0x1000)
            .build_open();

        let pointer = process.pointer("game.exe", 0x10, &[]).unwrap();
        assert!(!pointer.is_deep());
        assert_eq!(pointer.address(&process, 0).unwrap(), BASE + 0x10);

        let deep = process.pointer("game.exe", 0x10, &[0x4]).unwrap();
        assert!(deep.is_deep());
    }

    #[test]
    fn test_deep_resolution_64_bit() {
        let (process, memory) = MockProcessBuilder::new(1, "game.exe")
            .bitness(Bitness::Bits64)
            .module("game.exe", BASE, 0x1000)
            .map(0x7FF0_0000_0000, vec![0; 0x100])
            .build_open();
        memory.write(BASE + 0x20, &0x7FF0_0000_0000u64.to_le_bytes());
        memory.write(0x7FF0_0000_0000 + 0x18, &1234i32.to_le_bytes());

        let pointer = process.pointer("game.exe", 0x20, &[0x18]).unwrap();
        assert_eq!(pointer.address(&process, 0).unwrap(), 0x7FF0_0000_0018);
        assert_eq!(pointer.read_i32(&process, 0).unwrap(), 1234);
    }

    #[test]
    fn test_deep_resolution_32_bit_reads_four_bytes() {
        let (process, memory) = MockProcessBuilder::new(1, "game.exe")
            .bitness(Bitness::Bits32)
            .module("game.exe", BASE, 0x1000)
            .map(0x0200_0000, vec![0; 0x100])
            .build_open();
        // Garbage after the 4-byte pointer must not leak into the address
        memory.write(BASE + 0x20, &[0x00, 0x00, 0x00, 0x02, 0xAA, 0xBB, 0xCC, 0xDD]);
        memory.write(0x0200_0000 + 0x8, &[0x7F]);

        let pointer = process.pointer("game.exe", 0x20, &[0x8]).unwrap();
        assert_eq!(pointer.address(&process, 0).unwrap(), 0x0200_0008);
        assert_eq!(pointer.read_u8(&process, 0).unwrap(), 0x7F);
    }

    #[test]
    fn test_three_hop_chain() {
        let (process, memory) = MockProcessBuilder::new(1, "game.exe")
            .bitness(Bitness::Bits32)
            .module("game.exe", BASE, 0x1000)
            .map(0x0100_0000, vec![0; 0x100])
            .map(0x0200_0000, vec![0; 0x200])
            .build_open();
        memory.write(BASE + 0x4, &0x0100_0000u32.to_le_bytes());
        memory.write(0x0100_0000 + 0x14, &0x0200_0000u32.to_le_bytes());
        memory.write(0x0200_0000 + 0x140, &[42]);

        let praxis = process.pointer("game.exe", 0x4, &[0x14, 0x140]).unwrap();
        assert_eq!(praxis.read_u8(&process, 0).unwrap(), 42);
        assert_eq!(praxis.offsets().len(), 3);
    }

    #[test]
    fn test_extra_offset_and_relative() {
        let (process, memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", BASE, 0x1000)
            .build_open();
        memory.write(BASE + 0x100, &7i32.to_le_bytes());
        memory.write(BASE + 0x104, &9i32.to_le_bytes());

        let pointer = process.pointer("game.exe", 0x100, &[]).unwrap();
        assert_eq!(pointer.read_i32(&process, 4).unwrap(), 9);

        let next = pointer.relative(4);
        assert_eq!(next.read_i32(&process, 0).unwrap(), 9);
        assert_eq!(next.relative(-4).read_i32(&process, 0).unwrap(), 7);
        // The original is untouched
        assert_eq!(pointer.offsets(), &[0x100]);
    }

    #[test]
    fn test_unsigned_reads_reinterpret_signed() {
        let (process, memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", BASE, 0x1000)
            .build_open();
        memory.write(BASE, &[0xFF, 0xFF, 0xFF, 0xFF]);

        let pointer = process.pointer("game.exe", 0, &[]).unwrap();
        assert_eq!(pointer.read_i8(&process, 0).unwrap(), -1);
        assert_eq!(pointer.read_u8(&process, 0).unwrap(), 0xFF);
        assert_eq!(pointer.read_u16(&process, 0).unwrap(), 0xFFFF);
        assert_eq!(pointer.read_u32(&process, 0).unwrap(), u32::MAX);
    }

    #[test]
    fn test_write_then_read_float() {
        let (process, _memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", BASE, 0x1000)
            .build_open();
        let pointer = process.pointer("game.exe", 0x40, &[]).unwrap();

        pointer.write_f32(&process, 0, 0.25).unwrap();
        assert_eq!(pointer.read_f32(&process, 0).unwrap(), 0.25);
        pointer.write_f64(&process, 8, -3.5).unwrap();
        assert_eq!(pointer.read_f64(&process, 8).unwrap(), -3.5);
    }

    #[test]
    fn test_strings() {
        let (process, memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", BASE, 0x1000)
            .build_open();
        memory.write(BASE + 0x200, b"det_city\0garbage");

        let pointer = process.pointer("game.exe", 0x200, &[]).unwrap();
        assert_eq!(pointer.read_string(&process, 0, 16).unwrap(), "det_city");
        assert_eq!(pointer.read_fixed_string(&process, 0, 4).unwrap(), "det_");

        pointer.write_string(&process, 0, "hq", 8).unwrap();
        assert_eq!(pointer.read_string(&process, 0, 16).unwrap(), "hq");
        assert!(pointer.write_string(&process, 0, "too long", 8).is_err());
    }

    #[test]
    fn test_read_string_with_legacy_encoding() {
        let (process, memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", BASE, 0x1000)
            .build_open();
        memory.write(BASE, &[0x43, 0x61, 0x66, 0xE9, 0x00]);

        let pointer = process.pointer("game.exe", 0, &[]).unwrap();
        let text = pointer
            .read_string_with(&process, 0, 8, encoding_rs::WINDOWS_1252)
            .unwrap();
        assert_eq!(text, "Café");
    }

    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Ammo {
        loaded: i32,
        reserve: i32,
    }

    #[test]
    fn test_structured_records() {
        let (process, _memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", BASE, 0x1000)
            .build_open();
        let pointer = process.pointer("game.exe", 0x80, &[]).unwrap();

        let ammo = Ammo {
            loaded: 12,
            reserve: 48,
        };
        pointer.write_struct(&process, 0, &ammo).unwrap();
        assert_eq!(pointer.read_struct::<Ammo>(&process, 0).unwrap(), ammo);
        assert_eq!(pointer.read_i32(&process, 4).unwrap(), 48);
    }

    #[test]
    fn test_unmapped_address_is_address_error() {
        let (process, _memory) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", BASE, 0x1000)
            .build_open();
        let pointer = process.pointer("game.exe", 0x10_0000, &[]).unwrap();

        let err = pointer.read_i32(&process, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Address);
        assert!(!pointer.is_readable(&process, 4));
    }

    #[test]
    fn test_foreign_pointer_is_rejected() {
        let (first, _) = MockProcessBuilder::new(1, "game.exe")
            .module("game.exe", BASE, 0x1000)
            .build_open();
        let (second, _) = MockProcessBuilder::new(2, "game.exe")
            .module("game.exe", BASE, 0x1000)
            .build_open();

        let pointer = first.pointer("game.exe", 0, &[]).unwrap();
        assert!(matches!(
            pointer.read_u8(&second, 0),
            Err(Error::ForeignPointer {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_resolve_and_read_pointer() {
        let (process, memory) = MockProcessBuilder::new(1, "game.exe")
            .bitness(Bitness::Bits32)
            .module("game.exe", BASE, 0x1000)
            .map(0x0300_0000, vec![0; 0x10])
            .build_open();
        memory.write(BASE + 0x8, &0x0300_0000u32.to_le_bytes());
        memory.write(0x0300_0004, &5i32.to_le_bytes());

        let pointer = process.pointer("game.exe", 0x8, &[0x4]).unwrap();
        let direct = pointer.resolve(&process, 0).unwrap();
        assert!(!direct.is_deep());
        assert_eq!(direct.address(&process, 0).unwrap(), 0x0300_0004);

        let slot = process.pointer("game.exe", 0x8, &[]).unwrap();
        let followed = slot.read_pointer(&process, 0).unwrap();
        assert_eq!(followed.read_i32(&process, 4).unwrap(), 5);
    }
}
