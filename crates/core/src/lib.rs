//! Core emulator primitives and traits.

pub mod logging;

/// A byte-addressed bus as seen by a bus master (CPU or DMA controller).
///
/// Wider accesses are composed from byte accesses in big-endian order, which
/// is how the chips built on top of this trait expect multi-byte values to be
/// laid out in memory.
pub trait MemoryBus {
    fn read_byte(&self, addr: u32) -> u8;
    fn write_byte(&mut self, addr: u32, val: u8);

    fn read_long(&self, addr: u32) -> u32 {
        u32::from_be_bytes([
            self.read_byte(addr),
            self.read_byte(addr.wrapping_add(1)),
            self.read_byte(addr.wrapping_add(2)),
            self.read_byte(addr.wrapping_add(3)),
        ])
    }

    fn write_long(&mut self, addr: u32, val: u32) {
        for (i, byte) in val.to_be_bytes().into_iter().enumerate() {
            self.write_byte(addr.wrapping_add(i as u32), byte);
        }
    }
}

/// Flat RAM image that mirrors every `len` bytes.
///
/// `len` must be a power of two so addresses can be masked instead of divided.
#[derive(Debug, Clone)]
pub struct FlatMemory {
    data: Vec<u8>,
    mask: u32,
}

impl FlatMemory {
    pub fn new(len: usize) -> Self {
        assert!(len.is_power_of_two(), "FlatMemory size must be a power of two");
        Self {
            data: vec![0; len],
            mask: (len - 1) as u32,
        }
    }

    /// Copy `bytes` into memory starting at `addr`.
    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.write_byte(addr.wrapping_add(i as u32), b);
        }
    }

    /// Read `len` bytes starting at `addr`.
    pub fn slice(&self, addr: u32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.read_byte(addr.wrapping_add(i as u32)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl MemoryBus for FlatMemory {
    fn read_byte(&self, addr: u32) -> u8 {
        self.data[(addr & self.mask) as usize]
    }

    fn write_byte(&mut self, addr: u32, val: u8) {
        self.data[(addr & self.mask) as usize] = val;
    }
}
