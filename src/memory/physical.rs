//! Flat physical memory — a single byte array indexed by frame-relative
//! physical address.

use crate::error::SystemCode;

/// Fixed-size physical memory, addressed `[0..capacity)`.
#[derive(Debug)]
pub struct PhysicalMemory {
    bytes: Vec<u8>,
}

impl PhysicalMemory {
    /// Allocate a zeroed physical memory of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        PhysicalMemory {
            bytes: vec![0u8; capacity],
        }
    }

    /// Total capacity in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Read a single byte at `addr`.
    pub fn read_byte(&self, addr: usize) -> Result<u8, SystemCode> {
        self.bytes.get(addr).copied().ok_or(SystemCode::OutOfBounds)
    }

    /// Write a single byte at `addr`.
    pub fn write_byte(&mut self, addr: usize, value: u8) -> Result<(), SystemCode> {
        let slot = self.bytes.get_mut(addr).ok_or(SystemCode::OutOfBounds)?;
        *slot = value;
        Ok(())
    }

    /// Read `len` contiguous bytes starting at `addr`.
    pub fn read_slice(&self, addr: usize, len: usize) -> Result<&[u8], SystemCode> {
        self.bytes
            .get(addr..addr + len)
            .ok_or(SystemCode::OutOfBounds)
    }

    /// Copy `data` into physical memory starting at `addr`.
    pub fn write_slice(&mut self, addr: usize, data: &[u8]) -> Result<(), SystemCode> {
        let dest = self
            .bytes
            .get_mut(addr..addr + data.len())
            .ok_or(SystemCode::OutOfBounds)?;
        dest.copy_from_slice(data);
        Ok(())
    }

    /// A full hex dump, the source of `coredump`'s `memory.txt`.
    pub fn hex_dump(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::with_capacity(self.bytes.len() * 3);
        for (i, chunk) in self.bytes.chunks(16).enumerate() {
            let _ = write!(out, "{:08x}: ", i * 16);
            for byte in chunk {
                let _ = write!(out, "{:02x} ", byte);
            }
            out.push('\n');
        }
        out
    }
}
