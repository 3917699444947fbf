//! Flat little-endian data memory.

use super::{EmuResult, Fault, MEMORY_SIZE, NULL_GUARD};

/// Byte-addressed memory covering `0..MEMORY_SIZE`; the first page is
/// unmapped. Alignment is the machine's concern, not the memory's.
#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        Self {
            bytes: vec![0; MEMORY_SIZE as usize],
        }
    }

    #[inline]
    fn range(&self, address: u32, len: u32) -> EmuResult<std::ops::Range<usize>> {
        let end = u64::from(address) + u64::from(len);
        if address < NULL_GUARD || end > self.bytes.len() as u64 {
            return Err(Fault::MemoryFault { address });
        }
        Ok(address as usize..end as usize)
    }

    /// Read `len` (1, 2 or 4) bytes, zero-extended.
    pub fn read(&self, address: u32, len: u32) -> EmuResult<u32> {
        let range = self.range(address, len)?;
        let mut value = 0u32;
        for (shift, byte) in self.bytes[range].iter().enumerate() {
            value |= u32::from(*byte) << (8 * shift);
        }
        Ok(value)
    }

    /// Write the low `len` bytes of `value`.
    pub fn write(&mut self, address: u32, len: u32, value: u32) -> EmuResult<()> {
        let range = self.range(address, len)?;
        for (shift, byte) in self.bytes[range].iter_mut().enumerate() {
            *byte = (value >> (8 * shift)) as u8;
        }
        Ok(())
    }

    #[inline]
    pub fn read_u32(&self, address: u32) -> EmuResult<u32> {
        self.read(address, 4)
    }

    #[inline]
    pub fn write_u32(&mut self, address: u32, value: u32) -> EmuResult<()> {
        self.write(address, 4, value)
    }

    pub fn fill_zero(&mut self, address: u32, len: u32) -> EmuResult<()> {
        let range = self.range(address, len)?;
        self.bytes[range].fill(0);
        Ok(())
    }
}
