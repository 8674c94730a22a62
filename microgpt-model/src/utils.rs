use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use std::fs::File;
use std::io::Cursor;

/// Sequential cursor over a memory-mapped checkpoint file.
///
/// Every read is bounds-checked against the mapping; parameter tensors are
/// copied out into owned buffers, so the mapping only needs to live for the
/// duration of loading.
#[derive(Debug)]
pub(crate) struct MemoryMapper {
    mmap: Mmap,
    offset: usize,
}

impl MemoryMapper {
    pub fn new(file: File) -> Result<Self> {
        let mmap = unsafe {
            memmap2::MmapOptions::new()
                .map(&file)
                .context("Failed to create memory mapping")?
        };
        Ok(Self { mmap, offset: 0 })
    }

    pub fn get_bytes(&mut self, count: usize) -> Result<&[u8]> {
        if self.offset + count > self.mmap.len() {
            anyhow::bail!(
                "Insufficient data: need {} bytes, have {} remaining",
                count,
                self.mmap.len() - self.offset
            );
        }

        let result = &self.mmap[self.offset..self.offset + count];
        self.offset += count;
        Ok(result)
    }

    /// Reads `count` little-endian f32 values into an owned buffer.
    pub fn read_f32_vec(&mut self, count: usize) -> Result<Vec<f32>> {
        let bytes = self.get_bytes(count * std::mem::size_of::<f32>())?;
        let mut values = vec![0.0f32; count];
        Cursor::new(bytes)
            .read_f32_into::<LittleEndian>(&mut values)
            .context("Failed to decode f32 values")?;
        Ok(values)
    }
}
