//! Positional block reader for index deserialization.
//!
//! The [`BlockReader`] is the read-side counterpart of
//! [`BlockWriter`](crate::storage::BlockWriter): it seeks to a
//! [`BlockPointer`] and reads a byte stream, transparently following the
//! next-block chain at block boundaries.

use crate::common::config::BLOCK_SIZE;
use crate::common::{BlockPointer, Error, Result};
use crate::storage::block::{Block, BlockHeader};
use crate::storage::BlockManager;

/// Reader over chained blocks, positioned by a [`BlockPointer`].
pub struct BlockReader<'a> {
    store: &'a mut BlockManager,
    /// Block currently being read.
    block: Block,
    /// Read position within the current block.
    offset: usize,
}

impl<'a> BlockReader<'a> {
    /// Open a reader at the given position.
    ///
    /// A pointer at the exact end of a block is valid; the first read
    /// follows the chain.
    ///
    /// # Errors
    /// - `Error::BlockNotFound` / `Error::CorruptBlock` from the store
    /// - `Error::CorruptIndex` if the offset is out of bounds
    pub fn new(store: &'a mut BlockManager, ptr: BlockPointer) -> Result<Self> {
        let offset = ptr.offset as usize;
        if offset < BlockHeader::SIZE || offset > BLOCK_SIZE {
            return Err(Error::CorruptIndex(format!(
                "block pointer offset {} out of bounds",
                offset
            )));
        }

        let block = store.read_block(ptr.block)?;
        Ok(Self {
            store,
            block,
            offset,
        })
    }

    /// Read exactly `buf.len()` bytes, following the chain as needed.
    ///
    /// # Errors
    /// `Error::CorruptIndex` if the chain ends before the value does.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.offset == BLOCK_SIZE {
                self.follow_chain()?;
            }

            let available = BLOCK_SIZE - self.offset;
            let n = available.min(buf.len() - filled);
            buf[filled..filled + n]
                .copy_from_slice(&self.block.as_slice()[self.offset..self.offset + n]);
            self.offset += n;
            filled += n;
        }
        Ok(())
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    /// Read a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Load the continuation block.
    fn follow_chain(&mut self) -> Result<()> {
        let next = self.block.next();
        if !next.is_valid() {
            return Err(Error::CorruptIndex(
                "unexpected end of block chain".to_string(),
            ));
        }

        self.block = self.store.read_block(next)?;
        self.offset = BlockHeader::SIZE;
        Ok(())
    }
}
