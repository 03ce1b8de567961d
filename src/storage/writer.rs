//! Sequential block writer for index serialization.
//!
//! The [`BlockWriter`] turns the block file into an append-only byte
//! stream. It buffers one block at a time; when the block fills, the
//! writer allocates a fresh block, stamps the continuation id into the
//! finished block's header, flushes it, and keeps writing. A value that
//! spans blocks is reachable from its starting [`BlockPointer`] by
//! following the chain.

use crate::common::config::BLOCK_SIZE;
use crate::common::{BlockId, BlockPointer, Result};
use crate::storage::block::{Block, BlockHeader};
use crate::storage::BlockManager;

/// Append-only writer over chained blocks.
///
/// # Usage
/// ```ignore
/// let mut writer = BlockWriter::new(&mut block_manager)?;
/// let position = writer.block_pointer(); // remember where a value starts
/// writer.write_u32(42)?;
/// writer.write_bytes(b"payload")?;
/// writer.finish()?;                      // flush the trailing block
/// ```
///
/// Dropping the writer without `finish()` loses the buffered tail block;
/// callers persist through a single writer session and finish it.
pub struct BlockWriter<'a> {
    store: &'a mut BlockManager,
    /// Block currently being filled.
    block: Block,
    /// Id of the buffered block.
    block_id: BlockId,
    /// Write position within the buffered block.
    offset: usize,
}

impl<'a> BlockWriter<'a> {
    /// Start a new writer session, allocating the first block.
    pub fn new(store: &'a mut BlockManager) -> Result<Self> {
        let block_id = store.allocate_block()?;
        Ok(Self {
            store,
            block: Block::new(),
            block_id,
            offset: BlockHeader::SIZE,
        })
    }

    /// The position the next byte will be written to.
    ///
    /// A pointer taken at the very end of a full block is still valid:
    /// the reader follows the chain before reading.
    #[inline]
    pub fn block_pointer(&self) -> BlockPointer {
        BlockPointer::new(self.block_id, self.offset as u32)
    }

    /// Append raw bytes, chaining into fresh blocks as needed.
    pub fn write_bytes(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let space = BLOCK_SIZE - self.offset;
            if space == 0 {
                self.advance_block()?;
                continue;
            }

            let n = space.min(data.len());
            self.block.as_mut_slice()[self.offset..self.offset + n]
                .copy_from_slice(&data[..n]);
            self.offset += n;
            data = &data[n..];
        }
        Ok(())
    }

    /// Append a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    /// Append a little-endian u16.
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Append a little-endian u32.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Append a little-endian u64.
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Flush the trailing block and end the session.
    pub fn finish(mut self) -> Result<()> {
        self.block.set_next(BlockId::INVALID);
        self.store.write_block(self.block_id, &mut self.block)?;
        Ok(())
    }

    /// Allocate the continuation block, stamp it into the full block's
    /// header, and flush the full block.
    fn advance_block(&mut self) -> Result<()> {
        let next_id = self.store.allocate_block()?;
        self.block.set_next(next_id);
        self.store.write_block(self.block_id, &mut self.block)?;

        self.block = Block::new();
        self.block_id = next_id;
        self.offset = BlockHeader::SIZE;
        Ok(())
    }
}
