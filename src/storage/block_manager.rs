//! Block Manager - low-level file I/O for index blocks.
//!
//! The [`BlockManager`] handles all direct file operations:
//! - Reading and writing blocks
//! - Allocating new blocks (append-only)
//! - Managing the index file

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::BLOCK_SIZE;
use crate::common::{BlockId, Error, Result};
use crate::storage::block::Block;

/// Manages disk I/O for a single index file.
///
/// # File Layout
/// The index is stored as a single file with blocks laid out sequentially:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Block 0 │ Block 1 │ Block 2 │  ...    │ Block N │
/// │ (4KB)   │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    N×4096
/// ```
///
/// Block N is located at file offset `N × BLOCK_SIZE`.
///
/// # Append-Only
/// Blocks are allocated at the end of the file and written once by the
/// serialization layer; there is no in-place mutation of persisted index
/// data. Space freed by deleted subtrees is reclaimed by offline
/// compaction, not by this manager.
///
/// # Thread Safety
/// `BlockManager` is **single-threaded**. The owning index wraps it in a
/// mutex and serializes access.
///
/// # Durability
/// All writes are followed by `fsync()` to ensure durability.
pub struct BlockManager {
    file: File,
    /// Number of blocks in the file.
    block_count: u32,
}

impl BlockManager {
    /// Create a new index file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            block_count: 0,
        })
    }

    /// Open an existing index file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        // Calculate block count from file size
        let metadata = file.metadata()?;
        let file_size = metadata.len();
        let block_count = (file_size / BLOCK_SIZE as u64) as u32;

        Ok(Self { file, block_count })
    }

    /// Open an existing index file, or create if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Read a block from disk and verify its checksum.
    ///
    /// # Errors
    /// - `Error::BlockNotFound` if the block doesn't exist
    /// - `Error::CorruptBlock` if the checksum doesn't match
    pub fn read_block(&mut self, block_id: BlockId) -> Result<Block> {
        if !block_id.is_valid() || block_id.0 >= self.block_count {
            return Err(Error::BlockNotFound(block_id.0));
        }

        let offset = (block_id.0 as u64) * (BLOCK_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;

        let mut block = Block::new();
        self.file.read_exact(block.as_mut_slice())?;

        if !block.verify_checksum() {
            return Err(Error::CorruptBlock(block_id.0));
        }

        Ok(block)
    }

    /// Write a block to disk, stamping its checksum first.
    ///
    /// The block must have been previously allocated with
    /// `allocate_block()`.
    ///
    /// # Durability
    /// This method calls `fsync()` after writing to ensure the data is
    /// persisted to disk.
    ///
    /// # Errors
    /// Returns `Error::BlockNotFound` if the block hasn't been allocated.
    pub fn write_block(&mut self, block_id: BlockId, block: &mut Block) -> Result<()> {
        if !block_id.is_valid() || block_id.0 >= self.block_count {
            return Err(Error::BlockNotFound(block_id.0));
        }

        block.update_checksum();

        let offset = (block_id.0 as u64) * (BLOCK_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(block.as_slice())?;
        self.file.sync_all()?; // fsync for durability

        Ok(())
    }

    /// Allocate a new block at the end of the file.
    ///
    /// Returns the `BlockId` of the newly allocated block. The block is
    /// initialized with zeros on disk; its contents are written later by
    /// `write_block`.
    pub fn allocate_block(&mut self) -> Result<BlockId> {
        let block_id = BlockId::new(self.block_count);

        // Extend file with a zeroed block
        let offset = (block_id.0 as u64) * (BLOCK_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;

        let zeros = [0u8; BLOCK_SIZE];
        self.file.write_all(&zeros)?;
        self.file.sync_all()?;

        self.block_count += 1;
        Ok(block_id)
    }

    /// Get the number of blocks in the index file.
    #[inline]
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Get the total size of the index file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.block_count as u64) * (BLOCK_SIZE as u64)
    }
}
