//! Block - the fundamental 4KB unit of storage.
//!
//! A [`Block`] is a raw 4KB byte array that serves as the unit of I/O
//! between the index file and memory. Every block starts with a
//! [`BlockHeader`]: a CRC32 checksum for integrity and the id of the
//! next block in a chain. Serialized index data is written as a byte
//! stream across chained blocks.

use crate::common::config::BLOCK_SIZE;
use crate::common::BlockId;

/// Metadata stored at the beginning of every block.
///
/// # Layout (8 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     checksum (CRC32, little-endian)
/// 4       4     next block id (little-endian)
/// ```
///
/// # Checksum
/// The checksum is computed over the entire block with the checksum field
/// itself skipped. This allows verification without special handling.
///
/// # Next Block
/// Serialized nodes and prefixes may span blocks; the next-block id chains
/// a block to its continuation. [`BlockId::INVALID`] ends the chain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// CRC32 checksum of the block contents.
    pub checksum: u32,
    /// Next block in the chain, or invalid if this is the last.
    pub next: u32,
}

impl BlockHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 8;

    /// Offset of each field within the header.
    pub const OFFSET_CHECKSUM: usize = 0;
    pub const OFFSET_NEXT: usize = 4;

    /// Read a header from the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < BlockHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for BlockHeader");

        let checksum = u32::from_le_bytes([
            data[Self::OFFSET_CHECKSUM],
            data[Self::OFFSET_CHECKSUM + 1],
            data[Self::OFFSET_CHECKSUM + 2],
            data[Self::OFFSET_CHECKSUM + 3],
        ]);

        let next = u32::from_le_bytes([
            data[Self::OFFSET_NEXT],
            data[Self::OFFSET_NEXT + 1],
            data[Self::OFFSET_NEXT + 2],
            data[Self::OFFSET_NEXT + 3],
        ]);

        Self { checksum, next }
    }

    /// Compute CRC32 checksum of a block.
    ///
    /// The checksum is computed with the checksum field (bytes 0-3)
    /// skipped, so the checksum doesn't include itself.
    pub fn compute_checksum(block_data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&block_data[Self::OFFSET_CHECKSUM + 4..]);
        hasher.finalize()
    }
}

/// A block of data (4KB, 4KB-aligned).
///
/// This is the fundamental unit of I/O between the index file and memory.
///
/// # Memory Layout
/// - Size: 4096 bytes (4KB)
/// - Alignment: 4096 bytes (for efficient Direct I/O with O_DIRECT)
///
/// # Clone Implementation
/// `Block` does NOT implement `Clone` in production code (copying 4KB is
/// expensive and should be explicit). A `#[cfg(test)]` Clone is provided
/// for tests.
#[repr(align(4096))]
pub struct Block {
    data: [u8; BLOCK_SIZE],
}

impl Block {
    /// Create a new zeroed block with no next block.
    #[inline]
    pub fn new() -> Self {
        let mut block = Self {
            data: [0u8; BLOCK_SIZE],
        };
        block.set_next(BlockId::INVALID);
        block
    }

    /// Get immutable slice of block data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of block data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the size of a block.
    #[inline]
    pub const fn size() -> usize {
        BLOCK_SIZE
    }

    /// Read the block header.
    pub fn header(&self) -> BlockHeader {
        BlockHeader::from_bytes(&self.data)
    }

    /// The next block in the chain, or invalid if this is the last.
    pub fn next(&self) -> BlockId {
        BlockId::new(self.header().next)
    }

    /// Set the next block in the chain.
    pub fn set_next(&mut self, next: BlockId) {
        self.data[BlockHeader::OFFSET_NEXT..BlockHeader::OFFSET_NEXT + 4]
            .copy_from_slice(&next.0.to_le_bytes());
    }

    /// Compute and store the checksum in the header.
    ///
    /// Call this after all modifications to the block are complete.
    pub fn update_checksum(&mut self) {
        let checksum = BlockHeader::compute_checksum(&self.data);
        self.data[BlockHeader::OFFSET_CHECKSUM..BlockHeader::OFFSET_CHECKSUM + 4]
            .copy_from_slice(&checksum.to_le_bytes());
    }

    /// Verify the block checksum is valid.
    pub fn verify_checksum(&self) -> bool {
        self.header().checksum == BlockHeader::compute_checksum(&self.data)
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

// Clone only available in tests - forces explicit copying in production
#[cfg(test)]
impl Clone for Block {
    fn clone(&self) -> Self {
        let mut new_block = Block::new();
        new_block.data.copy_from_slice(&self.data);
        new_block
    }
}

// ============================================================================
// TESTS
// ============================================================================
