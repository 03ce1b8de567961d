//! Compressed path prefixes.
//!
//! Every node owns a [`Prefix`]: the run of key bytes shared by all keys
//! below it, stored once instead of one node per byte. Short prefixes
//! live inline in the node; longer ones own a heap buffer.

use crate::common::Result;
use crate::storage::{BlockReader, BlockWriter};

/// Prefixes up to this many bytes are stored inline, without a heap
/// allocation. Crossing the threshold reallocates and copies.
pub const PREFIX_INLINE_SIZE: usize = 8;

/// Serialized prefixes are written in sections of this many bytes; the
/// block writer chains sections across blocks, so per-section storage
/// stays bounded on the append-only backing stream.
pub const PREFIX_SECTION_SIZE: usize = 32;

/// Inline-or-heap storage for the prefix bytes.
#[derive(Clone)]
enum PrefixData {
    Inline([u8; PREFIX_INLINE_SIZE]),
    Heap(Box<[u8]>),
}

/// A compressed shared path of key bytes between a node and its parent.
///
/// Zero-length prefixes are valid and common (nodes with no shared path).
/// The length fits a 32-bit count.
#[derive(Clone)]
pub struct Prefix {
    size: u32,
    data: PrefixData,
}

impl Prefix {
    /// An empty prefix.
    pub fn empty() -> Self {
        Self {
            size: 0,
            data: PrefixData::Inline([0; PREFIX_INLINE_SIZE]),
        }
    }

    /// Build a prefix from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Self {
        assert!(bytes.len() <= u32::MAX as usize, "prefix too long");

        let data = if bytes.len() <= PREFIX_INLINE_SIZE {
            let mut inlined = [0u8; PREFIX_INLINE_SIZE];
            inlined[..bytes.len()].copy_from_slice(bytes);
            PrefixData::Inline(inlined)
        } else {
            PrefixData::Heap(bytes.to_vec().into_boxed_slice())
        };

        Self {
            size: bytes.len() as u32,
            data,
        }
    }

    /// Build a prefix from `len` key bytes starting at `depth`.
    pub fn from_key(key: &[u8], depth: usize, len: usize) -> Self {
        Self::from_slice(&key[depth..depth + len])
    }

    /// Build a prefix from the first `len` bytes of another prefix.
    pub fn from_prefix(other: &Prefix, len: usize) -> Self {
        Self::from_slice(&other.as_slice()[..len])
    }

    /// The prefix length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.size as usize
    }

    /// Whether the prefix is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The prefix bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match &self.data {
            PrefixData::Inline(inlined) => &inlined[..self.size as usize],
            PrefixData::Heap(heap) => &heap[..self.size as usize],
        }
    }

    /// The byte at `idx`.
    ///
    /// # Panics
    /// Panics if `idx >= len()`.
    #[inline]
    pub fn byte(&self, idx: usize) -> u8 {
        self.as_slice()[idx]
    }

    /// Compare the key (from `depth`) with this prefix and return the
    /// position where they mismatch.
    ///
    /// Returns the prefix length if the prefix is a strict sub-match of
    /// the key; if the key runs out inside the prefix, returns the number
    /// of key bytes that matched.
    pub fn key_mismatch_position(&self, key: &[u8], depth: usize) -> usize {
        let bytes = self.as_slice();
        let remaining = key.len().saturating_sub(depth);
        let max = bytes.len().min(remaining);

        for i in 0..max {
            if bytes[i] != key[depth + i] {
                return i;
            }
        }
        max
    }

    /// Compare this prefix to another prefix and return the position where
    /// they mismatch, or `min(len, other.len)` if one is a prefix of the
    /// other.
    pub fn mismatch_position(&self, other: &Prefix) -> usize {
        let a = self.as_slice();
        let b = other.as_slice();
        let max = a.len().min(b.len());

        for i in 0..max {
            if a[i] != b[i] {
                return i;
            }
        }
        max
    }

    /// Strip the first `n` bytes plus the following separator byte, and
    /// return the separator.
    ///
    /// Used when a node is split: the byte at position `n` becomes the
    /// child key under the new branch node, and the remainder becomes the
    /// pushed-down node's prefix.
    ///
    /// # Panics
    /// Panics if `n >= len()`.
    pub fn reduce(&mut self, n: usize) -> u8 {
        let bytes = self.as_slice();
        let separator = bytes[n];
        let remainder = Prefix::from_slice(&bytes[n + 1..]);
        *self = remainder;
        separator
    }

    /// Rebuild this prefix as `other + byte + self`.
    ///
    /// Used when deleting a single-child node: the child absorbs the
    /// deleted parent's prefix and the separator byte that selected it.
    pub fn concatenate(&mut self, byte: u8, other: &Prefix) {
        let mut combined = Vec::with_capacity(other.len() + 1 + self.len());
        combined.extend_from_slice(other.as_slice());
        combined.push(byte);
        combined.extend_from_slice(self.as_slice());
        *self = Prefix::from_slice(&combined);
    }

    /// Write the prefix: length, then raw bytes in fixed-size sections.
    ///
    /// The writer chains sections across blocks, so a long prefix is
    /// reachable from its starting pointer regardless of block boundaries.
    pub fn serialize(&self, writer: &mut BlockWriter<'_>) -> Result<()> {
        writer.write_u32(self.size)?;
        for section in self.as_slice().chunks(PREFIX_SECTION_SIZE) {
            writer.write_bytes(section)?;
        }
        Ok(())
    }

    /// Read a prefix written by [`Prefix::serialize`].
    ///
    /// Reads section by section, so a corrupt length fails fast with
    /// `CorruptIndex` (from the exhausted block chain) instead of
    /// allocating the bogus size up front.
    pub fn deserialize(reader: &mut BlockReader<'_>) -> Result<Self> {
        let size = reader.read_u32()? as usize;

        let mut bytes = Vec::with_capacity(size.min(PREFIX_SECTION_SIZE));
        let mut section = [0u8; PREFIX_SECTION_SIZE];
        let mut remaining = size;
        while remaining > 0 {
            let n = remaining.min(PREFIX_SECTION_SIZE);
            reader.read_bytes(&mut section[..n])?;
            bytes.extend_from_slice(&section[..n]);
            remaining -= n;
        }

        Ok(Prefix::from_slice(&bytes))
    }

    /// Whether the bytes are stored inline (no heap buffer).
    fn is_inlined(&self) -> bool {
        matches!(self.data, PrefixData::Inline(_))
    }
}

impl Default for Prefix {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Prefix {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Prefix {}

impl std::fmt::Debug for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Prefix({:?})", self.as_slice())
    }
}

// ============================================================================
// TESTS
// ============================================================================
