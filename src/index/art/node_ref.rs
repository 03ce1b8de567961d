//! Tagged node references with swizzling.
//!
//! A [`NodeRef`] is "where is this child": nothing, a live in-memory
//! node, or a not-yet-loaded coordinate in the block file. The original
//! design packs this into the spare bits of a pointer; here it is an
//! explicit enum, so ownership and the swizzled/persisted state are
//! visible in the type.
//!
//! Resolving rewrites the reference in place (persisted → live), so the
//! upgrade is observable through the parent's `&mut` borrow without the
//! parent replacing the reference itself. Persisting is the reverse
//! transition and discards the live node.

use crate::common::{BlockPointer, Error, Result};
use crate::index::art::node::Node;
use crate::storage::{BlockManager, BlockReader, BlockWriter};

/// A reference to a child node: empty, live, or persisted.
///
/// A live reference exclusively owns its node, and through it the whole
/// live subtree; dropping the reference drops the subtree. A persisted
/// reference is a weak coordinate until first resolved.
#[derive(Debug)]
pub enum NodeRef {
    /// No child.
    Empty,
    /// A live node, exclusively owned.
    Mem(Box<Node>),
    /// A persisted node, not yet loaded.
    Disk(BlockPointer),
}

impl NodeRef {
    /// Whether this reference holds no child.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeRef::Empty)
    }

    /// Reconstruct a reference from a persisted child coordinate.
    ///
    /// The invalid coordinate decodes to an empty reference.
    pub fn from_pointer(pointer: BlockPointer) -> NodeRef {
        if pointer.is_valid() {
            NodeRef::Disk(pointer)
        } else {
            NodeRef::Empty
        }
    }

    /// Get the live node, loading it from storage on first access.
    ///
    /// A persisted reference is upgraded in place: the node is
    /// deserialized from its block coordinate and this reference becomes
    /// live. Subsequent resolves are free.
    ///
    /// # Errors
    /// - `CorruptIndex` if the reference is empty, or the stored bytes do
    ///   not decode into a valid node
    /// - `CorruptBlock` / `BlockNotFound` / `Io` from the block store
    pub fn resolve<'n>(&'n mut self, store: &mut BlockManager) -> Result<&'n mut Node> {
        if let NodeRef::Disk(pointer) = *self {
            let mut reader = BlockReader::new(store, pointer)?;
            let node = Node::deserialize(&mut reader)?;
            *self = NodeRef::Mem(Box::new(node));
        }

        match self {
            NodeRef::Mem(node) => Ok(node),
            NodeRef::Empty => Err(Error::CorruptIndex(
                "resolved an empty node reference".to_string(),
            )),
            NodeRef::Disk(_) => unreachable!("just swizzled"),
        }
    }

    /// Persist this subtree and return its coordinate.
    ///
    /// An empty reference persists as the invalid coordinate ("no
    /// child"); an already-persisted reference returns its existing
    /// coordinate; a live reference serializes its node — children
    /// first, depth-first — and is rewritten to the persisted state,
    /// discarding the live node.
    pub fn persist(&mut self, writer: &mut BlockWriter<'_>) -> Result<BlockPointer> {
        match self {
            NodeRef::Empty => Ok(BlockPointer::INVALID),
            NodeRef::Disk(pointer) => Ok(*pointer),
            NodeRef::Mem(node) => {
                let pointer = node.serialize(writer)?;
                *self = NodeRef::Disk(pointer);
                Ok(pointer)
            }
        }
    }
}

impl From<Node> for NodeRef {
    fn from(node: Node) -> Self {
        NodeRef::Mem(Box::new(node))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BlockId, RowId};
    use tempfile::tempdir;

    fn create_store() -> (BlockManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.idx");
        (BlockManager::create(&path).unwrap(), dir)
    }

    #[test]
    fn test_from_pointer() {
        assert!(NodeRef::from_pointer(BlockPointer::INVALID).is_empty());

        let ptr = BlockPointer::new(BlockId::new(1), 64);
        match NodeRef::from_pointer(ptr) {
            NodeRef::Disk(p) => assert_eq!(p, ptr),
            _ => panic!("Expected Disk reference"),
        }
    }

    #[test]
    fn test_resolve_empty_fails() {
        let (mut store, _dir) = create_store();
        let mut node_ref = NodeRef::Empty;

        match node_ref.resolve(&mut store) {
            Err(Error::CorruptIndex(_)) => {}
            _ => panic!("Expected CorruptIndex"),
        }
    }

    #[test]
    fn test_persist_empty_is_invalid_pointer() {
        let (mut store, _dir) = create_store();
        let mut writer = BlockWriter::new(&mut store).unwrap();

        let mut node_ref = NodeRef::Empty;
        let ptr = node_ref.persist(&mut writer).unwrap();
        assert!(!ptr.is_valid());
        assert!(node_ref.is_empty());
    }

    #[test]
    fn test_persist_then_resolve_roundtrip() {
        let (mut store, _dir) = create_store();

        let mut node_ref = NodeRef::from(Node::new_leaf(b"suffix", 0, RowId::new(99)));

        let ptr = {
            let mut writer = BlockWriter::new(&mut store).unwrap();
            let ptr = node_ref.persist(&mut writer).unwrap();
            writer.finish().unwrap();
            ptr
        };
        assert!(ptr.is_valid());

        // The live node was discarded on persist
        assert!(matches!(node_ref, NodeRef::Disk(p) if p == ptr));

        // Resolving swizzles in place
        {
            let node = node_ref.resolve(&mut store).unwrap();
            match node {
                Node::Leaf(leaf) => {
                    assert_eq!(leaf.prefix.as_slice(), b"suffix");
                    assert_eq!(leaf.row_id, RowId::new(99));
                }
                _ => panic!("Expected leaf"),
            }
        }
        assert!(matches!(node_ref, NodeRef::Mem(_)));
    }

    #[test]
    fn test_persist_already_persisted_returns_same_pointer() {
        let (mut store, _dir) = create_store();

        let mut node_ref = NodeRef::from(Node::new_leaf(b"k", 0, RowId::new(1)));

        let mut writer = BlockWriter::new(&mut store).unwrap();
        let first = node_ref.persist(&mut writer).unwrap();
        let second = node_ref.persist(&mut writer).unwrap();
        writer.finish().unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_garbage_fails() {
        let (mut store, _dir) = create_store();

        let ptr = {
            let mut writer = BlockWriter::new(&mut store).unwrap();
            let ptr = writer.block_pointer();
            writer.write_u8(250).unwrap(); // not a node type tag
            writer.finish().unwrap();
            ptr
        };

        let mut node_ref = NodeRef::Disk(ptr);
        match node_ref.resolve(&mut store) {
            Err(Error::CorruptIndex(msg)) => assert!(msg.contains("node type")),
            _ => panic!("Expected CorruptIndex"),
        }
    }
}
