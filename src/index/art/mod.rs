//! Adaptive Radix Tree index.
//!
//! The [`Art`] is a secondary index over sorted, opaque byte keys. It
//! supports point lookups, ascending range scans, insertion, deletion,
//! persistence to block storage, and merging two independently built
//! trees.
//!
//! # Structure
//! ```text
//!                Art { root: NodeRef }
//!                         │
//!                 ┌───────┴────────┐
//!                 │ Node4..Node256 │  prefix: compressed shared path
//!                 │  byte → child  │
//!                 └───────┬────────┘
//!            ┌────────────┼─────────────┐
//!          Leaf      NodeRef::Disk     ...
//!       (suffix,     (loaded from
//!        row id)      storage on
//!                     first access)
//! ```
//!
//! Children are [`NodeRef`]s: live nodes or block coordinates, resolved
//! lazily. All tree operations take `&mut self` because resolving
//! rewrites references along the visited path.
//!
//! # Keys
//! Keys are opaque ordered byte sequences produced by the surrounding
//! database's key encoding, which guarantees no key is a proper prefix of
//! another. Where such a collision is observed anyway, operations surface
//! [`Error::DuplicateKey`] instead of guessing a policy.
//!
//! # Concurrency
//! Single-writer: every operation assumes exclusive access to the tree
//! for its duration. Only the shared block store is behind a mutex.

mod merge;
mod node;
mod node_ref;
mod prefix;
mod scan;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{BlockPointer, Error, Result, RowId};
use crate::storage::{BlockManager, BlockWriter};

use node::Node;
use node_ref::NodeRef;
use prefix::Prefix;

pub use scan::RangeScan;

/// An Adaptive Radix Tree mapping encoded keys to row identifiers.
pub struct Art {
    /// Shared handle to the block store; also used by trees this one is
    /// merged with.
    store: Arc<Mutex<BlockManager>>,
    /// The root reference. Operations replace it wholesale or not at
    /// all: a failed operation leaves the previous root valid.
    root: NodeRef,
}

impl Art {
    /// Create an empty tree over the given block store.
    pub fn new(store: Arc<Mutex<BlockManager>>) -> Self {
        Self {
            store,
            root: NodeRef::Empty,
        }
    }

    /// Reattach a tree persisted earlier.
    ///
    /// `root` is the coordinate returned by [`Art::persist`]; the invalid
    /// coordinate reattaches an empty tree. Nothing is read until the
    /// first operation touches the root.
    pub fn open(store: Arc<Mutex<BlockManager>>, root: BlockPointer) -> Self {
        Self {
            store,
            root: NodeRef::from_pointer(root),
        }
    }

    /// Whether the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Look up a key, returning its row id if present.
    pub fn lookup(&mut self, key: &[u8]) -> Result<Option<RowId>> {
        let mut store = self.store.lock();
        lookup_in(&mut self.root, &mut store, key, 0)
    }

    /// Insert a key with its row id.
    ///
    /// # Errors
    /// `DuplicateKey` if the exact key (or a prefix-ambiguous collision)
    /// already exists; the tree is unchanged.
    pub fn insert(&mut self, key: &[u8], row_id: RowId) -> Result<()> {
        assert!(!key.is_empty(), "keys must be non-empty");
        let mut store = self.store.lock();
        insert_into(&mut self.root, &mut store, key, 0, row_id)
    }

    /// Delete a key.
    ///
    /// # Errors
    /// `KeyNotFound` if the key is absent; the tree is unchanged.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let mut store = self.store.lock();
        delete_from(&mut self.root, &mut store, key, 0, true)
    }

    /// Persist the tree and return the root coordinate.
    ///
    /// Serialization walks depth-first, children before parents, through
    /// one append-only writer session. Afterwards the whole tree is in
    /// the persisted state; the next operation transparently resolves the
    /// path it touches.
    ///
    /// An empty tree persists as the invalid coordinate.
    pub fn persist(&mut self) -> Result<BlockPointer> {
        if self.root.is_empty() {
            return Ok(BlockPointer::INVALID);
        }
        if let NodeRef::Disk(pointer) = self.root {
            return Ok(pointer);
        }

        let mut store = self.store.lock();
        let mut writer = BlockWriter::new(&mut store)?;
        let pointer = self.root.persist(&mut writer)?;
        writer.finish()?;
        Ok(pointer)
    }

    /// Merge another tree into this one, consuming it.
    ///
    /// Subtrees present on only one side are grafted by reference
    /// transfer; shared paths recurse. Both trees must have been built
    /// over the same block store, since grafted persisted references
    /// resolve lazily against it.
    ///
    /// # Errors
    /// - `DuplicateKey` if both trees contain the same exact key; the
    ///   partially merged tree must then be discarded by the caller
    /// - `CorruptIndex` if the trees do not share a block store
    pub fn merge_with(&mut self, other: Art) -> Result<()> {
        if !Arc::ptr_eq(&self.store, &other.store) {
            return Err(Error::CorruptIndex(
                "merge requires both trees to share one block store".to_string(),
            ));
        }

        let Art {
            root: other_root, ..
        } = other;
        let mut store = self.store.lock();
        merge::merge_refs(&mut self.root, other_root, &mut store)
    }
}

/// How one level of the tree handles an inserted key.
enum InsertAction {
    /// The key already exists (or collides as a prefix of an existing
    /// path).
    Duplicate,
    /// The prefix diverges at this byte offset: split the node.
    Split(usize),
    /// The prefix matches and a child for the next byte exists.
    Descend(usize),
    /// The prefix matches and the next byte is unoccupied.
    AddChild(u8),
}

fn insert_into(
    slot: &mut NodeRef,
    store: &mut BlockManager,
    key: &[u8],
    depth: usize,
    row_id: RowId,
) -> Result<()> {
    if slot.is_empty() {
        *slot = NodeRef::from(Node::new_leaf(key, depth, row_id));
        return Ok(());
    }

    // Decide before mutating: a failed insert must leave the tree intact.
    let action = {
        let node = slot.resolve(store)?;
        let prefix_len = node.prefix().len();
        let mismatch = node.prefix().key_mismatch_position(key, depth);

        if mismatch < prefix_len {
            if depth + mismatch == key.len() {
                // The key ran out inside this node's prefix
                InsertAction::Duplicate
            } else {
                InsertAction::Split(mismatch)
            }
        } else {
            match node {
                // Exact key, or the new key extends past a stored key
                Node::Leaf(_) => InsertAction::Duplicate,
                _ => {
                    let next = depth + prefix_len;
                    if next >= key.len() {
                        // The key ends at an interior node
                        InsertAction::Duplicate
                    } else {
                        match node.get_child_pos(key[next]) {
                            Some(pos) => InsertAction::Descend(pos),
                            None => InsertAction::AddChild(key[next]),
                        }
                    }
                }
            }
        }
    };

    match action {
        InsertAction::Duplicate => Err(Error::DuplicateKey),
        InsertAction::Descend(pos) => {
            let node = slot.resolve(store)?;
            let next = depth + node.prefix().len();
            insert_into(node.child_mut(pos), store, key, next + 1, row_id)
        }
        InsertAction::AddChild(byte) => {
            let node = slot.resolve(store)?;
            let next = depth + node.prefix().len();
            let leaf = Node::new_leaf(key, next + 1, row_id);
            node.insert_child(byte, NodeRef::from(leaf))
        }
        InsertAction::Split(mismatch) => {
            // Push the existing node down under a new branch holding the
            // common prefix; the new key becomes the branch's other child.
            let mut old = match std::mem::replace(slot, NodeRef::Empty) {
                NodeRef::Mem(node) => node,
                _ => unreachable!("resolved above"),
            };

            let common = Prefix::from_prefix(old.prefix(), mismatch);
            let old_byte = old.prefix_mut().reduce(mismatch);
            let new_byte = key[depth + mismatch];
            let leaf = Node::new_leaf(key, depth + mismatch + 1, row_id);

            let mut branch = Node::new_node4(common);
            branch.insert_child(old_byte, NodeRef::Mem(old))?;
            branch.insert_child(new_byte, NodeRef::from(leaf))?;
            *slot = NodeRef::from(branch);
            Ok(())
        }
    }
}

fn lookup_in(
    slot: &mut NodeRef,
    store: &mut BlockManager,
    key: &[u8],
    depth: usize,
) -> Result<Option<RowId>> {
    if slot.is_empty() {
        return Ok(None);
    }

    let node = slot.resolve(store)?;
    let prefix_len = node.prefix().len();
    if node.prefix().key_mismatch_position(key, depth) < prefix_len {
        return Ok(None);
    }
    let next = depth + prefix_len;

    match node {
        Node::Leaf(leaf) => {
            if next == key.len() {
                Ok(Some(leaf.row_id))
            } else {
                Ok(None)
            }
        }
        _ => {
            if next >= key.len() {
                return Ok(None);
            }
            match node.get_child_pos(key[next]) {
                Some(pos) => lookup_in(node.child_mut(pos), store, key, next + 1),
                None => Ok(None),
            }
        }
    }
}

/// What the child under the descent byte turned out to be.
enum ChildKind {
    MatchingLeaf,
    NonMatchingLeaf,
    Inner,
}

fn delete_from(
    slot: &mut NodeRef,
    store: &mut BlockManager,
    key: &[u8],
    depth: usize,
    is_root: bool,
) -> Result<()> {
    if slot.is_empty() {
        return Err(Error::KeyNotFound);
    }

    let node = slot.resolve(store)?;
    let prefix_len = node.prefix().len();
    if node.prefix().key_mismatch_position(key, depth) < prefix_len {
        return Err(Error::KeyNotFound);
    }
    let next = depth + prefix_len;

    if let Node::Leaf(_) = node {
        // Only the root can be a bare leaf here; deeper leaves are
        // removed through their parent below.
        return if next == key.len() {
            *slot = NodeRef::Empty;
            Ok(())
        } else {
            Err(Error::KeyNotFound)
        };
    }

    if next >= key.len() {
        return Err(Error::KeyNotFound);
    }
    let pos = match node.get_child_pos(key[next]) {
        Some(pos) => pos,
        None => return Err(Error::KeyNotFound),
    };

    let kind = {
        let child = node.child_mut(pos);
        match child.resolve(store)? {
            Node::Leaf(leaf) => {
                let m = leaf.prefix.key_mismatch_position(key, next + 1);
                if m == leaf.prefix.len() && next + 1 + m == key.len() {
                    ChildKind::MatchingLeaf
                } else {
                    ChildKind::NonMatchingLeaf
                }
            }
            _ => ChildKind::Inner,
        }
    };

    match kind {
        ChildKind::NonMatchingLeaf => Err(Error::KeyNotFound),
        ChildKind::Inner => delete_from(node.child_mut(pos), store, key, next + 1, false),
        ChildKind::MatchingLeaf => {
            node.delete_child(pos);
            let remaining = node.count();
            if !is_root && remaining == 1 {
                fold_single_child(slot, store)?;
            } else if is_root && remaining == 0 {
                *slot = NodeRef::Empty;
            }
            Ok(())
        }
    }
}

/// Remove a node left with exactly one child: the child takes the
/// node's place, absorbing `node_prefix + separator byte + child_prefix`.
fn fold_single_child(slot: &mut NodeRef, store: &mut BlockManager) -> Result<()> {
    let (byte, mut child, parent_prefix) = {
        let node = match slot {
            NodeRef::Mem(node) => node,
            _ => unreachable!("caller resolved the node"),
        };
        let pos = node.get_min_pos().expect("node has exactly one child");
        let byte = node.get_byte(pos);
        let child = node.take_child(pos);
        (byte, child, node.prefix().clone())
    };

    let child_node = child.resolve(store)?;
    child_node.prefix_mut().concatenate(byte, &parent_prefix);

    *slot = child;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::node::NodeType;
    use super::*;
    use tempfile::tempdir;

    fn create_art() -> (Art, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.idx");
        let store = Arc::new(Mutex::new(BlockManager::create(&path).unwrap()));
        (Art::new(store), dir)
    }

    fn root_node(art: &mut Art) -> &mut Node {
        let NodeRef::Mem(node) = &mut art.root else {
            panic!("root is not live");
        };
        node
    }

    // --- insert and lookup ---

    #[test]
    fn test_empty_tree_lookup() {
        let (mut art, _dir) = create_art();
        assert!(art.is_empty());
        assert_eq!(art.lookup(b"anything").unwrap(), None);
    }

    #[test]
    fn test_single_key() {
        let (mut art, _dir) = create_art();
        art.insert(b"hello", RowId::new(1)).unwrap();

        assert!(!art.is_empty());
        assert_eq!(art.lookup(b"hello").unwrap(), Some(RowId::new(1)));
        assert_eq!(art.lookup(b"hellx").unwrap(), None);
        assert_eq!(art.lookup(b"h").unwrap(), None);
    }

    #[test]
    fn test_leaf_split_on_divergence() {
        let (mut art, _dir) = create_art();
        art.insert(b"abc", RowId::new(1)).unwrap();
        art.insert(b"abd", RowId::new(2)).unwrap();

        // A branch with the common prefix and two leaves
        {
            let root = root_node(&mut art);
            assert_eq!(root.node_type(), NodeType::Node4);
            assert_eq!(root.prefix().as_slice(), b"ab");
            assert_eq!(root.count(), 2);
        }

        assert_eq!(art.lookup(b"abc").unwrap(), Some(RowId::new(1)));
        assert_eq!(art.lookup(b"abd").unwrap(), Some(RowId::new(2)));
        assert_eq!(art.lookup(b"abe").unwrap(), None);
        assert_eq!(art.lookup(b"ab").unwrap(), None);
    }

    #[test]
    fn test_interior_split_on_divergence() {
        let (mut art, _dir) = create_art();
        art.insert(b"romane", RowId::new(1)).unwrap();
        art.insert(b"romanus", RowId::new(2)).unwrap();
        art.insert(b"rubens", RowId::new(3)).unwrap();

        {
            let root = root_node(&mut art);
            assert_eq!(root.prefix().as_slice(), b"r");
            assert_eq!(root.count(), 2);
        }

        assert_eq!(art.lookup(b"romane").unwrap(), Some(RowId::new(1)));
        assert_eq!(art.lookup(b"romanus").unwrap(), Some(RowId::new(2)));
        assert_eq!(art.lookup(b"rubens").unwrap(), Some(RowId::new(3)));
        assert_eq!(art.lookup(b"romanes").unwrap(), None);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let (mut art, _dir) = create_art();
        art.insert(b"key", RowId::new(1)).unwrap();

        match art.insert(b"key", RowId::new(2)) {
            Err(Error::DuplicateKey) => {}
            _ => panic!("Expected DuplicateKey"),
        }

        // The original mapping is untouched
        assert_eq!(art.lookup(b"key").unwrap(), Some(RowId::new(1)));
    }

    #[test]
    fn test_prefix_collision_rejected() {
        let (mut art, _dir) = create_art();
        art.insert(b"abcd", RowId::new(1)).unwrap();

        // A key that is a proper prefix of an existing key, and one that
        // extends an existing key, are both ambiguous
        assert!(matches!(
            art.insert(b"ab", RowId::new(2)),
            Err(Error::DuplicateKey)
        ));
        assert!(matches!(
            art.insert(b"abcdef", RowId::new(3)),
            Err(Error::DuplicateKey)
        ));
    }

    #[test]
    fn test_many_keys() {
        let (mut art, _dir) = create_art();

        // Deep shared prefixes with repeated splits along the digits
        for i in 0..300u32 {
            let key = format!("key-{i:04}");
            art.insert(key.as_bytes(), RowId::new(i as u64)).unwrap();
        }

        for i in 0..300u32 {
            let key = format!("key-{i:04}");
            assert_eq!(
                art.lookup(key.as_bytes()).unwrap(),
                Some(RowId::new(i as u64)),
                "lookup {key}"
            );
        }
        assert_eq!(art.lookup(b"key-0300").unwrap(), None);
    }

    #[test]
    fn test_long_prefix_beyond_inline() {
        let (mut art, _dir) = create_art();

        // Shared prefix far past the 8-byte inline threshold
        let mut a = vec![b'p'; 40];
        a.push(b'1');
        let mut b = vec![b'p'; 40];
        b.push(b'2');

        art.insert(&a, RowId::new(1)).unwrap();
        art.insert(&b, RowId::new(2)).unwrap();

        assert_eq!(art.lookup(&a).unwrap(), Some(RowId::new(1)));
        assert_eq!(art.lookup(&b).unwrap(), Some(RowId::new(2)));

        let root = root_node(&mut art);
        assert_eq!(root.prefix().len(), 40);
    }

    // --- delete ---

    #[test]
    fn test_delete_root_leaf() {
        let (mut art, _dir) = create_art();
        art.insert(b"solo", RowId::new(1)).unwrap();

        art.delete(b"solo").unwrap();
        assert!(art.is_empty());
        assert_eq!(art.lookup(b"solo").unwrap(), None);
    }

    #[test]
    fn test_delete_missing_key() {
        let (mut art, _dir) = create_art();
        assert!(matches!(art.delete(b"nope"), Err(Error::KeyNotFound)));

        art.insert(b"abc", RowId::new(1)).unwrap();
        assert!(matches!(art.delete(b"abd"), Err(Error::KeyNotFound)));
        assert!(matches!(art.delete(b"ab"), Err(Error::KeyNotFound)));
        assert!(matches!(art.delete(b"abcd"), Err(Error::KeyNotFound)));

        // Nothing was disturbed
        assert_eq!(art.lookup(b"abc").unwrap(), Some(RowId::new(1)));
    }

    #[test]
    fn test_single_child_fold() {
        let (mut art, _dir) = create_art();
        art.insert(b"water", RowId::new(1)).unwrap();
        art.insert(b"wine", RowId::new(2)).unwrap();
        art.insert(b"walk", RowId::new(3)).unwrap();

        // Root: prefix "w", children 'a' -> branch("ater"/"alk"), 'i' -> leaf
        art.delete(b"walk").unwrap();

        // The 'a' branch folded into the remaining "water" leaf; the path
        // still resolves exactly as before
        assert_eq!(art.lookup(b"water").unwrap(), Some(RowId::new(1)));
        assert_eq!(art.lookup(b"wine").unwrap(), Some(RowId::new(2)));
        assert_eq!(art.lookup(b"walk").unwrap(), None);
    }

    #[test]
    fn test_delete_all_keys() {
        let (mut art, _dir) = create_art();

        let keys: Vec<String> = (0..100).map(|i| format!("k{i:03}")).collect();
        for (i, key) in keys.iter().enumerate() {
            art.insert(key.as_bytes(), RowId::new(i as u64)).unwrap();
        }

        for key in &keys {
            art.delete(key.as_bytes()).unwrap();
            assert_eq!(art.lookup(key.as_bytes()).unwrap(), None);
        }
        assert!(art.is_empty());

        // The emptied tree is reusable
        art.insert(b"again", RowId::new(7)).unwrap();
        assert_eq!(art.lookup(b"again").unwrap(), Some(RowId::new(7)));
    }

    #[test]
    fn test_delete_triggers_shrink_preserving_lookups() {
        let (mut art, _dir) = create_art();

        for b in 0..60u8 {
            art.insert(&[b'x', b], RowId::new(b as u64)).unwrap();
        }
        assert_eq!(root_node(&mut art).node_type(), NodeType::Node256);

        for b in 36..60u8 {
            art.delete(&[b'x', b]).unwrap();
        }
        assert_eq!(root_node(&mut art).node_type(), NodeType::Node48);

        for b in 0..36u8 {
            assert_eq!(
                art.lookup(&[b'x', b]).unwrap(),
                Some(RowId::new(b as u64)),
                "key {b}"
            );
        }
        for b in 36..60u8 {
            assert_eq!(art.lookup(&[b'x', b]).unwrap(), None);
        }
    }

    // --- persistence ---

    #[test]
    fn test_persist_empty_tree() {
        let (mut art, _dir) = create_art();
        let ptr = art.persist().unwrap();
        assert!(!ptr.is_valid());
    }

    #[test]
    fn test_persist_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.idx");
        let store = Arc::new(Mutex::new(BlockManager::create(&path).unwrap()));

        let keys: Vec<String> = (0..50).map(|i| format!("row/{i:02}")).collect();

        let root = {
            let mut art = Art::new(Arc::clone(&store));
            for (i, key) in keys.iter().enumerate() {
                art.insert(key.as_bytes(), RowId::new(i as u64)).unwrap();
            }
            art.persist().unwrap()
        };
        assert!(root.is_valid());

        let mut art = Art::open(store, root);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(
                art.lookup(key.as_bytes()).unwrap(),
                Some(RowId::new(i as u64)),
                "lookup {key}"
            );
        }
        assert_eq!(art.lookup(b"row/99").unwrap(), None);
    }

    #[test]
    fn test_swizzling_transparency() {
        let (mut art, _dir) = create_art();
        art.insert(b"alpha", RowId::new(1)).unwrap();
        art.insert(b"beta", RowId::new(2)).unwrap();

        art.persist().unwrap();
        assert!(matches!(art.root, NodeRef::Disk(_)));

        // First lookup resolves the path in place
        assert_eq!(art.lookup(b"alpha").unwrap(), Some(RowId::new(1)));
        assert!(matches!(art.root, NodeRef::Mem(_)));

        // The rest of the tree behaves identically
        assert_eq!(art.lookup(b"beta").unwrap(), Some(RowId::new(2)));
        assert_eq!(art.lookup(b"gamma").unwrap(), None);
    }

    #[test]
    fn test_mutation_after_persist() {
        let (mut art, _dir) = create_art();
        art.insert(b"aaa", RowId::new(1)).unwrap();
        art.insert(b"bbb", RowId::new(2)).unwrap();
        art.persist().unwrap();

        // Inserting into a persisted tree swizzles the touched path
        art.insert(b"ccc", RowId::new(3)).unwrap();
        art.delete(b"aaa").unwrap();

        assert_eq!(art.lookup(b"aaa").unwrap(), None);
        assert_eq!(art.lookup(b"bbb").unwrap(), Some(RowId::new(2)));
        assert_eq!(art.lookup(b"ccc").unwrap(), Some(RowId::new(3)));
    }

    #[test]
    fn test_persist_twice_reuses_subtrees() {
        let (mut art, _dir) = create_art();
        art.insert(b"one", RowId::new(1)).unwrap();

        let first = art.persist().unwrap();
        // Nothing was resolved in between: the root coordinate is reused
        let second = art.persist().unwrap();
        assert_eq!(first, second);
    }
}
