//! ART node variants with adaptive sizing.
//!
//! The key insight of ART is using different node layouts based on the
//! actual number of children:
//!
//! - Leaf: key suffix + row id, no children
//! - Node4: up to 4 children (most common, smallest)
//! - Node16: 5-16 children (sorted keys, binary search)
//! - Node48: 17-48 children (256-byte index + 48 references)
//! - Node256: 49-256 children (direct array indexing)
//!
//! Nodes grow into the next variant when full and shrink back when
//! deletions leave them under-used, so the fan-out always pays for the
//! memory it occupies.

use crate::common::{BlockPointer, Error, Result, RowId};
use crate::index::art::node_ref::NodeRef;
use crate::index::art::prefix::Prefix;
use crate::storage::{BlockReader, BlockWriter};

/// Maximum children per variant.
pub const NODE_4_CAPACITY: usize = 4;
pub const NODE_16_CAPACITY: usize = 16;
pub const NODE_48_CAPACITY: usize = 48;
pub const NODE_256_CAPACITY: usize = 256;

/// A Node48 deleted down to this many children shrinks into a Node16.
pub const NODE_48_SHRINK_THRESHOLD: usize = 12;
/// A Node256 deleted down to this many children shrinks into a Node48.
pub const NODE_256_SHRINK_THRESHOLD: usize = 36;
/// A Node16 deleted down to this many children shrinks into a Node4.
pub const NODE_16_SHRINK_THRESHOLD: usize = 3;

/// "No child" marker in the Node48 byte→slot table.
pub const EMPTY_MARKER: u8 = 48;

const EMPTY_REF: NodeRef = NodeRef::Empty;

/// The type of a node.
///
/// Uses `#[repr(u8)]` to guarantee a 1-byte representation: this is the
/// variant tag of the persisted node header.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// A leaf holding a key suffix and a row id.
    Leaf = 0,
    /// A node with up to 4 children.
    Node4 = 1,
    /// A node with 5-16 children.
    Node16 = 2,
    /// A node with 17-48 children.
    Node48 = 3,
    /// A node with 49-256 children.
    Node256 = 4,
}

impl NodeType {
    /// Convert from a persisted tag, `None` for unknown values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(NodeType::Leaf),
            1 => Some(NodeType::Node4),
            2 => Some(NodeType::Node16),
            3 => Some(NodeType::Node48),
            4 => Some(NodeType::Node256),
            _ => None,
        }
    }
}

/// A leaf: the remaining key suffix (as its prefix) plus the payload.
#[derive(Debug)]
pub struct Leaf {
    pub prefix: Prefix,
    pub row_id: RowId,
}

/// A node with up to 4 children in sorted parallel arrays.
#[derive(Debug)]
pub struct Node4 {
    prefix: Prefix,
    count: u8,
    keys: [u8; NODE_4_CAPACITY],
    children: [NodeRef; NODE_4_CAPACITY],
}

impl Node4 {
    fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            count: 0,
            keys: [0; NODE_4_CAPACITY],
            children: [EMPTY_REF; NODE_4_CAPACITY],
        }
    }
}

/// A node with 5-16 children in sorted parallel arrays.
#[derive(Debug)]
pub struct Node16 {
    prefix: Prefix,
    count: u8,
    keys: [u8; NODE_16_CAPACITY],
    children: [NodeRef; NODE_16_CAPACITY],
}

impl Node16 {
    fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            count: 0,
            keys: [0; NODE_16_CAPACITY],
            children: [EMPTY_REF; NODE_16_CAPACITY],
        }
    }
}

/// A node with 17-48 children: a 256-entry byte→slot table plus 48
/// references. Boxed arrays keep the enum small.
#[derive(Debug)]
pub struct Node48 {
    prefix: Prefix,
    count: u8,
    child_index: Box<[u8; 256]>,
    children: Box<[NodeRef; NODE_48_CAPACITY]>,
}

impl Node48 {
    fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            count: 0,
            child_index: Box::new([EMPTY_MARKER; 256]),
            children: Box::new([EMPTY_REF; NODE_48_CAPACITY]),
        }
    }
}

/// A node with 49-256 children: direct indexing by byte value.
#[derive(Debug)]
pub struct Node256 {
    prefix: Prefix,
    count: u16,
    children: Box<[NodeRef; NODE_256_CAPACITY]>,
}

impl Node256 {
    fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            count: 0,
            children: Box::new([EMPTY_REF; NODE_256_CAPACITY]),
        }
    }
}

/// One branching point or leaf of the tree.
///
/// # Positions
/// Child-addressing follows the original position convention: for
/// Node4/Node16 a position is an index into the sorted arrays; for
/// Node48/Node256 it is the key byte value itself. Positions are only
/// meaningful against the node that produced them.
#[derive(Debug)]
pub enum Node {
    Leaf(Leaf),
    Node4(Node4),
    Node16(Node16),
    Node48(Node48),
    Node256(Node256),
}

impl Node {
    /// Create a leaf for the key suffix starting at `depth`.
    pub fn new_leaf(key: &[u8], depth: usize, row_id: RowId) -> Node {
        Node::Leaf(Leaf {
            prefix: Prefix::from_key(key, depth, key.len() - depth),
            row_id,
        })
    }

    /// Create an empty Node4 with the given prefix.
    pub fn new_node4(prefix: Prefix) -> Node {
        Node::Node4(Node4::new(prefix))
    }

    /// The variant tag.
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Leaf(_) => NodeType::Leaf,
            Node::Node4(_) => NodeType::Node4,
            Node::Node16(_) => NodeType::Node16,
            Node::Node48(_) => NodeType::Node48,
            Node::Node256(_) => NodeType::Node256,
        }
    }

    /// The node's compressed path.
    pub fn prefix(&self) -> &Prefix {
        match self {
            Node::Leaf(leaf) => &leaf.prefix,
            Node::Node4(n) => &n.prefix,
            Node::Node16(n) => &n.prefix,
            Node::Node48(n) => &n.prefix,
            Node::Node256(n) => &n.prefix,
        }
    }

    /// Mutable access to the compressed path.
    pub fn prefix_mut(&mut self) -> &mut Prefix {
        match self {
            Node::Leaf(leaf) => &mut leaf.prefix,
            Node::Node4(n) => &mut n.prefix,
            Node::Node16(n) => &mut n.prefix,
            Node::Node48(n) => &mut n.prefix,
            Node::Node256(n) => &mut n.prefix,
        }
    }

    /// The number of children.
    pub fn count(&self) -> usize {
        match self {
            Node::Leaf(_) => 0,
            Node::Node4(n) => n.count as usize,
            Node::Node16(n) => n.count as usize,
            Node::Node48(n) => n.count as usize,
            Node::Node256(n) => n.count as usize,
        }
    }

    /// The position of the child for exactly `byte`, or `None`.
    pub fn get_child_pos(&self, byte: u8) -> Option<usize> {
        match self {
            Node::Leaf(_) => None,
            Node::Node4(n) => n.keys[..n.count as usize]
                .iter()
                .position(|&k| k == byte),
            Node::Node16(n) => n.keys[..n.count as usize].binary_search(&byte).ok(),
            Node::Node48(n) => {
                if n.child_index[byte as usize] != EMPTY_MARKER {
                    Some(byte as usize)
                } else {
                    None
                }
            }
            Node::Node256(n) => {
                if !n.children[byte as usize].is_empty() {
                    Some(byte as usize)
                } else {
                    None
                }
            }
        }
    }

    /// The position of the smallest child byte `>= byte`, or `None`.
    ///
    /// The second element reports whether the match is exact; range scans
    /// use it to decide between descending and taking a subtree minimum.
    pub fn get_child_pos_greater_equal(&self, byte: u8) -> Option<(usize, bool)> {
        match self {
            Node::Leaf(_) => None,
            Node::Node4(n) => n.keys[..n.count as usize]
                .iter()
                .position(|&k| k >= byte)
                .map(|pos| (pos, n.keys[pos] == byte)),
            Node::Node16(n) => {
                let pos = n.keys[..n.count as usize].partition_point(|&k| k < byte);
                if pos < n.count as usize {
                    Some((pos, n.keys[pos] == byte))
                } else {
                    None
                }
            }
            Node::Node48(n) => (byte as usize..256)
                .find(|&b| n.child_index[b] != EMPTY_MARKER)
                .map(|b| (b, b == byte as usize)),
            Node::Node256(n) => (byte as usize..256)
                .find(|&b| !n.children[b].is_empty())
                .map(|b| (b, b == byte as usize)),
        }
    }

    /// The position of the smallest child byte, or `None` for an empty
    /// node.
    pub fn get_min_pos(&self) -> Option<usize> {
        match self {
            Node::Leaf(_) => None,
            Node::Node4(n) => (n.count > 0).then_some(0),
            Node::Node16(n) => (n.count > 0).then_some(0),
            Node::Node48(n) => (0..256).find(|&b| n.child_index[b] != EMPTY_MARKER),
            Node::Node256(n) => (0..256).find(|&b| !n.children[b].is_empty()),
        }
    }

    /// The next position after `pos` in ascending byte order, or the
    /// first position when `pos` is `None`.
    pub fn get_next_pos(&self, pos: Option<usize>) -> Option<usize> {
        let pos = match pos {
            None => return self.get_min_pos(),
            Some(pos) => pos,
        };
        match self {
            Node::Leaf(_) => None,
            Node::Node4(n) => (pos + 1 < n.count as usize).then_some(pos + 1),
            Node::Node16(n) => (pos + 1 < n.count as usize).then_some(pos + 1),
            Node::Node48(n) => (pos + 1..256).find(|&b| n.child_index[b] != EMPTY_MARKER),
            Node::Node256(n) => (pos + 1..256).find(|&b| !n.children[b].is_empty()),
        }
    }

    /// The key byte at `pos`.
    pub fn get_byte(&self, pos: usize) -> u8 {
        match self {
            Node::Leaf(_) => panic!("leaf nodes have no children"),
            Node::Node4(n) => n.keys[pos],
            Node::Node16(n) => n.keys[pos],
            Node::Node48(_) | Node::Node256(_) => pos as u8,
        }
    }

    /// The child reference at `pos`.
    pub fn child_mut(&mut self, pos: usize) -> &mut NodeRef {
        match self {
            Node::Leaf(_) => panic!("leaf nodes have no children"),
            Node::Node4(n) => &mut n.children[pos],
            Node::Node16(n) => &mut n.children[pos],
            Node::Node48(n) => {
                let slot = n.child_index[pos];
                debug_assert_ne!(slot, EMPTY_MARKER, "position has no child");
                &mut n.children[slot as usize]
            }
            Node::Node256(n) => &mut n.children[pos],
        }
    }

    /// Take the child at `pos` out, leaving the slot empty but the
    /// bookkeeping untouched.
    ///
    /// Only valid while dismantling the node (merge grafting, single-child
    /// fold); the node must not be used for lookups afterwards.
    pub fn take_child(&mut self, pos: usize) -> NodeRef {
        std::mem::replace(self.child_mut(pos), NodeRef::Empty)
    }

    /// Drain all children in ascending byte order, dismantling the node.
    pub fn take_children(&mut self) -> Vec<(u8, NodeRef)> {
        let mut out = Vec::with_capacity(self.count());
        let mut pos = self.get_next_pos(None);
        while let Some(p) = pos {
            out.push((self.get_byte(p), self.take_child(p)));
            pos = self.get_next_pos(Some(p));
        }
        out
    }

    /// Insert a child at `byte`, growing into the next variant when full.
    ///
    /// The replacement node is fully built before it takes this node's
    /// place, so a failure leaves the original intact.
    ///
    /// # Errors
    /// `CapacityExceeded` if a Node256 would overflow. This cannot occur
    /// by construction (a node never holds duplicate key bytes) and is
    /// guarded defensively.
    pub fn insert_child(&mut self, byte: u8, child: NodeRef) -> Result<()> {
        debug_assert!(
            self.get_child_pos(byte).is_none(),
            "duplicate child byte {byte}"
        );

        if self.is_full() {
            self.grow()?;
        }

        match self {
            Node::Leaf(_) => panic!("leaf nodes have no children"),
            Node::Node4(n) => {
                let count = n.count as usize;
                let idx = n.keys[..count].partition_point(|&k| k < byte);
                n.keys.copy_within(idx..count, idx + 1);
                n.keys[idx] = byte;
                n.children[idx..=count].rotate_right(1);
                n.children[idx] = child;
                n.count += 1;
            }
            Node::Node16(n) => {
                let count = n.count as usize;
                let idx = n.keys[..count].partition_point(|&k| k < byte);
                n.keys.copy_within(idx..count, idx + 1);
                n.keys[idx] = byte;
                n.children[idx..=count].rotate_right(1);
                n.children[idx] = child;
                n.count += 1;
            }
            Node::Node48(n) => {
                // Slots can have holes after deletions; reuse the first
                let slot = n
                    .children
                    .iter()
                    .position(|c| c.is_empty())
                    .expect("grown node has a free slot");
                n.children[slot] = child;
                n.child_index[byte as usize] = slot as u8;
                n.count += 1;
            }
            Node::Node256(n) => {
                n.children[byte as usize] = child;
                n.count += 1;
            }
        }
        Ok(())
    }

    /// Delete the child at `pos`, shrinking into the smaller variant when
    /// the count falls under the threshold.
    ///
    /// Dropping the removed reference recursively destroys its live
    /// subtree; persisted children are merely forgotten (their blocks are
    /// reclaimed by offline compaction).
    pub fn delete_child(&mut self, pos: usize) {
        let shrink = match self {
            Node::Leaf(_) => panic!("leaf nodes have no children"),
            Node::Node4(n) => {
                let count = n.count as usize;
                n.children[pos..count].rotate_left(1);
                n.children[count - 1] = NodeRef::Empty;
                n.keys.copy_within(pos + 1..count, pos);
                n.count -= 1;
                false
            }
            Node::Node16(n) => {
                let count = n.count as usize;
                n.children[pos..count].rotate_left(1);
                n.children[count - 1] = NodeRef::Empty;
                n.keys.copy_within(pos + 1..count, pos);
                n.count -= 1;
                (n.count as usize) <= NODE_16_SHRINK_THRESHOLD
            }
            Node::Node48(n) => {
                let slot = n.child_index[pos];
                debug_assert_ne!(slot, EMPTY_MARKER, "position has no child");
                n.children[slot as usize] = NodeRef::Empty;
                n.child_index[pos] = EMPTY_MARKER;
                n.count -= 1;
                (n.count as usize) <= NODE_48_SHRINK_THRESHOLD
            }
            Node::Node256(n) => {
                n.children[pos] = NodeRef::Empty;
                n.count -= 1;
                (n.count as usize) <= NODE_256_SHRINK_THRESHOLD
            }
        };
        if shrink {
            self.shrink();
        }
    }

    /// Whether the node is at its variant's capacity.
    fn is_full(&self) -> bool {
        match self {
            Node::Leaf(_) => false,
            Node::Node4(n) => n.count as usize == NODE_4_CAPACITY,
            Node::Node16(n) => n.count as usize == NODE_16_CAPACITY,
            Node::Node48(n) => n.count as usize == NODE_48_CAPACITY,
            Node::Node256(n) => n.count as usize == NODE_256_CAPACITY,
        }
    }

    /// Replace this node with the next-larger variant, moving all
    /// children over.
    fn grow(&mut self) -> Result<()> {
        match self {
            Node::Leaf(_) => panic!("leaf nodes have no children"),
            Node::Node4(n4) => {
                let mut n16 = Node16::new(std::mem::take(&mut n4.prefix));
                let count = n4.count as usize;
                n16.keys[..count].copy_from_slice(&n4.keys[..count]);
                for i in 0..count {
                    n16.children[i] = std::mem::replace(&mut n4.children[i], NodeRef::Empty);
                }
                n16.count = n4.count;
                *self = Node::Node16(n16);
                Ok(())
            }
            Node::Node16(n16) => {
                let mut n48 = Node48::new(std::mem::take(&mut n16.prefix));
                let count = n16.count as usize;
                for i in 0..count {
                    n48.child_index[n16.keys[i] as usize] = i as u8;
                    n48.children[i] = std::mem::replace(&mut n16.children[i], NodeRef::Empty);
                }
                n48.count = n16.count;
                *self = Node::Node48(n48);
                Ok(())
            }
            Node::Node48(n48) => {
                let mut n256 = Node256::new(std::mem::take(&mut n48.prefix));
                for byte in 0..256 {
                    let slot = n48.child_index[byte];
                    if slot != EMPTY_MARKER {
                        n256.children[byte] =
                            std::mem::replace(&mut n48.children[slot as usize], NodeRef::Empty);
                    }
                }
                n256.count = n48.count as u16;
                *self = Node::Node256(n256);
                Ok(())
            }
            Node::Node256(_) => Err(Error::CapacityExceeded("Node256 cannot grow")),
        }
    }

    /// Replace this node with the next-smaller variant, moving the
    /// remaining children over.
    fn shrink(&mut self) {
        match self {
            Node::Leaf(_) | Node::Node4(_) => {
                panic!("nothing to shrink into")
            }
            Node::Node16(n16) => {
                let mut n4 = Node4::new(std::mem::take(&mut n16.prefix));
                let count = n16.count as usize;
                n4.keys[..count].copy_from_slice(&n16.keys[..count]);
                for i in 0..count {
                    n4.children[i] = std::mem::replace(&mut n16.children[i], NodeRef::Empty);
                }
                n4.count = n16.count;
                *self = Node::Node4(n4);
            }
            Node::Node48(n48) => {
                let mut n16 = Node16::new(std::mem::take(&mut n48.prefix));
                let mut next = 0;
                for byte in 0..256 {
                    let slot = n48.child_index[byte];
                    if slot != EMPTY_MARKER {
                        n16.keys[next] = byte as u8;
                        n16.children[next] =
                            std::mem::replace(&mut n48.children[slot as usize], NodeRef::Empty);
                        next += 1;
                    }
                }
                n16.count = next as u8;
                *self = Node::Node16(n16);
            }
            Node::Node256(n256) => {
                let mut n48 = Node48::new(std::mem::take(&mut n256.prefix));
                let mut next = 0;
                for byte in 0..256 {
                    if !n256.children[byte].is_empty() {
                        n48.child_index[byte] = next as u8;
                        n48.children[next] =
                            std::mem::replace(&mut n256.children[byte], NodeRef::Empty);
                        next += 1;
                    }
                }
                n48.count = next as u8;
                *self = Node::Node48(n48);
            }
        }
    }

    /// Serialize this node, children first, and return its position.
    ///
    /// Persisting a child rewrites its reference to the on-disk
    /// coordinate, so by the time the parent's child table is written
    /// every coordinate is valid.
    pub fn serialize(&mut self, writer: &mut BlockWriter<'_>) -> Result<BlockPointer> {
        let tag = self.node_type() as u8;
        match self {
            Node::Leaf(leaf) => {
                let position = writer.block_pointer();
                writer.write_u8(tag)?;
                leaf.prefix.serialize(writer)?;
                writer.write_u64(leaf.row_id.0)?;
                Ok(position)
            }
            Node::Node4(n) => {
                let count = n.count as usize;
                let mut pointers = [BlockPointer::INVALID; NODE_4_CAPACITY];
                for i in 0..count {
                    pointers[i] = n.children[i].persist(writer)?;
                }

                let position = writer.block_pointer();
                writer.write_u8(tag)?;
                n.prefix.serialize(writer)?;
                writer.write_u8(n.count)?;
                for i in 0..count {
                    writer.write_u8(n.keys[i])?;
                    writer.write_bytes(&pointers[i].to_bytes())?;
                }
                Ok(position)
            }
            Node::Node16(n) => {
                let count = n.count as usize;
                let mut pointers = [BlockPointer::INVALID; NODE_16_CAPACITY];
                for i in 0..count {
                    pointers[i] = n.children[i].persist(writer)?;
                }

                let position = writer.block_pointer();
                writer.write_u8(tag)?;
                n.prefix.serialize(writer)?;
                writer.write_u8(n.count)?;
                for i in 0..count {
                    writer.write_u8(n.keys[i])?;
                    writer.write_bytes(&pointers[i].to_bytes())?;
                }
                Ok(position)
            }
            Node::Node48(n) => {
                // Compact the slot table: occupied slots are renumbered in
                // ascending byte order, so holes never reach disk.
                let mut table = [EMPTY_MARKER; 256];
                let mut pointers = Vec::with_capacity(n.count as usize);
                for byte in 0..256 {
                    let slot = n.child_index[byte];
                    if slot != EMPTY_MARKER {
                        table[byte] = pointers.len() as u8;
                        pointers.push(n.children[slot as usize].persist(writer)?);
                    }
                }

                let position = writer.block_pointer();
                writer.write_u8(tag)?;
                n.prefix.serialize(writer)?;
                writer.write_u8(n.count)?;
                writer.write_bytes(&table)?;
                for pointer in &pointers {
                    writer.write_bytes(&pointer.to_bytes())?;
                }
                Ok(position)
            }
            Node::Node256(n) => {
                let mut pointers = Box::new([BlockPointer::INVALID; NODE_256_CAPACITY]);
                for byte in 0..256 {
                    if !n.children[byte].is_empty() {
                        pointers[byte] = n.children[byte].persist(writer)?;
                    }
                }

                let position = writer.block_pointer();
                writer.write_u8(tag)?;
                n.prefix.serialize(writer)?;
                writer.write_u16(n.count)?;
                for pointer in pointers.iter() {
                    writer.write_bytes(&pointer.to_bytes())?;
                }
                Ok(position)
            }
        }
    }

    /// Decode a node written by [`Node::serialize`].
    ///
    /// Every field is validated; malformed data surfaces `CorruptIndex`.
    pub fn deserialize(reader: &mut BlockReader<'_>) -> Result<Node> {
        let tag = reader.read_u8()?;
        let node_type = NodeType::from_u8(tag)
            .ok_or_else(|| Error::CorruptIndex(format!("unknown node type tag {tag}")))?;
        let prefix = Prefix::deserialize(reader)?;

        match node_type {
            NodeType::Leaf => {
                let row_id = RowId::new(reader.read_u64()?);
                Ok(Node::Leaf(Leaf { prefix, row_id }))
            }
            NodeType::Node4 => {
                let count = reader.read_u8()? as usize;
                if count == 0 || count > NODE_4_CAPACITY {
                    return Err(Error::CorruptIndex(format!("Node4 child count {count}")));
                }
                let mut node = Node4::new(prefix);
                Self::read_sorted_children(
                    reader,
                    count,
                    &mut node.keys[..count],
                    &mut node.children[..count],
                )?;
                node.count = count as u8;
                Ok(Node::Node4(node))
            }
            NodeType::Node16 => {
                let count = reader.read_u8()? as usize;
                if count == 0 || count > NODE_16_CAPACITY {
                    return Err(Error::CorruptIndex(format!("Node16 child count {count}")));
                }
                let mut node = Node16::new(prefix);
                Self::read_sorted_children(
                    reader,
                    count,
                    &mut node.keys[..count],
                    &mut node.children[..count],
                )?;
                node.count = count as u8;
                Ok(Node::Node16(node))
            }
            NodeType::Node48 => {
                let count = reader.read_u8()? as usize;
                if count == 0 || count > NODE_48_CAPACITY {
                    return Err(Error::CorruptIndex(format!("Node48 child count {count}")));
                }

                let mut node = Node48::new(prefix);
                reader.read_bytes(&mut node.child_index[..])?;

                // The serialized table is compact: every occupied entry
                // indexes a unique slot below count.
                let mut seen = [false; NODE_48_CAPACITY];
                let mut occupied = 0;
                for byte in 0..256 {
                    let slot = node.child_index[byte];
                    if slot == EMPTY_MARKER {
                        continue;
                    }
                    if slot as usize >= count || seen[slot as usize] {
                        return Err(Error::CorruptIndex(format!(
                            "Node48 slot table entry {slot} invalid"
                        )));
                    }
                    seen[slot as usize] = true;
                    occupied += 1;
                }
                if occupied != count {
                    return Err(Error::CorruptIndex(format!(
                        "Node48 table holds {occupied} children, header says {count}"
                    )));
                }

                for slot in 0..count {
                    node.children[slot] = NodeRef::Disk(Self::read_child_pointer(reader)?);
                }
                node.count = count as u8;
                Ok(Node::Node48(node))
            }
            NodeType::Node256 => {
                let count = reader.read_u16()? as usize;
                if count == 0 || count > NODE_256_CAPACITY {
                    return Err(Error::CorruptIndex(format!("Node256 child count {count}")));
                }

                let mut node = Node256::new(prefix);
                let mut occupied = 0;
                for byte in 0..256 {
                    let mut buf = [0u8; BlockPointer::SIZE];
                    reader.read_bytes(&mut buf)?;
                    let pointer = BlockPointer::from_bytes(buf);
                    if pointer.is_valid() {
                        node.children[byte] = NodeRef::Disk(pointer);
                        occupied += 1;
                    }
                }
                if occupied != count {
                    return Err(Error::CorruptIndex(format!(
                        "Node256 holds {occupied} children, header says {count}"
                    )));
                }
                node.count = count as u16;
                Ok(Node::Node256(node))
            }
        }
    }

    /// Read `count` `(byte, pointer)` pairs, enforcing strictly ascending
    /// bytes and valid pointers.
    fn read_sorted_children(
        reader: &mut BlockReader<'_>,
        count: usize,
        keys: &mut [u8],
        children: &mut [NodeRef],
    ) -> Result<()> {
        let mut last_byte: Option<u8> = None;
        for i in 0..count {
            let byte = reader.read_u8()?;
            if last_byte.is_some_and(|prev| byte <= prev) {
                return Err(Error::CorruptIndex(
                    "child bytes out of order".to_string(),
                ));
            }
            last_byte = Some(byte);
            keys[i] = byte;
            children[i] = NodeRef::Disk(Self::read_child_pointer(reader)?);
        }
        Ok(())
    }

    /// Read a child coordinate that must be present.
    fn read_child_pointer(reader: &mut BlockReader<'_>) -> Result<BlockPointer> {
        let mut buf = [0u8; BlockPointer::SIZE];
        reader.read_bytes(&mut buf)?;
        let pointer = BlockPointer::from_bytes(buf);
        if !pointer.is_valid() {
            return Err(Error::CorruptIndex("missing child pointer".to_string()));
        }
        Ok(pointer)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_ref(byte: u8) -> NodeRef {
        NodeRef::from(Node::new_leaf(&[byte], 0, RowId::new(byte as u64)))
    }

    fn node_with_children(bytes: &[u8]) -> Node {
        let mut node = Node::new_node4(Prefix::empty());
        for &b in bytes {
            node.insert_child(b, leaf_ref(b)).unwrap();
        }
        node
    }

    // --- child lookup ---

    #[test]
    fn test_get_child_pos_sorted_variants() {
        let node = node_with_children(&[9, 3, 7]);
        assert_eq!(node.node_type(), NodeType::Node4);

        // Keys are kept sorted regardless of insertion order
        assert_eq!(node.get_byte(0), 3);
        assert_eq!(node.get_byte(1), 7);
        assert_eq!(node.get_byte(2), 9);

        assert_eq!(node.get_child_pos(7), Some(1));
        assert_eq!(node.get_child_pos(8), None);
    }

    #[test]
    fn test_get_child_pos_greater_equal() {
        let node = node_with_children(&[10, 20, 30]);

        assert_eq!(node.get_child_pos_greater_equal(10), Some((0, true)));
        assert_eq!(node.get_child_pos_greater_equal(15), Some((1, false)));
        assert_eq!(node.get_child_pos_greater_equal(30), Some((2, true)));
        assert_eq!(node.get_child_pos_greater_equal(31), None);
    }

    #[test]
    fn test_iteration_order() {
        let mut node = node_with_children(&[50, 1, 200]);

        let mut bytes = Vec::new();
        let mut pos = node.get_next_pos(None);
        while let Some(p) = pos {
            bytes.push(node.get_byte(p));
            pos = node.get_next_pos(Some(p));
        }
        assert_eq!(bytes, vec![1, 50, 200]);

        // take_children drains in the same order
        let drained: Vec<u8> = node.take_children().into_iter().map(|(b, _)| b).collect();
        assert_eq!(drained, vec![1, 50, 200]);
    }

    // --- growth ---

    #[test]
    fn test_growth_chain() {
        let mut node = Node::new_node4(Prefix::from_slice(b"pfx"));

        // 5th child: Node4 -> Node16
        for b in 0..5u8 {
            node.insert_child(b, leaf_ref(b)).unwrap();
        }
        assert_eq!(node.node_type(), NodeType::Node16);
        assert_eq!(node.count(), 5);
        assert_eq!(node.prefix().as_slice(), b"pfx");

        // 17th child: Node16 -> Node48
        for b in 5..17u8 {
            node.insert_child(b, leaf_ref(b)).unwrap();
        }
        assert_eq!(node.node_type(), NodeType::Node48);
        assert_eq!(node.count(), 17);

        // 49th child: Node48 -> Node256
        for b in 17..49u8 {
            node.insert_child(b, leaf_ref(b)).unwrap();
        }
        assert_eq!(node.node_type(), NodeType::Node256);
        assert_eq!(node.count(), 49);
        assert_eq!(node.prefix().as_slice(), b"pfx");

        // All children survive every growth step
        for b in 0..49u8 {
            assert!(node.get_child_pos(b).is_some(), "missing child {b}");
        }
    }

    #[test]
    fn test_node256_overflow_guard() {
        let mut node = Node::new_node4(Prefix::empty());
        for b in 0..=255u8 {
            node.insert_child(b, leaf_ref(b)).unwrap();
        }
        assert_eq!(node.node_type(), NodeType::Node256);
        assert_eq!(node.count(), 256);

        // A 257th child cannot exist; the defensive guard must fire
        // (bypassing the duplicate-byte debug assertion is not possible
        // here, so check is_full + grow directly).
        match node.grow() {
            Err(Error::CapacityExceeded(_)) => {}
            _ => panic!("Expected CapacityExceeded"),
        }
    }

    // --- shrink ---

    #[test]
    fn test_shrink_node256_to_node48() {
        let mut node = Node::new_node4(Prefix::from_slice(b"s"));
        for b in 0..49u8 {
            node.insert_child(b, leaf_ref(b)).unwrap();
        }
        assert_eq!(node.node_type(), NodeType::Node256);

        // Delete down to the threshold
        for b in 37..49u8 {
            let pos = node.get_child_pos(b).unwrap();
            node.delete_child(pos);
        }
        assert_eq!(node.node_type(), NodeType::Node48);
        assert_eq!(node.count(), NODE_256_SHRINK_THRESHOLD + 1);

        let pos = node.get_child_pos(36).unwrap();
        node.delete_child(pos);
        assert_eq!(node.node_type(), NodeType::Node48);
        assert_eq!(node.count(), NODE_256_SHRINK_THRESHOLD);

        for b in 0..36u8 {
            assert!(node.get_child_pos(b).is_some(), "missing child {b}");
        }
        assert_eq!(node.prefix().as_slice(), b"s");
    }

    #[test]
    fn test_shrink_node48_to_node16() {
        let mut node = Node::new_node4(Prefix::empty());
        for b in 0..17u8 {
            node.insert_child(b, leaf_ref(b)).unwrap();
        }
        assert_eq!(node.node_type(), NodeType::Node48);

        // 17 -> 13 children: still above the threshold
        for b in 13..17u8 {
            let pos = node.get_child_pos(b).unwrap();
            node.delete_child(pos);
        }
        assert_eq!(node.node_type(), NodeType::Node48);

        // 12 children: at the threshold, shrink
        let pos = node.get_child_pos(12).unwrap();
        node.delete_child(pos);
        assert_eq!(node.node_type(), NodeType::Node16);
        assert_eq!(node.count(), NODE_48_SHRINK_THRESHOLD);

        for b in 0..12u8 {
            assert!(node.get_child_pos(b).is_some(), "missing child {b}");
        }
    }

    #[test]
    fn test_shrink_node16_to_node4() {
        let mut node = Node::new_node4(Prefix::empty());
        for b in 0..5u8 {
            node.insert_child(b, leaf_ref(b)).unwrap();
        }
        assert_eq!(node.node_type(), NodeType::Node16);

        let pos = node.get_child_pos(4).unwrap();
        node.delete_child(pos);
        assert_eq!(node.node_type(), NodeType::Node16);

        let pos = node.get_child_pos(3).unwrap();
        node.delete_child(pos);
        assert_eq!(node.node_type(), NodeType::Node4);
        assert_eq!(node.count(), 3);
    }

    #[test]
    fn test_node48_slot_reuse_after_delete() {
        let mut node = Node::new_node4(Prefix::empty());
        for b in 0..40u8 {
            node.insert_child(b, leaf_ref(b)).unwrap();
        }
        assert_eq!(node.node_type(), NodeType::Node48);

        // Free a slot in the middle, then reinsert a different byte
        let pos = node.get_child_pos(20).unwrap();
        node.delete_child(pos);
        node.insert_child(100, leaf_ref(100)).unwrap();

        assert_eq!(node.count(), 40);
        assert_eq!(node.get_child_pos(20), None);
        assert!(node.get_child_pos(100).is_some());
    }

    // --- delete ordering ---

    #[test]
    fn test_delete_keeps_sort_order() {
        let mut node = node_with_children(&[1, 2, 3, 4]);

        let pos = node.get_child_pos(2).unwrap();
        node.delete_child(pos);

        assert_eq!(node.count(), 3);
        assert_eq!(node.get_byte(0), 1);
        assert_eq!(node.get_byte(1), 3);
        assert_eq!(node.get_byte(2), 4);
        assert_eq!(node.get_child_pos(3), Some(1));
    }

    // --- node type tags ---

    #[test]
    fn test_node_type_from_u8() {
        assert_eq!(NodeType::from_u8(0), Some(NodeType::Leaf));
        assert_eq!(NodeType::from_u8(4), Some(NodeType::Node256));
        assert_eq!(NodeType::from_u8(5), None);
        assert_eq!(NodeType::from_u8(255), None);
    }
}
