//! Merging two independently built trees.
//!
//! The merge recurses over pairs of same-level references. Subtrees
//! present on only one side are grafted by reference transfer — no node
//! is copied. Where both sides have a node, the prefixes decide:
//! identical prefixes merge child-by-child, diverging prefixes split
//! under a fresh branch, and a contained prefix pushes the longer side
//! down into the shorter one.
//!
//! Two leaves under the identical full key are a [`Error::DuplicateKey`]
//! conflict: resolution is the caller's policy, not the engine's. A merge
//! that fails part-way leaves a structurally valid, partially merged left
//! tree; the caller restarts by discarding it.

use crate::common::{Error, Result};
use crate::index::art::node::Node;
use crate::index::art::node_ref::NodeRef;
use crate::index::art::prefix::Prefix;
use crate::storage::BlockManager;

/// Merge the subtree under `right` into the subtree under `left`.
///
/// Both references are resolved on demand; decode errors propagate
/// fatally.
pub(super) fn merge_refs(
    left: &mut NodeRef,
    right: NodeRef,
    store: &mut BlockManager,
) -> Result<()> {
    if right.is_empty() {
        return Ok(());
    }
    if left.is_empty() {
        *left = right;
        return Ok(());
    }

    let mut right = right;
    let left_node = left.resolve(store)?;
    let right_node = right.resolve(store)?;

    let mismatch = left_node.prefix().mismatch_position(right_node.prefix());
    let left_len = left_node.prefix().len();
    let right_len = right_node.prefix().len();

    if mismatch < left_len && mismatch < right_len {
        // Prefixes diverge: fan both nodes out under a new branch whose
        // prefix is the common part.
        let common = Prefix::from_prefix(left_node.prefix(), mismatch);
        let left_byte = left_node.prefix_mut().reduce(mismatch);
        let right_byte = right_node.prefix_mut().reduce(mismatch);

        let old_left = std::mem::replace(left, NodeRef::Empty);
        let mut branch = Node::new_node4(common);
        branch.insert_child(left_byte, old_left)?;
        branch.insert_child(right_byte, right)?;
        *left = NodeRef::from(branch);
        return Ok(());
    }

    if left_len == right_len {
        // Same prefix, same level.
        match (left_node, right_node) {
            (Node::Leaf(_), _) | (_, Node::Leaf(_)) => {
                // Identical full key, or a key equal to an interior path
                Err(Error::DuplicateKey)
            }
            (merged, draining) => {
                for (byte, child) in draining.take_children() {
                    match merged.get_child_pos(byte) {
                        Some(pos) => merge_refs(merged.child_mut(pos), child, store)?,
                        None => merged.insert_child(byte, child)?,
                    }
                }
                Ok(())
            }
        }
    } else if mismatch == left_len {
        // Left's prefix contains right's start: push right down into the
        // matching child of left.
        if matches!(left_node, Node::Leaf(_)) {
            return Err(Error::DuplicateKey); // left's key prefixes right's subtree
        }
        let right_byte = right_node.prefix_mut().reduce(mismatch);
        match left_node.get_child_pos(right_byte) {
            Some(pos) => merge_refs(left_node.child_mut(pos), right, store),
            None => left_node.insert_child(right_byte, right),
        }
    } else {
        // Right's prefix contains left's start: graft left into right,
        // then let right take left's place.
        if matches!(right_node, Node::Leaf(_)) {
            return Err(Error::DuplicateKey);
        }
        let left_byte = left_node.prefix_mut().reduce(mismatch);
        let old_left = std::mem::replace(left, NodeRef::Empty);
        match right_node.get_child_pos(left_byte) {
            Some(pos) => merge_refs(right_node.child_mut(pos), old_left, store)?,
            None => right_node.insert_child(left_byte, old_left)?,
        }
        *left = right;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
