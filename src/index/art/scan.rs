//! Ascending range scans.
//!
//! A [`RangeScan`] yields `(key, row id)` pairs in ascending key order.
//! Each step re-descends from the root to the smallest key greater than
//! the previously returned one, so the iterator needs no cursor state
//! inside nodes and stays valid while references along the path are
//! swizzled in. Scans are restartable from scratch only; they are not
//! resumable across separate calls.

use std::ops::Bound;

use crate::common::{Error, Result, RowId};
use crate::index::art::node::Node;
use crate::index::art::node_ref::NodeRef;
use crate::index::art::Art;
use crate::storage::BlockManager;

impl Art {
    /// Scan keys within the given bounds, ascending.
    ///
    /// The iterator is lazy: each `next()` performs one root-to-leaf
    /// descent and resolves only the references on that path.
    pub fn range_scan(&mut self, lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> RangeScan<'_> {
        let (next_key, next_inclusive) = match lower {
            Bound::Unbounded => (None, true),
            Bound::Included(key) => (Some(key.to_vec()), true),
            Bound::Excluded(key) => (Some(key.to_vec()), false),
        };

        RangeScan {
            art: self,
            next_key,
            next_inclusive,
            upper: match upper {
                Bound::Unbounded => Bound::Unbounded,
                Bound::Included(key) => Bound::Included(key.to_vec()),
                Bound::Excluded(key) => Bound::Excluded(key.to_vec()),
            },
            done: false,
        }
    }
}

/// Lazy ascending iterator over a key range.
///
/// Yields `Err` once and stops if a persisted reference on the path
/// fails to resolve.
pub struct RangeScan<'a> {
    art: &'a mut Art,
    /// Seek target for the next step; `None` means "start at the
    /// minimum".
    next_key: Option<Vec<u8>>,
    /// Whether a key equal to the target may be returned.
    next_inclusive: bool,
    upper: Bound<Vec<u8>>,
    done: bool,
}

impl Iterator for RangeScan<'_> {
    type Item = Result<(Vec<u8>, RowId)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut store = self.art.store.lock();
        let mut key = Vec::new();
        let found = match &self.next_key {
            None => minimum(&mut self.art.root, &mut store, &mut key),
            Some(target) => ceiling(
                &mut self.art.root,
                &mut store,
                target,
                0,
                self.next_inclusive,
                &mut key,
            ),
        };
        drop(store);

        match found {
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Ok(Some(row_id)) => {
                let within_upper = match &self.upper {
                    Bound::Unbounded => true,
                    Bound::Included(upper) => key.as_slice() <= upper.as_slice(),
                    Bound::Excluded(upper) => key.as_slice() < upper.as_slice(),
                };
                if !within_upper {
                    self.done = true;
                    return None;
                }

                self.next_key = Some(key.clone());
                self.next_inclusive = false;
                Some(Ok((key, row_id)))
            }
        }
    }
}

/// Descend to the leftmost leaf, appending traversed bytes to `key`.
fn minimum(
    slot: &mut NodeRef,
    store: &mut BlockManager,
    key: &mut Vec<u8>,
) -> Result<Option<RowId>> {
    if slot.is_empty() {
        return Ok(None);
    }
    let node = slot.resolve(store)?;
    minimum_node(node, store, key)
}

fn minimum_node(
    node: &mut Node,
    store: &mut BlockManager,
    key: &mut Vec<u8>,
) -> Result<Option<RowId>> {
    key.extend_from_slice(node.prefix().as_slice());
    match node {
        Node::Leaf(leaf) => Ok(Some(leaf.row_id)),
        _ => {
            let pos = node.get_min_pos().ok_or_else(|| {
                Error::CorruptIndex("interior node with no children".to_string())
            })?;
            key.push(node.get_byte(pos));
            minimum(node.child_mut(pos), store, key)
        }
    }
}

/// Descend to the smallest key `>= target` (`> target` when not
/// inclusive), appending the found key's bytes to `key`.
///
/// On a miss, `key` is restored to its length at entry.
fn ceiling(
    slot: &mut NodeRef,
    store: &mut BlockManager,
    target: &[u8],
    depth: usize,
    inclusive: bool,
    key: &mut Vec<u8>,
) -> Result<Option<RowId>> {
    if slot.is_empty() {
        return Ok(None);
    }

    let mark = key.len();
    let node = slot.resolve(store)?;
    let prefix_len = node.prefix().len();
    let mismatch = node.prefix().key_mismatch_position(target, depth);

    if mismatch < prefix_len {
        // Diverged inside the prefix, or the target ran out: the whole
        // subtree compares on the diverging byte.
        let subtree_greater = depth + mismatch >= target.len()
            || node.prefix().byte(mismatch) > target[depth + mismatch];
        if !subtree_greater {
            return Ok(None);
        }
        let result = minimum_node(node, store, key)?;
        if result.is_none() {
            key.truncate(mark);
        }
        return Ok(result);
    }

    key.extend_from_slice(node.prefix().as_slice());
    let next = depth + prefix_len;

    match node {
        Node::Leaf(leaf) => {
            // The prefix consumed target bytes without diverging, so the
            // leaf key is either equal to the target or a prefix of it.
            if next == target.len() && inclusive {
                return Ok(Some(leaf.row_id));
            }
            key.truncate(mark);
            Ok(None)
        }
        _ => {
            if next >= target.len() {
                // Target exhausted: every key below is longer, hence
                // greater; take the subtree minimum.
                let pos = node.get_min_pos().ok_or_else(|| {
                    Error::CorruptIndex("interior node with no children".to_string())
                })?;
                key.push(node.get_byte(pos));
                let result = minimum(node.child_mut(pos), store, key)?;
                if result.is_none() {
                    key.truncate(mark);
                }
                return Ok(result);
            }

            let byte = target[next];
            match node.get_child_pos_greater_equal(byte) {
                None => {
                    key.truncate(mark);
                    Ok(None)
                }
                Some((pos, true)) => {
                    // Exact child: search inside it first, then fall back
                    // to the next sibling's minimum.
                    key.push(byte);
                    if let Some(row_id) =
                        ceiling(node.child_mut(pos), store, target, next + 1, inclusive, key)?
                    {
                        return Ok(Some(row_id));
                    }
                    key.pop();

                    match node.get_next_pos(Some(pos)) {
                        None => {
                            key.truncate(mark);
                            Ok(None)
                        }
                        Some(next_pos) => {
                            key.push(node.get_byte(next_pos));
                            let result = minimum(node.child_mut(next_pos), store, key)?;
                            if result.is_none() {
                                key.truncate(mark);
                            }
                            Ok(result)
                        }
                    }
                }
                Some((pos, false)) => {
                    key.push(node.get_byte(pos));
                    let result = minimum(node.child_mut(pos), store, key)?;
                    if result.is_none() {
                        key.truncate(mark);
                    }
                    Ok(result)
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
