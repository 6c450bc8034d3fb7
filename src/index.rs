//! Ordered row index: a B+ tree keyed by `i64` row ids.
//!
//! Nodes live in an arena (`Vec<Node<V>>`) and refer to each other by
//! [NodeId]. A [BitVec] records which arena slots are live, so slots freed
//! by merges are handed out again by the next split. There are no parent
//! pointers: a split is reported back up the recursion, and an underflowing
//! child is repaired by its parent once the recursive remove returns.

use std::fmt;
use std::mem;

use bitvec::prelude::*;
use thiserror::Error;

/// Index of a node inside the arena.
pub type NodeId = usize;

/// Maximum number of keys per node used by [BTreeIndex::new].
pub const DEFAULT_ORDER: usize = 32;

/// Smallest order that still lets every split produce two valid halves.
pub const MIN_ORDER: usize = 3;

/// Returned by [BTreeIndex::insert] when the key is already present.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("record with key {0} already exists")]
pub struct DuplicateKey(pub i64);

#[derive(Debug, Clone)]
enum Node<V> {
    Leaf {
        keys: Vec<i64>,
        values: Vec<V>,
        next: Option<NodeId>,
    },
    /// `children[i]` holds keys `< keys[i]`, `children[i + 1]` keys `>= keys[i]`.
    Internal {
        keys: Vec<i64>,
        children: Vec<NodeId>,
    },
}

impl<V> Node<V> {
    fn empty_leaf() -> Self {
        Node::Leaf {
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
        }
    }

    fn key_count(&self) -> usize {
        match self {
            Node::Leaf { keys, .. } | Node::Internal { keys, .. } => keys.len(),
        }
    }
}

/// Slot of the child that may contain `key`.
fn child_slot(keys: &[i64], key: i64) -> usize {
    keys.partition_point(|k| *k <= key)
}

/// An ordered map from `i64` to `V` with `O(log n)` insert, lookup and
/// removal, and an ascending scan over the leaf chain.
///
/// # Example
/// ```
/// # use oxylite::index::BTreeIndex;
/// let mut index = BTreeIndex::with_order(3);
/// for id in [5, 3, 8, 1, 4] {
///     index.insert(id, id * 10).unwrap();
/// }
/// assert!(index.insert(3, 0).is_err());
/// assert_eq!(index.keys().collect::<Vec<_>>(), vec![1, 3, 4, 5, 8]);
/// assert_eq!(index.remove(4), Some(40));
/// assert_eq!(index.remove(4), None);
/// ```
#[derive(Clone)]
pub struct BTreeIndex<V> {
    nodes: Vec<Node<V>>,
    live: BitVec,
    root: NodeId,
    order: usize,
    len: usize,
}

impl<V> BTreeIndex<V> {
    pub fn new() -> Self {
        Self::with_order(DEFAULT_ORDER)
    }

    /// Creates an empty index whose nodes hold at most `order` keys.
    /// Orders below [MIN_ORDER] are raised to it.
    pub fn with_order(order: usize) -> Self {
        Self {
            nodes: vec![Node::empty_leaf()],
            live: bitvec![1],
            root: 0,
            order: order.max(MIN_ORDER),
            len: 0,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops every entry, keeping the order.
    pub fn clear(&mut self) {
        *self = Self::with_order(self.order);
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.get(key).is_some()
    }

    /// Point lookup.
    pub fn get(&self, key: i64) -> Option<&V> {
        match &self.nodes[self.find_leaf(key)] {
            Node::Leaf { keys, values, .. } => keys.binary_search(&key).ok().map(|i| &values[i]),
            Node::Internal { .. } => None,
        }
    }

    /// Mutable point lookup. The key itself cannot be changed through it.
    pub fn get_mut(&mut self, key: i64) -> Option<&mut V> {
        let leaf = self.find_leaf(key);
        match &mut self.nodes[leaf] {
            Node::Leaf { keys, values, .. } => match keys.binary_search(&key) {
                Ok(i) => Some(&mut values[i]),
                Err(_) => None,
            },
            Node::Internal { .. } => None,
        }
    }

    /// Inserts a new entry.
    ///
    /// # Errors
    /// [DuplicateKey] if `key` is already present; the index is left untouched.
    pub fn insert(&mut self, key: i64, value: V) -> Result<(), DuplicateKey> {
        if let Some((separator, right)) = self.insert_into(self.root, key, value)? {
            let left = self.root;
            self.root = self.alloc(Node::Internal {
                keys: vec![separator],
                children: vec![left, right],
            });
        }
        self.len += 1;
        Ok(())
    }

    /// Removes an entry, returning its value, or `None` if the key is absent.
    pub fn remove(&mut self, key: i64) -> Option<V> {
        let removed = self.remove_from(self.root, key)?;
        self.len -= 1;

        // an internal root left with a single child hands the root over to it
        if let Node::Internal { keys, children } = &self.nodes[self.root] {
            if keys.is_empty() {
                let old = mem::replace(&mut self.root, children[0]);
                self.free(old);
            }
        }
        Some(removed)
    }

    /// Ascending iteration over `(key, value)` pairs.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            index: self,
            leaf: Some(self.leftmost_leaf()),
            pos: 0,
            remaining: self.len,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = i64> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    pub fn first_key(&self) -> Option<i64> {
        self.keys().next()
    }

    pub fn last_key(&self) -> Option<i64> {
        let mut id = self.root;
        loop {
            match &self.nodes[id] {
                Node::Internal { children, .. } => id = *children.last()?,
                Node::Leaf { keys, .. } => return keys.last().copied(),
            }
        }
    }

    /// Number of levels, a lone leaf being 1.
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut id = self.root;
        while let Node::Internal { children, .. } = &self.nodes[id] {
            id = children[0];
            height += 1;
        }
        height
    }

    fn min_keys(&self) -> usize {
        self.order / 2
    }

    fn find_leaf(&self, key: i64) -> NodeId {
        let mut id = self.root;
        while let Node::Internal { keys, children } = &self.nodes[id] {
            id = children[child_slot(keys, key)];
        }
        id
    }

    fn leftmost_leaf(&self) -> NodeId {
        let mut id = self.root;
        while let Node::Internal { children, .. } = &self.nodes[id] {
            id = children[0];
        }
        id
    }

    // --- Arena ---

    fn alloc(&mut self, node: Node<V>) -> NodeId {
        match self.live.first_zero() {
            Some(id) => {
                self.nodes[id] = node;
                self.live.set(id, true);
                id
            }
            None => {
                self.nodes.push(node);
                self.live.push(true);
                self.nodes.len() - 1
            }
        }
    }

    fn free(&mut self, id: NodeId) {
        self.nodes[id] = Node::empty_leaf();
        self.live.set(id, false);
    }

    fn take(&mut self, id: NodeId) -> Node<V> {
        mem::replace(&mut self.nodes[id], Node::empty_leaf())
    }

    fn children_of(&self, parent: NodeId) -> &[NodeId] {
        match &self.nodes[parent] {
            Node::Internal { children, .. } => children,
            Node::Leaf { .. } => &[],
        }
    }

    fn separator_mut(&mut self, parent: NodeId, idx: usize) -> &mut i64 {
        match &mut self.nodes[parent] {
            Node::Internal { keys, .. } => &mut keys[idx],
            Node::Leaf { .. } => unreachable!("a leaf has no separators"),
        }
    }

    // --- Insertion ---

    /// Returns the separator and id of the new right sibling when `id` split.
    fn insert_into(
        &mut self,
        id: NodeId,
        key: i64,
        value: V,
    ) -> Result<Option<(i64, NodeId)>, DuplicateKey> {
        let (slot, child) = match &mut self.nodes[id] {
            Node::Leaf { keys, values, next } => {
                let pos = match keys.binary_search(&key) {
                    Ok(_) => return Err(DuplicateKey(key)),
                    Err(pos) => pos,
                };
                keys.insert(pos, key);
                values.insert(pos, value);
                if keys.len() <= self.order {
                    return Ok(None);
                }

                let mid = keys.len() / 2;
                let right_keys = keys.split_off(mid);
                let separator = right_keys[0];
                let right = Node::Leaf {
                    keys: right_keys,
                    values: values.split_off(mid),
                    next: next.take(),
                };
                let right_id = self.alloc(right);
                if let Node::Leaf { next, .. } = &mut self.nodes[id] {
                    *next = Some(right_id);
                }
                return Ok(Some((separator, right_id)));
            }
            Node::Internal { keys, children } => {
                let slot = child_slot(keys, key);
                (slot, children[slot])
            }
        };

        match self.insert_into(child, key, value)? {
            Some((separator, right)) => Ok(self.insert_separator(id, slot, separator, right)),
            None => Ok(None),
        }
    }

    fn insert_separator(
        &mut self,
        id: NodeId,
        slot: usize,
        separator: i64,
        right: NodeId,
    ) -> Option<(i64, NodeId)> {
        let Node::Internal { keys, children } = &mut self.nodes[id] else {
            unreachable!("separator pushed into a leaf")
        };
        keys.insert(slot, separator);
        children.insert(slot + 1, right);
        if keys.len() <= self.order {
            return None;
        }

        let mid = keys.len() / 2;
        let mut right_keys = keys.split_off(mid);
        let promoted = right_keys.remove(0);
        let right_children = children.split_off(mid + 1);
        let right_id = self.alloc(Node::Internal {
            keys: right_keys,
            children: right_children,
        });
        Some((promoted, right_id))
    }

    // --- Removal ---

    fn remove_from(&mut self, id: NodeId, key: i64) -> Option<V> {
        let (slot, child) = match &mut self.nodes[id] {
            Node::Leaf { keys, values, .. } => {
                let pos = keys.binary_search(&key).ok()?;
                keys.remove(pos);
                return Some(values.remove(pos));
            }
            Node::Internal { keys, children } => {
                let slot = child_slot(keys, key);
                (slot, children[slot])
            }
        };

        let removed = self.remove_from(child, key)?;
        if self.nodes[child].key_count() < self.min_keys() {
            self.rebalance(id, slot);
        }
        Some(removed)
    }

    /// Repairs the underflowing child at `slot` of `parent`.
    fn rebalance(&mut self, parent: NodeId, slot: usize) {
        let min = self.min_keys();
        let children = self.children_of(parent);
        let left = slot.checked_sub(1).map(|s| children[s]);
        let right = children.get(slot + 1).copied();

        if left.is_some_and(|l| self.nodes[l].key_count() > min) {
            self.borrow_from_left(parent, slot);
        } else if right.is_some_and(|r| self.nodes[r].key_count() > min) {
            self.borrow_from_right(parent, slot);
        } else if left.is_some() {
            self.merge(parent, slot - 1);
        } else if right.is_some() {
            self.merge(parent, slot);
        }
    }

    fn borrow_from_left(&mut self, parent: NodeId, slot: usize) {
        let children = self.children_of(parent);
        let (left_id, child_id) = (children[slot - 1], children[slot]);
        let mut left = self.take(left_id);
        let mut child = self.take(child_id);

        match (&mut left, &mut child) {
            (
                Node::Leaf {
                    keys: lk,
                    values: lv,
                    ..
                },
                Node::Leaf {
                    keys: ck,
                    values: cv,
                    ..
                },
            ) => {
                if let (Some(k), Some(v)) = (lk.pop(), lv.pop()) {
                    ck.insert(0, k);
                    cv.insert(0, v);
                    *self.separator_mut(parent, slot - 1) = k;
                }
            }
            (
                Node::Internal {
                    keys: lk,
                    children: lc,
                },
                Node::Internal {
                    keys: ck,
                    children: cc,
                },
            ) => {
                if let (Some(k), Some(c)) = (lk.pop(), lc.pop()) {
                    let separator = mem::replace(self.separator_mut(parent, slot - 1), k);
                    ck.insert(0, separator);
                    cc.insert(0, c);
                }
            }
            _ => unreachable!("siblings live at the same depth"),
        }

        self.nodes[left_id] = left;
        self.nodes[child_id] = child;
    }

    fn borrow_from_right(&mut self, parent: NodeId, slot: usize) {
        let children = self.children_of(parent);
        let (child_id, right_id) = (children[slot], children[slot + 1]);
        let mut child = self.take(child_id);
        let mut right = self.take(right_id);

        match (&mut child, &mut right) {
            (
                Node::Leaf {
                    keys: ck,
                    values: cv,
                    ..
                },
                Node::Leaf {
                    keys: rk,
                    values: rv,
                    ..
                },
            ) => {
                ck.push(rk.remove(0));
                cv.push(rv.remove(0));
                *self.separator_mut(parent, slot) = rk[0];
            }
            (
                Node::Internal {
                    keys: ck,
                    children: cc,
                },
                Node::Internal {
                    keys: rk,
                    children: rc,
                },
            ) => {
                let separator = mem::replace(self.separator_mut(parent, slot), rk.remove(0));
                ck.push(separator);
                cc.push(rc.remove(0));
            }
            _ => unreachable!("siblings live at the same depth"),
        }

        self.nodes[child_id] = child;
        self.nodes[right_id] = right;
    }

    /// Folds the child at `left_slot + 1` into the one at `left_slot`.
    fn merge(&mut self, parent: NodeId, left_slot: usize) {
        let (separator, right_id) = match &mut self.nodes[parent] {
            Node::Internal { keys, children } => {
                (keys.remove(left_slot), children.remove(left_slot + 1))
            }
            Node::Leaf { .. } => unreachable!("a leaf has no children to merge"),
        };
        let left_id = self.children_of(parent)[left_slot];
        let right = self.take(right_id);

        match (&mut self.nodes[left_id], right) {
            (
                Node::Leaf { keys, values, next },
                Node::Leaf {
                    keys: rk,
                    values: rv,
                    next: rn,
                },
            ) => {
                keys.extend(rk);
                values.extend(rv);
                *next = rn;
            }
            (
                Node::Internal { keys, children },
                Node::Internal {
                    keys: rk,
                    children: rc,
                },
            ) => {
                keys.push(separator);
                keys.extend(rk);
                children.extend(rc);
            }
            _ => unreachable!("siblings live at the same depth"),
        }
        self.free(right_id);
    }
}

impl<V> Default for BTreeIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Logical equality: same keys mapped to equal values, whatever the node layout.
impl<V: PartialEq> PartialEq for BTreeIndex<V> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<V: fmt::Debug> fmt::Debug for BTreeIndex<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Ascending iterator over a [BTreeIndex], following the leaf chain.
pub struct Iter<'a, V> {
    index: &'a BTreeIndex<V>,
    leaf: Option<NodeId>,
    pos: usize,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (i64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.index;
        loop {
            let Node::Leaf { keys, values, next } = &index.nodes[self.leaf?] else {
                return None;
            };
            if self.pos < keys.len() {
                let item = (keys[self.pos], &values[self.pos]);
                self.pos += 1;
                self.remaining -= 1;
                return Some(item);
            }
            self.leaf = *next;
            self.pos = 0;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}

impl<'a, V> IntoIterator for &'a BTreeIndex<V> {
    type Item = (i64, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    impl<V> BTreeIndex<V> {
        /// Walks the whole tree and panics on any broken structural rule.
        fn check_invariants(&self) {
            let mut leaves = Vec::new();
            let mut reachable = 0;
            self.check_node(self.root, None, None, 1, &mut leaves, &mut reachable);

            let depths: Vec<usize> = leaves.iter().map(|(_, d)| *d).collect();
            assert!(depths.windows(2).all(|w| w[0] == w[1]), "unbalanced");

            // leaf chain visits leaves left to right
            let mut chained = Vec::new();
            let mut id = Some(self.leftmost_leaf());
            while let Some(leaf) = id {
                chained.push(leaf);
                id = match &self.nodes[leaf] {
                    Node::Leaf { next, .. } => *next,
                    Node::Internal { .. } => panic!("internal node in leaf chain"),
                };
            }
            let ordered: Vec<NodeId> = leaves.iter().map(|(id, _)| *id).collect();
            assert_eq!(chained, ordered);

            assert_eq!(self.live.count_ones(), reachable);
            assert_eq!(self.iter().count(), self.len);
        }

        fn check_node(
            &self,
            id: NodeId,
            low: Option<i64>,
            high: Option<i64>,
            depth: usize,
            leaves: &mut Vec<(NodeId, usize)>,
            reachable: &mut usize,
        ) {
            assert!(self.live[id], "dangling node {id}");
            *reachable += 1;
            let node = &self.nodes[id];
            let keys = match node {
                Node::Leaf { keys, .. } | Node::Internal { keys, .. } => keys,
            };
            assert!(keys.windows(2).all(|w| w[0] < w[1]), "unsorted keys");
            assert!(keys.len() <= self.order, "overfull node");
            if id != self.root {
                assert!(keys.len() >= self.min_keys(), "underfull node");
            }
            for k in keys {
                assert!(low.is_none_or(|l| *k >= l));
                assert!(high.is_none_or(|h| *k < h));
            }
            match node {
                Node::Leaf { keys, values, .. } => {
                    assert_eq!(keys.len(), values.len());
                    leaves.push((id, depth));
                }
                Node::Internal { keys, children } => {
                    assert_eq!(children.len(), keys.len() + 1);
                    for (i, child) in children.iter().enumerate() {
                        let lo = if i == 0 { low } else { Some(keys[i - 1]) };
                        let hi = if i == keys.len() { high } else { Some(keys[i]) };
                        self.check_node(*child, lo, hi, depth + 1, leaves, reachable);
                    }
                }
            }
        }
    }

    #[test]
    fn test_empty_index() {
        let index: BTreeIndex<i32> = BTreeIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.get(1), None);
        assert_eq!(index.iter().next(), None);
        assert_eq!(index.first_key(), None);
        assert_eq!(index.last_key(), None);
        assert_eq!(index.height(), 1);
    }

    #[test]
    fn test_insert_scan_is_ordered() {
        let mut index = BTreeIndex::with_order(3);
        for id in [5, 3, 8, 1, 4] {
            index.insert(id, format!("row{id}")).unwrap();
        }

        assert_eq!(index.keys().collect::<Vec<_>>(), vec![1, 3, 4, 5, 8]);
        assert_eq!(index.get(8).map(String::as_str), Some("row8"));
        assert_eq!(index.first_key(), Some(1));
        assert_eq!(index.last_key(), Some(8));
        index.check_invariants();
    }

    #[test]
    fn test_duplicate_key_leaves_index_untouched() {
        let mut index = BTreeIndex::with_order(3);
        index.insert(1, "a").unwrap();

        assert_eq!(index.insert(1, "b"), Err(DuplicateKey(1)));
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(1), Some(&"a"));
    }

    #[test]
    fn test_scan_is_restartable() {
        let mut index = BTreeIndex::with_order(4);
        for id in 0..20 {
            index.insert(id, id).unwrap();
        }
        let first: Vec<i64> = index.keys().take(5).collect();
        let again: Vec<i64> = index.keys().take(5).collect();
        assert_eq!(first, again);
        assert_eq!(index.iter().len(), 20);
    }

    #[test]
    fn test_splits_grow_height() {
        let mut index = BTreeIndex::with_order(3);
        for id in 0..100 {
            index.insert(id, ()).unwrap();
        }
        assert!(index.height() > 2);
        index.check_invariants();
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut index = BTreeIndex::with_order(3);
        index.insert(1, 1).unwrap();
        assert_eq!(index.remove(2), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_everything_collapses_tree() {
        let mut index = BTreeIndex::with_order(3);
        for id in 0..64 {
            index.insert(id, id).unwrap();
        }
        for id in (0..64).rev().step_by(2) {
            assert_eq!(index.remove(id), Some(id));
            index.check_invariants();
        }
        for id in (0..64).step_by(2) {
            assert_eq!(index.remove(id), Some(id));
            index.check_invariants();
        }
        assert!(index.is_empty());
        assert_eq!(index.height(), 1);
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let mut index = BTreeIndex::with_order(3);
        for id in 0..50 {
            index.insert(id, id).unwrap();
        }
        for id in 0..50 {
            index.remove(id);
        }
        let arena = index.nodes.len();
        for id in 0..50 {
            index.insert(id, id).unwrap();
        }
        assert_eq!(index.nodes.len(), arena);
        index.check_invariants();
    }

    #[test]
    fn test_get_mut_updates_value() {
        let mut index = BTreeIndex::with_order(3);
        for id in 0..10 {
            index.insert(id, id * 2).unwrap();
        }
        *index.get_mut(7).unwrap() = -1;
        assert_eq!(index.get(7), Some(&-1));
        assert!(index.get_mut(70).is_none());
    }

    #[test]
    fn test_equality_ignores_layout() {
        let mut a = BTreeIndex::with_order(3);
        let mut b = BTreeIndex::with_order(8);
        for id in 0..30 {
            a.insert(id, id).unwrap();
        }
        for id in (0..30).rev() {
            b.insert(id, id).unwrap();
        }
        assert_eq!(a, b);
        b.remove(3);
        assert_ne!(a, b);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut a = BTreeIndex::with_order(3);
        for id in 0..10 {
            a.insert(id, vec![id]).unwrap();
        }
        let snapshot = a.clone();
        a.get_mut(1).unwrap().push(99);
        a.remove(2);
        assert_eq!(snapshot.get(1), Some(&vec![1]));
        assert!(snapshot.contains_key(2));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(i64),
        Remove(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-50i64..50).prop_map(Op::Insert),
            (-50i64..50).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_matches_btreemap(order in 3usize..7, ops in prop::collection::vec(op(), 0..300)) {
            let mut index = BTreeIndex::with_order(order);
            let mut model = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(k) => {
                        let expected = !model.contains_key(&k);
                        prop_assert_eq!(index.insert(k, k * 3).is_ok(), expected);
                        model.entry(k).or_insert(k * 3);
                    }
                    Op::Remove(k) => {
                        prop_assert_eq!(index.remove(k), model.remove(&k));
                    }
                }
            }

            index.check_invariants();
            let got: Vec<(i64, i64)> = index.iter().map(|(k, v)| (k, *v)).collect();
            let want: Vec<(i64, i64)> = model.into_iter().collect();
            prop_assert_eq!(got, want);
        }
    }
}
