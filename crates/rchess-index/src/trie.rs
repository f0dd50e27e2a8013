//! Move-sequence trie (node arena)
//!
//! ノードは `Vec` に連続配置し、整数 ID で参照する。親は常に子より前に
//! 置かれるので、配列順に書き出せばそのまま親→子の順になる。
//!
//! 各ノードは「その手順に到達した局面キー」「通過した対局数」「その手順で
//! 終わった対局 ID（多重集合）」を持つ。

use std::collections::HashMap;

use crate::error::{IndexError, IndexResult};
use crate::graph::presentation_order;
use crate::position::{PositionHasher, PositionKey};
use crate::record::GameId;
use crate::types::Move;

/// Index of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) const fn from_raw(raw: u32) -> NodeId {
        NodeId(raw)
    }
}

#[derive(Debug, Clone)]
pub struct TrieNode {
    key: PositionKey,
    mv: Option<Move>,
    parent: Option<NodeId>,
    children: HashMap<Move, NodeId>,
    descendants: u64,
    terminals: Vec<GameId>,
}

impl TrieNode {
    fn new(key: PositionKey, mv: Option<Move>, parent: Option<NodeId>) -> Self {
        TrieNode {
            key,
            mv,
            parent,
            children: HashMap::new(),
            descendants: 0,
            terminals: Vec::new(),
        }
    }

    /// Position reached after this prefix
    pub fn key(&self) -> PositionKey {
        self.key
    }

    /// Move from the parent (`None` at the root)
    pub fn mv(&self) -> Option<Move> {
        self.mv
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Games that passed through this prefix
    pub fn descendants(&self) -> u64 {
        self.descendants
    }

    /// Games that ended exactly here, sorted (may repeat)
    pub fn terminals(&self) -> &[GameId] {
        &self.terminals
    }

    pub fn child(&self, mv: Move) -> Option<NodeId> {
        self.children.get(&mv).copied()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    fn add_terminals(&mut self, ids: &[GameId]) {
        if ids.is_empty() {
            return;
        }
        let mut merged = Vec::with_capacity(self.terminals.len() + ids.len());
        let (mut i, mut j) = (0, 0);
        while i < self.terminals.len() && j < ids.len() {
            if self.terminals[i] <= ids[j] {
                merged.push(self.terminals[i]);
                i += 1;
            } else {
                merged.push(ids[j]);
                j += 1;
            }
        }
        merged.extend_from_slice(&self.terminals[i..]);
        merged.extend_from_slice(&ids[j..]);
        self.terminals = merged;
    }
}

/// One continuation of a trie node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildView {
    pub mv: Move,
    pub node: NodeId,
    pub descendants: u64,
}

/// Prefix tree over move sequences
#[derive(Debug, Clone)]
pub struct MoveTrie {
    nodes: Vec<TrieNode>,
}

impl Default for MoveTrie {
    fn default() -> Self {
        Self::new(PositionHasher.startpos())
    }
}

impl MoveTrie {
    /// Empty trie whose root is `root_key`
    pub fn new(root_key: PositionKey) -> Self {
        MoveTrie {
            nodes: vec![TrieNode::new(root_key, None, None)],
        }
    }

    pub fn root(&self) -> &TrieNode {
        &self.nodes[0]
    }

    /// Number of nodes including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when nothing was inserted
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.nodes[0].descendants == 0
    }

    pub fn node(&self, id: NodeId) -> Option<&TrieNode> {
        self.nodes.get(id.index())
    }

    /// Nodes in arena order (every parent precedes its children)
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TrieNode)> + '_ {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i as u32), n))
    }

    fn alloc(&mut self, node: TrieNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn ensure_capacity(&self, extra: usize) -> IndexResult<()> {
        if self.nodes.len() + extra > u32::MAX as usize {
            return Err(IndexError::TrieFull(self.nodes.len()));
        }
        Ok(())
    }

    /// Check that `insert(moves, keys, _)` would succeed, without mutating.
    ///
    /// `keys[i]` is the position after `moves[i]`.
    pub fn check_insert(&self, moves: &[Move], keys: &[PositionKey]) -> IndexResult<()> {
        if moves.len() != keys.len() {
            return Err(IndexError::LengthMismatch {
                moves: moves.len(),
                keys: keys.len(),
            });
        }
        let mut node = NodeId::ROOT;
        let mut matched = 0;
        for (ply, (mv, key)) in moves.iter().zip(keys).enumerate() {
            let Some(child) = self.nodes[node.index()].child(*mv) else {
                break;
            };
            let existing = self.nodes[child.index()].key;
            if existing != *key {
                return Err(IndexError::KeyMismatch {
                    ply: ply + 1,
                    existing,
                    supplied: *key,
                });
            }
            node = child;
            matched += 1;
        }
        self.ensure_capacity(moves.len() - matched)
    }

    /// Insert one game. Either the whole path is created/updated or, on
    /// error, nothing changes.
    pub fn insert(&mut self, moves: &[Move], keys: &[PositionKey], game: GameId) -> IndexResult<NodeId> {
        self.check_insert(moves, keys)?;

        let mut node = NodeId::ROOT;
        self.nodes[0].descendants += 1;
        for (mv, key) in moves.iter().zip(keys) {
            node = match self.nodes[node.index()].child(*mv) {
                Some(child) => child,
                None => {
                    let child = self.alloc(TrieNode::new(*key, Some(*mv), Some(node)));
                    self.nodes[node.index()].children.insert(*mv, child);
                    child
                }
            };
            self.nodes[node.index()].descendants += 1;
        }
        self.nodes[node.index()].add_terminals(&[game]);
        Ok(node)
    }

    /// O(k) lookup of a move sequence
    pub fn lookup(&self, moves: &[Move]) -> Option<NodeId> {
        moves
            .iter()
            .try_fold(NodeId::ROOT, |node, mv| self.nodes[node.index()].child(*mv))
    }

    /// Continuations of `node` in presentation order
    pub fn child_moves(&self, node: NodeId) -> Vec<ChildView> {
        let Some(n) = self.node(node) else {
            return Vec::new();
        };
        let mut children: Vec<ChildView> = n
            .children
            .iter()
            .map(|(mv, id)| ChildView {
                mv: *mv,
                node: *id,
                descendants: self.nodes[id.index()].descendants,
            })
            .collect();
        children.sort_by(|a, b| presentation_order((a.descendants, a.mv), (b.descendants, b.mv)));
        children
    }

    /// Position key after each ply of `moves` (root excluded)
    pub fn key_path(&self, moves: &[Move]) -> Option<Vec<PositionKey>> {
        let mut node = NodeId::ROOT;
        let mut keys = Vec::with_capacity(moves.len());
        for mv in moves {
            node = self.nodes[node.index()].child(*mv)?;
            keys.push(self.nodes[node.index()].key);
        }
        Some(keys)
    }

    /// Moves leading from the root to `node`
    pub fn path_to(&self, node: NodeId) -> Option<Vec<Move>> {
        let mut moves = Vec::new();
        let mut current = self.node(node)?;
        while let (Some(mv), Some(parent)) = (current.mv, current.parent) {
            moves.push(mv);
            current = &self.nodes[parent.index()];
        }
        moves.reverse();
        Some(moves)
    }

    /// Structural merge: shared prefixes sum counters and union terminals,
    /// other branches are attached as they are. A shared prefix whose key
    /// differs between the two tries is a conflict and leaves `self`
    /// unchanged.
    pub fn merge(&mut self, other: MoveTrie) -> IndexResult<()> {
        self.check_merge(&other)?;

        let mut stack = vec![(NodeId::ROOT, NodeId::ROOT)];
        while let Some((mine, theirs)) = stack.pop() {
            let src = &other.nodes[theirs.index()];
            let dst = &mut self.nodes[mine.index()];
            dst.descendants += src.descendants;
            dst.add_terminals(&src.terminals);

            let mut children: Vec<(Move, NodeId)> = src.children.iter().map(|(m, id)| (*m, *id)).collect();
            children.sort_unstable_by_key(|(m, _)| m.raw());
            for (mv, their_child) in children {
                match self.nodes[mine.index()].child(mv) {
                    Some(my_child) => stack.push((my_child, their_child)),
                    None => self.graft(&other, their_child, mine),
                }
            }
        }
        Ok(())
    }

    pub(crate) fn check_merge(&self, other: &MoveTrie) -> IndexResult<()> {
        let mut new_nodes = 0usize;
        let mut stack = vec![(NodeId::ROOT, NodeId::ROOT)];
        while let Some((mine, theirs)) = stack.pop() {
            let a = &self.nodes[mine.index()];
            let b = &other.nodes[theirs.index()];
            if a.key != b.key {
                let from = a.parent.map_or(a.key, |p| self.nodes[p.index()].key);
                return Err(IndexError::MergeConflict {
                    from,
                    mv: a.mv.unwrap_or(Move::NULL),
                    left: a.key,
                    right: b.key,
                });
            }
            for (mv, their_child) in &b.children {
                match a.child(*mv) {
                    Some(my_child) => stack.push((my_child, *their_child)),
                    None => new_nodes += other.subtree_size(*their_child),
                }
            }
        }
        self.ensure_capacity(new_nodes)
    }

    fn subtree_size(&self, root: NodeId) -> usize {
        let mut count = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            count += 1;
            stack.extend(self.nodes[id.index()].children.values().copied());
        }
        count
    }

    /// `other` の部分木 `src` を `parent` の下に複製する
    fn graft(&mut self, other: &MoveTrie, src: NodeId, parent: NodeId) {
        let mut stack = vec![(src, parent)];
        while let Some((src, parent)) = stack.pop() {
            let s = &other.nodes[src.index()];
            let mut copy = TrieNode::new(s.key, s.mv, Some(parent));
            copy.descendants = s.descendants;
            copy.terminals = s.terminals.clone();
            let id = self.alloc(copy);
            if let Some(mv) = s.mv {
                self.nodes[parent.index()].children.insert(mv, id);
            }
            let mut children: Vec<NodeId> = s.children.values().copied().collect();
            children.sort_unstable();
            stack.extend(children.into_iter().map(|c| (c, id)));
        }
    }

    /// Maintenance: drop every subtree whose root was reached by fewer than
    /// `min_descendants` games. The arena is rebuilt, so node ids change.
    /// Returns the number of nodes removed.
    pub fn prune(&mut self, min_descendants: u64) -> usize {
        let before = self.nodes.len();
        let old = std::mem::take(&mut self.nodes);
        let root = &old[0];
        let mut rebuilt = MoveTrie {
            nodes: vec![TrieNode {
                children: HashMap::new(),
                ..root.clone()
            }],
        };
        let mut queue = std::collections::VecDeque::from([(NodeId::ROOT, NodeId::ROOT)]);
        while let Some((src, dst)) = queue.pop_front() {
            let mut children: Vec<(Move, NodeId)> =
                old[src.index()].children.iter().map(|(m, id)| (*m, *id)).collect();
            children.sort_unstable_by_key(|(m, _)| m.raw());
            for (mv, child) in children {
                let c = &old[child.index()];
                if c.descendants < min_descendants {
                    continue;
                }
                let id = rebuilt.alloc(TrieNode {
                    parent: Some(dst),
                    children: HashMap::new(),
                    ..c.clone()
                });
                rebuilt.nodes[dst.index()].children.insert(mv, id);
                queue.push_back((child, id));
            }
        }
        *self = rebuilt;
        before - self.nodes.len()
    }

    /// Append a node while loading stored data. Fails on an unknown parent
    /// or a duplicate child move.
    pub(crate) fn restore_child(
        &mut self,
        parent: NodeId,
        mv: Move,
        key: PositionKey,
        descendants: u64,
        terminals: Vec<GameId>,
    ) -> Result<NodeId, String> {
        let Some(p) = self.nodes.get(parent.index()) else {
            return Err(format!("parent {} out of range", parent.raw()));
        };
        if p.children.contains_key(&mv) {
            return Err(format!("duplicate child {mv} under node {}", parent.raw()));
        }
        if !terminals.is_sorted() {
            return Err(format!("unsorted terminals under node {}", parent.raw()));
        }
        if self.nodes.len() >= u32::MAX as usize {
            return Err("too many nodes".to_string());
        }
        let mut node = TrieNode::new(key, Some(mv), Some(parent));
        node.descendants = descendants;
        node.terminals = terminals;
        let id = self.alloc(node);
        self.nodes[parent.index()].children.insert(mv, id);
        Ok(id)
    }

    pub(crate) fn restore_root(key: PositionKey, descendants: u64, terminals: Vec<GameId>) -> Self {
        let mut trie = MoveTrie::new(key);
        trie.nodes[0].descendants = descendants;
        trie.nodes[0].terminals = terminals;
        trie
    }
}

/// Structural equality: same prefixes with the same keys, counters and
/// terminals, regardless of arena layout.
impl PartialEq for MoveTrie {
    fn eq(&self, other: &Self) -> bool {
        if self.nodes.len() != other.nodes.len() {
            return false;
        }
        let mut stack = vec![(NodeId::ROOT, NodeId::ROOT)];
        while let Some((a, b)) = stack.pop() {
            let (x, y) = (&self.nodes[a.index()], &other.nodes[b.index()]);
            if x.key != y.key
                || x.descendants != y.descendants
                || x.terminals != y.terminals
                || x.children.len() != y.children.len()
            {
                return false;
            }
            for (mv, xc) in &x.children {
                match y.child(*mv) {
                    Some(yc) => stack.push((*xc, yc)),
                    None => return false,
                }
            }
        }
        true
    }
}

impl Eq for MoveTrie {}

#[cfg(test)]
mod tests {
    use super::*;

    fn moves(line: &str) -> Vec<Move> {
        crate::types::parse_uci_line(line).unwrap()
    }

    /// 手順からキー列を作る（テスト用に手と長さだけで決まる擬似キー）
    fn fake_keys(line: &str) -> Vec<PositionKey> {
        let ms = moves(line);
        (1..=ms.len())
            .map(|n| {
                let h = ms[..n].iter().fold(17u64, |acc, m| acc.wrapping_mul(31).wrapping_add(m.raw() as u64));
                PositionKey(h)
            })
            .collect()
    }

    fn insert(trie: &mut MoveTrie, line: &str, game: u64) -> NodeId {
        trie.insert(&moves(line), &fake_keys(line), GameId(game)).unwrap()
    }

    #[test]
    fn test_insert_counts_and_terminals() {
        let mut trie = MoveTrie::new(PositionKey(0));
        insert(&mut trie, "e2e4 e7e5 g1f3", 1);
        let end = insert(&mut trie, "e2e4 e7e5 b1c3", 2);
        insert(&mut trie, "e2e4 e7e5", 3);

        assert_eq!(trie.root().descendants(), 3);
        let mid = trie.lookup(&moves("e2e4 e7e5")).unwrap();
        assert_eq!(trie.node(mid).unwrap().descendants(), 3);
        assert_eq!(trie.node(mid).unwrap().terminals(), &[GameId(3)]);
        assert_eq!(trie.node(end).unwrap().terminals(), &[GameId(2)]);
        assert_eq!(trie.lookup(&moves("d2d4")), None);
        assert_eq!(trie.len(), 5);
    }

    #[test]
    fn test_same_game_twice_increments() {
        let mut trie = MoveTrie::new(PositionKey(0));
        insert(&mut trie, "d2d4 d7d5", 9);
        insert(&mut trie, "d2d4 d7d5", 9);
        let node = trie.lookup(&moves("d2d4 d7d5")).unwrap();
        assert_eq!(trie.node(node).unwrap().descendants(), 2);
        assert_eq!(trie.node(node).unwrap().terminals(), &[GameId(9), GameId(9)]);
    }

    #[test]
    fn test_insert_is_atomic_on_key_mismatch() {
        let mut trie = MoveTrie::new(PositionKey(0));
        insert(&mut trie, "e2e4 e7e5", 1);
        let before = trie.clone();

        let mut keys = fake_keys("e2e4 e7e5 g1f3");
        keys[1] = PositionKey(12345);
        let err = trie.insert(&moves("e2e4 e7e5 g1f3"), &keys, GameId(2)).unwrap_err();
        assert!(matches!(err, IndexError::KeyMismatch { ply: 2, .. }));
        assert_eq!(trie, before);
        assert_eq!(trie.len(), before.len());

        let err = trie.insert(&moves("e2e4"), &[], GameId(3)).unwrap_err();
        assert!(matches!(err, IndexError::LengthMismatch { moves: 1, keys: 0 }));
    }

    #[test]
    fn test_child_moves_order() {
        let mut trie = MoveTrie::new(PositionKey(0));
        insert(&mut trie, "g1f3", 1);
        insert(&mut trie, "b1c3", 2);
        insert(&mut trie, "e2e4", 3);
        insert(&mut trie, "e2e4", 4);
        let order: Vec<_> = trie.child_moves(NodeId::ROOT).iter().map(|c| c.mv).collect();
        assert_eq!(order, moves("e2e4 b1c3 g1f3"));
    }

    #[test]
    fn test_paths() {
        let mut trie = MoveTrie::new(PositionKey(0));
        let end = insert(&mut trie, "c2c4 e7e5 b1c3", 1);
        assert_eq!(trie.path_to(end).unwrap(), moves("c2c4 e7e5 b1c3"));
        assert_eq!(trie.path_to(NodeId::ROOT).unwrap(), vec![]);
        assert_eq!(trie.key_path(&moves("c2c4 e7e5 b1c3")).unwrap(), fake_keys("c2c4 e7e5 b1c3"));
        assert_eq!(trie.key_path(&moves("c2c4 c7c5")), None);
    }

    fn build(lines: &[(&str, u64)]) -> MoveTrie {
        let mut trie = MoveTrie::new(PositionKey(0));
        for (line, game) in lines {
            insert(&mut trie, line, *game);
        }
        trie
    }

    #[test]
    fn test_merge_matches_single_build() {
        let games = [
            ("e2e4 e7e5 g1f3", 1),
            ("e2e4 c7c5", 2),
            ("d2d4 d7d5 c2c4", 3),
            ("e2e4 e7e5 g1f3", 4),
            ("e2e4", 5),
        ];
        let whole = build(&games);
        let mut left = build(&games[..2]);
        let right = build(&games[2..]);
        let mut right2 = right.clone();
        left.merge(right).unwrap();
        assert_eq!(left, whole);

        right2.merge(build(&games[..2])).unwrap();
        assert_eq!(right2, whole);
    }

    #[test]
    fn test_merge_conflict_leaves_receiver_untouched() {
        let mut left = build(&[("e2e4 e7e5", 1)]);
        let before = left.clone();
        let mut right = MoveTrie::new(PositionKey(0));
        let mut keys = fake_keys("e2e4 e7e5");
        keys[1] = PositionKey(7);
        right.insert(&moves("e2e4 e7e5"), &keys, GameId(2)).unwrap();

        let err = left.merge(right).unwrap_err();
        assert!(matches!(err, IndexError::MergeConflict { right: PositionKey(7), .. }));
        assert_eq!(left, before);
    }

    #[test]
    fn test_prune() {
        let mut trie = build(&[("e2e4 e7e5", 1), ("e2e4 c7c5", 2), ("d2d4", 3), ("e2e4 e7e5", 4)]);
        let removed = trie.prune(2);
        // d2d4 (1局) と e2e4 c7c5 (1局) が消える
        assert_eq!(removed, 2);
        assert!(trie.lookup(&moves("e2e4 e7e5")).is_some());
        assert!(trie.lookup(&moves("d2d4")).is_none());
        assert_eq!(trie.root().descendants(), 4);
    }
}
