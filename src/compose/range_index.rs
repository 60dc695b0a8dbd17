// Splay-tree index of already-composed ranges.
//
// Each node maps a range `[offset, limit)` of the first window's target
// to the position in the composite target where those bytes were
// produced.  Nodes live in an arena and are linked twice: as a binary
// search tree keyed on `offset` (splayed on every lookup) and as a
// doubly linked list in ascending offset order.  Slot 0 is the scratch
// header used by the top-down splay.
//
// After every insertion, ranges covered by the new range together with
// its neighbours are pruned, so the index holds at most one entry per
// distinct stretch of the first window's target.

const NIL: usize = usize::MAX;
const SCRATCH: usize = 0;

#[derive(Debug, Clone, Copy)]
struct Node {
    offset: usize,
    limit: usize,
    target_offset: usize,
    left: usize,
    right: usize,
    prev: usize,
    next: usize,
}

impl Node {
    const EMPTY: Node = Node {
        offset: 0,
        limit: 0,
        target_offset: 0,
        left: NIL,
        right: NIL,
        prev: NIL,
        next: NIL,
    };
}

/// Where the bytes of a range come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    /// Not composed yet: expand the first window's instructions.
    FromSource,
    /// Already produced in the composite target at `target_offset`.
    FromTarget,
}

/// One piece of a range list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub kind: RangeKind,
    pub offset: usize,
    pub limit: usize,
    pub target_offset: usize,
}

/// The splay-tree range index.
#[derive(Debug, Clone)]
pub struct RangeIndex {
    nodes: Vec<Node>,
    free: Vec<usize>,
    root: usize,
}

impl Default for RangeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeIndex {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::EMPTY],
            free: Vec::new(),
            root: NIL,
        }
    }

    /// Number of live ranges.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1 - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root == NIL
    }

    fn alloc(&mut self, offset: usize, limit: usize, target_offset: usize) -> usize {
        let node = Node {
            offset,
            limit,
            target_offset,
            ..Node::EMPTY
        };
        match self.free.pop() {
            Some(i) => {
                self.nodes[i] = node;
                i
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn free_node(&mut self, n: usize) {
        let Node { prev, next, .. } = self.nodes[n];
        if next != NIL {
            self.nodes[next].prev = prev;
        }
        if prev != NIL {
            self.nodes[prev].next = next;
        }
        self.free.push(n);
    }

    fn delete_subtree(&mut self, node: usize) {
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if n == NIL {
                continue;
            }
            stack.push(self.nodes[n].left);
            stack.push(self.nodes[n].right);
            self.free_node(n);
        }
    }

    /// Splay so that the root is the node with the largest offset not
    /// above `offset`, or the smallest node if every offset is above it.
    pub fn splay(&mut self, offset: usize) {
        let mut tree = self.root;
        if tree == NIL {
            return;
        }

        self.nodes[SCRATCH].left = NIL;
        self.nodes[SCRATCH].right = NIL;
        let mut left = SCRATCH;
        let mut right = SCRATCH;

        loop {
            let tree_offset = self.nodes[tree].offset;
            if offset < tree_offset {
                let l = self.nodes[tree].left;
                if l != NIL && offset < self.nodes[l].offset {
                    // Rotate right.
                    self.nodes[tree].left = self.nodes[l].right;
                    self.nodes[l].right = tree;
                    tree = l;
                }
                let l = self.nodes[tree].left;
                if l == NIL {
                    break;
                }
                self.nodes[right].left = tree;
                right = tree;
                tree = l;
            } else if offset > tree_offset {
                let r = self.nodes[tree].right;
                if r != NIL && offset > self.nodes[r].offset {
                    // Rotate left.
                    self.nodes[tree].right = self.nodes[r].left;
                    self.nodes[r].left = tree;
                    tree = r;
                }
                let r = self.nodes[tree].right;
                if r == NIL {
                    break;
                }
                self.nodes[left].right = tree;
                left = tree;
                tree = r;
            } else {
                break;
            }
        }

        // Reassemble.
        self.nodes[left].right = self.nodes[tree].left;
        self.nodes[right].left = self.nodes[tree].right;
        self.nodes[tree].left = self.nodes[SCRATCH].right;
        self.nodes[tree].right = self.nodes[SCRATCH].left;

        // Lift the predecessor of `offset` to the root, so new ranges can
        // always go to the right of it.
        let l = self.nodes[tree].left;
        if offset < self.nodes[tree].offset && l != NIL {
            if self.nodes[l].right == NIL {
                self.nodes[tree].left = NIL;
                self.nodes[l].right = tree;
                tree = l;
            } else {
                let mut parent = l;
                let mut node = self.nodes[l].right;
                while self.nodes[node].right != NIL {
                    parent = node;
                    node = self.nodes[node].right;
                }
                self.nodes[parent].right = self.nodes[node].left;
                self.nodes[tree].left = NIL;
                self.nodes[node].left = l;
                self.nodes[node].right = tree;
                tree = node;
            }
        }

        debug_assert!(
            offset >= self.nodes[tree].offset
                || (self.nodes[tree].left == NIL && self.nodes[tree].prev == NIL)
        );
        self.root = tree;
    }

    /// Drop ranges in the root's right subtree made redundant by a range
    /// ending at `limit`.
    fn clean_tree(&mut self, limit: usize) {
        let mut top_offset = limit.saturating_add(1);
        let mut owner = self.root;
        let mut on_left = false;

        loop {
            let node = if on_left {
                self.nodes[owner].left
            } else {
                self.nodes[owner].right
            };
            if node == NIL {
                break;
            }

            let r = self.nodes[node].right;
            let offset = if r != NIL && self.nodes[r].offset < top_offset {
                self.nodes[r].offset
            } else {
                top_offset
            };

            let Node {
                offset: node_offset,
                limit: node_limit,
                ..
            } = self.nodes[node];
            if node_limit <= limit || (node_offset < limit && offset < limit) {
                if on_left {
                    self.nodes[owner].left = r;
                } else {
                    self.nodes[owner].right = r;
                }
                self.nodes[node].right = NIL;
                self.delete_subtree(node);
            } else {
                top_offset = node_offset;
                owner = node;
                on_left = true;
            }
        }
    }

    /// Record that `[offset, limit)` was produced at `target_offset`.
    /// Must follow a `splay(offset)`.
    pub fn insert(&mut self, offset: usize, limit: usize, target_offset: usize) {
        if self.root == NIL {
            self.root = self.alloc(offset, limit, target_offset);
            return;
        }

        let root = self.root;
        let Node {
            offset: root_offset,
            limit: root_limit,
            prev,
            next,
            ..
        } = self.nodes[root];

        if offset == root_offset && limit > root_limit {
            self.nodes[root].limit = limit;
            self.nodes[root].target_offset = target_offset;
            self.clean_tree(limit);
        } else if offset > root_offset && limit > root_limit {
            let supersedes = next == NIL
                || root_limit < self.nodes[next].offset
                || limit > self.nodes[next].limit;
            if !supersedes {
                return;
            }

            if prev != NIL && self.nodes[prev].limit >= offset {
                // The new range and the predecessor cover the root.
                let node = &mut self.nodes[root];
                node.offset = offset;
                node.limit = limit;
                node.target_offset = target_offset;
            } else {
                let node = self.alloc(offset, limit, target_offset);
                self.nodes[node].next = next;
                if next != NIL {
                    self.nodes[next].prev = node;
                }
                self.nodes[root].next = node;
                self.nodes[node].prev = root;

                self.nodes[node].right = self.nodes[root].right;
                self.nodes[root].right = NIL;
                self.nodes[node].left = root;
                self.root = node;
            }
            self.clean_tree(limit);
        } else if offset < root_offset {
            debug_assert_eq!(self.nodes[root].left, NIL);
            let node = self.alloc(offset, limit, target_offset);
            self.nodes[node].right = root;
            self.nodes[node].next = root;
            self.nodes[root].prev = node;
            self.root = node;
            self.clean_tree(limit);
        }
    }

    /// Partition `[offset, limit)` into pieces that must be expanded and
    /// pieces already present in the composite target.  Must follow a
    /// `splay(offset)`.
    pub fn build_range_list(&self, mut offset: usize, limit: usize) -> Vec<Range> {
        let mut list = Vec::new();
        let mut p = self.root;
        let from_source = |offset, limit| Range {
            kind: RangeKind::FromSource,
            offset,
            limit,
            target_offset: 0,
        };

        while offset < limit {
            if p == NIL {
                list.push(from_source(offset, limit));
                break;
            }
            let node = &self.nodes[p];
            if offset < node.offset {
                if limit <= node.offset {
                    list.push(from_source(offset, limit));
                    break;
                }
                list.push(from_source(offset, node.offset));
                offset = node.offset;
            } else if offset >= node.limit {
                p = node.next;
            } else {
                let end = node.limit.min(limit);
                list.push(Range {
                    kind: RangeKind::FromTarget,
                    offset,
                    limit: end,
                    target_offset: node.target_offset + (offset - node.offset),
                });
                offset = end;
                p = node.next;
            }
        }
        list
    }

    /// Live ranges in ascending order, as `(offset, limit, target_offset)`.
    pub fn ranges(&self) -> Vec<(usize, usize, usize)> {
        let mut first = self.root;
        if first == NIL {
            return Vec::new();
        }
        while self.nodes[first].prev != NIL {
            first = self.nodes[first].prev;
        }
        let mut out = Vec::with_capacity(self.len());
        let mut p = first;
        while p != NIL {
            let n = &self.nodes[p];
            out.push((n.offset, n.limit, n.target_offset));
            p = n.next;
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
