// Target-offset index over a window's instructions.

use crate::window::Window;

/// `offs[i]` is the target position where instruction `i` starts;
/// the final entry is the window's target length.
#[derive(Debug, Clone)]
pub struct OffsetIndex {
    offs: Vec<usize>,
}

impl OffsetIndex {
    pub fn new(window: &Window) -> Self {
        let mut offs = Vec::with_capacity(window.ops().len() + 1);
        let mut pos = 0;
        for op in window.ops() {
            offs.push(pos);
            pos += op.length();
        }
        offs.push(pos);
        Self { offs }
    }

    /// Number of instructions indexed.
    pub fn len(&self) -> usize {
        self.offs.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start of instruction `i` (or the target length for `i == len()`).
    #[inline]
    pub fn offset(&self, i: usize) -> usize {
        self.offs[i]
    }

    /// Index of the instruction that produces target byte `offset`.
    pub fn search(&self, offset: usize) -> usize {
        debug_assert!(offset < self.offs[self.len()], "offset past the target view");
        self.offs[..self.len()].partition_point(|&o| o <= offset) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowBuilder;

    #[test]
    fn finds_covering_instruction() {
        let mut b = WindowBuilder::new();
        b.insert(b"abc");
        b.copy_source(0, 5);
        b.copy_target(1, 2);
        let w = b.finish(0, 5);
        let idx = OffsetIndex::new(&w);
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.offset(3), 10);
        assert_eq!(idx.search(0), 0);
        assert_eq!(idx.search(2), 0);
        assert_eq!(idx.search(3), 1);
        assert_eq!(idx.search(7), 1);
        assert_eq!(idx.search(8), 2);
        assert_eq!(idx.search(9), 2);
    }
}
