use super::{Tree, TreePos, INVALID};

/// Walks `get_sibling_next` from the start until the run ends.
pub struct SiblingOrderIter<'t, T> {
    tree: &'t Tree<T>,
    current: TreePos,
}

impl<'t, T> SiblingOrderIter<'t, T> {
    pub(crate) fn new(tree: &'t Tree<T>, start: TreePos) -> Self {
        SiblingOrderIter {
            tree,
            current: start,
        }
    }
}

impl<'t, T> Iterator for SiblingOrderIter<'t, T> {
    type Item = TreePos;

    fn next(&mut self) -> Option<TreePos> {
        if self.current == INVALID {
            return None;
        }
        let out = self.current;
        self.current = self.tree.get_sibling_next(out);
        Some(out)
    }
}

/// Depth-first pre-order over the subtree rooted at the start position.
/// Ancestor escalation never leaves the subtree.
pub struct PreOrderIter<'t, T> {
    tree: &'t Tree<T>,
    start: TreePos,
    current: TreePos,
}

impl<'t, T> PreOrderIter<'t, T> {
    pub(crate) fn new(tree: &'t Tree<T>, start: TreePos) -> Self {
        PreOrderIter {
            tree,
            start,
            current: start,
        }
    }
}

impl<'t, T> Iterator for PreOrderIter<'t, T> {
    type Item = TreePos;

    fn next(&mut self) -> Option<TreePos> {
        if self.current == INVALID {
            return None;
        }
        let out = self.current;

        if !self.tree.is_leaf(out) {
            self.current = self.tree.get_first_child(out);
            return Some(out);
        }
        let mut cur = out;
        loop {
            if cur == self.start {
                self.current = INVALID;
                break;
            }
            let next = self.tree.get_sibling_next(cur);
            if next != INVALID {
                self.current = next;
                break;
            }
            cur = self.tree.get_parent(cur);
            if cur == INVALID {
                self.current = INVALID;
                break;
            }
        }
        Some(out)
    }
}

/// Depth-first post-order over the subtree rooted at the start position;
/// the start itself is yielded last.
pub struct PostOrderIter<'t, T> {
    tree: &'t Tree<T>,
    start: TreePos,
    current: TreePos,
}

impl<'t, T> PostOrderIter<'t, T> {
    pub(crate) fn new(tree: &'t Tree<T>, start: TreePos) -> Self {
        let current = if start == INVALID {
            INVALID
        } else {
            leftmost_leaf(tree, start)
        };
        PostOrderIter {
            tree,
            start,
            current,
        }
    }
}

fn leftmost_leaf<T>(tree: &Tree<T>, mut pos: TreePos) -> TreePos {
    while !tree.is_leaf(pos) {
        pos = tree.get_first_child(pos);
    }
    pos
}

impl<'t, T> Iterator for PostOrderIter<'t, T> {
    type Item = TreePos;

    fn next(&mut self) -> Option<TreePos> {
        if self.current == INVALID {
            return None;
        }
        let out = self.current;
        if out == self.start {
            self.current = INVALID;
            return Some(out);
        }
        let next = self.tree.get_sibling_next(out);
        self.current = if next != INVALID {
            leftmost_leaf(self.tree, next)
        } else {
            self.tree.get_parent(out)
        };
        Some(out)
    }
}
