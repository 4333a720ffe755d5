//! A forest of trees with cross-tree references.
//!
//! Containers are named by negative references (`-1, -2, ...`). A tree node
//! may hold a reference to another tree; the forest tracks a reference
//! count and a caller index per callee so deletion is refused while
//! references remain. Tombstoned slots are kept in place and reference ids
//! grow monotonically.

use std::collections::HashSet;
use std::error::Error;
use std::fmt;

use crate::tree::{Tree, TreePos, INVALID, ROOT};

/// Failure to resolve a container reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForestError {
    /// The reference named a deleted container.
    Tombstoned(TreePos),
    /// The reference never named a container.
    OutOfRange(TreePos),
}

impl fmt::Display for ForestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForestError::Tombstoned(r) => write!(f, "tree reference {r} is tombstoned"),
            ForestError::OutOfRange(r) => write!(f, "tree reference {r} is out of range"),
        }
    }
}

impl Error for ForestError {}

/// One registered use of a callee: which tree refers to it, and at which
/// position the reference was installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeCaller {
    pub caller: TreePos,
    pub pos: TreePos,
}

struct Slot<T> {
    tree: Option<Tree<T>>,
    refcount: u32,
    callers: Vec<TreeCaller>,
}

#[inline]
fn slot_index(r: TreePos) -> Option<usize> {
    if r < 0 {
        Some((-r - 1) as usize)
    } else {
        None
    }
}

pub struct Forest<T> {
    slots: Vec<Slot<T>>,
}

impl<T> Forest<T> {
    pub fn new() -> Self {
        Forest { slots: Vec::new() }
    }

    /// Containers ever created, tombstones included.
    pub fn tree_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_live(&self, r: TreePos) -> bool {
        slot_index(r)
            .and_then(|idx| self.slots.get(idx))
            .is_some_and(|slot| slot.tree.is_some())
    }

    /// Register a new tree with the given root payload. Tombstones are not
    /// reused; the reference grows past them.
    pub fn create_tree(&mut self, root_data: T) -> TreePos {
        let mut tree = Tree::new();
        tree.add_root(root_data);
        self.slots.push(Slot {
            tree: Some(tree),
            refcount: 0,
            callers: Vec::new(),
        });
        -(self.slots.len() as TreePos)
    }

    pub fn get_tree(&self, r: TreePos) -> Result<&Tree<T>, ForestError> {
        let idx = slot_index(r).ok_or(ForestError::OutOfRange(r))?;
        let slot = self.slots.get(idx).ok_or(ForestError::OutOfRange(r))?;
        slot.tree.as_ref().ok_or(ForestError::Tombstoned(r))
    }

    pub fn get_tree_mut(&mut self, r: TreePos) -> Result<&mut Tree<T>, ForestError> {
        let idx = slot_index(r).ok_or(ForestError::OutOfRange(r))?;
        let slot = self.slots.get_mut(idx).ok_or(ForestError::OutOfRange(r))?;
        slot.tree.as_mut().ok_or(ForestError::Tombstoned(r))
    }

    fn tree_for(&self, r: TreePos) -> &Tree<T> {
        self.get_tree(r).expect("dangling tree reference")
    }

    /// Store `callee` as a subtree reference at `pos` of `caller`, bumping
    /// the callee's refcount and caller index. Replacing an existing
    /// reference releases the old callee.
    pub fn add_subtree_ref(&mut self, caller: TreePos, pos: TreePos, callee: TreePos) {
        debug_assert!(self.is_live(callee), "add_subtree_ref: dead callee");
        let old = {
            let tree = self.get_tree_mut(caller).expect("dangling caller reference");
            let old = tree.take_subtree_ref(pos);
            tree.set_subtree_ref(pos, callee);
            old
        };
        if let Some(old_callee) = old {
            self.release_ref(old_callee, caller, pos);
        }
        let idx = slot_index(callee).expect("callee reference must be negative");
        self.slots[idx].refcount += 1;
        self.slots[idx].callers.push(TreeCaller { caller, pos });
    }

    fn release_ref(&mut self, callee: TreePos, caller: TreePos, pos: TreePos) {
        let Some(idx) = slot_index(callee) else {
            return;
        };
        let slot = &mut self.slots[idx];
        slot.refcount = slot.refcount.saturating_sub(1);
        // positions may have drifted since registration; fall back to the
        // caller reference alone
        let found = slot
            .callers
            .iter()
            .position(|c| c.caller == caller && c.pos == pos)
            .or_else(|| slot.callers.iter().position(|c| c.caller == caller));
        if let Some(at) = found {
            slot.callers.swap_remove(at);
        }
    }

    /// Delete a leaf of tree `r`, releasing the subtree reference it held,
    /// if any.
    pub fn delete_leaf(&mut self, r: TreePos, pos: TreePos) {
        let callee = {
            let tree = self.get_tree_mut(r).expect("dangling tree reference");
            let callee = tree.take_subtree_ref(pos);
            tree.delete_leaf(pos);
            callee
        };
        if let Some(callee) = callee {
            self.release_ref(callee, r, pos);
        }
    }

    /// Delete a whole subtree of tree `r`, releasing every subtree
    /// reference inside it.
    pub fn delete_subtree(&mut self, r: TreePos, pos: TreePos) {
        let held = {
            let tree = self.get_tree_mut(r).expect("dangling tree reference");
            let order = tree.collect_level_order(pos);
            let mut held = Vec::new();
            for &p in &order {
                if let Some(callee) = tree.take_subtree_ref(p) {
                    held.push((p, callee));
                }
            }
            for &p in order.iter().rev() {
                tree.delete_leaf(p);
            }
            held
        };
        for (p, callee) in held {
            self.release_ref(callee, r, p);
        }
    }

    /// Tombstone a tree. Refused (returns false) while any reference to it
    /// remains; on success the references it held are released in turn.
    pub fn delete_tree(&mut self, r: TreePos) -> bool {
        let Some(idx) = slot_index(r) else {
            return false;
        };
        if idx >= self.slots.len() || self.slots[idx].tree.is_none() {
            return false;
        }
        if self.slots[idx].refcount > 0 {
            return false;
        }
        let tree = self.slots[idx].tree.take().expect("checked above");
        let held: Vec<(TreePos, TreePos)> = tree.subtree_refs().collect();
        for (pos, callee) in held {
            self.release_ref(callee, r, pos);
        }
        self.slots[idx].callers.clear();
        true
    }

    pub fn refcount(&self, r: TreePos) -> u32 {
        slot_index(r)
            .and_then(|idx| self.slots.get(idx))
            .map_or(0, |slot| slot.refcount)
    }

    /// Every registered use of `r`.
    pub fn get_callers(&self, r: TreePos) -> impl Iterator<Item = &TreeCaller> {
        let callers = slot_index(r)
            .and_then(|idx| self.slots.get(idx))
            .map(|slot| slot.callers.as_slice())
            .unwrap_or(&[]);
        callers.iter()
    }

    /// Pre-order over tree `r` that descends through subtree references,
    /// entering each referenced tree at most once per iteration.
    pub fn pre_order_following(&self, r: TreePos) -> FollowingPreOrder<'_, T> {
        debug_assert!(self.is_live(r));
        FollowingPreOrder {
            forest: self,
            frames: vec![Frame {
                tref: r,
                root: ROOT,
                cur: ROOT,
            }],
            visited: HashSet::new(),
            started: false,
        }
    }

    /// Post-order with subtree following; a referenced tree is visited
    /// directly after its referring node.
    pub fn post_order_following(&self, r: TreePos) -> FollowingPostOrder<'_, T> {
        debug_assert!(self.is_live(r));
        let start = leftmost_leaf(self.tree_for(r), ROOT);
        FollowingPostOrder {
            forest: self,
            frames: vec![Frame {
                tref: r,
                root: ROOT,
                cur: start,
            }],
            visited: HashSet::new(),
        }
    }

    /// Sibling walk with subtree following: each sibling holding an
    /// unvisited reference detours through the referenced root.
    pub fn sibling_order_following(&self, r: TreePos, start: TreePos) -> FollowingSiblingOrder<'_, T> {
        debug_assert!(self.is_live(r));
        FollowingSiblingOrder {
            forest: self,
            frames: vec![(r, start)],
            visited: HashSet::new(),
            started: false,
        }
    }

    pub fn create_cursor(&self, root: TreePos) -> ForestCursor<'_, T> {
        debug_assert!(self.is_live(root));
        ForestCursor {
            forest: self,
            frames: vec![CursorFrame {
                tref: root,
                via: INVALID,
            }],
        }
    }
}

impl<T> Default for Forest<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone)]
struct Frame {
    tref: TreePos,
    root: TreePos,
    cur: TreePos,
}

fn leftmost_leaf<T>(tree: &Tree<T>, mut pos: TreePos) -> TreePos {
    while !tree.is_leaf(pos) {
        pos = tree.get_first_child(pos);
    }
    pos
}

/// See [`Forest::pre_order_following`]. Yields `(tree_ref, position)`.
pub struct FollowingPreOrder<'f, T> {
    forest: &'f Forest<T>,
    frames: Vec<Frame>,
    visited: HashSet<TreePos>,
    started: bool,
}

impl<'f, T> Iterator for FollowingPreOrder<'f, T> {
    type Item = (TreePos, TreePos);

    fn next(&mut self) -> Option<(TreePos, TreePos)> {
        if !self.started {
            self.started = true;
            let frame = self.frames.last()?;
            return Some((frame.tref, frame.cur));
        }
        let mut skip_descend = false;
        loop {
            let &frame = self.frames.last()?;
            let tree = self.forest.tree_for(frame.tref);

            if !skip_descend {
                if let Some(callee) = tree.subtree_ref(frame.cur) {
                    if !self.visited.contains(&callee) && self.forest.is_live(callee) {
                        self.visited.insert(callee);
                        self.frames.push(Frame {
                            tref: callee,
                            root: ROOT,
                            cur: ROOT,
                        });
                        return Some((callee, ROOT));
                    }
                }
                if !tree.is_leaf(frame.cur) {
                    let child = tree.get_first_child(frame.cur);
                    self.frames.last_mut().expect("frame present").cur = child;
                    return Some((frame.tref, child));
                }
            }

            let mut cur = frame.cur;
            loop {
                if cur == frame.root {
                    self.frames.pop();
                    skip_descend = true;
                    break;
                }
                let next = tree.get_sibling_next(cur);
                if next != INVALID {
                    self.frames.last_mut().expect("frame present").cur = next;
                    return Some((frame.tref, next));
                }
                cur = tree.get_parent(cur);
                if cur == INVALID {
                    self.frames.pop();
                    skip_descend = true;
                    break;
                }
            }
        }
    }
}

/// See [`Forest::post_order_following`]. Yields `(tree_ref, position)`.
pub struct FollowingPostOrder<'f, T> {
    forest: &'f Forest<T>,
    frames: Vec<Frame>,
    visited: HashSet<TreePos>,
}

impl<'f, T> Iterator for FollowingPostOrder<'f, T> {
    type Item = (TreePos, TreePos);

    fn next(&mut self) -> Option<(TreePos, TreePos)> {
        let &frame = self.frames.last()?;
        let out = (frame.tref, frame.cur);
        self.advance();
        Some(out)
    }
}

impl<'f, T> FollowingPostOrder<'f, T> {
    fn advance(&mut self) {
        let &frame = self.frames.last().expect("advance on exhausted iterator");
        let tree = self.forest.tree_for(frame.tref);

        // the referenced tree follows directly after its referring node
        if let Some(callee) = tree.subtree_ref(frame.cur) {
            if !self.visited.contains(&callee) && self.forest.is_live(callee) {
                self.visited.insert(callee);
                let callee_tree = self.forest.tree_for(callee);
                self.frames.push(Frame {
                    tref: callee,
                    root: ROOT,
                    cur: leftmost_leaf(callee_tree, ROOT),
                });
                return;
            }
        }

        loop {
            let Some(&frame) = self.frames.last() else {
                return;
            };
            let tree = self.forest.tree_for(frame.tref);
            if frame.cur == frame.root {
                self.frames.pop();
                continue;
            }
            let next = tree.get_sibling_next(frame.cur);
            let top = self.frames.last_mut().expect("frame present");
            if next != INVALID {
                top.cur = leftmost_leaf(tree, next);
            } else {
                top.cur = tree.get_parent(frame.cur);
            }
            return;
        }
    }
}

/// See [`Forest::sibling_order_following`]. Yields `(tree_ref, position)`.
pub struct FollowingSiblingOrder<'f, T> {
    forest: &'f Forest<T>,
    frames: Vec<(TreePos, TreePos)>,
    visited: HashSet<TreePos>,
    started: bool,
}

impl<'f, T> Iterator for FollowingSiblingOrder<'f, T> {
    type Item = (TreePos, TreePos);

    fn next(&mut self) -> Option<(TreePos, TreePos)> {
        if !self.started {
            self.started = true;
            return self.frames.last().copied();
        }
        loop {
            let &(tref, cur) = self.frames.last()?;
            let tree = self.forest.tree_for(tref);

            if let Some(callee) = tree.subtree_ref(cur) {
                if !self.visited.contains(&callee) && self.forest.is_live(callee) {
                    self.visited.insert(callee);
                    self.frames.push((callee, ROOT));
                    return Some((callee, ROOT));
                }
            }
            let next = tree.get_sibling_next(cur);
            if next != INVALID {
                self.frames.last_mut().expect("frame present").1 = next;
                return Some((tref, next));
            }
            self.frames.pop();
        }
    }
}

#[derive(Copy, Clone)]
struct CursorFrame {
    tref: TreePos,
    /// Position in the parent frame's tree holding the reference we
    /// descended through. INVALID for the cursor root.
    via: TreePos,
}

/// Stack-based navigator across subtree references. The stack remembers
/// the calling site, so a shared callee always ascends back to the caller
/// it was entered from.
pub struct ForestCursor<'f, T> {
    forest: &'f Forest<T>,
    frames: Vec<CursorFrame>,
}

impl<'f, T> ForestCursor<'f, T> {
    pub fn is_root(&self) -> bool {
        self.frames.len() == 1
    }

    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn get_current_tid(&self) -> TreePos {
        self.frames.last().expect("cursor has a root frame").tref
    }

    pub fn get_root_tid(&self) -> TreePos {
        self.frames[0].tref
    }

    /// The tree the cursor currently points at.
    pub fn current_tree(&self) -> &'f Tree<T> {
        self.forest.tree_for(self.get_current_tid())
    }

    /// Position in the parent tree through which the current frame was
    /// entered; INVALID at the root.
    pub fn caller_pos(&self) -> TreePos {
        self.frames.last().expect("cursor has a root frame").via
    }

    /// True when the current tree holds no subtree references.
    pub fn is_leaf(&self) -> bool {
        self.current_tree().subtree_refs().next().is_none()
    }

    fn on_stack(&self, r: TreePos) -> bool {
        self.frames.iter().any(|f| f.tref == r)
    }

    /// Descend into the first subtree reference of the current tree, in
    /// position order. Refuses cycles.
    pub fn goto_first_child(&mut self) -> bool {
        let Some((pos, callee)) = self.current_tree().subtree_refs().next() else {
            return false;
        };
        if self.on_stack(callee) || !self.forest.is_live(callee) {
            return false;
        }
        self.frames.push(CursorFrame {
            tref: callee,
            via: pos,
        });
        true
    }

    pub fn goto_next_sibling(&mut self) -> bool {
        self.goto_sibling(true)
    }

    pub fn goto_prev_sibling(&mut self) -> bool {
        self.goto_sibling(false)
    }

    fn goto_sibling(&mut self, forward: bool) -> bool {
        if self.is_root() {
            return false;
        }
        let via = self.caller_pos();
        let parent_ref = self.frames[self.frames.len() - 2].tref;
        let parent_tree = self.forest.tree_for(parent_ref);
        let found = if forward {
            parent_tree.subtree_refs().find(|&(pos, _)| pos > via)
        } else {
            parent_tree
                .subtree_refs()
                .take_while(|&(pos, _)| pos < via)
                .last()
        };
        let Some((pos, callee)) = found else {
            return false;
        };
        let below_top = &self.frames[..self.frames.len() - 1];
        if below_top.iter().any(|f| f.tref == callee) || !self.forest.is_live(callee) {
            return false;
        }
        let top = self.frames.last_mut().expect("cursor has a root frame");
        top.tref = callee;
        top.via = pos;
        true
    }

    /// Pop back to the caller. False at the cursor root.
    pub fn goto_parent(&mut self) -> bool {
        if self.is_root() {
            return false;
        }
        self.frames.pop();
        true
    }
}
