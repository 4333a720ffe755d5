//! Chunked tree arena.
//!
//! Nodes live eight to a 64-byte chunk. A position packs a chunk id and a
//! 3-bit offset; offset 0 is the anchor slot with absolute child pointers,
//! offsets 1..7 encode their children as signed chunk deltas. Sibling runs
//! that outgrow a chunk continue in further chunks linked into a doubly
//! linked list, all carrying the same parent.

mod chunk;
mod iter;

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::ops::Index;

use arrayvec::ArrayVec;

pub use chunk::{
    CHUNK_BITS, CHUNK_MASK, CHUNK_SHIFT, CHUNK_SIZE, MAX_SHORT_DELTA, MIN_SHORT_DELTA,
    NUM_SHORT_DEL, SHORT_DELTA,
};
pub use iter::{PostOrderIter, PreOrderIter, SiblingOrderIter};

use chunk::TreeChunk;

/// Absolute position of a node: chunk id shifted left by [`CHUNK_SHIFT`]
/// plus the in-chunk offset. Negative values name containers in a forest.
pub type TreePos = i64;

/// Reserved invalid position.
pub const INVALID: TreePos = 0;
/// The root always lives at chunk 1, offset 0.
pub const ROOT: TreePos = CHUNK_SIZE;

#[inline]
pub(crate) fn chunk_id(pos: TreePos) -> i64 {
    pos >> CHUNK_SHIFT
}

#[inline]
pub(crate) fn chunk_offset(pos: TreePos) -> i64 {
    pos & CHUNK_MASK
}

#[inline]
fn fits_in_short_del(parent_chunk: i64, child_chunk: i64) -> bool {
    (child_chunk - parent_chunk).abs() <= MAX_SHORT_DELTA
}

/// An append-heavy tree keyed by dense integer positions.
///
/// Payloads are stored in a vector parallel to the chunk records; a slot
/// without a node holds `None`. Chunks emptied by deletion are recycled
/// through a free list.
pub struct Tree<T> {
    chunks: Vec<TreeChunk>,
    data: Vec<Option<T>>,
    subtree_refs: BTreeMap<TreePos, TreePos>,
    free_chunks: Vec<i64>,
}

impl<T> Tree<T> {
    pub fn new() -> Self {
        Tree {
            chunks: Vec::new(),
            data: Vec::new(),
            subtree_refs: BTreeMap::new(),
            free_chunks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get_root(&self) -> TreePos {
        ROOT
    }

    /// Total chunks ever allocated, including the reserved chunk 0.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Chunks currently parked on the free list.
    pub fn free_chunk_count(&self) -> usize {
        self.free_chunks.len()
    }

    fn idx_exists(&self, pos: TreePos) -> bool {
        chunk_id(pos) >= 1 && chunk_id(pos) < self.chunks.len() as i64
    }

    fn contains_data(&self, pos: TreePos) -> bool {
        self.chunks[chunk_id(pos) as usize].num_short_del_occ() >= chunk_offset(pos)
    }

    fn create_space(&mut self, data: Option<T>) -> i64 {
        if let Some(id) = self.free_chunks.pop() {
            self.chunks[id as usize] = TreeChunk::new();
            self.data[(id << CHUNK_SHIFT) as usize] = data;
            return id;
        }
        self.chunks.push(TreeChunk::new());
        self.data.push(data);
        for _ in 0..CHUNK_MASK {
            self.data.push(None);
        }
        (self.chunks.len() - 1) as i64
    }

    fn insert_chunk_after(&mut self, curr: i64) -> i64 {
        let new_chunk = self.create_space(None);
        let next = self.chunks[curr as usize].next_sibling();
        self.chunks[new_chunk as usize].set_prev_sibling(curr);
        self.chunks[new_chunk as usize].set_next_sibling(next);
        self.chunks[curr as usize].set_next_sibling(new_chunk);
        if next != INVALID {
            self.chunks[next as usize].set_prev_sibling(new_chunk);
        }
        let parent = self.chunks[curr as usize].parent();
        self.chunks[new_chunk as usize].set_parent(parent);
        new_chunk
    }

    fn update_parent_pointer(&mut self, first_child: TreePos, new_parent: TreePos) {
        let mut cur = chunk_id(first_child);
        while cur != INVALID {
            self.chunks[cur as usize].set_parent(new_parent);
            cur = self.chunks[cur as usize].next_sibling();
        }
    }

    /// Move every occupied slot at `from_offset` or later into its own fresh
    /// chunk, promoting the moved node's child deltas to long pointers and
    /// re-parenting its child chunks. The new chunks are spliced after
    /// `chunk` in slot order.
    fn split_tail(&mut self, chunk: i64, from_offset: i64) -> ArrayVec<i64, NUM_SHORT_DEL> {
        debug_assert!(from_offset >= 1);
        let mut new_chunks: ArrayVec<i64, NUM_SHORT_DEL> = ArrayVec::new();
        for offset in from_offset..CHUNK_SIZE {
            let curr = (chunk << CHUNK_SHIFT) + offset;
            if !self.contains_data(curr) {
                break;
            }
            let after = *new_chunks.last().unwrap_or(&chunk);
            let new_chunk = self.insert_chunk_after(after);
            new_chunks.push(new_chunk);

            self.data[(new_chunk << CHUNK_SHIFT) as usize] = self.data[curr as usize].take();
            if let Some(r) = self.subtree_refs.remove(&curr) {
                self.subtree_refs.insert(new_chunk << CHUNK_SHIFT, r);
            }

            let slot = (offset - 1) as usize;
            let fc = self.chunks[chunk as usize].first_child_s_at(slot);
            let lc = self.chunks[chunk as usize].last_child_s_at(slot);
            if fc != 0 {
                self.chunks[new_chunk as usize].set_first_child_l(fc + chunk);
                self.chunks[new_chunk as usize].set_last_child_l(lc + chunk);
                self.chunks[new_chunk as usize].set_is_leaf(false);
                self.update_parent_pointer((fc + chunk) << CHUNK_SHIFT, new_chunk << CHUNK_SHIFT);
            }
            self.chunks[chunk as usize].set_first_child_s_at(slot, 0);
            self.chunks[chunk as usize].set_last_child_s_at(slot, 0);
        }
        self.chunks[chunk as usize].set_num_short_del_occ(from_offset - 1);
        let leaf = !self.chunks[chunk as usize].has_any_child();
        self.chunks[chunk as usize].set_is_leaf(leaf);
        new_chunks
    }

    /// Install `child_id`'s chunk as the last child of `parent_id`.
    ///
    /// Anchor parents take the long path; short-delta parents take the delta
    /// path when it encodes, and otherwise the parent's chunk is split so
    /// the parent lands on an anchor of its own. Returns the (possibly
    /// relocated) position of the parent node.
    fn try_fit_child_ptr(&mut self, parent_id: TreePos, child_id: TreePos) -> TreePos {
        debug_assert!(self.idx_exists(parent_id));
        debug_assert!(self.idx_exists(child_id));

        let child_chunk = chunk_id(child_id);
        if chunk_offset(parent_id) == 0 {
            let pc = chunk_id(parent_id) as usize;
            self.chunks[pc].set_last_child_l(child_chunk);
            if self.chunks[pc].first_child_l() == INVALID {
                self.chunks[pc].set_first_child_l(child_chunk);
            }
            self.chunks[pc].set_is_leaf(false);
            return parent_id;
        }

        let parent_chunk = chunk_id(parent_id);
        let parent_offset = chunk_offset(parent_id);
        if fits_in_short_del(parent_chunk, child_chunk) {
            let slot = (parent_offset - 1) as usize;
            let pc = parent_chunk as usize;
            self.chunks[pc].set_last_child_s_at(slot, child_chunk - parent_chunk);
            if self.chunks[pc].first_child_s_at(slot) == 0 {
                self.chunks[pc].set_first_child_s_at(slot, child_chunk - parent_chunk);
            }
            self.chunks[pc].set_is_leaf(false);
            return parent_id;
        }

        let grandparent_id = self.chunks[parent_chunk as usize].parent();
        let was_last_chunk = self.chunks[parent_chunk as usize].next_sibling() == INVALID;
        let new_chunks = self.split_tail(parent_chunk, parent_offset);
        let last_new = *new_chunks.last().expect("split moved no slots");

        if was_last_chunk {
            // The grandparent's last child moved onto a new anchor.
            let my_new_parent = self.try_fit_child_ptr(grandparent_id, last_new << CHUNK_SHIFT);
            if my_new_parent != grandparent_id {
                let fc = self.get_first_child(my_new_parent);
                if fc != INVALID {
                    self.update_parent_pointer(fc, my_new_parent);
                }
            }
        }

        // The parent node now sits on the first new anchor; install the
        // pending child there with long pointers.
        let home = new_chunks[0] as usize;
        self.chunks[home].set_last_child_l(child_chunk);
        if self.chunks[home].first_child_l() == INVALID {
            self.chunks[home].set_first_child_l(child_chunk);
        }
        self.chunks[home].set_is_leaf(false);
        (new_chunks[0]) << CHUNK_SHIFT
    }

    /// Absolute position of the parent node, INVALID for the root.
    pub fn get_parent(&self, pos: TreePos) -> TreePos {
        debug_assert!(self.idx_exists(pos), "get_parent: position out of range");
        self.chunks[chunk_id(pos) as usize].parent()
    }

    pub fn is_leaf(&self, pos: TreePos) -> bool {
        debug_assert!(self.idx_exists(pos), "is_leaf: position out of range");
        if self.chunks[chunk_id(pos) as usize].is_leaf() {
            return true;
        }
        self.get_first_child(pos) == INVALID
    }

    pub fn get_first_child(&self, pos: TreePos) -> TreePos {
        debug_assert!(self.idx_exists(pos), "get_first_child: position out of range");
        let cid = chunk_id(pos);
        let off = chunk_offset(pos);
        let chunk = &self.chunks[cid as usize];
        let child_chunk = if off == 0 {
            chunk.first_child_l()
        } else {
            let delta = chunk.first_child_s_at((off - 1) as usize);
            if delta == 0 {
                INVALID
            } else {
                cid + delta
            }
        };
        if child_chunk == INVALID {
            INVALID
        } else {
            child_chunk << CHUNK_SHIFT
        }
    }

    pub fn get_last_child(&self, pos: TreePos) -> TreePos {
        debug_assert!(self.idx_exists(pos), "get_last_child: position out of range");
        let cid = chunk_id(pos);
        let off = chunk_offset(pos);
        let chunk = &self.chunks[cid as usize];
        let child_chunk = if off == 0 {
            chunk.last_child_l()
        } else {
            let delta = chunk.last_child_s_at((off - 1) as usize);
            if delta == 0 {
                INVALID
            } else {
                cid + delta
            }
        };
        if child_chunk == INVALID {
            INVALID
        } else {
            (child_chunk << CHUNK_SHIFT) + self.chunks[child_chunk as usize].num_short_del_occ()
        }
    }

    pub fn is_last_child(&self, pos: TreePos) -> bool {
        debug_assert!(self.idx_exists(pos), "is_last_child: position out of range");
        let chunk = &self.chunks[chunk_id(pos) as usize];
        if chunk.next_sibling() != INVALID {
            return false;
        }
        chunk.num_short_del_occ() == chunk_offset(pos)
    }

    pub fn is_first_child(&self, pos: TreePos) -> bool {
        debug_assert!(self.idx_exists(pos), "is_first_child: position out of range");
        let chunk = &self.chunks[chunk_id(pos) as usize];
        chunk.prev_sibling() == INVALID && chunk_offset(pos) == 0
    }

    pub fn get_sibling_next(&self, pos: TreePos) -> TreePos {
        debug_assert!(self.idx_exists(pos), "get_sibling_next: position out of range");
        if self.is_last_child(pos) {
            return INVALID;
        }
        let cid = chunk_id(pos);
        let off = chunk_offset(pos);
        if off < CHUNK_MASK && self.contains_data(pos + 1) {
            return pos + 1;
        }
        let next = self.chunks[cid as usize].next_sibling();
        if next == INVALID {
            INVALID
        } else {
            next << CHUNK_SHIFT
        }
    }

    pub fn get_sibling_prev(&self, pos: TreePos) -> TreePos {
        debug_assert!(self.idx_exists(pos), "get_sibling_prev: position out of range");
        if self.is_first_child(pos) {
            return INVALID;
        }
        let cid = chunk_id(pos);
        let off = chunk_offset(pos);
        if off > 0 && self.contains_data(pos - 1) {
            return pos - 1;
        }
        let prev = self.chunks[cid as usize].prev_sibling();
        if prev == INVALID {
            INVALID
        } else {
            (prev << CHUNK_SHIFT) + self.chunks[prev as usize].num_short_del_occ()
        }
    }

    /// Install the root. The tree must be empty.
    pub fn add_root(&mut self, data: T) -> TreePos {
        assert!(self.chunks.is_empty(), "add_root: tree is not empty");
        // chunk 0 is reserved so position 0 stays invalid
        self.chunks.push(TreeChunk::new());
        for _ in 0..CHUNK_SIZE {
            self.data.push(None);
        }
        let root_chunk = self.create_space(Some(data));
        debug_assert_eq!(root_chunk << CHUNK_SHIFT, ROOT);
        ROOT
    }

    /// Append a child after all existing children of `parent`.
    pub fn add_child(&mut self, parent: TreePos, data: T) -> TreePos {
        debug_assert!(self.idx_exists(parent), "add_child: parent out of range");
        let last_child = self.get_last_child(parent);
        if last_child != INVALID {
            return self.append_sibling(last_child, data);
        }
        let child_chunk = self.create_space(Some(data));
        let new_parent = self.try_fit_child_ptr(parent, child_chunk << CHUNK_SHIFT);
        self.chunks[child_chunk as usize].set_parent(new_parent);
        child_chunk << CHUNK_SHIFT
    }

    /// Append a new last child to `sibling`'s parent.
    pub fn append_sibling(&mut self, sibling: TreePos, data: T) -> TreePos {
        debug_assert!(self.idx_exists(sibling), "append_sibling: sibling out of range");
        let parent = self.chunks[chunk_id(sibling) as usize].parent();
        let last = self.get_last_child(parent);
        debug_assert!(last != INVALID);

        let new_sib;
        if chunk_offset(last) == CHUNK_MASK {
            let c = self.insert_chunk_after(chunk_id(last));
            new_sib = c << CHUNK_SHIFT;
            self.data[new_sib as usize] = Some(data);
        } else {
            new_sib = last + 1;
            self.data[new_sib as usize] = Some(data);
            self.chunks[chunk_id(new_sib) as usize].set_num_short_del_occ(chunk_offset(new_sib));
        }

        let first_sib = self.get_first_child(parent);
        let new_parent = self.try_fit_child_ptr(parent, new_sib);
        if new_parent != parent {
            self.update_parent_pointer(first_sib, new_parent);
        }
        new_sib
    }

    /// Insert a sibling directly after `sibling`, preserving order.
    pub fn insert_next_sibling(&mut self, sibling: TreePos, data: T) -> TreePos {
        debug_assert!(
            self.idx_exists(sibling),
            "insert_next_sibling: sibling out of range"
        );
        if self.is_last_child(sibling) {
            return self.append_sibling(sibling, data);
        }

        let cid = chunk_id(sibling);
        let off = chunk_offset(sibling);
        let occ = self.chunks[cid as usize].num_short_del_occ();
        if occ < CHUNK_MASK {
            for from in ((off + 1)..=occ).rev() {
                self.shift_slot_up(cid, from);
            }
            let new_sib = (cid << CHUNK_SHIFT) + off + 1;
            self.data[new_sib as usize] = Some(data);
            self.chunks[cid as usize].set_num_short_del_occ(occ + 1);
            return new_sib;
        }

        // Chunk is full: move the tail into fresh chunks, then splice a new
        // chunk right after this one for the inserted node.
        let parent = self.chunks[cid as usize].parent();
        let was_last_chunk = self.chunks[cid as usize].next_sibling() == INVALID;
        let new_chunks = self.split_tail(cid, off + 1);
        if was_last_chunk {
            let last_new = *new_chunks.last().expect("full chunk split moved no slots");
            let first_sib = self.get_first_child(parent);
            let new_parent = self.try_fit_child_ptr(parent, last_new << CHUNK_SHIFT);
            if new_parent != parent {
                self.update_parent_pointer(first_sib, new_parent);
            }
        }
        let m = self.insert_chunk_after(cid);
        let new_sib = m << CHUNK_SHIFT;
        self.data[new_sib as usize] = Some(data);
        new_sib
    }

    fn shift_slot_up(&mut self, cid: i64, from: i64) {
        let base = cid << CHUNK_SHIFT;
        let from_pos = base + from;
        let to_pos = from_pos + 1;
        self.data[to_pos as usize] = self.data[from_pos as usize].take();
        if let Some(r) = self.subtree_refs.remove(&from_pos) {
            self.subtree_refs.insert(to_pos, r);
        }
        let from_slot = (from - 1) as usize;
        let fc = self.chunks[cid as usize].first_child_s_at(from_slot);
        let lc = self.chunks[cid as usize].last_child_s_at(from_slot);
        self.chunks[cid as usize].set_first_child_s_at(from_slot + 1, fc);
        self.chunks[cid as usize].set_last_child_s_at(from_slot + 1, lc);
        self.chunks[cid as usize].set_first_child_s_at(from_slot, 0);
        self.chunks[cid as usize].set_last_child_s_at(from_slot, 0);
        if fc != 0 {
            self.update_parent_pointer((fc + cid) << CHUNK_SHIFT, to_pos);
        }
    }

    fn shift_slot_down(&mut self, cid: i64, from: i64) {
        let base = cid << CHUNK_SHIFT;
        let from_pos = base + from;
        let to_pos = from_pos - 1;
        self.data[to_pos as usize] = self.data[from_pos as usize].take();
        if let Some(r) = self.subtree_refs.remove(&from_pos) {
            self.subtree_refs.insert(to_pos, r);
        }
        let from_slot = (from - 1) as usize;
        let fc = self.chunks[cid as usize].first_child_s_at(from_slot);
        let lc = self.chunks[cid as usize].last_child_s_at(from_slot);
        if from == 1 {
            // landing on the anchor slot: deltas become long pointers
            if fc != 0 {
                self.chunks[cid as usize].set_first_child_l(fc + cid);
                self.chunks[cid as usize].set_last_child_l(lc + cid);
            }
        } else {
            self.chunks[cid as usize].set_first_child_s_at(from_slot - 1, fc);
            self.chunks[cid as usize].set_last_child_s_at(from_slot - 1, lc);
        }
        self.chunks[cid as usize].set_first_child_s_at(from_slot, 0);
        self.chunks[cid as usize].set_last_child_s_at(from_slot, 0);
        if fc != 0 {
            self.update_parent_pointer((fc + cid) << CHUNK_SHIFT, to_pos);
        }
    }

    /// Delete a childless node, shifting its later chunk-mates down one
    /// slot. An emptied chunk is unlinked and recycled.
    pub fn delete_leaf(&mut self, pos: TreePos) {
        debug_assert!(self.idx_exists(pos), "delete_leaf: position out of range");
        debug_assert!(self.is_leaf(pos), "delete_leaf: position has children");

        let cid = chunk_id(pos);
        let off = chunk_offset(pos);
        let occ = self.chunks[cid as usize].num_short_del_occ();

        self.data[pos as usize] = None;
        self.subtree_refs.remove(&pos);

        for from in (off + 1)..=occ {
            self.shift_slot_down(cid, from);
        }

        if occ > 0 {
            self.chunks[cid as usize].set_num_short_del_occ(occ - 1);
        } else {
            self.unlink_and_free_chunk(cid);
        }
    }

    fn unlink_and_free_chunk(&mut self, cid: i64) {
        let prev_chunk = self.chunks[cid as usize].prev_sibling();
        let next_chunk = self.chunks[cid as usize].next_sibling();
        if prev_chunk != INVALID {
            self.chunks[prev_chunk as usize].set_next_sibling(next_chunk);
        }
        if next_chunk != INVALID {
            self.chunks[next_chunk as usize].set_prev_sibling(prev_chunk);
        }

        let parent = self.chunks[cid as usize].parent();
        if parent != INVALID {
            let pc = chunk_id(parent) as usize;
            let poff = chunk_offset(parent);
            if poff == 0 {
                if self.chunks[pc].first_child_l() == cid {
                    self.chunks[pc].set_first_child_l(next_chunk);
                }
                if self.chunks[pc].last_child_l() == cid {
                    self.chunks[pc].set_last_child_l(prev_chunk);
                }
            } else {
                let slot = (poff - 1) as usize;
                let pchunk = chunk_id(parent);
                let fc = self.chunks[pc].first_child_s_at(slot);
                let lc = self.chunks[pc].last_child_s_at(slot);
                if fc != 0 && pchunk + fc == cid {
                    let delta = if next_chunk == INVALID {
                        0
                    } else {
                        next_chunk - pchunk
                    };
                    debug_assert!(delta.abs() <= MAX_SHORT_DELTA);
                    self.chunks[pc].set_first_child_s_at(slot, delta);
                }
                if lc != 0 && pchunk + lc == cid {
                    let delta = if prev_chunk == INVALID {
                        0
                    } else {
                        prev_chunk - pchunk
                    };
                    debug_assert!(delta.abs() <= MAX_SHORT_DELTA);
                    self.chunks[pc].set_last_child_s_at(slot, delta);
                }
            }
            let leaf = !self.chunks[pc].has_any_child();
            self.chunks[pc].set_is_leaf(leaf);
        }

        self.chunks[cid as usize] = TreeChunk::new();
        let base = (cid << CHUNK_SHIFT) as usize;
        for slot in &mut self.data[base..base + CHUNK_SIZE as usize] {
            *slot = None;
        }
        self.free_chunks.push(cid);
    }

    /// Delete a whole subtree: collect in level order, delete in reverse so
    /// every deletion sees a leaf and no pending position shifts.
    pub fn delete_subtree(&mut self, pos: TreePos) {
        let order = self.collect_level_order(pos);
        for &p in order.iter().rev() {
            self.delete_leaf(p);
        }
    }

    pub(crate) fn collect_level_order(&self, pos: TreePos) -> Vec<TreePos> {
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(pos);
        while let Some(p) = queue.pop_front() {
            out.push(p);
            let mut child = self.get_first_child(p);
            while child != INVALID {
                queue.push_back(child);
                child = self.get_sibling_next(child);
            }
        }
        out
    }

    pub fn get_data(&self, pos: TreePos) -> &T {
        debug_assert!(self.idx_exists(pos), "get_data: position out of range");
        self.data[pos as usize]
            .as_ref()
            .expect("get_data: no data at position")
    }

    pub fn get_data_mut(&mut self, pos: TreePos) -> &mut T {
        debug_assert!(self.idx_exists(pos), "get_data_mut: position out of range");
        self.data[pos as usize]
            .as_mut()
            .expect("get_data_mut: no data at position")
    }

    pub fn set_data(&mut self, pos: TreePos, data: T) {
        debug_assert!(self.idx_exists(pos), "set_data: position out of range");
        self.data[pos as usize] = Some(data);
    }

    /// Negative forest reference stored at this position, if any.
    pub fn subtree_ref(&self, pos: TreePos) -> Option<TreePos> {
        self.subtree_refs.get(&pos).copied()
    }

    pub fn has_subtree_ref(&self, pos: TreePos) -> bool {
        self.subtree_refs.contains_key(&pos)
    }

    pub(crate) fn set_subtree_ref(&mut self, pos: TreePos, subtree: TreePos) {
        debug_assert!(subtree < 0, "subtree references are negative");
        debug_assert!(self.idx_exists(pos));
        self.subtree_refs.insert(pos, subtree);
    }

    pub(crate) fn take_subtree_ref(&mut self, pos: TreePos) -> Option<TreePos> {
        self.subtree_refs.remove(&pos)
    }

    pub(crate) fn subtree_refs(&self) -> impl Iterator<Item = (TreePos, TreePos)> + '_ {
        self.subtree_refs.iter().map(|(&p, &r)| (p, r))
    }

    pub fn node(&self, pos: TreePos) -> crate::handle::Tnode<'_, T> {
        debug_assert!(self.idx_exists(pos));
        crate::handle::Tnode::new(self, pos)
    }

    pub fn sibling_order(&self, start: TreePos) -> SiblingOrderIter<'_, T> {
        SiblingOrderIter::new(self, start)
    }

    pub fn pre_order(&self, start: TreePos) -> PreOrderIter<'_, T> {
        PreOrderIter::new(self, start)
    }

    pub fn post_order(&self, start: TreePos) -> PostOrderIter<'_, T> {
        PostOrderIter::new(self, start)
    }

    /// Validates the packed invariants of every live chunk. Debug builds
    /// only; tests lean on it after large mutations.
    #[cfg(debug_assertions)]
    pub fn debug_check_invariants(&self) {
        use std::collections::HashSet;
        if self.chunks.is_empty() {
            return;
        }
        let free: HashSet<i64> = self.free_chunks.iter().copied().collect();
        for cid in 1..self.chunks.len() as i64 {
            if free.contains(&cid) {
                continue;
            }
            let chunk = &self.chunks[cid as usize];
            let occ = chunk.num_short_del_occ();
            let base = cid << CHUNK_SHIFT;
            if self.data[base as usize].is_none() {
                // unreachable remnant; nothing to check
                continue;
            }
            for off in 0..CHUNK_SIZE {
                let expect = off <= occ;
                debug_assert_eq!(
                    self.data[(base + off) as usize].is_some(),
                    expect,
                    "occupancy is not a contiguous prefix in chunk {cid}"
                );
            }
            for slot in 0..NUM_SHORT_DEL {
                let fc = chunk.first_child_s_at(slot);
                let lc = chunk.last_child_s_at(slot);
                debug_assert!(fc.abs() <= MAX_SHORT_DELTA && lc.abs() <= MAX_SHORT_DELTA);
                if fc != 0 {
                    debug_assert!(slot as i64 + 1 <= occ, "child lane on a vacant slot");
                    let child_chunk = cid + fc;
                    debug_assert_eq!(
                        self.chunks[child_chunk as usize].parent(),
                        base + slot as i64 + 1,
                        "child chunk does not point back at its parent"
                    );
                }
            }
            let next = chunk.next_sibling();
            if next != INVALID {
                debug_assert_eq!(self.chunks[next as usize].prev_sibling(), cid);
                debug_assert_eq!(self.chunks[next as usize].parent(), chunk.parent());
            }
            let fcl = chunk.first_child_l();
            if fcl != INVALID {
                debug_assert_eq!(self.chunks[fcl as usize].parent(), base);
            }
        }
    }
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<TreePos> for Tree<T> {
    type Output = T;

    fn index(&self, pos: TreePos) -> &T {
        self.get_data(pos)
    }
}
