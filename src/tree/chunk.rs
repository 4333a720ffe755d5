use std::fmt;

use super::{TreePos, INVALID};

/// Number of bits used for the offset of a node inside its chunk.
pub const CHUNK_SHIFT: u32 = 3;
/// Nodes per chunk.
pub const CHUNK_SIZE: i64 = 1 << CHUNK_SHIFT;
/// Mask extracting the in-chunk offset from a position.
pub const CHUNK_MASK: i64 = CHUNK_SIZE - 1;
/// Number of short-delta slots (offsets 1..7 of the chunk).
pub const NUM_SHORT_DEL: usize = (CHUNK_SIZE - 1) as usize;

/// Bits of a chunk id. Positions add CHUNK_SHIFT offset bits on top.
pub const CHUNK_BITS: u32 = 41;
/// Bits of a signed child delta lane.
pub const SHORT_DELTA: u32 = 17;

pub const MAX_SHORT_DELTA: i64 = (1 << (SHORT_DELTA - 1)) - 1;
pub const MIN_SHORT_DELTA: i64 = -MAX_SHORT_DELTA;

const POS_BITS: u32 = CHUNK_BITS + CHUNK_SHIFT;

// links word
const PARENT_OFF: u32 = 0;
const NEXT_OFF: u32 = POS_BITS;
const PREV_OFF: u32 = POS_BITS + CHUNK_BITS;

// child_longs word
const FIRST_L_OFF: u32 = 0;
const LAST_L_OFF: u32 = CHUNK_BITS;
const OCC_OFF: u32 = 2 * CHUNK_BITS;
const LEAF_OFF: u32 = 2 * CHUNK_BITS + CHUNK_SHIFT;

const _: () = assert!(PREV_OFF + CHUNK_BITS <= 128);
const _: () = assert!(LEAF_OFF + 1 <= 128);
const _: () = assert!(SHORT_DELTA as usize * NUM_SHORT_DEL <= 128);

#[inline]
fn field(word: u128, off: u32, width: u32) -> i64 {
    ((word >> off) & ((1u128 << width) - 1)) as i64
}

#[inline]
fn set_field(word: &mut u128, off: u32, width: u32, value: i64) {
    let mask = ((1u128 << width) - 1) << off;
    *word = (*word & !mask) | (((value as u64 as u128) << off) & mask);
}

/// One cache line of tree bookkeeping: the pointers for up to eight logical
/// nodes. The anchor node (offset 0) addresses its children with absolute
/// chunk ids; the seven short-delta nodes address theirs with 17-bit signed
/// chunk offsets relative to this chunk.
///
/// The packing must never exceed 512 bits; the assertions below pin it.
#[derive(Clone)]
#[repr(C, align(64))]
pub(crate) struct TreeChunk {
    links: u128,
    child_longs: u128,
    first_child_s: u128,
    last_child_s: u128,
}

const _: () = assert!(std::mem::size_of::<TreeChunk>() == 64);
const _: () = assert!(std::mem::align_of::<TreeChunk>() == 64);

impl TreeChunk {
    pub fn new() -> Self {
        let mut chunk = TreeChunk {
            links: 0,
            child_longs: 0,
            first_child_s: 0,
            last_child_s: 0,
        };
        chunk.set_is_leaf(true);
        chunk
    }

    /// Absolute position of the parent node, INVALID for the root chunk.
    pub fn parent(&self) -> TreePos {
        field(self.links, PARENT_OFF, POS_BITS)
    }

    pub fn set_parent(&mut self, pos: TreePos) {
        debug_assert!(pos >= 0);
        set_field(&mut self.links, PARENT_OFF, POS_BITS, pos);
    }

    /// Chunk id of the next chunk holding siblings of this chunk's nodes.
    pub fn next_sibling(&self) -> i64 {
        field(self.links, NEXT_OFF, CHUNK_BITS)
    }

    pub fn set_next_sibling(&mut self, chunk_id: i64) {
        set_field(&mut self.links, NEXT_OFF, CHUNK_BITS, chunk_id);
    }

    pub fn prev_sibling(&self) -> i64 {
        field(self.links, PREV_OFF, CHUNK_BITS)
    }

    pub fn set_prev_sibling(&mut self, chunk_id: i64) {
        set_field(&mut self.links, PREV_OFF, CHUNK_BITS, chunk_id);
    }

    /// Long first-child pointer of the anchor node, as a chunk id.
    pub fn first_child_l(&self) -> i64 {
        field(self.child_longs, FIRST_L_OFF, CHUNK_BITS)
    }

    pub fn set_first_child_l(&mut self, chunk_id: i64) {
        set_field(&mut self.child_longs, FIRST_L_OFF, CHUNK_BITS, chunk_id);
    }

    pub fn last_child_l(&self) -> i64 {
        field(self.child_longs, LAST_L_OFF, CHUNK_BITS)
    }

    pub fn set_last_child_l(&mut self, chunk_id: i64) {
        set_field(&mut self.child_longs, LAST_L_OFF, CHUNK_BITS, chunk_id);
    }

    /// Index of the highest occupied slot. 0 means only the anchor is live.
    pub fn num_short_del_occ(&self) -> i64 {
        field(self.child_longs, OCC_OFF, CHUNK_SHIFT)
    }

    pub fn set_num_short_del_occ(&mut self, occ: i64) {
        debug_assert!((0..CHUNK_SIZE).contains(&occ));
        set_field(&mut self.child_longs, OCC_OFF, CHUNK_SHIFT, occ);
    }

    /// True iff no slot of this chunk has any child.
    pub fn is_leaf(&self) -> bool {
        field(self.child_longs, LEAF_OFF, 1) != 0
    }

    pub fn set_is_leaf(&mut self, leaf: bool) {
        set_field(&mut self.child_longs, LEAF_OFF, 1, leaf as i64);
    }

    #[inline]
    fn lane(word: u128, index: usize) -> i64 {
        debug_assert!(index < NUM_SHORT_DEL);
        let raw = field(word, index as u32 * SHORT_DELTA, SHORT_DELTA);
        // sign extend the 17-bit lane
        (raw << (64 - SHORT_DELTA)) >> (64 - SHORT_DELTA)
    }

    #[inline]
    fn set_lane(word: &mut u128, index: usize, delta: i64) {
        debug_assert!(index < NUM_SHORT_DEL);
        debug_assert!(delta == 0 || (MIN_SHORT_DELTA..=MAX_SHORT_DELTA).contains(&delta));
        set_field(
            word,
            index as u32 * SHORT_DELTA,
            SHORT_DELTA,
            delta & ((1 << SHORT_DELTA) - 1),
        );
    }

    /// Short first-child delta of the node at offset `index + 1`; 0 = absent.
    pub fn first_child_s_at(&self, index: usize) -> i64 {
        Self::lane(self.first_child_s, index)
    }

    pub fn set_first_child_s_at(&mut self, index: usize, delta: i64) {
        Self::set_lane(&mut self.first_child_s, index, delta);
    }

    pub fn last_child_s_at(&self, index: usize) -> i64 {
        Self::lane(self.last_child_s, index)
    }

    pub fn set_last_child_s_at(&mut self, index: usize, delta: i64) {
        Self::set_lane(&mut self.last_child_s, index, delta);
    }

    /// True iff any slot of this chunk points at a child chunk.
    pub fn has_any_child(&self) -> bool {
        self.first_child_l() != INVALID || self.first_child_s != 0
    }
}

impl fmt::Debug for TreeChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut deltas = [0i64; NUM_SHORT_DEL];
        for (i, d) in deltas.iter_mut().enumerate() {
            *d = self.first_child_s_at(i);
        }
        f.debug_struct("TreeChunk")
            .field("parent", &self.parent())
            .field("next_sibling", &self.next_sibling())
            .field("prev_sibling", &self.prev_sibling())
            .field("first_child_l", &self.first_child_l())
            .field("last_child_l", &self.last_child_l())
            .field("occ", &self.num_short_del_occ())
            .field("is_leaf", &self.is_leaf())
            .field("first_child_s", &deltas)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::mem;

    #[test]
    fn chunk_is_one_cache_line() {
        assert_eq!(mem::size_of::<TreeChunk>(), 64);
        assert_eq!(mem::align_of::<TreeChunk>(), 64);
    }

    #[test]
    fn fresh_chunk_is_leaf() {
        let chunk = TreeChunk::new();
        assert!(chunk.is_leaf());
        assert!(!chunk.has_any_child());
        assert_eq!(chunk.parent(), INVALID);
        assert_eq!(chunk.num_short_del_occ(), 0);
    }

    #[test]
    fn lane_sign_extension() {
        let mut chunk = TreeChunk::new();
        chunk.set_first_child_s_at(3, -1);
        assert_eq!(chunk.first_child_s_at(3), -1);
        assert_eq!(chunk.first_child_s_at(2), 0);
        assert_eq!(chunk.first_child_s_at(4), 0);
        chunk.set_first_child_s_at(3, 0);
        assert!(!chunk.has_any_child());
    }

    proptest! {
        #[test]
        fn pointer_fields_roundtrip(
            parent in 0i64..(1 << (CHUNK_BITS + CHUNK_SHIFT)),
            next in 0i64..(1 << CHUNK_BITS),
            prev in 0i64..(1 << CHUNK_BITS),
            first in 0i64..(1 << CHUNK_BITS),
            last in 0i64..(1 << CHUNK_BITS),
            occ in 0i64..CHUNK_SIZE,
            leaf: bool,
        ) {
            let mut chunk = TreeChunk::new();
            chunk.set_parent(parent);
            chunk.set_next_sibling(next);
            chunk.set_prev_sibling(prev);
            chunk.set_first_child_l(first);
            chunk.set_last_child_l(last);
            chunk.set_num_short_del_occ(occ);
            chunk.set_is_leaf(leaf);
            prop_assert_eq!(chunk.parent(), parent);
            prop_assert_eq!(chunk.next_sibling(), next);
            prop_assert_eq!(chunk.prev_sibling(), prev);
            prop_assert_eq!(chunk.first_child_l(), first);
            prop_assert_eq!(chunk.last_child_l(), last);
            prop_assert_eq!(chunk.num_short_del_occ(), occ);
            prop_assert_eq!(chunk.is_leaf(), leaf);
        }

        #[test]
        fn delta_lanes_roundtrip(
            deltas in prop::collection::vec(MIN_SHORT_DELTA..=MAX_SHORT_DELTA, NUM_SHORT_DEL),
        ) {
            let mut chunk = TreeChunk::new();
            for (i, &d) in deltas.iter().enumerate() {
                chunk.set_first_child_s_at(i, d);
                chunk.set_last_child_s_at(i, -d);
            }
            for (i, &d) in deltas.iter().enumerate() {
                prop_assert_eq!(chunk.first_child_s_at(i), d);
                prop_assert_eq!(chunk.last_child_s_at(i), -d);
            }
        }

        #[test]
        fn lanes_do_not_bleed(index in 0usize..NUM_SHORT_DEL, delta in MIN_SHORT_DELTA..=MAX_SHORT_DELTA) {
            let mut chunk = TreeChunk::new();
            chunk.set_first_child_s_at(index, delta);
            for i in 0..NUM_SHORT_DEL {
                if i != index {
                    prop_assert_eq!(chunk.first_child_s_at(i), 0);
                }
            }
        }
    }
}
