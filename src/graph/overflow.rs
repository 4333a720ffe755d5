use super::entry::EntryTag;
use super::Vid;

/// Short lanes in one overflow record.
pub(crate) const MAX_OVERFLOW_SEDGES: usize = 19;
/// Long lanes in one overflow record.
pub(crate) const MAX_OVERFLOW_LEDGES: usize = 4;

const SEDGE_LO: usize = 12;

#[inline]
fn mask_insert(mask: u32, index: u32, input: bool) -> u32 {
    let low = mask & ((1 << index) - 1);
    let high = (mask & !((1 << index) - 1)) << 1;
    low | high | ((input as u32) << index)
}

#[inline]
fn mask_remove(mask: u32, index: u32) -> u32 {
    let low = mask & ((1 << index) - 1);
    let high = (mask >> 1) & !((1 << index) - 1);
    low | high
}

/// Extended edge storage: 64 bytes overlaid on two contiguous master slots.
///
/// Both 32-byte halves lead with an `Overflow` tag byte so a table scan can
/// never mistake overflow payload for a live node. Short deltas and long ids
/// are kept sorted; the direction masks shift in lock-step with the arrays.
/// A freed record threads the overflow free list through its first long
/// lane.
#[derive(Debug)]
#[repr(C)]
pub(crate) struct OverflowEntry {
    tag: u8,
    n_sedges: u8,
    n_ledges: u8,
    ledge_mask: u8,
    sedge_mask: u32,
    sedge_lo: [i16; SEDGE_LO],
    tag2: u8,
    _res: u8,
    sedge_hi: [i16; MAX_OVERFLOW_SEDGES - SEDGE_LO],
    ledge: [u32; MAX_OVERFLOW_LEDGES],
}

const _: () = assert!(std::mem::size_of::<OverflowEntry>() == 64);
const _: () = assert!(MAX_OVERFLOW_SEDGES <= 32);
const _: () = assert!(MAX_OVERFLOW_LEDGES <= 8);

impl OverflowEntry {
    pub fn clear(&mut self) {
        self.tag = EntryTag::Overflow as u8;
        self.n_sedges = 0;
        self.n_ledges = 0;
        self.ledge_mask = 0;
        self.sedge_mask = 0;
        self.sedge_lo = [0; SEDGE_LO];
        self.tag2 = EntryTag::Overflow as u8;
        self._res = 0;
        self.sedge_hi = [0; MAX_OVERFLOW_SEDGES - SEDGE_LO];
        self.ledge = [0; MAX_OVERFLOW_LEDGES];
    }

    #[inline]
    fn sedge_at(&self, index: usize) -> i16 {
        if index < SEDGE_LO {
            self.sedge_lo[index]
        } else {
            self.sedge_hi[index - SEDGE_LO]
        }
    }

    #[inline]
    fn set_sedge_at(&mut self, index: usize, value: i16) {
        if index < SEDGE_LO {
            self.sedge_lo[index] = value;
        } else {
            self.sedge_hi[index - SEDGE_LO] = value;
        }
    }

    pub fn num_sedges(&self) -> usize {
        self.n_sedges as usize
    }

    pub fn num_ledges(&self) -> usize {
        self.n_ledges as usize
    }

    pub fn is_empty(&self) -> bool {
        self.n_sedges == 0 && self.n_ledges == 0
    }

    /// Decode the `index`-th short lane relative to the owning master.
    pub fn sedge(&self, index: usize, self_id: Vid) -> (Vid, bool) {
        debug_assert!(index < self.num_sedges());
        let other = (self_id as i64 + self.sedge_at(index) as i64) as Vid;
        (other, self.sedge_mask & (1 << index) != 0)
    }

    pub fn ledge(&self, index: usize) -> (Vid, bool) {
        debug_assert!(index < self.num_ledges());
        (self.ledge[index], self.ledge_mask & (1 << index) != 0)
    }

    pub fn add_sedge(&mut self, rel: i16, input: bool) -> bool {
        debug_assert_ne!(rel, 0);
        let n = self.num_sedges();
        if n == MAX_OVERFLOW_SEDGES {
            return false;
        }
        let mut at = 0;
        while at < n && self.sedge_at(at) < rel {
            at += 1;
        }
        for i in (at..n).rev() {
            let v = self.sedge_at(i);
            self.set_sedge_at(i + 1, v);
        }
        self.set_sedge_at(at, rel);
        self.sedge_mask = mask_insert(self.sedge_mask, at as u32, input);
        self.n_sedges += 1;
        true
    }

    pub fn del_sedge(&mut self, rel: i16, input: bool) -> bool {
        let n = self.num_sedges();
        let Some(at) = (0..n).find(|&i| {
            self.sedge_at(i) == rel && (self.sedge_mask & (1 << i) != 0) == input
        }) else {
            return false;
        };
        for i in at..n - 1 {
            let v = self.sedge_at(i + 1);
            self.set_sedge_at(i, v);
        }
        self.set_sedge_at(n - 1, 0);
        self.sedge_mask = mask_remove(self.sedge_mask, at as u32);
        self.n_sedges -= 1;
        true
    }

    pub fn has_sedge(&self, rel: i16, input: bool) -> bool {
        (0..self.num_sedges())
            .any(|i| self.sedge_at(i) == rel && (self.sedge_mask & (1 << i) != 0) == input)
    }

    pub fn add_ledge(&mut self, other: Vid, input: bool) -> bool {
        debug_assert_ne!(other, 0);
        let n = self.num_ledges();
        if n == MAX_OVERFLOW_LEDGES {
            return false;
        }
        let mut at = 0;
        while at < n && self.ledge[at] < other {
            at += 1;
        }
        for i in (at..n).rev() {
            self.ledge[i + 1] = self.ledge[i];
        }
        self.ledge[at] = other;
        self.ledge_mask = mask_insert(self.ledge_mask as u32, at as u32, input) as u8;
        self.n_ledges += 1;
        true
    }

    pub fn del_ledge(&mut self, other: Vid, input: bool) -> bool {
        let n = self.num_ledges();
        let Some(at) =
            (0..n).find(|&i| self.ledge[i] == other && (self.ledge_mask & (1 << i) != 0) == input)
        else {
            return false;
        };
        for i in at..n - 1 {
            self.ledge[i] = self.ledge[i + 1];
        }
        self.ledge[n - 1] = 0;
        self.ledge_mask = mask_remove(self.ledge_mask as u32, at as u32) as u8;
        self.n_ledges -= 1;
        true
    }

    pub fn has_ledge(&self, other: Vid, input: bool) -> bool {
        (0..self.num_ledges())
            .any(|i| self.ledge[i] == other && (self.ledge_mask & (1 << i) != 0) == input)
    }

    pub fn edge_count(&self) -> (usize, usize) {
        let inputs = (self.sedge_mask.count_ones() + (self.ledge_mask as u32).count_ones()) as usize;
        (inputs, self.num_sedges() + self.num_ledges() - inputs)
    }

    /// Free-list threading for recycled records.
    pub fn free_next(&self) -> u32 {
        self.ledge[0]
    }

    pub fn set_free_next(&mut self, next: u32) {
        self.ledge[0] = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::mem;

    fn fresh() -> OverflowEntry {
        let mut ov: OverflowEntry = unsafe { mem::zeroed() };
        ov.clear();
        ov
    }

    #[test]
    fn overflow_entry_is_64_bytes() {
        assert_eq!(mem::size_of::<OverflowEntry>(), 64);
    }

    #[test]
    fn both_halves_carry_the_tag() {
        let ov = fresh();
        let bytes: &[u8; 64] = unsafe { mem::transmute(&ov) };
        assert_eq!(bytes[0] & 0b11, EntryTag::Overflow as u8);
        assert_eq!(bytes[32] & 0b11, EntryTag::Overflow as u8);
    }

    #[test]
    fn sedges_stay_sorted() {
        let mut ov = fresh();
        for rel in [5i16, -3, 9, 1, -7] {
            assert!(ov.add_sedge(rel, rel < 0));
        }
        let values: Vec<i16> = (0..ov.num_sedges()).map(|i| ov.sedge_at(i)).collect();
        assert_eq!(values, vec![-7, -3, 1, 5, 9]);
        // directions followed their lanes
        assert!(ov.sedge(0, 100).1);
        assert!(!ov.sedge(4, 100).1);
    }

    #[test]
    fn delete_shifts_mask() {
        let mut ov = fresh();
        ov.add_sedge(1, false);
        ov.add_sedge(2, true);
        ov.add_sedge(3, false);
        assert!(ov.del_sedge(1, false));
        assert_eq!(ov.num_sedges(), 2);
        assert_eq!(ov.sedge(0, 0).0, 2);
        assert!(ov.sedge(0, 0).1);
        assert!(!ov.sedge(1, 0).1);
        assert!(!ov.del_sedge(1, false));
    }

    #[test]
    fn capacity_limits() {
        let mut ov = fresh();
        for i in 1..=MAX_OVERFLOW_SEDGES as i16 {
            assert!(ov.add_sedge(i, false));
        }
        assert!(!ov.add_sedge(100, false));
        for i in 1..=MAX_OVERFLOW_LEDGES as u32 {
            assert!(ov.add_ledge(100_000 + i, true));
        }
        assert!(!ov.add_ledge(200_000, true));
        assert_eq!(ov.edge_count(), (MAX_OVERFLOW_LEDGES, MAX_OVERFLOW_SEDGES));
    }

    proptest! {
        #[test]
        fn add_del_roundtrip(rels in prop::collection::hash_set(-500i16..500, 1..15)) {
            let rels: Vec<i16> = rels.into_iter().filter(|&r| r != 0).collect();
            let mut ov = fresh();
            for (i, &r) in rels.iter().enumerate() {
                prop_assert!(ov.add_sedge(r, i % 2 == 0));
            }
            for (i, &r) in rels.iter().enumerate() {
                prop_assert!(ov.has_sedge(r, i % 2 == 0));
                prop_assert!(ov.del_sedge(r, i % 2 == 0));
                prop_assert!(!ov.has_sedge(r, i % 2 == 0));
            }
            prop_assert!(ov.is_empty());
        }
    }
}
