//! Bipartite graph arena of nodes and pins.
//!
//! Every vertex is one 32-byte master entry in a dense table; id 0 is
//! reserved invalid. Edges are recorded on both endpoints with a direction
//! bit each: inline in the master while it has room, then in a 64-byte
//! overflow record overlaid on two master slots, then in a hash-set
//! spillover. Pins hang off their owner node through an intrusive chain in
//! ascending port order.

pub(crate) mod entry;
mod iter;
mod overflow;

use std::collections::{HashMap, HashSet};

use entry::{EntryTag, MasterEntry};
pub use iter::{EdgeIter, NodeIter, PinIter};
use overflow::OverflowEntry;

/// Vertex id: a node or a pin. Dense index into the master table.
pub type Vid = u32;
/// Vertex id known to be a node.
pub type Nid = u32;
/// Vertex id known to be a pin.
pub type Pid = u32;
/// Port index of a pin on its node.
pub type PortId = u16;

/// One incident edge as seen from a vertex: the far endpoint and whether
/// the edge drives this vertex.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub other: Vid,
    pub input: bool,
}

#[inline]
fn edge_token(other: Vid, input: bool) -> u64 {
    ((other as u64) << 1) | input as u64
}

/// Hardware-style bipartite graph with packed adjacency.
pub struct Graph {
    table: Vec<MasterEntry>,
    spill: HashMap<Vid, HashSet<u64>>,
    free_master_id: Vid,
    free_overflow_id: u32,
    name: String,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Graph {
            // entry 0 is reserved so id 0 stays invalid
            table: vec![MasterEntry::new_free()],
            spill: HashMap::new(),
            free_master_id: 0,
            free_overflow_id: 0,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes held by the master table.
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<MasterEntry>() * self.table.len()
    }

    pub fn is_invalid(&self, id: Vid) -> bool {
        if id == 0 || self.table.len() as Vid <= id {
            return true;
        }
        !(self.table[id as usize].is_node() || self.table[id as usize].is_pin())
    }

    pub fn is_node(&self, id: Vid) -> bool {
        debug_assert!((id as usize) < self.table.len());
        self.table[id as usize].is_node()
    }

    pub fn is_pin(&self, id: Vid) -> bool {
        debug_assert!((id as usize) < self.table.len());
        self.table[id as usize].is_pin()
    }

    /// The node owning `id`: the id itself for nodes, the owner for pins.
    pub fn get_node(&self, id: Vid) -> Nid {
        debug_assert!(!self.is_invalid(id));
        if self.table[id as usize].is_node() {
            id
        } else {
            self.table[id as usize].node_id()
        }
    }

    pub fn get_pid(&self, id: Vid) -> PortId {
        debug_assert!(!self.is_invalid(id));
        if self.table[id as usize].is_node() {
            0
        } else {
            self.table[id as usize].portid()
        }
    }

    pub fn get_type(&self, nid: Nid) -> u8 {
        debug_assert!(self.is_node(nid));
        self.table[nid as usize].bits()
    }

    pub fn set_type(&mut self, nid: Nid, ty: u8) {
        debug_assert!(self.is_node(nid));
        self.table[nid as usize].set_bits(ty);
    }

    fn allocate_master(&mut self) -> Vid {
        if self.free_master_id != 0 {
            let id = self.free_master_id;
            self.free_master_id = self.table[id as usize].next_pin();
            id
        } else {
            self.table.push(MasterEntry::new_free());
            (self.table.len() - 1) as Vid
        }
    }

    fn free_master(&mut self, id: Vid) {
        let oid = self.table[id as usize].overflow_id();
        if oid != 0 {
            self.free_overflow(oid);
        }
        self.spill.remove(&id);
        let next = self.free_master_id;
        let e = &mut self.table[id as usize];
        e.clear_as(EntryTag::Free);
        e.set_next_pin(next);
        self.free_master_id = id;
    }

    pub fn create_node(&mut self) -> Nid {
        let id = self.allocate_master();
        self.table[id as usize].clear_as(EntryTag::Node);
        id
    }

    /// Create a pin on `nid` and splice it into the owner's pin chain in
    /// ascending port order.
    pub fn create_pin(&mut self, nid: Nid, port: PortId) -> Pid {
        debug_assert!(self.is_node(nid));
        let id = self.allocate_master();
        let e = &mut self.table[id as usize];
        e.clear_as(EntryTag::Pin);
        e.set_node_id(nid);
        e.set_portid(port);

        let mut prev = nid;
        let mut cur = self.table[nid as usize].next_pin();
        while cur != 0 && self.table[cur as usize].portid() <= port {
            prev = cur;
            cur = self.table[cur as usize].next_pin();
        }
        self.table[id as usize].set_next_pin(cur);
        self.table[prev as usize].set_next_pin(id);
        id
    }

    // Two contiguous 32-byte masters back one 64-byte overflow record; the
    // casts below are the only unsafe in the crate.

    fn overflow(&self, oid: u32) -> &OverflowEntry {
        debug_assert!(oid != 0 && (oid as usize) + 2 <= self.table.len());
        debug_assert!(self.table[oid as usize].is_overflow());
        unsafe { &*(self.table.as_ptr().add(oid as usize) as *const OverflowEntry) }
    }

    fn overflow_mut(&mut self, oid: u32) -> &mut OverflowEntry {
        debug_assert!(oid != 0 && (oid as usize) + 2 <= self.table.len());
        debug_assert!(self.table[oid as usize].is_overflow());
        unsafe { &mut *(self.table.as_mut_ptr().add(oid as usize) as *mut OverflowEntry) }
    }

    fn allocate_overflow(&mut self) -> u32 {
        let oid;
        if self.free_overflow_id != 0 {
            oid = self.free_overflow_id;
            self.free_overflow_id = self.overflow(oid).free_next();
        } else {
            oid = self.table.len() as u32;
            self.table.push(MasterEntry::new_free());
            self.table.push(MasterEntry::new_free());
            self.table[oid as usize].set_tag(EntryTag::Overflow);
            self.table[oid as usize + 1].set_tag(EntryTag::Overflow);
        }
        self.overflow_mut(oid).clear();
        oid
    }

    fn free_overflow(&mut self, oid: u32) {
        let next = self.free_overflow_id;
        let ov = self.overflow_mut(oid);
        ov.clear();
        ov.set_free_next(next);
        self.free_overflow_id = oid;
    }

    fn overflow_of(&self, id: Vid) -> Option<&OverflowEntry> {
        let oid = self.table[id as usize].overflow_id();
        if oid == 0 {
            None
        } else {
            Some(self.overflow(oid))
        }
    }

    pub fn has_overflow(&self, id: Vid) -> bool {
        debug_assert!(!self.is_invalid(id));
        self.table[id as usize].overflow_id() != 0
    }

    fn ensure_overflow(&mut self, self_id: Vid) -> u32 {
        let existing = self.table[self_id as usize].overflow_id();
        if existing != 0 {
            return existing;
        }
        let oid = self.allocate_overflow();
        let evicted = self.table[self_id as usize].take_ledge1();
        self.table[self_id as usize].set_overflow_id(oid);
        if let Some(edge) = evicted {
            let ov = self.overflow_mut(oid);
            match entry::short_rel(self_id, edge.other) {
                Some(rel) => ov.add_sedge(rel, edge.input),
                None => ov.add_ledge(edge.other, edge.input),
            };
        }
        oid
    }

    /// Record the edge on both endpoints. Adding an existing edge is a
    /// no-op; storage always makes room (inline, overflow, then spillover).
    pub fn add_edge(&mut self, driver: Vid, sink: Vid) {
        debug_assert!(!self.is_invalid(driver), "add_edge: bad driver");
        debug_assert!(!self.is_invalid(sink), "add_edge: bad sink");
        debug_assert_ne!(driver, sink);
        if self.has_edge(driver, sink, false) {
            return;
        }
        self.add_edge_int(driver, sink, false);
        self.add_edge_int(sink, driver, true);
    }

    fn add_edge_int(&mut self, self_id: Vid, other: Vid, input: bool) {
        let rel = entry::short_rel(self_id, other);
        let e = &mut self.table[self_id as usize];
        if let Some(rel) = rel {
            if e.try_add_sedge(rel, input) {
                return;
            }
        }
        if e.try_add_ledge(other, input) {
            return;
        }
        let oid = self.ensure_overflow(self_id);
        let ov = self.overflow_mut(oid);
        if let Some(rel) = rel {
            if ov.add_sedge(rel, input) {
                return;
            }
        }
        if ov.add_ledge(other, input) {
            return;
        }
        self.spill
            .entry(self_id)
            .or_default()
            .insert(edge_token(other, input));
    }

    fn has_edge(&self, self_id: Vid, other: Vid, input: bool) -> bool {
        let e = &self.table[self_id as usize];
        if e.has_edge_local(self_id, other, input) {
            return true;
        }
        if let Some(ov) = self.overflow_of(self_id) {
            if let Some(rel) = entry::short_rel(self_id, other) {
                if ov.has_sedge(rel, input) {
                    return true;
                }
            }
            if ov.has_ledge(other, input) {
                return true;
            }
        }
        self.spill
            .get(&self_id)
            .is_some_and(|set| set.contains(&edge_token(other, input)))
    }

    /// Remove the edge from both endpoints. Returns false when absent.
    pub fn del_edge(&mut self, driver: Vid, sink: Vid) -> bool {
        let fwd = self.del_edge_int(driver, sink, false);
        let rev = self.del_edge_int(sink, driver, true);
        debug_assert_eq!(fwd, rev, "asymmetric edge record");
        fwd && rev
    }

    fn del_edge_int(&mut self, self_id: Vid, other: Vid, input: bool) -> bool {
        if self.table[self_id as usize].del_edge_local(self_id, other, input) {
            return true;
        }
        let oid = self.table[self_id as usize].overflow_id();
        if oid != 0 {
            let rel = entry::short_rel(self_id, other);
            let ov = self.overflow_mut(oid);
            let mut done = false;
            if let Some(rel) = rel {
                done = ov.del_sedge(rel, input);
            }
            if !done {
                done = ov.del_ledge(other, input);
            }
            if done {
                if self.overflow(oid).is_empty() {
                    self.free_overflow(oid);
                    self.table[self_id as usize].clear_overflow_link();
                }
                return true;
            }
        }
        if let Some(set) = self.spill.get_mut(&self_id) {
            if set.remove(&edge_token(other, input)) {
                if set.is_empty() {
                    self.spill.remove(&self_id);
                }
                return true;
            }
        }
        false
    }

    /// Strip every edge incident to `id`, fixing up the far endpoints.
    pub fn del_edges(&mut self, id: Vid) {
        let snapshot: Vec<Edge> = self.edges(id).collect();
        for edge in snapshot {
            let ok = if edge.input {
                self.del_edge(edge.other, id)
            } else {
                self.del_edge(id, edge.other)
            };
            debug_assert!(ok);
        }
    }

    /// Delete a pin: its edges, its chain link, and its master.
    pub fn del_pin(&mut self, pid: Pid) {
        debug_assert!(self.is_pin(pid));
        self.del_edges(pid);
        let nid = self.table[pid as usize].node_id();
        let mut prev = nid;
        let mut cur = self.table[nid as usize].next_pin();
        while cur != 0 && cur != pid {
            prev = cur;
            cur = self.table[cur as usize].next_pin();
        }
        debug_assert_eq!(cur, pid, "pin missing from its owner's chain");
        let after = self.table[pid as usize].next_pin();
        self.table[prev as usize].set_next_pin(after);
        self.free_master(pid);
    }

    /// Delete a node and every pin it owns. Accepts a pin id and resolves
    /// it to the owner.
    pub fn del_node(&mut self, id: Vid) {
        let nid = self.get_node(id);
        let mut pin = self.table[nid as usize].next_pin();
        while pin != 0 {
            let next = self.table[pin as usize].next_pin();
            self.del_pin(pin);
            pin = next;
        }
        self.del_edges(nid);
        self.free_master(nid);
    }

    pub fn has_edges(&self, id: Vid) -> bool {
        debug_assert!(!self.is_invalid(id));
        let e = &self.table[id as usize];
        if e.has_local_edges(id) {
            return true;
        }
        if self.overflow_of(id).is_some_and(|ov| !ov.is_empty()) {
            return true;
        }
        self.spill.contains_key(&id)
    }

    /// Incident edge totals of one vertex, split into (inputs, outputs).
    pub fn get_num_pin_edges(&self, id: Vid) -> (usize, usize) {
        debug_assert!(!self.is_invalid(id));
        let (mut inputs, mut outputs) = self.table[id as usize].local_edge_count(id);
        if let Some(ov) = self.overflow_of(id) {
            let (i, o) = ov.edge_count();
            inputs += i;
            outputs += o;
        }
        if let Some(set) = self.spill.get(&id) {
            let i = set.iter().filter(|&&t| t & 1 != 0).count();
            inputs += i;
            outputs += set.len() - i;
        }
        (inputs, outputs)
    }

    pub fn get_num_pin_inputs(&self, id: Vid) -> usize {
        self.get_num_pin_edges(id).0
    }

    pub fn get_num_pin_outputs(&self, id: Vid) -> usize {
        self.get_num_pin_edges(id).1
    }

    /// Every vertex that drives `nid` or one of its pins.
    pub fn get_setup_drivers(&self, nid: Nid) -> Vec<Vid> {
        self.collect_far_ends(nid, true)
    }

    /// Every vertex driven by `nid` or one of its pins.
    pub fn get_setup_sinks(&self, nid: Nid) -> Vec<Vid> {
        self.collect_far_ends(nid, false)
    }

    fn collect_far_ends(&self, nid: Nid, input: bool) -> Vec<Vid> {
        debug_assert!(self.is_node(nid));
        let mut out = Vec::new();
        let mut vertex = nid;
        loop {
            for edge in self.edges(vertex) {
                if edge.input == input {
                    out.push(edge.other);
                }
            }
            vertex = self.table[vertex as usize].next_pin();
            if vertex == 0 {
                break;
            }
        }
        out
    }

    /// Re-hang every edge of `current` onto `new`, preserving directions.
    pub fn move_edges(&mut self, current: Vid, new: Vid) {
        debug_assert!(!self.is_invalid(current) && !self.is_invalid(new));
        let snapshot: Vec<Edge> = self.edges(current).collect();
        for edge in snapshot {
            if edge.input {
                self.del_edge(edge.other, current);
                self.add_edge(edge.other, new);
            } else {
                self.del_edge(current, edge.other);
                self.add_edge(new, edge.other);
            }
        }
    }

    /// Next live node id strictly after `id`; 0 when the table is
    /// exhausted. Freed ids are skipped.
    pub fn fast_next(&self, id: Vid) -> Vid {
        let mut id = id as usize;
        loop {
            id += 1;
            if id >= self.table.len() {
                return 0;
            }
            if self.table[id].is_node() {
                return id as Vid;
            }
        }
    }

    /// Lazy scan over every live node id.
    pub fn node_iter(&self) -> NodeIter<'_> {
        NodeIter::new(self)
    }

    /// Every incident edge of one vertex, inline storage first, then
    /// overflow, then spillover. A freed vertex enumerates nothing.
    pub fn edges(&self, id: Vid) -> EdgeIter<'_> {
        debug_assert!((id as usize) < self.table.len() && id != 0);
        EdgeIter::new(self, id)
    }

    /// The pins of a node, in ascending port order.
    pub fn pins(&self, nid: Nid) -> PinIter<'_> {
        debug_assert!(self.is_node(nid));
        PinIter::new(self, nid)
    }

    pub fn node(&self, nid: Nid) -> crate::handle::Node {
        debug_assert!(self.is_node(nid));
        crate::handle::Node::new(nid)
    }

    pub fn pin(&self, pid: Pid) -> crate::handle::Pin {
        debug_assert!(self.is_pin(pid));
        crate::handle::Pin::new(pid, self.get_node(pid), self.get_pid(pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_nonzero() {
        let mut g = Graph::new("t");
        let n1 = g.create_node();
        let n2 = g.create_node();
        assert_eq!(n1, 1);
        assert_eq!(n2, 2);
        assert!(g.is_invalid(0));
        assert!(g.is_invalid(99));
        assert!(!g.is_invalid(n1));
    }

    #[test]
    fn pins_chain_in_port_order() {
        let mut g = Graph::new("t");
        let n = g.create_node();
        let p2 = g.create_pin(n, 2);
        let p0 = g.create_pin(n, 0);
        let p1 = g.create_pin(n, 1);
        let ports: Vec<_> = g.pins(n).map(|p| g.get_pid(p)).collect();
        assert_eq!(ports, vec![0, 1, 2]);
        let pids: Vec<_> = g.pins(n).collect();
        assert_eq!(pids, vec![p0, p1, p2]);
        assert_eq!(g.get_node(p2), n);
    }

    #[test]
    fn edge_is_recorded_on_both_sides() {
        let mut g = Graph::new("t");
        let n1 = g.create_node();
        let n2 = g.create_node();
        g.add_edge(n1, n2);
        let out: Vec<_> = g.edges(n1).collect();
        assert_eq!(
            out,
            vec![Edge {
                other: n2,
                input: false
            }]
        );
        let inp: Vec<_> = g.edges(n2).collect();
        assert_eq!(
            inp,
            vec![Edge {
                other: n1,
                input: true
            }]
        );
        assert_eq!(g.get_num_pin_edges(n1), (0, 1));
        assert_eq!(g.get_num_pin_edges(n2), (1, 0));
    }

    #[test]
    fn add_edge_is_idempotent() {
        let mut g = Graph::new("t");
        let n1 = g.create_node();
        let n2 = g.create_node();
        g.add_edge(n1, n2);
        g.add_edge(n1, n2);
        assert_eq!(g.edges(n1).count(), 1);
        assert_eq!(g.edges(n2).count(), 1);
    }

    #[test]
    fn del_edge_returns_false_when_absent() {
        let mut g = Graph::new("t");
        let n1 = g.create_node();
        let n2 = g.create_node();
        assert!(!g.del_edge(n1, n2));
        g.add_edge(n1, n2);
        assert!(g.del_edge(n1, n2));
        assert!(!g.del_edge(n1, n2));
        assert!(!g.has_edges(n1));
        assert!(!g.has_edges(n2));
    }

    #[test]
    fn far_edges_use_long_slots() {
        let mut g = Graph::new("t");
        let n1 = g.create_node();
        for _ in 0..70_000 {
            g.create_node();
        }
        let far = g.create_node();
        g.add_edge(n1, far);
        assert_eq!(g.edges(n1).next().unwrap().other, far);
        assert_eq!(g.edges(far).next().unwrap().other, n1);
        assert!(g.del_edge(n1, far));
    }

    #[test]
    fn masters_are_recycled() {
        let mut g = Graph::new("t");
        let n1 = g.create_node();
        let n2 = g.create_node();
        g.add_edge(n1, n2);
        g.del_node(n2);
        let n3 = g.create_node();
        assert_eq!(n3, n2);
        assert!(!g.has_edges(n1));
    }

    #[test]
    fn type_bits_roundtrip() {
        let mut g = Graph::new("t");
        let n = g.create_node();
        g.set_type(n, 7);
        assert_eq!(g.get_type(n), 7);
    }

    #[test]
    fn fast_next_skips_non_nodes() {
        let mut g = Graph::new("t");
        let n1 = g.create_node();
        let n2 = g.create_node();
        let _p = g.create_pin(n1, 0);
        let n3 = g.create_node();
        g.del_node(n2);
        let scanned: Vec<_> = g.node_iter().collect();
        assert_eq!(scanned, vec![n1, n3]);
        assert_eq!(g.fast_next(n1), n3);
        assert_eq!(g.fast_next(n3), 0);
    }

    #[test]
    fn setup_driver_and_sink_sets() {
        let mut g = Graph::new("t");
        let a = g.create_node();
        let b = g.create_node();
        let c = g.create_node();
        let pa = g.create_pin(a, 1);
        g.add_edge(b, pa);
        g.add_edge(a, c);
        let drivers = g.get_setup_drivers(a);
        assert_eq!(drivers, vec![b]);
        let sinks = g.get_setup_sinks(a);
        assert_eq!(sinks, vec![c]);
    }

    #[test]
    fn move_edges_preserves_direction() {
        let mut g = Graph::new("t");
        let n = g.create_node();
        let src = g.create_node();
        let dst = g.create_node();
        let p1 = g.create_pin(n, 0);
        let p2 = g.create_pin(n, 1);
        g.add_edge(src, p1);
        g.add_edge(p1, dst);
        g.move_edges(p1, p2);
        assert!(!g.has_edges(p1));
        let got: Vec<_> = g.edges(p2).collect();
        assert!(got.contains(&Edge {
            other: src,
            input: true
        }));
        assert!(got.contains(&Edge {
            other: dst,
            input: false
        }));
    }
}
