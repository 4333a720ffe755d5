//! A library of graphs with cross-graph instantiation.
//!
//! Mirrors the forest registry: graphs are named by negative references,
//! tombstones are kept, reference ids grow monotonically. A node of one
//! graph may instantiate another graph; the library tracks the instance
//! table per graph plus a refcount and caller index per callee, and hands
//! out stack-based hierarchy cursors over the instantiation relation.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use crate::graph::{Graph, Nid};

/// A negative reference naming a graph in the library.
pub type GraphRef = i64;

/// Failure to resolve a graph reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryError {
    Tombstoned(GraphRef),
    OutOfRange(GraphRef),
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryError::Tombstoned(r) => write!(f, "graph reference {r} is tombstoned"),
            LibraryError::OutOfRange(r) => write!(f, "graph reference {r} is out of range"),
        }
    }
}

impl Error for LibraryError {}

/// One registered instantiation of a callee graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphCaller {
    pub caller: GraphRef,
    pub node: Nid,
}

struct Slot {
    graph: Option<Graph>,
    refcount: u32,
    callers: Vec<GraphCaller>,
    /// Subgraph instances of this graph, in node-id order.
    instances: BTreeMap<Nid, GraphRef>,
}

#[inline]
fn slot_index(r: GraphRef) -> Option<usize> {
    if r < 0 {
        Some((-r - 1) as usize)
    } else {
        None
    }
}

pub struct GraphLibrary {
    slots: Vec<Slot>,
}

impl GraphLibrary {
    pub fn new() -> Self {
        GraphLibrary { slots: Vec::new() }
    }

    pub fn graph_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_live(&self, r: GraphRef) -> bool {
        slot_index(r)
            .and_then(|idx| self.slots.get(idx))
            .is_some_and(|slot| slot.graph.is_some())
    }

    pub fn create_graph(&mut self) -> GraphRef {
        let r = -(self.slots.len() as GraphRef) - 1;
        self.slots.push(Slot {
            graph: Some(Graph::new(format!("g{}", -r))),
            refcount: 0,
            callers: Vec::new(),
            instances: BTreeMap::new(),
        });
        r
    }

    pub fn get_graph(&self, r: GraphRef) -> Result<&Graph, LibraryError> {
        let idx = slot_index(r).ok_or(LibraryError::OutOfRange(r))?;
        let slot = self.slots.get(idx).ok_or(LibraryError::OutOfRange(r))?;
        slot.graph.as_ref().ok_or(LibraryError::Tombstoned(r))
    }

    pub fn get_graph_mut(&mut self, r: GraphRef) -> Result<&mut Graph, LibraryError> {
        let idx = slot_index(r).ok_or(LibraryError::OutOfRange(r))?;
        let slot = self.slots.get_mut(idx).ok_or(LibraryError::OutOfRange(r))?;
        slot.graph.as_mut().ok_or(LibraryError::Tombstoned(r))
    }

    fn slot(&self, r: GraphRef) -> &Slot {
        &self.slots[slot_index(r).expect("graph reference must be negative")]
    }

    /// Make node `nid` of `caller` an instance of `callee`, bumping the
    /// callee's refcount and caller index. Re-assigning a node releases
    /// the previously instantiated graph.
    pub fn set_subnode(&mut self, caller: GraphRef, nid: Nid, callee: GraphRef) {
        debug_assert!(self.is_live(caller), "set_subnode: dead caller");
        debug_assert!(self.is_live(callee), "set_subnode: dead callee");
        debug_assert!(self.get_graph(caller).expect("live").is_node(nid));
        let caller_idx = slot_index(caller).expect("caller reference must be negative");
        let old = self.slots[caller_idx].instances.insert(nid, callee);
        if let Some(old_callee) = old {
            self.release_ref(old_callee, caller, nid);
        }
        let idx = slot_index(callee).expect("callee reference must be negative");
        self.slots[idx].refcount += 1;
        self.slots[idx].callers.push(GraphCaller { caller, node: nid });
    }

    /// The graph instantiated by node `nid`, if any.
    pub fn get_instance(&self, r: GraphRef, nid: Nid) -> Option<GraphRef> {
        self.slot(r).instances.get(&nid).copied()
    }

    pub fn has_instance(&self, r: GraphRef, nid: Nid) -> bool {
        self.get_instance(r, nid).is_some()
    }

    fn release_ref(&mut self, callee: GraphRef, caller: GraphRef, nid: Nid) {
        let Some(idx) = slot_index(callee) else {
            return;
        };
        let slot = &mut self.slots[idx];
        slot.refcount = slot.refcount.saturating_sub(1);
        let found = slot
            .callers
            .iter()
            .position(|c| c.caller == caller && c.node == nid);
        if let Some(at) = found {
            slot.callers.swap_remove(at);
        }
    }

    /// Delete a node of graph `r` through the library so an instance it
    /// carried is released as well.
    pub fn del_node(&mut self, r: GraphRef, nid: Nid) {
        let idx = slot_index(r).expect("graph reference must be negative");
        self.slots[idx]
            .graph
            .as_mut()
            .expect("dangling graph reference")
            .del_node(nid);
        if let Some(callee) = self.slots[idx].instances.remove(&nid) {
            self.release_ref(callee, r, nid);
        }
    }

    /// Tombstone a graph. Refused while instances of it remain; on success
    /// the instances it held are released in turn.
    pub fn delete_graph(&mut self, r: GraphRef) -> bool {
        let Some(idx) = slot_index(r) else {
            return false;
        };
        if idx >= self.slots.len() || self.slots[idx].graph.is_none() {
            return false;
        }
        if self.slots[idx].refcount > 0 {
            return false;
        }
        self.slots[idx].graph = None;
        let held: Vec<(Nid, GraphRef)> = self.slots[idx]
            .instances
            .iter()
            .map(|(&n, &c)| (n, c))
            .collect();
        self.slots[idx].instances.clear();
        self.slots[idx].callers.clear();
        for (nid, callee) in held {
            self.release_ref(callee, r, nid);
        }
        true
    }

    pub fn refcount(&self, r: GraphRef) -> u32 {
        slot_index(r)
            .and_then(|idx| self.slots.get(idx))
            .map_or(0, |slot| slot.refcount)
    }

    pub fn get_callers(&self, r: GraphRef) -> impl Iterator<Item = &GraphCaller> {
        let callers = slot_index(r)
            .and_then(|idx| self.slots.get(idx))
            .map(|slot| slot.callers.as_slice())
            .unwrap_or(&[]);
        callers.iter()
    }

    pub fn create_cursor(&self, root: GraphRef) -> GraphCursor<'_> {
        debug_assert!(self.is_live(root));
        GraphCursor {
            library: self,
            frames: vec![LibFrame { gref: root, via: 0 }],
        }
    }
}

impl Default for GraphLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone)]
struct LibFrame {
    gref: GraphRef,
    /// Node of the parent frame's graph we descended through; 0 at the
    /// cursor root.
    via: Nid,
}

/// Stack-based navigator over the instantiation hierarchy. The stack
/// remembers the calling node, so a shared callee ascends back to the
/// caller it was entered from.
pub struct GraphCursor<'l> {
    library: &'l GraphLibrary,
    frames: Vec<LibFrame>,
}

impl<'l> GraphCursor<'l> {
    pub fn is_root(&self) -> bool {
        self.frames.len() == 1
    }

    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn get_current_gid(&self) -> GraphRef {
        self.frames.last().expect("cursor has a root frame").gref
    }

    pub fn get_root_gid(&self) -> GraphRef {
        self.frames[0].gref
    }

    pub fn current_graph(&self) -> &'l Graph {
        self.library
            .get_graph(self.get_current_gid())
            .expect("dangling graph reference")
    }

    /// Node of the parent graph the cursor descended through; 0 at the
    /// cursor root.
    pub fn caller_node(&self) -> Nid {
        self.frames.last().expect("cursor has a root frame").via
    }

    /// True when the current graph instantiates nothing.
    pub fn is_leaf(&self) -> bool {
        self.library.slot(self.get_current_gid()).instances.is_empty()
    }

    fn on_stack(&self, r: GraphRef) -> bool {
        self.frames.iter().any(|f| f.gref == r)
    }

    /// Descend into the first instance of the current graph, in node-id
    /// order. Refuses cycles.
    pub fn goto_first_child(&mut self) -> bool {
        let slot = self.library.slot(self.get_current_gid());
        let Some((&nid, &callee)) = slot.instances.iter().next() else {
            return false;
        };
        if self.on_stack(callee) || !self.library.is_live(callee) {
            return false;
        }
        self.frames.push(LibFrame {
            gref: callee,
            via: nid,
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
        let via = self.caller_node();
        let parent = self.frames[self.frames.len() - 2].gref;
        let instances = &self.library.slot(parent).instances;
        let found = if forward {
            instances.range(via + 1..).next()
        } else {
            instances.range(..via).next_back()
        };
        let Some((&nid, &callee)) = found else {
            return false;
        };
        let below_top = &self.frames[..self.frames.len() - 1];
        if below_top.iter().any(|f| f.gref == callee) || !self.library.is_live(callee) {
            return false;
        }
        let top = self.frames.last_mut().expect("cursor has a root frame");
        top.gref = callee;
        top.via = nid;
        true
    }

    /// Pop back to the calling graph. False at the cursor root.
    pub fn goto_parent(&mut self) -> bool {
        if self.is_root() {
            return false;
        }
        self.frames.pop();
        true
    }
}
