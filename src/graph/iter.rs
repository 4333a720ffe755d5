use std::collections::hash_set;

use super::entry::NUM_INLINE_SLOTS;
use super::{Edge, Graph, Nid, Pid, Vid};

enum Stage {
    Inline,
    OverflowShort,
    OverflowLong,
    Spill,
}

/// Walks every incident edge of one vertex: inline slots, then the
/// overflow record, then the spillover set.
pub struct EdgeIter<'g> {
    graph: &'g Graph,
    vid: Vid,
    stage: Stage,
    index: usize,
    spill: Option<hash_set::Iter<'g, u64>>,
}

impl<'g> EdgeIter<'g> {
    pub(crate) fn new(graph: &'g Graph, vid: Vid) -> Self {
        EdgeIter {
            graph,
            vid,
            stage: Stage::Inline,
            index: 0,
            spill: None,
        }
    }
}

impl<'g> Iterator for EdgeIter<'g> {
    type Item = Edge;

    fn next(&mut self) -> Option<Edge> {
        loop {
            match self.stage {
                Stage::Inline => {
                    while self.index < NUM_INLINE_SLOTS {
                        let slot = self.index;
                        self.index += 1;
                        if let Some(edge) =
                            self.graph.table[self.vid as usize].inline_slot(slot, self.vid)
                        {
                            return Some(edge);
                        }
                    }
                    self.index = 0;
                    self.stage = Stage::OverflowShort;
                }
                Stage::OverflowShort => {
                    if let Some(ov) = self.graph.overflow_of(self.vid) {
                        if self.index < ov.num_sedges() {
                            let (other, input) = ov.sedge(self.index, self.vid);
                            self.index += 1;
                            return Some(Edge { other, input });
                        }
                    }
                    self.index = 0;
                    self.stage = Stage::OverflowLong;
                }
                Stage::OverflowLong => {
                    if let Some(ov) = self.graph.overflow_of(self.vid) {
                        if self.index < ov.num_ledges() {
                            let (other, input) = ov.ledge(self.index);
                            self.index += 1;
                            return Some(Edge { other, input });
                        }
                    }
                    self.spill = self.graph.spill.get(&self.vid).map(|set| set.iter());
                    self.stage = Stage::Spill;
                }
                Stage::Spill => {
                    let token = *self.spill.as_mut()?.next()?;
                    return Some(Edge {
                        other: (token >> 1) as Vid,
                        input: token & 1 != 0,
                    });
                }
            }
        }
    }
}

/// Forward scan over live node ids; freed slots and overflow payload are
/// skipped.
pub struct NodeIter<'g> {
    graph: &'g Graph,
    current: Vid,
}

impl<'g> NodeIter<'g> {
    pub(crate) fn new(graph: &'g Graph) -> Self {
        NodeIter { graph, current: 0 }
    }
}

impl<'g> Iterator for NodeIter<'g> {
    type Item = Nid;

    fn next(&mut self) -> Option<Nid> {
        let next = self.graph.fast_next(self.current);
        if next == 0 {
            return None;
        }
        self.current = next;
        Some(next)
    }
}

/// Walks a node's pin chain in ascending port order.
pub struct PinIter<'g> {
    graph: &'g Graph,
    current: Vid,
}

impl<'g> PinIter<'g> {
    pub(crate) fn new(graph: &'g Graph, nid: Nid) -> Self {
        PinIter {
            graph,
            current: graph.table[nid as usize].next_pin(),
        }
    }
}

impl<'g> Iterator for PinIter<'g> {
    type Item = Pid;

    fn next(&mut self) -> Option<Pid> {
        if self.current == 0 {
            return None;
        }
        let out = self.current;
        self.current = self.graph.table[out as usize].next_pin();
        Some(out)
    }
}
