//! Compact user-facing handles. Raw ids stay the implementation currency;
//! these value types are what crosses an application boundary.

use crate::graph::{Nid, Pid, PortId};
use crate::tree::{Tree, TreePos, INVALID, ROOT};

/// A graph node handle. Nodes always answer port 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    nid: Nid,
}

impl Node {
    pub(crate) fn new(nid: Nid) -> Self {
        Node { nid }
    }

    pub fn nid(self) -> Nid {
        self.nid
    }

    pub fn port_id(self) -> PortId {
        0
    }
}

/// A graph pin handle carrying its owner and port.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pin {
    pid: Pid,
    nid: Nid,
    port: PortId,
}

impl Pin {
    pub(crate) fn new(pid: Pid, nid: Nid, port: PortId) -> Self {
        Pin { pid, nid, port }
    }

    pub fn pid(self) -> Pid {
        self.pid
    }

    pub fn nid(self) -> Nid {
        self.nid
    }

    pub fn port_id(self) -> PortId {
        self.port
    }
}

/// A borrowed view of one tree node.
pub struct Tnode<'t, T> {
    tree: &'t Tree<T>,
    pos: TreePos,
}

impl<'t, T> Tnode<'t, T> {
    pub(crate) fn new(tree: &'t Tree<T>, pos: TreePos) -> Self {
        Tnode { tree, pos }
    }

    pub fn pos(&self) -> TreePos {
        self.pos
    }

    pub fn data(&self) -> &'t T {
        self.tree.get_data(self.pos)
    }

    pub fn is_leaf(&self) -> bool {
        self.tree.is_leaf(self.pos)
    }

    pub fn is_root(&self) -> bool {
        self.pos == ROOT
    }

    pub fn parent(&self) -> Option<Tnode<'t, T>> {
        let parent = self.tree.get_parent(self.pos);
        if parent == INVALID {
            None
        } else {
            Some(Tnode::new(self.tree, parent))
        }
    }
}
