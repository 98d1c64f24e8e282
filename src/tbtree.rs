//! Traceback tree.
//!
//! The tree stores every traceback path that is still reachable from the
//! live part of a trellis, instead of keeping the whole trellis. Each node
//! is the end of a segment: the cell `(g, c)` where a run of `state` ended,
//! with the path score up to there. The parent of a node is the end of the
//! preceding segment.
//!
//! Nodes live in an arena and are addressed by `NodeIx`. A node sees its
//! leftmost child only, the others are reached through sibling links.
//! Freed nodes are chained through their `child` link and reused.
//!
//! Trellis cells `lock` the nodes they point to. A node that is neither
//! locked nor has children is dead and freed at once, which may cascade
//! to its ancestors. The root is the cpoint: when it has a single child
//! and nobody holds it, every path goes through that child, so the segment
//! between them is final and can be committed.
use crate::score::Score;

pub type NodeIx = u32;
/// No node.
pub const NIL: NodeIx = u32::MAX;
/// The state recorded in the root node.
pub const BEGIN: usize = usize::MAX;

#[derive(Debug, Clone)]
pub struct TbNode {
    pub g: usize,
    pub c: usize,
    pub state: usize,
    pub score: Score,
    parent: NodeIx,
    child: NodeIx,
    lsib: NodeIx,
    rsib: NodeIx,
    children: u32,
    lock: u32,
    alive: bool,
}

impl TbNode {
    pub fn parent(&self) -> NodeIx {
        self.parent
    }
    pub fn children(&self) -> u32 {
        self.children
    }
    pub fn lock_count(&self) -> u32 {
        self.lock
    }
}

#[derive(Debug, Clone)]
pub struct TbTree {
    nodes: Vec<TbNode>,
    // Head of the freelist.
    free: NodeIx,
    root: NodeIx,
    live: usize,
}

impl TbTree {
    /// A tree with a single root at `(g, c)`.
    pub fn new(g: usize, c: usize) -> Self {
        let root = TbNode {
            g,
            c,
            state: BEGIN,
            score: 0f64,
            parent: NIL,
            child: NIL,
            lsib: NIL,
            rsib: NIL,
            children: 0,
            lock: 0,
            alive: true,
        };
        Self {
            nodes: vec![root],
            free: NIL,
            root: 0,
            live: 1,
        }
    }
    pub fn root(&self) -> NodeIx {
        self.root
    }
    pub fn node(&self, ix: NodeIx) -> &TbNode {
        &self.nodes[ix as usize]
    }
    /// Number of allocated nodes.
    pub fn live(&self) -> usize {
        self.live
    }
    /// Size of the arena, including freed nodes.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_alive(&self, ix: NodeIx) -> bool {
        ix != NIL && self.nodes.get(ix as usize).map(|n| n.alive).unwrap_or(false)
    }
    /// Add a new, unlocked leaf under `parent`. The caller should lock it right away.
    pub fn new_child(&mut self, parent: NodeIx, g: usize, c: usize, state: usize, score: Score) -> NodeIx {
        debug_assert!(self.is_alive(parent));
        let sibling = self.nodes[parent as usize].child;
        let node = TbNode {
            g,
            c,
            state,
            score,
            parent,
            child: NIL,
            lsib: NIL,
            rsib: sibling,
            children: 0,
            lock: 0,
            alive: true,
        };
        let ix = match self.free {
            NIL => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as NodeIx
            }
            ix => {
                self.free = self.nodes[ix as usize].child;
                self.nodes[ix as usize] = node;
                ix
            }
        };
        if sibling != NIL {
            self.nodes[sibling as usize].lsib = ix;
        }
        let parent = &mut self.nodes[parent as usize];
        parent.child = ix;
        parent.children += 1;
        self.live += 1;
        ix
    }
    pub fn lock(&mut self, ix: NodeIx) {
        debug_assert!(self.is_alive(ix));
        self.nodes[ix as usize].lock += 1;
    }
    /// Drop one lock. Frees the node, and then its dead ancestors, if nothing holds it anymore.
    pub fn unlock(&mut self, ix: NodeIx) {
        debug_assert!(self.is_alive(ix));
        let node = &mut self.nodes[ix as usize];
        debug_assert!(node.lock > 0);
        node.lock -= 1;
        self.release(ix);
    }
    fn release(&mut self, mut ix: NodeIx) {
        while ix != NIL && ix != self.root {
            let node = &self.nodes[ix as usize];
            if node.lock > 0 || node.children > 0 {
                break;
            }
            let parent = node.parent;
            self.detach(ix);
            self.free_node(ix);
            ix = parent;
        }
    }
    fn detach(&mut self, ix: NodeIx) {
        let (parent, lsib, rsib) = {
            let node = &self.nodes[ix as usize];
            (node.parent, node.lsib, node.rsib)
        };
        if lsib != NIL {
            self.nodes[lsib as usize].rsib = rsib;
        }
        if rsib != NIL {
            self.nodes[rsib as usize].lsib = lsib;
        }
        if parent != NIL {
            let parent = &mut self.nodes[parent as usize];
            if parent.child == ix {
                parent.child = rsib;
            }
            parent.children -= 1;
        }
        let node = &mut self.nodes[ix as usize];
        node.parent = NIL;
        node.lsib = NIL;
        node.rsib = NIL;
    }
    fn free_node(&mut self, ix: NodeIx) {
        let node = &mut self.nodes[ix as usize];
        node.alive = false;
        node.child = self.free;
        self.free = ix;
        self.live -= 1;
    }
    /// Move the root down while it has exactly one child and holds no lock.
    /// Every segment passed over is handed to `sink` as (segment start, segment end).
    /// Returns the number of committed segments.
    pub fn advance_cpoint<F: FnMut(&TbNode, &TbNode)>(&mut self, mut sink: F) -> usize {
        let mut committed = 0;
        loop {
            let root = &self.nodes[self.root as usize];
            if root.children != 1 || root.lock > 0 {
                break;
            }
            let child = root.child;
            sink(root, &self.nodes[child as usize]);
            let old = self.root;
            self.nodes[child as usize].parent = NIL;
            self.root = child;
            self.free_node(old);
            committed += 1;
        }
        committed
    }
    /// Nodes from `ix` up to the root, both included.
    pub fn path_to_root(&self, mut ix: NodeIx) -> Vec<NodeIx> {
        let mut path = vec![];
        while ix != NIL {
            path.push(ix);
            ix = self.nodes[ix as usize].parent;
        }
        path
    }
    /// Whether `ancestor` is on the path from `ix` to the root.
    pub fn is_ancestor(&self, ancestor: NodeIx, ix: NodeIx) -> bool {
        self.path_to_root(ix).contains(&ancestor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn release_cascade() {
        let mut tree = TbTree::new(0, 0);
        let root = tree.root();
        tree.lock(root);
        let a = tree.new_child(root, 5, 5, 0, 1.0);
        tree.lock(a);
        let b = tree.new_child(a, 10, 10, 1, 2.0);
        tree.lock(b);
        let c = tree.new_child(a, 10, 8, 2, 1.5);
        tree.lock(c);
        assert_eq!(tree.live(), 4);
        tree.unlock(a);
        assert!(tree.is_alive(a));
        tree.unlock(b);
        assert!(!tree.is_alive(b));
        assert!(tree.is_alive(a));
        tree.unlock(c);
        assert!(!tree.is_alive(c));
        assert!(!tree.is_alive(a));
        assert!(tree.is_alive(root));
        assert_eq!(tree.live(), 1);
        // Freed slots are reused.
        let d = tree.new_child(root, 1, 1, 0, 0.5);
        assert!(d == a || d == b || d == c);
        assert_eq!(tree.capacity(), 4);
    }
    #[test]
    fn siblings() {
        let mut tree = TbTree::new(0, 0);
        let root = tree.root();
        tree.lock(root);
        let xs: Vec<_> = (0..4)
            .map(|i| {
                let x = tree.new_child(root, i, i, 0, 0.0);
                tree.lock(x);
                x
            })
            .collect();
        assert_eq!(tree.node(root).children(), 4);
        tree.unlock(xs[1]);
        tree.unlock(xs[3]);
        assert_eq!(tree.node(root).children(), 2);
        tree.unlock(xs[0]);
        assert_eq!(tree.node(root).children(), 1);
        assert!(tree.is_alive(xs[2]));
        assert_eq!(tree.path_to_root(xs[2]), vec![xs[2], root]);
    }
    #[test]
    fn cpoint() {
        let mut tree = TbTree::new(0, 0);
        let root = tree.root();
        tree.lock(root);
        let a = tree.new_child(root, 3, 3, 0, -1.0);
        tree.lock(a);
        let b = tree.new_child(a, 6, 3, 1, -2.0);
        tree.lock(b);
        let c = tree.new_child(b, 9, 6, 0, -3.0);
        tree.lock(c);
        let d = tree.new_child(b, 9, 5, 2, -4.0);
        tree.lock(d);
        let mut segments = vec![];
        let mut sink = |p: &TbNode, n: &TbNode| segments.push((p.g, n.g, n.state));
        // The root is locked: nothing moves.
        assert_eq!(tree.advance_cpoint(&mut sink), 0);
        tree.unlock(root);
        tree.unlock(a);
        tree.unlock(b);
        assert_eq!(tree.advance_cpoint(&mut sink), 2);
        assert_eq!(segments, vec![(0, 3, 0), (3, 6, 1)]);
        assert_eq!(tree.root(), b);
        assert!(tree.is_ancestor(b, c) && tree.is_ancestor(b, d));
        assert_eq!(tree.live(), 3);
        tree.unlock(d);
        let mut segments = vec![];
        assert_eq!(tree.advance_cpoint(|p, n| segments.push((p.g, n.g))), 1);
        assert_eq!(segments, vec![(6, 9)]);
        assert_eq!(tree.root(), c);
        assert_eq!(tree.live(), 1);
    }
}
