//! Shared helpers for tree integration tests.

#![allow(dead_code)]

use callpath_cct::{CallTree, CallTreeBuilder, Frame, NodeId, NodeView, TreeParams};
use callpath_format::{AssocInfo, Association, Lip, LipLink, LipRef};

/// Records every callback the reader makes.
#[derive(Debug, Default)]
pub struct Recorder {
    /// `(id, parent, lip, metrics)` per created node, in arrival order
    pub nodes: Vec<(u64, Option<u64>, Option<LipLink>, Vec<u64>)>,
    /// `(child, parent)` handle pairs
    pub links: Vec<(usize, usize)>,
}

impl CallTreeBuilder for Recorder {
    type Handle = usize;

    fn create_node(&mut self, view: &NodeView<'_>) -> usize {
        self.nodes
            .push((view.id, view.parent, view.lip, view.metrics.to_vec()));
        self.nodes.len() - 1
    }

    fn link_parent(&mut self, child: usize, parent: usize) {
        self.links.push((child, parent));
    }
}

/// Params describing the whole of `tree`.
pub fn params_for(tree: &CallTree, epoch: u32) -> TreeParams {
    TreeParams {
        num_nodes: tree.len() as u64,
        epoch,
        num_metrics: tree.num_metrics(),
    }
}

/// Assert two trees have the same shape, frames and metrics.
pub fn assert_same_tree(a: &CallTree, b: &CallTree) {
    let pa = a.preorder();
    let pb = b.preorder();
    assert_eq!(pa.len(), pb.len(), "node count differs");
    let pos_a = |n: NodeId| pa.iter().position(|&x| x == n);
    let pos_b = |n: NodeId| pb.iter().position(|&x| x == n);
    for (&x, &y) in pa.iter().zip(pb.iter()) {
        assert_eq!(a.frame(x), b.frame(y), "frame differs");
        assert_eq!(a.metrics(x), b.metrics(y), "metrics differ");
        assert_eq!(
            a.parent(x).and_then(|p| pos_a(p)),
            b.parent(y).and_then(|p| pos_b(p)),
            "parent differs"
        );
        assert_eq!(a.children(x).count(), b.children(y).count());
    }
}

/// Small tree exercising every LIP relationship and association codes.
///
/// ```text
/// root
/// ├── main (owns LIP L1)
/// │   ├── f (inherits L1)
/// │   │   └── g (owns LIP L2)
/// │   │       └── h (inherits L2)
/// │   └── k
/// └── start
/// ```
pub fn lip_tree() -> CallTree {
    let mut tree = CallTree::new(2, Frame::at(0x400000));
    let root = tree.root().unwrap();
    let main = tree.add_child(
        root,
        Frame::at(0x401000)
            .with_lip(LipRef::Owned(Lip([0xA1, 0xA2])))
            .with_assoc(AssocInfo::new(Association::OneToMany, 2)),
    );
    let f = tree.add_child(
        main,
        Frame::at(0x402000)
            .with_lip(LipRef::Inherited)
            .with_assoc(AssocInfo::new(Association::ManyToOne, 1)),
    );
    let g = tree.add_child(
        f,
        Frame::at(0x403000).with_lip(LipRef::Owned(Lip([0xB1, 0xB2]))),
    );
    let h = tree.add_child(g, Frame::at(0x404000).with_lip(LipRef::Inherited));
    let k = tree.add_child(main, Frame::at(0x405000).with_sp(0x7ff0).with_cpid(12));
    let _start = tree.add_child(root, Frame::at(0x406000));

    tree.metrics_mut(h).copy_from_slice(&[10, 2.5f64.to_bits()]);
    tree.metrics_mut(k).copy_from_slice(&[3, 0]);
    tree
}
