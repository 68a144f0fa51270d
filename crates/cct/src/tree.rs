//! In-memory calling-context tree.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Each node's
//! children form a circular singly linked ring: the last child's
//! `next_sibling` points back to the first, the same shape the sampling
//! runtime builds. [`CallTree`] is both a [`CallTreeSource`] for the writer
//! and a [`CallTreeBuilder`] for the reader, so a tree can be written and
//! read back into the same representation.

use callpath_format::{AssocInfo, CodecError, LipRef, Result};

use crate::reader::{CallTreeBuilder, NodeView};
use crate::writer::{CallTreeSource, NodeData};

/// Index of a node in its [`CallTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Per-node call-site data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame {
    /// Association info
    pub assoc: AssocInfo,
    /// Instruction pointer
    pub ip: u64,
    /// LIP relationship
    pub lip: LipRef,
    /// Stack pointer
    pub sp: u64,
    /// Call-path id
    pub cpid: u32,
}

impl Frame {
    /// Frame at `ip` with every other field zero.
    pub fn at(ip: u64) -> Self {
        Frame {
            ip,
            ..Default::default()
        }
    }

    /// Set the association info.
    pub fn with_assoc(mut self, assoc: AssocInfo) -> Self {
        self.assoc = assoc;
        self
    }

    /// Set the LIP relationship.
    pub fn with_lip(mut self, lip: LipRef) -> Self {
        self.lip = lip;
        self
    }

    /// Set the stack pointer.
    pub fn with_sp(mut self, sp: u64) -> Self {
        self.sp = sp;
        self
    }

    /// Set the call-path id.
    pub fn with_cpid(mut self, cpid: u32) -> Self {
        self.cpid = cpid;
        self
    }

    /// Whether two frames name the same call site. `sp` and `cpid` differ
    /// between samples of one site and are ignored.
    pub fn same_site(&self, other: &Frame) -> bool {
        self.ip == other.ip && self.assoc == other.assoc && self.lip == other.lip
    }
}

#[derive(Debug, Clone)]
struct Node {
    frame: Frame,
    metrics: Vec<u64>,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

/// Arena-backed calling-context tree.
#[derive(Debug, Clone)]
pub struct CallTree {
    num_metrics: usize,
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl CallTree {
    /// Tree holding just a root with zeroed metrics.
    pub fn new(num_metrics: usize, root_frame: Frame) -> Self {
        let mut tree = CallTree::for_reading(num_metrics);
        let root = tree.push(root_frame, vec![0; num_metrics]);
        tree.root = Some(root);
        tree
    }

    /// Empty tree to be filled by the reader.
    pub fn for_reading(num_metrics: usize) -> Self {
        CallTree {
            num_metrics,
            nodes: Vec::new(),
            root: None,
        }
    }

    fn push(&mut self, frame: Frame, metrics: Vec<u64>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            frame,
            metrics,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
        });
        id
    }

    fn attach(&mut self, child: NodeId, parent: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        match self.nodes[parent.0].last_child {
            None => {
                self.nodes[parent.0].first_child = Some(child);
                self.nodes[child.0].next_sibling = Some(child);
            }
            Some(last) => {
                let first = self.nodes[last.0].next_sibling;
                self.nodes[last.0].next_sibling = Some(child);
                self.nodes[child.0].next_sibling = first;
            }
        }
        self.nodes[parent.0].last_child = Some(child);
    }

    /// Metric words per node.
    pub fn num_metrics(&self) -> usize {
        self.num_metrics
    }

    /// Root node, if any.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Node count.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a child with zeroed metrics under `parent`.
    pub fn add_child(&mut self, parent: NodeId, frame: Frame) -> NodeId {
        let child = self.push(frame, vec![0; self.num_metrics]);
        self.attach(child, parent);
        child
    }

    /// Child of `parent` at the same call site as `frame`.
    pub fn find_child(&self, parent: NodeId, frame: &Frame) -> Option<NodeId> {
        self.children(parent)
            .find(|&c| self.nodes[c.0].frame.same_site(frame))
    }

    /// Walk `path` (outermost caller first) below the root, creating missing
    /// nodes, and add `increment` to metric `metric_index` of the last node.
    pub fn insert_backtrace(
        &mut self,
        path: &[Frame],
        metric_index: usize,
        increment: u64,
    ) -> Result<NodeId> {
        if metric_index >= self.num_metrics {
            return Err(CodecError::invalid_input(format!(
                "metric index {metric_index} out of range ({} metrics)",
                self.num_metrics
            )));
        }
        let mut node = self
            .root
            .ok_or_else(|| CodecError::invalid_input("tree has no root"))?;
        for frame in path {
            node = match self.find_child(node, frame) {
                Some(existing) => existing,
                None => self.add_child(node, *frame),
            };
        }
        let slot = self.nodes[node.0]
            .metrics
            .get_mut(metric_index)
            .ok_or_else(|| CodecError::invalid_input("node has a short metric vector"))?;
        *slot = slot.wrapping_add(increment);
        Ok(node)
    }

    /// Children of `node` in insertion order.
    pub fn children(&self, node: NodeId) -> Children<'_> {
        let first = self.nodes[node.0].first_child;
        Children {
            tree: self,
            first,
            next: first,
        }
    }

    /// Parent of `node`.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// Call-site data of `node`.
    pub fn frame(&self, node: NodeId) -> &Frame {
        &self.nodes[node.0].frame
    }

    /// Metric words of `node`.
    pub fn metrics(&self, node: NodeId) -> &[u64] {
        &self.nodes[node.0].metrics
    }

    /// Mutable metric words of `node`.
    pub fn metrics_mut(&mut self, node: NodeId) -> &mut [u64] {
        &mut self.nodes[node.0].metrics
    }

    /// Nodes in preorder, the order the writer assigns ids.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            let start = stack.len();
            stack.extend(self.children(node));
            stack[start..].reverse();
        }
        out
    }
}

/// Iterator over a node's child ring.
#[derive(Debug, Clone)]
pub struct Children<'a> {
    tree: &'a CallTree,
    first: Option<NodeId>,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.nodes[current.0]
            .next_sibling
            .filter(|&n| Some(n) != self.first);
        Some(current)
    }
}

impl CallTreeSource for CallTree {
    type Node = NodeId;

    fn data(&self, node: NodeId) -> NodeData<'_> {
        let n = &self.nodes[node.0];
        NodeData {
            assoc: n.frame.assoc,
            ip: n.frame.ip,
            lip: n.frame.lip,
            sp: n.frame.sp,
            cpid: n.frame.cpid,
            metrics: &n.metrics,
        }
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].first_child
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].next_sibling
    }
}

impl CallTreeBuilder for CallTree {
    type Handle = NodeId;

    fn create_node(&mut self, view: &NodeView<'_>) -> NodeId {
        let lip = match view.lip {
            None => LipRef::None,
            Some(link) if link.owner == view.id => LipRef::Owned(link.lip),
            Some(_) => LipRef::Inherited,
        };
        let frame = Frame {
            assoc: view.assoc,
            ip: view.ip,
            lip,
            sp: view.sp,
            cpid: view.cpid,
        };
        let id = self.push(frame, view.metrics.to_vec());
        if view.parent.is_none() {
            self.root = Some(id);
        }
        id
    }

    fn link_parent(&mut self, child: NodeId, parent: NodeId) {
        self.attach(child, parent);
    }
}
