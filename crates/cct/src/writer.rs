//! Tree serializer.
//!
//! Walks a caller-owned call tree in preorder through [`CallTreeSource`],
//! assigning persistent ids from an explicit [`IdCounter`] so every node's id
//! is greater than all of its ancestors'. The writer performs no allocation
//! and may be driven from a context where the allocator is off limits; it
//! recurses once per tree level.

use std::io::Write;

use callpath_format::header::TREE_HEADER_LEN;
use callpath_format::node::encoded_len;
use callpath_format::{
    write_node, AssocInfo, CodecError, LipRef, NodeFields, NodeRecord, Result, RootConvention,
    TreeHeader, LIP_REF_NONE,
};
use tracing::debug;

use crate::config::{CodecConfig, ConfigResult};

/// What the writer reads from each node.
#[derive(Debug, Clone, Copy)]
pub struct NodeData<'a> {
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
    /// Metric words; length must equal the tree's metric count
    pub metrics: &'a [u64],
}

/// Read-only traversal of a call tree.
///
/// Sibling lists may be linear (ending in `None`) or circular (the last
/// sibling links back to the first); the walk stops at whichever comes first.
pub trait CallTreeSource {
    /// Node handle
    type Node: Copy + PartialEq;

    /// Data attached to `node`.
    fn data(&self, node: Self::Node) -> NodeData<'_>;

    /// First child of `node`.
    fn first_child(&self, node: Self::Node) -> Option<Self::Node>;

    /// Next sibling of `node`.
    fn next_sibling(&self, node: Self::Node) -> Option<Self::Node>;
}

/// Tree-wide parameters recorded in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParams {
    /// Exact number of nodes reachable from the root
    pub num_nodes: u64,
    /// Load-module epoch
    pub epoch: u32,
    /// Metric words per node
    pub num_metrics: usize,
}

/// Outcome of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    /// Node records written
    pub num_nodes: u64,
    /// LIP records written
    pub lip_records: u64,
    /// Total bytes written, header included
    pub bytes: u64,
}

/// Persistent id allocator for one write session.
#[derive(Debug)]
pub struct IdCounter {
    next: u64,
}

impl IdCounter {
    /// Counter whose first id is `base`.
    pub fn new(base: u64) -> Self {
        IdCounter { next: base }
    }

    /// Take the next id.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Id the next call will return.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// Writes call trees in one root convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeWriter {
    convention: RootConvention,
}

struct Walk<'w, W: ?Sized> {
    out: &'w mut W,
    ids: IdCounter,
    bound: u64,
    declared: u64,
    num_metrics: usize,
    lip_records: u64,
    bytes: u64,
}

impl TreeWriter {
    /// Writer for `convention`.
    pub fn new(convention: RootConvention) -> Self {
        TreeWriter { convention }
    }

    /// Writer for the configured format version.
    pub fn from_config(config: &CodecConfig) -> ConfigResult<Self> {
        Ok(TreeWriter::new(config.root_convention()?))
    }

    /// Root convention in use.
    pub fn convention(&self) -> RootConvention {
        self.convention
    }

    /// Serialize the tree rooted at `root`.
    ///
    /// `params.num_nodes` must equal the number of nodes reachable from
    /// `root`; see [`count_nodes`]. A mismatch fails with
    /// [`CodecError::InvalidInput`] after the stream has been partly written.
    ///
    /// The walk allocates nothing and recurses once per tree level, so the
    /// depth of the tree is bounded by the calling thread's stack. Very deep
    /// trees must be written from a thread spawned with a larger stack.
    pub fn write<W, S>(
        &self,
        w: &mut W,
        source: &S,
        root: S::Node,
        params: TreeParams,
    ) -> Result<WriteSummary>
    where
        W: Write + ?Sized,
        S: CallTreeSource + ?Sized,
    {
        let header = TreeHeader::new(self.convention, params.num_nodes, params.epoch);
        header.encode(w)?;
        debug!(
            target: "callpath::cct",
            version = %self.convention,
            num_nodes = params.num_nodes,
            epoch = params.epoch,
            "Tree header written"
        );

        let mut walk = Walk {
            out: w,
            ids: IdCounter::new(header.id_base()),
            bound: header.id_bound(),
            declared: params.num_nodes,
            num_metrics: params.num_metrics,
            lip_records: 0,
            bytes: TREE_HEADER_LEN as u64,
        };
        walk.node(source, root, self.convention.root_parent(), None)?;

        let written = walk.ids.peek() - header.id_base();
        if written != params.num_nodes {
            return Err(CodecError::invalid_input(format!(
                "header declared {} nodes, tree has {}",
                params.num_nodes, written
            )));
        }

        debug!(
            target: "callpath::cct",
            num_nodes = written,
            lip_records = walk.lip_records,
            bytes = walk.bytes,
            "Tree walk finished"
        );
        Ok(WriteSummary {
            num_nodes: written,
            lip_records: walk.lip_records,
            bytes: walk.bytes,
        })
    }
}

impl<W: Write + ?Sized> Walk<'_, W> {
    fn node<S: CallTreeSource + ?Sized>(
        &mut self,
        source: &S,
        node: S::Node,
        id_parent: u64,
        lip_owner: Option<u64>,
    ) -> Result<()> {
        let id = self.ids.next_id();
        if id >= self.bound {
            return Err(CodecError::invalid_input(format!(
                "tree has more nodes than the {} declared",
                self.declared
            )));
        }

        let data = source.data(node);
        let (owned_lip, lip_ref, child_owner) = match data.lip {
            LipRef::None => (None, LIP_REF_NONE, lip_owner),
            LipRef::Owned(lip) => (Some(lip), id, Some(id)),
            LipRef::Inherited => match lip_owner {
                Some(owner) => (None, owner, lip_owner),
                None => {
                    return Err(CodecError::invalid_input(format!(
                        "node {id} inherits a LIP but no ancestor owns one"
                    )))
                }
            },
        };

        let record = NodeRecord {
            fields: NodeFields {
                id,
                id_parent,
                assoc: data.assoc,
                ip: data.ip,
                lip_ref,
                sp: data.sp,
                cpid: data.cpid,
            },
            owned_lip,
            metrics: data.metrics,
        };
        write_node(&mut *self.out, &record, self.num_metrics)?;
        if owned_lip.is_some() {
            self.lip_records += 1;
        }
        self.bytes += encoded_len(self.num_metrics, owned_lip.is_some()) as u64;

        if let Some(first) = source.first_child(node) {
            let mut child = first;
            loop {
                self.node(source, child, id, child_owner)?;
                match source.next_sibling(child) {
                    Some(next) if next != first => child = next,
                    _ => break,
                }
            }
        }
        Ok(())
    }
}

/// Count the nodes reachable from `root` under the writer's traversal rules.
///
/// Uses a heap worklist, so unlike [`TreeWriter::write`] it handles trees of
/// any depth; it must not be called where allocation is off limits.
pub fn count_nodes<S: CallTreeSource + ?Sized>(source: &S, root: S::Node) -> u64 {
    let mut n = 0;
    let mut pending = vec![root];
    while let Some(node) = pending.pop() {
        n += 1;
        if let Some(first) = source.first_child(node) {
            let mut child = first;
            loop {
                pending.push(child);
                match source.next_sibling(child) {
                    Some(next) if next != first => child = next,
                    _ => break,
                }
            }
        }
    }
    n
}

/// Serialize a tree in the default root convention.
pub fn write_tree<W, S>(
    w: &mut W,
    source: &S,
    root: S::Node,
    params: TreeParams,
) -> Result<WriteSummary>
where
    W: Write + ?Sized,
    S: CallTreeSource + ?Sized,
{
    TreeWriter::default().write(w, source, root, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use callpath_format::Lip;

    /// Children stored as `None`-terminated lists: `kids[n]` are n's children.
    struct Linear {
        kids: Vec<Vec<usize>>,
        lips: Vec<LipRef>,
    }

    impl CallTreeSource for Linear {
        type Node = (usize, usize);

        fn data(&self, node: (usize, usize)) -> NodeData<'_> {
            NodeData {
                assoc: AssocInfo::default(),
                ip: node.0 as u64,
                lip: self.lips[node.0],
                sp: 0,
                cpid: 0,
                metrics: &[],
            }
        }

        fn first_child(&self, node: (usize, usize)) -> Option<(usize, usize)> {
            self.kids[node.0].first().map(|&k| (k, 0))
        }

        fn next_sibling(&self, node: (usize, usize)) -> Option<(usize, usize)> {
            let parent = self.kids.iter().position(|k| k.contains(&node.0))?;
            let siblings = &self.kids[parent];
            siblings.get(node.1 + 1).map(|&k| (k, node.1 + 1))
        }
    }

    fn three_level() -> Linear {
        Linear {
            kids: vec![vec![1, 3], vec![2], vec![], vec![]],
            lips: vec![LipRef::None; 4],
        }
    }

    fn params(num_nodes: u64) -> TreeParams {
        TreeParams {
            num_nodes,
            epoch: 0,
            num_metrics: 0,
        }
    }

    #[test]
    fn test_id_counter() {
        let mut ids = IdCounter::new(1);
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.peek(), 3);
    }

    #[test]
    fn test_count_nodes_linear_siblings() {
        assert_eq!(count_nodes(&three_level(), (0, 0)), 4);
    }

    #[test]
    fn test_write_summary() {
        let mut buf = Vec::new();
        let summary = write_tree(&mut buf, &three_level(), (0, 0), params(4)).unwrap();
        assert_eq!(summary.num_nodes, 4);
        assert_eq!(summary.lip_records, 0);
        assert_eq!(summary.bytes, buf.len() as u64);
    }

    #[test]
    fn test_declared_count_too_small() {
        let mut buf = Vec::new();
        let err = write_tree(&mut buf, &three_level(), (0, 0), params(3)).unwrap_err();
        assert!(matches!(err, CodecError::InvalidInput(_)));
    }

    #[test]
    fn test_declared_count_too_large() {
        let mut buf = Vec::new();
        let err = write_tree(&mut buf, &three_level(), (0, 0), params(5)).unwrap_err();
        assert!(matches!(err, CodecError::InvalidInput(_)));
    }

    #[test]
    fn test_inherited_lip_without_owner() {
        let mut source = three_level();
        source.lips[2] = LipRef::Inherited;
        let err = write_tree(&mut Vec::new(), &source, (0, 0), params(4)).unwrap_err();
        assert!(matches!(err, CodecError::InvalidInput(_)));
    }

    #[test]
    fn test_lip_records_counted() {
        let mut source = three_level();
        source.lips[1] = LipRef::Owned(Lip([1, 2]));
        source.lips[2] = LipRef::Inherited;
        let mut buf = Vec::new();
        let summary = write_tree(&mut buf, &source, (0, 0), params(4)).unwrap();
        assert_eq!(summary.lip_records, 1);
        assert_eq!(summary.bytes, buf.len() as u64);
    }

    #[test]
    fn test_wrong_metric_count() {
        let source = three_level();
        let p = TreeParams {
            num_metrics: 2,
            ..params(4)
        };
        let err = write_tree(&mut Vec::new(), &source, (0, 0), p).unwrap_err();
        assert!(matches!(err, CodecError::InvalidInput(_)));
    }
}
