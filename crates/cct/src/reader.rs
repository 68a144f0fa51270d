//! Tree deserializer.
//!
//! Rebuilds a tree into a caller-owned representation through
//! [`CallTreeBuilder`]. Records arrive in preorder, so a node's parent has
//! always been created before the node itself; any record that breaks this
//! rejects the whole file.
//!
//! A node may only reference the LIP it owns or, failing that, the one owned
//! by its nearest owning ancestor. Any other reference is rejected, so a tree
//! read here and written back keeps every LIP association.
//!
//! Scratch tables (node handles, LIPs, LIP scopes, one metric row) come from the caller's
//! [`DecodeAlloc`] and are returned to it before [`TreeReader::read`] returns,
//! whether or not the read succeeded. The caller-built tree is never freed
//! here.

use std::io::Read;

use callpath_format::{
    read_node, AssocInfo, CodecError, DecodeAlloc, FormatError, Lip, LipLink, Result,
    TreeHeader, LIP_REF_NONE,
};
use tracing::{debug, warn};

use crate::config::{CodecConfig, DEFAULT_MAX_NODES};

/// One decoded node, handed to the builder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeView<'a> {
    /// Persistent id
    pub id: u64,
    /// Parent's persistent id; `None` for the root
    pub parent: Option<u64>,
    /// Association info
    pub assoc: AssocInfo,
    /// Instruction pointer
    pub ip: u64,
    /// Resolved LIP, with the id of the node that owns it
    pub lip: Option<LipLink>,
    /// Stack pointer
    pub sp: u64,
    /// Call-path id
    pub cpid: u32,
    /// Metric words, valid only for the duration of the callback
    pub metrics: &'a [u64],
}

/// Receives nodes as they are decoded.
pub trait CallTreeBuilder {
    /// Handle to a created node
    type Handle: Copy;

    /// Create a node; it has no parent yet.
    fn create_node(&mut self, view: &NodeView<'_>) -> Self::Handle;

    /// Attach `child` under `parent`.
    fn link_parent(&mut self, child: Self::Handle, parent: Self::Handle);
}

/// Outcome of a successful read.
#[derive(Debug, Clone, Copy)]
pub struct ReadSummary<H> {
    /// Parsed header
    pub header: TreeHeader,
    /// Handle of the root node
    pub root: H,
    /// LIP records encountered
    pub lip_records: u64,
}

/// Reads call trees, bounding the node count a header may declare.
#[derive(Debug, Clone, Copy)]
pub struct TreeReader {
    max_nodes: u64,
    num_epochs: Option<usize>,
}

impl Default for TreeReader {
    fn default() -> Self {
        TreeReader::new(DEFAULT_MAX_NODES)
    }
}

struct Tables<'t, H> {
    handles: &'t mut [Option<H>],
    lips: &'t mut [Option<Lip>],
    scopes: &'t mut [u64],
    metrics: &'t mut [u64],
}

impl TreeReader {
    /// Reader refusing headers that declare more than `max_nodes` nodes.
    pub fn new(max_nodes: u64) -> Self {
        TreeReader {
            max_nodes,
            num_epochs: None,
        }
    }

    /// Also reject trees whose header epoch does not index a table of
    /// `num_epochs` load maps.
    pub fn with_epoch_limit(mut self, num_epochs: usize) -> Self {
        self.num_epochs = Some(num_epochs);
        self
    }

    /// Reader using the configured node limit.
    pub fn from_config(config: &CodecConfig) -> Self {
        TreeReader::new(config.max_nodes)
    }

    /// Configured node limit.
    pub fn max_nodes(&self) -> u64 {
        self.max_nodes
    }

    /// Read and validate one tree, building it through `builder`.
    ///
    /// `num_metrics` is the metric count the tree was written with; it is not
    /// stored in the tree itself.
    pub fn read<R, B, A>(
        &self,
        r: &mut R,
        builder: &mut B,
        alloc: &mut A,
        num_metrics: usize,
    ) -> Result<ReadSummary<B::Handle>>
    where
        R: Read + ?Sized,
        B: CallTreeBuilder + ?Sized,
        A: DecodeAlloc,
    {
        let result = self.read_inner(r, builder, alloc, num_metrics);
        if let Err(e) = &result {
            if e.is_format() {
                warn!(target: "callpath::cct", error = %e, "Rejected corrupt tree");
            }
        }
        result
    }

    fn read_inner<R, B, A>(
        &self,
        r: &mut R,
        builder: &mut B,
        alloc: &mut A,
        num_metrics: usize,
    ) -> Result<ReadSummary<B::Handle>>
    where
        R: Read + ?Sized,
        B: CallTreeBuilder + ?Sized,
        A: DecodeAlloc,
    {
        let header = TreeHeader::decode(r)?;
        debug!(
            target: "callpath::cct",
            version = %header.root_convention(),
            num_nodes = header.num_nodes(),
            epoch = header.epoch(),
            "Tree header read"
        );
        if header.num_nodes() > self.max_nodes {
            return Err(FormatError::TooManyNodes {
                num_nodes: header.num_nodes(),
                max: self.max_nodes,
            }
            .into());
        }
        if header.num_nodes() == 0 {
            return Err(FormatError::EmptyTree.into());
        }
        if let Some(num_epochs) = self.num_epochs {
            if header.epoch() as usize >= num_epochs {
                return Err(FormatError::EpochOutOfRange {
                    epoch: header.epoch(),
                    num_epochs,
                }
                .into());
            }
        }

        let slots = usize::try_from(header.id_bound())
            .map_err(|_| CodecError::OutOfMemory { len: usize::MAX })?;
        let mut handles = alloc.alloc(slots, None::<B::Handle>)?;
        let mut lips = match alloc.alloc(slots, None::<Lip>) {
            Ok(buf) => buf,
            Err(e) => {
                alloc.free(handles);
                return Err(e);
            }
        };
        let mut scopes = match alloc.alloc(slots, LIP_REF_NONE) {
            Ok(buf) => buf,
            Err(e) => {
                alloc.free(lips);
                alloc.free(handles);
                return Err(e);
            }
        };
        let mut metrics = match alloc.alloc(num_metrics, 0u64) {
            Ok(buf) => buf,
            Err(e) => {
                alloc.free(scopes);
                alloc.free(lips);
                alloc.free(handles);
                return Err(e);
            }
        };

        let result = read_records(
            r,
            &header,
            builder,
            Tables {
                handles: &mut handles,
                lips: &mut lips,
                scopes: &mut scopes,
                metrics: &mut metrics,
            },
        );

        alloc.free(metrics);
        alloc.free(scopes);
        alloc.free(lips);
        alloc.free(handles);

        let (root, lip_records) = result?;
        debug!(
            target: "callpath::cct",
            num_nodes = header.num_nodes(),
            lip_records,
            "Tree read finished"
        );
        Ok(ReadSummary {
            header,
            root,
            lip_records,
        })
    }
}

fn read_records<R, B>(
    r: &mut R,
    header: &TreeHeader,
    builder: &mut B,
    tables: Tables<'_, B::Handle>,
) -> Result<(B::Handle, u64)>
where
    R: Read + ?Sized,
    B: CallTreeBuilder + ?Sized,
{
    let Tables {
        handles,
        lips,
        scopes,
        metrics,
    } = tables;
    let convention = header.root_convention();
    let base = header.id_base();
    let bound = header.id_bound();
    let in_range = |id: u64| id >= base && id < bound;

    let mut root = None;
    let mut lip_records = 0u64;

    for index in 0..header.num_nodes() {
        let node = read_node(r, metrics)?;
        let f = node.fields;

        if !in_range(f.id) {
            return Err(FormatError::IdOutOfRange {
                what: "node id",
                id: f.id,
                bound,
            }
            .into());
        }
        let slot = f.id as usize;
        if handles[slot].is_some() {
            return Err(FormatError::DuplicateId(f.id).into());
        }

        let parent = if index == 0 {
            if f.id != base {
                return Err(FormatError::RootNotFirst { id: f.id, root: base }.into());
            }
            if f.id_parent != convention.root_parent() {
                return Err(FormatError::OrphanNode {
                    id: f.id,
                    id_parent: f.id_parent,
                }
                .into());
            }
            None
        } else {
            if !in_range(f.id_parent) {
                return Err(FormatError::IdOutOfRange {
                    what: "parent id",
                    id: f.id_parent,
                    bound,
                }
                .into());
            }
            match handles[f.id_parent as usize] {
                Some(h) => Some((f.id_parent, h)),
                None => {
                    return Err(FormatError::OrphanNode {
                        id: f.id,
                        id_parent: f.id_parent,
                    }
                    .into())
                }
            }
        };

        // Owner whose LIP this node may reference: itself, else the nearest
        // owning ancestor.
        let in_scope = match node.owned_lip {
            Some(lip) => {
                lips[slot] = Some(lip);
                lip_records += 1;
                f.id
            }
            None => parent.map_or(LIP_REF_NONE, |(id, _)| scopes[id as usize]),
        };
        scopes[slot] = in_scope;

        let dangling = FormatError::DanglingLipRef {
            id: f.id,
            lip_ref: f.lip_ref,
        };
        let lip = if f.lip_ref == LIP_REF_NONE {
            if node.owned_lip.is_some() {
                return Err(dangling.into());
            }
            None
        } else if f.lip_ref != in_scope {
            return Err(dangling.into());
        } else {
            match lips[f.lip_ref as usize] {
                Some(lip) => Some(LipLink {
                    owner: f.lip_ref,
                    lip,
                }),
                None => return Err(dangling.into()),
            }
        };

        let view = NodeView {
            id: f.id,
            parent: parent.map(|(id, _)| id),
            assoc: f.assoc,
            ip: f.ip,
            lip,
            sp: f.sp,
            cpid: f.cpid,
            metrics,
        };
        let handle = builder.create_node(&view);
        handles[slot] = Some(handle);
        match parent {
            Some((_, parent_handle)) => builder.link_parent(handle, parent_handle),
            None => root = Some(handle),
        }
    }

    let root = root.ok_or(FormatError::EmptyTree)?;
    Ok((root, lip_records))
}

/// Read one tree with the default node limit.
pub fn read_tree<R, B, A>(
    r: &mut R,
    builder: &mut B,
    alloc: &mut A,
    num_metrics: usize,
) -> Result<ReadSummary<B::Handle>>
where
    R: Read + ?Sized,
    B: CallTreeBuilder + ?Sized,
    A: DecodeAlloc,
{
    TreeReader::default().read(r, builder, alloc, num_metrics)
}
