//! Wire format for call-path tree files
//!
//! This crate owns everything below the tree walk:
//! - Endian-stable primitive I/O ([`io`])
//! - Tagged records ([`record`])
//! - The tree file header and its root conventions ([`header`])
//! - Node and LIP records ([`node`])
//! - LIP, association and metric value types ([`lip`], [`metric`])
//! - The caller-supplied decode allocator ([`alloc`])
//!
//! All multi-byte integers are little-endian on disk. Every failure is a
//! [`CodecError`] and is terminal for the call that produced it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alloc;
pub mod error;
pub mod header;
pub mod io;
pub mod lip;
pub mod metric;
pub mod node;
pub mod record;

pub use alloc::{BudgetAlloc, DecodeAlloc, HeapAlloc};
pub use error::{CodecError, FormatError, Result, StreamError};
pub use header::{
    FileIdentity, RootConvention, TreeHeader, ENDIAN_LITTLE, MAGIC_LEN, NO_PARENT,
    TREE_HEADER_LEN, TREE_MAGIC, VERSION_LEN, WORD_WIDTH,
};
pub use io::{read_up_to, write_up_to, ReadLeExt, WriteLeExt};
pub use lip::{AssocInfo, Association, Lip, LipLink, LipRef, LIP_REF_NONE, LIP_WORDS};
pub use metric::{MetricFlags, MetricKind, MetricValue, ValueFormat, ValueType};
pub use node::{read_node, write_node, DecodedNode, NodeFields, NodeRecord, LIP_TAG, NODE_TAG};
pub use record::{
    read_num8_body, read_num8s_body, read_str_body, read_tag, write_num8_record,
    write_num8s_record, write_str_record, Num8Record, Num8sRecord, RecordFormat, StrRecord, Tag,
};
