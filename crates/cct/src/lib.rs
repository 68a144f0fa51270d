//! Call-path tree serialization
//!
//! - [`writer`]: preorder serializer over any [`CallTreeSource`]
//! - [`reader`]: validating deserializer into any [`CallTreeBuilder`]
//! - [`dump`]: text rendering for debugging
//! - [`tree`]: an arena-backed [`CallTree`] implementing both sides
//! - [`config`] and [`file`]: `callpath.toml` settings and crash-safe files
//!
//! # Example
//!
//! ```
//! use callpath_cct::{read_tree, write_tree, CallTree, Frame, TreeParams};
//! use callpath_format::HeapAlloc;
//!
//! let mut tree = CallTree::new(1, Frame::at(0x400000));
//! tree.insert_backtrace(&[Frame::at(0x401000), Frame::at(0x402000)], 0, 3).unwrap();
//!
//! let mut buf = Vec::new();
//! let params = TreeParams { num_nodes: tree.len() as u64, epoch: 0, num_metrics: 1 };
//! write_tree(&mut buf, &tree, tree.root().unwrap(), params).unwrap();
//!
//! let mut copy = CallTree::for_reading(1);
//! read_tree(&mut buf.as_slice(), &mut copy, &mut HeapAlloc, 1).unwrap();
//! assert_eq!(copy.len(), 3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dump;
pub mod file;
pub mod reader;
pub mod tree;
pub mod writer;

pub use config::{CodecConfig, ConfigError, ConfigResult, CONFIG_FILE_NAME};
pub use dump::{dump_to_string, DumpSummary, TreeDumper};
pub use file::{load_tree_file, save_tree_file, FileError, FileResult};
pub use reader::{read_tree, CallTreeBuilder, NodeView, ReadSummary, TreeReader};
pub use tree::{CallTree, Children, Frame, NodeId};
pub use writer::{
    count_nodes, write_tree, CallTreeSource, IdCounter, NodeData, TreeParams, TreeWriter,
    WriteSummary,
};
