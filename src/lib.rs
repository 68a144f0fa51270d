//! callpath - call-path profile tree codec
//!
//! Serializes calling-context trees, the per-call-path sample counts a
//! sampling profiler accumulates, into a compact little-endian binary stream
//! and reads them back with full structural validation.
//!
//! # Crates
//!
//! - [`format`]: primitive I/O, tagged records, headers, node records
//! - [`cct`]: tree writer, reader, text dump, in-memory call tree, file helpers
//! - [`profile`]: profile container holding metadata and many trees
//!
//! # Quick Start
//!
//! ```
//! use callpath::cct::{read_tree, write_tree, CallTree, Frame, TreeParams};
//! use callpath::format::HeapAlloc;
//!
//! let mut tree = CallTree::new(1, Frame::at(0x400000));
//! tree.insert_backtrace(&[Frame::at(0x401000)], 0, 1).unwrap();
//!
//! let mut buf = Vec::new();
//! let params = TreeParams { num_nodes: tree.len() as u64, epoch: 0, num_metrics: 1 };
//! write_tree(&mut buf, &tree, tree.root().unwrap(), params).unwrap();
//!
//! let mut copy = CallTree::for_reading(1);
//! read_tree(&mut buf.as_slice(), &mut copy, &mut HeapAlloc, 1).unwrap();
//! assert_eq!(copy.len(), tree.len());
//! ```

pub use callpath_cct as cct;
pub use callpath_format as format;
pub use callpath_profile as profile;

pub use callpath_cct::{CallTree, CodecConfig, Frame, TreeReader, TreeWriter};
pub use callpath_format::{CodecError, Result};
