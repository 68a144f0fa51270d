//! Profile files: metadata followed by call-path trees
//!
//! A profile names the target program, describes each metric column (how
//! its 8-byte words are interpreted, its sample period), records the load
//! maps ("epochs") the trees' addresses refer to, and then carries
//! `num_ccts` complete tree streams.
//!
//! # Example
//!
//! ```
//! use callpath_cct::{CallTree, Frame, TreeParams};
//! use callpath_format::{HeapAlloc, MetricFlags};
//! use callpath_profile::{
//!     Epoch, EpochTable, LoadModule, MetricDesc, ProfileData, ProfileReader, ProfileWriter,
//! };
//!
//! let mut tree = CallTree::new(1, Frame::at(0x400000));
//! tree.insert_backtrace(&[Frame::at(0x401000)], 0, 5).unwrap();
//!
//! let data = ProfileData {
//!     target: "app".into(),
//!     metrics: vec![MetricDesc::new("cycles", MetricFlags::raw_int(), 1000)],
//!     epochs: EpochTable {
//!         epochs: vec![Epoch { modules: vec![LoadModule::new("/bin/app", 0x400000, 0x400000)] }],
//!     },
//!     num_ccts: 1,
//!     num_tramp_samples: 0,
//! };
//!
//! let mut buf = Vec::new();
//! let mut writer = ProfileWriter::default();
//! writer.write_metadata(&mut buf, &data).unwrap();
//! let params = TreeParams { num_nodes: tree.len() as u64, epoch: 0, num_metrics: 1 };
//! writer.write_tree(&mut buf, &tree, tree.root().unwrap(), params).unwrap();
//! writer.finish().unwrap();
//!
//! let mut reader = ProfileReader::default();
//! let input = &mut buf.as_slice();
//! assert_eq!(reader.read_metadata(input, &mut HeapAlloc).unwrap(), &data);
//! let mut copy = CallTree::for_reading(1);
//! reader.read_tree(input, &mut copy, &mut HeapAlloc).unwrap();
//! assert_eq!(copy.len(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod data;
pub mod dump;
pub mod reader;
pub mod writer;

pub use data::{
    Epoch, EpochTable, LoadModule, MetricDesc, ProfileData, PROFILE_IDENTITY, PROFILE_MAGIC,
    PROFILE_VERSION,
};
pub use dump::{dump_profile, dump_profile_with};
pub use reader::ProfileReader;
pub use writer::ProfileWriter;
