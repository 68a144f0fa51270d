//! Error taxonomy for the call-path codec.
//!
//! Every failure is terminal for the read or write call that produced it.
//! There is no resynchronization: a stream error means bytes went missing, a
//! format error means the bytes that did arrive are not a valid file.

use std::io;

/// Result alias used throughout the codec crates.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Top-level codec error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Fewer bytes were transferred than a primitive demanded.
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// The bytes were read but do not form a valid file.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// The decode allocator refused a buffer.
    #[error("out of memory allocating {len} elements")]
    OutOfMemory {
        /// Requested element count
        len: usize,
    },

    /// The caller handed the writer data that violates its contract.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CodecError {
    /// Create an invalid-input error.
    pub fn invalid_input(detail: impl Into<String>) -> Self {
        CodecError::InvalidInput(detail.into())
    }

    /// Returns `true` for short reads/writes and underlying I/O failures.
    pub fn is_stream(&self) -> bool {
        matches!(self, CodecError::Stream(_))
    }

    /// Returns `true` when the stream contents were rejected.
    pub fn is_format(&self) -> bool {
        matches!(self, CodecError::Format(_))
    }
}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        CodecError::Stream(StreamError::Io(e))
    }
}

/// Short transfer or I/O failure on the underlying stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// End of stream reached before a value was complete.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes the primitive needed
        expected: usize,
        /// Bytes actually read
        actual: usize,
    },

    /// The stream stopped accepting bytes before a value was complete.
    #[error("short write: expected {expected} bytes, wrote {actual}")]
    ShortWrite {
        /// Bytes the primitive needed to write
        expected: usize,
        /// Bytes actually written
        actual: usize,
    },

    /// Any other I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Structural problems in a call-path file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// Magic string did not match.
    #[error("invalid magic: expected {expected:?}, got {actual:?}")]
    BadMagic {
        /// Expected magic bytes
        expected: Vec<u8>,
        /// Magic bytes found in the stream
        actual: Vec<u8>,
    },

    /// Version string is not one this codec knows.
    #[error("unsupported version {0:?}")]
    BadVersion(Vec<u8>),

    /// Endian marker is not `'l'`.
    #[error("invalid endian marker {0:#04x}")]
    BadEndian(u8),

    /// A declared field width is not 8.
    #[error("invalid {field} width {width}")]
    BadWidth {
        /// Which width marker
        field: &'static str,
        /// Declared width
        width: u32,
    },

    /// A tag outside the legal set appeared.
    #[error("unexpected tag {actual} where {expected} was required")]
    UnexpectedTag {
        /// Description of the legal tag(s)
        expected: &'static str,
        /// Tag found in the stream
        actual: u32,
    },

    /// The tag's format byte is not a known record shape.
    #[error("unknown record format in tag {0:#010x}")]
    UnknownRecordFormat(u32),

    /// The tag's format byte names a different record shape than the reader.
    #[error("record tag {tag:#010x} is not a {expected} record")]
    UnexpectedRecordFormat {
        /// Record shape the caller asked for
        expected: &'static str,
        /// Tag found in the stream
        tag: u32,
    },

    /// A variable-length record exceeds the configured limit.
    #[error("record length {len} exceeds limit {max}")]
    RecordTooLong {
        /// Declared length
        len: u64,
        /// Configured limit
        max: u64,
    },

    /// The header declares more nodes than the reader accepts.
    #[error("tree declares {num_nodes} nodes, limit is {max}")]
    TooManyNodes {
        /// Declared node count
        num_nodes: u64,
        /// Configured limit
        max: u64,
    },

    /// The header declares a tree with no nodes.
    #[error("tree declares no nodes")]
    EmptyTree,

    /// A persistent id falls outside `[ID_BASE, ID_BASE + num_nodes)`.
    #[error("{what} {id} out of range (bound {bound})")]
    IdOutOfRange {
        /// Which id field
        what: &'static str,
        /// Offending id
        id: u64,
        /// Exclusive upper bound
        bound: u64,
    },

    /// Two records claim the same persistent id.
    #[error("duplicate node id {0}")]
    DuplicateId(u64),

    /// The first record is not the root.
    #[error("first node record has id {id}, expected root id {root}")]
    RootNotFirst {
        /// Id of the first record
        id: u64,
        /// Expected root id
        root: u64,
    },

    /// A node names a parent that has not been written.
    #[error("node {id} references unwritten parent {id_parent}")]
    OrphanNode {
        /// Node id
        id: u64,
        /// Parent id
        id_parent: u64,
    },

    /// A node references a LIP other than its own or, if it owns none, its
    /// nearest owning ancestor's.
    #[error("node {id} references LIP {lip_ref}, which is missing or out of scope")]
    DanglingLipRef {
        /// Node id
        id: u64,
        /// Referenced LIP owner id
        lip_ref: u64,
    },

    /// A string record is not valid UTF-8.
    #[error("string record {tag:#010x} is not valid UTF-8")]
    InvalidUtf8 {
        /// Record tag
        tag: u32,
    },

    /// A profile header declares an unexpected number of data sections.
    #[error("profile declares {actual} data sections, expected {expected}")]
    BadDataCount {
        /// Sections this codec writes
        expected: u64,
        /// Sections declared in the header
        actual: u64,
    },

    /// A tree references an epoch the profile does not contain.
    #[error("tree epoch {epoch} out of range ({num_epochs} epochs)")]
    EpochOutOfRange {
        /// Epoch index in the tree header
        epoch: u32,
        /// Number of epochs in the profile
        num_epochs: usize,
    },
}
