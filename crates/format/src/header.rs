//! File identity and tree header.
//!
//! # Layout
//!
//! ```text
//! magic[10]  version[5]  endian[1]    FileIdentity (16 bytes)
//! vma_width:u32  uint_width:u32       both must be 8
//! num_nodes:u64
//! epoch:u32
//! ```

use std::io::{Read, Write};

use crate::error::{FormatError, Result};
use crate::io::{ReadLeExt, WriteLeExt};

/// Magic bytes opening every tree file.
pub const TREE_MAGIC: [u8; MAGIC_LEN] = *b"HPC_CSTREE";

/// Length of the magic string.
pub const MAGIC_LEN: usize = 10;

/// Length of the version string.
pub const VERSION_LEN: usize = 5;

/// Endian marker for little-endian files, the only kind written or accepted.
pub const ENDIAN_LITTLE: u8 = b'l';

/// Required width, in bytes, of addresses and unsigned words.
pub const WORD_WIDTH: u32 = 8;

/// Parent id recorded for the root under [`RootConvention::SentinelBase`].
pub const NO_PARENT: u64 = 0;

/// Encoded size of [`TreeHeader`].
pub const TREE_HEADER_LEN: usize = FileIdentity::ENCODED_LEN + 4 + 4 + 8 + 4;

/// Magic, version and endian marker at the start of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    /// Magic string
    pub magic: [u8; MAGIC_LEN],
    /// Version string
    pub version: [u8; VERSION_LEN],
    /// Endian marker
    pub endian: u8,
}

impl FileIdentity {
    /// Encoded size in bytes.
    pub const ENCODED_LEN: usize = MAGIC_LEN + VERSION_LEN + 1;

    /// Little-endian identity with the given magic and version.
    pub const fn new(magic: [u8; MAGIC_LEN], version: [u8; VERSION_LEN]) -> Self {
        FileIdentity {
            magic,
            version,
            endian: ENDIAN_LITTLE,
        }
    }

    /// Write the identity.
    pub fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_bytes(&self.magic)?;
        w.write_bytes(&self.version)?;
        w.write_u8(self.endian)
    }

    /// Read an identity without validating it.
    pub fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let magic = r.read_byte_array::<MAGIC_LEN>()?;
        let version = r.read_byte_array::<VERSION_LEN>()?;
        let endian = r.read_u8()?;
        Ok(FileIdentity {
            magic,
            version,
            endian,
        })
    }

    /// Check the magic and endian marker.
    pub fn check(&self, magic: &[u8; MAGIC_LEN]) -> Result<()> {
        if &self.magic != magic {
            return Err(FormatError::BadMagic {
                expected: magic.to_vec(),
                actual: self.magic.to_vec(),
            }
            .into());
        }
        if self.endian != ENDIAN_LITTLE {
            return Err(FormatError::BadEndian(self.endian).into());
        }
        Ok(())
    }

    /// Version bytes as text, for display.
    pub fn version_str(&self) -> String {
        String::from_utf8_lossy(&self.version).into_owned()
    }
}

/// How the root's parent id and the first persistent id are chosen.
///
/// Selected by the tree file's version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RootConvention {
    /// Version `01.00`: ids start at 0, the root is its own parent.
    SelfLoop,
    /// Version `01.01`: ids start at 1, the root's parent is [`NO_PARENT`].
    #[default]
    SentinelBase,
}

impl RootConvention {
    /// Every known convention.
    pub const ALL: [RootConvention; 2] = [RootConvention::SelfLoop, RootConvention::SentinelBase];

    /// Version bytes written for this convention.
    pub const fn version(self) -> [u8; VERSION_LEN] {
        match self {
            RootConvention::SelfLoop => *b"01.00",
            RootConvention::SentinelBase => *b"01.01",
        }
    }

    /// Look up the convention for a version string.
    pub fn from_version(version: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.version() == version)
    }

    /// First persistent id; the root always receives it.
    pub const fn id_base(self) -> u64 {
        match self {
            RootConvention::SelfLoop => 0,
            RootConvention::SentinelBase => 1,
        }
    }

    /// Parent id written for the root.
    pub const fn root_parent(self) -> u64 {
        match self {
            RootConvention::SelfLoop => self.id_base(),
            RootConvention::SentinelBase => NO_PARENT,
        }
    }

    /// Whether a record with these ids is the root.
    pub fn is_root(self, id: u64, id_parent: u64) -> bool {
        id == self.id_base() && id_parent == self.root_parent()
    }
}

impl core::fmt::Display for RootConvention {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let v = self.version();
        f.write_str(std::str::from_utf8(&v).unwrap_or("?????"))
    }
}

/// Header preceding a tree's node records.
///
/// Only constructed valid: [`TreeHeader::decode`] rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    convention: RootConvention,
    num_nodes: u64,
    epoch: u32,
}

impl TreeHeader {
    /// Header for a tree of `num_nodes` nodes in `epoch`.
    pub fn new(convention: RootConvention, num_nodes: u64, epoch: u32) -> Self {
        TreeHeader {
            convention,
            num_nodes,
            epoch,
        }
    }

    /// File identity implied by the convention.
    pub fn identity(&self) -> FileIdentity {
        FileIdentity::new(TREE_MAGIC, self.convention.version())
    }

    /// Root convention parsed from the version string.
    pub fn root_convention(&self) -> RootConvention {
        self.convention
    }

    /// Number of node records that follow.
    pub fn num_nodes(&self) -> u64 {
        self.num_nodes
    }

    /// Load-module epoch the tree's addresses belong to.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// First persistent id.
    pub fn id_base(&self) -> u64 {
        self.convention.id_base()
    }

    /// Exclusive upper bound on persistent ids.
    pub fn id_bound(&self) -> u64 {
        self.id_base().saturating_add(self.num_nodes)
    }

    /// Write the header.
    pub fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.identity().encode(w)?;
        w.write_u32_le(WORD_WIDTH)?;
        w.write_u32_le(WORD_WIDTH)?;
        w.write_u64_le(self.num_nodes)?;
        w.write_u32_le(self.epoch)
    }

    /// Read and validate a header.
    pub fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let identity = FileIdentity::decode(r)?;
        let vma_width = r.read_u32_le()?;
        let uint_width = r.read_u32_le()?;
        let num_nodes = r.read_u64_le()?;
        let epoch = r.read_u32_le()?;

        identity.check(&TREE_MAGIC)?;
        let convention = RootConvention::from_version(&identity.version)
            .ok_or_else(|| FormatError::BadVersion(identity.version.to_vec()))?;
        for (field, width) in [("vma", vma_width), ("uint", uint_width)] {
            if width != WORD_WIDTH {
                return Err(FormatError::BadWidth { field, width }.into());
            }
        }

        Ok(TreeHeader {
            convention,
            num_nodes,
            epoch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use std::io::Cursor;

    fn encoded(header: &TreeHeader) -> Vec<u8> {
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_header_layout() {
        let buf = encoded(&TreeHeader::new(RootConvention::SentinelBase, 3, 7));
        assert_eq!(buf.len(), TREE_HEADER_LEN);
        assert_eq!(&buf[..10], b"HPC_CSTREE");
        assert_eq!(&buf[10..15], b"01.01");
        assert_eq!(buf[15], b'l');
        assert_eq!(&buf[16..20], &8u32.to_le_bytes());
        assert_eq!(&buf[20..24], &8u32.to_le_bytes());
        assert_eq!(&buf[24..32], &3u64.to_le_bytes());
        assert_eq!(&buf[32..36], &7u32.to_le_bytes());
    }

    #[test]
    fn test_header_decode() {
        for convention in RootConvention::ALL {
            let header = TreeHeader::new(convention, 42, 1);
            let decoded = TreeHeader::decode(&mut Cursor::new(encoded(&header))).unwrap();
            assert_eq!(decoded, header);
            assert_eq!(decoded.root_convention(), convention);
        }
    }

    #[test]
    fn test_conventions() {
        assert_eq!(RootConvention::default(), RootConvention::SentinelBase);
        assert_eq!(RootConvention::SentinelBase.id_base(), 1);
        assert_eq!(RootConvention::SentinelBase.root_parent(), NO_PARENT);
        assert_eq!(RootConvention::SelfLoop.id_base(), 0);
        assert_eq!(RootConvention::SelfLoop.root_parent(), 0);
        assert!(RootConvention::SelfLoop.is_root(0, 0));
        assert!(!RootConvention::SentinelBase.is_root(1, 1));
        assert_eq!(RootConvention::from_version(b"01.0T"), None);
        assert_eq!(RootConvention::SelfLoop.to_string(), "01.00");
    }

    #[test]
    fn test_bad_magic() {
        let mut buf = encoded(&TreeHeader::new(RootConvention::SentinelBase, 1, 0));
        buf[0] = b'X';
        let err = TreeHeader::decode(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, CodecError::Format(FormatError::BadMagic { .. })));
    }

    #[test]
    fn test_unknown_version() {
        let mut buf = encoded(&TreeHeader::new(RootConvention::SentinelBase, 1, 0));
        buf[14] = b'9';
        let err = TreeHeader::decode(&mut Cursor::new(buf)).unwrap_err();
        assert_eq!(
            err.to_string(),
            CodecError::from(FormatError::BadVersion(b"01.09".to_vec())).to_string()
        );
    }

    #[test]
    fn test_big_endian_marker_rejected() {
        let mut buf = encoded(&TreeHeader::new(RootConvention::SentinelBase, 1, 0));
        buf[15] = b'b';
        let err = TreeHeader::decode(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, CodecError::Format(FormatError::BadEndian(b'b'))));
    }

    #[test]
    fn test_bad_width() {
        let mut buf = encoded(&TreeHeader::new(RootConvention::SentinelBase, 1, 0));
        buf[20..24].copy_from_slice(&4u32.to_le_bytes());
        let err = TreeHeader::decode(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Format(FormatError::BadWidth {
                field: "uint",
                width: 4
            })
        ));
    }

    #[test]
    fn test_truncated_header() {
        let buf = encoded(&TreeHeader::new(RootConvention::SentinelBase, 1, 0));
        let err = TreeHeader::decode(&mut Cursor::new(&buf[..30])).unwrap_err();
        assert!(err.is_stream());
    }
}
