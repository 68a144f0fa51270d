//! Logical-unwind data attached to nodes: LIPs and association info.

use core::fmt;

/// Number of 8-byte words in a [`Lip`].
pub const LIP_WORDS: usize = 2;

/// `lip_ref` value meaning "no LIP".
pub const LIP_REF_NONE: u64 = u64::MAX;

/// Logical instruction pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Lip(pub [u64; LIP_WORDS]);

impl fmt::Display for Lip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{:#x}", self.0[0], self.0[1])
    }
}

/// How a node to be written relates to a LIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LipRef {
    /// No LIP.
    #[default]
    None,
    /// The node owns this LIP; its record is emitted right before the node.
    Owned(Lip),
    /// Shares the LIP owned by the nearest ancestor that owns one.
    Inherited,
}

/// A resolved LIP on the read side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LipLink {
    /// Persistent id of the node that owns the LIP record
    pub owner: u64,
    /// LIP contents
    pub lip: Lip,
}

/// Kind of logical-to-physical association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Association {
    /// No association recorded
    Null = 0,
    /// One physical frame, no logical frame
    OneToZero = 1,
    /// Many physical frames map to one logical frame
    ManyToOne = 2,
    /// One-to-one
    OneToOne = 3,
    /// Neither side contributes a frame
    ZeroToZero = 4,
    /// One physical frame expands to many logical frames
    OneToMany = 5,
}

impl Association {
    /// Decode an association code.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Association::Null,
            1 => Association::OneToZero,
            2 => Association::ManyToOne,
            3 => Association::OneToOne,
            4 => Association::ZeroToZero,
            5 => Association::OneToMany,
            _ => return None,
        })
    }

    /// Short notation used in dumps.
    pub fn as_str(self) -> &'static str {
        match self {
            Association::Null => "NULL",
            Association::OneToZero => "1-to-0",
            Association::ManyToOne => "M-to-1",
            Association::OneToOne => "1-to-1",
            Association::ZeroToZero => "0-to-0",
            Association::OneToMany => "1-to-M",
        }
    }
}

/// Packed association code (low 8 bits) and logical path length (high 24 bits).
///
/// Opaque on the wire: unknown codes survive a round trip untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AssocInfo(pub u32);

impl AssocInfo {
    /// Largest path length that fits in 24 bits.
    pub const MAX_PATH_LEN: u32 = (1 << 24) - 1;

    /// Pack an association and path length; the length is truncated to 24 bits.
    pub const fn new(assoc: Association, path_len: u32) -> Self {
        AssocInfo(((path_len & Self::MAX_PATH_LEN) << 8) | assoc as u32)
    }

    /// Raw association code.
    pub fn code(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Association, if the code is known.
    pub fn association(self) -> Option<Association> {
        Association::from_code(self.code())
    }

    /// Logical path length.
    pub fn path_len(self) -> u32 {
        self.0 >> 8
    }
}

impl fmt::Display for AssocInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.association() {
            Some(a) => write!(f, "{}: {}", a.as_str(), self.path_len()),
            None => write!(f, "?{}: {}", self.code(), self.path_len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assoc_packing() {
        let info = AssocInfo::new(Association::ManyToOne, 3);
        assert_eq!(info.0, 0x0302);
        assert_eq!(info.association(), Some(Association::ManyToOne));
        assert_eq!(info.path_len(), 3);
        assert_eq!(info.to_string(), "M-to-1: 3");
    }

    #[test]
    fn test_unknown_code_preserved() {
        let info = AssocInfo(0xFFFF_FF09);
        assert_eq!(info.association(), None);
        assert_eq!(info.code(), 9);
        assert_eq!(info.path_len(), AssocInfo::MAX_PATH_LEN);
        assert_eq!(info.to_string(), "?9: 16777215");
    }

    #[test]
    fn test_lip_display() {
        assert_eq!(Lip([0x10, 0x2]).to_string(), "0x10:0x2");
    }
}
