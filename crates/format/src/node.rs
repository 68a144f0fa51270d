//! Node and LIP records.
//!
//! A node that owns a LIP is preceded by a LIP record; the LIP belongs to the
//! very next node record. Neither function here allocates: metric words are
//! borrowed on write and decoded into caller scratch on read.
//!
//! ```text
//! [ LIP_TAG:u32  word:u64 x LIP_WORDS ]
//! NODE_TAG:u32  id:u64  id_parent:u64  assoc:u32  ip:u64
//! lip_ref:u64  sp:u64  cpid:u32  metric:u64 x num_metrics
//! ```

use std::io::{Read, Write};

use crate::error::{CodecError, FormatError, Result};
use crate::io::{ReadLeExt, WriteLeExt};
use crate::lip::{AssocInfo, Lip, LIP_REF_NONE, LIP_WORDS};
use crate::record::{read_tag, Tag};

/// Tag opening a node record.
pub const NODE_TAG: Tag = Tag(13);

/// Tag opening a LIP record.
pub const LIP_TAG: Tag = Tag(77);

/// Encoded size of a node record without metric words.
pub const NODE_FIXED_LEN: usize = 4 + 8 + 8 + 4 + 8 + 8 + 8 + 4;

/// Encoded size of a LIP record.
pub const LIP_RECORD_LEN: usize = 4 + 8 * LIP_WORDS;

/// Fixed-width fields of a node record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeFields {
    /// Persistent id
    pub id: u64,
    /// Parent's persistent id
    pub id_parent: u64,
    /// Association info
    pub assoc: AssocInfo,
    /// Instruction pointer
    pub ip: u64,
    /// Id of the node owning this node's LIP, or [`LIP_REF_NONE`]
    pub lip_ref: u64,
    /// Stack pointer
    pub sp: u64,
    /// Call-path id
    pub cpid: u32,
}

impl NodeFields {
    /// Whether the node references a LIP.
    pub fn has_lip(&self) -> bool {
        self.lip_ref != LIP_REF_NONE
    }
}

/// A node record ready to be written.
#[derive(Debug, Clone, Copy)]
pub struct NodeRecord<'a> {
    /// Fixed fields
    pub fields: NodeFields,
    /// LIP owned by this node, written as a separate record just before it
    pub owned_lip: Option<Lip>,
    /// Metric words
    pub metrics: &'a [u64],
}

/// A node record as read; the metric words are in the caller's scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedNode {
    /// Fixed fields
    pub fields: NodeFields,
    /// LIP record that immediately preceded the node, if any
    pub owned_lip: Option<Lip>,
}

/// Encoded size of a node record with `num_metrics` words and an optional LIP.
pub fn encoded_len(num_metrics: usize, owns_lip: bool) -> usize {
    let lip = if owns_lip { LIP_RECORD_LEN } else { 0 };
    lip + NODE_FIXED_LEN + 8 * num_metrics
}

/// Write a node record, preceded by its LIP record when it owns one.
pub fn write_node<W: Write + ?Sized>(
    w: &mut W,
    record: &NodeRecord<'_>,
    num_metrics: usize,
) -> Result<()> {
    let f = &record.fields;
    if record.metrics.len() != num_metrics {
        return Err(CodecError::invalid_input(format!(
            "node {} has {} metrics, tree declares {}",
            f.id,
            record.metrics.len(),
            num_metrics
        )));
    }
    if record.owned_lip.is_some() && f.lip_ref != f.id {
        return Err(CodecError::invalid_input(format!(
            "node {} owns a LIP but references {}",
            f.id, f.lip_ref
        )));
    }

    if let Some(lip) = record.owned_lip {
        LIP_TAG.encode(w)?;
        for word in lip.0 {
            w.write_u64_le(word)?;
        }
    }

    NODE_TAG.encode(w)?;
    w.write_u64_le(f.id)?;
    w.write_u64_le(f.id_parent)?;
    w.write_u32_le(f.assoc.0)?;
    w.write_u64_le(f.ip)?;
    w.write_u64_le(f.lip_ref)?;
    w.write_u64_le(f.sp)?;
    w.write_u32_le(f.cpid)?;
    for &m in record.metrics {
        w.write_u64_le(m)?;
    }
    Ok(())
}

/// Read one node record, and the LIP record preceding it if present.
///
/// Exactly `metrics.len()` metric words are decoded into `metrics`.
pub fn read_node<R: Read + ?Sized>(r: &mut R, metrics: &mut [u64]) -> Result<DecodedNode> {
    let mut tag = read_tag(r)?;
    let mut owned_lip = None;
    if tag == LIP_TAG {
        let mut words = [0u64; LIP_WORDS];
        for word in words.iter_mut() {
            *word = r.read_u64_le()?;
        }
        owned_lip = Some(Lip(words));
        tag = read_tag(r)?;
    }
    if tag != NODE_TAG {
        return Err(FormatError::UnexpectedTag {
            expected: if owned_lip.is_some() {
                "node record after LIP"
            } else {
                "node or LIP record"
            },
            actual: tag.0,
        }
        .into());
    }

    let fields = NodeFields {
        id: r.read_u64_le()?,
        id_parent: r.read_u64_le()?,
        assoc: AssocInfo(r.read_u32_le()?),
        ip: r.read_u64_le()?,
        lip_ref: r.read_u64_le()?,
        sp: r.read_u64_le()?,
        cpid: r.read_u32_le()?,
    };
    for slot in metrics.iter_mut() {
        *slot = r.read_u64_le()?;
    }
    Ok(DecodedNode { fields, owned_lip })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lip::Association;
    use std::io::Cursor;

    fn fields(id: u64, id_parent: u64) -> NodeFields {
        NodeFields {
            id,
            id_parent,
            assoc: AssocInfo::new(Association::OneToOne, 1),
            ip: 0x4005d0,
            lip_ref: LIP_REF_NONE,
            sp: 0x7fff_0000,
            cpid: 9,
        }
    }

    #[test]
    fn test_node_wire_layout() {
        let record = NodeRecord {
            fields: fields(2, 1),
            owned_lip: None,
            metrics: &[5, 6],
        };
        let mut buf = Vec::new();
        write_node(&mut buf, &record, 2).unwrap();
        assert_eq!(buf.len(), encoded_len(2, false));
        assert_eq!(&buf[0..4], &13u32.to_le_bytes());
        assert_eq!(&buf[4..12], &2u64.to_le_bytes());
        assert_eq!(&buf[12..20], &1u64.to_le_bytes());
        assert_eq!(&buf[32..40], &LIP_REF_NONE.to_le_bytes());
        assert_eq!(&buf[52..60], &5u64.to_le_bytes());
    }

    #[test]
    fn test_node_with_lip() {
        let mut f = fields(3, 1);
        f.lip_ref = 3;
        let record = NodeRecord {
            fields: f,
            owned_lip: Some(Lip([0xAA, 0xBB])),
            metrics: &[1],
        };
        let mut buf = Vec::new();
        write_node(&mut buf, &record, 1).unwrap();
        assert_eq!(buf.len(), encoded_len(1, true));
        assert_eq!(&buf[0..4], &77u32.to_le_bytes());

        let mut metrics = [0u64; 1];
        let node = read_node(&mut Cursor::new(buf), &mut metrics).unwrap();
        assert_eq!(node.fields, f);
        assert_eq!(node.owned_lip, Some(Lip([0xAA, 0xBB])));
        assert_eq!(metrics, [1]);
    }

    #[test]
    fn test_metric_count_checked_before_writing() {
        let record = NodeRecord {
            fields: fields(1, 0),
            owned_lip: None,
            metrics: &[1, 2, 3],
        };
        let mut buf = Vec::new();
        let err = write_node(&mut buf, &record, 2).unwrap_err();
        assert!(matches!(err, CodecError::InvalidInput(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_owned_lip_must_reference_self() {
        let record = NodeRecord {
            fields: fields(4, 1),
            owned_lip: Some(Lip::default()),
            metrics: &[],
        };
        let err = write_node(&mut Vec::new(), &record, 0).unwrap_err();
        assert!(matches!(err, CodecError::InvalidInput(_)));
    }

    #[test]
    fn test_unexpected_tag() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&14u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 64]);
        let err = read_node(&mut Cursor::new(buf), &mut []).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Format(FormatError::UnexpectedTag { actual: 14, .. })
        ));
    }

    #[test]
    fn test_two_lip_records_in_a_row() {
        let mut buf = Vec::new();
        for _ in 0..2 {
            buf.extend_from_slice(&77u32.to_le_bytes());
            buf.extend_from_slice(&[0u8; 16]);
        }
        let err = read_node(&mut Cursor::new(buf), &mut []).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Format(FormatError::UnexpectedTag { actual: 77, .. })
        ));
    }

    #[test]
    fn test_truncated_metrics() {
        let record = NodeRecord {
            fields: fields(1, 0),
            owned_lip: None,
            metrics: &[7, 8],
        };
        let mut buf = Vec::new();
        write_node(&mut buf, &record, 2).unwrap();
        buf.truncate(buf.len() - 3);
        let mut metrics = [0u64; 2];
        let err = read_node(&mut Cursor::new(buf), &mut metrics).unwrap_err();
        assert!(err.is_stream());
    }
}
