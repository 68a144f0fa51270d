//! Tagged records: `{tag, length, payload}`.
//!
//! # Wire shapes
//!
//! ```text
//! string:       tag:u32  len:u32    bytes[len]      (no NUL terminator)
//! single num:   tag:u32  value:u64                  (implicit length 1)
//! number array: tag:u32  count:u32  value:u64[count]
//! ```
//!
//! The high byte of a tag names the record shape ([`RecordFormat`]), the low
//! 16 bits its meaning. Callers read the tag with [`read_tag`] and pick the
//! matching body reader themselves; this layer never dispatches.

use std::ops::Deref;

use crate::alloc::DecodeAlloc;
use crate::error::{CodecError, FormatError, Result};
use crate::io::{ReadLeExt, WriteLeExt};

use std::io::{Read, Write};

/// Record shape encoded in the high byte of a [`Tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordFormat {
    /// Length-prefixed byte string
    Str = 1,
    /// One 8-byte number
    Num8 = 2,
    /// Count-prefixed array of 8-byte numbers
    Num8s = 3,
}

impl RecordFormat {
    /// Decode a format byte.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RecordFormat::Str),
            2 => Some(RecordFormat::Num8),
            3 => Some(RecordFormat::Num8s),
            _ => None,
        }
    }

    /// Short human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            RecordFormat::Str => "string",
            RecordFormat::Num8 => "number",
            RecordFormat::Num8s => "number-array",
        }
    }
}

/// 4-byte record tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub u32);

impl Tag {
    /// Build a tag from a record shape and a meaning.
    pub const fn new(format: RecordFormat, meaning: u16) -> Tag {
        Tag(((format as u32) << 24) | meaning as u32)
    }

    /// Raw format byte.
    pub fn format_code(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Record shape, if the format byte is known.
    pub fn format(self) -> Option<RecordFormat> {
        RecordFormat::from_code(self.format_code())
    }

    /// Semantic meaning (low 16 bits).
    pub fn meaning(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Write the tag.
    pub fn encode<W: Write + ?Sized>(self, w: &mut W) -> Result<()> {
        w.write_u32_le(self.0)
    }
}

impl core::fmt::Display for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.format() {
            Some(format) => write!(f, "{}:{}", format.name(), self.meaning()),
            None => write!(f, "tag({})", self.0),
        }
    }
}

/// Read the next tag.
pub fn read_tag<R: Read + ?Sized>(r: &mut R) -> Result<Tag> {
    Ok(Tag(r.read_u32_le()?))
}

fn expect_format(tag: Tag, expected: RecordFormat) -> Result<()> {
    match tag.format() {
        Some(format) if format == expected => Ok(()),
        Some(_) => Err(FormatError::UnexpectedRecordFormat {
            expected: expected.name(),
            tag: tag.0,
        }
        .into()),
        None => Err(FormatError::UnknownRecordFormat(tag.0).into()),
    }
}

fn check_write_format(tag: Tag, expected: RecordFormat) -> Result<()> {
    if tag.format() != Some(expected) {
        return Err(CodecError::invalid_input(format!(
            "tag {:#010x} cannot carry a {} record",
            tag.0,
            expected.name()
        )));
    }
    Ok(())
}

fn checked_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| CodecError::invalid_input("record length does not fit in u32"))
}

/// Decoded string record; `bytes` came from the caller's allocator.
#[derive(Debug)]
pub struct StrRecord<B> {
    /// Record tag
    pub tag: Tag,
    /// Payload bytes
    pub bytes: B,
}

impl<B: Deref<Target = [u8]>> StrRecord<B> {
    /// View the payload as UTF-8.
    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.bytes)
            .map_err(|_| FormatError::InvalidUtf8 { tag: self.tag.0 }.into())
    }
}

/// Decoded single-number record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Num8Record {
    /// Record tag
    pub tag: Tag,
    /// Value
    pub num: u64,
}

/// Decoded number-array record; `nums` came from the caller's allocator.
#[derive(Debug)]
pub struct Num8sRecord<B> {
    /// Record tag
    pub tag: Tag,
    /// Values
    pub nums: B,
}

/// Read a string body after its tag.
pub fn read_str_body<R, A>(
    r: &mut R,
    tag: Tag,
    alloc: &mut A,
    max_len: u32,
) -> Result<StrRecord<A::Buf<u8>>>
where
    R: Read + ?Sized,
    A: DecodeAlloc,
{
    expect_format(tag, RecordFormat::Str)?;
    let len = r.read_u32_le()?;
    if len > max_len {
        return Err(FormatError::RecordTooLong {
            len: u64::from(len),
            max: u64::from(max_len),
        }
        .into());
    }
    let mut bytes = alloc.alloc(len as usize, 0u8)?;
    if let Err(e) = r.read_bytes_into(&mut bytes) {
        alloc.free(bytes);
        return Err(e);
    }
    Ok(StrRecord { tag, bytes })
}

/// Read a single-number body after its tag.
pub fn read_num8_body<R: Read + ?Sized>(r: &mut R, tag: Tag) -> Result<Num8Record> {
    expect_format(tag, RecordFormat::Num8)?;
    Ok(Num8Record {
        tag,
        num: r.read_u64_le()?,
    })
}

/// Read a number-array body after its tag.
pub fn read_num8s_body<R, A>(
    r: &mut R,
    tag: Tag,
    alloc: &mut A,
    max_len: u32,
) -> Result<Num8sRecord<A::Buf<u64>>>
where
    R: Read + ?Sized,
    A: DecodeAlloc,
{
    expect_format(tag, RecordFormat::Num8s)?;
    let count = r.read_u32_le()?;
    if count > max_len {
        return Err(FormatError::RecordTooLong {
            len: u64::from(count),
            max: u64::from(max_len),
        }
        .into());
    }
    let mut nums = alloc.alloc(count as usize, 0u64)?;
    for slot in nums.iter_mut() {
        match r.read_u64_le() {
            Ok(v) => *slot = v,
            Err(e) => {
                alloc.free(nums);
                return Err(e);
            }
        }
    }
    Ok(Num8sRecord { tag, nums })
}

/// Write a complete string record.
pub fn write_str_record<W: Write + ?Sized>(w: &mut W, tag: Tag, bytes: &[u8]) -> Result<()> {
    check_write_format(tag, RecordFormat::Str)?;
    let len = checked_len(bytes.len())?;
    tag.encode(w)?;
    w.write_u32_le(len)?;
    w.write_bytes(bytes)
}

/// Write a complete single-number record.
pub fn write_num8_record<W: Write + ?Sized>(w: &mut W, tag: Tag, num: u64) -> Result<()> {
    check_write_format(tag, RecordFormat::Num8)?;
    tag.encode(w)?;
    w.write_u64_le(num)
}

/// Write a complete number-array record.
pub fn write_num8s_record<W: Write + ?Sized>(w: &mut W, tag: Tag, nums: &[u64]) -> Result<()> {
    check_write_format(tag, RecordFormat::Num8s)?;
    let count = checked_len(nums.len())?;
    tag.encode(w)?;
    w.write_u32_le(count)?;
    for &n in nums {
        w.write_u64_le(n)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{BudgetAlloc, HeapAlloc};
    use crate::error::StreamError;
    use std::io::Cursor;

    const NAME: Tag = Tag::new(RecordFormat::Str, 1);
    const PERIOD: Tag = Tag::new(RecordFormat::Num8, 2);
    const SAMPLES: Tag = Tag::new(RecordFormat::Num8s, 3);

    #[test]
    fn test_tag_layout() {
        assert_eq!(NAME.0, 0x0100_0001);
        assert_eq!(NAME.format(), Some(RecordFormat::Str));
        assert_eq!(NAME.meaning(), 1);
        assert_eq!(Tag(13).format(), None);
        assert_eq!(SAMPLES.to_string(), "number-array:3");
    }

    #[test]
    fn test_string_record_wire_bytes() {
        let mut buf = Vec::new();
        write_str_record(&mut buf, NAME, b"a.out").unwrap();
        let mut expected = NAME.0.to_le_bytes().to_vec();
        expected.extend_from_slice(&5u32.to_le_bytes());
        expected.extend_from_slice(b"a.out");
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_string_record_read() {
        let mut buf = Vec::new();
        write_str_record(&mut buf, NAME, b"PAPI_TOT_CYC").unwrap();

        let mut cursor = Cursor::new(buf);
        let mut alloc = HeapAlloc;
        let tag = read_tag(&mut cursor).unwrap();
        let rec = read_str_body(&mut cursor, tag, &mut alloc, 1024).unwrap();
        assert_eq!(rec.tag, NAME);
        assert_eq!(rec.as_str().unwrap(), "PAPI_TOT_CYC");
    }

    #[test]
    fn test_num8_record_has_no_length() {
        let mut buf = Vec::new();
        write_num8_record(&mut buf, PERIOD, 1_000_003).unwrap();
        assert_eq!(buf.len(), 12);

        let mut cursor = Cursor::new(buf);
        let tag = read_tag(&mut cursor).unwrap();
        let rec = read_num8_body(&mut cursor, tag).unwrap();
        assert_eq!(rec.num, 1_000_003);
    }

    #[test]
    fn test_num8s_record() {
        let mut buf = Vec::new();
        write_num8s_record(&mut buf, SAMPLES, &[3, 1, 4, 1, 5]).unwrap();
        assert_eq!(buf.len(), 4 + 4 + 5 * 8);

        let mut cursor = Cursor::new(buf);
        let mut alloc = HeapAlloc;
        let tag = read_tag(&mut cursor).unwrap();
        let rec = read_num8s_body(&mut cursor, tag, &mut alloc, 16).unwrap();
        assert_eq!(&*rec.nums, &[3, 1, 4, 1, 5]);
    }

    #[test]
    fn test_wrong_body_reader_is_format_error() {
        let mut buf = Vec::new();
        write_num8_record(&mut buf, PERIOD, 9).unwrap();
        let mut cursor = Cursor::new(buf);
        let tag = read_tag(&mut cursor).unwrap();
        let err = read_str_body(&mut cursor, tag, &mut HeapAlloc, 64).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Format(FormatError::UnexpectedRecordFormat { .. })
        ));
    }

    #[test]
    fn test_unknown_format_byte() {
        let tag = Tag(0x7F00_0001);
        let mut cursor = Cursor::new(vec![0u8; 16]);
        let err = read_num8_body(&mut cursor, tag).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Format(FormatError::UnknownRecordFormat(0x7F00_0001))
        ));
    }

    #[test]
    fn test_string_length_limit() {
        let mut buf = Vec::new();
        write_str_record(&mut buf, NAME, &[b'x'; 100]).unwrap();
        let mut cursor = Cursor::new(buf);
        let tag = read_tag(&mut cursor).unwrap();
        let err = read_str_body(&mut cursor, tag, &mut HeapAlloc, 10).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Format(FormatError::RecordTooLong { len: 100, max: 10 })
        ));
    }

    #[test]
    fn test_truncated_string_frees_buffer() {
        let mut buf = Vec::new();
        write_str_record(&mut buf, NAME, b"truncated-name").unwrap();
        buf.truncate(buf.len() - 4);

        let mut alloc = BudgetAlloc::heap(1024);
        let mut cursor = Cursor::new(buf);
        let tag = read_tag(&mut cursor).unwrap();
        let err = read_str_body(&mut cursor, tag, &mut alloc, 64).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Stream(StreamError::ShortRead { .. })
        ));
        assert_eq!(alloc.live_bytes(), 0);
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = Vec::new();
        write_str_record(&mut buf, NAME, &[0xFF, 0xFE]).unwrap();
        let mut cursor = Cursor::new(buf);
        let tag = read_tag(&mut cursor).unwrap();
        let rec = read_str_body(&mut cursor, tag, &mut HeapAlloc, 64).unwrap();
        assert!(matches!(
            rec.as_str(),
            Err(CodecError::Format(FormatError::InvalidUtf8 { .. }))
        ));
    }

    #[test]
    fn test_write_rejects_mismatched_tag() {
        let mut buf = Vec::new();
        let err = write_num8_record(&mut buf, NAME, 1).unwrap_err();
        assert!(matches!(err, CodecError::InvalidInput(_)));
        assert!(buf.is_empty());
    }
}
