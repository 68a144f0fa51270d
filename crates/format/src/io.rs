//! Endian-stable primitive integer I/O.
//!
//! Every multi-byte integer is little-endian on disk regardless of the host:
//! byte *k* of the encoding holds bits `[8k, 8k + 8)` of the value. Reads and
//! writes count the bytes actually transferred and turn any shortfall into a
//! [`StreamError`]; callers never see a partially decoded value.

use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, StreamError};

/// Read into `buf` until it is full or the stream reports end-of-stream.
///
/// Returns the number of bytes read, which is less than `buf.len()` only at
/// end-of-stream. `Interrupted` is retried.
pub fn read_up_to<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Write from `buf` until it is drained or the stream accepts no more bytes.
///
/// Returns the number of bytes written, which is less than `buf.len()` only if
/// the stream returned a zero-length write.
pub fn write_up_to<W: Write + ?Sized>(w: &mut W, buf: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < buf.len() {
        match w.write(&buf[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

fn read_full<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    let actual = read_up_to(r, buf).map_err(StreamError::Io)?;
    if actual != buf.len() {
        return Err(StreamError::ShortRead {
            expected: buf.len(),
            actual,
        }
        .into());
    }
    Ok(())
}

fn write_full<W: Write + ?Sized>(w: &mut W, buf: &[u8]) -> Result<()> {
    let actual = write_up_to(w, buf).map_err(StreamError::Io)?;
    if actual != buf.len() {
        return Err(StreamError::ShortWrite {
            expected: buf.len(),
            actual,
        }
        .into());
    }
    Ok(())
}

/// Little-endian writers for any [`Write`].
pub trait WriteLeExt: Write {
    /// Write one byte.
    fn write_u8(&mut self, v: u8) -> Result<()> {
        write_full(self, &[v])
    }

    /// Write a `u16` as 2 little-endian bytes.
    fn write_u16_le(&mut self, v: u16) -> Result<()> {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, v);
        write_full(self, &buf)
    }

    /// Write a `u32` as 4 little-endian bytes.
    fn write_u32_le(&mut self, v: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, v);
        write_full(self, &buf)
    }

    /// Write a `u64` as 8 little-endian bytes.
    fn write_u64_le(&mut self, v: u64) -> Result<()> {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, v);
        write_full(self, &buf)
    }

    /// Write raw bytes verbatim.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        write_full(self, bytes)
    }
}

impl<T: Write + ?Sized> WriteLeExt for T {}

/// Little-endian readers for any [`Read`].
pub trait ReadLeExt: Read {
    /// Read one byte.
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        read_full(self, &mut buf)?;
        Ok(buf[0])
    }

    /// Read a `u16` from 2 little-endian bytes.
    fn read_u16_le(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        read_full(self, &mut buf)?;
        Ok(LittleEndian::read_u16(&buf))
    }

    /// Read a `u32` from 4 little-endian bytes.
    fn read_u32_le(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        read_full(self, &mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    /// Read a `u64` from 8 little-endian bytes.
    fn read_u64_le(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        read_full(self, &mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }

    /// Read exactly `N` raw bytes.
    fn read_byte_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        read_full(self, &mut buf)?;
        Ok(buf)
    }

    /// Fill `buf` completely.
    fn read_bytes_into(&mut self, buf: &mut [u8]) -> Result<()> {
        read_full(self, buf)
    }
}

impl<T: Read + ?Sized> ReadLeExt for T {}
