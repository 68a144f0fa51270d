//! Caller-supplied allocation for decode paths.
//!
//! Decoding never reaches for the global allocator on its own: every buffer
//! (string payloads, number arrays, metric scratch, reconstruction tables) is
//! requested from a [`DecodeAlloc`] the caller threads through the call, and
//! handed back through [`DecodeAlloc::free`] when the decoder is done with it.

use std::mem;
use std::ops::DerefMut;

use crate::error::{CodecError, Result};

/// Allocator abstraction threaded through every decode call.
pub trait DecodeAlloc {
    /// Owned buffer type produced by this allocator.
    type Buf<T>: DerefMut<Target = [T]>;

    /// Allocate `len` elements, each initialized to `fill`.
    fn alloc<T: Clone>(&mut self, len: usize, fill: T) -> Result<Self::Buf<T>>;

    /// Return a buffer obtained from [`DecodeAlloc::alloc`].
    fn free<T>(&mut self, buf: Self::Buf<T>) {
        drop(buf);
    }
}

impl<A: DecodeAlloc + ?Sized> DecodeAlloc for &mut A {
    type Buf<T> = A::Buf<T>;

    fn alloc<T: Clone>(&mut self, len: usize, fill: T) -> Result<Self::Buf<T>> {
        (**self).alloc(len, fill)
    }

    fn free<T>(&mut self, buf: Self::Buf<T>) {
        (**self).free(buf)
    }
}

/// Heap-backed allocator for analysis tools.
///
/// Uses fallible reservation so a request that cannot be satisfied surfaces as
/// [`CodecError::OutOfMemory`] instead of aborting the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAlloc;

impl DecodeAlloc for HeapAlloc {
    type Buf<T> = Vec<T>;

    fn alloc<T: Clone>(&mut self, len: usize, fill: T) -> Result<Vec<T>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| CodecError::OutOfMemory { len })?;
        buf.resize(len, fill);
        Ok(buf)
    }
}

/// Allocator wrapper that enforces a ceiling on live bytes.
///
/// `live_bytes()` returns to zero once every buffer has been freed, which
/// makes it a convenient leak check for decoders.
#[derive(Debug)]
pub struct BudgetAlloc<A> {
    inner: A,
    limit: usize,
    live: usize,
    peak: usize,
}

impl<A: DecodeAlloc> BudgetAlloc<A> {
    /// Wrap `inner`, refusing any request that would exceed `limit` live bytes.
    pub fn new(inner: A, limit: usize) -> Self {
        BudgetAlloc {
            inner,
            limit,
            live: 0,
            peak: 0,
        }
    }

    /// Bytes currently allocated and not yet freed.
    pub fn live_bytes(&self) -> usize {
        self.live
    }

    /// Highest value `live_bytes()` has reached.
    pub fn peak_bytes(&self) -> usize {
        self.peak
    }

    /// Configured ceiling.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl BudgetAlloc<HeapAlloc> {
    /// Heap allocator with a live-byte ceiling.
    pub fn heap(limit: usize) -> Self {
        BudgetAlloc::new(HeapAlloc, limit)
    }
}

impl<A: DecodeAlloc> DecodeAlloc for BudgetAlloc<A> {
    type Buf<T> = A::Buf<T>;

    fn alloc<T: Clone>(&mut self, len: usize, fill: T) -> Result<Self::Buf<T>> {
        let bytes = mem::size_of::<T>()
            .checked_mul(len)
            .ok_or(CodecError::OutOfMemory { len })?;
        let next = self
            .live
            .checked_add(bytes)
            .filter(|&n| n <= self.limit)
            .ok_or(CodecError::OutOfMemory { len })?;
        let buf = self.inner.alloc(len, fill)?;
        self.live = next;
        self.peak = self.peak.max(next);
        Ok(buf)
    }

    fn free<T>(&mut self, buf: Self::Buf<T>) {
        let bytes = mem::size_of::<T>() * buf.len();
        self.live = self.live.saturating_sub(bytes);
        self.inner.free(buf);
    }
}
