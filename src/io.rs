
//! Low level byte input.
//! Wraps the little endian primitives that all x3f structures are made of,
//! and tracks the absolute position inside the file,
//! because an x3f file is traversed directory-first with absolute seeks.

pub use std::io::Read;
use std::io::{Seek, SeekFrom};

use lebe::prelude::*;

use crate::error::{Error, Result, UnitResult};


/// Skip the specified number of bytes without using them.
pub fn skip_bytes(read: &mut impl Read, count: u64) -> UnitResult {
    let skipped = std::io::copy(
        &mut read.by_ref().take(count),
        &mut std::io::sink()
    )?;

    if skipped == count { Ok(()) }
    else { Err(Error::truncated("skipped data")) }
}


/// A byte source that knows its absolute position.
/// Owns the underlying reader for the lifetime of the file object.
#[derive(Debug)]
pub struct Tracking<R> {
    inner: R,
    position: u64,
}

impl<R: Read> Read for Tracking<R> {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        let count = self.inner.read(buffer)?;
        self.position += count as u64;
        Ok(count)
    }
}

impl<R: Read + Seek> Tracking<R> {

    /// Start tracking at the current position of the reader.
    pub fn new(mut inner: R) -> Result<Self> {
        let position = inner.stream_position()?;
        Ok(Self { inner, position })
    }

    /// The absolute position of the next byte that will be read.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Jump to the specified absolute byte position.
    pub fn seek_to(&mut self, position: u64) -> UnitResult {
        if self.position != position {
            self.inner.seek(SeekFrom::Start(position))?;
            self.position = position;
        }

        Ok(())
    }

    /// The total byte length of the underlying source.
    /// Restores the current position afterwards.
    /// Used to locate the trailing directory and to cap
    /// all allocations that are driven by lengths found in the file.
    pub fn byte_length(&mut self) -> Result<u64> {
        let length = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(self.position))?;
        Ok(length)
    }
}


/// Extension trait for primitive types like numbers and arrays.
pub trait Data: Sized + Default + Clone {

    /// Number of bytes this would consume in an x3f file.
    const BYTE_SIZE: usize = std::mem::size_of::<Self>();

    /// Read this value from the little endian byte stream.
    fn read(read: &mut impl Read) -> Result<Self>;

    /// Fill the slice with values from the little endian byte stream.
    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult;

    /// Read a vector of values whose length was declared inside the file.
    /// The caller must pass the remaining input length as `max`,
    /// so that a corrupt length cannot provoke a huge allocation.
    #[inline]
    fn read_vec(read: &mut impl Read, data_size: usize, max: usize, purpose: &'static str) -> Result<Vec<Self>> {
        if data_size.checked_mul(Self::BYTE_SIZE).map_or(true, |bytes| bytes > max) {
            return Err(Error::section(purpose));
        }

        let mut vec = vec![Self::default(); data_size];
        Self::read_slice(read, &mut vec)?;
        Ok(vec)
    }
}


macro_rules! implement_data_for_primitive {
    ($kind: ident) => {
        impl Data for $kind {
            fn read(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_little_endian()?)
            }

            fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult {
                read.read_from_little_endian_into(slice)?;
                Ok(())
            }
        }
    };
}

implement_data_for_primitive!(u8);
implement_data_for_primitive!(i8);
implement_data_for_primitive!(i16);
implement_data_for_primitive!(u16);
implement_data_for_primitive!(u32);
implement_data_for_primitive!(i32);
implement_data_for_primitive!(i64);
implement_data_for_primitive!(u64);
implement_data_for_primitive!(f32);
implement_data_for_primitive!(f64);
