//! Stream helpers: exact reads that report offsets, EOF peeking, position restore.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, Result};

/// Object-safe `Read + Seek`, so loaders can take `&mut dyn ReadSeek`.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

pub fn position(stream: &mut dyn ReadSeek) -> Result<u64> {
    Ok(stream.stream_position()?)
}

/// Read exactly `size` bytes or fail with [`Error::UnexpectedEof`] at the starting offset.
/// A short read leaves the stream after the bytes that were available.
pub fn read_exact(stream: &mut dyn ReadSeek, size: usize) -> Result<Vec<u8>> {
    let offset = position(stream)?;
    let mut buf = Vec::with_capacity(size.min(1 << 16));
    Read::take(&mut *stream, size as u64).read_to_end(&mut buf)?;
    if buf.len() < size {
        return Err(Error::UnexpectedEof {
            field: None,
            size,
            offset,
        });
    }
    Ok(buf)
}

pub fn read_u8(stream: &mut dyn ReadSeek) -> Result<u8> {
    Ok(read_exact(stream, 1)?[0])
}

/// True if no byte can be read at the current position. Never consumes input.
pub fn at_eof(stream: &mut dyn ReadSeek) -> Result<bool> {
    let start = position(stream)?;
    let mut peek = [0u8; 1];
    let n = stream.read(&mut peek)?;
    stream.seek(SeekFrom::Start(start))?;
    Ok(n == 0)
}

/// Run `f`, then put the stream back where it was, whether `f` failed or not.
/// An error from `f` wins over a failure to seek back.
pub fn with_restored_position<T>(
    stream: &mut dyn ReadSeek,
    f: impl FnOnce(&mut dyn ReadSeek) -> Result<T>,
) -> Result<T> {
    let start = position(stream)?;
    let result = f(stream);
    let restored = stream.seek(SeekFrom::Start(start));
    let value = result?;
    restored?;
    Ok(value)
}
