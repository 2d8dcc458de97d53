//! Shared fixtures for unit tests.

use crate::binbuf::BinBuffer;
use crate::bytecode::MAGIC_KPRL;

/// A synthetic uncompressed V2 file: plausible header tables plus a raw
/// data region, with the compressed-size field primed (as extracted files
/// have it) so the compressor treats the data region as compressible.
pub fn synthetic_file(data_offset: usize, payload: &[u8]) -> BinBuffer {
    let mut buf = BinBuffer::new(data_offset + payload.len());
    buf.write(0, MAGIC_KPRL).unwrap();
    buf.put_u32(4, 10002).unwrap();
    buf.put_u32(0x08, 0x1c8).unwrap(); // kidoku table (empty)
    buf.put_u32(0x0c, 0).unwrap();
    buf.put_u32(0x14, 0x1c8).unwrap(); // dramatis personae (empty)
    buf.put_u32(0x18, 0).unwrap();
    buf.put_u32(0x20, data_offset as u32).unwrap();
    buf.put_u32(0x24, payload.len() as u32).unwrap();
    buf.put_u32(0x28, 1).unwrap();
    buf.write(data_offset, payload).unwrap();
    buf
}
