//! High-level bytecode file decompression and compression.
//!
//! Composes header parsing, the static XOR mask, LZ77 and the per-game
//! key layer into single decompress/compress operations over whole files.

use crate::binbuf::BinBuffer;
use crate::bytecode;
use crate::compression;
use crate::error::{Error, Result};
use crate::gamedef::XorSubkey;

/// Decompress a bytecode file.
///
/// 1. parse the header,
/// 2. unwind the static mask over the data region,
/// 3. LZ77-decompress when the header says so,
/// 4. strip the per-game key layer when the file came from an archive.
pub fn decompress(mut arr: BinBuffer, keys: &[XorSubkey], archived: bool) -> Result<BinBuffer> {
    let hdr = bytecode::read_file_header(&arr, archived)?;
    let data_offset = hdr.data_offset;

    compression::apply_mask(arr.as_mut_slice(), data_offset);

    let Some(compressed_size) = hdr.compressed_size else {
        return Ok(arr);
    };

    if data_offset + compressed_size > arr.len() {
        return Err(Error::Truncated(format!(
            "compressed payload {}+{} exceeds file length {}",
            data_offset,
            compressed_size,
            arr.len()
        )));
    }

    let mut rv = BinBuffer::new(data_offset + hdr.uncompressed_size);
    rv.blit(0, arr.as_slice(), 0, data_offset)?;

    let src = arr.sub(data_offset, compressed_size)?;
    compression::decompress(src, &mut rv.as_mut_slice()[data_offset..])?;

    if archived && !keys.is_empty() {
        compression::apply_keys(&mut rv.as_mut_slice()[data_offset..], keys);
    }

    Ok(rv)
}

/// Compress a bytecode file; the mirror of [`decompress`].
///
/// The data region is re-keyed, LZ77-compressed and framed; the header is
/// copied, given the binary magic and the new compressed size, and the
/// whole file is masked again.
pub fn compress(arr: &BinBuffer, keys: &[XorSubkey]) -> Result<BinBuffer> {
    let hdr = bytecode::read_file_header(arr, false)?;
    let data_offset = hdr.data_offset;

    if !hdr.is_compressed() {
        // nothing to do for genuinely uncompressed formats
        let mut rv = arr.clone();
        rv.put_u32(4, hdr.compiler_version)?;
        compression::apply_mask(rv.as_mut_slice(), data_offset);
        return Ok(rv);
    }

    if data_offset > arr.len() || data_offset < 8 {
        return Err(Error::Truncated(format!(
            "data offset {:#x} out of range for {}-byte file",
            data_offset,
            arr.len()
        )));
    }
    let uncompressed_size = arr.len() - data_offset;

    // the data region is keyed before compression
    let mut work = arr.sub(data_offset, uncompressed_size)?.to_vec();
    if !keys.is_empty() {
        compression::apply_keys(&mut work, keys);
    }

    let body = compression::compress(&work);
    let compressed_size = body.len() + 8;

    let mut rv = BinBuffer::new(data_offset + compressed_size);
    rv.blit(0, arr.as_slice(), 0, data_offset)?;
    rv.put_u32(data_offset, compressed_size as u32)?;
    rv.put_u32(data_offset + 4, uncompressed_size as u32)?;
    rv.write(data_offset + 8, &body)?;

    rv.write(0, bytecode::MAGIC_D001)?;
    rv.put_u32(4, hdr.compiler_version)?;
    rv.put_u32(0x28, compressed_size as u32)?;

    compression::apply_mask(rv.as_mut_slice(), data_offset);

    Ok(rv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::MAGIC_D001;
    use crate::gamedef;
    use crate::testutil::synthetic_file;

    fn payload() -> Vec<u8> {
        let mut p: Vec<u8> = (0..2048).map(|i| ((i * 31) % 251) as u8).collect();
        let head = p[0..256].to_vec();
        p[256..512].copy_from_slice(&head);
        p
    }

    #[test]
    fn compress_then_decompress_restores_payload() {
        let data_offset = 0x1d0;
        let payload = payload();
        let original = synthetic_file(data_offset, &payload);

        let packed = compress(&original, &[]).unwrap();
        assert_eq!(packed.read(0, 4).unwrap(), MAGIC_D001);

        let unpacked = decompress(packed, &[], false).unwrap();
        assert_eq!(unpacked.len(), data_offset + payload.len());
        assert_eq!(unpacked.sub(data_offset, payload.len()).unwrap(), &payload[..]);
    }

    #[test]
    fn roundtrip_with_game_keys() {
        let data_offset = 0x1d0;
        let payload = payload();
        let original = synthetic_file(data_offset, &payload);
        let keys = gamedef::known_keys("LB").unwrap();

        let packed = compress(&original, keys).unwrap();
        let unpacked = decompress(packed, keys, true).unwrap();
        assert_eq!(unpacked.sub(data_offset, payload.len()).unwrap(), &payload[..]);
    }

    #[test]
    fn compressed_file_declares_sizes() {
        let data_offset = 0x1d0;
        let payload = payload();
        let packed = compress(&synthetic_file(data_offset, &payload), &[]).unwrap();

        let hdr = bytecode::read_file_header(&packed, false).unwrap();
        assert_eq!(hdr.uncompressed_size, payload.len());
        assert_eq!(hdr.compressed_size, Some(packed.len() - data_offset));
    }

    #[test]
    fn garbage_input_is_rejected() {
        let buf = BinBuffer::from_vec(vec![0xde; 64]);
        assert!(matches!(
            decompress(buf, &[], false),
            Err(Error::UnrecognisedFormat(_))
        ));
    }
}
