//! Bytecode file headers.
//!
//! SEEN files carry a structured header with version info, entry points,
//! compression metadata and (V2 only) character names. Two generations
//! exist: V1 is the AVG2000 layout, V2 the RealLive layout used by nearly
//! every title.

use crate::binbuf::BinBuffer;
use crate::error::{Error, Result};
use crate::metadata::Metadata;

pub const MAGIC_KP2K: &[u8; 4] = b"KP2K";
pub const MAGIC_RD2K: &[u8; 4] = b"RD2K";
pub const MAGIC_KPRL: &[u8; 4] = b"KPRL";
pub const MAGIC_RDRL: &[u8; 4] = b"RDRL";
pub const MAGIC_KPRM: &[u8; 4] = b"KPRM";
pub const MAGIC_RDRM: &[u8; 4] = b"RDRM";

// binary magics written by the retail compilers
pub const MAGIC_D001: &[u8; 4] = &[0xd0, 0x01, 0x00, 0x00];
pub const MAGIC_CC01: &[u8; 4] = &[0xcc, 0x01, 0x00, 0x00];
pub const MAGIC_B801: &[u8; 4] = &[0xb8, 0x01, 0x00, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderVersion {
    /// AVG2000 layout.
    V1,
    /// RealLive layout.
    V2,
}

/// Parsed header of one bytecode file.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub version: HeaderVersion,
    pub compiler_version: u32,
    pub data_offset: usize,
    pub uncompressed_size: usize,
    /// None when the data region is stored uncompressed.
    pub compressed_size: Option<usize>,
    pub int_0x2c: i32,
    pub entry_points: [i32; 100],
    pub kidoku_lnums: Vec<i32>,
    /// Character display names, raw bytes in the game's encoding. V2 only.
    pub dramatis_personae: Vec<Vec<u8>>,
    /// Whether the file came out of a SEEN.TXT archive slot.
    pub archived: bool,
    /// Compiler metadata block, present on `RD*`-produced files.
    pub metadata: Option<Metadata>,
}

impl FileHeader {
    pub fn is_compressed(&self) -> bool {
        self.compressed_size.is_some()
    }
}

/// Whether the data at `idx` looks like a bytecode file header.
pub fn is_bytecode(data: &[u8], idx: usize) -> bool {
    if idx + 8 > data.len() {
        return false;
    }
    let magic: &[u8; 4] = data[idx..idx + 4].try_into().unwrap();
    match magic {
        m if m == MAGIC_RDRL || m == MAGIC_RD2K || m == MAGIC_RDRM => true,
        m if m == MAGIC_KPRL
            || m == MAGIC_KP2K
            || m == MAGIC_KPRM
            || m == MAGIC_D001
            || m == MAGIC_CC01
            || m == MAGIC_B801 =>
        {
            let ver = u32::from_le_bytes(data[idx + 4..idx + 8].try_into().unwrap());
            matches!(ver, 10002 | 110002 | 1110002)
        }
        _ => false,
    }
}

/// True when this magic marks an uncompressed data region.
pub fn uncompressed_header(magic: &[u8]) -> bool {
    matches!(
        magic,
        m if m == MAGIC_KPRL
            || m == MAGIC_KP2K
            || m == MAGIC_KPRM
            || m == MAGIC_RDRL
            || m == MAGIC_RD2K
            || m == MAGIC_RDRM
    )
}

/// The magic to substitute when writing a file out decompressed.
pub fn uncompressed_magic(hdr: &FileHeader) -> &'static [u8; 4] {
    if hdr.version == HeaderVersion::V1 {
        MAGIC_KP2K
    } else if hdr.compiler_version == 110002 {
        MAGIC_KPRM
    } else {
        MAGIC_KPRL
    }
}

/// Read the core header fields.
pub fn read_file_header(buf: &BinBuffer, archived: bool) -> Result<FileHeader> {
    if !is_bytecode(buf.as_slice(), 0) {
        return Err(Error::UnrecognisedFormat(
            "not a bytecode file".to_string(),
        ));
    }

    let magic: [u8; 4] = buf.read(0, 4)?.try_into().unwrap();

    // RD-prefixed files imply the compiler version from the magic itself
    let compiler_version = if &magic[..2] == b"RD" {
        if &magic[2..] == b"RM" {
            110002
        } else {
            10002
        }
    } else {
        buf.get_u32(4)?
    };

    let (version, data_offset, compressed_size) = if magic == *MAGIC_KP2K
        || magic == *MAGIC_RD2K
        || magic == *MAGIC_CC01
    {
        let data_offset = 0x1cc + buf.get_u32(0x20)? as usize * 4;
        (HeaderVersion::V1, data_offset, None)
    } else {
        let data_offset = buf.get_u32(0x20)? as usize;
        let comp = buf.get_u32(0x28)? as usize;
        let compressed_size = if comp > 0 { Some(comp) } else { None };
        (HeaderVersion::V2, data_offset, compressed_size)
    };

    Ok(FileHeader {
        version,
        compiler_version,
        data_offset,
        uncompressed_size: buf.get_u32(0x24)? as usize,
        compressed_size,
        int_0x2c: match version {
            HeaderVersion::V1 => buf.get_i32(0x28)?,
            HeaderVersion::V2 => buf.get_i32(0x2c)?,
        },
        entry_points: [0; 100],
        kidoku_lnums: Vec::new(),
        dramatis_personae: Vec::new(),
        archived,
        metadata: None,
    })
}

/// Read the complete header: entry points, kidoku line numbers and, for V2,
/// the dramatis personae table. `RD*` files also get their metadata block
/// probed.
pub fn read_full_header(buf: &BinBuffer, archived: bool) -> Result<FileHeader> {
    let mut hdr = read_file_header(buf, archived)?;

    let table_end = |name: &str, offset: usize, bytes: usize| -> Result<()> {
        if offset + bytes > buf.len() {
            return Err(Error::Truncated(format!(
                "{} table at {:#x}+{} exceeds file length {}",
                name,
                offset,
                bytes,
                buf.len()
            )));
        }
        Ok(())
    };

    let meta_probe;
    match hdr.version {
        HeaderVersion::V1 => {
            table_end("entry point", 0x30, 400)?;
            for (i, ep) in hdr.entry_points.iter_mut().enumerate() {
                *ep = buf.get_i32(0x30 + i * 4)?;
            }
            let count = buf.get_u32(0x20)? as usize;
            table_end("kidoku", 0x1cc, count * 4)?;
            hdr.kidoku_lnums = (0..count)
                .map(|i| buf.get_i32(0x1cc + i * 4))
                .collect::<Result<_>>()?;
            meta_probe = 0x1cc + count * 4;
        }
        HeaderVersion::V2 => {
            table_end("entry point", 0x34, 400)?;
            for (i, ep) in hdr.entry_points.iter_mut().enumerate() {
                *ep = buf.get_i32(0x34 + i * 4)?;
            }

            let t1_offset = buf.get_u32(0x08)? as usize;
            let count = buf.get_u32(0x0c)? as usize;
            table_end("kidoku", t1_offset, count * 4)?;
            hdr.kidoku_lnums = (0..count)
                .map(|i| buf.get_i32(t1_offset + i * 4))
                .collect::<Result<_>>()?;

            let dp_offset = buf.get_u32(0x14)? as usize;
            let dp_count = buf.get_u32(0x18)? as usize;
            let mut offset = dp_offset;
            hdr.dramatis_personae = Vec::with_capacity(dp_count);
            for _ in 0..dp_count {
                table_end("dramatis personae", offset, 4)?;
                let name_len = buf.get_u32(offset)? as usize;
                table_end("dramatis personae", offset + 4, name_len)?;
                hdr.dramatis_personae
                    .push(buf.read_sz(offset + 4, name_len)?.to_vec());
                offset += 4 + name_len;
            }
            meta_probe = offset;
        }
    }

    if buf.read(0, 2)? == b"RD" {
        hdr.metadata = Metadata::read(buf, meta_probe);
    }

    Ok(hdr)
}
