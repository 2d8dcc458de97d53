//! Scene.pck container handling.
//!
//! A package is a fixed 92-byte header of `{offset, size}` section pairs,
//! the section blobs, a file table of contents and the compressed,
//! XOR-encrypted `.ss` payloads. Extraction dumps each section verbatim as
//! `<name>.bin` so a later rebuild can reproduce the container without
//! understanding every section.

use std::path::Path;

use anyhow::{bail, Context, Result};
use rlkit_core::compression;

use crate::keys::UNIVERSAL_KEY;
use crate::utf16::utf16le_to_string;

pub const PCK_HEADER_LEN: usize = 92;

/// Sections dumped and restored verbatim, in header order.
pub const SECTION_NAMES: [&str; 8] = [
    "table1", "gvar", "gvarstr", "name1", "name2", "name3", "name4", "fname",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairVal {
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Default)]
pub struct PckHeader {
    pub hdr_len: u32,
    pub table1: PairVal,
    pub gvar: PairVal,
    pub gvarstr: PairVal,
    pub name1: PairVal,
    pub name2: PairVal,
    pub name3: PairVal,
    pub name4: PairVal,
    pub fnamestr: PairVal,
    pub filetoc: PairVal,
    pub data: PairVal,
    pub encrypt2: u32,
    /// Unknown semantics; preserved verbatim on rebuild.
    pub wtf: u32,
}

impl PckHeader {
    pub fn read(buf: &[u8]) -> Result<PckHeader> {
        if buf.len() < PCK_HEADER_LEN {
            bail!("file too small to be a valid PCK ({} bytes)", buf.len());
        }
        let u32_at =
            |off: usize| u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
        let pair_at = |off: usize| PairVal {
            offset: u32_at(off),
            size: u32_at(off + 4),
        };

        let hdr = PckHeader {
            hdr_len: u32_at(0),
            table1: pair_at(4),
            gvar: pair_at(12),
            gvarstr: pair_at(20),
            name1: pair_at(28),
            name2: pair_at(36),
            name3: pair_at(44),
            name4: pair_at(52),
            fnamestr: pair_at(60),
            filetoc: pair_at(68),
            data: pair_at(76),
            encrypt2: u32_at(84),
            wtf: u32_at(88),
        };
        if hdr.hdr_len != PCK_HEADER_LEN as u32 {
            bail!(
                "wrong PCK header size: got {}, expected {}",
                hdr.hdr_len,
                PCK_HEADER_LEN
            );
        }
        Ok(hdr)
    }

    pub fn to_bytes(&self) -> [u8; PCK_HEADER_LEN] {
        let mut out = [0u8; PCK_HEADER_LEN];
        let mut put = |off: usize, val: u32| out[off..off + 4].copy_from_slice(&val.to_le_bytes());
        put(0, self.hdr_len);
        for (i, pair) in self.section_pairs().into_iter().chain([&self.data]).enumerate() {
            put(4 + i * 8, pair.offset);
            put(4 + i * 8 + 4, pair.size);
        }
        put(84, self.encrypt2);
        put(88, self.wtf);
        out
    }

    /// The nine leading pairs: the eight dumped sections plus the TOC.
    fn section_pairs(&self) -> [&PairVal; 9] {
        [
            &self.table1,
            &self.gvar,
            &self.gvarstr,
            &self.name1,
            &self.name2,
            &self.name3,
            &self.name4,
            &self.fnamestr,
            &self.filetoc,
        ]
    }
}

/// Two-pass XOR. Symmetric, so this is also the encryption direction.
pub fn decrypt(data: &mut [u8], encrypt2: u32, key1: &[u8; 16]) {
    for (i, b) in data.iter_mut().enumerate() {
        *b ^= UNIVERSAL_KEY[i % 256];
    }
    if encrypt2 == 1 {
        for (i, b) in data.iter_mut().enumerate() {
            *b ^= key1[i % 16];
        }
    }
}

/// Extract every `.ss` file and dump the raw sections as `<name>.bin`.
pub fn extract_pck(
    pck_path: impl AsRef<Path>,
    key1: &[u8; 16],
    out_dir: impl AsRef<Path>,
) -> Result<()> {
    let pck_path = pck_path.as_ref();
    let out_dir = out_dir.as_ref();

    let buf = std::fs::read(pck_path)
        .with_context(|| format!("cannot read PCK {}", pck_path.display()))?;
    let hdr = PckHeader::read(&buf)?;

    std::fs::create_dir_all(out_dir)?;

    // dump sections for a faithful rebuild; the stored size travels along
    let pairs = hdr.section_pairs().map(|p| *p);
    for (i, name) in SECTION_NAMES.iter().enumerate() {
        let start = pairs[i].offset as usize;
        let end = (pairs[i + 1].offset as usize).min(buf.len());
        if start > end || start > buf.len() {
            log::warn!("section {} is out of range", name);
            continue;
        }
        let mut blob = Vec::with_capacity(4 + end - start);
        blob.extend_from_slice(&pairs[i].size.to_le_bytes());
        blob.extend_from_slice(&buf[start..end]);
        std::fs::write(out_dir.join(format!("{}.bin", name)), blob)?;
    }

    let num_files = hdr.filetoc.size as usize;
    let toc_offset = hdr.filetoc.offset as usize;
    let name_idx_offset = hdr.name4.offset as usize;
    let fnamestr_offset = hdr.fnamestr.offset as usize;
    let data_offset = hdr.data.offset as usize;

    log::info!(
        "extracting {} files from {}",
        num_files,
        pck_path.display()
    );

    for i in 0..num_files {
        let toc = toc_offset + i * 8;
        if toc + 8 > buf.len() {
            bail!("TOC entry {} out of bounds", i);
        }
        let file_offset = u32_at(&buf, toc) as usize;
        let file_size = u32_at(&buf, toc + 4) as usize;

        let idx = name_idx_offset + i * 8;
        if idx + 8 > buf.len() {
            bail!("name index {} out of bounds", i);
        }
        let char_offset = u32_at(&buf, idx) as usize;
        let char_size = u32_at(&buf, idx + 4) as usize;

        let name_start = fnamestr_offset + char_offset * 2;
        let name_end = name_start + char_size * 2;
        if name_end > buf.len() {
            bail!("filename data out of bounds for file {}", i);
        }
        let fname = utf16le_to_string(&buf[name_start..name_end]);

        let data_start = data_offset + file_offset;
        if data_start + file_size > buf.len() {
            bail!("data for '{}' out of bounds", fname);
        }

        let mut file_data = buf[data_start..data_start + file_size].to_vec();
        decrypt(&mut file_data, hdr.encrypt2, key1);

        if file_data.len() >= 4 {
            let declared = u32_at(&file_data, 0) as usize;
            if declared != file_size {
                log::warn!(
                    "{}: size mismatch, frame says {} but TOC says {}",
                    fname,
                    declared,
                    file_size
                );
            }
        }

        let plain = compression::decompress_to_vec(&file_data)
            .with_context(|| format!("decompression failed for '{}'", fname))?;

        std::fs::write(out_dir.join(format!("{}.ss", fname)), plain)?;
    }

    Ok(())
}

/// Rebuild a package from the section dumps and `.ss` files produced by
/// [`extract_pck`]. The caller supplies the `wtf` header word.
pub fn rebuild_pck(
    input_dir: impl AsRef<Path>,
    key1: &[u8; 16],
    wtf: u32,
    out_path: impl AsRef<Path>,
) -> Result<()> {
    let input_dir = input_dir.as_ref();

    let mut sections = Vec::with_capacity(SECTION_NAMES.len());
    for name in SECTION_NAMES {
        let blob = std::fs::read(input_dir.join(format!("{}.bin", name)))
            .with_context(|| format!("cannot read {}.bin", name))?;
        if blob.len() < 4 {
            bail!("{}.bin is truncated", name);
        }
        sections.push(blob);
    }

    // name4.bin lists (char offset, char count) pairs into fname.bin
    let name4 = &sections[6][4..];
    let fname_str = &sections[7][4..];
    let count = u32_at(&sections[6], 0) as usize;

    let mut names = Vec::with_capacity(count);
    for i in 0..count {
        if i * 8 + 8 > name4.len() {
            bail!("name4 entry {} out of bounds", i);
        }
        let char_offset = u32_at(name4, i * 8) as usize;
        let char_size = u32_at(name4, i * 8 + 4) as usize;
        let start = char_offset * 2;
        let end = start + char_size * 2;
        if end > fname_str.len() {
            bail!("filename {} out of bounds", i);
        }
        names.push(utf16le_to_string(&fname_str[start..end]));
    }

    let mut hdr = PckHeader {
        hdr_len: PCK_HEADER_LEN as u32,
        encrypt2: 1,
        wtf,
        ..Default::default()
    };

    let mut out = Vec::new();
    out.extend_from_slice(&hdr.to_bytes());

    // section payloads follow the header back to back
    let mut section_pairs = [PairVal::default(); 8];
    for (i, blob) in sections.iter().enumerate() {
        section_pairs[i] = PairVal {
            offset: out.len() as u32,
            size: u32_at(blob, 0),
        };
        out.extend_from_slice(&blob[4..]);
    }

    let toc_offset = out.len();
    out.resize(out.len() + count * 8, 0);

    let data_offset = out.len();
    for (i, name) in names.iter().enumerate() {
        let ss_path = input_dir.join(format!("{}.ss", name));
        let plain = std::fs::read(&ss_path)
            .with_context(|| format!("cannot read {}", ss_path.display()))?;

        log::info!("packing [{}/{}] {}.ss", i + 1, count, name);

        let mut packed = compression::compress_with_header(&plain);
        decrypt(&mut packed, 1, key1);

        let entry = PairVal {
            offset: (out.len() - data_offset) as u32,
            size: packed.len() as u32,
        };
        out[toc_offset + i * 8..toc_offset + i * 8 + 4]
            .copy_from_slice(&entry.offset.to_le_bytes());
        out[toc_offset + i * 8 + 4..toc_offset + i * 8 + 8]
            .copy_from_slice(&entry.size.to_le_bytes());

        out.extend_from_slice(&packed);
    }

    hdr.table1 = section_pairs[0];
    hdr.gvar = section_pairs[1];
    hdr.gvarstr = section_pairs[2];
    hdr.name1 = section_pairs[3];
    hdr.name2 = section_pairs[4];
    hdr.name3 = section_pairs[5];
    hdr.name4 = section_pairs[6];
    hdr.fnamestr = section_pairs[7];
    hdr.filetoc = PairVal {
        offset: toc_offset as u32,
        size: count as u32,
    };
    hdr.data = PairVal {
        offset: data_offset as u32,
        size: count as u32,
    };
    out[..PCK_HEADER_LEN].copy_from_slice(&hdr.to_bytes());

    std::fs::write(out_path, out)?;
    Ok(())
}

#[inline]
fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let hdr = PckHeader {
            hdr_len: PCK_HEADER_LEN as u32,
            table1: PairVal { offset: 92, size: 3 },
            gvar: PairVal {
                offset: 120,
                size: 9,
            },
            filetoc: PairVal {
                offset: 400,
                size: 2,
            },
            data: PairVal {
                offset: 500,
                size: 2,
            },
            encrypt2: 1,
            wtf: 0xdeadbeef,
            ..Default::default()
        };
        let bytes = hdr.to_bytes();
        let back = PckHeader::read(&bytes).unwrap();
        assert_eq!(back.table1, hdr.table1);
        assert_eq!(back.filetoc, hdr.filetoc);
        assert_eq!(back.data, hdr.data);
        assert_eq!(back.encrypt2, 1);
        assert_eq!(back.wtf, 0xdeadbeef);
    }

    #[test]
    fn wrong_header_len_rejected() {
        let mut bytes = [0u8; PCK_HEADER_LEN];
        bytes[0] = 90;
        assert!(PckHeader::read(&bytes).is_err());
        assert!(PckHeader::read(&[0u8; 10]).is_err());
    }

    #[test]
    fn decrypt_is_self_inverse() {
        let key1 = [7u8; 16];
        let original: Vec<u8> = (0..600).map(|i| (i % 256) as u8).collect();

        let mut data = original.clone();
        decrypt(&mut data, 1, &key1);
        assert_ne!(data, original);
        decrypt(&mut data, 1, &key1);
        assert_eq!(data, original);

        // pass two disabled
        let mut data = original.clone();
        decrypt(&mut data, 0, &key1);
        decrypt(&mut data, 0, &key1);
        assert_eq!(data, original);
    }

    #[test]
    fn extract_rebuild_cycle() {
        let dir = std::env::temp_dir().join(format!("rlkit-pck-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let key1 = crate::keys::find_key("rewrite").unwrap();

        // build a tiny package by hand: one file named "a"
        let ss_payload = b"script bytes script bytes script bytes".to_vec();
        let mut packed = compression::compress_with_header(&ss_payload);
        decrypt(&mut packed, 1, &key1);

        let mut hdr = PckHeader {
            hdr_len: PCK_HEADER_LEN as u32,
            encrypt2: 1,
            wtf: 5,
            ..Default::default()
        };

        let mut buf = vec![0u8; PCK_HEADER_LEN];
        // empty sections all point at the end of the header
        let here = buf.len() as u32;
        hdr.table1 = PairVal { offset: here, size: 0 };
        hdr.gvar = hdr.table1;
        hdr.gvarstr = hdr.table1;
        hdr.name1 = hdr.table1;
        hdr.name2 = hdr.table1;
        hdr.name3 = hdr.table1;

        // name4: one entry (char_offset 0, char_size 1)
        hdr.name4 = PairVal {
            offset: buf.len() as u32,
            size: 1,
        };
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());

        // fname: "a" in UTF-16LE
        hdr.fnamestr = PairVal {
            offset: buf.len() as u32,
            size: 1,
        };
        buf.extend_from_slice(&crate::utf16::string_to_utf16le("a"));

        hdr.filetoc = PairVal {
            offset: buf.len() as u32,
            size: 1,
        };
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&(packed.len() as u32).to_le_bytes());

        hdr.data = PairVal {
            offset: buf.len() as u32,
            size: 1,
        };
        buf.extend_from_slice(&packed);
        buf[..PCK_HEADER_LEN].copy_from_slice(&hdr.to_bytes());

        let pck_path = dir.join("Scene.pck");
        std::fs::write(&pck_path, &buf).unwrap();

        let out_dir = dir.join("out");
        extract_pck(&pck_path, &key1, &out_dir).unwrap();
        assert_eq!(std::fs::read(out_dir.join("a.ss")).unwrap(), ss_payload);

        // and back again
        let rebuilt_path = dir.join("Rebuilt.pck");
        rebuild_pck(&out_dir, &key1, 5, &rebuilt_path).unwrap();

        let out2 = dir.join("out2");
        extract_pck(&rebuilt_path, &key1, &out2).unwrap();
        assert_eq!(std::fs::read(out2.join("a.ss")).unwrap(), ss_payload);

        let rebuilt_hdr = PckHeader::read(&std::fs::read(&rebuilt_path).unwrap()).unwrap();
        assert_eq!(rebuilt_hdr.wtf, 5);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
