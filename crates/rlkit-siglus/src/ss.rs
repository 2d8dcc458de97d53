//! `.ss` scene script string handling.
//!
//! A scene file opens with a 132-byte header of `{offset, size}` section
//! pairs. The string index lists `(char offset, char count)` entries into
//! the UTF-16LE string table; every string is XOR-obfuscated per index
//! with the 16-bit key `index * 0x7087`. Injection patches in place when
//! sizes allow and otherwise rebuilds the table, shifting every header
//! offset behind it.

use std::collections::HashMap;

use anyhow::{bail, Result};

use crate::pck::PairVal;

pub const SS_HEADER_LEN: usize = 4 + 16 * 8;

const STR_KEY_STEP: u16 = 0x7087;

// pair indices within the header
const PAIR_STR_INDEX: usize = 1;
const PAIR_STR_TABLE: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct SsHeader {
    pub header_size: u32,
    pub pairs: [PairVal; 16],
}

impl SsHeader {
    pub fn read(buf: &[u8]) -> Result<SsHeader> {
        if buf.len() < SS_HEADER_LEN {
            bail!("file too small to be a valid .ss ({} bytes)", buf.len());
        }
        let mut hdr = SsHeader {
            header_size: u32_at(buf, 0),
            pairs: [PairVal::default(); 16],
        };
        for (i, pair) in hdr.pairs.iter_mut().enumerate() {
            pair.offset = u32_at(buf, 4 + i * 8);
            pair.size = u32_at(buf, 4 + i * 8 + 4);
        }
        Ok(hdr)
    }

    pub fn bytecode(&self) -> PairVal {
        self.pairs[0]
    }

    pub fn str_index(&self) -> PairVal {
        self.pairs[PAIR_STR_INDEX]
    }

    pub fn str_table(&self) -> PairVal {
        self.pairs[PAIR_STR_TABLE]
    }

    pub fn labels(&self) -> PairVal {
        self.pairs[3]
    }

    pub fn markers(&self) -> PairVal {
        self.pairs[4]
    }
}

/// One line of extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsLine {
    pub index: usize,
    pub text: String,
}

/// Per-index obfuscation key.
#[inline]
fn str_key(index: usize) -> u16 {
    (index as u16).wrapping_mul(STR_KEY_STEP)
}

/// Encode and obfuscate a string for table slot `index`.
fn obfuscate(s: &str, index: usize) -> Vec<u16> {
    let key = str_key(index);
    s.encode_utf16().map(|u| u ^ key).collect()
}

/// Decrypt every string in the file.
pub fn dump_ss(buf: &[u8]) -> Result<Vec<SsLine>> {
    let hdr = SsHeader::read(buf)?;

    let idx_offset = hdr.str_index().offset as usize;
    let idx_count = hdr.str_index().size as usize;
    if idx_offset + idx_count * 8 > buf.len() {
        bail!("string index out of bounds");
    }
    let tbl_offset = hdr.str_table().offset as usize;

    let mut lines = Vec::with_capacity(idx_count);
    for i in 0..idx_count {
        let entry = idx_offset + i * 8;
        let char_offset = u32_at(buf, entry) as usize;
        let char_size = u32_at(buf, entry + 4) as usize;

        if char_size == 0 {
            lines.push(SsLine {
                index: i,
                text: String::new(),
            });
            continue;
        }

        let start = tbl_offset + char_offset * 2;
        let end = start + char_size * 2;
        if end > buf.len() {
            bail!("string {} out of bounds", i);
        }

        let key = str_key(i);
        let units: Vec<u16> = buf[start..end]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]) ^ key)
            .collect();

        lines.push(SsLine {
            index: i,
            text: String::from_utf16_lossy(&units),
        });
    }
    Ok(lines)
}

/// Tab-separated dump body: `index<TAB>text<TAB>` per non-empty line,
/// with embedded newlines and tabs escaped.
pub fn render_dump(lines: &[SsLine]) -> String {
    let mut out = String::new();
    for line in lines {
        if line.text.is_empty() {
            continue;
        }
        let text = line.text.replace('\n', "\\n").replace('\t', "\\t");
        out.push_str(&format!("{}\t{}\t\n", line.index, text));
    }
    out
}

/// Replace strings by index, returning the new file image.
///
/// When every replacement matches its slot's size the table is patched in
/// place. Otherwise the whole table is rebuilt and every header offset
/// beyond the old table start is shifted by the size delta.
pub fn inject_ss(buf: &[u8], translations: &HashMap<usize, String>) -> Result<Vec<u8>> {
    if translations.is_empty() {
        bail!("no translations to inject");
    }

    let hdr = SsHeader::read(buf)?;
    let idx_offset = hdr.str_index().offset as usize;
    let idx_count = hdr.str_index().size as usize;
    let tbl_offset = hdr.str_table().offset as usize;
    let tbl_bytes = hdr.str_table().size as usize * 2;

    if idx_offset + idx_count * 8 > buf.len() || tbl_offset + tbl_bytes > buf.len() {
        bail!("string tables out of bounds");
    }

    let entries: Vec<(usize, usize)> = (0..idx_count)
        .map(|i| {
            let off = idx_offset + i * 8;
            (u32_at(buf, off) as usize, u32_at(buf, off + 4) as usize)
        })
        .collect();

    // sizes are compared in code units; XOR does not change them
    let need_rebuild = translations.iter().any(|(&i, text)| {
        i < idx_count && obfuscate(text, i).len() != entries[i].1
    });

    if !need_rebuild {
        let mut out = buf.to_vec();
        for (&i, text) in translations {
            if i >= idx_count {
                log::warn!("translation index {} out of range, skipped", i);
                continue;
            }
            let units = obfuscate(text, i);
            let start = tbl_offset + entries[i].0 * 2;
            for (j, unit) in units.iter().enumerate() {
                out[start + j * 2..start + j * 2 + 2].copy_from_slice(&unit.to_le_bytes());
            }
        }
        return Ok(out);
    }

    // rebuild the table, re-obfuscating untouched strings verbatim
    let mut new_entries = Vec::with_capacity(idx_count);
    let mut new_table: Vec<u8> = Vec::with_capacity(tbl_bytes);
    let mut current = 0usize;

    for (i, &(char_offset, char_size)) in entries.iter().enumerate() {
        let units: Vec<u16> = match translations.get(&i) {
            Some(text) => obfuscate(text, i),
            None => {
                let start = tbl_offset + char_offset * 2;
                buf[start..start + char_size * 2]
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect()
            }
        };
        new_entries.push((current, units.len()));
        for unit in &units {
            new_table.extend_from_slice(&unit.to_le_bytes());
        }
        current += units.len();
    }

    let delta = new_table.len() as i64 - tbl_bytes as i64;

    let mut out = Vec::with_capacity((buf.len() as i64 + delta) as usize);
    out.extend_from_slice(&buf[..tbl_offset]);
    out.extend_from_slice(&new_table);
    out.extend_from_slice(&buf[tbl_offset + tbl_bytes..]);

    // the table's own size field counts code units
    let new_char_size = (new_table.len() / 2) as u32;
    let size_field = 4 + PAIR_STR_TABLE * 8 + 4;
    out[size_field..size_field + 4].copy_from_slice(&new_char_size.to_le_bytes());

    // every section behind the old table moves by the delta
    if delta != 0 {
        for i in 0..16 {
            let off_field = 4 + i * 8;
            let v = u32_at(&out, off_field) as i64;
            if v > tbl_offset as i64 {
                let moved = (v + delta) as u32;
                out[off_field..off_field + 4].copy_from_slice(&moved.to_le_bytes());
            }
        }
    }

    // refresh the string index
    for (i, &(char_offset, char_size)) in new_entries.iter().enumerate() {
        let off = idx_offset + i * 8;
        out[off..off + 4].copy_from_slice(&(char_offset as u32).to_le_bytes());
        out[off + 4..off + 8].copy_from_slice(&(char_size as u32).to_le_bytes());
    }

    Ok(out)
}

#[inline]
fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}
