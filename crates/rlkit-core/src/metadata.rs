//! Compiler metadata embedded in `RD*` bytecode headers.
//!
//! Layout:
//!   u32  total_len
//!   u32  id_len
//!   char[id_len+1] compiler identifier (NUL-terminated)
//!   u32  compiler version * 100
//!   u8[4] target engine version (a.b.c.d)
//!   u8   text transform: 0=none, 1=Chinese, 2=Western, 3=Korean
//!
//! A block is only valid when `total_len >= id_len + 17`; anything else is
//! treated as absent.

use crate::binbuf::BinBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextTransform {
    #[default]
    None,
    Chinese,
    Western,
    Korean,
}

impl std::fmt::Display for TextTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TextTransform::None => "None",
            TextTransform::Chinese => "Chinese",
            TextTransform::Western => "Western",
            TextTransform::Korean => "Korean",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub compiler_name: String,
    /// Stored as version * 100.
    pub compiler_version: u32,
    pub target_version: [u8; 4],
    pub text_transform: TextTransform,
}

impl Metadata {
    /// Parse a metadata block at `idx`, or None when no valid block is
    /// present there.
    pub fn read(buf: &BinBuffer, idx: usize) -> Option<Metadata> {
        let total_len = buf.get_u32(idx).ok()? as usize;
        // id_len counts the NUL terminator; a block spanning both length
        // fields, the id and the 9-byte tail is exactly id_len + 17
        let id_len = buf.get_u32(idx + 4).ok()? as usize + 1;
        if total_len < id_len + 17 {
            return None;
        }

        let name = buf.read_sz(idx + 8, id_len).ok()?;
        let tail = idx + 8 + id_len;

        Some(Metadata {
            compiler_name: String::from_utf8_lossy(name).into_owned(),
            compiler_version: buf.get_u32(tail).ok()?,
            target_version: [
                buf.get_u8(tail + 4).ok()?,
                buf.get_u8(tail + 5).ok()?,
                buf.get_u8(tail + 6).ok()?,
                buf.get_u8(tail + 7).ok()?,
            ],
            text_transform: match buf.get_u8(tail + 8).ok()? {
                1 => TextTransform::Chinese,
                2 => TextTransform::Western,
                3 => TextTransform::Korean,
                _ => TextTransform::None,
            },
        })
    }

    /// Serialise a block for embedding into a header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let id = self.compiler_name.as_bytes();
        // both length fields (8), the NUL-terminated id and the 9-byte
        // tail; with the NUL counted into id_len this sits exactly on the
        // id_len + 17 bound the reader accepts
        let total_len = 8 + id.len() + 1 + 9;

        let mut out = Vec::with_capacity(total_len);
        out.extend_from_slice(&(total_len as u32).to_le_bytes());
        out.extend_from_slice(&(id.len() as u32).to_le_bytes());
        out.extend_from_slice(id);
        out.push(0);
        out.extend_from_slice(&self.compiler_version.to_le_bytes());
        out.extend_from_slice(&self.target_version);
        out.push(match self.text_transform {
            TextTransform::None => 0,
            TextTransform::Chinese => 1,
            TextTransform::Western => 2,
            TextTransform::Korean => 3,
        });
        out
    }
}
