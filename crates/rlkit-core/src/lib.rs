//! Core containers and codecs for RealLive-family bytecode files.
//!
//! This crate owns everything below the disassembler: the binary buffer,
//! the LZ77 codec and XOR layers, bytecode file headers, the high-level
//! decompress/compress pipeline, the SEEN.TXT archive format and the range
//! selector grammar used by the archive tools.

pub mod archive;
pub mod binbuf;
pub mod bytecode;
pub mod compression;
pub mod error;
pub mod gamedef;
pub mod metadata;
pub mod ranges;
pub mod rlcmp;

#[cfg(test)]
pub(crate) mod testutil;

pub use binbuf::BinBuffer;
pub use error::{Error, Result};
pub use gamedef::XorSubkey;
