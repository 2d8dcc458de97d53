//! Disassembler for RealLive-family bytecode.
//!
//! Feed it a decompressed bytecode file (see `rlkit-core`) and it produces
//! labelled textual source plus the extracted resource strings that
//! translation workflows care about.

pub mod disasm;
pub mod reader;
pub mod types;
pub mod writer;

pub use disasm::{disassemble, DisassemblyResult};
pub use types::{Command, Elem, EngineMode, FuncDef, FuncRegistry, Opcode, Options};
pub use writer::Writer;
