//! SiglusEngine scene-package support: `Scene.pck` containers and the
//! XOR-obfuscated UTF-16 strings of `.ss` scene files.
//!
//! The compression layer is the same LZ77 variant the RealLive side uses
//! (see `rlkit-core`), just wrapped in the Siglus `{complen, declen}`
//! frame and a two-pass XOR.

pub mod keys;
pub mod pck;
pub mod ss;
mod utf16;

pub use keys::{find_key, resolve_key, UNIVERSAL_KEY};
pub use pck::{extract_pck, rebuild_pck, PckHeader};
pub use ss::{dump_ss, inject_ss, render_dump, SsHeader, SsLine};
