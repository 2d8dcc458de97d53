//! Per-game XOR key definitions.
//!
//! Some titles ship their SEEN archives with an extra keyed XOR applied to
//! the decompressed data of every archived slot. A key is a list of
//! subkeys, each covering one `offset..offset+length` window with a 16-byte
//! repeating pattern. The registry below covers the common retail titles;
//! anything else can be supplied through a YAML key file.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

/// One XOR window: `data` repeats every 16 bytes across
/// `offset..offset+length`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct XorSubkey {
    pub offset: usize,
    pub length: usize,
    pub data: [u8; 16],
}

static KEY_LB: [XorSubkey; 1] = [XorSubkey {
    offset: 256,
    length: 257,
    data: [
        0xa8, 0x28, 0xfd, 0x66, 0xa0, 0x23, 0x77, 0x69, 0xf9, 0x45, 0xf8, 0x2c,
        0x7c, 0x00, 0xad, 0xf4,
    ],
}];

static KEY_CFV: [XorSubkey; 1] = [XorSubkey {
    offset: 256,
    length: 257,
    data: [
        0xaf, 0x2f, 0xfb, 0x6b, 0xaf, 0x30, 0x77, 0x17, 0x87, 0x48, 0xfe, 0x2c,
        0x68, 0x1a, 0xb9, 0xf0,
    ],
}];

static KEY_SNOW: [XorSubkey; 1] = [XorSubkey {
    offset: 256,
    length: 257,
    data: [
        0xe4, 0xab, 0xa2, 0xc9, 0xec, 0x39, 0x36, 0x62, 0xc9, 0x03, 0xba, 0x6d,
        0x2e, 0x9c, 0xf2, 0x64,
    ],
}];

/// Look up the built-in subkeys for a game identifier. The identifier is
/// matched case-insensitively; the empty identifier means no keying.
pub fn known_keys(id: &str) -> Option<&'static [XorSubkey]> {
    if id.eq_ignore_ascii_case("LB") || id.eq_ignore_ascii_case("LBME") {
        Some(&KEY_LB)
    } else if id.eq_ignore_ascii_case("CFV") || id.eq_ignore_ascii_case("CLANNAD_FV") {
        Some(&KEY_CFV)
    } else if id.eq_ignore_ascii_case("SNOW") || id.eq_ignore_ascii_case("SNOW_SE") {
        Some(&KEY_SNOW)
    } else {
        None
    }
}

/// Load additional game keys from a YAML file mapping identifiers to
/// subkey lists:
///
/// ```yaml
/// MYGAME:
///   - offset: 256
///     length: 257
///     data: [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]
/// ```
pub fn load_key_file(path: impl AsRef<Path>) -> Result<HashMap<String, Vec<XorSubkey>>> {
    let text = std::fs::read_to_string(path)?;
    let table: HashMap<String, Vec<XorSubkey>> = serde_yaml::from_str(&text)
        .map_err(|e| crate::error::Error::UnrecognisedFormat(format!("key file: {}", e)))?;
    Ok(table)
}

/// Resolve a game identifier against the built-in registry and an optional
/// key file; the file wins on conflicts. Unknown or empty identifiers
/// resolve to no keys.
pub fn resolve_keys(id: &str, key_file: Option<&Path>) -> Result<Vec<XorSubkey>> {
    if id.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(path) = key_file {
        let table = load_key_file(path)?;
        if let Some(keys) = table
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(id))
            .map(|(_, v)| v)
        {
            return Ok(keys.clone());
        }
    }
    match known_keys(id) {
        Some(keys) => Ok(keys.to_vec()),
        None => {
            log::warn!("no XOR keys known for game '{}'", id);
            Ok(Vec::new())
        }
    }
}
