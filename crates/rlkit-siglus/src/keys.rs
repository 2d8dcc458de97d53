//! XOR key material for SiglusEngine packages.
//!
//! Pass one of the decryption XORs every data byte with a universal
//! 256-byte key; pass two, enabled by the `encrypt2` header flag, adds a
//! 16-byte key specific to the title (extracted from the game executable).
//! The registry below covers titles this toolchain has been used against;
//! other keys load from a YAML file.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

/// First-pass key shared by every package.
pub const UNIVERSAL_KEY: [u8; 256] = [
    0x0e, 0x52, 0x48, 0x6a, 0xdd, 0xe4, 0x7c, 0x99, 0xf5, 0x8e, 0xc1, 0x9c,
    0x5f, 0xba, 0x28, 0xe5, 0xb8, 0x26, 0x63, 0x95, 0x98, 0x37, 0x61, 0x4a,
    0x32, 0xa2, 0xda, 0xe1, 0xb2, 0x11, 0xf7, 0xf6, 0x66, 0x12, 0x7d, 0x0e,
    0x46, 0x53, 0x67, 0x13, 0x79, 0xb0, 0x75, 0x43, 0x64, 0x4f, 0x06, 0xb6,
    0x2e, 0x11, 0x09, 0xbc, 0x86, 0xfd, 0xc2, 0x9f, 0xf7, 0xde, 0x0f, 0xfa,
    0xca, 0xd6, 0x8d, 0x44, 0x4e, 0xd7, 0x59, 0x86, 0x91, 0x30, 0x57, 0x4e,
    0x5b, 0xe1, 0x3d, 0x74, 0x87, 0x6b, 0xf1, 0x35, 0x84, 0x45, 0xbd, 0x54,
    0xa7, 0x5c, 0xdc, 0xab, 0x40, 0x23, 0xb2, 0xdd, 0xaa, 0x41, 0xa0, 0xae,
    0xfd, 0xca, 0x8b, 0xcf, 0x47, 0x1a, 0xa1, 0xb5, 0x5e, 0x7d, 0x36, 0x37,
    0x78, 0x6d, 0xbb, 0x7f, 0x91, 0x26, 0xa4, 0x1e, 0x8e, 0x4b, 0x2d, 0x2f,
    0xbc, 0x62, 0xdd, 0x6b, 0x3c, 0x3c, 0x8d, 0xc2, 0x89, 0x26, 0xee, 0xd7,
    0x3c, 0x75, 0x25, 0x96, 0xde, 0x2f, 0xdf, 0x51, 0x09, 0xd9, 0x9f, 0x5f,
    0x69, 0x23, 0x7d, 0xd6, 0xb8, 0x4c, 0x19, 0xf2, 0x0b, 0x33, 0x1c, 0x8b,
    0x81, 0x63, 0x2b, 0x87, 0xb6, 0xa6, 0xcb, 0x10, 0x52, 0x1b, 0x64, 0xbe,
    0xe5, 0x82, 0x2c, 0x16, 0x65, 0xfa, 0xf6, 0x61, 0xae, 0x01, 0x90, 0x78,
    0x72, 0x5b, 0xeb, 0x43, 0xa0, 0x11, 0x6b, 0xc1, 0xbe, 0x1c, 0xc2, 0x93,
    0x45, 0x80, 0x8f, 0x80, 0x45, 0xcc, 0xf2, 0x0f, 0x3c, 0x68, 0xb1, 0xed,
    0xc5, 0x16, 0xbe, 0x02, 0x8a, 0x1d, 0xbd, 0xf6, 0x34, 0x0b, 0x79, 0xa6,
    0x8d, 0xd1, 0xfa, 0x6a, 0x92, 0xfa, 0x2e, 0x8e, 0xac, 0xc3, 0x10, 0x2a,
    0xc7, 0xe0, 0x3f, 0xb0, 0x0c, 0x58, 0x94, 0xc0, 0x5d, 0x2d, 0xee, 0xb6,
    0xe6, 0xab, 0xd2, 0xba, 0xab, 0x52, 0x87, 0xc5, 0x2a, 0x5a, 0x87, 0x4b,
    0x88, 0x38, 0xdf, 0x60,
];

static KNOWN_GAMES: &[(&str, [u8; 16])] = &[
    (
        "angel_beats",
        [
            0xfb, 0x33, 0x54, 0x40, 0x42, 0x2d, 0x00, 0x7b,
            0x9b, 0xad, 0xc9, 0xc6, 0xb4, 0x31, 0x2c, 0xc8,
        ],
    ),
    (
        "rewrite",
        [
            0x3f, 0x1c, 0x08, 0x24, 0x3c, 0xec, 0xcd, 0x85,
            0x25, 0x30, 0x60, 0x44, 0x8c, 0xbb, 0xcc, 0x4a,
        ],
    ),
    (
        "summer_pockets",
        [
            0x0d, 0x43, 0x21, 0x4a, 0x90, 0xfa, 0xe0, 0xc5,
            0xc1, 0xf4, 0x5c, 0x62, 0x75, 0xc7, 0x02, 0x8b,
        ],
    ),
    (
        "harmonia",
        [
            0x83, 0x21, 0x44, 0xf7, 0x37, 0x69, 0xc0, 0xf3,
            0xc5, 0xa8, 0x48, 0x1c, 0x1d, 0x15, 0x95, 0x82,
        ],
    ),
    (
        "little_busters_ee",
        [
            0xc8, 0xbc, 0x1d, 0x20, 0x1b, 0x99, 0xd5, 0x92,
            0x3d, 0x1b, 0xc1, 0x6d, 0x21, 0x96, 0x78, 0x8d,
        ],
    ),
];

/// Titles in the built-in registry.
pub fn game_names() -> Vec<&'static str> {
    KNOWN_GAMES.iter().map(|(name, _)| *name).collect()
}

/// Look up a built-in per-game key, case-insensitively.
pub fn find_key(name: &str) -> Option<[u8; 16]> {
    KNOWN_GAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, key)| *key)
}

/// Load per-game keys from a YAML file mapping names to 16-byte arrays.
pub fn load_key_file(path: impl AsRef<Path>) -> Result<HashMap<String, [u8; 16]>> {
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("cannot read key file {}", path.as_ref().display()))?;
    serde_yaml::from_str(&text).context("malformed key file")
}

/// Resolve a title against the key file (if given) and the registry.
pub fn resolve_key(name: &str, key_file: Option<&Path>) -> Result<[u8; 16]> {
    if let Some(path) = key_file {
        let table = load_key_file(path)?;
        if let Some(key) = table
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, k)| *k)
        {
            return Ok(key);
        }
    }
    find_key(name).with_context(|| {
        format!(
            "unknown game '{}' (known: {})",
            name,
            game_names().join(", ")
        )
    })
}
