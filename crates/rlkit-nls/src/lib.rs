use anyhow::bail;
use encoding_rs::{Encoding as RsEncoding, EUC_JP, SHIFT_JIS, UTF_8};
use std::borrow::Cow;
use std::str::FromStr;

/// UTF-8 byte order mark, written at the head of output files on request.
pub const UTF8_BOM: [u8; 3] = [0xef, 0xbb, 0xbf];

pub trait TextDecoder {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str>;

    /// Decode C-style string: stop at the first NUL (0x00).
    fn decode_cstr<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.decode(&bytes[..end])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Windows code page 932, the native encoding of the engine.
    #[default]
    ShiftJis,
    EucJp,
    Utf8,
}

impl Encoding {
    #[inline]
    pub fn as_encoding_rs(self) -> &'static RsEncoding {
        match self {
            Encoding::ShiftJis => SHIFT_JIS,
            Encoding::EucJp => EUC_JP,
            Encoding::Utf8 => UTF_8,
        }
    }

    /// Canonical name used in disassembly file headers.
    pub fn name(self) -> &'static str {
        match self {
            Encoding::ShiftJis => "cp932",
            Encoding::EucJp => "euc-jp",
            Encoding::Utf8 => "utf-8",
        }
    }

    /// Extension for resource files written in this encoding.
    pub fn res_ext(self) -> &'static str {
        match self {
            Encoding::ShiftJis => "sjs",
            Encoding::EucJp => "euc",
            Encoding::Utf8 => "utf",
        }
    }
}

impl FromStr for Encoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cp932" | "sjis" | "sjs" | "shiftjis" | "shift_jis" | "shift-jis" => {
                Ok(Encoding::ShiftJis)
            }
            "euc" | "euc-jp" | "eucjp" | "euc_jp" => Ok(Encoding::EucJp),
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            _ => bail!("unknown encoding: {}", s),
        }
    }
}

/// A simple decoder/encoder bound to one encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    enc: Encoding,
}

impl Decoder {
    #[inline]
    pub fn new(enc: Encoding) -> Self {
        Self { enc }
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.enc
    }

    /// Encode a Rust string to bytes using the selected encoding.
    /// This is "best effort": unrepresentable chars will be replaced.
    pub fn encode<'a>(&self, s: &'a str) -> Cow<'a, [u8]> {
        let enc = self.enc.as_encoding_rs();
        let (cow, _had_errors, _) = enc.encode(s);
        cow
    }

    /// Same as encode(), but always returns an owned Vec<u8>.
    pub fn encode_owned(&self, s: &str) -> Vec<u8> {
        self.encode(s).into_owned()
    }
}

impl TextDecoder for Decoder {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self.enc {
            Encoding::Utf8 => match std::str::from_utf8(bytes) {
                Ok(s) => Cow::Borrowed(s),
                Err(_) => Cow::Owned(String::from_utf8_lossy(bytes).into_owned()),
            },
            Encoding::ShiftJis | Encoding::EucJp => {
                let enc = self.enc.as_encoding_rs();
                let (cow, _had_errors, _) = enc.decode(bytes);
                cow
            }
        }
    }
}
