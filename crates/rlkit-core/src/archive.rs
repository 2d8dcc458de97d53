//! The SEEN.TXT archive format.
//!
//! An archive is a fixed 10 000-entry index table (80 000 bytes) followed
//! by the slot payloads. Each index entry is `{u32 offset, u32 length}`;
//! a zero length marks an empty slot, and slot `i` is logically named
//! `SEEN<iiii>.TXT`. A 23-byte marker identifies a stub archive with no
//! slots at all.

use std::collections::BTreeMap;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::binbuf::BinBuffer;
use crate::bytecode;
use crate::error::{Error, Result};
use crate::gamedef::XorSubkey;
use crate::rlcmp;

/// Number of SEEN slots in an archive.
pub const MAX_SEENS: usize = 10_000;
/// Size of the index table in bytes.
pub const INDEX_SIZE: usize = MAX_SEENS * 8;
/// Extension for raw (still compressed) extracted slots.
pub const COMP_EXT: &str = "rlc";
/// Extension for decompressed extracted slots.
pub const UNCOMP_EXT: &str = "rl";

const EMPTY_ARC_MAGIC: &[u8] = b"\x00Empty RealLive archive";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeenEntry {
    pub offset: usize,
    pub length: usize,
}

impl SeenEntry {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Operation options shared by the archive verbs.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub out_dir: PathBuf,
    pub keys: Vec<XorSubkey>,
}

fn entry_at(buf: &BinBuffer, idx: usize) -> SeenEntry {
    let off = idx * 8;
    match (buf.get_u32(off), buf.get_u32(off + 4)) {
        (Ok(offset), Ok(length)) => SeenEntry {
            offset: offset as usize,
            length: length as usize,
        },
        _ => SeenEntry::default(),
    }
}

/// Validate a buffer as an archive.
///
/// Returns 0 for the empty-archive marker, the number of non-empty slots
/// for a fully valid archive, and a negative value otherwise: `-count` when
/// some valid slots precede the first bad one, -1 when nothing validates.
pub fn seen_count(buf: &BinBuffer) -> isize {
    if buf.len() >= EMPTY_ARC_MAGIC.len()
        && buf.read(0, EMPTY_ARC_MAGIC.len()).unwrap() == EMPTY_ARC_MAGIC
    {
        return 0;
    }
    if buf.len() < INDEX_SIZE {
        return -1;
    }

    let mut count: isize = 0;
    for i in 0..MAX_SEENS {
        let entry = entry_at(buf, i);
        if entry.is_empty() {
            continue;
        }
        let valid = entry.offset >= INDEX_SIZE
            && entry.offset + entry.length <= buf.len()
            && bytecode::is_bytecode(buf.as_slice(), entry.offset);
        if !valid {
            return if count > 0 { -count } else { -1 };
        }
        count += 1;
    }
    count
}

/// Whether the file at `path` passes archive validation.
pub fn is_archive(path: impl AsRef<Path>) -> bool {
    match BinBuffer::read_file(path) {
        Ok(buf) => seen_count(&buf) >= 0,
        Err(_) => false,
    }
}

/// A loaded archive: the raw bytes plus the decoded index.
pub struct Archive {
    pub data: BinBuffer,
    pub entries: Vec<SeenEntry>,
    pub count: usize,
}

impl Archive {
    pub fn load(path: impl AsRef<Path>) -> Result<Archive> {
        let path = path.as_ref();
        let data = BinBuffer::read_file(path)?;

        let count = seen_count(&data);
        if count < 0 {
            return Err(Error::NotArchive(path.display().to_string()));
        }

        let entries = (0..MAX_SEENS).map(|i| entry_at(&data, i)).collect();
        Ok(Archive {
            data,
            entries,
            count: count as usize,
        })
    }

    /// Aliasing view of one slot's raw bytes, or None for an empty slot.
    pub fn subfile(&self, idx: usize) -> Option<&[u8]> {
        let entry = self.entries.get(idx)?;
        if entry.is_empty() {
            return None;
        }
        self.data.sub(entry.offset, entry.length).ok()
    }
}

fn seen_name(idx: usize) -> String {
    format!("SEEN{:04}.TXT", idx)
}

/// Print slot sizes and compression ratios to stdout.
pub fn list(path: impl AsRef<Path>, ranges: &[usize]) -> Result<()> {
    let arc = Archive::load(path)?;

    for &i in ranges {
        let Some(sub) = arc.subfile(i) else { continue };

        let hdr = match bytecode::read_file_header(&BinBuffer::from_vec(sub.to_vec()), true) {
            Ok(hdr) => hdr,
            Err(e) => {
                log::warn!("{}: unreadable header: {}", seen_name(i), e);
                continue;
            }
        };

        let unc = (hdr.uncompressed_size + hdr.data_offset) as f64 / 1024.0;
        match hdr.compressed_size {
            Some(comp) => {
                let cmp = (comp + hdr.data_offset) as f64 / 1024.0;
                println!(
                    "{}: {:10.2} k -> {:10.2} k   ({:.2}%)",
                    seen_name(i),
                    unc,
                    cmp,
                    cmp / unc * 100.0
                );
            }
            None => println!("{}: {:10.2} k", seen_name(i), unc),
        }
    }
    Ok(())
}

/// Write selected slots out verbatim (still compressed) as `.rlc` files.
pub fn break_out(path: impl AsRef<Path>, ranges: &[usize], opts: &Options) -> Result<()> {
    let arc = Archive::load(path)?;
    std::fs::create_dir_all(&opts.out_dir)?;

    for &i in ranges {
        let Some(sub) = arc.subfile(i) else { continue };
        let out = opts.out_dir.join(format!("{}.{}", seen_name(i), COMP_EXT));
        log::info!("extracting {} to {}", seen_name(i), out.display());
        std::fs::write(out, sub)?;
    }
    Ok(())
}

/// Decompress selected slots and write them as `.rl` files with the
/// uncompressed header magic substituted.
pub fn extract(path: impl AsRef<Path>, ranges: &[usize], opts: &Options) -> Result<()> {
    let arc = Archive::load(path)?;
    std::fs::create_dir_all(&opts.out_dir)?;

    for &i in ranges {
        let Some(sub) = arc.subfile(i) else { continue };

        if sub.len() >= 4 && bytecode::uncompressed_header(&sub[..4]) {
            log::info!("ignoring {} (not compressed)", seen_name(i));
            continue;
        }

        let copy = BinBuffer::from_vec(sub.to_vec());
        let hdr = match bytecode::read_file_header(&copy, true) {
            Ok(hdr) => hdr,
            Err(e) => {
                log::warn!("skipping {}: {}", seen_name(i), e);
                continue;
            }
        };

        let mut plain = match rlcmp::decompress(copy, &opts.keys, true) {
            Ok(buf) => buf,
            Err(e) => {
                log::warn!("failed to decompress {}: {}", seen_name(i), e);
                continue;
            }
        };
        plain.write(0, bytecode::uncompressed_magic(&hdr))?;

        let out = opts.out_dir.join(format!("{}.{}", seen_name(i), UNCOMP_EXT));
        log::info!("decompressing {} to {}", seen_name(i), out.display());
        plain.write_file(out)?;
    }
    Ok(())
}

/// Compress standalone uncompressed bytecode files, writing each under its
/// original logical name.
pub fn pack<P: AsRef<Path>>(files: &[P], opts: &Options) -> Result<()> {
    std::fs::create_dir_all(&opts.out_dir)?;

    for fname in files {
        let fname = fname.as_ref();
        let arr = match BinBuffer::read_file(fname) {
            Ok(arr) => arr,
            Err(e) => {
                log::warn!("cannot read {}: {}", fname.display(), e);
                continue;
            }
        };

        if arr.len() < 4 || !bytecode::uncompressed_header(arr.read(0, 4)?) {
            log::warn!(
                "skipping {}: not an uncompressed bytecode file",
                fname.display()
            );
            continue;
        }

        let base = fname
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let out_name = base
            .strip_suffix(".uncompressed")
            .or_else(|| base.strip_suffix(&format!(".{}", UNCOMP_EXT)))
            .unwrap_or(&base)
            .to_string();

        let packed = match rlcmp::compress(&arr, &opts.keys) {
            Ok(buf) => buf,
            Err(e) => {
                log::warn!("failed to compress {}: {}", fname.display(), e);
                continue;
            }
        };

        log::info!("compressing {} to {}", fname.display(), out_name);
        packed.write_file(opts.out_dir.join(out_name))?;
    }
    Ok(())
}

fn seen_index_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)seen(\d{4})").unwrap())
}

/// Merge bytecode files into an archive, creating it if needed. Each file
/// must carry a `SEENxxxx` tag in its name; already-compressed input is
/// stored verbatim, uncompressed input is compressed first.
pub fn add<P: AsRef<Path>>(arc_name: impl AsRef<Path>, files: &[P], opts: &Options) -> Result<()> {
    let arc_name = arc_name.as_ref();

    let arc_data = if arc_name.exists() {
        let data = BinBuffer::read_file(arc_name)?;
        if seen_count(&data) < 0 {
            return Err(Error::NotArchive(arc_name.display().to_string()));
        }
        data
    } else {
        std::fs::write(arc_name, EMPTY_ARC_MAGIC)?;
        BinBuffer::default()
    };

    let mut sources: BTreeMap<usize, Source> = BTreeMap::new();
    if arc_data.len() >= INDEX_SIZE {
        for i in 0..MAX_SEENS {
            let entry = entry_at(&arc_data, i);
            if !entry.is_empty() {
                sources.insert(i, Source::Keep(entry));
            }
        }
    }

    let mut any_added = false;
    for fname in files {
        let fname = fname.as_ref();
        if !fname.exists() {
            log::warn!("file not found: {}", fname.display());
            continue;
        }
        let base = fname
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(caps) = seen_index_re().captures(&base) else {
            log::warn!(
                "unable to add '{}': name must contain SEENxxxx (0000-9999)",
                fname.display()
            );
            continue;
        };
        let idx: usize = caps[1].parse().unwrap();
        sources.insert(idx, Source::File(fname.to_path_buf()));
        any_added = true;
    }

    if !any_added {
        log::warn!("no files to add");
        return Ok(());
    }

    rebuild(&arc_data, arc_name, &sources, opts)
}

/// Drop the selected slots from an archive. Removing everything leaves an
/// all-zero index in place of the data.
pub fn remove(arc_name: impl AsRef<Path>, ranges: &[usize], opts: &Options) -> Result<()> {
    let arc_name = arc_name.as_ref();
    let arc = Archive::load(arc_name)?;

    let mut sources: BTreeMap<usize, Source> = BTreeMap::new();
    let mut any_removed = false;

    for (i, entry) in arc.entries.iter().enumerate() {
        if entry.is_empty() {
            continue;
        }
        // selections from the range parser arrive sorted
        if ranges.binary_search(&i).is_ok() {
            any_removed = true;
        } else {
            sources.insert(i, Source::Keep(*entry));
        }
    }

    if !any_removed {
        log::info!("no files to remove");
        return Ok(());
    }
    if sources.is_empty() {
        log::warn!("all archive contents removed");
        return write_empty(arc_name);
    }

    rebuild(&arc.data, arc_name, &sources, opts)
}

enum Source {
    /// Keep the payload already present in the loaded archive.
    Keep(SeenEntry),
    /// Read (and compress if necessary) an external file.
    File(PathBuf),
}

/// Rewrite the archive: reserve the index, stream payloads in ascending
/// slot order, backpatch the index, then atomically replace the target.
/// The temporary file never survives a failure.
fn rebuild(
    arc: &BinBuffer,
    arc_name: &Path,
    sources: &BTreeMap<usize, Source>,
    opts: &Options,
) -> Result<()> {
    let tmp_name = PathBuf::from(format!("{}.tmp", arc_name.display()));

    let written = write_rebuild(arc, &tmp_name, sources, opts);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp_name);
        return Err(e);
    }

    if let Err(e) = std::fs::rename(&tmp_name, arc_name) {
        let _ = std::fs::remove_file(&tmp_name);
        return Err(e.into());
    }
    Ok(())
}

fn write_rebuild(
    arc: &BinBuffer,
    tmp_name: &Path,
    sources: &BTreeMap<usize, Source>,
    opts: &Options,
) -> Result<()> {
    let mut oc = std::fs::File::create(tmp_name)?;

    // reserve the index table; it is backpatched once offsets are known
    let mut index = vec![0u8; INDEX_SIZE];
    oc.write_all(&index)?;

    let mut current = INDEX_SIZE;
    for (&idx, source) in sources {
        let data: Vec<u8> = match source {
            Source::Keep(entry) => arc.sub(entry.offset, entry.length)?.to_vec(),
            Source::File(path) => match read_and_compress(path, opts) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("{}", e);
                    continue;
                }
            },
        };
        if data.is_empty() {
            continue;
        }

        oc.write_all(&data)?;
        index[idx * 8..idx * 8 + 4].copy_from_slice(&(current as u32).to_le_bytes());
        index[idx * 8 + 4..idx * 8 + 8].copy_from_slice(&(data.len() as u32).to_le_bytes());
        current += data.len();
    }

    oc.seek(SeekFrom::Start(0))?;
    oc.write_all(&index)?;
    oc.sync_all()?;
    Ok(())
}

fn read_and_compress(path: &Path, opts: &Options) -> Result<Vec<u8>> {
    let arr = BinBuffer::read_file(path)?;

    if !bytecode::is_bytecode(arr.as_slice(), 0) {
        return Err(Error::UnrecognisedFormat(format!(
            "unable to add '{}': not a bytecode file",
            path.display()
        )));
    }

    // already-compressed files pass through untouched
    if !bytecode::uncompressed_header(arr.read(0, 4)?) {
        return Ok(arr.into_vec());
    }

    Ok(rlcmp::compress(&arr, &opts.keys)?.into_vec())
}

/// Write an archive holding nothing: an all-zero index table.
pub fn write_empty(arc_name: impl AsRef<Path>) -> Result<()> {
    std::fs::write(arc_name, vec![0u8; INDEX_SIZE])?;
    Ok(())
}
