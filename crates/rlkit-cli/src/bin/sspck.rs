//! SiglusEngine scene package front end.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use rlkit_siglus::{dump_ss, inject_ss, keys, pck, render_dump};

#[derive(Parser, Debug)]
#[command(version, about = "SiglusEngine Scene.pck and .ss string tool")]
struct Args {
    /// YAML file with additional game keys
    #[arg(long, global = true)]
    key_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract all .ss files and section dumps from a package
    Extract {
        pck: PathBuf,
        game: String,
        out_dir: PathBuf,
    },

    /// Rebuild a package from an extraction directory
    Rebuild {
        input_dir: PathBuf,
        game: String,
        /// Value for the undocumented trailing header word (hex or decimal)
        wtf: String,
        out: PathBuf,
    },

    /// Dump the strings of one .ss file as tab-separated text
    Dump { ss: PathBuf, out: PathBuf },

    /// Dump every .ss file in a directory
    DumpAll { ss_dir: PathBuf, out_dir: PathBuf },

    /// Inject translated strings into one .ss file
    Inject {
        ss: PathBuf,
        tsv: PathBuf,
        out: PathBuf,
    },

    /// Inject translations for every .tsv in a directory
    InjectAll {
        ss_dir: PathBuf,
        tsv_dir: PathBuf,
        out_dir: PathBuf,
    },

    /// List the game names in the built-in key registry
    Games,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let key_file = args.key_file.as_deref();

    match args.command {
        Command::Extract { pck: path, game, out_dir } => {
            let key = keys::resolve_key(&game, key_file)?;
            pck::extract_pck(&path, &key, &out_dir)?;
            println!("extracted to {}", out_dir.display());
        }

        Command::Rebuild {
            input_dir,
            game,
            wtf,
            out,
        } => {
            let key = keys::resolve_key(&game, key_file)?;
            let wtf = parse_u32(&wtf)?;
            pck::rebuild_pck(&input_dir, &key, wtf, &out)?;
            println!("rebuilt {}", out.display());
        }

        Command::Dump { ss, out } => {
            dump_one(&ss, &out)?;
            println!("dumped {}", out.display());
        }

        Command::DumpAll { ss_dir, out_dir } => {
            std::fs::create_dir_all(&out_dir)?;
            let mut count = 0;
            for entry in std::fs::read_dir(&ss_dir)? {
                let path = entry?.path();
                if !has_ext(&path, "ss") {
                    continue;
                }
                let out = out_dir.join(with_ext(&path, "tsv"));
                if let Err(e) = dump_one(&path, &out) {
                    log::warn!("{}: {:#}", path.display(), e);
                    continue;
                }
                count += 1;
            }
            println!("dumped {} files to {}", count, out_dir.display());
        }

        Command::Inject { ss, tsv, out } => {
            inject_one(&ss, &tsv, &out)?;
            println!("injected {}", out.display());
        }

        Command::InjectAll {
            ss_dir,
            tsv_dir,
            out_dir,
        } => {
            std::fs::create_dir_all(&out_dir)?;
            let mut count = 0;
            for entry in std::fs::read_dir(&tsv_dir)? {
                let path = entry?.path();
                if !has_ext(&path, "tsv") {
                    continue;
                }
                let ss = ss_dir.join(with_ext(&path, "ss"));
                if !ss.exists() {
                    log::warn!("no matching .ss for {}", path.display());
                    continue;
                }
                let out = out_dir.join(with_ext(&path, "ss"));
                if let Err(e) = inject_one(&ss, &path, &out) {
                    log::warn!("{}: {:#}", path.display(), e);
                    continue;
                }
                count += 1;
            }
            println!("injected {} files into {}", count, out_dir.display());
        }

        Command::Games => {
            for name in keys::game_names() {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

fn dump_one(ss: &Path, out: &Path) -> Result<()> {
    let buf = std::fs::read(ss).with_context(|| format!("cannot read {}", ss.display()))?;
    let lines = dump_ss(&buf)?;
    let body = format!("index\toriginal\ttranslation\n{}", render_dump(&lines));
    std::fs::write(out, body)?;
    Ok(())
}

fn inject_one(ss: &Path, tsv: &Path, out: &Path) -> Result<()> {
    let buf = std::fs::read(ss).with_context(|| format!("cannot read {}", ss.display()))?;
    let translations = read_tsv(tsv)?;
    let patched = inject_ss(&buf, &translations)?;
    std::fs::write(out, patched)?;
    Ok(())
}

/// Parse `index \t original \t translation` rows; rows with an empty
/// translation column are skipped.
fn read_tsv(path: &Path) -> Result<HashMap<usize, String>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;

    let mut translations = HashMap::new();
    for (lineno, line) in text.lines().enumerate() {
        if lineno == 0 || line.trim().is_empty() {
            continue; // header row
        }
        let mut cols = line.splitn(3, '\t');
        let idx = cols.next().unwrap_or_default();
        let _original = cols.next();
        let Some(translation) = cols.next() else { continue };
        if translation.is_empty() {
            continue;
        }
        let idx: usize = idx
            .trim()
            .parse()
            .with_context(|| format!("bad index on line {}", lineno + 1))?;
        let unescaped = translation.replace("\\n", "\n").replace("\\t", "\t");
        translations.insert(idx, unescaped);
    }

    if translations.is_empty() {
        bail!("no translations found in {}", path.display());
    }
    Ok(translations)
}

fn parse_u32(s: &str) -> Result<u32> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.with_context(|| format!("not a number: {}", s))
}

fn has_ext(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

fn with_ext(path: &Path, ext: &str) -> PathBuf {
    PathBuf::from(path.file_stem().unwrap_or_default()).with_extension(ext)
}
