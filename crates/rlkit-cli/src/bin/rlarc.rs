//! Archive and disassembly front end for RealLive-family games.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use rlkit_core::archive::{self, Options as ArcOptions};
use rlkit_core::binbuf::BinBuffer;
use rlkit_core::bytecode;
use rlkit_core::gamedef;
use rlkit_core::ranges::parse_ranges;
use rlkit_core::rlcmp;
use rlkit_disasm::types::EngineMode;
use rlkit_disasm::{disassemble, Options as DisOptions, Writer};
use rlkit_nls::Encoding;

#[derive(Parser, Debug)]
#[command(version, about = "RealLive archiver and disassembler")]
struct Args {
    /// Game identifier selecting per-game XOR keys (e.g. LB, CFV, SNOW)
    #[arg(short = 'G', long, global = true, default_value = "")]
    game: String,

    /// YAML file with additional game keys
    #[arg(long, global = true)]
    key_file: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, global = true, default_value = ".")]
    output: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List archive contents with sizes and ratios
    List {
        archive: PathBuf,
        /// Slot selectors like 42, 5-8, !3
        ranges: Vec<String>,
    },

    /// Show the raw index structure of an archive
    Info { archive: PathBuf },

    /// Extract slots verbatim (still compressed) as .rlc files
    Break {
        archive: PathBuf,
        ranges: Vec<String>,
    },

    /// Extract and decompress slots as .rl files
    Extract {
        archive: PathBuf,
        ranges: Vec<String>,
    },

    /// Compress standalone uncompressed bytecode files
    Pack { files: Vec<PathBuf> },

    /// Add bytecode files to an archive (created if absent)
    Add {
        archive: PathBuf,
        files: Vec<PathBuf>,
    },

    /// Remove slots from an archive
    Remove {
        archive: PathBuf,
        ranges: Vec<String>,
    },

    /// Disassemble an archive or standalone bytecode files
    Disasm(DisasmArgs),
}

#[derive(clap::Args, Debug)]
struct DisasmArgs {
    /// An archive (followed by slot selectors) or bytecode files
    inputs: Vec<String>,

    /// Output text encoding (cp932, euc, utf8)
    #[arg(short, long, default_value = "cp932")]
    encoding: Encoding,

    /// Write a UTF-8 BOM
    #[arg(long)]
    bom: bool,

    /// Keep strings inline instead of a separate resource file
    #[arg(short = 's', long)]
    single_file: bool,

    /// Separate all strings, not just displayed text
    #[arg(short = 'S', long)]
    separate_all: bool,

    /// Prefix resource strings with <NNNN> identifiers
    #[arg(long)]
    id_strings: bool,

    /// Hide code that follows unconditional jumps
    #[arg(short = 'u', long)]
    suppress_uncalled: bool,

    /// Annotate commands with their offsets
    #[arg(short = 'n', long)]
    annotate: bool,

    /// Don't emit control-code escapes in text
    #[arg(short = 'r', long)]
    no_control_codes: bool,

    /// Read debug symbols (#line directives, kidoku comments)
    #[arg(short = 'g', long)]
    debug_symbols: bool,

    /// Force the target engine (RealLive, AVG2000, Kinetic)
    #[arg(short = 't', long)]
    target: Option<EngineMode>,

    /// Source file extension
    #[arg(long, default_value = "org")]
    ext: String,

    /// Append opcode annotations
    #[arg(long)]
    opcodes: bool,

    /// Also write a hex dump per input
    #[arg(long)]
    hexdump: bool,

    /// Escape text bytes instead of decoding them
    #[arg(long)]
    raw_strings: bool,

    /// Record entry points and jump targets
    #[arg(long)]
    map: bool,
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
    let keys = gamedef::resolve_keys(&args.game, args.key_file.as_deref())?;
    let opts = ArcOptions {
        out_dir: args.output.clone(),
        keys,
    };

    match args.command {
        Command::List { archive, ranges } => {
            archive::list(archive, &parse_ranges(&ranges)?)?;
        }
        Command::Info { archive } => info(&archive)?,
        Command::Break { archive, ranges } => {
            archive::break_out(archive, &parse_ranges(&ranges)?, &opts)?;
        }
        Command::Extract { archive, ranges } => {
            archive::extract(archive, &parse_ranges(&ranges)?, &opts)?;
        }
        Command::Pack { files } => archive::pack(&files, &opts)?,
        Command::Add { archive, files } => {
            if files.is_empty() {
                bail!("add requires at least one file");
            }
            archive::add(archive, &files, &opts)?;
        }
        Command::Remove { archive, ranges } => {
            if ranges.is_empty() {
                bail!("remove requires slot selectors");
            }
            archive::remove(archive, &parse_ranges(&ranges)?, &opts)?;
        }
        Command::Disasm(dis) => disasm(dis, &opts)?,
    }
    Ok(())
}

fn info(path: &std::path::Path) -> Result<()> {
    let arc = archive::Archive::load(path)?;
    println!(
        "Archive: {} ({} entries)\n",
        path.display(),
        arc.count
    );
    println!(
        "{:<16} {:>8} {:>10} {:>10} {:>7}",
        "File", "Index", "Offset", "Length", "Ratio"
    );
    println!("{}", "-".repeat(55));

    for (i, entry) in arc.entries.iter().enumerate() {
        if entry.is_empty() {
            continue;
        }
        let name = format!("SEEN{:04}.TXT", i);
        let Some(sub) = arc.subfile(i) else { continue };
        match bytecode::read_file_header(&BinBuffer::from_vec(sub.to_vec()), true) {
            Ok(hdr) => {
                let unc = hdr.uncompressed_size + hdr.data_offset;
                match hdr.compressed_size {
                    Some(comp) => {
                        let cmp = comp + hdr.data_offset;
                        println!(
                            "{:<16} {:>8} {:>10} {:>10} {:>6.1}%",
                            name,
                            i,
                            entry.offset,
                            entry.length,
                            cmp as f64 / unc as f64 * 100.0
                        );
                    }
                    None => println!(
                        "{:<16} {:>8} {:>10} {:>10}",
                        name, i, entry.offset, entry.length
                    ),
                }
            }
            Err(_) => println!(
                "{:<16} {:>8} {:>10} {:>10}  [error]",
                name, i, entry.offset, entry.length
            ),
        }
    }
    Ok(())
}

fn build_options(dis: &DisasmArgs) -> DisOptions {
    DisOptions {
        separate_strings: !dis.single_file,
        separate_all: dis.separate_all,
        id_strings: dis.id_strings,
        read_debug_symbols: dis.debug_symbols,
        annotate: dis.annotate,
        control_codes: !dis.no_control_codes,
        suppress_uncalled: dis.suppress_uncalled,
        raw_strings: dis.raw_strings,
        make_map: dis.map,
        show_opcodes: dis.opcodes,
        hex_dump: dis.hexdump,
        forced_target: dis.target,
        src_ext: dis.ext.clone(),
        encoding: dis.encoding,
        bom: dis.bom,
        ..Default::default()
    }
}

fn disasm(dis: DisasmArgs, opts: &ArcOptions) -> Result<()> {
    if dis.inputs.is_empty() {
        bail!("disasm requires an archive or bytecode files");
    }

    let dis_opts = build_options(&dis);
    let writer = Writer::new(&opts.out_dir, dis_opts.clone());

    let first = PathBuf::from(&dis.inputs[0]);
    if archive::is_archive(&first) {
        let arc = archive::Archive::load(&first)?;
        let ranges = parse_ranges(&dis.inputs[1..])?;

        for i in ranges {
            let Some(sub) = arc.subfile(i) else { continue };
            let name = format!("SEEN{:04}.TXT", i);
            log::info!("disassembling {}", name);
            if let Err(e) = disasm_one(sub.to_vec(), &name, opts, &dis_opts, &writer) {
                log::warn!("{}: {:#}", name, e);
            }
        }
        return Ok(());
    }

    for input in &dis.inputs {
        let path = PathBuf::from(input);
        let data = std::fs::read(&path)
            .with_context(|| format!("cannot read '{}'", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.clone());
        if let Err(e) = disasm_one(data, &name, opts, &dis_opts, &writer) {
            log::warn!("{}: {:#}", name, e);
        }
    }
    Ok(())
}

fn disasm_one(
    data: Vec<u8>,
    name: &str,
    opts: &ArcOptions,
    dis_opts: &DisOptions,
    writer: &Writer,
) -> Result<()> {
    let mut buf = BinBuffer::from_vec(data);

    if buf.len() >= 4 && !bytecode::uncompressed_header(buf.read(0, 4)?) {
        buf = rlcmp::decompress(buf, &opts.keys, true).context("decompression failed")?;
    }

    let result = disassemble(&buf, dis_opts).context("disassembly failed")?;
    if let Some(err) = &result.error {
        log::warn!("{}: {}", name, err);
    }

    writer.write_source(name, &result)?;
    if dis_opts.hex_dump {
        writer.write_hex_dump(name, buf.as_slice(), result.header.data_offset)?;
    }
    Ok(())
}
