//! Rendering of disassembly results into source and resource files.
//!
//! Labels are assigned here: the pointer set is sorted and numbered from 1,
//! and every command sitting on a pointer target gets its label line. Dead
//! code after an unconditional jump is skipped until the next label or
//! force-unhidden command when suppression is on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rlkit_nls::{Decoder, Encoding, TextDecoder, UTF8_BOM};

use crate::disasm::DisassemblyResult;
use crate::types::{Command, Elem, EngineMode, Options};

/// Assign sequential label numbers (from 1) to sorted pointer offsets.
pub fn build_label_map(
    pointers: &std::collections::BTreeSet<usize>,
) -> HashMap<usize, usize> {
    pointers
        .iter()
        .enumerate()
        .map(|(i, &offset)| (offset, i + 1))
        .collect()
}

fn format_command(cmd: &Command, labels: &HashMap<usize, usize>, opts: &Options) -> String {
    let mut out = String::new();
    for elem in &cmd.repr {
        match elem {
            Elem::Str(s) | Elem::Store(s) => out.push_str(s),
            Elem::Pointer(offset) => match labels.get(offset) {
                Some(n) => out.push_str(&format!("@{}", n)),
                None => out.push_str(&format!("@unknown_{}", offset)),
            },
        }
    }

    if out.is_empty() {
        return out;
    }

    if opts.annotate {
        out = format!("{{-{:08x}-}} {}", cmd.offset, out);
    }
    if opts.show_opcodes && !cmd.opcode.is_empty() {
        out.push_str(" // ");
        out.push_str(&cmd.opcode);
    }
    out
}

/// Render the source file body.
pub fn render_source(
    result: &DisassemblyResult,
    file_name: &str,
    res_name: Option<&str>,
    opts: &Options,
) -> String {
    let labels = build_label_map(&result.pointers);
    let mut out = String::new();

    out.push_str(&format!(
        "{{-# cp {} #- Disassembled with rlkit -}}\n\n#file '{}'\n",
        opts.encoding.name(),
        file_name
    ));
    if let Some(res) = res_name {
        out.push_str(&format!("#resource '{}'\n", res));
    }
    out.push('\n');

    match result.mode {
        EngineMode::Avg2000 => out.push_str("#target AVG2000\n"),
        EngineMode::Kinetic => out.push_str("#target Kinetic\n"),
        EngineMode::RealLive => {}
    }

    // without a resource file the character table lives here
    if res_name.is_none() && !result.header.dramatis_personae.is_empty() {
        let decoder = Decoder::new(Encoding::ShiftJis);
        for name in &result.header.dramatis_personae {
            out.push_str(&format!("#character '{}'\n", decoder.decode(name)));
        }
        out.push('\n');
    }

    let mut skipping = false;
    for cmd in &result.commands {
        if let Some(n) = labels.get(&cmd.offset) {
            out.push_str(&format!("\n  @{}\n", n));
            skipping = false;
        }
        if cmd.unhide {
            skipping = false;
        }
        if !skipping && !cmd.hidden {
            let line = format_command(cmd, &labels, opts);
            if !line.is_empty() {
                out.push_str("    ");
                out.push_str(&line);
                out.push('\n');
            }
        }
        if opts.suppress_uncalled && cmd.is_jmp {
            skipping = true;
        }
    }

    out
}

/// Render the resource file body.
pub fn render_resources(result: &DisassemblyResult, file_name: &str, opts: &Options) -> String {
    let mut out = String::new();
    out.push_str(&format!("// Resources for {}\n\n", file_name));

    let decoder = Decoder::new(Encoding::ShiftJis);
    for name in &result.header.dramatis_personae {
        out.push_str(&format!("#character '{}'\n", decoder.decode(name)));
    }
    if !result.header.dramatis_personae.is_empty() {
        out.push('\n');
    }

    render_resources_into(&mut out, result, opts);
    out
}

fn render_resources_into(out: &mut String, result: &DisassemblyResult, opts: &Options) {
    for (i, s) in result.res_strs.iter().enumerate() {
        if opts.id_strings {
            out.push_str(&format!("<{:04}> {}\n", i, s));
        } else {
            out.push_str(s);
            out.push('\n');
        }
    }
}

/// Format a classic 16-bytes-per-row hex dump with an ASCII gutter.
pub fn hex_dump(data: &[u8], start: usize) -> String {
    let mut out = String::new();
    let mut i = start;
    while i < data.len() {
        let end = (i + 16).min(data.len());
        out.push_str(&format!("[{:08x}] ", i));
        for j in i..i + 16 {
            if j < end {
                out.push_str(&format!("{:02x} ", data[j]));
            } else {
                out.push_str("   ");
            }
        }
        out.push_str(" |");
        for &b in &data[i..end] {
            out.push(if (0x20..=0x7e).contains(&b) {
                b as char
            } else {
                '.'
            });
        }
        out.push_str("|\n");
        i += 16;
    }
    out
}

/// Count and measure non-empty resource strings.
pub fn source_info(result: &DisassemblyResult) -> (usize, usize) {
    let mut lines = 0;
    let mut bytes = 0;
    for s in &result.res_strs {
        if !s.is_empty() {
            lines += 1;
            bytes += s.len();
        }
    }
    (lines, bytes)
}

/// Writes disassembly artefacts to an output directory.
pub struct Writer {
    out_dir: PathBuf,
    opts: Options,
}

impl Writer {
    pub fn new(out_dir: impl AsRef<Path>, opts: Options) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
            opts,
        }
    }

    fn encode_out(&self, text: &str) -> Vec<u8> {
        let encoder = Decoder::new(self.opts.encoding);
        let mut bytes = Vec::new();
        if self.opts.bom && self.opts.encoding == Encoding::Utf8 {
            bytes.extend_from_slice(&UTF8_BOM);
        }
        bytes.extend_from_slice(&encoder.encode(text));
        bytes
    }

    /// Write the source file and, when strings are separated, the resource
    /// file beside it.
    pub fn write_source(&self, base_name: &str, result: &DisassemblyResult) -> Result<()> {
        std::fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("cannot create {}", self.out_dir.display()))?;

        let mut base = base_name.to_string();
        for ext in [".uncompressed", ".rl", ".rlc", ".TXT"] {
            if let Some(stripped) = base.strip_suffix(ext) {
                base = stripped.to_string();
            }
        }

        let separate = self.opts.separate_strings && !result.res_strs.is_empty();
        let res_file = format!("{}.{}", base, self.opts.encoding.res_ext());
        let res_name = separate.then_some(res_file.as_str());

        let source = render_source(result, base_name, res_name, &self.opts);
        let src_path = self.out_dir.join(format!("{}.{}", base, self.opts.src_ext));
        std::fs::write(&src_path, self.encode_out(&source))
            .with_context(|| format!("cannot write {}", src_path.display()))?;

        if separate {
            let res = render_resources(result, base_name, &self.opts);
            let res_path = self.out_dir.join(&res_file);
            std::fs::write(&res_path, self.encode_out(&res))
                .with_context(|| format!("cannot write {}", res_path.display()))?;
        }

        Ok(())
    }

    /// Write a hex dump of the raw bytecode.
    pub fn write_hex_dump(&self, base_name: &str, data: &[u8], start: usize) -> Result<()> {
        std::fs::create_dir_all(&self.out_dir)?;
        let base = base_name.rsplit_once('.').map_or(base_name, |(b, _)| b);
        let path = self.out_dir.join(format!("{}.hex", base));
        std::fs::write(&path, hex_dump(data, start))
            .with_context(|| format!("cannot write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommandKind;
    use std::collections::BTreeSet;

    fn result_with(commands: Vec<Command>, pointers: &[usize]) -> DisassemblyResult {
        use rlkit_core::binbuf::BinBuffer;
        use rlkit_core::bytecode::{read_full_header, MAGIC_KPRL};

        let mut buf = BinBuffer::new(0x1d0);
        buf.write(0, MAGIC_KPRL).unwrap();
        buf.put_u32(4, 10002).unwrap();
        buf.put_u32(0x08, 0x1c8).unwrap();
        buf.put_u32(0x14, 0x1c8).unwrap();
        buf.put_u32(0x20, 0x1d0).unwrap();

        DisassemblyResult {
            commands,
            res_strs: Vec::new(),
            pointers: pointers.iter().copied().collect(),
            mode: EngineMode::RealLive,
            version: crate::types::Version([1, 2, 7, 0]),
            header: read_full_header(&buf, false).unwrap(),
            error: None,
            uses_excl_kidoku: false,
            seen_map: None,
        }
    }

    fn cmd(offset: usize, text: &str) -> Command {
        Command {
            offset,
            repr: vec![Elem::Str(text.to_string())],
            ..Default::default()
        }
    }

    #[test]
    fn labels_are_sequential_over_sorted_offsets() {
        let pointers: BTreeSet<usize> = [100, 50, 200].into_iter().collect();
        let labels = build_label_map(&pointers);
        assert_eq!(labels[&50], 1);
        assert_eq!(labels[&100], 2);
        assert_eq!(labels[&200], 3);
    }

    #[test]
    fn pointer_elements_render_as_labels() {
        let command = Command {
            offset: 0,
            repr: vec![
                Elem::Str("goto(".to_string()),
                Elem::Pointer(50),
                Elem::Str(")".to_string()),
            ],
            ..Default::default()
        };
        let result = result_with(vec![command, cmd(50, "halt")], &[50]);
        let text = render_source(&result, "SEEN0001.TXT", None, &Options::default());
        assert!(text.contains("goto(@1)"), "{}", text);
        assert!(text.contains("\n  @1\n"), "{}", text);
    }

    #[test]
    fn suppression_hides_code_after_jump_until_label() {
        let mut halt = cmd(0, "halt");
        halt.is_jmp = true;
        let dead = cmd(1, "dead_op");
        let live = cmd(10, "live_op");

        let opts = Options {
            suppress_uncalled: true,
            ..Default::default()
        };
        let result = result_with(vec![halt, dead, live], &[10]);
        let text = render_source(&result, "x", None, &opts);
        assert!(!text.contains("dead_op"), "{}", text);
        assert!(text.contains("live_op"), "{}", text);

        // suppression off: everything prints
        let result = result_with(
            vec![
                {
                    let mut c = cmd(0, "halt");
                    c.is_jmp = true;
                    c
                },
                cmd(1, "dead_op"),
            ],
            &[],
        );
        let text = render_source(&result, "x", None, &Options::default());
        assert!(text.contains("dead_op"));
    }

    #[test]
    fn unhide_interrupts_suppression() {
        let mut halt = cmd(0, "halt");
        halt.is_jmp = true;
        let mut ep = cmd(3, "#entrypoint 001 // Z01");
        ep.unhide = true;
        ep.kind = CommandKind::Entrypoint;

        let opts = Options {
            suppress_uncalled: true,
            ..Default::default()
        };
        let result = result_with(vec![halt, cmd(1, "dead_op"), ep], &[]);
        let text = render_source(&result, "x", None, &opts);
        assert!(!text.contains("dead_op"));
        assert!(text.contains("#entrypoint 001"));
    }

    #[test]
    fn header_directives() {
        let mut result = result_with(vec![], &[]);
        result.mode = EngineMode::Avg2000;
        let text = render_source(&result, "SEEN0042.TXT", Some("SEEN0042.sjs"), &Options::default());
        assert!(text.starts_with("{-# cp cp932 #- Disassembled with rlkit -}"));
        assert!(text.contains("#file 'SEEN0042.TXT'"));
        assert!(text.contains("#resource 'SEEN0042.sjs'"));
        assert!(text.contains("#target AVG2000"));
    }

    #[test]
    fn resources_with_ids_and_characters() {
        let mut result = result_with(vec![], &[]);
        result.res_strs = vec!["first".to_string(), "second".to_string()];
        result.header.dramatis_personae = vec![b"Rin".to_vec()];

        let opts = Options {
            id_strings: true,
            ..Default::default()
        };
        let text = render_resources(&result, "SEEN0001.TXT", &opts);
        assert!(text.contains("#character 'Rin'"));
        assert!(text.contains("<0000> first"));
        assert!(text.contains("<0001> second"));
    }

    #[test]
    fn annotate_and_opcodes() {
        let mut command = cmd(0x42, "op<0:004:00007,0>(9)");
        command.opcode = "0:004:00007,0".to_string();
        let result = result_with(vec![command], &[]);
        let opts = Options {
            annotate: true,
            show_opcodes: true,
            ..Default::default()
        };
        let text = render_source(&result, "x", None, &opts);
        assert!(
            text.contains("{-00000042-} op<0:004:00007,0>(9) // 0:004:00007,0"),
            "{}",
            text
        );
    }

    #[test]
    fn hex_dump_format() {
        let data: Vec<u8> = (0..20).map(|i| b'A' + i).collect();
        let dump = hex_dump(&data, 0);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[00000000] 41 42 43"));
        assert!(lines[0].ends_with("|ABCDEFGHIJKLMNOP|"));
        // short row pads hex bytes and truncates the gutter
        assert!(lines[1].starts_with("[00000010] 51 52 53 54 "));
        assert!(lines[1].ends_with("|QRST|"));
    }

    #[test]
    fn source_info_counts_nonempty() {
        let mut result = result_with(vec![], &[]);
        result.res_strs = vec!["ab".to_string(), String::new(), "cde".to_string()];
        assert_eq!(source_info(&result), (2, 5));
    }
}
