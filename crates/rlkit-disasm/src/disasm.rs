//! The main disassembly loop.
//!
//! One pass over the code region classifies every byte sequence as a halt,
//! function call, assignment, debug marker, kidoku marker or displayed
//! text. Pointer targets are collected as encountered; labels are assigned
//! by the writer once the full set is known.

use std::collections::BTreeSet;

use anyhow::{Context, Result as AResult};
use rlkit_core::binbuf::BinBuffer;
use rlkit_core::bytecode::{self, FileHeader, HeaderVersion};
use rlkit_core::error::Result;
use rlkit_nls::{Decoder, Encoding, TextDecoder};

use crate::reader::Reader;
use crate::types::{
    Command, CommandKind, Elem, EngineMode, FuncFlag, JumpKind, Opcode, Options, SeenMap, Version,
};

/// Everything a single disassembly produces.
#[derive(Debug)]
pub struct DisassemblyResult {
    pub commands: Vec<Command>,
    /// Extracted text, in stream order.
    pub res_strs: Vec<String>,
    /// Offsets that need labels.
    pub pointers: BTreeSet<usize>,
    pub mode: EngineMode,
    pub version: Version,
    pub header: FileHeader,
    /// Mid-stream abort, recorded rather than propagated; the commands
    /// gathered up to that point are kept.
    pub error: Option<String>,
    pub uses_excl_kidoku: bool,
    pub seen_map: Option<SeenMap>,
}

/// Disassemble one decompressed bytecode file.
pub fn disassemble(arr: &BinBuffer, opts: &Options) -> Result<DisassemblyResult> {
    let hdr = bytecode::read_full_header(arr, true)?;

    let mode = opts.forced_target.unwrap_or(match hdr.version {
        HeaderVersion::V1 => EngineMode::Avg2000,
        HeaderVersion::V2 => EngineMode::RealLive,
    });

    let version = match mode {
        EngineMode::Avg2000 => Version([1, 0, 0, 0]),
        _ => Version([1, 2, 7, 0]),
    };

    let start = match opts.start_address {
        Some(addr) if addr > hdr.data_offset && addr < arr.len() => addr,
        _ => hdr.data_offset,
    };
    let end = match opts.end_address {
        Some(addr) if addr > start && addr < arr.len() => addr,
        _ => arr.len(),
    };

    let mut result = DisassemblyResult {
        commands: Vec::new(),
        res_strs: Vec::new(),
        pointers: BTreeSet::new(),
        mode,
        version,
        header: hdr,
        error: None,
        uses_excl_kidoku: false,
        seen_map: opts.make_map.then(SeenMap::default),
    };

    let mut reader = Reader::new(arr.as_slice(), start, end, mode);

    while !reader.at_end() {
        let at = reader.rel_pos();
        if let Err(e) = read_command(&mut reader, &mut result, opts) {
            let msg = format!("disassembly error at offset {:#08x}: {:#}", at + start, e);
            log::warn!("{}", msg);
            result.error = Some(msg);
            break;
        }
    }

    Ok(result)
}

fn push_str(cmd: &mut Command, s: impl Into<String>) {
    cmd.repr.push(Elem::Str(s.into()));
}

fn read_command(r: &mut Reader, result: &mut DisassemblyResult, opts: &Options) -> AResult<()> {
    let offset = r.rel_pos();
    let b = r.next()?;

    match b {
        0x00 => {
            let mut cmd = Command {
                offset,
                is_jmp: true,
                ..Default::default()
            };
            push_str(&mut cmd, "halt");
            result.commands.push(cmd);
        }

        b'#' => {
            let op_type = r.next()?;
            let module = r.next()?;
            let function = r.read_u16()?;
            let argc = r.read_u16()? as usize;
            let overload = r.next()?;
            let op = Opcode {
                op_type,
                module,
                function,
                overload,
            };
            read_function(r, result, offset, op, argc, opts)?;
        }

        b'$' => read_assignment(r, result, offset)?,

        b'\n' => {
            let line_no = r.int_for_mode()?;
            let mut cmd = Command {
                offset,
                hidden: !opts.read_debug_symbols,
                kind: CommandKind::DebugLine,
                line_no,
                ..Default::default()
            };
            push_str(&mut cmd, format!("#line {}", line_no));
            result.commands.push(cmd);
        }

        b',' => {
            let mut cmd = Command {
                offset,
                hidden: !opts.read_debug_symbols,
                kind: CommandKind::Debug,
                ..Default::default()
            };
            push_str(&mut cmd, ",");
            result.commands.push(cmd);
        }

        b'@' | b'!' => {
            if b == b'!' {
                result.uses_excl_kidoku = true;
            }
            let idx = r.int_for_mode()?;

            let kidoku = result
                .header
                .kidoku_lnums
                .get(idx.max(0) as usize)
                .copied()
                .unwrap_or(0);
            let entry = kidoku - 1_000_000;

            let mut cmd = Command {
                offset,
                ..Default::default()
            };
            if entry >= 0 {
                cmd.unhide = true;
                cmd.kind = CommandKind::Entrypoint;
                push_str(&mut cmd, format!("#entrypoint {:03} // Z{:02}", entry, entry));
                result.pointers.insert(offset);
                if let Some(map) = result.seen_map.as_mut() {
                    map.entry_points.push((offset, entry));
                }
            } else {
                cmd.hidden = !opts.read_debug_symbols;
                cmd.kind = CommandKind::Kidoku;
                push_str(&mut cmd, format!("{{- kidoku {:03} -}}", idx));
            }
            result.commands.push(cmd);
        }

        _ => {
            // anything else starts displayed text
            r.rollback(1);
            read_textout(r, result, offset, opts)?;
        }
    }

    Ok(())
}

fn read_function(
    r: &mut Reader,
    result: &mut DisassemblyResult,
    offset: usize,
    op: Opcode,
    argc: usize,
    opts: &Options,
) -> AResult<()> {
    let op_str = op.to_string();
    let mut cmd = Command {
        offset,
        opcode: op_str.clone(),
        ..Default::default()
    };

    let args = match read_func_args(r, argc) {
        Ok(args) => args,
        Err(_) => {
            // degrade to a placeholder and keep the stream moving
            push_str(&mut cmd, format!("op<{}>(?)", op_str));
            result.commands.push(cmd);
            return Ok(());
        }
    };

    // string constants in argument position can be hoisted into the
    // resource file as well
    let args: Vec<String> = args
        .into_iter()
        .map(|arg| {
            if opts.separate_all && arg.starts_with('"') {
                let idx = result.res_strs.len();
                result.res_strs.push(arg.trim_matches('"').to_string());
                format!("<res_{:04}>", idx)
            } else {
                arg
            }
        })
        .collect();

    match (op.module, op.function) {
        (1, 1) | (1, 3) => {
            let name = if op.function == 1 { "goto" } else { "gosub" };
            cmd.is_jmp = op.function == 1;
            emit_jump(&mut cmd, result, name, &args, offset, jump_kind(op.function));
        }
        (1, 5) | (1, 8) | (1, 9) | (1, 16) => {
            let name = match op.function {
                5 => "goto_if",
                8 => "goto_unless",
                9 => "gosub_if",
                _ => "gosub_unless",
            };
            emit_jump(&mut cmd, result, name, &args, offset, JumpKind::Conditional);
        }
        (5, 1) => {
            push_str(&mut cmd, "ret");
            cmd.is_jmp = true;
        }
        _ => match opts.registry.lookup(&op_str) {
            // a registry entry supplies the display name and may extend
            // the jump/store classification above
            Some(def) => {
                if def.has_flag(FuncFlag::PushStore) {
                    cmd.repr.push(Elem::Store("store = ".to_string()));
                }
                if def.has_flag(FuncFlag::IsJump) || def.has_flag(FuncFlag::IsRet) {
                    cmd.is_jmp = true;
                }
                if def.has_flag(FuncFlag::IsGoto) || def.has_flag(FuncFlag::IsCall) {
                    let kind = if def.has_flag(FuncFlag::IsGoto) {
                        JumpKind::Goto
                    } else {
                        JumpKind::Gosub
                    };
                    emit_jump(&mut cmd, result, &def.name, &args, offset, kind);
                } else if args.is_empty() {
                    push_str(&mut cmd, def.name.clone());
                } else {
                    push_str(&mut cmd, format!("{}({})", def.name, args.join(", ")));
                }
            }
            None => {
                let name = format!(
                    "op<{}:{}:{:05},{}>",
                    op.op_type,
                    opts.registry.module_name(op.module),
                    op.function,
                    op.overload
                );
                if args.is_empty() {
                    push_str(&mut cmd, name);
                } else {
                    push_str(&mut cmd, format!("{}({})", name, args.join(", ")));
                }
            }
        },
    }

    result.commands.push(cmd);
    Ok(())
}

fn jump_kind(function: u16) -> JumpKind {
    if function == 1 {
        JumpKind::Goto
    } else {
        JumpKind::Gosub
    }
}

/// Emit `name(args…)` with the final argument kept symbolic when it is a
/// plain offset, so the writer can swap a label in.
fn emit_jump(
    cmd: &mut Command,
    result: &mut DisassemblyResult,
    name: &str,
    args: &[String],
    offset: usize,
    kind: JumpKind,
) {
    if args.is_empty() {
        push_str(cmd, name);
        return;
    }

    let (target, rest) = args.split_last().unwrap();
    match target.parse::<usize>() {
        Ok(dest) => {
            result.pointers.insert(dest);
            if let Some(map) = result.seen_map.as_mut() {
                map.jumps.push((offset, dest, kind));
            }
            if rest.is_empty() {
                push_str(cmd, format!("{}(", name));
            } else {
                push_str(cmd, format!("{}({}, ", name, rest.join(", ")));
            }
            cmd.repr.push(Elem::Pointer(dest));
            push_str(cmd, ")");
        }
        Err(_) => {
            push_str(cmd, format!("{}({})", name, args.join(", ")));
        }
    }
}

fn read_func_args(r: &mut Reader, argc: usize) -> AResult<Vec<String>> {
    // parenthesised argument lists are the norm but not guaranteed
    if matches!(r.peek(), Ok(b'(')) {
        r.skip(1);
    }

    let mut args = Vec::with_capacity(argc);
    for i in 0..argc {
        let arg = r
            .get_data()
            .with_context(|| format!("argument {} of {}", i + 1, argc))?;
        args.push(arg);
    }

    if matches!(r.peek(), Ok(b')')) {
        r.skip(1);
    }
    Ok(args)
}

fn read_assignment(r: &mut Reader, result: &mut DisassemblyResult, offset: usize) -> AResult<()> {
    let dest = r.read_int_var()?;

    let op = match r.next()? {
        0x14 => "=",
        0x15 => "+=",
        0x16 => "-=",
        0x17 => "*=",
        0x18 => "/=",
        0x19 => "%=",
        0x1a => "&=",
        0x1b => "|=",
        0x1c => "^=",
        0x1d => "<<=",
        0x1e => ">>=",
        other => anyhow::bail!("unknown assignment operator {:#04x}", other),
    };

    // separator bytes around the source expression come and go
    let _ = r.expect(0x5c, "assignment");
    let src = r.get_expression()?;
    let _ = r.expect(0x5c, "assignment");

    let mut cmd = Command {
        offset,
        ..Default::default()
    };
    push_str(&mut cmd, format!("{} {} {}", dest, op, src));
    result.commands.push(cmd);
    Ok(())
}

fn is_shift_jis_lead(b: u8) -> bool {
    matches!(b, 0x81..=0x9f | 0xe0..=0xef | 0xf0..=0xfc)
}

fn is_textout_end(b: u8) -> bool {
    matches!(b, 0x00 | b'#' | b'$' | b'\n' | b',' | b'@' | b'!')
}

fn read_textout(
    r: &mut Reader,
    result: &mut DisassemblyResult,
    offset: usize,
    opts: &Options,
) -> AResult<()> {
    let mut text: Vec<u8> = Vec::new();

    while !r.at_end() {
        let Ok(b) = r.peek() else { break };
        if is_textout_end(b) {
            break;
        }
        r.skip(1);

        match b {
            // line break
            0x01 => text.extend_from_slice(b"\\n"),

            // wait for click
            0x02 => text.extend_from_slice(b"\\w"),

            // page break ends the run
            0x03 => {
                text.extend_from_slice(b"\\p");
                break;
            }

            // ruby annotation: base text, 0x05, gloss, 0x06
            0x04 => {
                text.extend_from_slice(b"{ruby ");
                while !r.at_end() {
                    let Ok(c) = r.next() else { break };
                    match c {
                        0x05 => text.extend_from_slice(b"}{"),
                        0x06 => {
                            text.push(b'}');
                            break;
                        }
                        _ if is_shift_jis_lead(c) && !r.at_end() => {
                            text.push(c);
                            text.push(r.next()?);
                        }
                        _ => text.push(c),
                    }
                }
            }

            _ if is_shift_jis_lead(b) => {
                text.push(b);
                if let Ok(trail) = r.next() {
                    text.push(trail);
                }
            }

            0x20..=0x7e => text.push(b),

            _ => {
                if opts.control_codes {
                    text.extend_from_slice(format!("\\x{{{:02x}}}", b).as_bytes());
                }
            }
        }
    }

    if text.is_empty() {
        return Ok(());
    }

    let decoded = decode_text(&text, opts);

    let res_idx = result.res_strs.len();
    result.res_strs.push(decoded.clone());

    let mut cmd = Command {
        offset,
        kind: CommandKind::Textout,
        res_idx: Some(res_idx),
        ..Default::default()
    };
    if opts.separate_strings {
        push_str(&mut cmd, format!("<res_{:04}>", res_idx));
    } else {
        push_str(&mut cmd, format!("'{}'", decoded));
    }
    result.commands.push(cmd);
    Ok(())
}

fn decode_text(bytes: &[u8], opts: &Options) -> String {
    if opts.raw_strings {
        // no encoding pass: keep ASCII, escape the rest
        let mut out = String::with_capacity(bytes.len());
        for &b in bytes {
            if b.is_ascii() {
                out.push(b as char);
            } else {
                out.push_str(&format!("\\x{{{:02x}}}", b));
            }
        }
        out
    } else {
        Decoder::new(Encoding::ShiftJis).decode(bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlkit_core::bytecode::MAGIC_KPRL;

    /// Wrap a code stream in a minimal V2 file.
    fn with_header(code: &[u8]) -> BinBuffer {
        with_header_kidoku(code, &[])
    }

    fn with_header_kidoku(code: &[u8], kidoku: &[i32]) -> BinBuffer {
        let data_offset = 0x1d0 + kidoku.len() * 4;
        let mut buf = BinBuffer::new(data_offset + code.len());
        buf.write(0, MAGIC_KPRL).unwrap();
        buf.put_u32(4, 10002).unwrap();
        buf.put_u32(0x08, 0x1d0).unwrap();
        buf.put_u32(0x0c, kidoku.len() as u32).unwrap();
        buf.put_u32(0x14, 0x1c8).unwrap();
        buf.put_u32(0x18, 0).unwrap();
        buf.put_u32(0x20, data_offset as u32).unwrap();
        buf.put_u32(0x24, code.len() as u32).unwrap();
        buf.put_u32(0x28, 0).unwrap();
        for (i, &k) in kidoku.iter().enumerate() {
            buf.put_i32(0x1d0 + i * 4, k).unwrap();
        }
        buf.write(data_offset, code).unwrap();
        buf
    }

    fn run(code: &[u8]) -> DisassemblyResult {
        disassemble(&with_header(code), &Options::default()).unwrap()
    }

    #[test]
    fn halt_is_a_jump() {
        let result = run(&[0x00]);
        assert_eq!(result.commands.len(), 1);
        assert_eq!(result.commands[0].text(), "halt");
        assert!(result.commands[0].is_jmp);
        assert!(result.error.is_none());
    }

    #[test]
    fn goto_with_immediate_target() {
        // '#' type module fn(16) argc(16) overload, then imm 1000
        let code = [
            b'#', 0, 1, 1, 0, 1, 0, 0, 0xff, 0xe8, 0x03, 0x00, 0x00,
        ];
        let result = run(&code);
        assert_eq!(result.commands.len(), 1);
        let cmd = &result.commands[0];
        assert_eq!(cmd.text(), "goto(1000)");
        assert!(cmd.is_jmp);
        assert!(result.pointers.contains(&1000));
    }

    #[test]
    fn gosub_is_not_a_jump() {
        let code = [
            b'#', 0, 1, 3, 0, 1, 0, 0, 0xff, 0x64, 0x00, 0x00, 0x00,
        ];
        let result = run(&code);
        let cmd = &result.commands[0];
        assert_eq!(cmd.text(), "gosub(100)");
        assert!(!cmd.is_jmp);
        assert!(result.pointers.contains(&100));
    }

    #[test]
    fn conditional_jump_names() {
        // goto_unless(cond, target): module 1 fn 8, argc 2
        let mut code = vec![b'#', 0, 1, 8, 0, 2, 0, 0];
        code.extend([0xff, 0x05, 0, 0, 0]); // cond: 5
        code.extend([0xff, 0x2a, 0, 0, 0]); // target: 42
        let result = run(&code);
        assert_eq!(result.commands[0].text(), "goto_unless(5, 42)");
        assert!(!result.commands[0].is_jmp);
        assert!(result.pointers.contains(&42));
    }

    #[test]
    fn ret_is_a_jump() {
        let code = [b'#', 0, 5, 1, 0, 0, 0, 0];
        let result = run(&code);
        assert_eq!(result.commands[0].text(), "ret");
        assert!(result.commands[0].is_jmp);
    }

    #[test]
    fn generic_op_formatting() {
        // module 4 fn 7, one arg
        let mut code = vec![b'#', 1, 4, 7, 0, 1, 0, 2];
        code.extend([0xff, 0x09, 0, 0, 0]);
        let result = run(&code);
        assert_eq!(result.commands[0].text(), "op<1:004:00007,2>(9)");
    }

    #[test]
    fn registry_names_generic_ops() {
        let mut code = vec![b'#', 1, 4, 7, 0, 1, 0, 2];
        code.extend([0xff, 0x09, 0, 0, 0]);

        let mut opts = Options::default();
        opts.registry.register(
            "1:004:00007,2",
            crate::types::FuncDef {
                name: "wait".to_string(),
                flags: Vec::new(),
            },
        );
        let result = disassemble(&with_header(&code), &opts).unwrap();
        assert_eq!(result.commands[0].text(), "wait(9)");
    }

    #[test]
    fn registry_flags_classify_ops() {
        let mut code = vec![b'#', 1, 4, 7, 0, 1, 0, 2];
        code.extend([0xff, 0x09, 0, 0, 0]);

        let mut opts = Options::default();
        opts.registry.register(
            "1:004:00007,2",
            crate::types::FuncDef {
                name: "rnd".to_string(),
                flags: vec![FuncFlag::PushStore, FuncFlag::IsJump],
            },
        );
        let result = disassemble(&with_header(&code), &opts).unwrap();
        let cmd = &result.commands[0];
        assert_eq!(cmd.text(), "store = rnd(9)");
        assert!(matches!(cmd.repr[0], Elem::Store(_)));
        assert!(cmd.is_jmp);
    }

    #[test]
    fn registry_call_flag_collects_pointer() {
        let mut code = vec![b'#', 0, 2, 12, 0, 1, 0, 0];
        code.extend([0xff, 0xe8, 0x03, 0x00, 0x00]);

        let mut opts = Options::default();
        opts.registry.register(
            "0:002:00012,0",
            crate::types::FuncDef {
                name: "farcall".to_string(),
                flags: vec![FuncFlag::IsCall],
            },
        );
        let result = disassemble(&with_header(&code), &opts).unwrap();
        assert_eq!(result.commands[0].text(), "farcall(1000)");
        assert!(result.pointers.contains(&1000));
        assert!(!result.commands[0].is_jmp);
    }

    #[test]
    fn registry_module_names_show_in_fallback() {
        let mut code = vec![b'#', 1, 4, 7, 0, 1, 0, 2];
        code.extend([0xff, 0x09, 0, 0, 0]);

        let mut opts = Options::default();
        opts.registry.register_module(4, "grp");
        let result = disassemble(&with_header(&code), &opts).unwrap();
        assert_eq!(result.commands[0].text(), "op<1:grp:00007,2>(9)");
    }

    #[test]
    fn separate_all_hoists_string_args() {
        let mut code = vec![b'#', 0, 10, 0, 0, 1, 0, 0];
        code.extend_from_slice(b"\"hi\"");
        let opts = Options {
            separate_all: true,
            ..Default::default()
        };
        let result = disassemble(&with_header(&code), &opts).unwrap();
        assert_eq!(result.res_strs, vec!["hi".to_string()]);
        assert_eq!(result.commands[0].text(), "op<0:010:00000,0>(<res_0000>)");
    }

    #[test]
    fn malformed_args_degrade_to_placeholder() {
        // argc 1 but the stream ends immediately
        let code = vec![b'#', 0, 4, 7, 0, 1, 0, 0];
        let result = run(&code);
        assert_eq!(result.commands[0].text(), "op<0:004:00007,0>(?)");
        assert!(result.error.is_none());
    }

    #[test]
    fn assignment() {
        // $ intA[0] = 5
        let mut code = vec![b'$', 0x00, b'['];
        code.extend([0xff, 0, 0, 0, 0]);
        code.push(b']');
        code.push(0x14);
        code.push(0x5c);
        code.extend([0xff, 5, 0, 0, 0]);
        code.push(0x5c);
        let result = run(&code);
        assert_eq!(result.commands[0].text(), "intA[0] = 5");
    }

    #[test]
    fn compound_assignment_without_separators() {
        let mut code = vec![b'$', 0x02, b'['];
        code.extend([0xff, 3, 0, 0, 0]);
        code.push(b']');
        code.push(0x15); // +=
        code.extend([0xff, 7, 0, 0, 0]);
        let result = run(&code);
        assert_eq!(result.commands[0].text(), "intC[3] += 7");
    }

    #[test]
    fn debug_line_hidden_by_default() {
        let code = [b'\n', 0x2a, 0x00];
        let result = run(&code);
        assert_eq!(result.commands[0].text(), "#line 42");
        assert!(result.commands[0].hidden);

        let opts = Options {
            read_debug_symbols: true,
            ..Default::default()
        };
        let result = disassemble(&with_header(&code), &opts).unwrap();
        assert!(!result.commands[0].hidden);
    }

    #[test]
    fn kidoku_and_entrypoint() {
        // kidoku 0 is an ordinary line, kidoku 1 encodes entrypoint 3
        let code = [b'@', 0x00, 0x00, b'@', 0x01, 0x00];
        let result =
            disassemble(&with_header_kidoku(&code, &[55, 1_000_003]), &Options::default())
                .unwrap();

        assert_eq!(result.commands.len(), 2);
        assert!(result.commands[0].hidden);
        assert_eq!(result.commands[0].kind, CommandKind::Kidoku);

        let ep = &result.commands[1];
        assert_eq!(ep.kind, CommandKind::Entrypoint);
        assert!(ep.unhide);
        assert_eq!(ep.text(), "#entrypoint 003 // Z03");
        assert!(result.pointers.contains(&ep.offset));
        assert!(!result.uses_excl_kidoku);
    }

    #[test]
    fn excl_kidoku_marker_is_recorded() {
        let code = [b'!', 0x00, 0x00];
        let result =
            disassemble(&with_header_kidoku(&code, &[7]), &Options::default()).unwrap();
        assert!(result.uses_excl_kidoku);
    }

    #[test]
    fn textout_plain_ascii() {
        let code = b"Hello world.\x00";
        let result = run(code);
        assert_eq!(result.res_strs, vec!["Hello world.".to_string()]);
        let cmd = &result.commands[0];
        assert_eq!(cmd.kind, CommandKind::Textout);
        assert_eq!(cmd.res_idx, Some(0));
        assert_eq!(cmd.text(), "<res_0000>");
        // the terminating halt follows
        assert_eq!(result.commands[1].text(), "halt");
    }

    #[test]
    fn textout_control_sequence() {
        let code = b"Hi\x01\x02\x03trailing\x00";
        let result = run(code);
        // the page break terminates the run; the rest is a second textout
        assert_eq!(result.res_strs[0], "Hi\\n\\w\\p");
        assert_eq!(result.res_strs[1], "trailing");
    }

    #[test]
    fn textout_inlines_without_separate_strings() {
        let opts = Options {
            separate_strings: false,
            ..Default::default()
        };
        let result = disassemble(&with_header(b"abc\x00"), &opts).unwrap();
        assert_eq!(result.commands[0].text(), "'abc'");
    }

    #[test]
    fn textout_shift_jis_pair() {
        // "あ" in CP932 is 0x82 0xa0
        let code = [0x82, 0xa0, 0x00];
        let result = run(&code);
        assert_eq!(result.res_strs, vec!["あ".to_string()]);
    }

    #[test]
    fn textout_ruby_group() {
        let mut code = Vec::new();
        code.push(0x04);
        code.extend_from_slice(b"base");
        code.push(0x05);
        code.extend_from_slice(b"gloss");
        code.push(0x06);
        code.push(0x00);
        let result = run(&code);
        assert_eq!(result.res_strs, vec!["{ruby base}{gloss}".to_string()]);
    }

    #[test]
    fn textout_control_codes_toggle() {
        let code = [b'a', 0x1f, b'b', 0x00];
        let result = run(&code);
        assert_eq!(result.res_strs[0], "a\\x{1f}b");

        let opts = Options {
            control_codes: false,
            ..Default::default()
        };
        let result = disassemble(&with_header(&code), &opts).unwrap();
        assert_eq!(result.res_strs[0], "ab");
    }

    #[test]
    fn error_is_captured_not_propagated() {
        // a '$' with garbage after it cannot parse as an assignment
        let code = [b'a', 0x00, b'$', 0xfe, 0xfe];
        let result = run(&code);
        assert!(result.error.is_some());
        // commands before the bad byte survive
        assert_eq!(result.res_strs, vec!["a".to_string()]);
    }

    #[test]
    fn commands_are_in_offset_order() {
        let code = b"one\x00two\x00three\x00";
        let result = run(code);
        let offsets: Vec<usize> = result.commands.iter().map(|c| c.offset).collect();
        let mut sorted = offsets.clone();
        sorted.sort_unstable();
        assert_eq!(offsets, sorted);
    }
}
