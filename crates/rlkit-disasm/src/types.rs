//! Shared types of the disassembler: engine modes, opcodes, commands and
//! the options block.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rlkit_nls::Encoding;

/// Target engine family. The reader only varies in one dimension between
/// these: AVG2000 stores loop counters as 32-bit, the others as 16-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    RealLive,
    Avg2000,
    Kinetic,
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineMode::RealLive => "RealLive",
            EngineMode::Avg2000 => "AVG2000",
            EngineMode::Kinetic => "Kinetic",
        };
        f.write_str(s)
    }
}

impl FromStr for EngineMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reallive" | "2" => Ok(EngineMode::RealLive),
            "avg2000" | "avg2k" | "1" => Ok(EngineMode::Avg2000),
            "kinetic" | "3" => Ok(EngineMode::Kinetic),
            _ => anyhow::bail!("unknown target: {}", s),
        }
    }
}

/// Four-part engine version, printed with trailing zero parts elided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version(pub [u16; 4]);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        if c == 0 && d == 0 {
            write!(f, "{}.{}", a, b)
        } else if d == 0 {
            write!(f, "{}.{}.{}", a, b, c)
        } else {
            write!(f, "{}.{}.{}.{}", a, b, c, d)
        }
    }
}

/// One bytecode instruction identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode {
    pub op_type: u8,
    pub module: u8,
    pub function: u16,
    pub overload: u8,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:03}:{:05},{}",
            self.op_type, self.module, self.function, self.overload
        )
    }
}

/// An element of a command's textual representation. Pointers stay
/// symbolic until write time, when the full pointer set is known and
/// labels can be assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Elem {
    Str(String),
    Pointer(usize),
    Store(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    #[default]
    Normal,
    DebugLine,
    Debug,
    Kidoku,
    Entrypoint,
    Textout,
}

/// One disassembled instruction.
#[derive(Debug, Clone, Default)]
pub struct Command {
    /// Byte offset relative to the start of the code section.
    pub offset: usize,
    pub repr: Vec<Elem>,
    /// Hidden from output (debug markers and the like).
    pub hidden: bool,
    /// Force visibility back on (entrypoints).
    pub unhide: bool,
    /// Unconditional transfer; enables dead-code suppression after it.
    pub is_jmp: bool,
    pub kind: CommandKind,
    pub opcode: String,
    pub line_no: i32,
    pub res_idx: Option<usize>,
}

impl Command {
    /// Label-free rendering; pointers print their raw target offsets.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for elem in &self.repr {
            match elem {
                Elem::Str(s) | Elem::Store(s) => out.push_str(s),
                Elem::Pointer(offset) => out.push_str(&offset.to_string()),
            }
        }
        out
    }
}

/// Disassembler options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Write strings to a separate resource file.
    pub separate_strings: bool,
    /// Separate all strings, not just textout.
    pub separate_all: bool,
    /// Prefix resource strings with `<NNNN>` identifiers.
    pub id_strings: bool,
    /// Include #line directives and debug separators.
    pub read_debug_symbols: bool,
    /// Annotate commands with their offsets.
    pub annotate: bool,
    /// Emit `\x{HH}` escapes for unknown control bytes in text.
    pub control_codes: bool,
    /// Hide code that follows an unconditional jump until a label.
    pub suppress_uncalled: bool,
    /// Don't decode text; escape everything outside ASCII instead.
    pub raw_strings: bool,
    /// Record a map of entry points and jump targets.
    pub make_map: bool,
    /// Append opcode annotations to commands.
    pub show_opcodes: bool,
    /// Also produce a hex dump.
    pub hex_dump: bool,
    pub forced_target: Option<EngineMode>,
    pub start_address: Option<usize>,
    pub end_address: Option<usize>,
    /// Source file extension.
    pub src_ext: String,
    /// Output text encoding; also decides the resource file extension.
    pub encoding: Encoding,
    /// Write a UTF-8 BOM (UTF-8 output only).
    pub bom: bool,
    /// Known function names, pre-built by the caller.
    pub registry: FuncRegistry,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            separate_strings: true,
            separate_all: false,
            id_strings: false,
            read_debug_symbols: false,
            annotate: false,
            control_codes: true,
            suppress_uncalled: false,
            raw_strings: false,
            make_map: false,
            show_opcodes: false,
            hex_dump: false,
            forced_target: None,
            start_address: None,
            end_address: None,
            src_ext: "org".to_string(),
            encoding: Encoding::ShiftJis,
            bom: false,
            registry: FuncRegistry::default(),
        }
    }
}

/// Behavioural flags a registry entry can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncFlag {
    /// The call leaves its result in the store register.
    PushStore,
    /// Control never falls through.
    IsJump,
    /// The final argument is a jump target.
    IsGoto,
    /// The final argument is a subroutine target.
    IsCall,
    IsRet,
}

/// A known function definition from the external name registry.
#[derive(Debug, Clone)]
pub struct FuncDef {
    pub name: String,
    pub flags: Vec<FuncFlag>,
}

impl FuncDef {
    pub fn has_flag(&self, flag: FuncFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Function and module names keyed by opcode. The registry is built by the
/// caller (from definition files); it supplies display names, and its flags
/// extend jump/store classification to opcodes outside the hardwired
/// control-flow set.
#[derive(Debug, Clone, Default)]
pub struct FuncRegistry {
    funcs: HashMap<String, FuncDef>,
    modules: HashMap<u8, String>,
}

impl FuncRegistry {
    pub fn register(&mut self, opcode: &str, def: FuncDef) {
        self.funcs.insert(opcode.to_string(), def);
    }

    pub fn lookup(&self, opcode: &str) -> Option<&FuncDef> {
        self.funcs.get(opcode)
    }

    pub fn register_module(&mut self, module: u8, name: &str) {
        self.modules.insert(module, name.to_string());
    }

    pub fn module_name(&self, module: u8) -> String {
        match self.modules.get(&module) {
            Some(name) => name.clone(),
            None => format!("{:03}", module),
        }
    }
}

/// Navigation map of one scene: where its entry points sit and where it
/// jumps out to.
#[derive(Debug, Clone, Default)]
pub struct SeenMap {
    /// (command offset, entry point number)
    pub entry_points: Vec<(usize, i32)>,
    /// (command offset, target offset, kind)
    pub jumps: Vec<(usize, usize, JumpKind)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Goto,
    Gosub,
    Conditional,
}
