//! Opcodes of the target virtual machine
//!
//! The numeric values and operand layouts here are fixed by the target platform. Most opcodes
//! take no operand; the exceptions are the constant pushes, the slot access family, and the
//! control flow family. Control flow opcodes come in pairs: a narrow form with one byte relative
//! offsets and a wide `*_L` form with four byte offsets ([`Op::narrowed`]/[`Op::widened`] map
//! between them). `TRY` is the one opcode carrying two offsets at once.

/// Operand layout of an opcode
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OperandSpec {
    /// No operand bytes
    None,

    /// Exactly this many operand bytes
    Fixed(usize),

    /// A little-endian length prefix of this many bytes, then that many data bytes
    Prefixed(usize),
}

/// One opcode of the target instruction set
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(u8)]
pub enum Op {
    // Constants
    PushInt8 = 0x00,
    PushInt16 = 0x01,
    PushInt32 = 0x02,
    PushInt64 = 0x03,
    PushInt128 = 0x04,
    PushInt256 = 0x05,
    PushTrue = 0x08,
    PushFalse = 0x09,
    PushA = 0x0A,
    PushNull = 0x0B,
    PushData1 = 0x0C,
    PushData2 = 0x0D,
    PushData4 = 0x0E,
    PushM1 = 0x0F,
    Push0 = 0x10,
    Push1 = 0x11,
    Push2 = 0x12,
    Push3 = 0x13,
    Push4 = 0x14,
    Push5 = 0x15,
    Push6 = 0x16,
    Push7 = 0x17,
    Push8 = 0x18,
    Push9 = 0x19,
    Push10 = 0x1A,
    Push11 = 0x1B,
    Push12 = 0x1C,
    Push13 = 0x1D,
    Push14 = 0x1E,
    Push15 = 0x1F,
    Push16 = 0x20,

    // Flow control
    Nop = 0x21,
    Jmp = 0x22,
    JmpL = 0x23,
    JmpIf = 0x24,
    JmpIfL = 0x25,
    JmpIfNot = 0x26,
    JmpIfNotL = 0x27,
    JmpEq = 0x28,
    JmpEqL = 0x29,
    JmpNe = 0x2A,
    JmpNeL = 0x2B,
    JmpGt = 0x2C,
    JmpGtL = 0x2D,
    JmpGe = 0x2E,
    JmpGeL = 0x2F,
    JmpLt = 0x30,
    JmpLtL = 0x31,
    JmpLe = 0x32,
    JmpLeL = 0x33,
    Call = 0x34,
    CallL = 0x35,
    CallA = 0x36,
    /// Call into another contract through a method token; the operand is the two byte
    /// little-endian index into the token table of the containing NEF file
    CallT = 0x37,
    Abort = 0x38,
    Assert = 0x39,
    Throw = 0x3A,
    /// Open an exception region; operands are the relative offsets of the catch handler and of
    /// the finally block (one byte each, zero meaning "absent")
    Try = 0x3B,
    /// Wide form of `TRY` with two four byte offsets
    TryL = 0x3C,
    /// Close an exception region and jump past it
    EndTry = 0x3D,
    EndTryL = 0x3E,
    EndFinally = 0x3F,
    Ret = 0x40,
    /// Invoke an interop service; the operand is the first four bytes of the SHA-256 hash of the
    /// service name
    Syscall = 0x41,

    // Stack
    Depth = 0x43,
    Drop = 0x45,
    Nip = 0x46,
    XDrop = 0x48,
    Clear = 0x49,
    Dup = 0x4A,
    Over = 0x4B,
    Pick = 0x4D,
    Tuck = 0x4E,
    Swap = 0x50,
    Rot = 0x51,
    Roll = 0x52,
    Reverse3 = 0x53,
    Reverse4 = 0x54,
    ReverseN = 0x55,

    // Slots
    /// Allocate the static field slots of the script; operand is the slot count
    InitSSlot = 0x56,
    /// Allocate the frame of a method; operands are the local count then the parameter count
    InitSlot = 0x57,
    LdSFld0 = 0x58,
    LdSFld1 = 0x59,
    LdSFld2 = 0x5A,
    LdSFld3 = 0x5B,
    LdSFld4 = 0x5C,
    LdSFld5 = 0x5D,
    LdSFld6 = 0x5E,
    LdSFld = 0x5F,
    StSFld0 = 0x60,
    StSFld1 = 0x61,
    StSFld2 = 0x62,
    StSFld3 = 0x63,
    StSFld4 = 0x64,
    StSFld5 = 0x65,
    StSFld6 = 0x66,
    StSFld = 0x67,
    LdLoc0 = 0x68,
    LdLoc1 = 0x69,
    LdLoc2 = 0x6A,
    LdLoc3 = 0x6B,
    LdLoc4 = 0x6C,
    LdLoc5 = 0x6D,
    LdLoc6 = 0x6E,
    LdLoc = 0x6F,
    StLoc0 = 0x70,
    StLoc1 = 0x71,
    StLoc2 = 0x72,
    StLoc3 = 0x73,
    StLoc4 = 0x74,
    StLoc5 = 0x75,
    StLoc6 = 0x76,
    StLoc = 0x77,
    LdArg0 = 0x78,
    LdArg1 = 0x79,
    LdArg2 = 0x7A,
    LdArg3 = 0x7B,
    LdArg4 = 0x7C,
    LdArg5 = 0x7D,
    LdArg6 = 0x7E,
    LdArg = 0x7F,
    StArg0 = 0x80,
    StArg1 = 0x81,
    StArg2 = 0x82,
    StArg3 = 0x83,
    StArg4 = 0x84,
    StArg5 = 0x85,
    StArg6 = 0x86,
    StArg = 0x87,

    // Splice
    NewBuffer = 0x88,
    MemCpy = 0x89,
    Cat = 0x8B,
    SubStr = 0x8C,
    Left = 0x8D,
    Right = 0x8E,

    // Bitwise logic
    Invert = 0x90,
    And = 0x91,
    Or = 0x92,
    Xor = 0x93,
    Equal = 0x97,
    NotEqual = 0x98,

    // Arithmetic
    Sign = 0x99,
    Abs = 0x9A,
    Negate = 0x9B,
    Inc = 0x9C,
    Dec = 0x9D,
    Add = 0x9E,
    Sub = 0x9F,
    Mul = 0xA0,
    Div = 0xA1,
    Mod = 0xA2,
    Pow = 0xA3,
    Sqrt = 0xA4,
    ModMul = 0xA5,
    ModPow = 0xA6,
    Shl = 0xA8,
    Shr = 0xA9,
    Not = 0xAA,
    BoolAnd = 0xAB,
    BoolOr = 0xAC,
    Nz = 0xB1,
    NumEqual = 0xB3,
    NumNotEqual = 0xB4,
    Lt = 0xB5,
    Le = 0xB6,
    Gt = 0xB7,
    Ge = 0xB8,
    Min = 0xB9,
    Max = 0xBA,
    Within = 0xBB,

    // Compound types
    PackMap = 0xBE,
    PackStruct = 0xBF,
    Pack = 0xC0,
    Unpack = 0xC1,
    NewArray0 = 0xC2,
    NewArray = 0xC3,
    NewArrayT = 0xC4,
    NewStruct0 = 0xC5,
    NewStruct = 0xC6,
    NewMap = 0xC8,
    Size = 0xCA,
    HasKey = 0xCB,
    Keys = 0xCC,
    Values = 0xCD,
    PickItem = 0xCE,
    Append = 0xCF,
    SetItem = 0xD0,
    ReverseItems = 0xD1,
    Remove = 0xD2,
    ClearItems = 0xD3,

    // Types
    IsNull = 0xD8,
    IsType = 0xD9,
    Convert = 0xDB,
}

/// Every opcode, in code order
pub const OPCODES: &[Op] = &[
    Op::PushInt8,
    Op::PushInt16,
    Op::PushInt32,
    Op::PushInt64,
    Op::PushInt128,
    Op::PushInt256,
    Op::PushTrue,
    Op::PushFalse,
    Op::PushA,
    Op::PushNull,
    Op::PushData1,
    Op::PushData2,
    Op::PushData4,
    Op::PushM1,
    Op::Push0,
    Op::Push1,
    Op::Push2,
    Op::Push3,
    Op::Push4,
    Op::Push5,
    Op::Push6,
    Op::Push7,
    Op::Push8,
    Op::Push9,
    Op::Push10,
    Op::Push11,
    Op::Push12,
    Op::Push13,
    Op::Push14,
    Op::Push15,
    Op::Push16,
    Op::Nop,
    Op::Jmp,
    Op::JmpL,
    Op::JmpIf,
    Op::JmpIfL,
    Op::JmpIfNot,
    Op::JmpIfNotL,
    Op::JmpEq,
    Op::JmpEqL,
    Op::JmpNe,
    Op::JmpNeL,
    Op::JmpGt,
    Op::JmpGtL,
    Op::JmpGe,
    Op::JmpGeL,
    Op::JmpLt,
    Op::JmpLtL,
    Op::JmpLe,
    Op::JmpLeL,
    Op::Call,
    Op::CallL,
    Op::CallA,
    Op::CallT,
    Op::Abort,
    Op::Assert,
    Op::Throw,
    Op::Try,
    Op::TryL,
    Op::EndTry,
    Op::EndTryL,
    Op::EndFinally,
    Op::Ret,
    Op::Syscall,
    Op::Depth,
    Op::Drop,
    Op::Nip,
    Op::XDrop,
    Op::Clear,
    Op::Dup,
    Op::Over,
    Op::Pick,
    Op::Tuck,
    Op::Swap,
    Op::Rot,
    Op::Roll,
    Op::Reverse3,
    Op::Reverse4,
    Op::ReverseN,
    Op::InitSSlot,
    Op::InitSlot,
    Op::LdSFld0,
    Op::LdSFld1,
    Op::LdSFld2,
    Op::LdSFld3,
    Op::LdSFld4,
    Op::LdSFld5,
    Op::LdSFld6,
    Op::LdSFld,
    Op::StSFld0,
    Op::StSFld1,
    Op::StSFld2,
    Op::StSFld3,
    Op::StSFld4,
    Op::StSFld5,
    Op::StSFld6,
    Op::StSFld,
    Op::LdLoc0,
    Op::LdLoc1,
    Op::LdLoc2,
    Op::LdLoc3,
    Op::LdLoc4,
    Op::LdLoc5,
    Op::LdLoc6,
    Op::LdLoc,
    Op::StLoc0,
    Op::StLoc1,
    Op::StLoc2,
    Op::StLoc3,
    Op::StLoc4,
    Op::StLoc5,
    Op::StLoc6,
    Op::StLoc,
    Op::LdArg0,
    Op::LdArg1,
    Op::LdArg2,
    Op::LdArg3,
    Op::LdArg4,
    Op::LdArg5,
    Op::LdArg6,
    Op::LdArg,
    Op::StArg0,
    Op::StArg1,
    Op::StArg2,
    Op::StArg3,
    Op::StArg4,
    Op::StArg5,
    Op::StArg6,
    Op::StArg,
    Op::NewBuffer,
    Op::MemCpy,
    Op::Cat,
    Op::SubStr,
    Op::Left,
    Op::Right,
    Op::Invert,
    Op::And,
    Op::Or,
    Op::Xor,
    Op::Equal,
    Op::NotEqual,
    Op::Sign,
    Op::Abs,
    Op::Negate,
    Op::Inc,
    Op::Dec,
    Op::Add,
    Op::Sub,
    Op::Mul,
    Op::Div,
    Op::Mod,
    Op::Pow,
    Op::Sqrt,
    Op::ModMul,
    Op::ModPow,
    Op::Shl,
    Op::Shr,
    Op::Not,
    Op::BoolAnd,
    Op::BoolOr,
    Op::Nz,
    Op::NumEqual,
    Op::NumNotEqual,
    Op::Lt,
    Op::Le,
    Op::Gt,
    Op::Ge,
    Op::Min,
    Op::Max,
    Op::Within,
    Op::PackMap,
    Op::PackStruct,
    Op::Pack,
    Op::Unpack,
    Op::NewArray0,
    Op::NewArray,
    Op::NewArrayT,
    Op::NewStruct0,
    Op::NewStruct,
    Op::NewMap,
    Op::Size,
    Op::HasKey,
    Op::Keys,
    Op::Values,
    Op::PickItem,
    Op::Append,
    Op::SetItem,
    Op::ReverseItems,
    Op::Remove,
    Op::ClearItems,
    Op::IsNull,
    Op::IsType,
    Op::Convert,
];

impl Op {
    /// Numeric opcode
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look an opcode up by its numeric value
    pub fn from_byte(byte: u8) -> Option<Op> {
        OPCODES
            .binary_search_by_key(&byte, |op| op.code())
            .ok()
            .map(|idx| OPCODES[idx])
    }

    /// Operand layout
    pub fn operand(self) -> OperandSpec {
        match self {
            Op::PushInt8 => OperandSpec::Fixed(1),
            Op::PushInt16 => OperandSpec::Fixed(2),
            Op::PushInt32 => OperandSpec::Fixed(4),
            Op::PushInt64 => OperandSpec::Fixed(8),
            Op::PushInt128 => OperandSpec::Fixed(16),
            Op::PushInt256 => OperandSpec::Fixed(32),
            Op::PushA => OperandSpec::Fixed(4),
            Op::PushData1 => OperandSpec::Prefixed(1),
            Op::PushData2 => OperandSpec::Prefixed(2),
            Op::PushData4 => OperandSpec::Prefixed(4),

            Op::Jmp
            | Op::JmpIf
            | Op::JmpIfNot
            | Op::JmpEq
            | Op::JmpNe
            | Op::JmpGt
            | Op::JmpGe
            | Op::JmpLt
            | Op::JmpLe
            | Op::Call
            | Op::EndTry => OperandSpec::Fixed(1),
            Op::JmpL
            | Op::JmpIfL
            | Op::JmpIfNotL
            | Op::JmpEqL
            | Op::JmpNeL
            | Op::JmpGtL
            | Op::JmpGeL
            | Op::JmpLtL
            | Op::JmpLeL
            | Op::CallL
            | Op::EndTryL => OperandSpec::Fixed(4),
            Op::Try => OperandSpec::Fixed(2),
            Op::TryL => OperandSpec::Fixed(8),
            Op::CallT => OperandSpec::Fixed(2),
            Op::Syscall => OperandSpec::Fixed(4),

            Op::InitSSlot => OperandSpec::Fixed(1),
            Op::InitSlot => OperandSpec::Fixed(2),
            Op::LdSFld | Op::StSFld | Op::LdLoc | Op::StLoc | Op::LdArg | Op::StArg => {
                OperandSpec::Fixed(1)
            }

            Op::NewArrayT | Op::IsType | Op::Convert => OperandSpec::Fixed(1),

            _ => OperandSpec::None,
        }
    }

    /// The one byte offset form of a wide control flow opcode
    pub fn narrowed(self) -> Option<Op> {
        match self {
            Op::JmpL => Some(Op::Jmp),
            Op::JmpIfL => Some(Op::JmpIf),
            Op::JmpIfNotL => Some(Op::JmpIfNot),
            Op::JmpEqL => Some(Op::JmpEq),
            Op::JmpNeL => Some(Op::JmpNe),
            Op::JmpGtL => Some(Op::JmpGt),
            Op::JmpGeL => Some(Op::JmpGe),
            Op::JmpLtL => Some(Op::JmpLt),
            Op::JmpLeL => Some(Op::JmpLe),
            Op::CallL => Some(Op::Call),
            Op::TryL => Some(Op::Try),
            Op::EndTryL => Some(Op::EndTry),
            _ => None,
        }
    }

    /// The four byte offset form of a narrow control flow opcode
    pub fn widened(self) -> Option<Op> {
        match self {
            Op::Jmp => Some(Op::JmpL),
            Op::JmpIf => Some(Op::JmpIfL),
            Op::JmpIfNot => Some(Op::JmpIfNotL),
            Op::JmpEq => Some(Op::JmpEqL),
            Op::JmpNe => Some(Op::JmpNeL),
            Op::JmpGt => Some(Op::JmpGtL),
            Op::JmpGe => Some(Op::JmpGeL),
            Op::JmpLt => Some(Op::JmpLtL),
            Op::JmpLe => Some(Op::JmpLeL),
            Op::Call => Some(Op::CallL),
            Op::Try => Some(Op::TryL),
            Op::EndTry => Some(Op::EndTryL),
            _ => None,
        }
    }

    /// Single-opcode push for the constants -1 through 16
    pub fn push_const(value: i64) -> Option<Op> {
        const PUSHES: [Op; 17] = [
            Op::Push0,
            Op::Push1,
            Op::Push2,
            Op::Push3,
            Op::Push4,
            Op::Push5,
            Op::Push6,
            Op::Push7,
            Op::Push8,
            Op::Push9,
            Op::Push10,
            Op::Push11,
            Op::Push12,
            Op::Push13,
            Op::Push14,
            Op::Push15,
            Op::Push16,
        ];
        if value == -1 {
            Some(Op::PushM1)
        } else if (0..=16).contains(&value) {
            Some(PUSHES[value as usize])
        } else {
            None
        }
    }

    /// The no-operand form for slot indices 0 through 6, if this is one of the slot access
    /// opcodes taking an index operand
    pub fn compact_form(self, index: u8) -> Option<Op> {
        let compact: &[Op; 7] = match self {
            Op::LdSFld => &[
                Op::LdSFld0,
                Op::LdSFld1,
                Op::LdSFld2,
                Op::LdSFld3,
                Op::LdSFld4,
                Op::LdSFld5,
                Op::LdSFld6,
            ],
            Op::StSFld => &[
                Op::StSFld0,
                Op::StSFld1,
                Op::StSFld2,
                Op::StSFld3,
                Op::StSFld4,
                Op::StSFld5,
                Op::StSFld6,
            ],
            Op::LdLoc => &[
                Op::LdLoc0,
                Op::LdLoc1,
                Op::LdLoc2,
                Op::LdLoc3,
                Op::LdLoc4,
                Op::LdLoc5,
                Op::LdLoc6,
            ],
            Op::StLoc => &[
                Op::StLoc0,
                Op::StLoc1,
                Op::StLoc2,
                Op::StLoc3,
                Op::StLoc4,
                Op::StLoc5,
                Op::StLoc6,
            ],
            Op::LdArg => &[
                Op::LdArg0,
                Op::LdArg1,
                Op::LdArg2,
                Op::LdArg3,
                Op::LdArg4,
                Op::LdArg5,
                Op::LdArg6,
            ],
            Op::StArg => &[
                Op::StArg0,
                Op::StArg1,
                Op::StArg2,
                Op::StArg3,
                Op::StArg4,
                Op::StArg5,
                Op::StArg6,
            ],
            _ => return None,
        };
        compact.get(index as usize).copied()
    }
}

/// Runtime type tags used by `CONVERT`, `ISTYPE` and `NEWARRAY_T`
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum StackItemType {
    Any = 0x00,
    Boolean = 0x20,
    Integer = 0x21,
    ByteString = 0x28,
    Buffer = 0x30,
    Array = 0x40,
    Struct = 0x41,
    Map = 0x48,
}

impl StackItemType {
    pub fn byte(self) -> u8 {
        self as u8
    }
}
