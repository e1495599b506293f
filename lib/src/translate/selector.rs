//! Instruction selection for one method
//!
//! Walks the source instruction list in order and emits target instructions via a static
//! per-opcode mapping. Three things make this more than a table lookup:
//!
//! * The target machine has separate opcodes per operand class (numeric equality vs.
//!   bytestring equality, boolean vs. bitwise connectives), while the source machine reuses
//!   one opcode per shape. A shadow stack of approximate operand classes recovers the
//!   distinction. The source bytecode is verified, so best effort suffices: classes degrade
//!   to `Any` at join points, and `Any` selects the numeric opcode.
//! * A comparison immediately followed by a conditional branch is fused into one of the
//!   target's compare-and-jump opcodes, provided nothing else jumps between the two.
//! * Calls dispatch on the callee's directive: local calls stay symbolic for the linker,
//!   interop substitutions bake in the service hash, raw substitutions splice in the declared
//!   instruction, and external substitutions go through the method token table.
//!
//! Branches are emitted in their wide form throughout; the address resolver narrows them.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

use super::errors::Error;
use super::method::{CompiledMethod, Directive, INITIALIZER_NAME};
use crate::jbc::{SourceInsn, UnitDescriptor};
use crate::neo::{CallFlags, Instruction, MethodToken, Op, Payload, StackItemType};

/// Approximate class of a stack operand
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Operand {
    Int,
    Bool,
    Bytes,
    Array,
    Map,
    Null,
    Any,
}

impl Operand {
    fn is_bytes(self) -> bool {
        self == Operand::Bytes
    }
}

/// Select the body of `methods[index]`, appending external call tokens to `tokens`
///
/// `seed` holds instructions to place before everything else (the static initializer's slot
/// allocation). Returns the selected instruction sequence with branch payloads referring to
/// target instruction indices and call payloads referring to source unit method indices.
pub fn select(
    unit: &UnitDescriptor,
    methods: &[CompiledMethod],
    index: usize,
    tokens: &mut Vec<MethodToken>,
    seed: Vec<Instruction>,
) -> Result<Vec<Instruction>, Error> {
    Selector {
        unit,
        methods,
        index,
        tokens,
        out: seed,
        stack: vec![],
        map: vec![],
        targets: HashSet::new(),
    }
    .run()
}

struct Selector<'a> {
    unit: &'a UnitDescriptor,
    methods: &'a [CompiledMethod],
    index: usize,
    tokens: &'a mut Vec<MethodToken>,
    out: Vec<Instruction>,
    stack: Vec<Operand>,
    /// Source instruction index to target instruction index
    map: Vec<usize>,
    /// Source instruction indices some branch lands on
    targets: HashSet<usize>,
}

impl<'a> Selector<'a> {
    fn method(&self) -> &CompiledMethod {
        &self.methods[self.index]
    }

    fn source(&self) -> &'a [SourceInsn] {
        &self.unit.methods[self.method().descriptor].instructions
    }

    fn run(mut self) -> Result<Vec<Instruction>, Error> {
        self.scan_targets()?;

        let method = self.method();
        if method.arg_slots > 0 || method.local_slots > 0 {
            self.out.push(Instruction::with_bytes(
                Op::InitSlot,
                vec![method.local_slots, method.arg_slots],
            ));
        }

        let source = self.source();
        self.map = vec![0; source.len()];
        let mut index = 0;
        while index < source.len() {
            self.map[index] = self.out.len();
            if self.targets.contains(&index) {
                // A join point; operand classes merged over all incoming paths
                for entry in &mut self.stack {
                    *entry = Operand::Any;
                }
            }

            if index + 1 < source.len() && self.fuse(index)? {
                self.map[index + 1] = self.map[index];
                index += 2;
            } else {
                self.translate(index)?;
                index += 1;
            }
        }

        // Branch payloads still name source indices; point them at target instructions
        for insn in &mut self.out {
            match &mut insn.payload {
                Payload::Branch(target) => *target = self.map[*target],
                Payload::Try { catch, finally } => {
                    if let Some(target) = catch {
                        *target = self.map[*target];
                    }
                    if let Some(target) = finally {
                        *target = self.map[*target];
                    }
                }
                _ => {}
            }
        }

        Ok(self.out)
    }

    /// Record every branch target and validate they stay in bounds
    fn scan_targets(&mut self) -> Result<(), Error> {
        let len = self.source().len();
        let mut notice = |this: &mut Self, offset: usize, target: u32| -> Result<(), Error> {
            let target = target as usize;
            if target >= len {
                let construct = format!("branch target {} out of range", target);
                return Err(this.unsupported(offset, construct));
            }
            this.targets.insert(target);
            Ok(())
        };

        for (offset, insn) in self.source().iter().enumerate() {
            match insn {
                SourceInsn::Jump(target)
                | SourceInsn::BranchTrue(target)
                | SourceInsn::BranchFalse(target)
                | SourceInsn::BranchNull(target)
                | SourceInsn::BranchNotNull(target)
                | SourceInsn::EndTry { next: target } => notice(self, offset, *target)?,
                SourceInsn::Try { catch, finally } => {
                    if let Some(target) = catch {
                        notice(self, offset, *target)?;
                    }
                    if let Some(target) = finally {
                        notice(self, offset, *target)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Compare-and-branch window: two source instructions into one fused jump
    fn fuse(&mut self, index: usize) -> Result<bool, Error> {
        let source = self.source();
        let compare = match source[index] {
            SourceInsn::CmpEq => Op::JmpEqL,
            SourceInsn::CmpNe => Op::JmpNeL,
            SourceInsn::CmpLt => Op::JmpLtL,
            SourceInsn::CmpLe => Op::JmpLeL,
            SourceInsn::CmpGt => Op::JmpGtL,
            SourceInsn::CmpGe => Op::JmpGeL,
            _ => return Ok(false),
        };
        let (target, on_true) = match source[index + 1] {
            SourceInsn::BranchTrue(target) => (target as usize, true),
            SourceInsn::BranchFalse(target) => (target as usize, false),
            _ => return Ok(false),
        };
        if self.targets.contains(&(index + 1)) {
            // Something jumps between the compare and the branch
            return Ok(false);
        }

        let bytes = self.peek(0).is_bytes() || self.peek(1).is_bytes();
        if bytes {
            let equal = match source[index] {
                SourceInsn::CmpEq => Op::Equal,
                SourceInsn::CmpNe => Op::NotEqual,
                _ => {
                    return Err(self.unsupported(
                        index,
                        "ordering comparison on bytestring operands".to_string(),
                    ))
                }
            };
            let jump = if on_true { Op::JmpIfL } else { Op::JmpIfNotL };
            self.out.push(Instruction::bare(equal));
            self.out.push(Instruction::branch(jump, target));
        } else {
            let jump = if on_true { compare } else { negate_condition(compare) };
            self.out.push(Instruction::branch(jump, target));
        }

        self.pop();
        self.pop();
        Ok(true)
    }

    fn translate(&mut self, index: usize) -> Result<(), Error> {
        match &self.source()[index] {
            SourceInsn::PushInt(value) => {
                self.out.push(push_int(*value));
                self.push(Operand::Int);
            }
            SourceInsn::PushBool(value) => {
                let op = if *value { Op::PushTrue } else { Op::PushFalse };
                self.out.push(Instruction::bare(op));
                self.push(Operand::Bool);
            }
            SourceInsn::PushBytes(bytes) => {
                self.out.push(push_data(bytes.clone()));
                self.push(Operand::Bytes);
            }
            SourceInsn::PushString(text) => {
                self.out.push(push_data(text.as_bytes().to_vec()));
                self.push(Operand::Bytes);
            }
            SourceInsn::PushNull => {
                self.out.push(Instruction::bare(Op::PushNull));
                self.push(Operand::Null);
            }

            SourceInsn::Load(slot) => {
                let insn = self.method().slot_insn(*slot, false, index)?;
                self.out.push(insn);
                self.push(Operand::Any);
            }
            SourceInsn::Store(slot) => {
                let insn = self.method().slot_insn(*slot, true, index)?;
                self.out.push(insn);
                self.pop();
            }
            SourceInsn::Inc { slot, amount } => {
                let load = self.method().slot_insn(*slot, false, index)?;
                let store = self.method().slot_insn(*slot, true, index)?;
                self.out.push(load);
                match amount {
                    1 => self.out.push(Instruction::bare(Op::Inc)),
                    -1 => self.out.push(Instruction::bare(Op::Dec)),
                    _ => {
                        self.out.push(push_int(*amount as i128));
                        self.out.push(Instruction::bare(Op::Add));
                    }
                }
                self.out.push(store);
            }
            SourceInsn::LoadStatic(slot) => {
                self.out.push(static_slot_insn(Op::LdSFld, *slot));
                self.push(Operand::Any);
            }
            SourceInsn::StoreStatic(slot) => {
                self.out.push(static_slot_insn(Op::StSFld, *slot));
                self.pop();
            }

            SourceInsn::Nop => self.out.push(Instruction::bare(Op::Nop)),
            SourceInsn::Dup => {
                self.out.push(Instruction::bare(Op::Dup));
                let top = self.peek(0);
                self.push(top);
            }
            SourceInsn::DupUnder => {
                self.out.push(Instruction::bare(Op::Tuck));
                let top = self.pop();
                let below = self.pop();
                self.push(top);
                self.push(below);
                self.push(top);
            }
            SourceInsn::Pop => {
                self.out.push(Instruction::bare(Op::Drop));
                self.pop();
            }
            SourceInsn::Swap => {
                self.out.push(Instruction::bare(Op::Swap));
                let top = self.pop();
                let below = self.pop();
                self.push(top);
                self.push(below);
            }

            SourceInsn::Add => self.arithmetic(Op::Add),
            SourceInsn::Sub => self.arithmetic(Op::Sub),
            SourceInsn::Mul => self.arithmetic(Op::Mul),
            SourceInsn::Div => self.arithmetic(Op::Div),
            SourceInsn::Rem => self.arithmetic(Op::Mod),
            SourceInsn::Shl => self.arithmetic(Op::Shl),
            SourceInsn::Shr => self.arithmetic(Op::Shr),
            SourceInsn::Neg => {
                self.out.push(Instruction::bare(Op::Negate));
                self.pop();
                self.push(Operand::Int);
            }
            SourceInsn::BitAnd => self.connective(Op::BoolAnd, Op::And),
            SourceInsn::BitOr => self.connective(Op::BoolOr, Op::Or),
            SourceInsn::BitXor => self.connective(Op::Xor, Op::Xor),
            SourceInsn::Not => {
                let top = self.pop();
                if top == Operand::Int {
                    self.out.push(Instruction::bare(Op::Invert));
                    self.push(Operand::Int);
                } else {
                    self.out.push(Instruction::bare(Op::Not));
                    self.push(Operand::Bool);
                }
            }

            SourceInsn::CmpEq => self.equality(Op::Equal, Op::NumEqual),
            SourceInsn::CmpNe => self.equality(Op::NotEqual, Op::NumNotEqual),
            SourceInsn::CmpLt => self.relational(index, Op::Lt)?,
            SourceInsn::CmpLe => self.relational(index, Op::Le)?,
            SourceInsn::CmpGt => self.relational(index, Op::Gt)?,
            SourceInsn::CmpGe => self.relational(index, Op::Ge)?,

            SourceInsn::Jump(target) => {
                self.out.push(Instruction::branch(Op::JmpL, *target as usize));
                self.stack.clear();
            }
            SourceInsn::BranchTrue(target) => {
                self.out.push(Instruction::branch(Op::JmpIfL, *target as usize));
                self.pop();
            }
            SourceInsn::BranchFalse(target) => {
                self.out.push(Instruction::branch(Op::JmpIfNotL, *target as usize));
                self.pop();
            }
            SourceInsn::BranchNull(target) => {
                self.out.push(Instruction::bare(Op::IsNull));
                self.out.push(Instruction::branch(Op::JmpIfL, *target as usize));
                self.pop();
            }
            SourceInsn::BranchNotNull(target) => {
                self.out.push(Instruction::bare(Op::IsNull));
                self.out.push(Instruction::branch(Op::JmpIfNotL, *target as usize));
                self.pop();
            }

            SourceInsn::NewArray => {
                // A literal zero length folds into the empty-array opcode
                if !self.targets.contains(&index)
                    && self.out.last() == Some(&Instruction::bare(Op::Push0))
                {
                    self.out.pop();
                    self.out.push(Instruction::bare(Op::NewArray0));
                    self.map[index] = self.out.len() - 1;
                } else {
                    self.out.push(Instruction::bare(Op::NewArray));
                }
                self.pop();
                self.push(Operand::Array);
            }
            SourceInsn::NewBuffer => {
                self.out.push(Instruction::bare(Op::NewBuffer));
                self.pop();
                self.push(Operand::Bytes);
            }
            SourceInsn::NewObject { fields } => {
                if *fields == 0 {
                    self.out.push(Instruction::bare(Op::NewArray0));
                } else {
                    self.out.push(push_int(*fields as i128));
                    self.out.push(Instruction::bare(Op::NewArray));
                }
                self.push(Operand::Array);
            }
            SourceInsn::NewMap => {
                self.out.push(Instruction::bare(Op::NewMap));
                self.push(Operand::Map);
            }
            SourceInsn::ArrayGet => {
                self.out.push(Instruction::bare(Op::PickItem));
                self.pop();
                self.pop();
                self.push(Operand::Any);
            }
            SourceInsn::ArraySet => {
                self.out.push(Instruction::bare(Op::SetItem));
                self.pop();
                self.pop();
                self.pop();
            }
            SourceInsn::Size => {
                self.out.push(Instruction::bare(Op::Size));
                self.pop();
                self.push(Operand::Int);
            }
            SourceInsn::GetField(field) => {
                self.out.push(push_int(*field as i128));
                self.out.push(Instruction::bare(Op::PickItem));
                self.pop();
                self.push(Operand::Any);
            }
            SourceInsn::SetField(field) => {
                self.out.push(push_int(*field as i128));
                self.out.push(Instruction::bare(Op::Swap));
                self.out.push(Instruction::bare(Op::SetItem));
                self.pop();
                self.pop();
            }
            SourceInsn::Concat => {
                self.out.push(Instruction::bare(Op::Cat));
                self.out.push(Instruction::with_bytes(
                    Op::Convert,
                    vec![StackItemType::ByteString.byte()],
                ));
                self.pop();
                self.pop();
                self.push(Operand::Bytes);
            }

            SourceInsn::Call { method } => self.call_site(index, method)?,
            SourceInsn::EmitEvent { event } => self.emit_event(index, *event)?,

            SourceInsn::Throw => {
                self.out.push(Instruction::bare(Op::Throw));
                self.pop();
                self.stack.clear();
            }
            SourceInsn::Try { catch, finally } => {
                self.out.push(Instruction {
                    op: Op::TryL,
                    payload: Payload::Try {
                        catch: catch.map(|target| target as usize),
                        finally: finally.map(|target| target as usize),
                    },
                });
            }
            SourceInsn::EndTry { next } => {
                self.out.push(Instruction::branch(Op::EndTryL, *next as usize));
                self.stack.clear();
            }
            SourceInsn::EndFinally => {
                self.out.push(Instruction::bare(Op::EndFinally));
                self.stack.clear();
            }
            SourceInsn::Return => {
                self.out.push(Instruction::bare(Op::Ret));
                self.stack.clear();
            }
        }
        Ok(())
    }

    fn arithmetic(&mut self, op: Op) {
        self.out.push(Instruction::bare(op));
        self.pop();
        self.pop();
        self.push(Operand::Int);
    }

    /// Boolean connective when both operands are booleans, bitwise otherwise
    fn connective(&mut self, boolean: Op, bitwise: Op) {
        let top = self.pop();
        let below = self.pop();
        if top == Operand::Bool && below == Operand::Bool {
            self.out.push(Instruction::bare(boolean));
            self.push(Operand::Bool);
        } else {
            self.out.push(Instruction::bare(bitwise));
            self.push(Operand::Int);
        }
    }

    fn equality(&mut self, bytes: Op, numeric: Op) {
        let op = if self.peek(0).is_bytes() || self.peek(1).is_bytes() {
            bytes
        } else {
            numeric
        };
        self.out.push(Instruction::bare(op));
        self.pop();
        self.pop();
        self.push(Operand::Bool);
    }

    fn relational(&mut self, index: usize, op: Op) -> Result<(), Error> {
        if self.peek(0).is_bytes() || self.peek(1).is_bytes() {
            return Err(self.unsupported(
                index,
                "ordering comparison on bytestring operands".to_string(),
            ));
        }
        self.out.push(Instruction::bare(op));
        self.pop();
        self.pop();
        self.push(Operand::Bool);
        Ok(())
    }

    /// A call site; the emitted shape depends on the callee's directive
    fn call_site(&mut self, index: usize, name: &str) -> Result<(), Error> {
        if name == INITIALIZER_NAME {
            return Err(self.unsupported(
                index,
                "explicit call to the static initializer".to_string(),
            ));
        }

        let callee_index = self
            .methods
            .iter()
            .position(|method| method.name == name)
            .ok_or_else(|| {
                self.unsupported(index, format!("call to unknown method `{}`", name))
            })?;
        let callee = &self.methods[callee_index];
        let args = callee.params.len();

        reverse_args(args, &mut self.out);
        match &callee.directive {
            Directive::Normal | Directive::EntryPoint | Directive::Hook(_) => {
                self.out.push(Instruction::call(callee_index));
            }
            Directive::Syscall(service) => {
                self.out
                    .push(Instruction::with_bytes(Op::Syscall, syscall_hash(service).to_vec()));
            }
            Directive::Raw { op, operand } => {
                let insn = if operand.is_empty() {
                    Instruction::bare(*op)
                } else {
                    Instruction::with_bytes(*op, operand.clone())
                };
                self.out.push(insn);
            }
            Directive::ContractCall { hash } => {
                let token = MethodToken {
                    hash: *hash,
                    method: callee.exposed_name.clone(),
                    params: args as u16,
                    has_return: callee.has_return(),
                    call_flags: CallFlags::ALL,
                };
                let slot = match self.tokens.iter().position(|known| *known == token) {
                    Some(slot) => slot,
                    None => {
                        self.tokens.push(token);
                        self.tokens.len() - 1
                    }
                };
                self.out.push(Instruction::call_token(slot));
            }
        }

        for _ in 0..args {
            self.pop();
        }
        if callee.has_return() {
            self.push(Operand::Any);
        }
        Ok(())
    }

    /// Pack the arguments into an array and notify the runtime
    fn emit_event(&mut self, index: usize, event: usize) -> Result<(), Error> {
        let declared = self.unit.events.get(event).ok_or_else(|| {
            self.unsupported(index, format!("event index {} out of range", event))
        })?;
        let args = declared.params.len();

        reverse_args(args, &mut self.out);
        self.out.push(push_int(args as i128));
        self.out.push(Instruction::bare(Op::Pack));
        self.out.push(push_data(declared.name.as_bytes().to_vec()));
        self.out.push(Instruction::with_bytes(
            Op::Syscall,
            syscall_hash("System.Runtime.Notify").to_vec(),
        ));

        for _ in 0..args {
            self.pop();
        }
        Ok(())
    }

    fn unsupported(&self, offset: usize, construct: String) -> Error {
        Error::UnsupportedConstruct {
            method: self.method().name.clone(),
            offset: Some(offset),
            construct,
        }
    }

    fn push(&mut self, operand: Operand) {
        self.stack.push(operand);
    }

    fn pop(&mut self) -> Operand {
        self.stack.pop().unwrap_or(Operand::Any)
    }

    fn peek(&self, depth: usize) -> Operand {
        self.stack
            .iter()
            .rev()
            .nth(depth)
            .copied()
            .unwrap_or(Operand::Any)
    }
}

/// The fused jump testing the opposite condition
fn negate_condition(op: Op) -> Op {
    match op {
        Op::JmpEqL => Op::JmpNeL,
        Op::JmpNeL => Op::JmpEqL,
        Op::JmpLtL => Op::JmpGeL,
        Op::JmpLeL => Op::JmpGtL,
        Op::JmpGtL => Op::JmpLeL,
        Op::JmpGeL => Op::JmpLtL,
        other => other,
    }
}

/// Load or store a static field slot, using the compact form where one exists
fn static_slot_insn(family: Op, slot: u8) -> Instruction {
    match family.compact_form(slot) {
        Some(compact) => Instruction::bare(compact),
        None => Instruction::with_bytes(family, vec![slot]),
    }
}

/// Push an integer constant in its smallest encoding
pub fn push_int(value: i128) -> Instruction {
    if let Ok(small) = i64::try_from(value) {
        if let Some(op) = Op::push_const(small) {
            return Instruction::bare(op);
        }
    }

    if let Ok(value) = i8::try_from(value) {
        Instruction::with_bytes(Op::PushInt8, value.to_le_bytes().to_vec())
    } else if let Ok(value) = i16::try_from(value) {
        Instruction::with_bytes(Op::PushInt16, value.to_le_bytes().to_vec())
    } else if let Ok(value) = i32::try_from(value) {
        Instruction::with_bytes(Op::PushInt32, value.to_le_bytes().to_vec())
    } else if let Ok(value) = i64::try_from(value) {
        Instruction::with_bytes(Op::PushInt64, value.to_le_bytes().to_vec())
    } else {
        Instruction::with_bytes(Op::PushInt128, value.to_le_bytes().to_vec())
    }
}

/// Push a data constant with the smallest length prefix
pub fn push_data(data: Vec<u8>) -> Instruction {
    let (op, mut wire) = if data.len() < 1 << 8 {
        (Op::PushData1, vec![data.len() as u8])
    } else if data.len() < 1 << 16 {
        (Op::PushData2, (data.len() as u16).to_le_bytes().to_vec())
    } else {
        (Op::PushData4, (data.len() as u32).to_le_bytes().to_vec())
    };
    wire.extend_from_slice(&data);
    Instruction::with_bytes(op, wire)
}

/// First four bytes of the SHA-256 hash of an interop service name
pub fn syscall_hash(service: &str) -> [u8; 4] {
    let digest = Sha256::digest(service.as_bytes());
    let mut hash = [0u8; 4];
    hash.copy_from_slice(&digest[..4]);
    hash
}

/// Arguments are pushed first-to-last but popped into slots first-out; flip them
fn reverse_args(count: usize, out: &mut Vec<Instruction>) {
    match count {
        0 | 1 => {}
        2 => out.push(Instruction::bare(Op::Swap)),
        3 => out.push(Instruction::bare(Op::Reverse3)),
        4 => out.push(Instruction::bare(Op::Reverse4)),
        more => {
            out.push(push_int(more as i128));
            out.push(Instruction::bare(Op::ReverseN));
        }
    }
}
