//! Instructions of the target virtual machine
//!
//! An [`Instruction`] pairs an opcode with its operand. Operands whose bytes are known at
//! selection time are carried in wire form; branches, exception region entries and in-script
//! calls stay symbolic (they reference instruction or method indices) until the address
//! resolution pass has fixed the final layout and can turn them into relative offsets.

use super::opcode::{Op, OperandSpec};
use crate::util::Width;

/// Operand of an instruction
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Payload {
    /// No operand
    None,

    /// Operand already in wire form, length prefix included where the opcode takes one
    Bytes(Vec<u8>),

    /// Pending relative branch to an instruction index of the same method
    Branch(usize),

    /// Pending exception region entry, both handlers given as instruction indices of the same
    /// method (an absent handler is encoded as offset zero)
    Try {
        catch: Option<usize>,
        finally: Option<usize>,
    },

    /// Pending call to another method of the same script, by method index
    CallMethod(usize),

    /// Pending cross contract call through the unit's method token table, by token index
    CallToken(usize),
}

/// One instruction, possibly with unresolved branch or call targets
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Instruction {
    pub op: Op,
    pub payload: Payload,
}

impl Instruction {
    /// Instruction without operand
    pub fn bare(op: Op) -> Instruction {
        Instruction {
            op,
            payload: Payload::None,
        }
    }

    /// Instruction with a wire form operand
    pub fn with_bytes(op: Op, bytes: Vec<u8>) -> Instruction {
        Instruction {
            op,
            payload: Payload::Bytes(bytes),
        }
    }

    /// Branch to an instruction index of the same method
    pub fn branch(op: Op, target: usize) -> Instruction {
        Instruction {
            op,
            payload: Payload::Branch(target),
        }
    }

    /// Call to a method index
    pub fn call(target: usize) -> Instruction {
        Instruction {
            op: Op::CallL,
            payload: Payload::CallMethod(target),
        }
    }

    /// Cross contract call through a token index
    pub fn call_token(token: usize) -> Instruction {
        Instruction {
            op: Op::CallT,
            payload: Payload::CallToken(token),
        }
    }

    /// Byte length of the operand under the instruction's current (narrow or wide) form
    pub fn operand_len(&self) -> usize {
        match &self.payload {
            Payload::None => 0,
            Payload::Bytes(bytes) => bytes.len(),
            Payload::Branch(_)
            | Payload::Try { .. }
            | Payload::CallMethod(_)
            | Payload::CallToken(_) => match self.op.operand() {
                OperandSpec::Fixed(len) => len,
                OperandSpec::None | OperandSpec::Prefixed(_) => 0,
            },
        }
    }
}

impl Width for Instruction {
    fn width(&self) -> usize {
        1 + self.operand_len()
    }
}
