//! Intermediate form of one method under compilation
//!
//! [`CompiledMethod::build`] turns one source method descriptor into the mutable intermediate
//! the later stages work on: the annotation set is resolved into a single
//! [`Directive`], the source machine's frame (where a wide value occupies two
//! adjacent slots) is remapped onto the target machine's flat slot model, and slot counts are
//! checked against the target maximum. The instruction sequence starts out empty; the selector
//! fills it in.

use super::errors::Error;
use crate::jbc::{hex_of_len, Annotation, HookKind, MethodDescriptor, ParamDecl, UnitDescriptor};
use crate::neo::{Instruction, Op, OperandSpec};

/// Hard limit of the target machine on arguments, locals and static fields alike
pub const MAX_SLOTS: usize = 255;

/// Name under which the static initializer runs and is exposed
pub const INITIALIZER_NAME: &str = "_initialize";

/// How a method's body is obtained
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Directive {
    /// Translate the source instructions
    Normal,

    /// Discard the body; call sites invoke the named interop service instead
    Syscall(String),

    /// Discard the body; call sites emit exactly this instruction instead
    ///
    /// The operand is already in wire form, length prefix included.
    Raw { op: Op, operand: Vec<u8> },

    /// Discard the body; call sites call into the contract with this script hash
    /// (little-endian byte order) instead
    ContractCall { hash: [u8; 20] },

    /// Translate normally and expose the method as the dispatch root
    EntryPoint,

    /// Translate normally and expose the method under its lifecycle name
    Hook(HookKind),
}

impl Directive {
    /// Whether the directive discards the declared body
    pub fn replaces_body(&self) -> bool {
        matches!(
            self,
            Directive::Syscall(_) | Directive::Raw { .. } | Directive::ContractCall { .. }
        )
    }
}

/// One method on its way through the pipeline
///
/// Calls reference other methods by their index in the source unit until the call graph linker
/// reassigns identities; branch targets reference instruction indices until the address
/// resolver runs.
#[derive(Clone, Debug)]
pub struct CompiledMethod {
    /// Source level name, used for call resolution and error reporting
    pub name: String,

    /// Name the method would be exposed under in the manifest
    pub exposed_name: String,

    pub directive: Directive,

    /// Whether source visibility exposes the method
    pub public: bool,

    /// Whether the method promises not to change chain state
    pub safe: bool,

    /// Parameters with their source level type names
    pub params: Vec<ParamDecl>,

    /// Source level name of the return type
    pub return_type: String,

    /// Target argument slot count, one per parameter
    pub arg_slots: u8,

    /// Target local slot count, wide source values collapsed
    pub local_slots: u8,

    /// Index of the descriptor within the source unit
    pub descriptor: usize,

    /// Target instructions, filled in by the instruction selector
    pub instructions: Vec<Instruction>,

    /// Source slot to target slot; `None` marks the upper half of a wide value
    remap: Vec<Option<u16>>,
}

impl CompiledMethod {
    /// Build the intermediate form of one method of the unit
    pub fn build(unit: &UnitDescriptor, index: usize) -> Result<CompiledMethod, Error> {
        let descriptor = &unit.methods[index];
        let directive = resolve_directive(descriptor)?;
        let exposed_name = exposed_name(descriptor, &directive)?;
        let (remap, arg_slots, local_slots) = remap_slots(descriptor)?;

        Ok(CompiledMethod {
            name: descriptor.name.clone(),
            exposed_name,
            directive,
            public: descriptor.public,
            safe: descriptor.is_safe(),
            params: descriptor.params.clone(),
            return_type: descriptor.return_type.clone(),
            arg_slots,
            local_slots,
            descriptor: index,
            instructions: vec![],
            remap,
        })
    }

    /// Whether the method leaves a value on the stack
    pub fn has_return(&self) -> bool {
        !self.return_type.eq_ignore_ascii_case("void")
    }

    /// Load or store instruction for a source slot index
    pub fn slot_insn(
        &self,
        source_slot: u16,
        store: bool,
        offset: usize,
    ) -> Result<Instruction, Error> {
        let target = match self.remap.get(source_slot as usize) {
            Some(Some(target)) => *target,
            _ => {
                return Err(Error::UnsupportedConstruct {
                    method: self.name.clone(),
                    offset: Some(offset),
                    construct: format!("access to unmapped variable slot {}", source_slot),
                })
            }
        };

        let args = self.arg_slots as u16;
        let (family, index) = if target < args {
            let family = if store { Op::StArg } else { Op::LdArg };
            (family, target as u8)
        } else {
            let family = if store { Op::StLoc } else { Op::LdLoc };
            (family, (target - args) as u8)
        };

        Ok(match family.compact_form(index) {
            Some(compact) => Instruction::bare(compact),
            None => Instruction::with_bytes(family, vec![index]),
        })
    }
}

/// Fold the declared annotations into a single directive
fn resolve_directive(descriptor: &MethodDescriptor) -> Result<Directive, Error> {
    let conflict = |problem: String| Error::AnnotationConfiguration {
        method: Some(descriptor.name.clone()),
        problem,
    };

    if descriptor.name == INITIALIZER_NAME {
        if !descriptor.annotations.is_empty() {
            return Err(conflict("the static initializer takes no annotations".to_string()));
        }
        if !descriptor.params.is_empty() || !descriptor.return_type.eq_ignore_ascii_case("void") {
            return Err(conflict(
                "the static initializer must take no parameters and return nothing".to_string(),
            ));
        }
        return Ok(Directive::Normal);
    }

    let mut resolved: Option<Directive> = None;
    let mut set = |directive: Directive| -> Result<(), Error> {
        match &resolved {
            None => {
                resolved = Some(directive);
                Ok(())
            }
            Some(previous) => Err(conflict(format!(
                "{:?} conflicts with {:?}",
                directive, previous
            ))),
        }
    };

    for annotation in &descriptor.annotations {
        match annotation {
            Annotation::EntryPoint => set(Directive::EntryPoint)?,
            Annotation::Hook(kind) => set(Directive::Hook(*kind))?,
            Annotation::Syscall(name) => set(Directive::Syscall(name.clone()))?,
            Annotation::Instruction { opcode, operand } => {
                set(raw_directive(descriptor, *opcode, operand)?)?
            }
            Annotation::ContractCall(hash) => {
                let mut bytes = hex_of_len(hash, 20).ok_or_else(|| {
                    conflict(format!("contract hash is not 20 hex encoded bytes: {}", hash))
                })?;
                // Hashes are declared big-endian, as explorers display them
                bytes.reverse();
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&bytes);
                set(Directive::ContractCall { hash })?
            }
            Annotation::Safe | Annotation::DisplayName(_) => {}
        }
    }

    Ok(resolved.unwrap_or(Directive::Normal))
}

/// Validate a raw instruction substitution against the opcode table
fn raw_directive(
    descriptor: &MethodDescriptor,
    opcode: u8,
    operand: &[u8],
) -> Result<Directive, Error> {
    let malformed = |problem: String| Error::AnnotationConfiguration {
        method: Some(descriptor.name.clone()),
        problem,
    };

    let op = Op::from_byte(opcode)
        .ok_or_else(|| malformed(format!("unknown opcode 0x{:02X}", opcode)))?;

    let wire = match op.operand() {
        OperandSpec::None => {
            if !operand.is_empty() {
                return Err(malformed(format!("{:?} takes no operand", op)));
            }
            vec![]
        }
        OperandSpec::Fixed(len) => {
            if operand.len() != len {
                return Err(malformed(format!(
                    "{:?} takes exactly {} operand bytes, got {}",
                    op,
                    len,
                    operand.len()
                )));
            }
            operand.to_vec()
        }
        OperandSpec::Prefixed(prefix) => {
            if prefix < 8 && operand.len() as u64 >= 1u64 << (8 * prefix) {
                return Err(malformed(format!(
                    "{:?} data does not fit its {} byte length prefix",
                    op, prefix
                )));
            }
            let mut wire = (operand.len() as u64).to_le_bytes()[..prefix].to_vec();
            wire.extend_from_slice(operand);
            wire
        }
    };

    Ok(Directive::Raw { op, operand: wire })
}

/// The manifest name of the method, honoring hook naming and display name annotations
fn exposed_name(descriptor: &MethodDescriptor, directive: &Directive) -> Result<String, Error> {
    let display = descriptor.annotations.iter().find_map(|annotation| match annotation {
        Annotation::DisplayName(name) => Some(name.clone()),
        _ => None,
    });

    if let Directive::Hook(kind) = directive {
        if display.is_some() {
            return Err(Error::AnnotationConfiguration {
                method: Some(descriptor.name.clone()),
                problem: format!(
                    "a lifecycle hook is always exposed as \"{}\" and cannot be renamed",
                    kind.exposed_name()
                ),
            });
        }
        return Ok(kind.exposed_name().to_string());
    }

    Ok(display.unwrap_or_else(|| descriptor.name.clone()))
}

/// Collapse the source frame onto single target slots
///
/// Returns the source slot to target slot table plus the target argument and local counts.
fn remap_slots(descriptor: &MethodDescriptor) -> Result<(Vec<Option<u16>>, u8, u8), Error> {
    let mut wide = descriptor.wide_slots.clone();
    wide.sort_unstable();
    for pair in wide.windows(2) {
        if pair[1] <= pair[0].saturating_add(1) {
            return Err(Error::UnsupportedConstruct {
                method: descriptor.name.clone(),
                offset: None,
                construct: format!("overlapping wide slots {} and {}", pair[0], pair[1]),
            });
        }
    }

    // Source slots occupied by the parameters
    let mut param_span = 0u16;
    for _ in &descriptor.params {
        param_span += if wide.contains(&param_span) { 2 } else { 1 };
    }
    let total = param_span as usize + descriptor.locals as usize;

    let mut remap = Vec::with_capacity(total);
    let mut target = 0u16;
    let mut slot = 0usize;
    while slot < total {
        remap.push(Some(target));
        target += 1;
        if wide.contains(&(slot as u16)) {
            if slot + 1 >= total {
                return Err(Error::UnsupportedConstruct {
                    method: descriptor.name.clone(),
                    offset: None,
                    construct: format!("wide slot {} has no upper half", slot),
                });
            }
            remap.push(None);
            slot += 2;
        } else {
            slot += 1;
        }
    }

    let args = descriptor.params.len();
    let locals = target as usize - args;
    if args > MAX_SLOTS {
        return Err(Error::TooManyLocalVariables {
            method: descriptor.name.clone(),
            slots: args,
            max: MAX_SLOTS,
        });
    }
    if locals > MAX_SLOTS {
        return Err(Error::TooManyLocalVariables {
            method: descriptor.name.clone(),
            slots: locals,
            max: MAX_SLOTS,
        });
    }

    Ok((remap, args as u8, locals as u8))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jbc::SourceInsn;

    fn descriptor(name: &str) -> MethodDescriptor {
        MethodDescriptor {
            name: name.to_string(),
            params: vec![],
            return_type: "void".to_string(),
            public: false,
            locals: 0,
            wide_slots: vec![],
            annotations: vec![],
            instructions: vec![SourceInsn::Return],
        }
    }

    fn unit_of(methods: Vec<MethodDescriptor>) -> UnitDescriptor {
        UnitDescriptor {
            name: "Unit".to_string(),
            source_url: None,
            statics: 0,
            methods,
            events: vec![],
            standards: vec![],
            permissions: vec![],
            trusts: vec![],
            extra: None,
        }
    }

    fn param(name: &str, ty: &str) -> ParamDecl {
        ParamDecl {
            name: name.to_string(),
            param_type: ty.to_string(),
        }
    }

    #[test]
    fn conflicting_directives_are_rejected() {
        let mut method = descriptor("clashing");
        method.annotations = vec![
            Annotation::Syscall("System.Runtime.CheckWitness".to_string()),
            Annotation::Instruction {
                opcode: 0x38,
                operand: vec![],
            },
        ];
        let unit = unit_of(vec![method]);
        assert!(matches!(
            CompiledMethod::build(&unit, 0),
            Err(Error::AnnotationConfiguration { .. })
        ));

        let mut method = descriptor("entryAndSyscall");
        method.annotations = vec![
            Annotation::EntryPoint,
            Annotation::Syscall("System.Runtime.GetTime".to_string()),
        ];
        let unit = unit_of(vec![method]);
        assert!(matches!(
            CompiledMethod::build(&unit, 0),
            Err(Error::AnnotationConfiguration { .. })
        ));

        let mut method = descriptor("entryAndHook");
        method.annotations = vec![Annotation::EntryPoint, Annotation::Hook(HookKind::Deploy)];
        let unit = unit_of(vec![method]);
        assert!(matches!(
            CompiledMethod::build(&unit, 0),
            Err(Error::AnnotationConfiguration { .. })
        ));
    }

    #[test]
    fn raw_substitution_validates_operand_size() {
        let mut method = descriptor("abort");
        method.annotations = vec![Annotation::Instruction {
            opcode: 0x38,
            operand: vec![],
        }];
        let unit = unit_of(vec![method]);
        let built = CompiledMethod::build(&unit, 0).unwrap();
        assert_eq!(
            built.directive,
            Directive::Raw {
                op: Op::Abort,
                operand: vec![]
            }
        );

        let mut method = descriptor("badOperand");
        method.annotations = vec![Annotation::Instruction {
            opcode: 0x38,
            operand: vec![1],
        }];
        let unit = unit_of(vec![method]);
        assert!(matches!(
            CompiledMethod::build(&unit, 0),
            Err(Error::AnnotationConfiguration { .. })
        ));

        // Prefixed operands get their length prefix attached
        let mut method = descriptor("pushed");
        method.annotations = vec![Annotation::Instruction {
            opcode: 0x0C,
            operand: vec![0xAA, 0xBB],
        }];
        let unit = unit_of(vec![method]);
        let built = CompiledMethod::build(&unit, 0).unwrap();
        assert_eq!(
            built.directive,
            Directive::Raw {
                op: Op::PushData1,
                operand: vec![2, 0xAA, 0xBB]
            }
        );
    }

    #[test]
    fn contract_hash_is_stored_little_endian() {
        let mut method = descriptor("remoteCall");
        let mut hex = String::new();
        for byte in 1..=20u8 {
            hex.push_str(&format!("{:02x}", byte));
        }
        method.annotations = vec![Annotation::ContractCall(hex)];
        let unit = unit_of(vec![method]);
        let built = CompiledMethod::build(&unit, 0).unwrap();

        let mut expected = [0u8; 20];
        for (index, byte) in (1..=20u8).rev().enumerate() {
            expected[index] = byte;
        }
        assert_eq!(built.directive, Directive::ContractCall { hash: expected });
    }

    #[test]
    fn initializer_must_be_bare() {
        let mut method = descriptor(INITIALIZER_NAME);
        method.annotations = vec![Annotation::Safe];
        let unit = unit_of(vec![method]);
        assert!(matches!(
            CompiledMethod::build(&unit, 0),
            Err(Error::AnnotationConfiguration { .. })
        ));

        let mut method = descriptor(INITIALIZER_NAME);
        method.params = vec![param("value", "int")];
        let unit = unit_of(vec![method]);
        assert!(matches!(
            CompiledMethod::build(&unit, 0),
            Err(Error::AnnotationConfiguration { .. })
        ));
    }

    #[test]
    fn hook_naming() {
        let mut method = descriptor("afterDeploy");
        method.annotations = vec![Annotation::Hook(HookKind::Deploy)];
        let unit = unit_of(vec![method]);
        let built = CompiledMethod::build(&unit, 0).unwrap();
        assert_eq!(built.exposed_name, "_deploy");

        let mut method = descriptor("renamedHook");
        method.annotations = vec![
            Annotation::Hook(HookKind::Verify),
            Annotation::DisplayName("check".to_string()),
        ];
        let unit = unit_of(vec![method]);
        assert!(matches!(
            CompiledMethod::build(&unit, 0),
            Err(Error::AnnotationConfiguration { .. })
        ));
    }

    #[test]
    fn wide_slots_collapse() {
        let mut method = descriptor("wideLocals");
        method.params = vec![param("first", "long"), param("second", "int")];
        // Slot layout: long at 0..=1, int at 2, locals at 3 (long, 3..=4) and 5
        method.locals = 3;
        method.wide_slots = vec![0, 3];
        let unit = unit_of(vec![method]);
        let built = CompiledMethod::build(&unit, 0).unwrap();

        assert_eq!(built.arg_slots, 2);
        assert_eq!(built.local_slots, 2);

        // Source slot 2 is the second argument
        let insn = built.slot_insn(2, false, 0).unwrap();
        assert_eq!(insn, Instruction::bare(Op::LdArg1));

        // Source slot 5 is the second local
        let insn = built.slot_insn(5, true, 0).unwrap();
        assert_eq!(insn, Instruction::bare(Op::StLoc1));

        // Source slot 4 is the upper half of a wide local
        assert!(built.slot_insn(4, false, 0).is_err());
    }

    #[test]
    fn slot_bound_is_enforced() {
        let mut method = descriptor("tooManyLocals");
        method.locals = 300;
        let unit = unit_of(vec![method]);
        assert!(matches!(
            CompiledMethod::build(&unit, 0),
            Err(Error::TooManyLocalVariables { slots: 300, .. })
        ));
    }

    #[test]
    fn compact_and_operand_slot_forms() {
        let mut method = descriptor("manyLocals");
        method.locals = 9;
        let unit = unit_of(vec![method]);
        let built = CompiledMethod::build(&unit, 0).unwrap();

        assert_eq!(built.slot_insn(6, false, 0).unwrap(), Instruction::bare(Op::LdLoc6));
        assert_eq!(
            built.slot_insn(7, false, 0).unwrap(),
            Instruction::with_bytes(Op::LdLoc, vec![7])
        );
    }
}
