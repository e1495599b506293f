//! Address resolution and script rendering
//!
//! Linking leaves branch and call operands symbolic. This module lays every live method out
//! contiguously in identity order, assigns each instruction its absolute script address, picks
//! the narrowest correct encoding for every branch and call operand, and renders the final byte
//! stream. Selection emits every control flow instruction in its wide four byte offset form, so
//! layout starts from the widest possible script and only ever shrinks it.
//!
//! ### Termination
//!
//! Each pass recomputes all addresses under the current encoding choices, then narrows every
//! wide site whose relative distance fits a one byte offset. Narrowing shrinks the script, so
//! every distance shrinks in magnitude too: a site that narrowed stays valid, and a site that
//! stayed wide can only become narrowable later. The set of wide sites never grows, so a fixed
//! point is reached after at most one pass per wide site, in practice two or three.
//! [`Settings::max_layout_passes`] is a hard stop on top of that argument.
//!
//! Raw substitution instructions carry their operand bytes verbatim and are never re-encoded,
//! whatever opcode they declare.

use super::errors::Error;
use super::linker::LinkedUnit;
use super::method::{CompiledMethod, Directive};
use super::settings::Settings;
use crate::jbc::ParamDecl;
use crate::neo::{Instruction, MethodToken, Op, Payload};
use crate::util::{Offset, OffsetResult, OffsetVec, Width};

/// A method after address resolution, reduced to what the later stages need
#[derive(Clone, Debug)]
pub struct FrozenMethod {
    pub name: String,

    /// Name the method is exposed under in the manifest
    pub exposed_name: String,

    pub directive: Directive,

    pub public: bool,

    pub safe: bool,

    pub params: Vec<ParamDecl>,

    pub return_type: String,

    /// Absolute script offset of the method's first instruction
    pub offset: usize,
}

/// A unit whose instruction stream has reached its final shape
pub struct ResolvedUnit {
    /// Frozen methods in identity order; the entry point is first, at offset zero
    pub methods: Vec<FrozenMethod>,

    /// Token table in `CALLT` operand order
    pub tokens: Vec<MethodToken>,

    /// The rendered script
    pub script: Vec<u8>,
}

/// Assign every instruction its final address and render the script
pub fn resolve(linked: LinkedUnit, settings: &Settings) -> Result<ResolvedUnit, Error> {
    let LinkedUnit { mut methods, tokens } = linked;

    let mut pass = 0usize;
    loop {
        pass += 1;
        if pass > settings.max_layout_passes {
            return Err(Error::AddressResolution {
                method: None,
                problem: format!(
                    "branch encoding did not reach a fixed point after {} layout passes",
                    settings.max_layout_passes
                ),
            });
        }

        let plan = narrowing_plan(&methods);
        if plan.is_empty() {
            break;
        }
        log::trace!("Layout pass {} narrows {} jump sites", pass, plan.len());
        for (method, insn, op) in plan {
            methods[method].instructions[insn].op = op;
        }
    }

    let (script, starts) = render(&methods, &tokens, settings)?;

    let frozen = methods
        .into_iter()
        .zip(starts)
        .map(|(method, start)| FrozenMethod {
            name: method.name,
            exposed_name: method.exposed_name,
            directive: method.directive,
            public: method.public,
            safe: method.safe,
            params: method.params,
            return_type: method.return_type,
            offset: start.0,
        })
        .collect();

    Ok(ResolvedUnit {
        methods: frozen,
        tokens,
        script,
    })
}

/// Wide sites whose distance fits the narrow encoding under the current layout
fn narrowing_plan(methods: &[CompiledMethod]) -> Vec<(usize, usize, Op)> {
    let (starts, addrs) = addresses(methods);

    let mut plan = vec![];
    for (m, method) in methods.iter().enumerate() {
        for (i, insn) in method.instructions.iter().enumerate() {
            let narrow = match insn.op.narrowed() {
                Some(narrow) => narrow,
                None => continue,
            };
            let site = addrs[m][i];
            let fits = match &insn.payload {
                Payload::Branch(target) => fits_narrow(addrs[m][*target] - site),
                Payload::CallMethod(identity) => fits_narrow(starts[*identity] - site),
                Payload::Try { catch, finally } => {
                    catch.map_or(true, |t| fits_narrow(addrs[m][t] - site))
                        && finally.map_or(true, |t| fits_narrow(addrs[m][t] - site))
                }
                _ => false,
            };
            if fits {
                plan.push((m, i, narrow));
            }
        }
    }
    plan
}

/// Method start addresses and per-instruction addresses under the current encoding choices
fn addresses(methods: &[CompiledMethod]) -> (Vec<Offset>, Vec<Vec<Offset>>) {
    let mut starts = Vec::with_capacity(methods.len());
    let mut addrs = Vec::with_capacity(methods.len());
    let mut at = 0usize;
    for method in methods {
        starts.push(Offset(at));
        let mut table = Vec::with_capacity(method.instructions.len());
        for insn in &method.instructions {
            table.push(Offset(at));
            at += insn.width();
        }
        addrs.push(table);
    }
    (starts, addrs)
}

fn fits_narrow(distance: isize) -> bool {
    i8::try_from(distance).is_ok()
}

/// Serialize all methods at their final addresses, checking the size limit and that every
/// resolved target lands on an instruction boundary
fn render(
    methods: &[CompiledMethod],
    tokens: &[MethodToken],
    settings: &Settings,
) -> Result<(Vec<u8>, Vec<Offset>), Error> {
    let mut starts = Vec::with_capacity(methods.len());
    let mut tables: Vec<OffsetVec<&Instruction>> = Vec::with_capacity(methods.len());
    let mut at = Offset(0);
    for method in methods {
        starts.push(at);
        let mut table = OffsetVec::new_starting_at(at);
        for insn in &method.instructions {
            table.push(insn);
        }
        at = table.offset_len();
        tables.push(table);
    }

    let total = at.0;
    if total > settings.max_script_length {
        return Err(Error::AddressResolution {
            method: None,
            problem: format!(
                "script is {} bytes, exceeding the {} byte limit",
                total, settings.max_script_length
            ),
        });
    }

    let mut script = Vec::with_capacity(total);
    for (m, method) in methods.iter().enumerate() {
        let table = &tables[m];
        for (site, _, insn) in table.iter() {
            script.push(insn.op.code());
            match &insn.payload {
                Payload::None => {}
                Payload::Bytes(wire) => script.extend_from_slice(wire),
                Payload::Branch(target) => {
                    let distance = resolved_distance(table, site, *target, &method.name)?;
                    push_offset(&mut script, insn.op, distance, &method.name)?;
                }
                Payload::CallMethod(identity) => {
                    let to = starts[*identity];
                    on_boundary(&tables[*identity], to, &method.name)?;
                    push_offset(&mut script, insn.op, to - site, &method.name)?;
                }
                Payload::Try { catch, finally } => {
                    let catch_distance = match catch {
                        Some(target) => resolved_distance(table, site, *target, &method.name)?,
                        None => 0,
                    };
                    let finally_distance = match finally {
                        Some(target) => resolved_distance(table, site, *target, &method.name)?,
                        None => 0,
                    };
                    push_offset(&mut script, insn.op, catch_distance, &method.name)?;
                    push_offset(&mut script, insn.op, finally_distance, &method.name)?;
                }
                Payload::CallToken(token) => {
                    let index = u16::try_from(*token).map_err(|_| Error::AddressResolution {
                        method: Some(method.name.clone()),
                        problem: format!("token index {} does not fit a two byte operand", token),
                    })?;
                    script.extend_from_slice(&index.to_le_bytes());
                }
            }
        }
    }

    if script.len() != total {
        return Err(Error::AddressResolution {
            method: None,
            problem: format!(
                "rendered {} bytes where layout reserved {}",
                script.len(),
                total
            ),
        });
    }

    Ok((script, starts))
}

/// Distance from `site` to the instruction at `target`, checked against the address table
fn resolved_distance(
    table: &OffsetVec<&Instruction>,
    site: Offset,
    target: usize,
    method: &str,
) -> Result<isize, Error> {
    let to = match table.get_index(target) {
        Some((offset, _)) => offset,
        None => unreachable!("branch target index bounds checked during selection"),
    };
    on_boundary(table, to, method)?;
    Ok(to - site)
}

/// The post-resolution invariant: a resolved address must start an instruction
fn on_boundary(table: &OffsetVec<&Instruction>, target: Offset, method: &str) -> Result<(), Error> {
    match table.get_offset(target) {
        OffsetResult::Ok(_, _) => Ok(()),
        OffsetResult::InvalidOffset(_) | OffsetResult::TooLarge => Err(Error::AddressResolution {
            method: Some(method.to_string()),
            problem: format!("jump target {} is not an instruction boundary", target.0),
        }),
    }
}

/// Append a relative offset in the width the instruction's current form calls for
fn push_offset(script: &mut Vec<u8>, op: Op, distance: isize, method: &str) -> Result<(), Error> {
    let oversized = |distance: isize| Error::AddressResolution {
        method: Some(method.to_string()),
        problem: format!("jump distance {} does not fit its chosen encoding", distance),
    };

    if op.narrowed().is_some() {
        // Still in wide form
        let value = i32::try_from(distance).map_err(|_| oversized(distance))?;
        script.extend_from_slice(&value.to_le_bytes());
    } else {
        let value = i8::try_from(distance).map_err(|_| oversized(distance))?;
        script.push(value as u8);
    }
    Ok(())
}
