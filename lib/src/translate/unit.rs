//! The compilation pipeline for one unit
//!
//! A unit flows strictly downward through the stages: every method is first brought into its
//! intermediate form, then its body is selected, then the call graph is linked, addresses are
//! resolved and the artifacts assembled. Each stage consumes the complete output of the one
//! before it, so a failure anywhere aborts the unit with no artifact produced.
//!
//! When the unit declares static slots but no static initializer, a minimal `_initialize` is
//! synthesized here so the slot allocation instruction has a method to live in. A declared
//! initializer keeps its body and merely has the allocation prepended.

use super::assemble::{assemble, CompiledContract};
use super::errors::Error;
use super::layout::resolve;
use super::linker::link;
use super::method::{CompiledMethod, Directive, INITIALIZER_NAME, MAX_SLOTS};
use super::selector::select;
use super::settings::Settings;
use crate::jbc::{HookKind, MethodDescriptor, SourceInsn, UnitDescriptor};
use crate::neo::{Instruction, Op};

/// Compile one unit into its deployment artifacts
pub fn compile(mut unit: UnitDescriptor, settings: &Settings) -> Result<CompiledContract, Error> {
    log::debug!(
        "Compiling unit `{}` with {} declared methods",
        unit.name,
        unit.methods.len()
    );
    validate_unit(&unit)?;

    if unit.statics > 0 && unit.method(INITIALIZER_NAME).is_none() {
        log::debug!("Synthesizing `{}` for {} static slots", INITIALIZER_NAME, unit.statics);
        unit.methods.push(MethodDescriptor {
            name: INITIALIZER_NAME.to_string(),
            params: vec![],
            return_type: "void".to_string(),
            public: false,
            locals: 0,
            wide_slots: vec![],
            annotations: vec![],
            instructions: vec![SourceInsn::Return],
        });
    }

    let mut methods: Vec<CompiledMethod> = (0..unit.methods.len())
        .map(|at| CompiledMethod::build(&unit, at))
        .collect::<Result<_, _>>()?;
    check_hooks(&methods)?;

    let mut tokens = vec![];
    for at in 0..methods.len() {
        if methods[at].directive.replaces_body() {
            continue;
        }
        let seed = if methods[at].name == INITIALIZER_NAME && unit.statics > 0 {
            vec![Instruction::with_bytes(
                Op::InitSSlot,
                vec![unit.statics as u8],
            )]
        } else {
            vec![]
        };
        methods[at].instructions = select(&unit, &methods, at, &mut tokens, seed)?;
    }

    let linked = link(methods, tokens)?;
    let resolved = resolve(linked, settings)?;
    assemble(&unit, resolved, settings)
}

fn validate_unit(unit: &UnitDescriptor) -> Result<(), Error> {
    if unit.statics as usize > MAX_SLOTS {
        return Err(Error::AnnotationConfiguration {
            method: None,
            problem: format!(
                "the unit declares {} static slots where the target allows {}",
                unit.statics, MAX_SLOTS
            ),
        });
    }

    // Calls resolve by bare name, so overloading cannot work
    for (at, descriptor) in unit.methods.iter().enumerate() {
        if unit.methods[..at]
            .iter()
            .any(|have| have.name == descriptor.name)
        {
            return Err(Error::AnnotationConfiguration {
                method: Some(descriptor.name.clone()),
                problem: "the unit declares more than one method with this name".to_string(),
            });
        }
    }

    Ok(())
}

fn check_hooks(methods: &[CompiledMethod]) -> Result<(), Error> {
    let mut deploy: Option<&str> = None;
    let mut verify: Option<&str> = None;
    for method in methods {
        if let Directive::Hook(kind) = method.directive {
            let seen = match kind {
                HookKind::Deploy => &mut deploy,
                HookKind::Verify => &mut verify,
            };
            match seen {
                Some(first) => {
                    return Err(Error::AnnotationConfiguration {
                        method: Some(method.name.clone()),
                        problem: format!(
                            "lifecycle hook `{}` is already declared by `{}`",
                            kind.exposed_name(),
                            first
                        ),
                    })
                }
                None => *seen = Some(method.name.as_str()),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jbc::Annotation;

    fn method(name: &str, instructions: Vec<SourceInsn>) -> MethodDescriptor {
        MethodDescriptor {
            name: name.to_string(),
            params: vec![],
            return_type: "void".to_string(),
            public: false,
            locals: 0,
            wide_slots: vec![],
            annotations: vec![],
            instructions,
        }
    }

    fn entry(name: &str, instructions: Vec<SourceInsn>) -> MethodDescriptor {
        let mut declared = method(name, instructions);
        declared.annotations = vec![Annotation::EntryPoint];
        declared.public = true;
        declared
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

    fn offset_of(contract: &CompiledContract, name: &str) -> usize {
        contract
            .manifest
            .abi
            .methods
            .iter()
            .find(|listed| listed.name == name)
            .map(|listed| listed.offset)
            .unwrap()
    }

    #[test]
    fn minimal_unit_compiles() {
        let unit = unit_of(vec![entry(
            "main",
            vec![SourceInsn::PushInt(1), SourceInsn::Return],
        )]);
        let contract = compile(unit, &Settings::new()).unwrap();

        assert_eq!(offset_of(&contract, "main"), 0);
        assert_eq!(contract.nef.script, vec![Op::Push1.code(), Op::Ret.code()]);
    }

    #[test]
    fn initializer_is_synthesized_for_statics() {
        let mut unit = unit_of(vec![entry(
            "main",
            vec![
                SourceInsn::PushInt(1),
                SourceInsn::StoreStatic(0),
                SourceInsn::Return,
            ],
        )]);
        unit.statics = 2;
        let contract = compile(unit, &Settings::new()).unwrap();

        let at = offset_of(&contract, INITIALIZER_NAME);
        assert_eq!(
            &contract.nef.script[at..at + 3],
            &[Op::InitSSlot.code(), 2, Op::Ret.code()]
        );
    }

    #[test]
    fn declared_initializer_keeps_its_body() {
        let mut unit = unit_of(vec![
            entry("main", vec![SourceInsn::Return]),
            method(
                INITIALIZER_NAME,
                vec![
                    SourceInsn::PushInt(7),
                    SourceInsn::StoreStatic(0),
                    SourceInsn::Return,
                ],
            ),
        ]);
        unit.statics = 1;
        let contract = compile(unit, &Settings::new()).unwrap();

        let at = offset_of(&contract, INITIALIZER_NAME);
        assert_eq!(
            &contract.nef.script[at..at + 4],
            &[
                Op::InitSSlot.code(),
                1,
                Op::Push7.code(),
                Op::StSFld0.code()
            ]
        );
    }

    #[test]
    fn no_statics_means_no_initializer() {
        let unit = unit_of(vec![entry("main", vec![SourceInsn::Return])]);
        let contract = compile(unit, &Settings::new()).unwrap();
        assert!(contract
            .manifest
            .abi
            .methods
            .iter()
            .all(|listed| listed.name != INITIALIZER_NAME));
    }

    #[test]
    fn statics_beyond_the_slot_bound_are_rejected() {
        let mut unit = unit_of(vec![entry("main", vec![SourceInsn::Return])]);
        unit.statics = 300;
        assert!(matches!(
            compile(unit, &Settings::new()),
            Err(Error::AnnotationConfiguration { method: None, .. })
        ));
    }

    #[test]
    fn duplicate_method_names_are_rejected() {
        let unit = unit_of(vec![
            entry("main", vec![SourceInsn::Return]),
            method("twice", vec![SourceInsn::Return]),
            method("twice", vec![SourceInsn::Return]),
        ]);
        assert!(matches!(
            compile(unit, &Settings::new()),
            Err(Error::AnnotationConfiguration { method: Some(name), .. }) if name == "twice"
        ));
    }

    #[test]
    fn duplicate_hooks_are_rejected() {
        let mut first = method("afterDeploy", vec![SourceInsn::Return]);
        first.annotations = vec![Annotation::Hook(HookKind::Deploy)];
        let mut second = method("deployAgain", vec![SourceInsn::Return]);
        second.annotations = vec![Annotation::Hook(HookKind::Deploy)];
        let unit = unit_of(vec![entry("main", vec![SourceInsn::Return]), first, second]);
        assert!(matches!(
            compile(unit, &Settings::new()),
            Err(Error::AnnotationConfiguration { method: Some(name), .. }) if name == "deployAgain"
        ));
    }

    #[test]
    fn initializer_cannot_take_parameters() {
        let mut declared = method(INITIALIZER_NAME, vec![SourceInsn::Return]);
        declared.params = vec![crate::jbc::ParamDecl {
            name: "bogus".to_string(),
            param_type: "int".to_string(),
        }];
        let mut unit = unit_of(vec![entry("main", vec![SourceInsn::Return]), declared]);
        unit.statics = 1;
        assert!(matches!(
            compile(unit, &Settings::new()),
            Err(Error::AnnotationConfiguration { .. })
        ));
    }

    #[test]
    fn initializer_cannot_be_substituted() {
        let mut declared = method(INITIALIZER_NAME, vec![SourceInsn::Return]);
        declared.annotations = vec![Annotation::Syscall("System.Runtime.GetTrigger".to_string())];
        let mut unit = unit_of(vec![entry("main", vec![SourceInsn::Return]), declared]);
        unit.statics = 1;
        assert!(matches!(
            compile(unit, &Settings::new()),
            Err(Error::AnnotationConfiguration { .. })
        ));
    }
}
