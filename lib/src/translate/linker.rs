//! Call graph linking
//!
//! Selection leaves two symbolic reference kinds behind: calls into other methods of the unit,
//! by unit index, and calls through the external token table, by selection time index. The
//! linker discovers which methods are reachable from the contract's roots (the entry point, the
//! lifecycle hooks and the static initializer), assigns every live method its final identity,
//! and rewrites both reference kinds to those identities. The entry point always gets identity
//! zero. Methods nothing reaches are dropped, and with them every token only they referenced.
//!
//! Discovery order is depth first from each root, following call sites in instruction order, so
//! identities are stable across runs. Cyclic call graphs need no special handling: identities
//! exist before any call operand is rewritten, so mutually recursive methods simply reference
//! each other's identities.

use super::errors::Error;
use super::method::{CompiledMethod, Directive, INITIALIZER_NAME};
use crate::neo::{MethodToken, Payload};

/// The live portion of a unit, in final identity order
pub struct LinkedUnit {
    /// Live methods with rewritten call payloads; the entry point is first
    pub methods: Vec<CompiledMethod>,

    /// Token table referenced by `CALLT` payloads, in first-use order
    pub tokens: Vec<MethodToken>,
}

/// Drop unreachable methods and rewrite symbolic call references to final identities
pub fn link(methods: Vec<CompiledMethod>, tokens: Vec<MethodToken>) -> Result<LinkedUnit, Error> {
    let roots = find_roots(&methods)?;
    let order = reachable(&methods, &roots);

    let mut identity: Vec<Option<usize>> = vec![None; methods.len()];
    for (id, &at) in order.iter().enumerate() {
        identity[at] = Some(id);
    }

    let mut kept_tokens: Vec<MethodToken> = vec![];
    let mut token_ids: Vec<Option<usize>> = vec![None; tokens.len()];
    let mut linked: Vec<CompiledMethod> = Vec::with_capacity(order.len());
    let mut pool: Vec<Option<CompiledMethod>> = methods.into_iter().map(Some).collect();

    for &at in &order {
        if let Some(mut method) = pool[at].take() {
            for insn in &mut method.instructions {
                match &mut insn.payload {
                    Payload::CallMethod(target) => {
                        *target = match identity[*target] {
                            Some(id) => id,
                            None => unreachable!("live method calls into a dropped method"),
                        };
                    }
                    Payload::CallToken(token) => {
                        *token = match token_ids[*token] {
                            Some(id) => id,
                            None => {
                                let id = kept_tokens.len();
                                kept_tokens.push(tokens[*token].clone());
                                token_ids[*token] = Some(id);
                                id
                            }
                        };
                    }
                    _ => {}
                }
            }
            linked.push(method);
        }
    }

    for method in pool.into_iter().flatten() {
        log::debug!("Dropping unreachable method `{}`", method.name);
    }

    Ok(LinkedUnit {
        methods: linked,
        tokens: kept_tokens,
    })
}

/// The entry point, every lifecycle hook, and the static initializer, entry point first
fn find_roots(methods: &[CompiledMethod]) -> Result<Vec<usize>, Error> {
    let mut entries = methods
        .iter()
        .enumerate()
        .filter(|(_, method)| method.directive == Directive::EntryPoint)
        .map(|(at, _)| at);
    let entry = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        (None, _) => {
            return Err(Error::AnnotationConfiguration {
                method: None,
                problem: "the unit declares no entry point method".to_string(),
            })
        }
        (Some(first), Some(second)) => {
            return Err(Error::AnnotationConfiguration {
                method: Some(methods[second].name.clone()),
                problem: format!(
                    "the unit already has an entry point method `{}`",
                    methods[first].name
                ),
            })
        }
    };

    let mut roots = vec![entry];
    for (at, method) in methods.iter().enumerate() {
        if matches!(method.directive, Directive::Hook(_)) {
            roots.push(at);
        }
    }
    if let Some(at) = methods.iter().position(|method| method.name == INITIALIZER_NAME) {
        roots.push(at);
    }
    Ok(roots)
}

/// Unit indices of every method reachable from the roots, in depth first discovery order
fn reachable(methods: &[CompiledMethod], roots: &[usize]) -> Vec<usize> {
    let mut order = Vec::new();
    let mut seen = vec![false; methods.len()];
    for &root in roots {
        let mut stack = vec![root];
        while let Some(at) = stack.pop() {
            if seen[at] {
                continue;
            }
            seen[at] = true;
            order.push(at);

            // Callees in reverse, so the first call site is visited first
            let callees: Vec<usize> = methods[at]
                .instructions
                .iter()
                .filter_map(|insn| match insn.payload {
                    Payload::CallMethod(target) => Some(target),
                    _ => None,
                })
                .collect();
            for &target in callees.iter().rev() {
                if !seen[target] {
                    stack.push(target);
                }
            }
        }
    }
    order
}

#[cfg(test)]
mod test {
    use super::super::selector::select;
    use super::*;
    use crate::jbc::{Annotation, HookKind, MethodDescriptor, SourceInsn, UnitDescriptor};

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

    fn call(callee: &str) -> SourceInsn {
        SourceInsn::Call {
            method: callee.to_string(),
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

    /// Build and select every method of the unit, as the pipeline driver would
    fn selected_unit(unit: &UnitDescriptor) -> (Vec<CompiledMethod>, Vec<MethodToken>) {
        let mut methods: Vec<CompiledMethod> = unit
            .methods
            .iter()
            .enumerate()
            .map(|(at, _)| CompiledMethod::build(unit, at).unwrap())
            .collect();
        let mut tokens = vec![];
        for at in 0..methods.len() {
            if !methods[at].directive.replaces_body() {
                let selected = select(unit, &methods, at, &mut tokens, vec![]).unwrap();
                methods[at].instructions = selected;
            }
        }
        (methods, tokens)
    }

    fn link_unit(unit: &UnitDescriptor) -> Result<LinkedUnit, Error> {
        let (methods, tokens) = selected_unit(unit);
        link(methods, tokens)
    }

    #[test]
    fn entry_gets_identity_zero() {
        // The entry point is declared second; linking must still place it first
        let unit = unit_of(vec![
            method("helper", vec![SourceInsn::Return]),
            entry("main", vec![call("helper"), SourceInsn::Return]),
        ]);
        let linked = link_unit(&unit).unwrap();

        assert_eq!(linked.methods[0].name, "main");
        assert_eq!(linked.methods[1].name, "helper");
        assert_eq!(
            linked.methods[0].instructions[0].payload,
            Payload::CallMethod(1)
        );
    }

    #[test]
    fn unreachable_methods_are_dropped() {
        let unit = unit_of(vec![
            entry("main", vec![SourceInsn::Return]),
            method("orphan", vec![SourceInsn::Return]),
        ]);
        let linked = link_unit(&unit).unwrap();

        assert_eq!(linked.methods.len(), 1);
        assert_eq!(linked.methods[0].name, "main");
    }

    #[test]
    fn discovery_follows_call_order() {
        let unit = unit_of(vec![
            entry("main", vec![call("second"), call("third"), SourceInsn::Return]),
            method("third", vec![SourceInsn::Return]),
            method("second", vec![call("shared"), SourceInsn::Return]),
            method("shared", vec![SourceInsn::Return]),
        ]);
        let linked = link_unit(&unit).unwrap();

        let names: Vec<&str> = linked.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["main", "second", "shared", "third"]);
    }

    #[test]
    fn mutual_recursion_links() {
        let unit = unit_of(vec![
            entry("main", vec![call("even"), SourceInsn::Return]),
            method("even", vec![call("odd"), SourceInsn::Return]),
            method("odd", vec![call("even"), SourceInsn::Return]),
        ]);
        let linked = link_unit(&unit).unwrap();

        let names: Vec<&str> = linked.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["main", "even", "odd"]);
        assert_eq!(
            linked.methods[1].instructions[0].payload,
            Payload::CallMethod(2)
        );
        assert_eq!(
            linked.methods[2].instructions[0].payload,
            Payload::CallMethod(1)
        );
    }

    #[test]
    fn hooks_and_initializer_are_roots() {
        let mut hook = method("afterDeploy", vec![SourceInsn::Return]);
        hook.annotations = vec![Annotation::Hook(HookKind::Deploy)];
        let unit = unit_of(vec![
            entry("main", vec![SourceInsn::Return]),
            hook,
            method(INITIALIZER_NAME, vec![SourceInsn::Return]),
        ]);
        let linked = link_unit(&unit).unwrap();

        let names: Vec<&str> = linked.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["main", "afterDeploy", INITIALIZER_NAME]);
    }

    #[test]
    fn dead_token_is_compacted() {
        let mut first_external = method("firstRemote", vec![SourceInsn::Return]);
        first_external.annotations = vec![Annotation::ContractCall("11".repeat(20))];
        let mut second_external = method("secondRemote", vec![SourceInsn::Return]);
        second_external.annotations = vec![Annotation::ContractCall("22".repeat(20))];

        // The dead caller interns the first token during selection; only the second survives
        let unit = unit_of(vec![
            method("deadCaller", vec![call("firstRemote"), SourceInsn::Return]),
            first_external,
            second_external,
            entry("main", vec![call("secondRemote"), SourceInsn::Return]),
        ]);
        let (methods, tokens) = selected_unit(&unit);
        assert_eq!(tokens.len(), 2);

        let linked = link(methods, tokens).unwrap();
        assert_eq!(linked.methods.len(), 1);
        assert_eq!(linked.tokens.len(), 1);
        assert_eq!(linked.tokens[0].hash, [0x22; 20]);
        assert_eq!(
            linked.methods[0].instructions[0].payload,
            Payload::CallToken(0)
        );
    }

    #[test]
    fn entry_point_is_required() {
        let unit = unit_of(vec![method("main", vec![SourceInsn::Return])]);
        assert!(matches!(
            link_unit(&unit),
            Err(Error::AnnotationConfiguration { method: None, .. })
        ));
    }

    #[test]
    fn second_entry_point_is_rejected() {
        let unit = unit_of(vec![
            entry("first", vec![SourceInsn::Return]),
            entry("second", vec![SourceInsn::Return]),
        ]);
        assert!(matches!(
            link_unit(&unit),
            Err(Error::AnnotationConfiguration {
                method: Some(name),
                ..
            }) if name == "second"
        ));
    }
}
