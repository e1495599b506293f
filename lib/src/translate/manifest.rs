//! Deriving the contract's public interface
//!
//! The manifest is computed only after address resolution, because every exposed method entry
//! carries the final byte offset of its body. A method is exposed when it is the entry point,
//! a lifecycle hook, declared public, or the static initializer; everything else is internal
//! and invisible to the chain. Parameter and return types are mapped onto the ABI's fixed type
//! enumeration by name convention, and any type outside the convention aborts compilation
//! rather than degrading to `Any`.
//!
//! Declared events are listed whether or not the live code fires them. Standards, permissions
//! and trusts are copied from the unit's declarations, with only their shape validated here.

use super::errors::Error;
use super::layout::{FrozenMethod, ResolvedUnit};
use super::method::{Directive, INITIALIZER_NAME};
use crate::jbc::{abi_type, is_contract_pattern, ParamDecl, PermissionDecl, UnitDescriptor};
use crate::neo::{
    ContractAbi, ContractEvent, ContractManifest, ContractMethod, ContractParameter,
    ContractPermission, ParamType, WildcardSet,
};

/// Derive the manifest for a resolved unit
pub fn derive(unit: &UnitDescriptor, resolved: &ResolvedUnit) -> Result<ContractManifest, Error> {
    if unit.name.trim().is_empty() {
        return Err(Error::ManifestGeneration {
            method: None,
            problem: "the unit does not declare a contract name".to_string(),
        });
    }

    let mut methods: Vec<ContractMethod> = vec![];
    let mut sources: Vec<&str> = vec![];
    for method in resolved.methods.iter().filter(|method| exposed(method)) {
        if let Some(at) = methods
            .iter()
            .position(|have| have.name == method.exposed_name)
        {
            return Err(Error::ManifestGeneration {
                method: Some(method.name.clone()),
                problem: format!(
                    "method `{}` is exposed as `{}`, which `{}` already uses",
                    method.name, method.exposed_name, sources[at]
                ),
            });
        }
        methods.push(method_entry(method)?);
        sources.push(&method.name);
    }

    let mut events: Vec<ContractEvent> = vec![];
    for declared in &unit.events {
        let parameters = event_params(&declared.name, &declared.params)?;
        match events.iter().find(|have| have.name == declared.name) {
            Some(have) if have.parameters == parameters => continue,
            Some(_) => {
                return Err(Error::ManifestGeneration {
                    method: None,
                    problem: format!(
                        "two events named `{}` disagree on their parameters",
                        declared.name
                    ),
                })
            }
            None => events.push(ContractEvent {
                name: declared.name.clone(),
                parameters,
            }),
        }
    }

    let permissions = unit
        .permissions
        .iter()
        .map(permission_entry)
        .collect::<Result<Vec<_>, _>>()?;

    for trust in &unit.trusts {
        if !is_contract_pattern(trust) {
            return Err(Error::ManifestGeneration {
                method: None,
                problem: format!(
                    "trust declaration `{}` is neither a contract hash nor a group key",
                    trust
                ),
            });
        }
    }
    let trusts = wildcard_set(&unit.trusts, "the trust list")?;

    Ok(ContractManifest {
        name: unit.name.clone(),
        groups: vec![],
        features: serde_json::Map::new(),
        supported_standards: unit.standards.clone(),
        abi: ContractAbi { methods, events },
        permissions,
        trusts,
        extra: unit.extra.clone(),
    })
}

/// Whether a live method appears in the manifest
fn exposed(method: &FrozenMethod) -> bool {
    matches!(method.directive, Directive::EntryPoint | Directive::Hook(_))
        || method.public
        || method.name == INITIALIZER_NAME
}

fn method_entry(method: &FrozenMethod) -> Result<ContractMethod, Error> {
    let parameters = method
        .params
        .iter()
        .map(|param| parameter_entry(&method.name, param))
        .collect::<Result<Vec<_>, _>>()?;

    let return_type = match abi_type(&method.return_type) {
        Some(mapped) => mapped,
        None => {
            return Err(Error::ManifestGeneration {
                method: Some(method.name.clone()),
                problem: format!(
                    "return type `{}` has no ABI counterpart",
                    method.return_type
                ),
            })
        }
    };

    Ok(ContractMethod {
        name: method.exposed_name.clone(),
        parameters,
        offset: method.offset,
        return_type,
        safe: method.safe,
    })
}

fn parameter_entry(method: &str, param: &ParamDecl) -> Result<ContractParameter, Error> {
    match abi_type(&param.param_type) {
        Some(ParamType::Void) | None => Err(Error::ManifestGeneration {
            method: Some(method.to_string()),
            problem: format!(
                "parameter `{}` has type `{}` with no ABI counterpart",
                param.name, param.param_type
            ),
        }),
        Some(mapped) => Ok(ContractParameter {
            name: param.name.clone(),
            param_type: mapped,
        }),
    }
}

fn event_params(event: &str, params: &[ParamDecl]) -> Result<Vec<ContractParameter>, Error> {
    params
        .iter()
        .map(|param| match abi_type(&param.param_type) {
            Some(ParamType::Void) | None => Err(Error::ManifestGeneration {
                method: None,
                problem: format!(
                    "event `{}` parameter `{}` has type `{}` with no ABI counterpart",
                    event, param.name, param.param_type
                ),
            }),
            Some(mapped) => Ok(ContractParameter {
                name: param.name.clone(),
                param_type: mapped,
            }),
        })
        .collect()
}

fn permission_entry(declared: &PermissionDecl) -> Result<ContractPermission, Error> {
    if !is_contract_pattern(&declared.contract) {
        return Err(Error::ManifestGeneration {
            method: None,
            problem: format!(
                "permission target `{}` is neither a contract hash nor a group key",
                declared.contract
            ),
        });
    }
    let methods = wildcard_set(
        &declared.methods,
        &format!("the method list for `{}`", declared.contract),
    )?;
    Ok(ContractPermission {
        contract: declared.contract.clone(),
        methods,
    })
}

/// A list containing `"*"` must contain nothing else
fn wildcard_set(entries: &[String], what: &str) -> Result<WildcardSet, Error> {
    if entries.iter().any(|entry| entry == "*") {
        if entries.len() == 1 {
            Ok(WildcardSet::wildcard())
        } else {
            Err(Error::ManifestGeneration {
                method: None,
                problem: format!("{} mixes the wildcard with explicit entries", what),
            })
        }
    } else {
        Ok(WildcardSet::Restricted(entries.to_vec()))
    }
}
