//! Final artifact assembly
//!
//! The last stage pairs the rendered script with its derived manifest. A unit either produces
//! both deployment artifacts or neither; callers write files only after this stage returns.

use super::errors::Error;
use super::layout::ResolvedUnit;
use super::manifest;
use super::settings::Settings;
use crate::jbc::UnitDescriptor;
use crate::neo::{ContractManifest, NefFile};

/// The two deployment artifacts of one compiled unit
pub struct CompiledContract {
    pub nef: NefFile,
    pub manifest: ContractManifest,
}

impl CompiledContract {
    /// Serialized NEF file, checksum included
    pub fn nef_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(self.nef.to_bytes()?)
    }

    /// Serialized manifest JSON
    pub fn manifest_json(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(&self.manifest)?)
    }
}

/// Pair the resolved script with its manifest
pub fn assemble(
    unit: &UnitDescriptor,
    resolved: ResolvedUnit,
    settings: &Settings,
) -> Result<CompiledContract, Error> {
    let manifest = manifest::derive(unit, &resolved)?;

    let source_url = match &unit.source_url {
        Some(declared) => declared.clone(),
        None => settings.source_url.clone(),
    };
    let nef = NefFile {
        compiler: settings.compiler_name.clone(),
        source_url,
        tokens: resolved.tokens,
        script: resolved.script,
    };

    // Header field limits must fail the unit here, not when a caller writes the file
    nef.to_bytes()?;

    Ok(CompiledContract { nef, manifest })
}
