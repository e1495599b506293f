use jbc2nef::*;

use clap::{Arg, ArgAction, Command};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

fn main() -> Result<(), translate::Error> {
    env_logger::init();

    let matches = Command::new("JVM bytecode to NeoVM contract compiler")
        .version("0.1.0")
        .about("Compile unit descriptors into NEF scripts and contract manifests")
        .arg(
            Arg::new("out-dir")
                .long("out-dir")
                .value_name("DIR")
                .default_value(".")
                .help("Directory the artifacts are written into"),
        )
        .arg(
            Arg::new("compiler-name")
                .long("compiler-name")
                .value_name("NAME")
                .help("Compiler identification written into the NEF header"),
        )
        .arg(
            Arg::new("source-url")
                .long("source-url")
                .value_name("URL")
                .help("Source URL recorded when the unit does not declare one"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Unit descriptor JSON files to compile")
                .required(true)
                .action(ArgAction::Append)
                .index(1),
        )
        .get_matches();

    let mut settings = translate::Settings::new();
    if let Some(name) = matches.get_one::<String>("compiler-name") {
        settings.compiler_name = name.clone();
    }
    if let Some(url) = matches.get_one::<String>("source-url") {
        settings.source_url = url.clone();
    }

    let out_dir = match matches.get_one::<String>("out-dir") {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from("."),
    };
    fs::create_dir_all(&out_dir)?;

    // Units are independent, so one failing unit does not stop the batch
    let mut failed = 0usize;
    for input in matches.get_many::<String>("INPUT").unwrap() {
        match compile_one(input, &out_dir, &settings) {
            Ok((nef, manifest)) => {
                log::info!("Wrote '{}' and '{}'", nef.display(), manifest.display());
            }
            Err(error) => {
                log::error!("Failed to compile '{}': {:?}", input, error);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        process::exit(1);
    }
    Ok(())
}

/// Compile one descriptor file and write both artifacts next to each other
fn compile_one(
    input: &str,
    out_dir: &Path,
    settings: &translate::Settings,
) -> Result<(PathBuf, PathBuf), translate::Error> {
    log::info!("Reading and compiling '{}'", input);
    let text = fs::read(input)?;
    let unit: jbc::UnitDescriptor = serde_json::from_slice(&text)?;
    let name = unit.name.clone();

    let contract = translate::compile(unit, settings)?;

    // Serialize both artifacts before writing either so a failed unit leaves no files behind
    let nef_bytes = contract.nef_bytes()?;
    let manifest_json = contract.manifest_json()?;

    let nef_path = out_dir.join(format!("{}.nef", name));
    let manifest_path = out_dir.join(format!("{}.manifest.json", name));
    fs::write(&nef_path, nef_bytes)?;
    fs::write(&manifest_path, manifest_json)?;
    Ok((nef_path, manifest_path))
}
