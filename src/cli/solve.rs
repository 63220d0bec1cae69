use super::{path_arg, required_path};
use crate::character;
use crate::errors::Result;
use crate::reshape::{self, ReshapeOptions};
use crate::skeleton::rigfile::RigFile;
use crate::skeleton::state::State;
use crate::solve::SolveMethod;
use crate::taxonomy::Taxonomy;
use crate::util::OutDir;
use clap::ArgMatches;
use std::fs;

pub fn main(matches: &ArgMatches) -> Result<()> {
    let mut options = ReshapeOptions::default();
    options.cache_path = path_arg(matches, "CACHE");
    if matches.is_present("iterative") {
        options.solver.method = SolveMethod::Iterative;
    }
    if let Some(n) = matches.value_of("MAX_PASSES") {
        options.solver.max_passes = match n.parse() {
            Ok(n) => n,
            Err(_) => bail!("--max-passes: expected a number, got {:?}", n),
        };
    }

    let dump_path = required_path(matches, "DUMP")?;
    let dump_bytes = fs::read(&dump_path)?;
    let rig = match path_arg(matches, "RIG") {
        Some(p) => Some(RigFile::read(&p)?),
        None => {
            info!("no default rig given; the dump is taken as the rest pose");
            None
        }
    };
    let tax = Taxonomy::builtin();
    let import = reshape::import(&dump_bytes, rig.as_ref(), &tax, &options.dump)?;
    info!(
        "skeleton: {} joints, {} rebound to the default rig, {} DOFs flagged",
        import.skeleton.len(),
        import.retarget.rebound,
        import.retarget.findings.len(),
    );

    let mut meshes = character::read(&required_path(matches, "CHARACTER")?)?;
    let report = reshape::solve_character(&import.skeleton, &mut meshes, import.hash, &options)?;
    info!(
        "solved {} vertices ({} approximated, {} unsolved){}",
        report.resolved_count,
        report.approximated_count,
        report.unsolved_count(),
        if report.from_cache { " from the cache" } else { "" },
    );
    for (what, ids) in &report.unsolved {
        if !ids.is_empty() {
            debug!("{}: unsolved vertices {:?}", what, ids);
        }
    }

    let mut out = OutDir::new(required_path(matches, "OUTPUT")?);
    character::write(&out.file("character.json")?, &meshes)?;
    let state = State { hash: Some(import.hash), skeleton: import.skeleton };
    state.write(&out.file("skeleton.json")?)?;
    info!("wrote character.json and skeleton.json to {}", out.path().display());
    Ok(())
}
