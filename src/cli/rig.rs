use super::{read_state, required_path};
use crate::errors::Result;
use crate::skeleton::rigfile::RigFile;
use crate::taxonomy::{self, Taxonomy, Validation};
use clap::ArgMatches;

pub fn check_main(matches: &ArgMatches) -> Result<()> {
    let (_, state) = read_state(matches)?;
    let findings = taxonomy::audit(&state.skeleton, &Taxonomy::builtin());
    let violations = findings
        .iter()
        .filter(|f| match f.result {
            Validation::Violation { .. } => true,
            _ => false,
        })
        .count();
    println!(
        "{} joints checked: {} violations, {} other findings",
        state.skeleton.len(),
        violations,
        findings.len() - violations,
    );
    Ok(())
}

pub fn write_main(matches: &ArgMatches) -> Result<()> {
    let (_, state) = read_state(matches)?;
    let rig = RigFile::from_skeleton_posed(&state.skeleton);
    let out = required_path(matches, "OUTPUT")?;
    rig.write(&out)?;
    info!("wrote {} joints to {}", rig.len(), out.display());
    Ok(())
}
