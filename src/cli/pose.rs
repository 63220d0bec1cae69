use super::{mode_arg, path_arg, read_state, required_path, write_state};
use crate::errors::Result;
use crate::pose::{self, Mirror, RigDelta};
use crate::reshape;
use crate::taxonomy::Taxonomy;
use clap::ArgMatches;
use std::fs;

pub fn write_main(matches: &ArgMatches) -> Result<()> {
    let (_, state) = read_state(matches)?;
    let mode = mode_arg(matches)?;
    let text = reshape::write_pose(&state.skeleton, &Taxonomy::builtin(), mode);
    match path_arg(matches, "OUTPUT") {
        Some(out) => {
            fs::write(&out, text)?;
            info!("wrote {} pose to {}", mode, out.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

pub fn apply_main(matches: &ArgMatches) -> Result<()> {
    let (from, mut state) = read_state(matches)?;
    let mode = mode_arg(matches)?;
    let text = fs::read_to_string(required_path(matches, "POSE")?)?;
    let mirror = match matches.value_of("MIRROR") {
        Some(m) => Some(m.parse::<Mirror>()?),
        None => None,
    };
    let report = reshape::apply_pose_mirrored(&mut state.skeleton, &Taxonomy::builtin(), &text, mode, mirror)?;
    if report.unused != 0 {
        info!("kept {} lines for joints this skeleton does not have", report.unused);
    }
    write_state(matches, &from, &state)
}

pub fn shape_main(matches: &ArgMatches) -> Result<()> {
    let (from, mut state) = read_state(matches)?;
    let z = number_arg(matches, "FACTOR", "--factor")?;
    let tax = Taxonomy::builtin();
    match path_arg(matches, "DELTA") {
        Some(path) => {
            let file = pose::read(&fs::read_to_string(&path)?, &state.skeleton)?;
            let delta = RigDelta { file: &file, factor: number_arg(matches, "DELTA_FACTOR", "--delta-factor")? };
            pose::scale_shape(&mut state.skeleton, &tax, z, Some(&delta))?;
        }
        None => pose::scale_shape(&mut state.skeleton, &tax, z, None)?,
    }
    write_state(matches, &from, &state)
}

fn number_arg(matches: &ArgMatches, name: &str, flag: &str) -> Result<f64> {
    let s = matches.value_of(name).unwrap_or("1");
    match s.parse::<f64>() {
        Ok(x) if x.is_finite() => Ok(x),
        _ => bail!("{}: expected a number, got {:?}", flag, s),
    }
}
